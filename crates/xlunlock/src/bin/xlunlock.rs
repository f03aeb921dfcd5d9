use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use xlunlock::{CollisionPolicy, UnlockConfig, UnlockReport};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OnCollision {
    Skip,
    Fail,
    Overwrite,
}

impl From<OnCollision> for CollisionPolicy {
    fn from(value: OnCollision) -> Self {
        match value {
            OnCollision::Skip => CollisionPolicy::Skip,
            OnCollision::Fail => CollisionPolicy::Fail,
            OnCollision::Overwrite => CollisionPolicy::Overwrite,
        }
    }
}

#[derive(Parser)]
#[command(about = "Remove the read-password from every .xls/.xlsx file in a directory.")]
struct Args {
    /// Directory to scan (not recursive).
    dir: PathBuf,

    /// Password tried on every encrypted file.
    #[arg(long, env = "XLUNLOCK_PASSWORD", hide_env_values = true)]
    password: String,

    /// Extensions treated as spreadsheets (repeatable, without the dot).
    #[arg(long = "extension", default_values = xlunlock::DEFAULT_EXTENSIONS)]
    extensions: Vec<String>,

    /// What to do when `<stem>_unlocked<ext>` already exists.
    #[arg(long, value_enum, default_value_t = OnCollision::Skip)]
    on_collision: OnCollision,

    /// Record per-file failures and continue instead of stopping at the first one.
    #[arg(long)]
    keep_going: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = UnlockConfig {
        directory: args.dir.clone(),
        password: args.password,
        extensions: args.extensions,
        collision: args.on_collision.into(),
        fail_fast: !args.keep_going,
    };

    let report = xlunlock::unlock(&config)
        .with_context(|| format!("unlock run over {} stopped", args.dir.display()))?;

    if args.json {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        serde_json::to_writer_pretty(&mut handle, &report)?;
        handle.write_all(b"\n")?;
    } else {
        print_summary(&report);
    }

    if !report.failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(report: &UnlockReport) {
    for file in &report.unlocked {
        println!("unlocked  {}", file.output.display());
    }
    for file in &report.failed {
        println!("FAILED    {} ({}): {}", file.path.display(), file.kind, file.message);
    }
    println!(
        "{} unlocked, {} skipped, {} failed",
        report.processed_count(),
        report.skipped_count(),
        report.failed.len()
    );
}
