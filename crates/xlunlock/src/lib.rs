//! Batch removal of read-passwords from spreadsheet files.
//!
//! [`unlock`] scans one directory (non-recursively) for `.xls` / `.xlsx` files, probes each for a
//! read-password and writes a decrypted `<stem>_unlocked<ext>` sibling for every file that has
//! one, using a single password for the whole run. Source files are never modified.
//!
//! ```no_run
//! let report = xlunlock::unlock_directory("./workbooks", "12345")?;
//! println!("unlocked {} file(s)", report.processed_count());
//! # Ok::<(), xlunlock::UnlockError>(())
//! ```

use std::path::Path;

mod config;
mod error;
mod fs;
mod probe;
mod report;

pub use config::{CollisionPolicy, FormatVariant, UnlockConfig, DEFAULT_EXTENSIONS};
pub use error::{UnlockError, UnlockErrorKind};
pub use fs::unlocked_output_path;
pub use probe::{
    probe_for, CandidateFile, EncryptionStatus, LegacyProbe, OpenXmlProbe, ProtectedDocument,
    ProtectionProbe, ProtectionStatus,
};
pub use report::{FailedFile, SkipReason, SkippedFile, UnlockReport, UnlockedFile};

use xlunlock_offcrypto::DecryptOptions;

enum FileOutcome {
    Unlocked(UnlockedFile),
    Skipped(SkipReason),
}

/// Unlock every encrypted spreadsheet in `config.directory`.
///
/// A missing or unreadable directory fails before any file is touched. Per-file errors abort the
/// run when `config.fail_fast` is set and are collected in [`UnlockReport::failed`] otherwise.
pub fn unlock(config: &UnlockConfig) -> Result<UnlockReport, UnlockError> {
    let entries = fs::list_directory(&config.directory)
        .map_err(|err| UnlockError::io(&config.directory, err))?;
    log::debug!(
        "scanning {} entries in {}",
        entries.len(),
        config.directory.display()
    );

    let mut report = UnlockReport::default();
    for path in entries {
        match unlock_file(config, &path) {
            Ok(FileOutcome::Unlocked(file)) => report.unlocked.push(file),
            Ok(FileOutcome::Skipped(reason)) => report.skipped.push(SkippedFile { path, reason }),
            Err(err) if config.fail_fast => return Err(err),
            Err(err) => {
                log::error!("{err}");
                report.failed.push(FailedFile::from(&err));
            }
        }
    }

    log::debug!(
        "unlocked {}, skipped {}, failed {}",
        report.processed_count(),
        report.skipped_count(),
        report.failed.len()
    );
    Ok(report)
}

/// [`unlock`] with default extensions, collision policy and fail-fast behaviour.
pub fn unlock_directory(
    directory: impl AsRef<Path>,
    password: &str,
) -> Result<UnlockReport, UnlockError> {
    unlock(&UnlockConfig::new(directory.as_ref(), password))
}

fn unlock_file(config: &UnlockConfig, path: &Path) -> Result<FileOutcome, UnlockError> {
    if !fs::is_regular_file(path) {
        return Ok(FileOutcome::Skipped(SkipReason::NotRegularFile));
    }
    let Some(format) = config.format_for(path) else {
        return Ok(FileOutcome::Skipped(SkipReason::UnrecognizedExtension));
    };

    let bytes = std::fs::read(path).map_err(|err| UnlockError::io(path, err))?;
    let candidate = CandidateFile {
        path: path.to_path_buf(),
        format,
        bytes,
    };
    let document = ProtectedDocument::open(&candidate);
    match document.status {
        EncryptionStatus::Encrypted => {}
        EncryptionStatus::NotEncrypted => {
            log::debug!("{}: no read-password", path.display());
            return Ok(FileOutcome::Skipped(SkipReason::NotEncrypted));
        }
        EncryptionStatus::Unknown => {
            let reason = document
                .malformed_reason()
                .unwrap_or("container could not be inspected");
            return Err(UnlockError::new(
                path,
                UnlockErrorKind::StructuralParse,
                reason.to_string(),
            ));
        }
    }

    let output = fs::unlocked_output_path(path);
    if fs::path_is_taken(&output) {
        match config.collision {
            CollisionPolicy::Skip => {
                log::warn!(
                    "{}: output {} already exists, skipping",
                    path.display(),
                    output.display()
                );
                return Ok(FileOutcome::Skipped(SkipReason::OutputExists));
            }
            CollisionPolicy::Fail => return Err(collision_error(path, &output)),
            CollisionPolicy::Overwrite => {
                log::debug!("{}: overwriting {}", path.display(), output.display());
            }
        }
    }

    let password = config.password_for(path);
    let decrypted = match decrypt(&document, password) {
        Ok(decrypted) => decrypted,
        Err(err) if err.kind == UnlockErrorKind::NotEncrypted => {
            return Ok(FileOutcome::Skipped(SkipReason::NotEncrypted));
        }
        Err(err) => return Err(err),
    };

    let replace = config.collision == CollisionPolicy::Overwrite;
    fs::write_atomically(&output, &decrypted, replace).map_err(|err| {
        if err.kind() == std::io::ErrorKind::AlreadyExists {
            collision_error(path, &output)
        } else {
            UnlockError::io(&output, err)
        }
    })?;

    log::info!("unlocked {} -> {}", path.display(), output.display());
    Ok(FileOutcome::Unlocked(UnlockedFile {
        source: path.to_path_buf(),
        output,
        format,
    }))
}

fn decrypt(document: &ProtectedDocument<'_>, password: &str) -> Result<Vec<u8>, UnlockError> {
    let candidate = document.candidate;
    match candidate.format {
        FormatVariant::OpenXml => xlunlock_offcrypto::decrypt_encrypted_package_ole(
            &candidate.bytes,
            password,
            DecryptOptions::default(),
        )
        .map_err(|err| UnlockError::from_offcrypto(&candidate.path, err)),
        FormatVariant::LegacyBinary => xlunlock_xls::decrypt_xls_bytes(&candidate.bytes, password)
            .map_err(|err| UnlockError::from_xls(&candidate.path, err)),
    }
}

fn collision_error(path: &Path, output: &Path) -> UnlockError {
    UnlockError::new(
        path,
        UnlockErrorKind::OutputCollision,
        format!("output {} already exists", output.display()),
    )
}
