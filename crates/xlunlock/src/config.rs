use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Extensions scanned when the caller does not choose their own.
pub const DEFAULT_EXTENSIONS: [&str; 2] = ["xls", "xlsx"];

/// Spreadsheet container a candidate file is expected to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatVariant {
    /// `.xls`: BIFF8 workbook stream inside an OLE compound file.
    LegacyBinary,
    /// `.xlsx`: zip package, wrapped in an OLE compound file when encrypted.
    OpenXml,
}

impl FormatVariant {
    /// Format implied by a file extension. Matching is case-sensitive.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "xls" => Some(Self::LegacyBinary),
            "xlsx" | "xlsm" => Some(Self::OpenXml),
            _ => None,
        }
    }
}

/// What to do when `<stem>_unlocked<ext>` already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Leave the existing file alone and record the source as skipped.
    #[default]
    Skip,
    /// Report an `OutputCollision` error.
    Fail,
    /// Replace the existing file.
    Overwrite,
}

/// Settings for one unlock run.
#[derive(Clone)]
pub struct UnlockConfig {
    /// Directory scanned non-recursively.
    pub directory: PathBuf,
    /// Password tried on every encrypted file.
    pub password: String,
    /// Extensions (without the dot) that mark a file as a candidate.
    pub extensions: Vec<String>,
    pub collision: CollisionPolicy,
    /// Abort on the first per-file error instead of recording it and moving on.
    pub fail_fast: bool,
}

impl UnlockConfig {
    pub fn new(directory: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            password: password.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            collision: CollisionPolicy::default(),
            fail_fast: true,
        }
    }

    /// Password to use for `path`. Every file currently shares the configured password.
    pub fn password_for(&self, _path: &Path) -> &str {
        &self.password
    }

    /// Format of `path` if its extension is one of the configured candidates.
    pub fn format_for(&self, path: &Path) -> Option<FormatVariant> {
        let extension = path.extension()?.to_str()?;
        if !self.extensions.iter().any(|ext| ext == extension) {
            return None;
        }
        FormatVariant::from_extension(extension)
    }
}

impl fmt::Debug for UnlockConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockConfig")
            .field("directory", &self.directory)
            .field("password", &"<redacted>")
            .field("extensions", &self.extensions)
            .field("collision", &self.collision)
            .field("fail_fast", &self.fail_fast)
            .finish()
    }
}
