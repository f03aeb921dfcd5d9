use std::path::PathBuf;

use serde::Serialize;

use crate::config::FormatVariant;
use crate::error::{UnlockError, UnlockErrorKind};

/// Why a directory entry produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotRegularFile,
    UnrecognizedExtension,
    NotEncrypted,
    /// The `_unlocked` sibling already exists and the collision policy is `Skip`.
    OutputExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockedFile {
    pub source: PathBuf,
    pub output: PathBuf,
    pub format: FormatVariant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub kind: UnlockErrorKind,
    pub message: String,
}

impl From<&UnlockError> for FailedFile {
    fn from(err: &UnlockError) -> Self {
        Self {
            path: err.path.clone(),
            kind: err.kind,
            message: err.source.to_string(),
        }
    }
}

/// Outcome of one run over a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnlockReport {
    pub unlocked: Vec<UnlockedFile>,
    pub skipped: Vec<SkippedFile>,
    /// Per-file errors; only populated when `fail_fast` is off.
    pub failed: Vec<FailedFile>,
}

impl UnlockReport {
    /// Number of output files written.
    pub fn processed_count(&self) -> usize {
        self.unlocked.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn skipped_for(&self, reason: SkipReason) -> impl Iterator<Item = &SkippedFile> {
        self.skipped.iter().filter(move |s| s.reason == reason)
    }
}
