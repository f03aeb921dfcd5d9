//! Per-format detection of read-password protection.
//!
//! The two formats disagree about what an unreadable container means. A `.xlsx` that is not an
//! OLE compound file is an ordinary zip package, so it simply has no read-password. A `.xls` is
//! always a compound file, so anything unparseable is malformed.

use std::path::PathBuf;

use xlunlock_offcrypto::{is_encrypted_ooxml_ole, OLE_MAGIC};
use xlunlock_xls::{probe_xls_bytes, XlsEncryption, XlsError};

use crate::config::FormatVariant;

/// Result of probing a candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectionStatus {
    Protected,
    NotProtected,
    Malformed(String),
}

/// Encryption state of a [`ProtectedDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionStatus {
    /// The container could not be inspected.
    Unknown,
    Encrypted,
    NotEncrypted,
}

impl From<&ProtectionStatus> for EncryptionStatus {
    fn from(status: &ProtectionStatus) -> Self {
        match status {
            ProtectionStatus::Protected => Self::Encrypted,
            ProtectionStatus::NotProtected => Self::NotEncrypted,
            ProtectionStatus::Malformed(_) => Self::Unknown,
        }
    }
}

pub trait ProtectionProbe {
    fn probe(&self, bytes: &[u8]) -> ProtectionStatus;
}

/// Probe for `.xlsx`: encrypted packages are OLE files with `EncryptionInfo` + `EncryptedPackage`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenXmlProbe;

impl ProtectionProbe for OpenXmlProbe {
    fn probe(&self, bytes: &[u8]) -> ProtectionStatus {
        if !bytes.starts_with(&OLE_MAGIC) {
            return ProtectionStatus::NotProtected;
        }
        if is_encrypted_ooxml_ole(bytes) {
            ProtectionStatus::Protected
        } else {
            ProtectionStatus::Malformed(
                "compound file has no EncryptionInfo/EncryptedPackage streams".to_string(),
            )
        }
    }
}

/// Probe for `.xls`: encrypted workbooks carry a `FILEPASS` record in the workbook globals.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyProbe;

impl ProtectionProbe for LegacyProbe {
    fn probe(&self, bytes: &[u8]) -> ProtectionStatus {
        match probe_xls_bytes(bytes) {
            Ok(XlsEncryption::Encrypted(filepass)) => {
                log::debug!("FILEPASS found ({})", filepass.scheme_name());
                ProtectionStatus::Protected
            }
            Ok(XlsEncryption::NotEncrypted) => ProtectionStatus::NotProtected,
            // A FILEPASS record is present even if its payload is unusable; decryption reports
            // the precise error.
            Err(XlsError::InvalidFilePass(_) | XlsError::UnsupportedEncryption(_)) => {
                ProtectionStatus::Protected
            }
            Err(err) => ProtectionStatus::Malformed(err.to_string()),
        }
    }
}

pub fn probe_for(format: FormatVariant) -> &'static dyn ProtectionProbe {
    match format {
        FormatVariant::OpenXml => &OpenXmlProbe,
        FormatVariant::LegacyBinary => &LegacyProbe,
    }
}

/// A candidate spreadsheet read from disk. Never modified.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub format: FormatVariant,
    pub bytes: Vec<u8>,
}

/// A candidate together with the outcome of its protection probe.
#[derive(Debug)]
pub struct ProtectedDocument<'a> {
    pub candidate: &'a CandidateFile,
    pub protection: ProtectionStatus,
    pub status: EncryptionStatus,
}

impl<'a> ProtectedDocument<'a> {
    pub fn open(candidate: &'a CandidateFile) -> Self {
        let protection = probe_for(candidate.format).probe(&candidate.bytes);
        let status = EncryptionStatus::from(&protection);
        Self {
            candidate,
            protection,
            status,
        }
    }

    /// Why the container could not be inspected, when [`Self::status`] is `Unknown`.
    pub fn malformed_reason(&self) -> Option<&str> {
        match &self.protection {
            ProtectionStatus::Malformed(reason) => Some(reason.as_str()),
            _ => None,
        }
    }
}
