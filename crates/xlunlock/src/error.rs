use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use xlunlock_offcrypto::OffcryptoError;
use xlunlock_xls::XlsError;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Category of a per-file or per-run failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockErrorKind {
    /// The container is not a valid instance of the format its extension claims.
    StructuralParse,
    /// A legacy workbook has no `FILEPASS` record. Reported as a skip, never as a failure.
    NotEncrypted,
    /// The password did not pass the document's verifier.
    WrongPassword,
    /// The encryption structures are inconsistent, so no key could be derived or checked.
    KeyDerivation,
    UnsupportedEncryption,
    /// The output file already exists under [`crate::CollisionPolicy::Fail`].
    OutputCollision,
    Filesystem,
}

impl UnlockErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StructuralParse => "structural parse error",
            Self::NotEncrypted => "not encrypted",
            Self::WrongPassword => "wrong password",
            Self::KeyDerivation => "key derivation error",
            Self::UnsupportedEncryption => "unsupported encryption",
            Self::OutputCollision => "output collision",
            Self::Filesystem => "filesystem error",
        }
    }
}

impl fmt::Display for UnlockErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure while unlocking `path`.
#[derive(Debug, thiserror::Error)]
#[error("failed to unlock `{path}` ({kind}): {source}")]
pub struct UnlockError {
    pub path: PathBuf,
    pub kind: UnlockErrorKind,
    #[source]
    pub source: BoxError,
}

impl UnlockError {
    pub fn new(path: impl AsRef<Path>, kind: UnlockErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            kind,
            source: source.into(),
        }
    }

    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::new(path, UnlockErrorKind::Filesystem, source)
    }

    pub(crate) fn from_offcrypto(path: impl AsRef<Path>, source: OffcryptoError) -> Self {
        Self::new(path, offcrypto_error_kind(&source), source)
    }

    pub(crate) fn from_xls(path: impl AsRef<Path>, source: XlsError) -> Self {
        Self::new(path, xls_error_kind(&source), source)
    }
}

fn offcrypto_error_kind(err: &OffcryptoError) -> UnlockErrorKind {
    match err {
        OffcryptoError::InvalidPassword => UnlockErrorKind::WrongPassword,
        OffcryptoError::UnsupportedVersion { .. }
        | OffcryptoError::UnsupportedAlgorithm(_)
        | OffcryptoError::UnsupportedCipher(_) => UnlockErrorKind::UnsupportedEncryption,
        // Stream reads only fail when the compound file itself is damaged.
        OffcryptoError::Io(_) => UnlockErrorKind::StructuralParse,
        _ => UnlockErrorKind::KeyDerivation,
    }
}

fn xls_error_kind(err: &XlsError) -> UnlockErrorKind {
    match err {
        XlsError::Container(_)
        | XlsError::MissingWorkbookStream
        | XlsError::NotBiff
        | XlsError::Io(_) => UnlockErrorKind::StructuralParse,
        XlsError::NotEncrypted => UnlockErrorKind::NotEncrypted,
        XlsError::InvalidFilePass(_) => UnlockErrorKind::KeyDerivation,
        XlsError::UnsupportedEncryption(_) => UnlockErrorKind::UnsupportedEncryption,
        XlsError::WrongPassword => UnlockErrorKind::WrongPassword,
    }
}
