use thiserror::Error;

/// Errors returned while probing or decrypting a legacy `.xls` workbook.
#[derive(Debug, Error)]
pub enum XlsError {
    /// The bytes are not a readable OLE/CFB compound file.
    #[error("not a valid compound file: {0}")]
    Container(#[source] std::io::Error),
    #[error("missing workbook stream (expected `Workbook` or `Book`)")]
    MissingWorkbookStream,
    /// The workbook stream does not start with a BIFF `BOF` record.
    #[error("workbook stream does not start with a BIFF BOF record")]
    NotBiff,
    #[error("workbook is not encrypted (missing FILEPASS record)")]
    NotEncrypted,
    #[error("invalid FILEPASS record: {0}")]
    InvalidFilePass(String),
    #[error("unsupported encryption scheme: {0}")]
    UnsupportedEncryption(String),
    #[error("wrong password")]
    WrongPassword,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
