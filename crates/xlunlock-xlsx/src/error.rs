use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtectionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
    #[error("package is missing required part `{0}`")]
    MissingPart(String),
    #[error("worksheet `{0}` not found")]
    SheetNotFound(String),
    #[error("invalid protection hash: {0}")]
    InvalidHash(String),
    #[error("unsupported protection hash algorithm `{0}`")]
    UnsupportedHashAlgorithm(String),
    #[error("wrong protection password")]
    WrongPassword,
}
