//! Detection and password decryption of encrypted OOXML workbooks.
//!
//! Excel saves a password-protected `.xlsx` as an OLE/CFB container holding two streams:
//! `EncryptionInfo` (the key descriptor) and `EncryptedPackage` (the encrypted ZIP). This crate
//! supports:
//! - MS-OFFCRYPTO "Agile Encryption" (XML descriptor, Office 2010+)
//! - MS-OFFCRYPTO "Standard Encryption" (binary descriptor, Office 2007)
//!
//! Decryption returns the raw OOXML ZIP bytes (they start with `PK`).

mod agile;
mod crypto;
mod error;
mod standard;
mod util;

use std::io::{Cursor, Read, Seek};

pub use crate::agile::{
    AgileDataIntegrity, AgileEncryptionInfo, AgileKeyData, AgilePasswordKeyEncryptor,
};
pub use crate::crypto::HashAlgorithm;
pub use crate::error::OffcryptoError;
pub use crate::standard::{
    StandardEncryptionHeader, StandardEncryptionInfo, StandardEncryptionVerifier,
};

use crate::util::Reader;

/// Signature of an OLE/CFB compound file.
pub const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const ENCRYPTION_INFO_STREAM: &str = "EncryptionInfo";
const ENCRYPTED_PACKAGE_STREAM: &str = "EncryptedPackage";

/// `EncryptionInfo` version prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionVersionInfo {
    pub major: u16,
    pub minor: u16,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionInfo {
    Agile {
        version: EncryptionVersionInfo,
        info: AgileEncryptionInfo,
    },
    Standard {
        version: EncryptionVersionInfo,
        info: StandardEncryptionInfo,
    },
}

impl EncryptionInfo {
    pub fn version(&self) -> EncryptionVersionInfo {
        match self {
            EncryptionInfo::Agile { version, .. } | EncryptionInfo::Standard { version, .. } => {
                *version
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecryptOptions {
    /// Check the Agile `dataIntegrity` HMAC before decrypting.
    pub verify_integrity: bool,
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self {
            verify_integrity: true,
        }
    }
}

/// Parse an `EncryptionInfo` stream.
pub fn parse_encryption_info(bytes: &[u8]) -> Result<EncryptionInfo, OffcryptoError> {
    let mut r = Reader::new(bytes);
    let major = r.read_u16_le("EncryptionVersionInfo.major")?;
    let minor = r.read_u16_le("EncryptionVersionInfo.minor")?;
    let flags = r.read_u32_le("EncryptionVersionInfo.flags")?;
    let version = EncryptionVersionInfo {
        major,
        minor,
        flags,
    };

    match (major, minor) {
        (4, 4) => {
            let info = agile::parse_agile_encryption_info_xml(r.remaining())?;
            Ok(EncryptionInfo::Agile { version, info })
        }
        (2..=4, 2) => {
            let info = standard::parse_standard_encryption_info(&mut r)?;
            Ok(EncryptionInfo::Standard { version, info })
        }
        _ => Err(OffcryptoError::UnsupportedVersion { major, minor }),
    }
}

/// Read the plaintext size prefix of an `EncryptedPackage` stream.
pub fn parse_encrypted_package_header(bytes: &[u8]) -> Result<u64, OffcryptoError> {
    Reader::new(bytes).read_u64_le("EncryptedPackage.StreamSize")
}

/// Returns true if `bytes` is an OLE/CFB container holding both the `EncryptionInfo` and
/// `EncryptedPackage` streams.
pub fn is_encrypted_ooxml_ole(bytes: &[u8]) -> bool {
    if bytes.len() < OLE_MAGIC.len() || bytes[..OLE_MAGIC.len()] != OLE_MAGIC {
        return false;
    }
    let Ok(mut ole) = cfb::CompoundFile::open(Cursor::new(bytes)) else {
        return false;
    };
    stream_exists(&mut ole, ENCRYPTION_INFO_STREAM)
        && stream_exists(&mut ole, ENCRYPTED_PACKAGE_STREAM)
}

/// Decrypt an `EncryptedPackage` stream using the raw `EncryptionInfo` stream bytes.
pub fn decrypt_encrypted_package(
    encryption_info: &[u8],
    encrypted_package: &[u8],
    password: &str,
    options: DecryptOptions,
) -> Result<Vec<u8>, OffcryptoError> {
    let info = parse_encryption_info(encryption_info)?;
    decrypt_encrypted_package_with_info(&info, encrypted_package, password, options)
}

/// Decrypt an `EncryptedPackage` stream described by an already parsed `info`.
pub fn decrypt_encrypted_package_with_info(
    info: &EncryptionInfo,
    encrypted_package: &[u8],
    password: &str,
    options: DecryptOptions,
) -> Result<Vec<u8>, OffcryptoError> {
    let out = match info {
        EncryptionInfo::Agile { info, .. } => {
            log::debug!(
                "decrypting agile package: hash={:?} key_bits={} spin_count={}",
                info.password_key_encryptor.hash_algorithm,
                info.password_key_encryptor.key_bits,
                info.password_key_encryptor.spin_count
            );
            agile::decrypt_agile_encrypted_package(info, encrypted_package, password, options)?
        }
        EncryptionInfo::Standard { info, .. } => {
            log::debug!(
                "decrypting standard package: alg_id=0x{:04X} key_bits={}",
                info.header.alg_id,
                info.header.key_bits
            );
            standard::decrypt_standard_encrypted_package(info, encrypted_package, password)?
        }
    };
    validate_decrypted_package(&out)?;
    Ok(out)
}

/// Open an encrypted OOXML OLE/CFB wrapper and return the decrypted ZIP bytes.
pub fn decrypt_encrypted_package_ole(
    bytes: &[u8],
    password: &str,
    options: DecryptOptions,
) -> Result<Vec<u8>, OffcryptoError> {
    let mut ole = cfb::CompoundFile::open(Cursor::new(bytes))?;
    let encryption_info = read_stream(&mut ole, ENCRYPTION_INFO_STREAM)?;
    let encrypted_package = read_stream(&mut ole, ENCRYPTED_PACKAGE_STREAM)?;

    decrypt_encrypted_package(&encryption_info, &encrypted_package, password, options)
}

fn stream_exists<R: Read + Seek>(ole: &mut cfb::CompoundFile<R>, name: &str) -> bool {
    ole.open_stream(name).is_ok()
}

fn read_stream<R: Read + Seek>(
    ole: &mut cfb::CompoundFile<R>,
    name: &str,
) -> Result<Vec<u8>, OffcryptoError> {
    let mut stream = ole.open_stream(name).map_err(|err| {
        OffcryptoError::InvalidFormat(format!("missing {name} stream: {err}"))
    })?;
    let mut out = Vec::new();
    stream.read_to_end(&mut out)?;
    Ok(out)
}

fn validate_decrypted_package(bytes: &[u8]) -> Result<(), OffcryptoError> {
    if !bytes.starts_with(b"PK") {
        return Err(OffcryptoError::InvalidFormat(
            "decrypted package does not look like a ZIP (missing PK signature)".to_string(),
        ));
    }
    Ok(())
}
