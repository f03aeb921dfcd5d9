//! Password hashes stored on `workbookProtection` / `sheetProtection` elements.
//!
//! Two encodings exist in the wild:
//! - the legacy 16-bit XOR hash rendered as four hex digits (`password="CA9C"`)
//! - the modern salted, iterated hash (`algorithmName="SHA-512" hashValue=.. saltValue=..
//!   spinCount=..`)

use base64::Engine as _;
use sha2::Digest;
use subtle::ConstantTimeEq;

use crate::ProtectionError;

/// Spin count Excel uses when it writes a modern protection hash.
pub const DEFAULT_SPIN_COUNT: u32 = 100_000;

/// Hash a password using Excel's legacy worksheet/workbook protection algorithm.
///
/// The algorithm is a simple XOR scheme and is **not** cryptographically secure.
#[must_use]
pub fn hash_legacy_password(password: &str) -> u16 {
    let mut hash: u16 = 0;
    let mut len: u16 = 0;

    // Excel truncates legacy passwords to 15 characters.
    for (i, ch) in password.encode_utf16().take(15).enumerate() {
        len = len.saturating_add(1);
        let shift = (i + 1) as u32;
        // Rotate within 15 bits.
        let rotated =
            (((ch as u32) << shift) & 0x7FFF) | ((ch as u32) >> (15u32.saturating_sub(shift)));
        hash ^= rotated as u16;
    }

    hash ^= len;
    hash ^= 0xCE4B;
    hash
}

/// Salted, iterated protection hash (`algorithmName`/`hashValue`/`saltValue`/`spinCount`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionHash {
    pub algorithm_name: String,
    pub hash_value: Vec<u8>,
    pub salt_value: Vec<u8>,
    pub spin_count: u32,
}

impl ProtectionHash {
    /// SHA-512 hash of `password`, the algorithm current Excel versions write.
    pub fn sha512(password: &str, salt: &[u8], spin_count: u32) -> Self {
        Self {
            algorithm_name: "SHA-512".to_string(),
            hash_value: iterated_hash::<sha2::Sha512>(password, salt, spin_count),
            salt_value: salt.to_vec(),
            spin_count,
        }
    }

    /// Build a hash from the base64 attribute values found in XML.
    pub fn from_attributes(
        algorithm_name: &str,
        hash_value: &str,
        salt_value: &str,
        spin_count: &str,
    ) -> Result<Self, ProtectionError> {
        let b64 = base64::engine::general_purpose::STANDARD;
        let hash_value = b64
            .decode(hash_value.trim())
            .map_err(|err| ProtectionError::InvalidHash(format!("hashValue: {err}")))?;
        let salt_value = b64
            .decode(salt_value.trim())
            .map_err(|err| ProtectionError::InvalidHash(format!("saltValue: {err}")))?;
        let spin_count = spin_count
            .trim()
            .parse::<u32>()
            .map_err(|err| ProtectionError::InvalidHash(format!("spinCount: {err}")))?;
        Ok(Self {
            algorithm_name: algorithm_name.to_string(),
            hash_value,
            salt_value,
            spin_count,
        })
    }

    pub fn hash_value_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.hash_value)
    }

    pub fn salt_value_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.salt_value)
    }

    pub fn verify(&self, password: &str) -> Result<bool, ProtectionError> {
        let salt = &self.salt_value;
        let spin = self.spin_count;
        let computed = match self.algorithm_name.as_str() {
            "SHA-512" => iterated_hash::<sha2::Sha512>(password, salt, spin),
            "SHA-384" => iterated_hash::<sha2::Sha384>(password, salt, spin),
            "SHA-256" => iterated_hash::<sha2::Sha256>(password, salt, spin),
            "SHA-1" => iterated_hash::<sha1::Sha1>(password, salt, spin),
            other => return Err(ProtectionError::UnsupportedHashAlgorithm(other.to_string())),
        };
        Ok(bool::from(computed.ct_eq(&self.hash_value)))
    }
}

/// Password hash carried by a protection element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordHash {
    Legacy(u16),
    Modern(ProtectionHash),
}

impl PasswordHash {
    pub fn legacy(password: &str) -> Self {
        Self::Legacy(hash_legacy_password(password))
    }

    pub fn verify(&self, password: &str) -> Result<bool, ProtectionError> {
        match self {
            Self::Legacy(hash) => Ok(hash_legacy_password(password) == *hash),
            Self::Modern(hash) => hash.verify(password),
        }
    }
}

// H0 = H(salt || UTF-16LE(password)); Hn = H(Hn-1 || LE32(n-1)).
fn iterated_hash<D: Digest>(password: &str, salt: &[u8], spin_count: u32) -> Vec<u8> {
    let password: Vec<u8> = password.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let mut hash = D::new()
        .chain_update(salt)
        .chain_update(&password)
        .finalize()
        .to_vec();
    for i in 0..spin_count {
        hash = D::new()
            .chain_update(&hash)
            .chain_update(i.to_le_bytes())
            .finalize()
            .to_vec();
    }
    hash
}
