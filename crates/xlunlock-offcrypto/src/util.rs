use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::OffcryptoError;

/// Little-endian cursor over a borrowed byte slice.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    pub(crate) fn take(
        &mut self,
        n: usize,
        context: &'static str,
    ) -> Result<&'a [u8], OffcryptoError> {
        let end = self.pos.saturating_add(n);
        if end > self.bytes.len() {
            return Err(OffcryptoError::Truncated { context });
        }
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn read_u16_le(&mut self, context: &'static str) -> Result<u16, OffcryptoError> {
        let b = self.take(2, context)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn read_u32_le(&mut self, context: &'static str) -> Result<u32, OffcryptoError> {
        let b = self.take(4, context)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn read_u64_le(&mut self, context: &'static str) -> Result<u64, OffcryptoError> {
        let b = self.take(8, context)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}

/// Constant-time byte slice equality for verifier and HMAC comparisons.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}

pub(crate) fn password_to_utf16le_bytes(password: &str) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(password.len().saturating_mul(2)));
    for unit in password.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Decode a UTF-16LE string, stopping at the first NUL.
///
/// A missing terminator is tolerated.
pub(crate) fn decode_utf16le_nul_terminated(bytes: &[u8]) -> Result<String, OffcryptoError> {
    let even_len = bytes.len() - bytes.len() % 2;
    let units: Vec<u16> = bytes[..even_len]
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .take_while(|unit| *unit != 0)
        .collect();
    String::from_utf16(&units).map_err(|_| OffcryptoError::InvalidEncryptionInfo {
        context: "CSPName is not valid UTF-16LE",
    })
}

/// Convert the `EncryptedPackage` size prefix into a buffer length.
pub(crate) fn checked_vec_len(total_size: u64) -> Result<usize, OffcryptoError> {
    usize::try_from(total_size)
        .ok()
        .filter(|len| *len <= isize::MAX as usize)
        .ok_or(OffcryptoError::EncryptedPackageSizeOverflow { total_size })
}

/// Decode a base64 XML attribute value.
///
/// Some producers pretty-print the `EncryptionInfo` XML and insert whitespace into long values,
/// and some omit `=` padding. Both are accepted.
pub(crate) fn decode_b64_attr(value: &str) -> Result<Vec<u8>, OffcryptoError> {
    let bytes = value.as_bytes();
    let cleaned: Option<Vec<u8>> = if bytes.iter().any(u8::is_ascii_whitespace) {
        Some(
            bytes
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect(),
        )
    } else {
        None
    };

    let input = cleaned.as_deref().unwrap_or(bytes);
    STANDARD
        .decode(input)
        .or_else(|_| STANDARD_NO_PAD.decode(input))
        .map_err(|_| OffcryptoError::InvalidEncryptionInfo {
            context: "invalid base64 value",
        })
}
