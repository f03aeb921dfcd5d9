//! Standard (CryptoAPI AES) encryption, `EncryptionInfo` versions 2.2, 3.2 and 4.2.

use zeroize::Zeroizing;

use crate::crypto::{aes_ecb_decrypt_in_place, HashAlgorithm};
use crate::util::{
    checked_vec_len, ct_eq, decode_utf16le_nul_terminated, password_to_utf16le_bytes, Reader,
};
use crate::OffcryptoError;

const CALG_AES_128: u32 = 0x0000_660E;
const CALG_AES_192: u32 = 0x0000_660F;
const CALG_AES_256: u32 = 0x0000_6610;
const CALG_SHA1: u32 = 0x0000_8004;

const SPIN_COUNT: u32 = 50_000;
const SHA1_LEN: usize = 20;

/// Upper bound for `EncryptionHeader.Size`; real headers are well under 1 KiB.
const MAX_HEADER_SIZE: u32 = 4096;

/// `EncryptionHeader` (MS-OFFCRYPTO 2.3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardEncryptionHeader {
    pub flags: u32,
    pub alg_id: u32,
    pub alg_id_hash: u32,
    pub key_bits: u32,
    pub provider_type: u32,
    pub csp_name: String,
}

/// `EncryptionVerifier` (MS-OFFCRYPTO 2.3.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardEncryptionVerifier {
    pub salt: Vec<u8>,
    pub encrypted_verifier: [u8; 16],
    pub verifier_hash_size: u32,
    pub encrypted_verifier_hash: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardEncryptionInfo {
    pub header: StandardEncryptionHeader,
    pub verifier: StandardEncryptionVerifier,
}

/// Parse the Standard `EncryptionInfo` body. `r` must be positioned right after the
/// 8-byte version/flags prefix.
pub(crate) fn parse_standard_encryption_info(
    r: &mut Reader<'_>,
) -> Result<StandardEncryptionInfo, OffcryptoError> {
    let header_size = r.read_u32_le("EncryptionInfo.HeaderSize")?;
    if !(32..=MAX_HEADER_SIZE).contains(&header_size) {
        return Err(OffcryptoError::InvalidEncryptionInfo {
            context: "EncryptionInfo.HeaderSize out of range",
        });
    }
    let header_bytes = r.take(header_size as usize, "EncryptionHeader")?;
    let mut hr = Reader::new(header_bytes);
    let flags = hr.read_u32_le("EncryptionHeader.Flags")?;
    let _size_extra = hr.read_u32_le("EncryptionHeader.SizeExtra")?;
    let alg_id = hr.read_u32_le("EncryptionHeader.AlgID")?;
    let alg_id_hash = hr.read_u32_le("EncryptionHeader.AlgIDHash")?;
    let key_bits = hr.read_u32_le("EncryptionHeader.KeySize")?;
    let provider_type = hr.read_u32_le("EncryptionHeader.ProviderType")?;
    let _reserved1 = hr.read_u32_le("EncryptionHeader.Reserved1")?;
    let _reserved2 = hr.read_u32_le("EncryptionHeader.Reserved2")?;
    let csp_name = decode_utf16le_nul_terminated(hr.remaining())?;

    let salt_size = r.read_u32_le("EncryptionVerifier.SaltSize")?;
    if salt_size != 16 {
        return Err(OffcryptoError::InvalidEncryptionInfo {
            context: "EncryptionVerifier.SaltSize must be 16",
        });
    }
    let salt = r.take(16, "EncryptionVerifier.Salt")?.to_vec();
    let mut encrypted_verifier = [0u8; 16];
    encrypted_verifier.copy_from_slice(r.take(16, "EncryptionVerifier.EncryptedVerifier")?);
    let verifier_hash_size = r.read_u32_le("EncryptionVerifier.VerifierHashSize")?;
    // AES pads the 20-byte SHA-1 verifier hash to 32 bytes.
    let encrypted_verifier_hash = r
        .take(32, "EncryptionVerifier.EncryptedVerifierHash")?
        .to_vec();

    Ok(StandardEncryptionInfo {
        header: StandardEncryptionHeader {
            flags,
            alg_id,
            alg_id_hash,
            key_bits,
            provider_type,
            csp_name,
        },
        verifier: StandardEncryptionVerifier {
            salt,
            encrypted_verifier,
            verifier_hash_size,
            encrypted_verifier_hash,
        },
    })
}

fn key_len_for(header: &StandardEncryptionHeader) -> Result<usize, OffcryptoError> {
    let expected_bits = match header.alg_id {
        CALG_AES_128 => 128,
        CALG_AES_192 => 192,
        CALG_AES_256 => 256,
        other => return Err(OffcryptoError::UnsupportedAlgorithm(other)),
    };
    if header.alg_id_hash != 0 && header.alg_id_hash != CALG_SHA1 {
        return Err(OffcryptoError::UnsupportedAlgorithm(header.alg_id_hash));
    }
    if header.key_bits != 0 && header.key_bits != expected_bits {
        return Err(OffcryptoError::InvalidEncryptionInfo {
            context: "EncryptionHeader.KeySize does not match AlgID",
        });
    }
    Ok(expected_bits as usize / 8)
}

/// CryptoAPI key derivation (MS-OFFCRYPTO 2.3.4.7).
///
/// `H0 = SHA1(salt || password)`, spun 50000 times as `SHA1(LE32(i) || H)`, finalised with
/// block 0, then widened through the `0x36`/`0x5C` derivation buffers.
pub(crate) fn standard_derive_key(
    info: &StandardEncryptionInfo,
    password: &str,
) -> Result<Zeroizing<Vec<u8>>, OffcryptoError> {
    let key_len = key_len_for(&info.header)?;
    let sha1 = HashAlgorithm::Sha1;

    let pw = password_to_utf16le_bytes(password);
    let mut h = Zeroizing::new(sha1.digest_chunks(&[&info.verifier.salt, &pw]));
    for i in 0..SPIN_COUNT {
        let next = sha1.digest_chunks(&[&i.to_le_bytes(), &h[..]]);
        h.copy_from_slice(&next);
    }
    let h_final = Zeroizing::new(sha1.digest_chunks(&[&h[..], &0u32.to_le_bytes()]));

    let mut buf1 = Zeroizing::new([0x36u8; 64]);
    let mut buf2 = Zeroizing::new([0x5Cu8; 64]);
    for (i, b) in h_final.iter().enumerate() {
        buf1[i] ^= b;
        buf2[i] ^= b;
    }
    let mut derived = Zeroizing::new(sha1.digest(&buf1[..]));
    derived.extend_from_slice(&sha1.digest(&buf2[..]));
    derived.truncate(key_len);
    Ok(derived)
}

/// Check `key` against the `EncryptionVerifier`.
pub(crate) fn standard_verify_key(
    info: &StandardEncryptionInfo,
    key: &[u8],
) -> Result<(), OffcryptoError> {
    let mut verifier = Zeroizing::new(info.verifier.encrypted_verifier);
    aes_ecb_decrypt_in_place(key, &mut verifier[..])?;

    let mut verifier_hash = Zeroizing::new(info.verifier.encrypted_verifier_hash.clone());
    aes_ecb_decrypt_in_place(key, &mut verifier_hash)?;

    if info.verifier.verifier_hash_size as usize != SHA1_LEN {
        return Err(OffcryptoError::InvalidEncryptionInfo {
            context: "EncryptionVerifier.VerifierHashSize must be 20",
        });
    }
    let computed = HashAlgorithm::Sha1.digest(&verifier[..]);
    if !ct_eq(&computed, &verifier_hash[..SHA1_LEN]) {
        return Err(OffcryptoError::InvalidPassword);
    }
    Ok(())
}

/// Decrypt a Standard `EncryptedPackage` stream.
pub(crate) fn decrypt_standard_encrypted_package(
    info: &StandardEncryptionInfo,
    encrypted_package: &[u8],
    password: &str,
) -> Result<Vec<u8>, OffcryptoError> {
    let mut r = Reader::new(encrypted_package);
    let total_size = r.read_u64_le("EncryptedPackage.StreamSize")?;
    let expected_len = checked_vec_len(total_size)?;
    let ciphertext = r.remaining();
    if expected_len > ciphertext.len() {
        return Err(OffcryptoError::Truncated {
            context: "EncryptedPackage ciphertext shorter than StreamSize",
        });
    }

    let key = standard_derive_key(info, password)?;
    standard_verify_key(info, &key)?;

    // Some writers append bytes past the last full block; they never carry payload.
    let usable = ciphertext.len() - ciphertext.len() % 16;
    let mut out = Vec::new();
    out.try_reserve_exact(usable)
        .map_err(|source| OffcryptoError::EncryptedPackageAllocationFailed { total_size, source })?;
    out.extend_from_slice(&ciphertext[..usable]);
    aes_ecb_decrypt_in_place(&key, &mut out)?;
    if out.len() < expected_len {
        return Err(OffcryptoError::Truncated {
            context: "decrypted EncryptedPackage shorter than StreamSize",
        });
    }
    out.truncate(expected_len);
    Ok(out)
}
