//! Agile encryption (MS-OFFCRYPTO 2.3.4.10, `EncryptionInfo` version 4.4).
//!
//! The password key encryptor yields the package "secret key" after three block-key
//! derivations that share one iterated password hash:
//! - block 1: `encryptedVerifierHashInput`
//! - block 2: `encryptedVerifierHashValue`
//! - block 3: `encryptedKeyValue`
//!
//! The package is then decrypted in 4096-byte segments, each with its own IV.

use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader as XmlReader;
use zeroize::Zeroizing;

use crate::crypto::{aes_cbc_decrypt, derive_encryption_key, derive_iv, HashAlgorithm};
use crate::util::{checked_vec_len, ct_eq, decode_b64_attr, password_to_utf16le_bytes, Reader};
use crate::{DecryptOptions, OffcryptoError};

const PASSWORD_KEY_ENCRYPTOR_NS: &str =
    "http://schemas.microsoft.com/office/2006/keyEncryptor/password";

const VERIFIER_HASH_INPUT_BLOCK: [u8; 8] = [0xFE, 0xA7, 0xD2, 0x76, 0x3B, 0x4B, 0x9E, 0x79];
const VERIFIER_HASH_VALUE_BLOCK: [u8; 8] = [0xD7, 0xAA, 0x0F, 0x6D, 0x30, 0x61, 0x34, 0x4E];
const KEY_VALUE_BLOCK: [u8; 8] = [0x14, 0x6E, 0x0B, 0xE7, 0xAB, 0xAC, 0xD0, 0xD6];
const HMAC_KEY_BLOCK: [u8; 8] = [0x5F, 0xB2, 0xAD, 0x01, 0x0C, 0xB9, 0xE1, 0xF6];
const HMAC_VALUE_BLOCK: [u8; 8] = [0xA0, 0x67, 0x7F, 0x02, 0xB2, 0x2C, 0x84, 0x33];

const SEGMENT_LEN: usize = 4096;
const VERIFIER_HASH_INPUT_LEN: usize = 16;

/// `<keyData>`: parameters for the package cipher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgileKeyData {
    pub salt: Vec<u8>,
    pub block_size: usize,
    pub key_bits: usize,
    pub hash_algorithm: HashAlgorithm,
}

/// `<dataIntegrity>`: encrypted HMAC key and value over the `EncryptedPackage` stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgileDataIntegrity {
    pub encrypted_hmac_key: Vec<u8>,
    pub encrypted_hmac_value: Vec<u8>,
}

/// `<p:encryptedKey>` from the password key encryptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgilePasswordKeyEncryptor {
    pub spin_count: u32,
    pub salt: Vec<u8>,
    pub hash_algorithm: HashAlgorithm,
    pub key_bits: usize,
    pub encrypted_key_value: Vec<u8>,
    pub encrypted_verifier_hash_input: Vec<u8>,
    pub encrypted_verifier_hash_value: Vec<u8>,
}

/// Parsed Agile `EncryptionInfo`, restricted to what password decryption needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgileEncryptionInfo {
    pub key_data: AgileKeyData,
    pub data_integrity: Option<AgileDataIntegrity>,
    pub password_key_encryptor: AgilePasswordKeyEncryptor,
}

#[derive(Debug, Default)]
struct NamespaceFrame {
    decls: Vec<(Vec<u8>, Vec<u8>)>,
}

fn push_namespace_frame(
    stack: &mut Vec<NamespaceFrame>,
    elem: &BytesStart<'_>,
) -> Result<(), OffcryptoError> {
    let mut frame = NamespaceFrame::default();
    for attr in elem.attributes().with_checks(false) {
        let attr = attr.map_err(|_| OffcryptoError::InvalidEncryptionInfo {
            context: "invalid XML attribute",
        })?;
        let key = attr.key.as_ref();
        if key == b"xmlns" {
            frame.decls.push((Vec::new(), attr.value.to_vec()));
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            frame.decls.push((prefix.to_vec(), attr.value.to_vec()));
        }
    }
    stack.push(frame);
    Ok(())
}

fn resolve_namespace_uri<'a>(stack: &'a [NamespaceFrame], prefix: &[u8]) -> Option<&'a [u8]> {
    stack.iter().rev().find_map(|frame| {
        frame
            .decls
            .iter()
            .find(|(p, _)| p.as_slice() == prefix)
            .map(|(_, uri)| uri.as_slice())
    })
}

fn element_prefix(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|b| *b == b':')
        .map(|idx| &name[..idx])
        .unwrap_or(&[])
}

fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|b| *b == b':')
        .map(|idx| &name[idx + 1..])
        .unwrap_or(name)
}

/// Attribute map for one element, keyed by local name.
struct Attrs(Vec<(Vec<u8>, String)>);

impl Attrs {
    fn read(e: &BytesStart<'_>) -> Result<Self, OffcryptoError> {
        let mut out = Vec::new();
        for attr in e.attributes().with_checks(false) {
            let attr = attr.map_err(|_| OffcryptoError::InvalidEncryptionInfo {
                context: "invalid XML attribute",
            })?;
            let value = std::str::from_utf8(attr.value.as_ref()).map_err(|_| {
                OffcryptoError::InvalidEncryptionInfo {
                    context: "invalid UTF-8 attribute value",
                }
            })?;
            out.push((local_name(attr.key.as_ref()).to_vec(), value.to_string()));
        }
        Ok(Self(out))
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.as_slice() == name.as_bytes())
            .map(|(_, v)| v.as_str())
    }

    fn required(&self, name: &str, context: &'static str) -> Result<&str, OffcryptoError> {
        self.get(name)
            .ok_or(OffcryptoError::InvalidEncryptionInfo { context })
    }

    fn base64(&self, name: &str, context: &'static str) -> Result<Vec<u8>, OffcryptoError> {
        decode_b64_attr(self.required(name, context)?)
    }

    fn number<T: std::str::FromStr>(
        &self,
        name: &str,
        context: &'static str,
    ) -> Result<T, OffcryptoError> {
        self.required(name, context)?
            .trim()
            .parse::<T>()
            .map_err(|_| OffcryptoError::InvalidEncryptionInfo { context })
    }

    fn hash_algorithm(&self, context: &'static str) -> Result<HashAlgorithm, OffcryptoError> {
        HashAlgorithm::parse_offcrypto_name(self.required("hashAlgorithm", context)?)
    }

    fn check_cipher(&self) -> Result<(), OffcryptoError> {
        if let Some(alg) = self.get("cipherAlgorithm") {
            if !alg.eq_ignore_ascii_case("AES") {
                return Err(OffcryptoError::UnsupportedCipher(alg.to_string()));
            }
        }
        if let Some(chaining) = self.get("cipherChaining") {
            if chaining != "ChainingModeCBC" {
                return Err(OffcryptoError::UnsupportedCipher(chaining.to_string()));
            }
        }
        Ok(())
    }
}

/// Parse the XML descriptor that follows the 8-byte version header.
pub(crate) fn parse_agile_encryption_info_xml(
    xml_bytes: &[u8],
) -> Result<AgileEncryptionInfo, OffcryptoError> {
    let xml = std::str::from_utf8(xml_bytes).map_err(|_| OffcryptoError::InvalidEncryptionInfo {
        context: "agile EncryptionInfo XML is not valid UTF-8",
    })?;
    // Some writers emit a UTF-8 BOM or trailing NUL padding.
    let xml = xml.trim_start_matches('\u{feff}').trim_end_matches('\0');

    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut ns_stack: Vec<NamespaceFrame> = Vec::new();
    let mut key_data: Option<AgileKeyData> = None;
    let mut data_integrity: Option<AgileDataIntegrity> = None;
    let mut password_key_encryptor: Option<AgilePasswordKeyEncryptor> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|_| OffcryptoError::InvalidEncryptionInfo {
                context: "agile EncryptionInfo XML parse error",
            })?;

        let (elem, is_empty) = match &event {
            XmlEvent::Start(e) => (e, false),
            XmlEvent::Empty(e) => (e, true),
            XmlEvent::End(_) => {
                ns_stack.pop();
                continue;
            }
            XmlEvent::Eof => break,
            _ => continue,
        };

        push_namespace_frame(&mut ns_stack, elem)?;
        match elem.local_name().as_ref() {
            b"keyData" => {
                let attrs = Attrs::read(elem)?;
                attrs.check_cipher()?;
                key_data = Some(AgileKeyData {
                    salt: attrs.base64("saltValue", "missing keyData.saltValue")?,
                    block_size: attrs.number("blockSize", "missing keyData.blockSize")?,
                    key_bits: attrs.number("keyBits", "missing keyData.keyBits")?,
                    hash_algorithm: attrs.hash_algorithm("missing keyData.hashAlgorithm")?,
                });
            }
            b"dataIntegrity" => {
                let attrs = Attrs::read(elem)?;
                data_integrity = Some(AgileDataIntegrity {
                    encrypted_hmac_key: attrs.base64(
                        "encryptedHmacKey",
                        "missing dataIntegrity.encryptedHmacKey",
                    )?,
                    encrypted_hmac_value: attrs.base64(
                        "encryptedHmacValue",
                        "missing dataIntegrity.encryptedHmacValue",
                    )?,
                });
            }
            b"encryptedKey" => {
                let name = elem.name();
                let ns_uri = resolve_namespace_uri(&ns_stack, element_prefix(name.as_ref()));
                // Certificate key encryptors also use `encryptedKey`; only the password one applies.
                if ns_uri == Some(PASSWORD_KEY_ENCRYPTOR_NS.as_bytes()) {
                    let attrs = Attrs::read(elem)?;
                    attrs.check_cipher()?;
                    password_key_encryptor = Some(AgilePasswordKeyEncryptor {
                        spin_count: attrs.number("spinCount", "missing encryptedKey.spinCount")?,
                        salt: attrs.base64("saltValue", "missing encryptedKey.saltValue")?,
                        hash_algorithm: attrs
                            .hash_algorithm("missing encryptedKey.hashAlgorithm")?,
                        key_bits: attrs.number("keyBits", "missing encryptedKey.keyBits")?,
                        encrypted_key_value: attrs.base64(
                            "encryptedKeyValue",
                            "missing encryptedKey.encryptedKeyValue",
                        )?,
                        encrypted_verifier_hash_input: attrs.base64(
                            "encryptedVerifierHashInput",
                            "missing encryptedKey.encryptedVerifierHashInput",
                        )?,
                        encrypted_verifier_hash_value: attrs.base64(
                            "encryptedVerifierHashValue",
                            "missing encryptedKey.encryptedVerifierHashValue",
                        )?,
                    });
                }
            }
            _ => {}
        }
        if is_empty {
            ns_stack.pop();
        }
    }

    Ok(AgileEncryptionInfo {
        key_data: key_data.ok_or(OffcryptoError::InvalidEncryptionInfo {
            context: "missing <keyData> element",
        })?,
        data_integrity,
        password_key_encryptor: password_key_encryptor.ok_or(
            OffcryptoError::InvalidEncryptionInfo {
                context: "missing password <encryptedKey> element",
            },
        )?,
    })
}

/// Compute the Agile password iterated hash.
///
/// 1. `H = Hash(salt || password_utf16le)`
/// 2. For `i in 0..spinCount`: `H = Hash(LE32(i) || H)`
pub(crate) fn agile_iterated_hash(
    password_utf16le: &[u8],
    salt: &[u8],
    hash_alg: HashAlgorithm,
    spin_count: u32,
) -> Zeroizing<Vec<u8>> {
    let mut h = Zeroizing::new(hash_alg.digest_chunks(&[salt, password_utf16le]));
    for i in 0..spin_count {
        let next = hash_alg.digest_chunks(&[&i.to_le_bytes(), &h[..]]);
        h.copy_from_slice(&next);
    }
    h
}

/// Derive, verify and decrypt the Agile secret key for `password`.
pub(crate) fn agile_secret_key_from_password(
    info: &AgileEncryptionInfo,
    password: &str,
) -> Result<Zeroizing<Vec<u8>>, OffcryptoError> {
    let pke = &info.password_key_encryptor;
    if pke.salt.len() < 16 {
        return Err(OffcryptoError::InvalidEncryptionInfo {
            context: "encryptedKey.saltValue is shorter than 16 bytes",
        });
    }
    if pke.key_bits == 0 || pke.key_bits % 8 != 0 {
        return Err(OffcryptoError::InvalidEncryptionInfo {
            context: "encryptedKey.keyBits is not divisible by 8",
        });
    }
    let key_len = pke.key_bits / 8;
    let hash_alg = pke.hash_algorithm;

    let password_utf16le = password_to_utf16le_bytes(password);
    let h = agile_iterated_hash(&password_utf16le, &pke.salt, hash_alg, pke.spin_count);

    let key1 = derive_encryption_key(&h, &VERIFIER_HASH_INPUT_BLOCK, hash_alg, pke.key_bits)?;
    let verifier_hash_input = Zeroizing::new(aes_cbc_decrypt(
        &pke.encrypted_verifier_hash_input,
        &key1,
        &pke.salt,
    )?);
    let verifier_hash_input = verifier_hash_input
        .get(..VERIFIER_HASH_INPUT_LEN)
        .ok_or(OffcryptoError::InvalidEncryptionInfo {
            context: "decrypted verifierHashInput is truncated",
        })?;

    let key2 = derive_encryption_key(&h, &VERIFIER_HASH_VALUE_BLOCK, hash_alg, pke.key_bits)?;
    let verifier_hash_value = Zeroizing::new(aes_cbc_decrypt(
        &pke.encrypted_verifier_hash_value,
        &key2,
        &pke.salt,
    )?);

    // The decrypted digest may carry AES padding; compare the digest prefix only.
    let digest = hash_alg.digest(verifier_hash_input);
    let expected = verifier_hash_value
        .get(..digest.len())
        .ok_or(OffcryptoError::InvalidPassword)?;
    if !ct_eq(&digest, expected) {
        return Err(OffcryptoError::InvalidPassword);
    }

    let key3 = derive_encryption_key(&h, &KEY_VALUE_BLOCK, hash_alg, pke.key_bits)?;
    let key_value = Zeroizing::new(aes_cbc_decrypt(&pke.encrypted_key_value, &key3, &pke.salt)?);
    let secret = key_value
        .get(..key_len)
        .ok_or(OffcryptoError::InvalidEncryptionInfo {
            context: "decrypted keyValue is truncated",
        })?;
    Ok(Zeroizing::new(secret.to_vec()))
}

fn verify_data_integrity(
    info: &AgileEncryptionInfo,
    integrity: &AgileDataIntegrity,
    secret_key: &[u8],
    encrypted_package: &[u8],
) -> Result<(), OffcryptoError> {
    let kd = &info.key_data;
    let digest_len = kd.hash_algorithm.digest_len();

    let iv = derive_iv(kd.hash_algorithm, &kd.salt, &HMAC_KEY_BLOCK, kd.block_size);
    let hmac_key = Zeroizing::new(aes_cbc_decrypt(&integrity.encrypted_hmac_key, secret_key, &iv)?);
    let hmac_key = hmac_key
        .get(..digest_len)
        .ok_or(OffcryptoError::IntegrityCheckFailed)?;

    let iv = derive_iv(kd.hash_algorithm, &kd.salt, &HMAC_VALUE_BLOCK, kd.block_size);
    let hmac_value = aes_cbc_decrypt(&integrity.encrypted_hmac_value, secret_key, &iv)?;
    let expected = hmac_value
        .get(..digest_len)
        .ok_or(OffcryptoError::IntegrityCheckFailed)?;

    let computed = kd.hash_algorithm.hmac(hmac_key, encrypted_package)?;
    if !ct_eq(&computed, expected) {
        return Err(OffcryptoError::IntegrityCheckFailed);
    }
    Ok(())
}

/// Decrypt a full `EncryptedPackage` stream (8-byte size prefix + segments).
pub(crate) fn decrypt_agile_encrypted_package(
    info: &AgileEncryptionInfo,
    encrypted_package: &[u8],
    password: &str,
    options: DecryptOptions,
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

    let secret_key = agile_secret_key_from_password(info, password)?;

    match (&info.data_integrity, options.verify_integrity) {
        (Some(integrity), true) => {
            verify_data_integrity(info, integrity, &secret_key, encrypted_package)?
        }
        (None, true) => log::debug!("agile EncryptionInfo has no dataIntegrity; skipping HMAC"),
        (_, false) => {}
    }

    let kd = &info.key_data;
    let mut out = Vec::new();
    out.try_reserve_exact(ciphertext.len())
        .map_err(|source| OffcryptoError::EncryptedPackageAllocationFailed { total_size, source })?;
    for (index, segment) in ciphertext.chunks(SEGMENT_LEN).enumerate() {
        let index = u32::try_from(index).map_err(|_| {
            OffcryptoError::InvalidFormat("EncryptedPackage segment counter overflow".to_string())
        })?;
        // Writers pad the final segment to the cipher block size; trim anything beyond it.
        let usable = segment.len() - segment.len() % 16;
        if usable == 0 {
            break;
        }
        let iv = derive_iv(kd.hash_algorithm, &kd.salt, &index.to_le_bytes(), kd.block_size);
        let plain = aes_cbc_decrypt(&segment[..usable], &secret_key, &iv)?;
        out.extend_from_slice(&plain);
        if out.len() >= expected_len {
            break;
        }
    }

    if out.len() < expected_len {
        return Err(OffcryptoError::Truncated {
            context: "decrypted EncryptedPackage shorter than StreamSize",
        });
    }
    out.truncate(expected_len);
    Ok(out)
}
