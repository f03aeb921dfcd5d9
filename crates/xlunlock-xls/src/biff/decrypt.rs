//! BIFF8 RC4 and RC4 CryptoAPI workbook-stream decryption.
//!
//! Both schemes share the same stream layout: the RC4 keystream is indexed by the absolute
//! offset within the workbook stream and re-keyed every 1024 bytes with a per-block key. Record
//! headers are stored in plaintext but still consume keystream, and a handful of records are
//! never encrypted at all.

use md5::Md5;
use sha1::{Digest as _, Sha1};
use zeroize::Zeroizing;

use super::filepass::{CryptoApiFilePass, FilePass, Rc4FilePass};
use super::records::{
    self, BiffRecordIter, RECORD_BOF_BIFF5, RECORD_BOF_BIFF8, RECORD_BOUNDSHEET,
    RECORD_FILELOCK, RECORD_FILEPASS, RECORD_INTERFACEHDR, RECORD_RRDHEAD, RECORD_RRDINFO,
    RECORD_USREXCL,
};
use crate::ct::ct_eq;
use crate::rc4::Rc4;
use crate::XlsError;

const PAYLOAD_BLOCK_SIZE: usize = 1024;

// CryptoAPI ALG_ID values.
const CALG_RC4: u32 = 0x0000_6801;
const CALG_MD5: u32 = 0x0000_8003;
const CALG_SHA1: u32 = 0x0000_8004;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CryptoApiHash {
    Sha1,
    Md5,
}

impl CryptoApiHash {
    fn from_alg_id_hash(alg_id_hash: u32) -> Result<Self, XlsError> {
        match alg_id_hash {
            0 | CALG_SHA1 => Ok(Self::Sha1),
            CALG_MD5 => Ok(Self::Md5),
            other => Err(XlsError::UnsupportedEncryption(format!(
                "unsupported CryptoAPI AlgIDHash=0x{other:08X}"
            ))),
        }
    }

    fn digest(self, chunks: &[&[u8]]) -> Zeroizing<Vec<u8>> {
        let out = match self {
            Self::Sha1 => {
                let mut h = Sha1::new();
                for chunk in chunks {
                    h.update(chunk);
                }
                h.finalize().to_vec()
            }
            Self::Md5 => {
                let mut h = Md5::new();
                for chunk in chunks {
                    h.update(chunk);
                }
                h.finalize().to_vec()
            }
        };
        Zeroizing::new(out)
    }
}

fn utf16le_bytes(password: &str) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(
        password
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect(),
    )
}

/// Per-block RC4 key material derived from the password.
enum BlockKeys {
    /// `MD5(h1[..5] || LE32(block))`, full 16-byte digest.
    Rc4 { truncated_h1: Zeroizing<Vec<u8>> },
    /// `Hash(h0 || LE32(block))[..key_len]`, 40-bit keys padded to 16 bytes with zeros.
    CryptoApi {
        hash: CryptoApiHash,
        h0: Zeroizing<Vec<u8>>,
        key_len: usize,
    },
}

impl BlockKeys {
    fn rc4(password: &str, salt: &[u8; 16]) -> Self {
        let pw = utf16le_bytes(password);
        let h0 = CryptoApiHash::Md5.digest(&[&pw]);
        let mut buf = Zeroizing::new(Vec::with_capacity(16 * 21));
        for _ in 0..16 {
            buf.extend_from_slice(&h0[..5]);
            buf.extend_from_slice(salt);
        }
        let h1 = CryptoApiHash::Md5.digest(&[&buf]);
        Self::Rc4 {
            truncated_h1: Zeroizing::new(h1[..5].to_vec()),
        }
    }

    fn cryptoapi(password: &str, info: &CryptoApiFilePass) -> Result<Self, XlsError> {
        if info.header.alg_id != 0 && info.header.alg_id != CALG_RC4 {
            return Err(XlsError::UnsupportedEncryption(format!(
                "unsupported CryptoAPI AlgID=0x{:08X}",
                info.header.alg_id
            )));
        }
        let hash = CryptoApiHash::from_alg_id_hash(info.header.alg_id_hash)?;

        // KeySize 0 means 40-bit RC4.
        let key_bits = match info.header.key_size_bits {
            0 => 40,
            bits => bits,
        };
        let digest_bits = match hash {
            CryptoApiHash::Sha1 => 160,
            CryptoApiHash::Md5 => 128,
        };
        if key_bits < 40 || key_bits % 8 != 0 || key_bits > digest_bits.min(128) {
            return Err(XlsError::InvalidFilePass(format!(
                "unsupported CryptoAPI RC4 key size {key_bits} bits"
            )));
        }

        let pw = utf16le_bytes(password);
        let h0 = hash.digest(&[&info.salt, &pw]);
        Ok(Self::CryptoApi {
            hash,
            h0,
            key_len: key_bits as usize / 8,
        })
    }

    fn block_key(&self, block: u32) -> Zeroizing<Vec<u8>> {
        let block_bytes = block.to_le_bytes();
        match self {
            Self::Rc4 { truncated_h1 } => {
                CryptoApiHash::Md5.digest(&[truncated_h1.as_slice(), &block_bytes])
            }
            Self::CryptoApi { hash, h0, key_len } => {
                let digest = hash.digest(&[h0.as_slice(), &block_bytes]);
                let mut key = Zeroizing::new(digest[..*key_len].to_vec());
                if *key_len == 5 {
                    key.resize(16, 0);
                }
                key
            }
        }
    }

    fn verifier_hash(&self, verifier: &[u8]) -> Zeroizing<Vec<u8>> {
        match self {
            Self::Rc4 { .. } => CryptoApiHash::Md5.digest(&[verifier]),
            Self::CryptoApi { hash, .. } => hash.digest(&[verifier]),
        }
    }
}

/// Decrypt the verifier and its hash with one block-0 keystream and compare.
fn verify_password(
    keys: &BlockKeys,
    encrypted_verifier: &[u8; 16],
    encrypted_verifier_hash: &[u8],
) -> Result<(), XlsError> {
    let key = keys.block_key(0);
    let mut rc4 = Rc4::new(&key);

    let mut verifier = Zeroizing::new(*encrypted_verifier);
    rc4.apply_keystream(&mut verifier[..]);
    let mut verifier_hash = Zeroizing::new(encrypted_verifier_hash.to_vec());
    rc4.apply_keystream(&mut verifier_hash);

    let expected = keys.verifier_hash(&verifier[..]);
    match verifier_hash.get(..expected.len()) {
        Some(actual) if ct_eq(&expected, actual) => Ok(()),
        _ => Err(XlsError::WrongPassword),
    }
}

/// Keystream positioned by absolute stream offset.
struct PayloadCipher<'k> {
    keys: &'k BlockKeys,
    block: u32,
    pos: usize,
    rc4: Option<Rc4>,
}

impl<'k> PayloadCipher<'k> {
    fn new(keys: &'k BlockKeys) -> Self {
        Self {
            keys,
            block: 0,
            pos: 0,
            rc4: None,
        }
    }

    fn apply_at(&mut self, mut offset: usize, mut data: &mut [u8]) -> Result<(), XlsError> {
        while !data.is_empty() {
            let block = u32::try_from(offset / PAYLOAD_BLOCK_SIZE).map_err(|_| {
                XlsError::InvalidFilePass("workbook stream exceeds RC4 block counter".to_string())
            })?;
            let block_start = block as usize * PAYLOAD_BLOCK_SIZE;

            let stale = self.rc4.is_none() || block != self.block || offset < self.pos;
            if stale {
                let key = self.keys.block_key(block);
                self.rc4 = Some(Rc4::new(&key));
                self.block = block;
                self.pos = block_start;
            }
            let Some(rc4) = self.rc4.as_mut() else {
                break;
            };
            rc4.discard(offset - self.pos);

            let take = data.len().min(block_start + PAYLOAD_BLOCK_SIZE - offset);
            let (head, tail) = std::mem::take(&mut data).split_at_mut(take);
            rc4.apply_keystream(head);
            offset += take;
            self.pos = offset;
            data = tail;
        }
        Ok(())
    }
}

fn is_never_encrypted_record(record_id: u16) -> bool {
    matches!(
        record_id,
        RECORD_BOF_BIFF8
            | RECORD_BOF_BIFF5
            | RECORD_FILEPASS
            | RECORD_USREXCL
            | RECORD_FILELOCK
            | RECORD_INTERFACEHDR
            | RECORD_RRDINFO
            | RECORD_RRDHEAD
    )
}

/// Byte ranges holding ciphertext for every record from `start` to the end of the stream.
fn encrypted_ranges(stream: &[u8], start: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    for record in BiffRecordIter::from_offset(stream, start) {
        let record = match record {
            Ok(record) => record,
            Err(message) => {
                log::debug!("stopping record walk: {message}");
                break;
            }
        };
        if is_never_encrypted_record(record.record_id) {
            continue;
        }
        let begin = if record.record_id == RECORD_BOUNDSHEET {
            record.data_offset() + 4
        } else {
            record.data_offset()
        };
        if begin < record.end_offset() {
            ranges.push((begin, record.end_offset()));
        }
    }
    ranges
}

/// Decrypt a BIFF8 workbook stream in place and mask its `FILEPASS` record id.
pub(crate) fn decrypt_workbook_stream(stream: &mut [u8], password: &str) -> Result<(), XlsError> {
    let version = super::detect_biff_version(stream).ok_or(XlsError::NotBiff)?;
    let filepass = records::find_workbook_globals_filepass(stream).ok_or(XlsError::NotEncrypted)?;
    if version != super::BiffVersion::Biff8 {
        return Err(XlsError::UnsupportedEncryption(
            "BIFF5 workbook encryption".to_string(),
        ));
    }
    let encrypted_start = filepass.end_offset();
    let parsed = super::filepass::parse_filepass(filepass.data)?;
    log::debug!(
        "FILEPASS at offset {}: {}",
        filepass.offset,
        parsed.scheme_name()
    );

    let keys = match &parsed {
        FilePass::Xor { .. } => {
            return Err(XlsError::UnsupportedEncryption(
                parsed.scheme_name().to_string(),
            ))
        }
        FilePass::Rc4(Rc4FilePass {
            salt,
            encrypted_verifier,
            encrypted_verifier_hash,
        }) => {
            let keys = BlockKeys::rc4(password, salt);
            verify_password(&keys, encrypted_verifier, encrypted_verifier_hash)?;
            keys
        }
        FilePass::CryptoApi(info) => {
            let keys = BlockKeys::cryptoapi(password, info)?;
            verify_password(&keys, &info.encrypted_verifier, &info.encrypted_verifier_hash)?;
            keys
        }
    };

    let ranges = encrypted_ranges(stream, encrypted_start);
    let mut cipher = PayloadCipher::new(&keys);
    for (begin, end) in ranges {
        cipher.apply_at(begin, &mut stream[begin..end])?;
    }

    records::mask_workbook_globals_filepass_record_id_in_place(stream);
    Ok(())
}
