//! Hash, AES and HMAC primitives shared by the Agile and Standard decryptors.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use zeroize::Zeroizing;

use crate::OffcryptoError;

const AES_BLOCK_LEN: usize = 16;

/// Hash algorithms that may appear in an Agile `EncryptionInfo` descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub(crate) fn parse_offcrypto_name(name: &str) -> Result<Self, OffcryptoError> {
        match name.trim().to_ascii_uppercase().as_str() {
            "SHA1" | "SHA-1" => Ok(HashAlgorithm::Sha1),
            "SHA256" | "SHA-256" => Ok(HashAlgorithm::Sha256),
            "SHA384" | "SHA-384" => Ok(HashAlgorithm::Sha384),
            "SHA512" | "SHA-512" => Ok(HashAlgorithm::Sha512),
            _ => Err(OffcryptoError::InvalidEncryptionInfo {
                context: "unsupported hashAlgorithm",
            }),
        }
    }

    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        self.digest_chunks(&[data])
    }

    /// `Hash(chunks[0] || chunks[1] || ...)` without concatenating the inputs first.
    pub(crate) fn digest_chunks(self, chunks: &[&[u8]]) -> Vec<u8> {
        fn run<D: sha2::Digest>(chunks: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for chunk in chunks {
                hasher.update(chunk);
            }
            hasher.finalize().to_vec()
        }

        match self {
            HashAlgorithm::Sha1 => run::<sha1::Sha1>(chunks),
            HashAlgorithm::Sha256 => run::<sha2::Sha256>(chunks),
            HashAlgorithm::Sha384 => run::<sha2::Sha384>(chunks),
            HashAlgorithm::Sha512 => run::<sha2::Sha512>(chunks),
        }
    }

    pub(crate) fn hmac(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, OffcryptoError> {
        let invalid_key = |_| OffcryptoError::InvalidEncryptionInfo {
            context: "invalid HMAC key",
        };
        let out = match self {
            HashAlgorithm::Sha1 => {
                let mut mac = <Hmac<sha1::Sha1> as Mac>::new_from_slice(key).map_err(invalid_key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            HashAlgorithm::Sha256 => {
                let mut mac =
                    <Hmac<sha2::Sha256> as Mac>::new_from_slice(key).map_err(invalid_key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            HashAlgorithm::Sha384 => {
                let mut mac =
                    <Hmac<sha2::Sha384> as Mac>::new_from_slice(key).map_err(invalid_key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            HashAlgorithm::Sha512 => {
                let mut mac =
                    <Hmac<sha2::Sha512> as Mac>::new_from_slice(key).map_err(invalid_key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        };
        Ok(out)
    }
}

/// Truncate `digest` to `len` bytes, or pad it with `0x36` up to `len`.
fn fit_to_len(mut digest: Vec<u8>, len: usize) -> Vec<u8> {
    digest.resize(len, 0x36);
    digest
}

/// Agile key derivation: `Hash(H || blockKey)` fitted to `keyBits / 8`.
pub(crate) fn derive_encryption_key(
    h: &[u8],
    block_key: &[u8],
    hash_alg: HashAlgorithm,
    key_bits: usize,
) -> Result<Zeroizing<Vec<u8>>, OffcryptoError> {
    if key_bits == 0 || key_bits % 8 != 0 {
        return Err(OffcryptoError::InvalidEncryptionInfo {
            context: "keyBits is not a positive multiple of 8",
        });
    }
    let digest = Zeroizing::new(hash_alg.digest_chunks(&[h, block_key]));
    Ok(Zeroizing::new(fit_to_len(digest.to_vec(), key_bits / 8)))
}

/// Agile IV derivation: `Hash(salt || blockKey)` fitted to the cipher block size.
pub(crate) fn derive_iv(
    hash_alg: HashAlgorithm,
    salt: &[u8],
    block_key: &[u8],
    block_size: usize,
) -> Vec<u8> {
    fit_to_len(hash_alg.digest_chunks(&[salt, block_key]), block_size)
}

pub(crate) fn aes_cbc_decrypt(
    ciphertext: &[u8],
    key: &[u8],
    iv: &[u8],
) -> Result<Vec<u8>, OffcryptoError> {
    if ciphertext.len() % AES_BLOCK_LEN != 0 {
        return Err(OffcryptoError::InvalidCiphertextLength {
            len: ciphertext.len(),
        });
    }
    let iv = iv
        .get(..AES_BLOCK_LEN)
        .ok_or(OffcryptoError::InvalidEncryptionInfo {
            context: "IV shorter than the AES block size",
        })?;

    let len = ciphertext.len();
    let mut buf = ciphertext.to_vec();
    let bad_key = |_| OffcryptoError::InvalidKeyLength { len: key.len() };
    let bad_len = |_| OffcryptoError::InvalidCiphertextLength { len };
    match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(bad_key)?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(bad_len)?,
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(bad_key)?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(bad_len)?,
        32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(bad_key)?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(bad_len)?,
        other => return Err(OffcryptoError::InvalidKeyLength { len: other }),
    };
    Ok(buf)
}

pub(crate) fn aes_ecb_decrypt_in_place(key: &[u8], buf: &mut [u8]) -> Result<(), OffcryptoError> {
    if buf.len() % AES_BLOCK_LEN != 0 {
        return Err(OffcryptoError::InvalidCiphertextLength { len: buf.len() });
    }

    fn decrypt_with<C>(key: &[u8], buf: &mut [u8]) -> Result<(), OffcryptoError>
    where
        C: BlockDecrypt + KeyInit,
    {
        let cipher = C::new_from_slice(key)
            .map_err(|_| OffcryptoError::InvalidKeyLength { len: key.len() })?;
        for block in buf.chunks_mut(AES_BLOCK_LEN) {
            cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }

    match key.len() {
        16 => decrypt_with::<Aes128>(key, buf),
        24 => decrypt_with::<Aes192>(key, buf),
        32 => decrypt_with::<Aes256>(key, buf),
        len => Err(OffcryptoError::InvalidKeyLength { len }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use aes::cipher::BlockEncrypt;
    use cipher::BlockEncryptMut;

    pub(crate) fn aes_cbc_encrypt(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Vec<u8> {
        assert_eq!(plaintext.len() % 16, 0, "plaintext must be block aligned");
        let mut buf = plaintext.to_vec();
        let len = buf.len();
        match key.len() {
            16 => {
                cbc::Encryptor::<Aes128>::new_from_slices(key, &iv[..16])
                    .expect("key/iv")
                    .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                    .expect("encrypt");
            }
            32 => {
                cbc::Encryptor::<Aes256>::new_from_slices(key, &iv[..16])
                    .expect("key/iv")
                    .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                    .expect("encrypt");
            }
            other => panic!("unsupported test key length {other}"),
        }
        buf
    }

    pub(crate) fn aes_ecb_encrypt(plaintext: &[u8], key: &[u8]) -> Vec<u8> {
        assert_eq!(plaintext.len() % 16, 0, "plaintext must be block aligned");
        let cipher = Aes128::new_from_slice(key).expect("aes-128 key");
        let mut buf = plaintext.to_vec();
        for block in buf.chunks_mut(16) {
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        buf
    }

    #[test]
    fn derived_keys_are_truncated_or_padded_with_0x36() {
        let h = [0u8; 20];
        let block = [1u8; 8];
        let short = derive_encryption_key(&h, &block, HashAlgorithm::Sha1, 128).expect("128");
        assert_eq!(short.len(), 16);
        assert_eq!(&short[..], &HashAlgorithm::Sha1.digest_chunks(&[&h, &block])[..16]);

        let long = derive_encryption_key(&h, &block, HashAlgorithm::Sha1, 256).expect("256");
        assert_eq!(long.len(), 32);
        assert!(long[20..].iter().all(|b| *b == 0x36));
    }

    #[test]
    fn rejects_key_bits_not_divisible_by_eight() {
        assert!(derive_encryption_key(&[0; 20], &[0; 8], HashAlgorithm::Sha1, 7).is_err());
        assert!(derive_encryption_key(&[0; 20], &[0; 8], HashAlgorithm::Sha1, 0).is_err());
    }

    #[test]
    fn iv_is_fitted_to_block_size() {
        let iv = derive_iv(HashAlgorithm::Sha512, b"salt", &0u32.to_le_bytes(), 16);
        assert_eq!(iv.len(), 16);
        let iv = derive_iv(HashAlgorithm::Sha1, b"salt", &0u32.to_le_bytes(), 32);
        assert_eq!(&iv[20..], &[0x36; 12]);
    }

    #[test]
    fn cbc_and_ecb_decrypt_invert_encryption() {
        let key = [7u8; 16];
        let iv = [9u8; 16];
        let plain = b"0123456789abcdef0123456789abcdef".to_vec();

        let encrypted = aes_cbc_encrypt(&plain, &key, &iv);
        assert_eq!(aes_cbc_decrypt(&encrypted, &key, &iv).expect("cbc"), plain);

        let mut ecb = aes_ecb_encrypt(&plain, &key);
        aes_ecb_decrypt_in_place(&key, &mut ecb).expect("ecb");
        assert_eq!(ecb, plain);
    }

    #[test]
    fn rejects_unaligned_ciphertext_and_bad_key_lengths() {
        assert!(matches!(
            aes_cbc_decrypt(&[0u8; 15], &[0u8; 16], &[0u8; 16]),
            Err(OffcryptoError::InvalidCiphertextLength { len: 15 })
        ));
        assert!(matches!(
            aes_cbc_decrypt(&[0u8; 16], &[0u8; 5], &[0u8; 16]),
            Err(OffcryptoError::InvalidKeyLength { len: 5 })
        ));
        let mut buf = [0u8; 16];
        assert!(matches!(
            aes_ecb_decrypt_in_place(&[0u8; 17], &mut buf),
            Err(OffcryptoError::InvalidKeyLength { len: 17 })
        ));
    }

    #[test]
    fn hmac_output_has_digest_length() {
        for alg in [
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            let out = alg.hmac(b"key", b"data").expect("hmac");
            assert_eq!(out.len(), alg.digest_len());
        }
    }
}
