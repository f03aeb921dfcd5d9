use thiserror::Error;

/// Errors returned while probing or decrypting an encrypted OOXML package.
#[derive(Debug, Error)]
pub enum OffcryptoError {
    /// Not enough bytes to parse the requested structure.
    #[error("truncated data while reading {context}")]
    Truncated { context: &'static str },
    /// The `EncryptionInfo` version is not Agile (4.4) or Standard (x.2).
    #[error("unsupported EncryptionInfo version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    /// Standard encryption uses an algorithm id we do not implement.
    #[error("unsupported encryption algorithm id 0x{0:08X}")]
    UnsupportedAlgorithm(u32),
    /// Agile encryption uses a cipher or chaining mode we do not implement.
    #[error("unsupported cipher: {0}")]
    UnsupportedCipher(String),
    /// The stream contents are structurally invalid (e.g. missing required attributes).
    #[error("invalid EncryptionInfo: {context}")]
    InvalidEncryptionInfo { context: &'static str },
    /// The decrypted package size from the `EncryptedPackage` header does not fit into a `Vec<u8>`.
    #[error("EncryptedPackage reported invalid original size {total_size}")]
    EncryptedPackageSizeOverflow { total_size: u64 },
    /// Failed to reserve memory for the decrypted output buffer.
    #[error("failed to allocate decrypted package buffer of size {total_size}")]
    EncryptedPackageAllocationFailed {
        total_size: u64,
        #[source]
        source: std::collections::TryReserveError,
    },
    /// Ciphertext length must be a multiple of the AES block size.
    #[error("ciphertext length must be a multiple of 16 bytes, got {len}")]
    InvalidCiphertextLength { len: usize },
    /// Invalid AES key length (expected 16, 24, or 32 bytes).
    #[error("invalid AES key length {len}; expected 16, 24, or 32 bytes")]
    InvalidKeyLength { len: usize },
    /// Password/key did not pass the verifier check.
    #[error("invalid password")]
    InvalidPassword,
    /// The `dataIntegrity` HMAC did not match the `EncryptedPackage` stream.
    #[error("integrity check failed")]
    IntegrityCheckFailed,
    /// The container or the decrypted payload is not what an encrypted OOXML file should hold.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
