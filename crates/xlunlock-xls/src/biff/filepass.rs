//! `FILEPASS` payload parsing ([MS-XLS] 2.4.117, [MS-OFFCRYPTO] 2.3.6).

use crate::XlsError;

// FILEPASS.wEncryptionType values.
const ENCRYPTION_TYPE_XOR: u16 = 0x0000;
const ENCRYPTION_TYPE_RC4: u16 = 0x0001;

/// CryptoAPI `EncryptionHeader` is 32 bytes of fixed fields plus an optional CSP name.
const MAX_ENCRYPTION_HEADER_SIZE: usize = 4096;
const MAX_VERIFIER_HASH_SIZE: usize = 32;

/// RC4 (Office 97/2000 "binary RC4") parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rc4FilePass {
    pub salt: [u8; 16],
    pub encrypted_verifier: [u8; 16],
    pub encrypted_verifier_hash: [u8; 16],
}

/// `EncryptionHeader` fields used by RC4 CryptoAPI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoApiHeader {
    pub flags: u32,
    pub alg_id: u32,
    pub alg_id_hash: u32,
    pub key_size_bits: u32,
    pub provider_type: u32,
    pub csp_name: String,
}

/// RC4 CryptoAPI (Office 2002/2003) parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoApiFilePass {
    pub version_major: u16,
    pub version_minor: u16,
    pub flags: u32,
    pub header: CryptoApiHeader,
    pub salt: [u8; 16],
    pub encrypted_verifier: [u8; 16],
    pub encrypted_verifier_hash: Vec<u8>,
}

/// Encryption scheme declared by a BIFF8 `FILEPASS` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilePass {
    /// XOR obfuscation. Recognised so it can be reported, never decrypted.
    Xor { key: u16, verifier: u16 },
    Rc4(Rc4FilePass),
    CryptoApi(CryptoApiFilePass),
}

impl FilePass {
    /// Short scheme name for logs and error messages.
    pub fn scheme_name(&self) -> &'static str {
        match self {
            FilePass::Xor { .. } => "XOR obfuscation",
            FilePass::Rc4(_) => "RC4",
            FilePass::CryptoApi(_) => "RC4 CryptoAPI",
        }
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, ctx: &str) -> Result<&'a [u8], XlsError> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(XlsError::InvalidFilePass(format!(
                "truncated FILEPASS payload while reading {ctx} at offset {} (len={})",
                self.pos,
                self.data.len()
            )));
        };
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u16(&mut self, ctx: &str) -> Result<u16, XlsError> {
        let b = self.take(2, ctx)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, ctx: &str) -> Result<u32, XlsError> {
        let b = self.take(4, ctx)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn array16(&mut self, ctx: &str) -> Result<[u8; 16], XlsError> {
        let mut out = [0u8; 16];
        out.copy_from_slice(self.take(16, ctx)?);
        Ok(out)
    }
}

/// Parse the payload of a BIFF8 `FILEPASS` record (header excluded).
pub fn parse_filepass(data: &[u8]) -> Result<FilePass, XlsError> {
    let mut c = Cursor { data, pos: 0 };
    let encryption_type = c.u16("wEncryptionType")?;
    match encryption_type {
        ENCRYPTION_TYPE_XOR => {
            let key = c.u16("key")?;
            let verifier = c.u16("verificationBytes")?;
            Ok(FilePass::Xor { key, verifier })
        }
        ENCRYPTION_TYPE_RC4 => {
            let major = c.u16("EncryptionVersionInfo.vMajor")?;
            let minor = c.u16("EncryptionVersionInfo.vMinor")?;
            match (major, minor) {
                (1, 1) => Ok(FilePass::Rc4(Rc4FilePass {
                    salt: c.array16("Salt")?,
                    encrypted_verifier: c.array16("EncryptedVerifier")?,
                    encrypted_verifier_hash: c.array16("EncryptedVerifierHash")?,
                })),
                (2..=4, 2) => parse_cryptoapi(&mut c, major, minor).map(FilePass::CryptoApi),
                _ => Err(XlsError::UnsupportedEncryption(format!(
                    "RC4 FILEPASS has unsupported EncryptionVersionInfo {major}.{minor}"
                ))),
            }
        }
        other => Err(XlsError::UnsupportedEncryption(format!(
            "FILEPASS has unsupported wEncryptionType=0x{other:04X}"
        ))),
    }
}

fn parse_cryptoapi(
    c: &mut Cursor<'_>,
    version_major: u16,
    version_minor: u16,
) -> Result<CryptoApiFilePass, XlsError> {
    let flags = c.u32("EncryptionInfo.Flags")?;
    let header_size = c.u32("EncryptionInfo.HeaderSize")? as usize;
    if !(32..=MAX_ENCRYPTION_HEADER_SIZE).contains(&header_size) {
        return Err(XlsError::InvalidFilePass(format!(
            "EncryptionHeader size {header_size} out of range"
        )));
    }

    let header_bytes = c.take(header_size, "EncryptionHeader")?;
    let mut h = Cursor {
        data: header_bytes,
        pos: 0,
    };
    let header_flags = h.u32("EncryptionHeader.Flags")?;
    let _size_extra = h.u32("EncryptionHeader.SizeExtra")?;
    let alg_id = h.u32("EncryptionHeader.AlgID")?;
    let alg_id_hash = h.u32("EncryptionHeader.AlgIDHash")?;
    let key_size_bits = h.u32("EncryptionHeader.KeySize")?;
    let provider_type = h.u32("EncryptionHeader.ProviderType")?;
    let _reserved1 = h.u32("EncryptionHeader.Reserved1")?;
    let _reserved2 = h.u32("EncryptionHeader.Reserved2")?;
    let csp_units: Vec<u16> = header_bytes[h.pos..]
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .take_while(|unit| *unit != 0)
        .collect();
    let csp_name = String::from_utf16_lossy(&csp_units);

    let salt_size = c.u32("EncryptionVerifier.SaltSize")?;
    if salt_size != 16 {
        return Err(XlsError::InvalidFilePass(format!(
            "EncryptionVerifier.SaltSize must be 16, got {salt_size}"
        )));
    }
    let salt = c.array16("EncryptionVerifier.Salt")?;
    let encrypted_verifier = c.array16("EncryptionVerifier.EncryptedVerifier")?;
    let verifier_hash_size = c.u32("EncryptionVerifier.VerifierHashSize")? as usize;
    if verifier_hash_size == 0 || verifier_hash_size > MAX_VERIFIER_HASH_SIZE {
        return Err(XlsError::InvalidFilePass(format!(
            "EncryptionVerifier.VerifierHashSize {verifier_hash_size} out of range"
        )));
    }
    let encrypted_verifier_hash = c
        .take(verifier_hash_size, "EncryptionVerifier.EncryptedVerifierHash")?
        .to_vec();

    Ok(CryptoApiFilePass {
        version_major,
        version_minor,
        flags,
        header: CryptoApiHeader {
            flags: header_flags,
            alg_id,
            alg_id_hash,
            key_size_bits,
            provider_type,
            csp_name,
        },
        salt,
        encrypted_verifier,
        encrypted_verifier_hash,
    })
}
