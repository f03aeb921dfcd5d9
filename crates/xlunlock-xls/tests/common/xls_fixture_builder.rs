#![allow(dead_code)]

use std::io::{Cursor, Read, Write};

use md5::Md5;
use rc4::{consts::U16, KeyInit, Rc4, StreamCipher};
use sha1::{Digest as _, Sha1};

// Just enough BIFF8 to exercise FILEPASS detection and RC4 payload decryption: a workbook
// globals substream and one worksheet substream spanning several 1024-byte RC4 blocks.
const RECORD_BOF: u16 = 0x0809;
const RECORD_EOF: u16 = 0x000A;
const RECORD_FILEPASS: u16 = 0x002F;
const RECORD_INTERFACEHDR: u16 = 0x00E1;
const RECORD_CODEPAGE: u16 = 0x0042;
const RECORD_WINDOW1: u16 = 0x003D;
const RECORD_BOUNDSHEET: u16 = 0x0085;
const RECORD_DIMENSIONS: u16 = 0x0200;
const RECORD_NUMBER: u16 = 0x0203;

const BOF_VERSION_BIFF8: u16 = 0x0600;
const BOF_DT_WORKBOOK_GLOBALS: u16 = 0x0005;
const BOF_DT_WORKSHEET: u16 = 0x0010;

const CALG_RC4: u32 = 0x0000_6801;
const CALG_SHA1: u32 = 0x0000_8004;

const NUMBER_CELLS: u16 = 240;
const VERIFIER: [u8; 16] = *b"xlunlock-verify!";

pub const SUMMARY_STREAM: &str = "\u{5}SummaryInformation";
pub const SUMMARY_BYTES: &[u8] = b"summary information stays untouched";

/// A generated encrypted `.xls` and the workbook stream a correct decryptor must produce.
pub struct EncryptedXlsFixture {
    pub xls: Vec<u8>,
    pub encrypted_stream: Vec<u8>,
    /// Plaintext stream with the `FILEPASS` record id masked to `0xFFFF`.
    pub expected_decrypted_stream: Vec<u8>,
}

/// Unencrypted BIFF8 `.xls` with one worksheet.
pub fn build_plain_xls() -> Vec<u8> {
    build_cfb(&build_workbook_stream(None))
}

/// `.xls` whose `Workbook` stream does not start with a BOF record.
pub fn build_non_biff_xls() -> Vec<u8> {
    build_cfb(b"\x42\x00\x02\x00\xE4\x04 this is not a BIFF workbook stream")
}

/// Compound file without any workbook stream.
pub fn build_cfb_without_workbook() -> Vec<u8> {
    let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new())).expect("create cfb");
    ole.create_stream("Other")
        .expect("Other stream")
        .write_all(b"nothing to see")
        .expect("write Other");
    ole.into_inner().into_inner()
}

/// BIFF8 `.xls` carrying an XOR-obfuscation `FILEPASS`.
pub fn build_xor_obfuscated_xls() -> Vec<u8> {
    let filepass = [0x00, 0x00, 0x34, 0x12, 0x78, 0x56];
    build_cfb(&build_workbook_stream(Some(&filepass)))
}

/// BIFF8 RC4 (Office 97/2000) encrypted `.xls`.
pub fn build_rc4_encrypted_xls(password: &str) -> EncryptedXlsFixture {
    let salt: [u8; 16] = std::array::from_fn(|i| (i as u8).wrapping_mul(17).wrapping_add(3));
    let keys = BlockKeys::Rc4 {
        password: password.to_string(),
        salt,
    };

    let mut verifier_block = VERIFIER.to_vec();
    verifier_block.extend_from_slice(&Md5::digest(VERIFIER));
    let mut rc4 = keys.cipher(0);
    rc4.apply_keystream(&mut verifier_block);

    let mut filepass = vec![0x01, 0x00, 0x01, 0x00, 0x01, 0x00];
    filepass.extend_from_slice(&salt);
    filepass.extend_from_slice(&verifier_block);
    encrypt_fixture(&filepass, &keys)
}

/// BIFF8 RC4 CryptoAPI encrypted `.xls` using SHA-1 and a `key_bits`-bit key (40 or 128).
pub fn build_cryptoapi_encrypted_xls(password: &str, key_bits: u32) -> EncryptedXlsFixture {
    let salt: [u8; 16] = std::array::from_fn(|i| 0xA0 ^ (i as u8));
    let keys = BlockKeys::CryptoApi {
        password: password.to_string(),
        salt,
        key_bits,
    };

    let mut verifier_block = VERIFIER.to_vec();
    verifier_block.extend_from_slice(&Sha1::digest(VERIFIER));
    let mut rc4 = keys.cipher(0);
    rc4.apply_keystream(&mut verifier_block);

    let csp: Vec<u8> = "Microsoft Base Cryptographic Provider v1.0\0"
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    let mut header = Vec::new();
    for field in [0x04u32, 0, CALG_RC4, CALG_SHA1, key_bits, 1, 0, 0] {
        header.extend_from_slice(&field.to_le_bytes());
    }
    header.extend_from_slice(&csp);

    let mut filepass = vec![0x01, 0x00, 0x02, 0x00, 0x02, 0x00];
    filepass.extend_from_slice(&0x04u32.to_le_bytes());
    filepass.extend_from_slice(&(header.len() as u32).to_le_bytes());
    filepass.extend_from_slice(&header);
    filepass.extend_from_slice(&16u32.to_le_bytes());
    filepass.extend_from_slice(&salt);
    filepass.extend_from_slice(&verifier_block[..16]);
    filepass.extend_from_slice(&20u32.to_le_bytes());
    filepass.extend_from_slice(&verifier_block[16..]);
    encrypt_fixture(&filepass, &keys)
}

pub fn read_stream(xls: &[u8], name: &str) -> Vec<u8> {
    let mut ole = cfb::CompoundFile::open(Cursor::new(xls)).expect("open cfb");
    let mut stream = ole.open_stream(name).expect("open stream");
    let mut out = Vec::new();
    stream.read_to_end(&mut out).expect("read stream");
    out
}

pub fn read_workbook_stream(xls: &[u8]) -> Vec<u8> {
    read_stream(xls, "/Workbook")
}

enum BlockKeys {
    Rc4 {
        password: String,
        salt: [u8; 16],
    },
    CryptoApi {
        password: String,
        salt: [u8; 16],
        key_bits: u32,
    },
}

fn utf16le(password: &str) -> Vec<u8> {
    password
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

impl BlockKeys {
    fn key(&self, block: u32) -> [u8; 16] {
        match self {
            BlockKeys::Rc4 { password, salt } => {
                let h0 = Md5::digest(utf16le(password));
                let mut buf = Vec::new();
                for _ in 0..16 {
                    buf.extend_from_slice(&h0[..5]);
                    buf.extend_from_slice(salt);
                }
                let h1 = Md5::digest(&buf);
                let mut md5 = Md5::new();
                md5.update(&h1[..5]);
                md5.update(block.to_le_bytes());
                md5.finalize().into()
            }
            BlockKeys::CryptoApi {
                password,
                salt,
                key_bits,
            } => {
                let mut sha1 = Sha1::new();
                sha1.update(salt);
                sha1.update(utf16le(password));
                let h0 = sha1.finalize();
                let mut sha1 = Sha1::new();
                sha1.update(h0);
                sha1.update(block.to_le_bytes());
                let digest = sha1.finalize();

                // 40-bit keys keep 5 digest bytes followed by 11 zero bytes.
                let key_len = (*key_bits as usize / 8).min(16);
                let mut key = [0u8; 16];
                key[..key_len].copy_from_slice(&digest[..key_len]);
                key
            }
        }
    }

    fn cipher(&self, block: u32) -> Rc4<U16> {
        Rc4::<U16>::new_from_slice(&self.key(block)).expect("16-byte RC4 key")
    }

    /// Keystream for absolute stream offsets `0..len`.
    fn keystream(&self, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        for (block, chunk) in out.chunks_mut(1024).enumerate() {
            self.cipher(block as u32).apply_keystream(chunk);
        }
        out
    }
}

fn encrypt_fixture(filepass: &[u8], keys: &BlockKeys) -> EncryptedXlsFixture {
    let plain = build_workbook_stream(Some(filepass));
    let keystream = keys.keystream(plain.len());

    let mut encrypted = plain.clone();
    let mut expected = plain;
    let mut offset = 0usize;
    let mut after_filepass = false;
    while offset + 4 <= encrypted.len() {
        let id = u16::from_le_bytes([encrypted[offset], encrypted[offset + 1]]);
        let len = u16::from_le_bytes([encrypted[offset + 2], encrypted[offset + 3]]) as usize;
        let data = offset + 4;
        if id == RECORD_FILEPASS {
            expected[offset..offset + 2].copy_from_slice(&0xFFFFu16.to_le_bytes());
            after_filepass = true;
        } else if after_filepass && !matches!(id, RECORD_BOF | RECORD_INTERFACEHDR) {
            let skip = if id == RECORD_BOUNDSHEET { 4 } else { 0 };
            for pos in data + skip.min(len)..data + len {
                encrypted[pos] ^= keystream[pos];
            }
        }
        offset = data + len;
    }

    EncryptedXlsFixture {
        xls: build_cfb(&encrypted),
        encrypted_stream: encrypted,
        expected_decrypted_stream: expected,
    }
}

fn build_cfb(workbook_stream: &[u8]) -> Vec<u8> {
    let cursor = Cursor::new(Vec::new());
    let mut ole = cfb::CompoundFile::create(cursor).expect("create cfb");
    {
        let mut stream = ole.create_stream("Workbook").expect("Workbook stream");
        stream
            .write_all(workbook_stream)
            .expect("write Workbook stream");
    }
    {
        let mut stream = ole.create_stream(SUMMARY_STREAM).expect("summary stream");
        stream.write_all(SUMMARY_BYTES).expect("write summary stream");
    }
    ole.into_inner().into_inner()
}

/// Workbook stream with an optional `FILEPASS` payload placed right after the globals BOF.
fn build_workbook_stream(filepass: Option<&[u8]>) -> Vec<u8> {
    let mut globals = Vec::<u8>::new();
    push_record(&mut globals, RECORD_BOF, &bof(BOF_DT_WORKBOOK_GLOBALS));
    if let Some(filepass) = filepass {
        push_record(&mut globals, RECORD_FILEPASS, filepass);
    }
    push_record(&mut globals, RECORD_INTERFACEHDR, &0x04B0u16.to_le_bytes());
    push_record(&mut globals, RECORD_CODEPAGE, &0x04E4u16.to_le_bytes());
    push_record(&mut globals, RECORD_WINDOW1, &window1());

    let boundsheet_start = globals.len();
    let mut boundsheet = Vec::<u8>::new();
    boundsheet.extend_from_slice(&0u32.to_le_bytes()); // placeholder lbPlyPos
    boundsheet.extend_from_slice(&0u16.to_le_bytes()); // visible worksheet
    write_short_unicode_string(&mut boundsheet, "Secrets");
    push_record(&mut globals, RECORD_BOUNDSHEET, &boundsheet);
    let boundsheet_offset_pos = boundsheet_start + 4;
    push_record(&mut globals, RECORD_EOF, &[]);

    let sheet_offset = globals.len() as u32;
    globals[boundsheet_offset_pos..boundsheet_offset_pos + 4]
        .copy_from_slice(&sheet_offset.to_le_bytes());

    let mut sheet = Vec::<u8>::new();
    push_record(&mut sheet, RECORD_BOF, &bof(BOF_DT_WORKSHEET));
    let mut dimensions = Vec::new();
    dimensions.extend_from_slice(&0u32.to_le_bytes());
    dimensions.extend_from_slice(&(NUMBER_CELLS as u32).to_le_bytes());
    dimensions.extend_from_slice(&0u16.to_le_bytes());
    dimensions.extend_from_slice(&1u16.to_le_bytes());
    dimensions.extend_from_slice(&0u16.to_le_bytes());
    push_record(&mut sheet, RECORD_DIMENSIONS, &dimensions);
    for row in 0..NUMBER_CELLS {
        let mut number = Vec::new();
        number.extend_from_slice(&row.to_le_bytes());
        number.extend_from_slice(&0u16.to_le_bytes()); // col
        number.extend_from_slice(&15u16.to_le_bytes()); // ixfe
        number.extend_from_slice(&(f64::from(row) * 1.5).to_le_bytes());
        push_record(&mut sheet, RECORD_NUMBER, &number);
    }
    push_record(&mut sheet, RECORD_EOF, &[]);

    globals.extend_from_slice(&sheet);
    globals
}

fn push_record(out: &mut Vec<u8>, id: u16, data: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
}

fn bof(dt: u16) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0..2].copy_from_slice(&BOF_VERSION_BIFF8.to_le_bytes());
    out[2..4].copy_from_slice(&dt.to_le_bytes());
    out[4..6].copy_from_slice(&0x0DBBu16.to_le_bytes()); // build
    out[6..8].copy_from_slice(&0x07CCu16.to_le_bytes()); // year
    out
}

fn window1() -> [u8; 18] {
    let mut out = [0u8; 18];
    out[14..16].copy_from_slice(&1u16.to_le_bytes()); // cTabSel
    out[16..18].copy_from_slice(&600u16.to_le_bytes()); // wTabRatio
    out
}

fn write_short_unicode_string(out: &mut Vec<u8>, s: &str) {
    out.push(s.len() as u8);
    out.push(0); // compressed 8-bit characters
    out.extend_from_slice(s.as_bytes());
}
