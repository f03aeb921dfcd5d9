//! Legacy `.xls` (BIFF8) read-password support.
//!
//! An encrypted `.xls` is an ordinary OLE compound file whose `Workbook` stream carries a
//! `FILEPASS` record in the workbook globals. Everything after `FILEPASS` is RC4-encrypted
//! except the record headers. This crate can:
//! - probe a file for `FILEPASS` ([`probe_xls_bytes`])
//! - decrypt a workbook stream in place ([`decrypt_workbook_stream`])
//! - produce a decrypted copy of a whole `.xls` file ([`decrypt_xls_bytes`])
//!
//! Supported schemes are BIFF8 RC4 and RC4 CryptoAPI. XOR obfuscation and BIFF5 are reported as
//! [`XlsError::UnsupportedEncryption`].

use std::io::{Cursor, Seek, SeekFrom, Write};

mod biff;
mod ct;
mod error;
mod rc4;

pub use biff::filepass::{
    parse_filepass, CryptoApiFilePass, CryptoApiHeader, FilePass, Rc4FilePass,
};
pub use error::XlsError;

/// Result of probing a `.xls` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XlsEncryption {
    NotEncrypted,
    Encrypted(FilePass),
}

fn open_container(bytes: &[u8]) -> Result<cfb::CompoundFile<Cursor<&[u8]>>, XlsError> {
    cfb::CompoundFile::open(Cursor::new(bytes)).map_err(XlsError::Container)
}

/// Determine whether a `.xls` file is encrypted.
///
/// Fails with [`XlsError::Container`], [`XlsError::MissingWorkbookStream`] or
/// [`XlsError::NotBiff`] when the bytes are not a BIFF workbook at all. A `FILEPASS` record with
/// an unreadable or unknown payload is reported as [`XlsError::InvalidFilePass`] /
/// [`XlsError::UnsupportedEncryption`].
pub fn probe_xls_bytes(bytes: &[u8]) -> Result<XlsEncryption, XlsError> {
    let mut comp = open_container(bytes)?;
    let (name, stream) = biff::read_workbook_stream(&mut comp)?;
    biff::detect_biff_version(&stream).ok_or(XlsError::NotBiff)?;

    match biff::records::find_workbook_globals_filepass(&stream) {
        Some(record) => {
            log::debug!("{name}: FILEPASS record at offset {}", record.offset);
            Ok(XlsEncryption::Encrypted(parse_filepass(record.data)?))
        }
        None => Ok(XlsEncryption::NotEncrypted),
    }
}

/// Decrypt a BIFF8 workbook stream in place.
///
/// On success every encrypted record payload is plaintext and the `FILEPASS` record id is
/// replaced with `0xFFFF`, so the stream reads as unencrypted while keeping every record offset.
/// The buffer is left untouched on error.
pub fn decrypt_workbook_stream(stream: &mut [u8], password: &str) -> Result<(), XlsError> {
    biff::decrypt::decrypt_workbook_stream(stream, password)
}

/// Decrypt an encrypted `.xls` file and return the bytes of the decrypted compound file.
///
/// Only the workbook stream changes; every other storage and stream is kept as-is.
pub fn decrypt_xls_bytes(bytes: &[u8], password: &str) -> Result<Vec<u8>, XlsError> {
    let (name, mut stream) = {
        let mut comp = open_container(bytes)?;
        biff::read_workbook_stream(&mut comp)?
    };
    decrypt_workbook_stream(&mut stream, password)?;

    // Decryption never changes the stream length, so the stream is overwritten in place.
    let mut comp = cfb::CompoundFile::open(Cursor::new(bytes.to_vec())).map_err(XlsError::Container)?;
    {
        let mut out = comp.open_stream(name)?;
        out.seek(SeekFrom::Start(0))?;
        out.write_all(&stream)?;
        out.flush()?;
    }
    comp.flush()?;
    Ok(comp.into_inner().into_inner())
}
