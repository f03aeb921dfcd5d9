//! BIFF workbook-stream helpers: locating the stream in the compound file, identifying the BIFF
//! version, and the `FILEPASS` / decryption submodules.

use std::io::{Read, Seek};

pub(crate) mod decrypt;
pub(crate) mod filepass;
pub(crate) mod records;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BiffVersion {
    Biff5,
    Biff8,
}

// BIFF version numbers stored in the BOF record payload ([MS-XLS] 2.4.21).
const BOF_VERSION_BIFF5: u16 = 0x0500;
const BOF_VERSION_BIFF8: u16 = 0x0600;

/// Stream names Excel has used for the workbook stream, in lookup order.
const WORKBOOK_STREAM_CANDIDATES: [&str; 4] = ["/Workbook", "/Book", "Workbook", "Book"];

/// Name of the workbook stream inside `comp`, if any.
pub(crate) fn find_workbook_stream<R: Read + Seek>(
    comp: &cfb::CompoundFile<R>,
) -> Option<&'static str> {
    WORKBOOK_STREAM_CANDIDATES
        .into_iter()
        .find(|name| comp.is_stream(name))
}

pub(crate) fn read_workbook_stream<R: Read + Seek>(
    comp: &mut cfb::CompoundFile<R>,
) -> Result<(&'static str, Vec<u8>), crate::XlsError> {
    let name = find_workbook_stream(comp).ok_or(crate::XlsError::MissingWorkbookStream)?;
    let mut stream = comp.open_stream(name)?;
    let mut out = Vec::new();
    stream.read_to_end(&mut out)?;
    Ok((name, out))
}

/// BIFF version from the leading `BOF` record, or `None` if the stream does not start with one.
///
/// A BIFF8 `BOF` id with an unknown version field is treated as BIFF8.
pub(crate) fn detect_biff_version(stream: &[u8]) -> Option<BiffVersion> {
    let (record_id, data) = records::read_biff_record(stream, 0)?;
    if !records::is_bof_record(record_id) {
        return None;
    }
    let version = data
        .get(0..2)
        .map(|v| u16::from_le_bytes([v[0], v[1]]))
        .unwrap_or(0);
    match version {
        BOF_VERSION_BIFF8 => Some(BiffVersion::Biff8),
        BOF_VERSION_BIFF5 => Some(BiffVersion::Biff5),
        _ if record_id == records::RECORD_BOF_BIFF5 => Some(BiffVersion::Biff5),
        _ => Some(BiffVersion::Biff8),
    }
}
