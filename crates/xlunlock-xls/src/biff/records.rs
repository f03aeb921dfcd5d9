//! Physical BIFF record iteration.
//!
//! Every BIFF record starts with a plaintext 4-byte header (`record_id: u16`, `len: u16`), even in
//! encrypted workbook streams, so the record layout can always be walked without a key.

/// BIFF `EOF` record id.
pub(crate) const RECORD_EOF: u16 = 0x000A;
/// BIFF `FILEPASS` record id. Its presence in the workbook globals means the stream is encrypted.
pub(crate) const RECORD_FILEPASS: u16 = 0x002F;
/// Record id written over `FILEPASS` once the stream is decrypted. Not a defined BIFF record id.
pub(crate) const RECORD_MASKED_UNKNOWN: u16 = 0xFFFF;
/// BIFF8 `BOF` record id.
pub(crate) const RECORD_BOF_BIFF8: u16 = 0x0809;
/// BIFF5 `BOF` record id.
pub(crate) const RECORD_BOF_BIFF5: u16 = 0x0009;
/// `BoundSheet8`: the first 4 bytes (`lbPlyPos`) are stored in plaintext.
pub(crate) const RECORD_BOUNDSHEET: u16 = 0x0085;
pub(crate) const RECORD_INTERFACEHDR: u16 = 0x00E1;
pub(crate) const RECORD_RRDHEAD: u16 = 0x0138;
pub(crate) const RECORD_USREXCL: u16 = 0x0194;
pub(crate) const RECORD_FILELOCK: u16 = 0x0195;
pub(crate) const RECORD_RRDINFO: u16 = 0x0196;

pub(crate) fn is_bof_record(record_id: u16) -> bool {
    record_id == RECORD_BOF_BIFF8 || record_id == RECORD_BOF_BIFF5
}

/// One physical BIFF record.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BiffRecord<'a> {
    /// Offset of the record header within the stream.
    pub(crate) offset: usize,
    pub(crate) record_id: u16,
    pub(crate) data: &'a [u8],
}

impl BiffRecord<'_> {
    /// Offset of the first payload byte.
    pub(crate) fn data_offset(&self) -> usize {
        self.offset + 4
    }

    /// Offset just past the payload.
    pub(crate) fn end_offset(&self) -> usize {
        self.data_offset() + self.data.len()
    }
}

/// Read a single record at `offset`. Returns `None` if the header or payload is truncated.
pub(crate) fn read_biff_record(stream: &[u8], offset: usize) -> Option<(u16, &[u8])> {
    let header = stream.get(offset..offset.checked_add(4)?)?;
    let record_id = u16::from_le_bytes([header[0], header[1]]);
    let len = u16::from_le_bytes([header[2], header[3]]) as usize;
    let data_start = offset + 4;
    let data = stream.get(data_start..data_start.checked_add(len)?)?;
    Some((record_id, data))
}

/// Iterator over physical records starting at a given offset.
///
/// Yields `Err` once (and then stops) when a record header claims more bytes than the stream
/// holds.
pub(crate) struct BiffRecordIter<'a> {
    stream: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> BiffRecordIter<'a> {
    pub(crate) fn from_offset(stream: &'a [u8], offset: usize) -> Self {
        Self {
            stream,
            offset,
            done: offset >= stream.len(),
        }
    }
}

impl<'a> Iterator for BiffRecordIter<'a> {
    type Item = Result<BiffRecord<'a>, String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.offset >= self.stream.len() {
            self.done = true;
            return None;
        }

        let offset = self.offset;
        match read_biff_record(self.stream, offset) {
            Some((record_id, data)) => {
                let record = BiffRecord {
                    offset,
                    record_id,
                    data,
                };
                self.offset = record.end_offset();
                Some(Ok(record))
            }
            None => {
                self.done = true;
                Some(Err(format!(
                    "truncated BIFF record at offset {offset} (stream len={})",
                    self.stream.len()
                )))
            }
        }
    }
}

/// Locate the `FILEPASS` record in the workbook globals substream.
///
/// The scan stops at the globals `EOF`, at the next `BOF`, or at the first truncated record.
pub(crate) fn find_workbook_globals_filepass(stream: &[u8]) -> Option<BiffRecord<'_>> {
    let (first_id, _) = read_biff_record(stream, 0)?;
    if !is_bof_record(first_id) {
        return None;
    }

    for record in BiffRecordIter::from_offset(stream, 0) {
        let Ok(record) = record else {
            break;
        };
        if record.offset != 0 && is_bof_record(record.record_id) {
            break;
        }
        match record.record_id {
            RECORD_FILEPASS => return Some(record),
            RECORD_EOF => break,
            _ => {}
        }
    }
    None
}

/// Overwrite the `FILEPASS` record id in the workbook globals with [`RECORD_MASKED_UNKNOWN`].
///
/// The record length and payload are left untouched so every stream offset (for example
/// `BoundSheet8.lbPlyPos`) stays valid. Returns whether a record was masked.
pub(crate) fn mask_workbook_globals_filepass_record_id_in_place(stream: &mut [u8]) -> bool {
    let Some(offset) = find_workbook_globals_filepass(stream).map(|r| r.offset) else {
        return false;
    };
    stream[offset..offset + 2].copy_from_slice(&RECORD_MASKED_UNKNOWN.to_le_bytes());
    true
}
