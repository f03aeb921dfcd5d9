use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::ProtectionError;

pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";

/// A worksheet listed in `xl/workbook.xml` together with its resolved part name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SheetPart {
    pub name: String,
    pub part: String,
}

pub(crate) fn open_archive(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, ProtectionError> {
    Ok(ZipArchive::new(Cursor::new(bytes))?)
}

pub(crate) fn read_part<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, ProtectionError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(ProtectionError::MissingPart(name.to_string()));
        }
        Err(err) => return Err(err.into()),
    };
    let mut out = Vec::new();
    file.read_to_end(&mut out)?;
    Ok(out)
}

/// Worksheets in workbook order, with part names resolved through the workbook relationships.
pub(crate) fn sheet_parts<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Vec<SheetPart>, ProtectionError> {
    let workbook_xml = read_part(archive, WORKBOOK_PART)?;
    let rels_xml = read_part(archive, WORKBOOK_RELS_PART)?;
    let targets = relationship_targets(&rels_xml)?;

    let mut sheets = Vec::new();
    for (name, rel_id) in workbook_sheets(&workbook_xml)? {
        match targets.get(&rel_id) {
            Some(target) => sheets.push(SheetPart {
                name,
                part: resolve_target(WORKBOOK_PART, target),
            }),
            None => log::debug!("sheet `{name}` references unknown relationship `{rel_id}`"),
        }
    }
    Ok(sheets)
}

/// Copy every entry of `bytes` into a new package, replacing the contents of `part`.
///
/// Unchanged entries are raw-copied so their compressed bytes are preserved.
pub(crate) fn rewrite_part(
    bytes: &[u8],
    part: &str,
    contents: &[u8],
) -> Result<Vec<u8>, ProtectionError> {
    let mut archive = open_archive(bytes)?;
    let mut zip = ZipWriter::new(Cursor::new(Vec::with_capacity(bytes.len() + 256)));
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

    let mut found = false;
    for i in 0..archive.len() {
        let file = archive.by_index(i)?;
        if file.name() == part {
            found = true;
            zip.start_file(part, options)?;
            zip.write_all(contents)?;
        } else {
            zip.raw_copy_file(file)?;
        }
    }
    if !found {
        return Err(ProtectionError::MissingPart(part.to_string()));
    }

    Ok(zip.finish()?.into_inner())
}

fn workbook_sheets(workbook_xml: &[u8]) -> Result<Vec<(String, String)>, ProtectionError> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut out = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rel_id = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    // `r:id` is the only namespaced `id` attribute on `<sheet>`.
                    match (attr.key.prefix().is_some(), attr.key.local_name().as_ref()) {
                        (false, b"name") => name = Some(attr.unescape_value()?.into_owned()),
                        (true, b"id") => rel_id = Some(attr.unescape_value()?.into_owned()),
                        _ => {}
                    }
                }
                if let (Some(name), Some(rel_id)) = (name, rel_id) {
                    out.push((name, rel_id));
                }
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn relationship_targets(rels_xml: &[u8]) -> Result<HashMap<String, String>, ProtectionError> {
    let mut reader = Reader::from_reader(rels_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut out = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"Id" => id = Some(attr.unescape_value()?.into_owned()),
                        b"Target" => target = Some(attr.unescape_value()?.into_owned()),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    out.insert(id, target);
                }
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

pub(crate) fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or(target);
    if target.is_empty() {
        return normalize(source_part);
    }
    if let Some(target) = target.strip_prefix('/') {
        return normalize(target);
    }

    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize(&format!("{base_dir}/{target}"))
}

fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}
