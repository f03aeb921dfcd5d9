use std::io::{Cursor, Read, Write};

use ms_offcrypto_writer::Ecma376AgileWriter;
use rand::{rngs::StdRng, SeedableRng as _};
use zip::write::FileOptions;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheets><sheet name="Sheet1" sheetId="1"/></sheets></workbook>"#;

/// Minimal unencrypted `.xlsx` package.
pub fn build_plain_xlsx() -> Vec<u8> {
    let cursor = Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(cursor);
    for (name, contents) in [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("xl/workbook.xml", WORKBOOK),
    ] {
        writer
            .start_file(name, FileOptions::<()>::default())
            .expect("start zip file");
        writer
            .write_all(contents.as_bytes())
            .expect("write zip contents");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// `plain_zip` wrapped in an Agile-encrypted OLE container.
pub fn encrypt_xlsx(plain_zip: &[u8], password: &str) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    let mut rng = StdRng::from_seed([0u8; 32]);
    let mut agile =
        Ecma376AgileWriter::create(&mut rng, password, &mut cursor).expect("create agile");
    agile.write_all(plain_zip).expect("write plaintext zip");
    agile.finalize().expect("finalize agile writer");
    cursor.into_inner()
}

/// OLE compound file with an unrelated stream and no encryption streams.
pub fn build_ole_without_encryption() -> Vec<u8> {
    let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new())).expect("create cfb");
    {
        let mut stream = ole.create_stream("/Contents").expect("create stream");
        stream.write_all(b"not a package").expect("write stream");
    }
    ole.flush().expect("flush cfb");
    ole.into_inner().into_inner()
}

pub fn read_zip_entry(xlsx: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(xlsx)).expect("open zip");
    let mut entry = archive.by_name(name).expect("zip entry");
    let mut out = String::new();
    entry.read_to_string(&mut out).expect("read entry");
    out
}
