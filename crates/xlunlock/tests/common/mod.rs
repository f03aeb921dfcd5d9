#![allow(dead_code)]

#[path = "../../../xlunlock-xls/tests/common/xls_fixture_builder.rs"]
pub mod xls_fixture_builder;
pub mod xlsx_fixture_builder;

use std::fs;
use std::path::{Path, PathBuf};

/// Sorted file names in `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write fixture");
    path
}
