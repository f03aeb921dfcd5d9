//! Directory listing, output naming and atomic writes.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

const UNLOCKED_SUFFIX: &str = "_unlocked";

fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` returns `Some("")` for bare relative file names like `foo.xlsx`.
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Snapshot of `dir`'s entries, sorted by path.
///
/// Taken before any file is processed so outputs written during the run are never visited.
pub(crate) fn list_directory(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        entries.push(entry?.path());
    }
    entries.sort();
    Ok(entries)
}

/// Whether `path` is a regular file, following symlinks. Dangling links are not.
pub(crate) fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// `<stem>_unlocked.<ext>` next to `path`.
pub fn unlocked_output_path(path: &Path) -> PathBuf {
    let mut name = OsString::new();
    if let Some(stem) = path.file_stem() {
        name.push(stem);
    }
    name.push(UNLOCKED_SUFFIX);
    if let Some(extension) = path.extension() {
        name.push(".");
        name.push(extension);
    }
    path.with_file_name(name)
}

/// Whether something (including a dangling symlink) already occupies `path`.
pub(crate) fn path_is_taken(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Write `bytes` to `dest` through a temp file in the same directory.
///
/// The temp file is flushed and synced before it is renamed into place. With `replace == false`
/// the rename fails with [`io::ErrorKind::AlreadyExists`] instead of clobbering `dest`. On any
/// error the temp file is removed and `dest` is untouched.
pub(crate) fn write_atomically(dest: &Path, bytes: &[u8], replace: bool) -> io::Result<()> {
    let dir = parent_dir_or_dot(dest);
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;

    if replace {
        tmp.persist(dest).map_err(|err| err.error)?;
    } else {
        tmp.persist_noclobber(dest).map_err(|err| err.error)?;
    }

    // Best-effort: the file is already in place.
    let _ = sync_parent_dir(dest);
    Ok(())
}

fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let dir = File::open(parent_dir_or_dot(path))?;
    dir.sync_all()
}
