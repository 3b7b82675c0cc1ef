use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::{Builder, NamedTempFile};

/// Writes `bytes` to a sibling temp file and renames it over `dest`.
///
/// Readers never observe a partially written `dest`.
pub(crate) fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = dest
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;

    let stem = dest
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut tmp = Builder::new()
        .prefix(&format!(".#{stem}"))
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("failed to write {}", tmp.path().display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("failed to sync {}", tmp.path().display()))?;

    persist_replacing(tmp, dest).with_context(|| format!("failed to replace {}", dest.display()))
}

fn persist_replacing(tmp: NamedTempFile, dest: &Path) -> io::Result<()> {
    match tmp.persist(dest) {
        Ok(_) => Ok(()),
        Err(err) => {
            // Some platforms refuse to rename over an open or locked file.
            match fs::remove_file(dest) {
                Ok(()) => {}
                Err(remove) if remove.kind() == io::ErrorKind::NotFound => {}
                Err(_) => return Err(err.error),
            }
            err.file.persist(dest).map(|_| ()).map_err(|err| err.error)
        }
    }
}
