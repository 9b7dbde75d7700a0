use crate::error::{ProcflowError, Result};
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// A reader never observes a half-written output file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read a primary input file, distinguishing a missing path from other failures.
pub fn read_input(path: &Path) -> Result<String> {
    let bytes = read_input_bytes(path)?;
    String::from_utf8(bytes).map_err(|e| ProcflowError::MalformedInput {
        path: path.to_path_buf(),
        reason: format!("not valid UTF-8: {e}"),
    })
}

pub fn read_input_bytes(path: &Path) -> Result<Vec<u8>> {
    if path.is_dir() {
        return Err(ProcflowError::Unreadable {
            path: path.to_path_buf(),
            reason: "is a directory".to_string(),
        });
    }
    std::fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ProcflowError::FileNotFound(path.to_path_buf()),
        _ => ProcflowError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })
}
