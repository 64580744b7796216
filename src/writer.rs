//! Atomic replacement of the ledger file.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

/// Writes `content` to a temporary file in the same directory as `path`
/// (same-filesystem rename semantics), durably persists it, then renames it
/// over `path`. Readers observe either the old or the new complete content,
/// never an intermediate state. On any failure before the rename the
/// temporary file is removed and `path` is untouched.
pub fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    // Dropping the PersistError removes the temporary file.
    tmp.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), bytes = content.len(), "atomically replaced file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn replaces_existing_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("main.journal");
        fs::write(&path, "old").expect("seed file");
        write_atomic(&path, "new content\n").expect("write");
        assert_eq!("new content\n", fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn creates_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fresh.journal");
        write_atomic(&path, "content\n").expect("write");
        assert_eq!("content\n", fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn leaves_no_temporary_files_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("main.journal");
        write_atomic(&path, "content\n").expect("write");
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(vec![std::ffi::OsString::from("main.journal")], entries);
    }
}
