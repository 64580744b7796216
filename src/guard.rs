//! Cross-process exclusive lock over a ledger root directory.
//!
//! The lock is the sole serialization point for mutations. It is advisory,
//! file-based, and deliberately coarse: one lock file per ledger root, since
//! includes may span several files under the same root. Acquisition polls
//! with a bounded timeout; release is RAII and happens on every exit path.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::MutationError;

/// Name of the lock marker within the ledger root directory.
const LOCK_FILE_NAME: &str = ".ledgermut.lock";

#[derive(Clone, Debug)]
pub struct LockOptions {
    /// Bound on the total wait for the lock.
    pub timeout: Duration,
    /// Pause between acquisition attempts.
    pub poll_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// An acquired lock. Dropping the guard releases the lock.
#[derive(Debug)]
pub struct FileGuard {
    file: File,
    path: PathBuf,
}

impl FileGuard {
    /// Acquires the exclusive lock for the ledger root directory `root`,
    /// waiting up to `options.timeout`.
    pub fn acquire(root: &Path, options: &LockOptions) -> Result<Self, MutationError> {
        let path = root.join(LOCK_FILE_NAME);
        let start = Instant::now();

        loop {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)
                .map_err(|source| MutationError::LockFailed {
                    path: path.clone(),
                    source,
                })?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    // Record the holder for diagnostics on contention.
                    if let Err(e) = write_holder(&mut file) {
                        warn!(path = %path.display(), err = %e, "failed to record lock holder");
                    }
                    debug!(path = %path.display(), "acquired ledger lock");
                    return Ok(Self { file, path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(source) => {
                    return Err(MutationError::LockFailed {
                        path: path.clone(),
                        source,
                    })
                }
            }

            if start.elapsed() >= options.timeout {
                let holder = read_holder(&path);
                return Err(lock_timeout(&path, start, holder));
            }
            std::thread::sleep(options.poll_interval);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), err = %e, "failed to release ledger lock");
        } else {
            debug!(path = %self.path.display(), "released ledger lock");
        }
    }
}

fn write_holder(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "pid {}", std::process::id())?;
    file.flush()
}

fn read_holder(path: &Path) -> Option<String> {
    let mut content = String::new();
    File::open(path).ok()?.read_to_string(&mut content).ok()?;
    let content = content.trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

fn lock_timeout(path: &Path, start: Instant, holder: Option<String>) -> MutationError {
    MutationError::LockTimeout {
        path: path.to_path_buf(),
        waited_ms: start.elapsed().as_millis() as u64,
        holder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_options() -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn acquires_and_releases() {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = FileGuard::acquire(dir.path(), &fast_options()).expect("acquire");
        assert!(guard.path().exists());
        drop(guard);
        // Re-acquisition after release must succeed.
        FileGuard::acquire(dir.path(), &fast_options()).expect("re-acquire");
    }

    #[test]
    fn unopenable_lock_file_is_lock_failed_not_timeout() {
        let got = FileGuard::acquire(Path::new("/nonexistent/ledger-root"), &fast_options());
        match got {
            Err(MutationError::LockFailed { path, .. }) => {
                assert!(path.ends_with(LOCK_FILE_NAME));
            }
            other => panic!("got {:?}, want LockFailed", other),
        }
    }

    #[test]
    fn contender_times_out_while_lock_held() {
        let dir = tempfile::tempdir().expect("tempdir");
        let _held = FileGuard::acquire(dir.path(), &fast_options()).expect("acquire");
        match FileGuard::acquire(dir.path(), &fast_options()) {
            Err(MutationError::LockTimeout {
                waited_ms, holder, ..
            }) => {
                assert!(waited_ms >= 50);
                assert_eq!(
                    Some(format!("pid {}", std::process::id())),
                    holder
                );
            }
            other => panic!("got {:?}, want LockTimeout", other),
        }
    }
}
