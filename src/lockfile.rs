//! Cluster-wide recovery lock: a `postmaster.pid`-style file guarding
//! against two recovery runs (or a recovery run racing a live load)
//! against the same data directory at once.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{DlError, DlResult};

const LOCK_FILE: &str = "directload.lock";

/// Held for the duration of one recovery run. Dropping it removes the
/// lock file; there is no abandoned-state to preserve the way there is
/// for the LSF, since a lock file with a dead pid is simply stale.
pub struct ClusterLock {
    path: PathBuf,
}

impl ClusterLock {
    /// Attempts `O_CREAT|O_EXCL` on the lock file. If it already exists,
    /// reads the owning pid and probes it with `kill(pid, 0)`; a dead
    /// owner's lock file is unlinked and creation is retried once. A
    /// live owner is reported as an error.
    pub fn acquire(datadir: &Path) -> DlResult<Self> {
        let path = datadir.join(LOCK_FILE);
        match Self::try_create(&path) {
            Ok(lock) => Ok(lock),
            Err(DlError::PreExistingLoad { .. }) => {
                if Self::owner_is_alive(&path)? {
                    Err(DlError::PreExistingLoad {
                        path: path.display().to_string(),
                    })
                } else {
                    warn!(
                        "lock file {} has no live owner; removing and retrying",
                        path.display()
                    );
                    fs::remove_file(&path)?;
                    Self::try_create(&path)
                }
            }
            Err(e) => Err(e),
        }
    }

    fn try_create(path: &Path) -> DlResult<Self> {
        let mut file = match OpenOptions::new().create_new(true).write(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(DlError::PreExistingLoad {
                    path: path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let pid = std::process::id();
        writeln!(file, "{}", pid)?;
        writeln!(file, "{}", path.parent().unwrap_or(path).display())?;
        file.sync_all()?;
        info!("acquired cluster lock {} (pid {})", path.display(), pid);
        Ok(Self { path: path.to_path_buf() })
    }

    /// Reads the pid on the first line and probes it with a signal-0
    /// `kill`, which checks existence/permission without delivering a
    /// signal. A third line, when present, names a shared-memory
    /// segment; its absence is not itself evidence of a dead owner, so
    /// it is not checked here — the pid probe is authoritative.
    fn owner_is_alive(path: &Path) -> DlResult<bool> {
        let file = File::open(path)?;
        let mut lines = BufReader::new(file).lines();
        let pid_line = match lines.next() {
            Some(line) => line?,
            None => return Ok(false),
        };
        let pid: i32 = match pid_line.trim().parse() {
            Ok(p) => p,
            Err(_) => return Ok(false),
        };
        let rc = unsafe { libc::kill(pid, 0) };
        Ok(rc == 0)
    }
}

impl Drop for ClusterLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to remove cluster lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_pid_and_datadir() {
        let dir = tempfile::tempdir().unwrap();
        let lock = ClusterLock::acquire(dir.path()).unwrap();
        let path = dir.path().join(LOCK_FILE);
        assert!(path.exists());
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap().parse::<u32>().unwrap(), std::process::id());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn second_acquire_against_live_owner_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _first = ClusterLock::acquire(dir.path()).unwrap();
        let second = ClusterLock::acquire(dir.path());
        assert!(matches!(second, Err(DlError::PreExistingLoad { .. })));
    }

    #[test]
    fn stale_lock_from_dead_pid_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE);
        // pid 1 is init on any Unix box this test runs on; use a pid
        // almost certainly not running instead so the probe fails.
        let dead_pid = 999_999;
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", dead_pid).unwrap();
        writeln!(file, "{}", dir.path().display()).unwrap();
        drop(file);

        let lock = ClusterLock::acquire(dir.path()).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents.lines().next().unwrap().parse::<u32>().unwrap(),
            std::process::id()
        );
        drop(lock);
    }
}
