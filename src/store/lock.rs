//! Cross-process advisory lock for the weight files
//!
//! Sentinel-file locking: create the file exclusively, retry briefly on
//! contention, give up after a bounded number of attempts. A failed
//! acquisition abandons the mutation (the previously persisted state
//! stays authoritative) and never blocks the caller indefinitely.
//! Release happens on every exit path through `Drop`.
//!
//! Participants are assumed cooperative; stale-lock reaping is left to a
//! future horizon check.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::constants::{LOCK_RETRY_ATTEMPTS, LOCK_RETRY_DELAY_MS};
use crate::errors::EngineError;

pub const LOCK_FILE_NAME: &str = ".observer.lock";

/// Held lock; removing the sentinel on drop releases it
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("failed to release lock {}: {e}", self.path.display());
        }
    }
}

/// Acquire the advisory lock under `dir`.
///
/// Retries `LOCK_RETRY_ATTEMPTS` times with `LOCK_RETRY_DELAY_MS` sleeps;
/// on exhaustion returns [`EngineError::LockContended`].
pub fn acquire(dir: &Path) -> Result<LockGuard, EngineError> {
    let path = dir.join(LOCK_FILE_NAME);

    for attempt in 1..=LOCK_RETRY_ATTEMPTS {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Owner pid helps a human diagnose a stuck lock
                let _ = write!(file, "{}", std::process::id());
                debug!("acquired {} (attempt {attempt})", path.display());
                return Ok(LockGuard { path });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                thread::sleep(Duration::from_millis(LOCK_RETRY_DELAY_MS));
            }
            Err(e) => {
                warn!("lock create failed at {}: {e}", path.display());
                thread::sleep(Duration::from_millis(LOCK_RETRY_DELAY_MS));
            }
        }
    }

    Err(EngineError::LockContended {
        path,
        attempts: LOCK_RETRY_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join(LOCK_FILE_NAME);

        {
            let _guard = acquire(dir.path()).unwrap();
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists(), "guard drop must remove the sentinel");
    }

    #[test]
    fn test_contended_lock_is_abandoned() {
        let dir = TempDir::new().unwrap();
        let _held = acquire(dir.path()).unwrap();

        let second = acquire(dir.path());
        match second {
            Err(EngineError::LockContended { attempts, .. }) => {
                assert_eq!(attempts, LOCK_RETRY_ATTEMPTS)
            }
            other => panic!("expected contention, got {other:?}"),
        }
    }

    #[test]
    fn test_reacquire_after_release() {
        let dir = TempDir::new().unwrap();
        drop(acquire(dir.path()).unwrap());
        assert!(acquire(dir.path()).is_ok());
    }
}
