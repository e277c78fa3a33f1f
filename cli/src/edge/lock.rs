//! Cross-process serialization of lifecycle transitions.
//!
//! Each `nodectl` invocation is its own process, so the in-memory mutex in
//! the controller only covers one of them. An exclusive `flock` on
//! `edge.lock` covers the rest. The lock is released when the guard drops
//! or the process exits.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use super::EdgeError;

#[derive(Debug)]
pub struct TransitionLock {
    #[cfg(unix)]
    _flock: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl TransitionLock {
    /// Opens (creating if needed) the lock file and blocks until the
    /// exclusive lock is held.
    pub async fn acquire(path: &Path) -> Result<Self, EdgeError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::acquire_blocking(path))
            .await
            .map_err(|e| EdgeError::Lock {
                path: PathBuf::new(),
                reason: e.to_string(),
            })?
    }

    /// True if another holder has the lock right now. Never waits and never
    /// creates the lock file; a missing file means nobody holds it.
    pub fn is_held(path: &Path) -> Result<bool, EdgeError> {
        let file = match OpenOptions::new().write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(EdgeError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::fcntl::{Flock, FlockArg};
            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(_probe) => Ok(false),
                Err((_, Errno::EAGAIN)) => Ok(true),
                Err((_, errno)) => Err(EdgeError::Lock {
                    path: path.to_path_buf(),
                    reason: errno.to_string(),
                }),
            }
        }

        #[cfg(not(unix))]
        {
            drop(file);
            Ok(false)
        }
    }

    fn acquire_blocking(path: PathBuf) -> Result<Self, EdgeError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| EdgeError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| EdgeError::Io {
                path: path.clone(),
                source,
            })?;

        #[cfg(unix)]
        {
            use nix::fcntl::{Flock, FlockArg};
            let flock = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
                EdgeError::Lock {
                    path: path.clone(),
                    reason: errno.to_string(),
                }
            })?;
            Ok(Self { _flock: flock })
        }

        // No advisory locking off unix: in-process serialization only.
        #[cfg(not(unix))]
        {
            Ok(Self { _file: file })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn acquire_creates_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("edge.lock");
        let _lock = TransitionLock::acquire(&path).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn lock_is_reusable_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge.lock");
        drop(TransitionLock::acquire(&path).await.unwrap());
        let relock = tokio::time::timeout(Duration::from_secs(5), TransitionLock::acquire(&path)).await;
        assert!(relock.unwrap().is_ok());
    }

    #[tokio::test]
    async fn is_held_tracks_the_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge.lock");
        assert!(!TransitionLock::is_held(&path).unwrap());
        assert!(!path.exists());

        let lock = TransitionLock::acquire(&path).await.unwrap();
        #[cfg(unix)]
        assert!(TransitionLock::is_held(&path).unwrap());

        drop(lock);
        assert!(!TransitionLock::is_held(&path).unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn second_holder_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge.lock");
        let first = TransitionLock::acquire(&path).await.unwrap();

        // flock locks belong to the open file description, so a second open
        // in the same process contends like another process would.
        let waiter = {
            let path = path.clone();
            tokio::spawn(async move { TransitionLock::acquire(&path).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(5), waiter).await;
        assert!(second.unwrap().unwrap().is_ok());
    }
}
