//! Exclusive lock on a notebook's data directory.
//!
//! Two processes serving the same notebook would race on `state.json` and
//! on the pending logs, so `Notebook::open` holds an advisory `flock` on
//! `<notebook>.data/lock` for as long as the notebook stays open.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ServerError, ServerResult};

#[derive(Debug)]
pub struct DataDirLock {
    file: File,
    path: PathBuf,
}

impl DataDirLock {
    /// Take the lock without blocking. Fails with `ServerError::Locked` when
    /// another open notebook holds it.
    pub fn acquire(data_dir: &Path) -> ServerResult<Self> {
        let path = data_dir.join("lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ServerError::io(&path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if result != 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::WouldBlock {
                    return Err(ServerError::Locked { path });
                }
                return Err(ServerError::io(&path, err));
            }
        }

        file.set_len(0).map_err(|e| ServerError::io(&path, e))?;
        let mut writer = &file;
        if let Err(e) = writer.write_all(std::process::id().to_string().as_bytes()) {
            tracing::debug!(path = %path.display(), error = %e, "could not record pid in lock file");
        }

        tracing::debug!(path = %path.display(), "data directory locked");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // The file stays behind; deleting it would let a waiter lock an unlinked inode.
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}
