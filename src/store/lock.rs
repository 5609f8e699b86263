//! Cross-process writer lock.
//!
//! An advisory `flock(2)` on `<dir>/.lock`, held exclusively for the whole
//! life of a write transaction and released on drop. flock serializes per
//! open file description, so two connections inside one process queue on
//! it exactly like two separate processes do. Readers never take it; they
//! get isolation from immutable snapshots instead.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use crate::schema::LOCK_FILE;

/// Held writer lock. Dropping it unlocks.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl StoreLock {
    /// Block until the exclusive lock on `<dir>/.lock` is ours. Callers run
    /// this on a blocking thread; a waiting writer parks in the kernel, not
    /// on the async runtime.
    pub fn acquire_exclusive(dir: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(dir.join(LOCK_FILE))?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok(StoreLock { file })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}
