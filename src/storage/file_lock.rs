use std::fs::{File, OpenOptions};
use crate::core::error::{Error, Result};
use crate::storage::layout::StorageLayout;

/// Exclusive, non-blocking lock on a store directory.
///
/// Held for the lifetime of a `FileStore`, so only one process (and one
/// identifier authority) ever allocates ids against the directory.
pub struct FileLock {
    pub file: File,
}

impl FileLock {
    pub fn acquire(storage: &StorageLayout) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(storage.lock_path())?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_EX, LOCK_NB};

            let fd = file.as_raw_fd();
            // SAFETY: `fd` is a valid descriptor owned by `file` for the whole call.
            let rc = unsafe { flock(fd, LOCK_EX | LOCK_NB) };
            if rc != 0 {
                return Err(Error::InvalidState(format!(
                    "store at {} is already open in another authority",
                    storage.base_dir.display()
                )));
            }
        }

        Ok(FileLock { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_UN};

            let fd = self.file.as_raw_fd();
            // SAFETY: the descriptor is still open; unlocking cannot fail in a way we could handle.
            unsafe {
                flock(fd, LOCK_UN);
            }
        }
    }
}
