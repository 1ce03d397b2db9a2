use std::fs::{self, File, OpenOptions};
use std::io::Write;
use chrono::Utc;
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::layout::StorageLayout;

/// Exclusive ownership of a persistence directory for one engine instance.
///
/// The lock file records the owner's pid and acquisition time so a refused
/// open can name who holds the directory.
pub struct FileLock {
    file: File,
}

impl FileLock {
    pub fn acquire(storage: &StorageLayout) -> Result<Self> {
        let path = storage.lock_path();
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_EX, LOCK_NB};

            let fd = file.as_raw_fd();
            unsafe {
                if flock(fd, LOCK_EX | LOCK_NB) != 0 {
                    let holder = fs::read_to_string(&path).unwrap_or_default();
                    return Err(Error::new(
                        ErrorKind::Backend,
                        format!(
                            "{} is owned by another engine ({})",
                            storage.base_dir.display(),
                            holder.trim().replace('\n', ", ")
                        ),
                    ));
                }
            }
        }

        file.set_len(0)?;
        writeln!(file, "pid {}", std::process::id())?;
        writeln!(file, "since {}", Utc::now().to_rfc3339())?;
        file.sync_all()?;

        Ok(FileLock { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_UN};

            let _ = self.file.set_len(0);
            let fd = self.file.as_raw_fd();
            unsafe {
                flock(fd, LOCK_UN);
            }
        }
    }
}
