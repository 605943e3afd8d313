use crate::errors::{StackwiseError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Terminal spinner used while long-running git steps are in flight
pub mod spinner;

/// Atomic file operations so an interrupted write never leaves a torn file
pub mod atomic_file {
    use super::*;

    /// Read a JSON file, returning `None` when it does not exist yet
    pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|e| {
            StackwiseError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let value = serde_json::from_str(&content).map_err(|e| {
            StackwiseError::config(format!("Failed to parse {}: {e}", path.display()))
        })?;

        Ok(Some(value))
    }

    /// Write JSON data to a file atomically, holding the file's lock
    pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
        super::file_locking::with_file_lock(path, || write_json_unlocked(path, data))
    }

    /// Write JSON without taking the lock; the caller must already hold it
    pub fn write_json_unlocked<T: Serialize>(path: &Path, data: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| StackwiseError::config(format!("Failed to serialize data: {e}")))?;

        write_string_unlocked(path, &content)
    }

    /// Exclusive read-modify-write of a JSON document.
    ///
    /// The lock is held across the reload, the mutation and the rename, so two
    /// processes updating the same file serialize instead of losing writes.
    pub fn update_json<T, R, F>(path: &Path, mutate: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> Result<R>,
    {
        super::file_locking::with_file_lock(path, || {
            let mut document: T = read_json(path)?.unwrap_or_default();
            let result = mutate(&mut document)?;
            write_json_unlocked(path, &document)?;
            Ok(result)
        })
    }

    fn write_string_unlocked(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StackwiseError::config(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        // Temporary file lives next to the target so the rename stays on one filesystem
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content)
            .map_err(|e| StackwiseError::config(format!("Failed to write temporary file: {e}")))?;

        atomic_rename(&temp_path, path)
    }

    #[cfg(windows)]
    fn atomic_rename(temp_path: &Path, final_path: &Path) -> Result<()> {
        const MAX_RETRIES: u32 = 3;
        const RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(100);

        let mut last_error = None;
        for _ in 0..MAX_RETRIES {
            match fs::rename(temp_path, final_path) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_error = Some(e);
                    std::thread::sleep(RETRY_DELAY);
                }
            }
        }

        let _ = fs::remove_file(temp_path);
        Err(StackwiseError::config(format!(
            "Failed to finalize file write after {MAX_RETRIES} attempts: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    #[cfg(not(windows))]
    fn atomic_rename(temp_path: &Path, final_path: &Path) -> Result<()> {
        fs::rename(temp_path, final_path)
            .map_err(|e| StackwiseError::config(format!("Failed to finalize file write: {e}")))
    }
}

/// Lock files guarding the data files against concurrent writers
pub mod file_locking {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    /// Exclusive lock on a data file, held as a `<file>.lock` sibling.
    /// Released (and the lock file removed) on drop.
    pub struct FileLock {
        _file: File,
        lock_path: PathBuf,
    }

    impl FileLock {
        const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
        const RETRY_INTERVAL: Duration = Duration::from_millis(50);

        /// Acquire the lock, polling until `timeout` elapses
        pub fn acquire_with_timeout(file_path: &Path, timeout: Duration) -> Result<Self> {
            let lock_path = file_path.with_extension("lock");
            if let Some(parent) = lock_path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    StackwiseError::config(format!("Failed to create {}: {e}", parent.display()))
                })?;
            }

            let start_time = Instant::now();
            loop {
                match Self::try_acquire(&lock_path) {
                    Ok(lock) => return Ok(lock),
                    Err(e) => {
                        if start_time.elapsed() >= timeout {
                            return Err(StackwiseError::config(format!(
                                "Timeout waiting for lock on {} after {}ms: {e}",
                                file_path.display(),
                                timeout.as_millis()
                            )));
                        }
                        std::thread::sleep(Self::RETRY_INTERVAL);
                    }
                }
            }
        }

        /// Try to acquire the lock once without waiting
        pub fn try_acquire(lock_path: &Path) -> Result<Self> {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(lock_path)
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::AlreadyExists => StackwiseError::config(format!(
                        "Lock file {} already exists - another process may be updating it",
                        lock_path.display()
                    )),
                    _ => StackwiseError::config(format!(
                        "Failed to acquire lock {}: {e}",
                        lock_path.display()
                    )),
                })?;

            Ok(Self {
                _file: file,
                lock_path: lock_path.to_path_buf(),
            })
        }

        pub fn acquire(file_path: &Path) -> Result<Self> {
            Self::acquire_with_timeout(file_path, Self::DEFAULT_TIMEOUT)
        }
    }

    impl Drop for FileLock {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.lock_path);
        }
    }

    /// Execute an operation while holding the file's lock
    pub fn with_file_lock<F, R>(file_path: &Path, operation: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        let _lock = FileLock::acquire(file_path)?;
        operation()
    }
}
