//! Advisory lock for the registry store.
//!
//! Cross-process exclusion via exclusive creation of a sidecar `.lock` file
//! next to the store. Contenders poll at a short interval until the holder
//! unlinks the file; a lock whose mtime is older than the stale window is
//! treated as abandoned and removed. Release is best-effort: a failed unlink
//! is swallowed and the stale window cleans up after it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::LockConfig;
use crate::error::{RegistryError, Result};

/// Exclusive advisory lock over the store file.
pub struct StoreLock {
    path: PathBuf,
    config: LockConfig,
    held: bool,
}

impl StoreLock {
    /// Create a lock for the given store file. The lock file is the sibling
    /// `<name>.lock`.
    pub fn for_store(store_path: &Path, config: LockConfig) -> Self {
        let name = store_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "loops.json".to_string());
        let path = store_path.with_file_name(format!("{}.lock", name));
        Self {
            path,
            config,
            held: false,
        }
    }

    /// The lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock, polling until the holder releases or the timeout
    /// elapses. Stale locks are removed and acquisition retried immediately.
    pub async fn acquire(&mut self) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(self.config.acquire_timeout_ms);
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&self.path) {
                Ok(mut file) => {
                    // Owner pid is informational; stale detection is mtime-based
                    let _ = write!(file, "{}", std::process::id());
                    self.held = true;
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.is_stale() {
                        log::warn!("removing stale registry lock: {}", self.path.display());
                        let _ = std::fs::remove_file(&self.path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(RegistryError::LockTimeout(self.path.display().to_string()));
                    }
                    tokio::time::sleep(poll).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Release the lock by unlinking the file. Best-effort.
    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        let _ = std::fs::remove_file(&self.path);
    }

    fn is_stale(&self) -> bool {
        let stale_after = Duration::from_millis(self.config.stale_after_ms);
        if stale_after.is_zero() {
            return false;
        }
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| mtime.elapsed().ok())
            .is_some_and(|age| age >= stale_after)
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        self.release();
    }
}
