//! Per-persona mutual exclusion.
//!
//! A [`PersonaLock`] combines an in-process async mutex with an optional
//! filesystem marker created exclusively (`create_new`). The mutex orders
//! tasks inside this process; the marker keeps other processes out and shows
//! up as a stale `*.lock` file after a crash, which [`recover_stale_locks`]
//! removes at startup.
//!
//! Acquisition is not FIFO. Waiters poll the marker at a fixed interval, can
//! be canceled, and give up after a bounded total wait.

use parlor_core::error::StoreError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct PersonaLock {
    marker: Option<PathBuf>,
    local: Arc<Mutex<()>>,
    poll_interval: Duration,
    timeout: Duration,
}

impl PersonaLock {
    /// A lock backed by a marker file (normally `<guarded file>.lock`).
    pub fn with_marker(marker: impl Into<PathBuf>) -> Self {
        Self {
            marker: Some(marker.into()),
            ..Self::in_process()
        }
    }

    /// A lock that only excludes tasks of this process.
    pub fn in_process() -> Self {
        Self {
            marker: None,
            local: Arc::new(Mutex::new(())),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }

    pub fn marker(&self) -> Option<&Path> {
        self.marker.as_deref()
    }

    fn describe(&self) -> String {
        self.marker
            .as_ref()
            .map(|m| m.display().to_string())
            .unwrap_or_else(|| "in-process lock".into())
    }

    fn timed_out(&self, started: Instant) -> StoreError {
        StoreError::LockTimeout {
            path: self.describe(),
            waited_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Wait for the lock. The returned guard releases it when dropped.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<LockGuard, StoreError> {
        let started = Instant::now();

        let local = tokio::select! {
            guard = self.local.clone().lock_owned() => guard,
            _ = cancel.cancelled() => return Err(StoreError::Canceled(self.describe())),
            _ = tokio::time::sleep(self.timeout) => return Err(self.timed_out(started)),
        };

        let Some(marker) = &self.marker else {
            trace!("In-process lock acquired");
            return Ok(LockGuard {
                marker: None,
                _local: local,
            });
        };

        if let Some(parent) = marker.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Storage(format!("Failed to create lock directory: {e}")))?;
        }

        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(marker)
                .await
            {
                Ok(_) => {
                    debug!(marker = %marker.display(), waited_ms = started.elapsed().as_millis() as u64, "Lock acquired");
                    return Ok(LockGuard {
                        marker: Some(marker.clone()),
                        _local: local,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if started.elapsed() >= self.timeout {
                        warn!(marker = %marker.display(), "Gave up waiting for lock");
                        return Err(self.timed_out(started));
                    }
                    trace!(marker = %marker.display(), "Lock held elsewhere, polling");
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = cancel.cancelled() => return Err(StoreError::Canceled(self.describe())),
                    }
                }
                Err(e) => {
                    return Err(StoreError::Storage(format!(
                        "Failed to create lock marker {}: {e}",
                        marker.display()
                    )));
                }
            }
        }
    }
}

/// Held lock. Dropping it removes the marker and releases the mutex, on
/// every exit path including panics and cancellation.
pub struct LockGuard {
    marker: Option<PathBuf>,
    _local: OwnedMutexGuard<()>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(marker) = &self.marker {
            match std::fs::remove_file(marker) {
                Ok(()) => trace!(marker = %marker.display(), "Lock released"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(marker = %marker.display(), error = %e, "Failed to remove lock marker"),
            }
        }
    }
}

/// Delete every `*.lock` marker under `data_dir`. Run once at process start,
/// before any lock is taken.
pub fn recover_stale_locks(data_dir: &Path) -> std::io::Result<usize> {
    if !data_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    let mut pending = vec![data_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "lock") {
                std::fs::remove_file(&path)?;
                debug!(marker = %path.display(), "Removed stale lock");
                removed += 1;
            }
        }
    }

    if removed > 0 {
        info!(removed, "Recovered stale lock markers");
    }
    Ok(removed)
}
