use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use crate::SupervisorError;

/// A lock older than this is abandoned and treated as absent.
pub const STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Cross-process guard around dependency installation.
///
/// Implementations are best-effort: two observers may both see the lock as
/// free and both acquire it. The later writer's marker wins and a duplicate
/// install is harmless.
pub trait InstallLock: Send + Sync {
    /// `Ok(false)` when another holder is active.
    fn try_acquire(&self) -> Result<bool, SupervisorError>;
    fn is_stale(&self) -> bool;
    /// Present and not stale. A stale lock is removed as a side effect.
    fn is_active(&self) -> bool;
    fn release(&self) -> Result<(), SupervisorError>;
}

/// Marker file judged by its modification time.
#[derive(Debug, Clone)]
pub struct MarkerLock {
    path: PathBuf,
    stale_after: Duration,
}

impl MarkerLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stale_after: STALE_AFTER,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn age(&self) -> Option<Duration> {
        let modified = std::fs::metadata(&self.path).ok()?.modified().ok()?;
        Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default(),
        )
    }
}

impl InstallLock for MarkerLock {
    fn try_acquire(&self) -> Result<bool, SupervisorError> {
        if self.is_active() {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let metadata = format!(
            "owner_pid={}\ncreated_at={}\n",
            std::process::id(),
            Utc::now().to_rfc3339()
        );
        std::fs::write(&self.path, metadata)?;
        debug!(event = "install_lock_acquired", path = %self.path.display());
        Ok(true)
    }

    fn is_stale(&self) -> bool {
        self.age().is_some_and(|age| age > self.stale_after)
    }

    fn is_active(&self) -> bool {
        let Some(age) = self.age() else {
            return false;
        };
        if age <= self.stale_after {
            return true;
        }
        warn!(
            event = "install_lock_stale",
            path = %self.path.display(),
            age_secs = age.as_secs()
        );
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                warn!(event = "install_lock_cleanup_error", error = %err);
            }
        }
        false
    }

    fn release(&self) -> Result<(), SupervisorError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn age_file(path: &Path, age: Duration) {
        let file = File::options().write(true).open(path).expect("open marker");
        file.set_modified(SystemTime::now() - age)
            .expect("set mtime");
    }

    #[test]
    fn acquire_writes_owner_metadata_and_blocks_second_holder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = MarkerLock::new(dir.path().join("state").join("installing"));

        assert!(lock.try_acquire().expect("acquire"));
        let body = std::fs::read_to_string(lock.path()).expect("marker");
        assert!(body.contains(&format!("owner_pid={}", std::process::id())));
        assert!(body.contains("created_at="));

        assert!(!lock.try_acquire().expect("second acquire"));
        assert!(lock.is_active());
    }

    #[test]
    fn release_removes_marker_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = MarkerLock::new(dir.path().join("installing"));
        lock.try_acquire().expect("acquire");

        lock.release().expect("release");
        assert!(!lock.path().exists());
        lock.release().expect("second release");
    }

    #[test]
    fn eleven_minute_old_marker_is_stale_and_removed_on_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = MarkerLock::new(dir.path().join("installing"));
        lock.try_acquire().expect("acquire");
        age_file(lock.path(), Duration::from_secs(11 * 60));

        assert!(lock.is_stale());
        assert!(!lock.is_active());
        assert!(!lock.path().exists());
    }

    #[test]
    fn stale_marker_is_replaced_on_acquire() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = MarkerLock::new(dir.path().join("installing"));
        std::fs::write(lock.path(), "owner_pid=1\n").expect("seed");
        age_file(lock.path(), Duration::from_secs(11 * 60));

        assert!(lock.try_acquire().expect("acquire"));
        assert!(!lock.is_stale());
    }

    #[test]
    fn missing_marker_is_neither_stale_nor_active() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lock = MarkerLock::new(dir.path().join("installing"));
        assert!(!lock.is_stale());
        assert!(!lock.is_active());
    }
}
