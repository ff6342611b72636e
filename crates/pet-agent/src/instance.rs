use chrono::Utc;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Exclusive advisory lock held for the agent's lifetime.
pub struct InstanceLock {
    file: File,
}

impl InstanceLock {
    /// `Ok(None)` when another agent already holds the lock.
    pub fn try_acquire(path: &Path) -> io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Ok(None);
        }

        let metadata = format!(
            "owner_pid={}\nacquired_at={}\n",
            std::process::id(),
            Utc::now().to_rfc3339()
        );
        file.set_len(0)?;
        file.write_all(metadata.as_bytes())?;
        file.flush()?;

        Ok(Some(Self { file }))
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
