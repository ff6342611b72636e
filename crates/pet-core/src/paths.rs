use std::path::{Path, PathBuf};

/// Files kept under the per-user state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    dir: PathBuf,
}

impl StatePaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pid_file(&self) -> PathBuf {
        self.dir.join("agent.pid")
    }

    pub fn install_lock(&self) -> PathBuf {
        self.dir.join("installing")
    }

    pub fn install_log(&self) -> PathBuf {
        self.dir.join("install.log")
    }

    /// Captured stdout/stderr of the detached agent.
    pub fn agent_log(&self) -> PathBuf {
        self.dir.join("agent.log")
    }

    pub fn app_log(&self) -> PathBuf {
        self.dir.join("pet.log")
    }

    pub fn instance_lock(&self) -> PathBuf {
        self.dir.join("agent.lock")
    }
}
