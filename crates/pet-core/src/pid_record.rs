use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PidRecordError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed pid record: {0:?}")]
    Malformed(String),
}

/// Record of the one background agent believed to be running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentProcess {
    pub pid: u32,
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl AgentProcess {
    pub fn new(pid: u32, log_path: impl Into<PathBuf>) -> Self {
        Self {
            pid,
            log_path: Some(log_path.into()),
        }
    }

    /// Missing file reads as `None`. A bare integer is accepted as well as
    /// the JSON form.
    pub fn read(path: &Path) -> Result<Option<Self>, PidRecordError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let trimmed = raw.trim();
        if let Ok(pid) = trimmed.parse::<u32>() {
            return Ok(Some(Self { pid, log_path: None }));
        }
        if !trimmed.starts_with('{') {
            return Err(PidRecordError::Malformed(trimmed.to_string()));
        }
        Ok(Some(serde_json::from_str(trimmed)?))
    }

    pub fn write(&self, path: &Path) -> Result<(), PidRecordError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string(self)?;
        std::fs::write(path, body)?;
        Ok(())
    }

    /// Returns whether a record was actually deleted.
    pub fn remove(path: &Path) -> Result<bool, PidRecordError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
