use std::ffi::OsString;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::SupervisorError;

/// OS-level view of other processes.
pub trait ProcessTable: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
    /// Sends a termination request; `false` if it could not be delivered.
    fn terminate(&self, pid: u32) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcesses;

#[cfg(unix)]
impl ProcessTable for OsProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            // Exists but owned by someone else.
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn terminate(&self, pid: u32) -> bool {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        kill(Pid::from_raw(raw), Signal::SIGTERM).is_ok()
    }
}

#[cfg(not(unix))]
impl ProcessTable for OsProcesses {
    fn is_alive(&self, _pid: u32) -> bool {
        false
    }

    fn terminate(&self, pid: u32) -> bool {
        Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

/// A detached child: no stdin, stdout and stderr appended to `log_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub envs: Vec<(String, String)>,
    pub log_path: PathBuf,
}

impl SpawnSpec {
    pub fn new(program: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            log_path: log_path.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

pub trait Spawner: Send + Sync {
    /// Starts the process without waiting for it and returns its pid.
    fn spawn(&self, spec: &SpawnSpec) -> Result<u32, SupervisorError>;
}

/// Starts children in their own process group so they outlive the caller
/// and do not receive its terminal signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedSpawner;

impl Spawner for DetachedSpawner {
    fn spawn(&self, spec: &SpawnSpec) -> Result<u32, SupervisorError> {
        if let Some(parent) = spec.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_path)?;
        let stderr = stdout.try_clone()?;

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.envs.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command.spawn()?;
        Ok(child.id())
    }
}
