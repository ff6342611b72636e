use pet_core::settings::STATE_DIR_ENV;
use pet_core::StatePaths;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use tracing::{error, info};

use crate::install_lock::InstallLock;
use crate::process::{SpawnSpec, Spawner};
use crate::SupervisorError;

/// Subcommand of the `pet` binary that runs [`run_install`].
pub const INSTALL_WORKER_COMMAND: &str = "internal-install";

pub const AGENT_BINARY: &str = "pet-agent";

/// `<root>/bin/pet-agent`, with the platform executable suffix.
pub fn agent_executable(root: &Path) -> PathBuf {
    root.join("bin")
        .join(format!("{AGENT_BINARY}{}", std::env::consts::EXE_SUFFIX))
}

/// Whether the installed artifact the agent needs is present.
pub trait DependencyProbe: Send + Sync {
    fn installed(&self, root: &Path) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AgentBinaryProbe;

impl DependencyProbe for AgentBinaryProbe {
    fn installed(&self, root: &Path) -> bool {
        agent_executable(root).is_file()
    }
}

/// Kicks off a dependency install. Must not wait for it to finish, and the
/// eventual completion must release the install lock.
pub trait Installer: Send + Sync {
    fn start(&self, root: &Path) -> Result<(), SupervisorError>;
}

/// Re-invokes a worker binary (normally `pet internal-install`) detached, so
/// the install outlives the short-lived caller. The worker is pointed at the
/// same state directory so it releases the lock this caller acquired.
pub struct DetachedInstaller {
    worker: PathBuf,
    paths: StatePaths,
    spawner: Arc<dyn Spawner>,
}

impl DetachedInstaller {
    pub fn new(worker: impl Into<PathBuf>, paths: StatePaths, spawner: Arc<dyn Spawner>) -> Self {
        Self {
            worker: worker.into(),
            paths,
            spawner,
        }
    }
}

impl Installer for DetachedInstaller {
    fn start(&self, root: &Path) -> Result<(), SupervisorError> {
        let state_dir = self.paths.dir();
        let spec = SpawnSpec::new(&self.worker, self.paths.install_log())
            .arg(INSTALL_WORKER_COMMAND)
            .arg("--root")
            .arg(root.as_os_str())
            .arg("--state-dir")
            .arg(state_dir.as_os_str())
            .env(STATE_DIR_ENV, state_dir.display().to_string());
        let pid = self.spawner.spawn(&spec)?;
        info!(event = "install_started", worker_pid = pid, root = %root.display());
        Ok(())
    }
}

/// The command that builds the agent into `<root>/bin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl InstallCommand {
    pub fn for_root(root: &Path) -> Self {
        let program = std::env::var_os("CARGO")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("cargo"));
        Self {
            program,
            args: vec![
                OsString::from("install"),
                OsString::from("--path"),
                root.join("crates").join(AGENT_BINARY).into_os_string(),
                OsString::from("--root"),
                root.as_os_str().to_os_string(),
            ],
        }
    }
}

/// Runs `command` to completion with output appended to `log_path`, then
/// releases `lock` whatever the outcome.
pub fn run_install(
    command: &InstallCommand,
    log_path: &Path,
    lock: &dyn InstallLock,
) -> Result<ExitStatus, SupervisorError> {
    let outcome = run_logged(command, log_path);
    let released = lock.release();
    match &outcome {
        Ok(status) if status.success() => info!(event = "install_done"),
        Ok(status) => error!(event = "install_failed", code = ?status.code()),
        Err(err) => error!(event = "install_failed", error = %err),
    }
    let status = outcome?;
    released?;
    Ok(status)
}

fn run_logged(command: &InstallCommand, log_path: &Path) -> Result<ExitStatus, SupervisorError> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let stdout = OpenOptions::new().create(true).append(true).open(log_path)?;
    let stderr = stdout.try_clone()?;
    let status = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .status()?;
    Ok(status)
}
