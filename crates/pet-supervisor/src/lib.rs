pub mod bus_client;
mod error;
pub mod install_lock;
pub mod installer;
pub mod process;
mod supervisor;

pub use bus_client::BusClient;
pub use error::SupervisorError;
pub use install_lock::{InstallLock, MarkerLock};
pub use installer::{
    agent_executable, run_install, AgentBinaryProbe, DependencyProbe, DetachedInstaller, InstallCommand,
    Installer, INSTALL_WORKER_COMMAND,
};
pub use process::{DetachedSpawner, OsProcesses, ProcessTable, SpawnSpec, Spawner};
pub use supervisor::{NotReadyReason, Readiness, Supervisor};
