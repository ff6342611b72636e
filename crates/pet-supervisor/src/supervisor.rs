use pet_core::settings::{PORT_ENV, ROOT_ENV, STATE_DIR_ENV};
use pet_core::{AgentProcess, EventName, StatePaths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::bus_client::BusClient;
use crate::install_lock::{InstallLock, MarkerLock};
use crate::installer::{agent_executable, AgentBinaryProbe, DependencyProbe, DetachedInstaller, Installer};
use crate::process::{DetachedSpawner, OsProcesses, ProcessTable, SpawnSpec, Spawner};
use crate::SupervisorError;

pub const LAUNCH_POLL_ATTEMPTS: u32 = 10;
pub const LAUNCH_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NotReadyReason {
    InstallInProgress,
    InstallStarted,
    InstallFailed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Readiness {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<NotReadyReason>,
}

impl Readiness {
    pub fn ready() -> Self {
        Self {
            ready: true,
            reason: None,
        }
    }

    pub fn not_ready(reason: NotReadyReason) -> Self {
        Self {
            ready: false,
            reason: Some(reason),
        }
    }
}

/// Keeps exactly one background agent alive and reachable.
///
/// Every collaborator sits behind a trait so the OS-facing defaults can be
/// swapped out.
pub struct Supervisor {
    paths: StatePaths,
    port: u16,
    bus: BusClient,
    probe: Arc<dyn DependencyProbe>,
    lock: Arc<dyn InstallLock>,
    installer: Arc<dyn Installer>,
    spawner: Arc<dyn Spawner>,
    processes: Arc<dyn ProcessTable>,
    poll_interval: Duration,
}

impl Supervisor {
    /// `worker` is the binary that understands the install worker subcommand.
    pub fn new(paths: StatePaths, port: u16, worker: impl Into<PathBuf>) -> Self {
        let spawner: Arc<dyn Spawner> = Arc::new(DetachedSpawner);
        let installer = DetachedInstaller::new(worker, paths.clone(), spawner.clone());
        Self {
            lock: Arc::new(MarkerLock::new(paths.install_lock())),
            installer: Arc::new(installer),
            bus: BusClient::new(port),
            probe: Arc::new(AgentBinaryProbe),
            processes: Arc::new(OsProcesses),
            poll_interval: LAUNCH_POLL_INTERVAL,
            spawner,
            paths,
            port,
        }
    }

    pub fn with_bus(mut self, bus: BusClient) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn DependencyProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_lock(mut self, lock: Arc<dyn InstallLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.installer = installer;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_processes(mut self, processes: Arc<dyn ProcessTable>) -> Self {
        self.processes = processes;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn ensure_ready(&self, root: &Path) -> Readiness {
        if self.probe.installed(root) {
            return Readiness::ready();
        }
        if self.lock.is_active() {
            debug!(event = "install_in_progress");
            return Readiness::not_ready(NotReadyReason::InstallInProgress);
        }
        match self.lock.try_acquire() {
            Ok(true) => {}
            Ok(false) => return Readiness::not_ready(NotReadyReason::InstallInProgress),
            Err(err) => {
                error!(event = "install_lock_error", error = %err);
                return Readiness::not_ready(NotReadyReason::InstallFailed);
            }
        }
        if let Err(err) = self.installer.start(root) {
            error!(event = "install_start_error", error = %err);
            if let Err(err) = self.lock.release() {
                warn!(event = "install_lock_cleanup_error", error = %err);
            }
            return Readiness::not_ready(NotReadyReason::InstallFailed);
        }
        Readiness::not_ready(NotReadyReason::InstallStarted)
    }

    pub async fn is_running(&self) -> bool {
        if self.bus.health().await {
            return true;
        }
        let Some(record) = self.recorded_process() else {
            return false;
        };
        if self.processes.is_alive(record.pid) {
            return true;
        }
        info!(event = "stale_pid_record", pid = record.pid);
        self.remove_record();
        false
    }

    /// `Ok(None)` when the agent executable has not been installed.
    pub fn launch(&self, root: &Path) -> Result<Option<u32>, SupervisorError> {
        let exe = agent_executable(root);
        if !exe.is_file() {
            warn!(event = "agent_missing", path = %exe.display());
            return Ok(None);
        }
        let spec = SpawnSpec::new(&exe, self.paths.agent_log())
            .env(PORT_ENV, self.port.to_string())
            .env(ROOT_ENV, root.display().to_string())
            .env(STATE_DIR_ENV, self.paths.dir().display().to_string());
        let pid = self.spawner.spawn(&spec)?;
        AgentProcess::new(pid, self.paths.agent_log()).write(&self.paths.pid_file())?;
        info!(event = "agent_launched", pid, port = self.port);
        Ok(Some(pid))
    }

    /// Returns whether the graceful path was taken. The pid record is gone
    /// afterwards either way.
    pub async fn stop(&self) -> bool {
        let graceful = self.bus.shutdown().await;
        if !graceful {
            if let Some(record) = self.recorded_process() {
                let delivered = self.processes.terminate(record.pid);
                info!(event = "agent_terminated", pid = record.pid, delivered);
            }
        }
        self.remove_record();
        graceful
    }

    /// Launches the agent when needed and waits briefly for its bus.
    pub async fn ensure_running(&self, root: &Path) -> bool {
        if self.is_running().await {
            return true;
        }
        match self.launch(root) {
            Ok(Some(_)) => {}
            Ok(None) => return false,
            Err(err) => {
                error!(event = "agent_launch_error", error = %err);
                return false;
            }
        }
        for _ in 0..LAUNCH_POLL_ATTEMPTS {
            tokio::time::sleep(self.poll_interval).await;
            if self.bus.health().await {
                return true;
            }
        }
        warn!(event = "agent_unhealthy_after_launch");
        false
    }

    pub async fn send_event(&self, event: EventName) -> bool {
        self.bus.send_event(event).await
    }

    /// A malformed record is treated like a stale one.
    pub fn recorded_process(&self) -> Option<AgentProcess> {
        match AgentProcess::read(&self.paths.pid_file()) {
            Ok(record) => record,
            Err(err) => {
                warn!(event = "pid_record_unreadable", error = %err);
                self.remove_record();
                None
            }
        }
    }

    fn remove_record(&self) {
        if let Err(err) = AgentProcess::remove(&self.paths.pid_file()) {
            warn!(event = "pid_record_cleanup_error", error = %err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;
    use std::collections::HashSet;
    use std::fs::File;
    use std::sync::Mutex;
    use std::time::SystemTime;

    struct FixedProbe(bool);

    impl DependencyProbe for FixedProbe {
        fn installed(&self, _root: &Path) -> bool {
            self.0
        }
    }

    #[derive(Default)]
    struct FakeProcesses {
        alive: Mutex<HashSet<u32>>,
        terminated: Mutex<Vec<u32>>,
    }

    impl FakeProcesses {
        fn with_alive(pid: u32) -> Self {
            let fake = Self::default();
            fake.alive.lock().expect("alive").insert(pid);
            fake
        }

        fn terminated(&self) -> Vec<u32> {
            self.terminated.lock().expect("terminated").clone()
        }
    }

    impl ProcessTable for FakeProcesses {
        fn is_alive(&self, pid: u32) -> bool {
            self.alive.lock().expect("alive").contains(&pid)
        }

        fn terminate(&self, pid: u32) -> bool {
            self.terminated.lock().expect("terminated").push(pid);
            true
        }
    }

    #[derive(Default)]
    struct RecordingInstaller {
        roots: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    impl Installer for RecordingInstaller {
        fn start(&self, root: &Path) -> Result<(), SupervisorError> {
            if self.fail {
                return Err(std::io::Error::other("spawn refused").into());
            }
            self.roots.lock().expect("roots").push(root.to_path_buf());
            Ok(())
        }
    }

    struct FixedSpawner {
        pid: u32,
        specs: Mutex<Vec<SpawnSpec>>,
    }

    impl Spawner for FixedSpawner {
        fn spawn(&self, spec: &SpawnSpec) -> Result<u32, SupervisorError> {
            self.specs.lock().expect("specs").push(spec.clone());
            Ok(self.pid)
        }
    }

    fn unreachable_bus() -> BusClient {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        BusClient::new(port)
    }

    async fn stub_bus(shutdown_delay: Duration) -> BusClient {
        let app = Router::new()
            .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
            .route(
                "/shutdown",
                post(move || async move {
                    tokio::time::sleep(shutdown_delay).await;
                    Json(json!({ "status": "shutting-down" }))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        BusClient::with_base_url(format!("http://{addr}"))
    }

    fn harness(dir: &Path) -> Supervisor {
        let paths = StatePaths::new(dir.join("state"));
        Supervisor::new(paths, 31425, dir.join("bin").join("pet"))
            .with_bus(unreachable_bus())
            .with_probe(Arc::new(FixedProbe(false)))
            .with_processes(Arc::new(FakeProcesses::default()))
            .with_poll_interval(Duration::from_millis(10))
    }

    fn seed_record(supervisor: &Supervisor, pid: u32) {
        AgentProcess::new(pid, supervisor.paths().agent_log())
            .write(&supervisor.paths().pid_file())
            .expect("seed record");
    }

    fn install_agent(root: &Path) {
        let exe = agent_executable(root);
        std::fs::create_dir_all(exe.parent().expect("bin dir")).expect("mkdir");
        std::fs::write(&exe, b"").expect("touch");
    }

    #[test]
    fn readiness_serializes_kebab_reason() {
        assert_eq!(
            serde_json::to_value(Readiness::ready()).expect("json"),
            json!({ "ready": true })
        );
        assert_eq!(
            serde_json::to_value(Readiness::not_ready(NotReadyReason::InstallInProgress)).expect("json"),
            json!({ "ready": false, "reason": "install-in-progress" })
        );
    }

    #[test]
    fn installed_root_is_ready_without_touching_lock() {
        let dir = tempfile::tempdir().expect("tempdir");
        let supervisor = harness(dir.path()).with_probe(Arc::new(FixedProbe(true)));

        assert_eq!(supervisor.ensure_ready(dir.path()), Readiness::ready());
        assert!(!supervisor.paths().install_lock().exists());
    }

    #[test]
    fn active_lock_reports_in_progress_without_installing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let installer = Arc::new(RecordingInstaller::default());
        let supervisor = harness(dir.path()).with_installer(installer.clone());
        MarkerLock::new(supervisor.paths().install_lock())
            .try_acquire()
            .expect("hold lock");

        let readiness = supervisor.ensure_ready(dir.path());

        assert_eq!(readiness, Readiness::not_ready(NotReadyReason::InstallInProgress));
        assert!(installer.roots.lock().expect("roots").is_empty());
    }

    #[test]
    fn stale_lock_is_cleared_and_install_started() {
        let dir = tempfile::tempdir().expect("tempdir");
        let installer = Arc::new(RecordingInstaller::default());
        let supervisor = harness(dir.path()).with_installer(installer.clone());
        let lock_path = supervisor.paths().install_lock();
        std::fs::create_dir_all(lock_path.parent().expect("state dir")).expect("mkdir");
        std::fs::write(&lock_path, "owner_pid=1\n").expect("seed");
        File::options()
            .write(true)
            .open(&lock_path)
            .expect("open")
            .set_modified(SystemTime::now() - Duration::from_secs(11 * 60))
            .expect("age lock");

        let readiness = supervisor.ensure_ready(dir.path());

        assert_eq!(readiness, Readiness::not_ready(NotReadyReason::InstallStarted));
        assert_eq!(*installer.roots.lock().expect("roots"), vec![dir.path().to_path_buf()]);
        let marker = std::fs::read_to_string(&lock_path).expect("fresh marker");
        assert!(marker.contains(&format!("owner_pid={}", std::process::id())));
    }

    #[test]
    fn installer_failure_releases_lock() {
        let dir = tempfile::tempdir().expect("tempdir");
        let supervisor = harness(dir.path()).with_installer(Arc::new(RecordingInstaller {
            fail: true,
            ..RecordingInstaller::default()
        }));

        let readiness = supervisor.ensure_ready(dir.path());

        assert_eq!(readiness, Readiness::not_ready(NotReadyReason::InstallFailed));
        assert!(!supervisor.paths().install_lock().exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn healthy_bus_means_running() {
        let dir = tempfile::tempdir().expect("tempdir");
        let supervisor = harness(dir.path()).with_bus(stub_bus(Duration::ZERO).await);

        assert!(supervisor.is_running().await);
    }

    #[tokio::test]
    async fn live_recorded_process_means_running() {
        let dir = tempfile::tempdir().expect("tempdir");
        let supervisor = harness(dir.path()).with_processes(Arc::new(FakeProcesses::with_alive(5150)));
        seed_record(&supervisor, 5150);

        assert!(supervisor.is_running().await);
        assert!(supervisor.paths().pid_file().exists());
    }

    #[tokio::test]
    async fn stale_record_is_deleted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let supervisor = harness(dir.path());
        seed_record(&supervisor, 5150);

        assert!(!supervisor.is_running().await);
        assert!(!supervisor.paths().pid_file().exists());
    }

    #[tokio::test]
    async fn no_record_and_no_bus_is_not_running() {
        let dir = tempfile::tempdir().expect("tempdir");
        let supervisor = harness(dir.path());

        assert!(!supervisor.is_running().await);
    }

    #[test]
    fn launch_without_executable_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spawner = Arc::new(FixedSpawner {
            pid: 4242,
            specs: Mutex::new(Vec::new()),
        });
        let supervisor = harness(dir.path()).with_spawner(spawner.clone());

        assert!(supervisor.launch(dir.path()).expect("launch").is_none());
        assert!(spawner.specs.lock().expect("specs").is_empty());
        assert!(!supervisor.paths().pid_file().exists());
    }

    #[test]
    fn launch_records_spawned_pid() {
        let dir = tempfile::tempdir().expect("tempdir");
        install_agent(dir.path());
        let spawner = Arc::new(FixedSpawner {
            pid: 4242,
            specs: Mutex::new(Vec::new()),
        });
        let supervisor = harness(dir.path()).with_spawner(spawner.clone());

        let pid = supervisor.launch(dir.path()).expect("launch");

        assert_eq!(pid, Some(4242));
        let record = supervisor.recorded_process().expect("record");
        assert_eq!(record.pid, 4242);
        assert_eq!(record.log_path, Some(supervisor.paths().agent_log()));
        let specs = spawner.specs.lock().expect("specs");
        assert_eq!(specs[0].program, agent_executable(dir.path()));
        assert!(specs[0]
            .envs
            .contains(&(PORT_ENV.to_string(), "31425".to_string())));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn graceful_stop_removes_record_without_signal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let processes = Arc::new(FakeProcesses::default());
        let supervisor = harness(dir.path())
            .with_bus(stub_bus(Duration::ZERO).await)
            .with_processes(processes.clone());
        seed_record(&supervisor, 6060);

        assert!(supervisor.stop().await);
        assert!(processes.terminated().is_empty());
        assert!(!supervisor.paths().pid_file().exists());
    }

    #[tokio::test]
    async fn unreachable_bus_falls_back_to_signal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let processes = Arc::new(FakeProcesses::default());
        let supervisor = harness(dir.path()).with_processes(processes.clone());
        seed_record(&supervisor, 6060);

        assert!(!supervisor.stop().await);
        assert_eq!(processes.terminated(), vec![6060]);
        assert!(!supervisor.paths().pid_file().exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_shutdown_times_out_then_signals() {
        let dir = tempfile::tempdir().expect("tempdir");
        let processes = Arc::new(FakeProcesses::default());
        let supervisor = harness(dir.path())
            .with_bus(stub_bus(Duration::from_secs(10)).await)
            .with_processes(processes.clone());
        seed_record(&supervisor, 7070);

        assert!(!supervisor.stop().await);
        assert_eq!(processes.terminated(), vec![7070]);
        assert!(!supervisor.paths().pid_file().exists());
    }

    #[tokio::test]
    async fn ensure_running_gives_up_without_executable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let supervisor = harness(dir.path());

        assert!(!supervisor.ensure_running(dir.path()).await);
    }

    #[tokio::test]
    async fn ensure_running_polls_after_launch() {
        let dir = tempfile::tempdir().expect("tempdir");
        install_agent(dir.path());
        let supervisor = harness(dir.path()).with_spawner(Arc::new(FixedSpawner {
            pid: 4343,
            specs: Mutex::new(Vec::new()),
        }));

        assert!(!supervisor.ensure_running(dir.path()).await);
        assert_eq!(supervisor.recorded_process().map(|record| record.pid), Some(4343));
    }
}
