mod animator;
mod bus;
mod context;
mod instance;
mod render;

use clap::Parser;
use pet_core::logging::{init_logging, LogOptions};
use pet_core::settings::{resolve_port, resolve_root, resolve_state_dir};
use pet_core::{AgentProcess, AnimationTimings, StatePaths};
use std::{
    io::IsTerminal,
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::animator::spawn_animator;
use crate::context::AgentContext;
use crate::instance::InstanceLock;
use crate::render::LogRenderer;

#[derive(Clone, Debug)]
struct Config {
    port: u16,
    root: PathBuf,
    paths: StatePaths,
    debug: bool,
}

#[derive(Parser, Debug)]
#[command(name = "pet-agent")]
struct Args {
    #[arg(long)]
    port: Option<u16>,
    #[arg(long, default_value = "")]
    root: String,
    #[arg(long, default_value = "")]
    state_dir: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn load_config() -> Config {
    let args = Args::parse();
    Config {
        port: resolve_port(args.port),
        root: resolve_root(&args.root),
        paths: StatePaths::new(resolve_state_dir(&args.state_dir)),
        debug: args.debug,
    }
}

/// A detached agent has stdout redirected into `agent.log`; echoing there
/// would duplicate every line already written to the app log.
fn log_options(debug: bool, stdout_is_terminal: bool) -> LogOptions {
    LogOptions {
        debug,
        stdout: stdout_is_terminal,
    }
}

#[tokio::main]
async fn main() {
    let config = load_config();
    let _log_guard = init_logging(
        &config.paths.app_log(),
        log_options(config.debug, std::io::stdout().is_terminal()),
    );

    let _instance = match InstanceLock::try_acquire(&config.paths.instance_lock()) {
        Ok(Some(lock)) => lock,
        Ok(None) => {
            warn!(event = "agent_already_running", state_dir = %config.paths.dir().display());
            return;
        }
        Err(err) => {
            error!(event = "instance_lock_error", error = %err);
            return;
        }
    };

    let pid = std::process::id();
    if let Err(err) = AgentProcess::new(pid, config.paths.agent_log()).write(&config.paths.pid_file()) {
        warn!(event = "pid_record_error", error = %err);
    }

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "bus_bind_error", error = %err, addr = %addr);
            remove_own_record(&config.paths);
            return;
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ctx = Arc::new(AgentContext::new(shutdown_tx.clone()));
    let (animator, animator_task) = spawn_animator(LogRenderer::default(), AnimationTimings::default());
    ctx.attach_sink(Arc::new(animator));
    tokio::spawn(shutdown_on_signal(shutdown_tx));

    info!(event = "agent_start", pid, addr = %addr, root = %config.root.display());

    if let Err(err) = bus::serve(listener, ctx.clone(), shutdown_rx).await {
        error!(event = "bus_error", error = %err);
    }

    ctx.detach_sink();
    animator_task.abort();
    remove_own_record(&config.paths);
    info!(event = "agent_stop", pid);
}

async fn shutdown_on_signal(shutdown: watch::Sender<bool>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                warn!(event = "signal_handler_error", error = %err);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!(event = "shutdown_signal");
    shutdown.send_replace(true);
}

/// Leaves a record written by a newer launch alone.
fn remove_own_record(paths: &StatePaths) {
    match AgentProcess::read(&paths.pid_file()) {
        Ok(Some(record)) if record.pid == std::process::id() => {
            if let Err(err) = AgentProcess::remove(&paths.pid_file()) {
                warn!(event = "pid_record_cleanup_error", error = %err);
            }
        }
        Ok(_) => {}
        Err(err) => warn!(event = "pid_record_error", error = %err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_agent_logs_to_file_only() {
        let detached = log_options(false, false);
        assert!(!detached.stdout);
        assert!(!detached.debug);

        let foreground = log_options(true, true);
        assert!(foreground.stdout);
        assert!(foreground.debug);
    }
}
