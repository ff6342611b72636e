mod hooks;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pet_core::logging::{init_logging, LogOptions};
use pet_core::settings::{resolve_port, resolve_root, resolve_state_dir};
use pet_core::{EventName, StatePaths};
use pet_supervisor::{run_install, InstallCommand, MarkerLock, Supervisor};
use serde_json::json;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use crate::hooks::{run_hook, HookKind};

#[derive(Parser)]
#[command(name = "pet")]
#[command(about = "Desktop pet agent supervisor and activity hooks", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    port: Option<u16>,
    #[arg(long, global = true, default_value = "")]
    root: String,
    #[arg(long, global = true, default_value = "")]
    state_dir: String,
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check dependencies, starting an install when needed
    EnsureReady,
    /// Report whether the agent is running
    Status,
    /// Launch the agent unless it is already running
    Start,
    /// Stop the agent
    Stop,
    /// Send one event to the agent
    Send { event: String },
    /// Run a producer hook; always prints `{}`
    Hook {
        #[arg(value_enum)]
        kind: HookKind,
    },
    #[command(name = "internal-install", hide = true)]
    InternalInstall,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = StatePaths::new(resolve_state_dir(&cli.state_dir));
    let _log_guard = init_logging(
        &paths.app_log(),
        LogOptions {
            debug: cli.debug,
            stdout: false,
        },
    );
    let root = resolve_root(&cli.root);
    let port = resolve_port(cli.port);
    let worker = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("pet"));
    let supervisor = Supervisor::new(paths.clone(), port, worker);

    match cli.command {
        Commands::Hook { kind } => {
            let mut input = String::new();
            let _ = io::stdin().read_to_string(&mut input);
            run_hook(kind, &supervisor, &root, &input).await;
            let mut stdout = io::stdout();
            let _ = stdout.write_all(b"{}");
            let _ = stdout.flush();
        }
        Commands::EnsureReady => {
            let readiness = supervisor.ensure_ready(&root);
            println!("{}", serde_json::to_string(&readiness)?);
        }
        Commands::Status => {
            let running = supervisor.is_running().await;
            let pid = supervisor.recorded_process().map(|record| record.pid);
            println!("{}", json!({ "running": running, "pid": pid, "port": port }));
        }
        Commands::Start => {
            let readiness = supervisor.ensure_ready(&root);
            if !readiness.ready {
                println!("{}", serde_json::to_string(&readiness)?);
                return Ok(());
            }
            if !supervisor.ensure_running(&root).await {
                bail!("agent did not become healthy on port {port}");
            }
            println!("agent running on port {port}");
        }
        Commands::Stop => {
            if supervisor.stop().await {
                println!("agent stopped");
            } else {
                println!("agent unreachable; sent termination signal to recorded pid");
            }
        }
        Commands::Send { event } => {
            let name: EventName = event.parse().map_err(anyhow::Error::msg)?;
            if !supervisor.send_event(name).await {
                bail!("agent unreachable on port {port}");
            }
        }
        Commands::InternalInstall => {
            let lock = MarkerLock::new(paths.install_lock());
            let status = run_install(&InstallCommand::for_root(&root), &paths.install_log(), &lock)
                .context("running installer")?;
            if !status.success() {
                bail!("installer exited with {status}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pet_supervisor::INSTALL_WORKER_COMMAND;

    #[test]
    fn hook_kinds_parse_as_kebab_case() {
        let cli = Cli::try_parse_from(["pet", "hook", "pre-tool-use"]).expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Hook {
                kind: HookKind::PreToolUse
            }
        ));
    }

    #[test]
    fn install_worker_invocation_parses() {
        let cli = Cli::try_parse_from(["pet", INSTALL_WORKER_COMMAND, "--root", "/opt/pet"]).expect("parse");
        assert!(matches!(cli.command, Commands::InternalInstall));
        assert_eq!(cli.root, "/opt/pet");
    }

    #[test]
    fn install_worker_keeps_callers_state_dir() {
        let cli = Cli::try_parse_from([
            "pet",
            INSTALL_WORKER_COMMAND,
            "--root",
            "/opt/pet",
            "--state-dir",
            "/tmp/pet-state",
        ])
        .expect("parse");
        let paths = StatePaths::new(resolve_state_dir(&cli.state_dir));
        assert_eq!(paths.install_lock(), PathBuf::from("/tmp/pet-state/installing"));
    }

    #[test]
    fn global_port_flag_follows_subcommand() {
        let cli = Cli::try_parse_from(["pet", "status", "--port", "4100"]).expect("parse");
        assert_eq!(cli.port, Some(4100));
    }
}
