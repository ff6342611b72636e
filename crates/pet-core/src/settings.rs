//! Flag → environment → default resolution shared by the binaries.

use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 31425;

pub const PORT_ENV: &str = "PET_PORT";
pub const ROOT_ENV: &str = "PET_ROOT";
pub const HOST_ROOT_ENV: &str = "CLAUDE_PLUGIN_ROOT";
pub const STATE_DIR_ENV: &str = "PET_STATE_DIR";
pub const LOG_LEVEL_ENV: &str = "PET_LOG_LEVEL";
pub const DEBUG_ENV: &str = "PET_DEBUG";

pub fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub fn parse_port(value: &str) -> Option<u16> {
    value.trim().parse::<u16>().ok().filter(|port| *port != 0)
}

pub fn resolve_port(port_flag: Option<u16>) -> u16 {
    if let Some(port) = port_flag.filter(|port| *port != 0) {
        return port;
    }
    env_non_empty(PORT_ENV)
        .and_then(|value| parse_port(&value))
        .unwrap_or(DEFAULT_PORT)
}

pub fn resolve_root(root_flag: &str) -> PathBuf {
    if !root_flag.trim().is_empty() {
        return PathBuf::from(root_flag);
    }
    if let Some(value) = env_non_empty(ROOT_ENV) {
        return PathBuf::from(value);
    }
    if let Some(value) = env_non_empty(HOST_ROOT_ENV) {
        return PathBuf::from(value);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| root_from_executable(&exe))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Binaries are installed as `<root>/bin/<name>`.
pub fn root_from_executable(exe: &Path) -> Option<PathBuf> {
    let bin_dir = exe.parent()?;
    if bin_dir.file_name()? != "bin" {
        return None;
    }
    bin_dir.parent().map(Path::to_path_buf)
}

pub fn resolve_state_dir(state_dir_flag: &str) -> PathBuf {
    if !state_dir_flag.trim().is_empty() {
        return PathBuf::from(state_dir_flag);
    }
    if let Some(value) = env_non_empty(STATE_DIR_ENV) {
        return PathBuf::from(value);
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".pet")
}

pub fn bus_base_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_port_rejects_garbage_and_zero() {
        assert_eq!(parse_port(" 4000 "), Some(4000));
        assert_eq!(parse_port("0"), None);
        assert_eq!(parse_port("abc"), None);
        assert_eq!(parse_port("70000"), None);
        assert_eq!(parse_port(""), None);
    }

    #[test]
    fn explicit_flags_win() {
        assert_eq!(resolve_port(Some(4100)), 4100);
        assert_eq!(resolve_root("/opt/pet"), PathBuf::from("/opt/pet"));
        assert_eq!(resolve_state_dir("/tmp/pet-state"), PathBuf::from("/tmp/pet-state"));
    }

    #[test]
    fn root_is_parent_of_bin_dir() {
        assert_eq!(
            root_from_executable(Path::new("/opt/pet/bin/pet")),
            Some(PathBuf::from("/opt/pet"))
        );
        assert_eq!(root_from_executable(Path::new("/usr/local/pet")), None);
    }

    #[test]
    fn bus_url_is_loopback() {
        assert_eq!(bus_base_url(DEFAULT_PORT), "http://127.0.0.1:31425");
    }
}
