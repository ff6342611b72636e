//! tracing setup: one fmt subscriber writing to an optional stdout and a
//! size-capped log file.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::{Arc, Mutex},
};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

use crate::settings::{env_true, DEBUG_ENV, LOG_LEVEL_ENV};

/// The log file is truncated to zero once it grows past this.
pub const LOG_MAX_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    pub debug: bool,
    /// Hooks must keep stdout clean for their JSON reply.
    pub stdout: bool,
}

pub struct LogGuard {
    file: Option<Arc<Mutex<File>>>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

fn default_level(debug: bool) -> String {
    if debug || env_true(DEBUG_ENV) {
        "debug".to_string()
    } else if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
        level
    } else {
        "info".to_string()
    }
}

pub fn init_logging(log_path: &Path, options: LogOptions) -> Option<LogGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level(options.debug)));
    let file = match open_log_file(log_path) {
        Ok(file) => Some(Arc::new(Mutex::new(file))),
        Err(err) => {
            if options.stdout {
                eprintln!("log_file_error: {err}");
            }
            None
        }
    };
    let guard = LogGuard { file: file.clone() };
    let stdout = options.stdout;
    let make_writer =
        BoxMakeWriter::new(move || MultiWriter::new(stdout, file.clone(), LOG_MAX_BYTES));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Returns whether the file was truncated.
fn truncate_if_oversized(file: &File, max_bytes: u64) -> io::Result<bool> {
    if file.metadata()?.len() <= max_bytes {
        return Ok(false);
    }
    file.set_len(0)?;
    Ok(true)
}

struct MultiWriter {
    stdout: Option<io::Stdout>,
    file: Option<Arc<Mutex<File>>>,
    max_bytes: u64,
}

impl MultiWriter {
    fn new(stdout: bool, file: Option<Arc<Mutex<File>>>, max_bytes: u64) -> Self {
        Self {
            stdout: stdout.then(io::stdout),
            file,
            max_bytes,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(stdout) = &mut self.stdout {
            let _ = stdout.write_all(buf);
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = truncate_if_oversized(&file, self.max_bytes);
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(stdout) = &mut self.stdout {
            let _ = stdout.flush();
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}
