use std::path::PathBuf;

/// Per-invocation application context, built once by the CLI and threaded
/// through commands instead of living in globals.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub hostname: String,
    pub username: String,
    pub operating_system: String,
    pub machine_id: String,
    pub command_line: String,
    /// Worker parallelism for the push pipeline.
    pub num_cpu: usize,
    /// Root of the local artifact cache; `None` disables caching.
    pub cache_dir: Option<PathBuf>,
}

impl AppContext {
    pub fn new(command_line: String) -> Self {
        Self {
            hostname: hostname(),
            username: username(),
            operating_system: std::env::consts::OS.to_string(),
            machine_id: machine_id(),
            command_line,
            num_cpu: default_parallelism(),
            cache_dir: default_cache_dir(),
        }
    }
}

/// `max(1, numCPU - 1)`: leave one core for the walker and I/O.
pub fn default_parallelism() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    std::cmp::max(1, cpus - 1)
}

pub fn hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".into())
}

pub fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".into())
}

/// Stable machine identifier; falls back to the hostname when the platform
/// provides none.
fn machine_id() -> String {
    if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
        let id = id.trim();
        if !id.is_empty() {
            return id.to_string();
        }
    }
    hostname()
}

/// `$XDG_CACHE_HOME/plakar` or `$HOME/.cache/plakar`.
fn default_cache_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("XDG_CACHE_HOME") {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir).join("plakar"));
        }
    }
    std::env::var("HOME")
        .ok()
        .filter(|h| !h.is_empty())
        .map(|h| PathBuf::from(h).join(".cache").join("plakar"))
}
