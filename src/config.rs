use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::auth::SharedSecret;
use crate::error::CalcitError;

/// Delay before tearing down the listener, letting in-flight worker calls finish.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

pub const DEFAULT_PORT: u16 = 5000;

/// Remote shell used to reach worker nodes.
///
/// Only `ssh` is supported; this is a fixed capability, not a plug-in point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteShell {
    #[default]
    Ssh,
}

impl RemoteShell {
    pub fn program(&self) -> &'static str {
        match self {
            RemoteShell::Ssh => "ssh",
        }
    }
}

impl fmt::Display for RemoteShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

impl FromStr for RemoteShell {
    type Err = CalcitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssh" => Ok(RemoteShell::Ssh),
            other => Err(CalcitError::UnsupportedRemoteShell(other.to_string())),
        }
    }
}

/// Where the queue server listens and how it authenticates clients.
#[derive(Debug, Clone)]
pub struct QueueServerConfig {
    pub bind_addr: SocketAddr,
    pub secret: SharedSecret,
    pub shutdown_grace: Duration,
}

impl QueueServerConfig {
    pub fn new(bind_addr: SocketAddr, secret: SharedSecret) -> Self {
        Self {
            bind_addr,
            secret,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Address and credentials a worker uses to reach the queue server.
#[derive(Debug, Clone)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    pub secret: SharedSecret,
}

impl ServerEndpoint {
    pub fn new(host: impl Into<String>, port: u16, secret: SharedSecret) -> Self {
        Self {
            host: host.into(),
            port,
            secret,
        }
    }

    /// `host:port` form.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub endpoint: ServerEndpoint,
    /// Name reported in results and logs.
    pub name: String,
    /// Extra wait after each job finishes, before its result is pushed.
    pub post_delay: Duration,
    pub connect_timeout: Duration,
}

impl WorkerConfig {
    pub fn new(endpoint: ServerEndpoint) -> Self {
        Self {
            endpoint,
            name: worker_name_prefix(),
            post_delay: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_post_delay(mut self, delay: Duration) -> Self {
        self.post_delay = delay;
        self
    }
}

/// `<host>-<pid>`; pools append a per-worker index.
pub fn worker_name_prefix() -> String {
    format!("{}-{}", local_hostname(), std::process::id())
}

/// Settings for launching worker pools on remote nodes.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub nodes: Vec<String>,
    pub jobs_per_node: usize,
    pub work_dir: PathBuf,
    pub share_dir: PathBuf,
    pub remote_shell: RemoteShell,
    /// Path of the `calcit` binary as seen from the worker nodes.
    pub worker_bin: PathBuf,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            jobs_per_node: 1,
            work_dir: PathBuf::from("."),
            share_dir: PathBuf::from("share"),
            remote_shell: RemoteShell::Ssh,
            worker_bin: PathBuf::from("calcit"),
        }
    }
}

impl DispatchConfig {
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.nodes.push(node.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub server: QueueServerConfig,
    /// Hostname workers use to reach this coordinator.
    pub advertise_host: String,
    /// Bound on the wait for each next result. `None` waits forever.
    pub result_timeout: Option<Duration>,
    /// Log the jobs but submit nothing.
    pub dry_run: bool,
}

impl CoordinatorConfig {
    pub fn new(server: QueueServerConfig) -> Self {
        Self {
            server,
            advertise_host: local_hostname(),
            result_timeout: None,
            dry_run: false,
        }
    }

    pub fn with_advertise_host(mut self, host: impl Into<String>) -> Self {
        self.advertise_host = host.into();
        self
    }

    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = Some(timeout);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Best-effort hostname of this machine.
pub fn local_hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Resolve the directory holding the script templates.
///
/// Order: explicit value, `$CALCIT_SHARE`, `<exe dir>/../share`, `./share`.
pub fn resolve_share_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Ok(dir) = std::env::var("CALCIT_SHARE") {
        return PathBuf::from(dir);
    }
    let installed = std::env::current_exe().ok().and_then(|exe| {
        exe.parent()
            .and_then(Path::parent)
            .map(|prefix| prefix.join("share"))
    });
    match installed {
        Some(dir) if dir.is_dir() => dir,
        _ => PathBuf::from("share"),
    }
}
