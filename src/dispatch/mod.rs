//! Starting workers for a run.
//!
//! [`WorkerLauncher`] is the seam between the coordinator and how worker
//! pools come to life. [`RemoteDispatcher`] renders two scripts into the
//! work directory and runs the launch wrapper once per node:
//!
//! - `calcit-worker.sh`: runs `calcit pool` against the coordinator
//! - `start_workers.sh <node>`: reaches `<node>` through the remote shell
//!   and runs the worker script there
//!
//! Every value written into a script or a command line is quoted for `sh`,
//! so work directories with spaces and secrets with quotes survive intact.
//!
//! Dispatch is fire-and-forget. Nothing confirms that a node's workers
//! connected; a node that never does only shows up as missing throughput.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::{DispatchConfig, ServerEndpoint};
use crate::error::{CalcitError, Result};
use crate::template;
use crate::worker::CommandExecutor;

pub const WORKER_TEMPLATE: &str = "worker.sh";
pub const LAUNCH_TEMPLATE: &str = "start_workers.sh";
pub const WORKER_SCRIPT: &str = "calcit-worker.sh";
pub const LAUNCH_SCRIPT: &str = "start_workers.sh";

/// Starts worker pools that will connect to `endpoint`.
#[tonic::async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Begin launching workers. Must not wait for them to finish.
    async fn launch(&self, endpoint: &ServerEndpoint) -> Result<()>;
}

/// Paths of the scripts rendered for one run. Left behind afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedScripts {
    pub worker_script: PathBuf,
    pub launch_script: PathBuf,
}

/// Quote `value` as a single `sh` word.
///
/// # Errors
///
/// [`CalcitError::Config`] if `value` holds a NUL byte, which no shell
/// word can carry. `what` names the value in the message.
pub fn shell_quote(what: &str, value: &str) -> Result<String> {
    shlex::try_quote(value)
        .map(|quoted| quoted.into_owned())
        .map_err(|e| CalcitError::Config(format!("cannot pass {} to the shell: {}", what, e)))
}

/// Launches worker pools on remote nodes over `ssh`.
#[derive(Debug, Clone)]
pub struct RemoteDispatcher {
    config: DispatchConfig,
    executor: CommandExecutor,
}

impl RemoteDispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            executor: CommandExecutor::new(),
        }
    }

    /// Render the worker bootstrap and launch wrapper scripts.
    ///
    /// # Errors
    ///
    /// Fails with a template error when either template is missing, and
    /// with a configuration error when a value cannot be quoted.
    pub async fn prepare(&self, endpoint: &ServerEndpoint) -> Result<PreparedScripts> {
        let share = &self.config.share_dir;
        let work_dir = &self.config.work_dir;

        let worker_script = work_dir.join(WORKER_SCRIPT);
        let worker_subs = HashMap::from([
            (
                "SERVER_HOST".to_string(),
                shell_quote("server host", &endpoint.host)?,
            ),
            ("PORT".to_string(), endpoint.port.to_string()),
            (
                "AUTHKEY".to_string(),
                shell_quote("shared secret", &endpoint.secret.to_string_lossy())?,
            ),
            (
                "JOBS_PER_NODE".to_string(),
                self.config.jobs_per_node.to_string(),
            ),
            (
                "WORKER_BIN".to_string(),
                shell_quote(
                    "worker binary path",
                    &self.config.worker_bin.display().to_string(),
                )?,
            ),
        ]);
        template::render(&share.join(WORKER_TEMPLATE), &worker_script, &worker_subs)?;
        make_executable(&worker_script).await?;

        // Quoted twice: once for the remote shell, once for the local one.
        let remote_command = format!(
            "cd {} && sh ./{}",
            shell_quote("work directory", &work_dir.display().to_string())?,
            shell_quote("worker script", WORKER_SCRIPT)?,
        );
        let launch_script = work_dir.join(LAUNCH_SCRIPT);
        let launch_subs = HashMap::from([
            (
                "REMOTE_SHELL".to_string(),
                self.config.remote_shell.program().to_string(),
            ),
            (
                "REMOTE_COMMAND".to_string(),
                shell_quote("remote command", &remote_command)?,
            ),
        ]);
        template::render(&share.join(LAUNCH_TEMPLATE), &launch_script, &launch_subs)?;
        make_executable(&launch_script).await?;

        Ok(PreparedScripts {
            worker_script,
            launch_script,
        })
    }

    /// `sh` command line that starts the worker pool on `node`.
    pub fn node_command(scripts: &PreparedScripts, node: &str) -> Result<String> {
        Ok(format!(
            "{} {}",
            shell_quote(
                "launch script path",
                &scripts.launch_script.display().to_string()
            )?,
            shell_quote("node name", node)?,
        ))
    }
}

#[tonic::async_trait]
impl WorkerLauncher for RemoteDispatcher {
    async fn launch(&self, endpoint: &ServerEndpoint) -> Result<()> {
        if self.config.nodes.is_empty() {
            return Err(CalcitError::Config("no worker nodes configured".to_string()));
        }

        let scripts = self.prepare(endpoint).await?;
        // Build every command first so a bad node name dispatches nothing.
        let commands = self
            .config
            .nodes
            .iter()
            .map(|node| -> Result<(String, String)> {
                Ok((node.clone(), Self::node_command(&scripts, node)?))
            })
            .collect::<Result<Vec<_>>>()?;

        for (node, command) in commands {
            tracing::info!(node = %node, command = %command, "Dispatching workers");

            let executor = self.executor.clone();
            tokio::spawn(async move {
                let execution = executor.execute(&command).await;
                let stderr = String::from_utf8_lossy(&execution.stderr);
                if stderr.trim().is_empty() {
                    tracing::info!(
                        node = %node,
                        elapsed_s = execution.elapsed_seconds(),
                        "Worker pool on node finished"
                    );
                } else {
                    tracing::warn!(
                        node = %node,
                        elapsed_s = execution.elapsed_seconds(),
                        stderr = %stderr.trim_end(),
                        "Worker pool on node reported errors"
                    );
                }
            });
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
