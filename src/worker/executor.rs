use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Captured output of one shell command.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Wall-clock time of spawn + wait, excluding any post delay.
    pub elapsed: Duration,
}

impl Execution {
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Runs shell commands and captures their output.
///
/// Exit status is not interpreted: a failing command is reported the same
/// way as a succeeding one, with whatever it wrote to stdout/stderr.
/// Output is buffered entirely in memory.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    shell: String,
    post_delay: Duration,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
            post_delay: Duration::ZERO,
        }
    }

    /// Block this long after capturing output, before returning.
    pub fn with_post_delay(mut self, delay: Duration) -> Self {
        self.post_delay = delay;
        self
    }

    /// Run `command` through `sh -c` and wait for it to exit.
    pub async fn execute(&self, command: &str) -> Execution {
        tracing::debug!(command, "Executing command");

        let started = Instant::now();
        let result = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;
        let elapsed = started.elapsed();

        let execution = Self::process_output(command, result, elapsed);

        if !self.post_delay.is_zero() {
            tokio::time::sleep(self.post_delay).await;
        }
        execution
    }

    fn process_output(
        command: &str,
        result: Result<std::process::Output, std::io::Error>,
        elapsed: Duration,
    ) -> Execution {
        match result {
            Ok(output) => {
                tracing::debug!(
                    command,
                    exit_code = ?output.status.code(),
                    elapsed_s = elapsed.as_secs_f64(),
                    "Command finished"
                );
                Execution {
                    stdout: output.stdout,
                    stderr: output.stderr,
                    elapsed,
                }
            }
            Err(e) => {
                // Spawn failures still produce a record so the job is accounted for.
                tracing::error!(command, error = %e, "Failed to spawn command");
                Execution {
                    stdout: Vec::new(),
                    stderr: format!("failed to spawn command: {}\n", e).into_bytes(),
                    elapsed,
                }
            }
        }
    }
}
