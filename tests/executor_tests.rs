use std::time::Duration;

use calcit::worker::CommandExecutor;

fn stdout(execution: &calcit::worker::Execution) -> String {
    String::from_utf8_lossy(&execution.stdout).into_owned()
}

fn stderr(execution: &calcit::worker::Execution) -> String {
    String::from_utf8_lossy(&execution.stderr).into_owned()
}

#[tokio::test]
async fn test_execute_echo() {
    let execution = CommandExecutor::new().execute("echo hello").await;

    assert_eq!(stdout(&execution), "hello\n");
    assert!(execution.stderr.is_empty());
    assert!(execution.elapsed_seconds() >= 0.0);
}

#[tokio::test]
async fn test_execute_sleep_measures_wall_clock() {
    let execution = CommandExecutor::new().execute("sleep 1").await;

    assert!(
        execution.elapsed_seconds() >= 0.99,
        "elapsed was {}",
        execution.elapsed_seconds()
    );
    assert!(execution.stdout.is_empty());
    assert!(execution.stderr.is_empty());
}

#[tokio::test]
async fn test_execute_empty_output() {
    let execution = CommandExecutor::new().execute("true").await;

    assert!(execution.stdout.is_empty());
    assert!(execution.stderr.is_empty());
}

#[tokio::test]
async fn test_execute_large_output() {
    let execution = CommandExecutor::new().execute("seq 1 1000").await;

    assert_eq!(stdout(&execution).lines().count(), 1000);
}

#[tokio::test]
async fn test_nonzero_exit_is_not_an_error() {
    let execution = CommandExecutor::new()
        .execute("echo partial; echo 'error message' >&2; exit 3")
        .await;

    assert_eq!(stdout(&execution), "partial\n");
    assert_eq!(stderr(&execution), "error message\n");
}

#[tokio::test]
async fn test_execute_invalid_command() {
    let execution = CommandExecutor::new()
        .execute("nonexistent_command_12345")
        .await;

    assert!(execution.stdout.is_empty());
    assert!(!execution.stderr.is_empty());
}

#[tokio::test]
async fn test_execute_with_special_characters() {
    let execution = CommandExecutor::new().execute("echo 'hello $USER'").await;

    // Single quotes prevent variable expansion
    assert_eq!(stdout(&execution), "hello $USER\n");
}

#[tokio::test]
async fn test_execute_piped_commands() {
    let execution = CommandExecutor::new()
        .execute("echo 'hello world' | wc -w")
        .await;

    assert_eq!(stdout(&execution).trim(), "2");
}

#[tokio::test]
async fn test_binary_output_is_kept_verbatim() {
    let execution = CommandExecutor::new().execute("printf '\\377\\376x'").await;

    assert_eq!(execution.stdout, vec![0xff, 0xfe, b'x']);
}

#[tokio::test]
async fn test_post_delay_runs_after_capture() {
    let started = std::time::Instant::now();
    let execution = CommandExecutor::new()
        .with_post_delay(Duration::from_millis(200))
        .execute("echo done")
        .await;

    assert_eq!(stdout(&execution), "done\n");
    assert!(started.elapsed() >= Duration::from_millis(200));
}
