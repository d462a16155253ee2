//! Integration tests for `CommandExecutor`
//!
//! Tests timeouts, output caps and the task catalog against real shells

#![cfg(unix)]

use std::time::Duration;

use claude_bridge::{BridgeError, CommandExecutor, ExecutorConfig, TaskSpec};

const GENEROUS: Duration = Duration::from_secs(10);
const CAP: usize = 1024 * 1024;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_config(tasks: Vec<TaskSpec>) -> ExecutorConfig {
    ExecutorConfig {
        progress_step: Duration::from_millis(1),
        tasks,
        ..ExecutorConfig::default()
    }
}

fn process_alive(pid: i32) -> bool {
    // Zombies count as gone: they are waiting on a reaper we don't control
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        return stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X");
    }
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

async fn wait_until_gone(pid: i32) -> bool {
    for _ in 0..60 {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_captures_both_streams() {
    init_logger();
    let executor = CommandExecutor::default();

    let output = executor
        .run("echo out; echo err >&2", GENEROUS, CAP)
        .await
        .unwrap();
    assert_eq!(output.stdout, "out\n");
    assert_eq!(output.stderr, "err\n");
    assert!(output.exited_normally);
    assert!(!output.timed_out);
    assert!(!output.truncated);
}

#[tokio::test]
async fn test_nonzero_exit_is_not_normal() {
    init_logger();
    let executor = CommandExecutor::default();

    let output = executor.run("exit 4", GENEROUS, CAP).await.unwrap();
    assert!(!output.exited_normally);
    assert!(!output.timed_out);
}

#[tokio::test]
async fn test_timeout_kills_command() {
    init_logger();
    let executor = CommandExecutor::default();
    let timeout = Duration::from_millis(300);

    let output = executor
        .run("sleep 30 & echo $!; wait", timeout, CAP)
        .await
        .unwrap();
    assert!(output.timed_out);
    assert!(!output.exited_normally);
    assert!(output.duration >= timeout);
    assert!(output.duration < timeout + Duration::from_secs(3), "took {:?}", output.duration);

    let pid: i32 = output.stdout.trim().parse().expect("background pid");
    assert!(wait_until_gone(pid).await, "sleep {pid} survived the timeout");
}

#[tokio::test]
async fn test_partial_output_survives_timeout() {
    init_logger();
    let executor = CommandExecutor::default();

    let output = executor
        .run("echo started; sleep 30", Duration::from_millis(500), CAP)
        .await
        .unwrap();
    assert!(output.timed_out);
    assert_eq!(output.stdout, "started\n");
}

#[tokio::test]
async fn test_output_cap_truncates() {
    init_logger();
    let executor = CommandExecutor::default();

    let output = executor.run("yes", GENEROUS, 1000).await.unwrap();
    assert!(output.truncated);
    assert!(!output.timed_out);
    assert!(!output.exited_normally);
    assert_eq!(output.stdout.len(), 1000);
    assert!(output.stdout.starts_with("y\ny\n"));
    assert!(output.duration < Duration::from_secs(5));
}

#[tokio::test]
async fn test_output_at_cap_is_not_truncated() {
    init_logger();
    let executor = CommandExecutor::default();

    let output = executor.run("printf 12345", GENEROUS, 5).await.unwrap();
    assert_eq!(output.stdout, "12345");
    assert!(!output.truncated);
    assert!(output.exited_normally);
}

#[tokio::test]
async fn test_background_child_does_not_hang_run() {
    init_logger();
    let executor = CommandExecutor::default();

    let output = executor
        .run("sleep 30 & echo done", GENEROUS, CAP)
        .await
        .unwrap();
    assert!(output.exited_normally);
    assert_eq!(output.stdout, "done\n");
    assert!(output.duration < Duration::from_secs(6), "took {:?}", output.duration);
}

#[tokio::test]
async fn test_working_directory() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let executor = CommandExecutor::new(ExecutorConfig {
        cwd: Some(dir.path().to_path_buf()),
        ..ExecutorConfig::default()
    });

    let output = executor.run_command("pwd").await.unwrap();
    let name = dir.path().file_name().unwrap().to_str().unwrap();
    assert!(output.stdout.trim_end().ends_with(name), "got {:?}", output.stdout);
}

#[tokio::test]
async fn test_missing_working_directory_is_launch_error() {
    init_logger();
    let executor = CommandExecutor::new(ExecutorConfig {
        cwd: Some("/nonexistent/claude-bridge-dir".into()),
        ..ExecutorConfig::default()
    });

    let err = executor.run_command("true").await.unwrap_err();
    assert!(matches!(err, BridgeError::LaunchError { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_unknown_task_spawns_nothing() {
    init_logger();
    let executor = CommandExecutor::new(test_config(TaskSpec::defaults()));

    let err = executor.run_task("unknown-id").await.unwrap_err();
    assert!(matches!(err, BridgeError::UnknownTask(ref id) if id == "unknown-id"));

    let mut reported = Vec::new();
    let err = executor
        .run_task_with_progress("unknown-id", |p| reported.push(p))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnknownTask(_)));
    assert!(reported.is_empty());
}

#[tokio::test]
async fn test_task_with_progress() {
    init_logger();
    let executor = CommandExecutor::new(test_config(vec![TaskSpec::new(
        "greet",
        "Greet",
        "echo hi",
        "Say hi",
    )]));

    let mut reported = Vec::new();
    let output = executor
        .run_task_with_progress("greet", |p| reported.push(p))
        .await
        .unwrap();
    assert_eq!(reported, vec![0, 20, 40, 60, 80, 100]);
    assert_eq!(output.stdout, "hi\n");
    assert!(output.exited_normally);
}

#[tokio::test]
async fn test_task_timeout_applies() {
    init_logger();
    let executor = CommandExecutor::new(ExecutorConfig {
        task_timeout: Duration::from_millis(200),
        ..test_config(vec![TaskSpec::new("slow", "Slow", "sleep 30", "Too slow")])
    });

    let output = executor.run_task("slow").await.unwrap();
    assert!(output.timed_out);
}

#[test]
fn test_default_catalog() {
    let executor = CommandExecutor::default();
    let ids: Vec<&str> = executor.tasks().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["system-check", "build-project", "run-tests", "deploy"]);
    assert_eq!(executor.task("deploy").unwrap().display_name, "Deploy");
    assert!(executor.task("nope").is_none());
}
