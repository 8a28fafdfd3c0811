
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use nomadlet::structs::Task;
use nomadlet::worker::{TaskExecutor, TaskOutcome};
use test_harness::exec_task;

async fn run_task(task: Task) -> (TaskOutcome, tempfile::TempDir, TaskExecutor) {
    let log_dir = tempfile::tempdir().unwrap();
    let executor = TaskExecutor::new("alloc-1", task, log_dir.path());
    let outcome = executor.clone().run(CancellationToken::new()).await;
    (outcome, log_dir, executor)
}

#[tokio::test]
async fn test_execute_simple_command() {
    let (outcome, _dir, executor) = run_task(exec_task("hello", "echo", &["hello"])).await;

    assert_eq!(outcome, TaskOutcome::Exited(Some(0)));
    let stdout = std::fs::read_to_string(executor.stdout_path()).unwrap();
    assert_eq!(stdout, "hello\n");
    let stderr = std::fs::read_to_string(executor.stderr_path()).unwrap();
    assert!(stderr.is_empty());
}

#[tokio::test]
async fn test_execute_large_output() {
    let (outcome, _dir, executor) = run_task(exec_task("seq", "seq", &["1", "1000"])).await;

    assert_eq!(outcome, TaskOutcome::Exited(Some(0)));
    let stdout = std::fs::read_to_string(executor.stdout_path()).unwrap();
    assert_eq!(stdout.lines().count(), 1000);
}

#[tokio::test]
async fn test_execute_command_failure() {
    let (outcome, _dir, _) = run_task(exec_task("fail", "sh", &["-c", "exit 3"])).await;

    assert_eq!(outcome, TaskOutcome::Exited(Some(3)));
}

#[tokio::test]
async fn test_execute_captures_stderr() {
    let (outcome, _dir, executor) = run_task(exec_task(
        "err",
        "sh",
        &["-c", "echo 'error message' >&2; exit 1"],
    ))
    .await;

    assert_eq!(outcome, TaskOutcome::Exited(Some(1)));
    let stderr = std::fs::read_to_string(executor.stderr_path()).unwrap();
    assert!(stderr.contains("error message"));
}

#[tokio::test]
async fn test_args_are_not_shell_expanded() {
    let (outcome, _dir, executor) = run_task(exec_task("lit", "echo", &["hello $USER"])).await;

    assert_eq!(outcome, TaskOutcome::Exited(Some(0)));
    let stdout = std::fs::read_to_string(executor.stdout_path()).unwrap();
    assert_eq!(stdout, "hello $USER\n");
}

#[tokio::test]
async fn test_environment_is_task_env_only() {
    let mut task = exec_task("env", "env", &[]);
    task.env.insert("GREETING".to_string(), "hi".to_string());

    let (outcome, _dir, executor) = run_task(task).await;

    assert_eq!(outcome, TaskOutcome::Exited(Some(0)));
    let stdout = std::fs::read_to_string(executor.stdout_path()).unwrap();
    assert_eq!(stdout, "GREETING=hi\n");
}

#[tokio::test]
async fn test_execute_invalid_command() {
    let (outcome, _dir, executor) =
        run_task(exec_task("missing", "nonexistent_command_12345", &[])).await;

    assert!(matches!(outcome, TaskOutcome::Failed(_)));
    assert!(!executor.stdout_path().exists());
}

#[tokio::test]
async fn test_unsupported_driver_fails_task() {
    let mut task = exec_task("docker", "echo", &["hi"]);
    task.driver = "docker".to_string();

    let (outcome, _dir, _) = run_task(task).await;

    match outcome {
        TaskOutcome::Failed(reason) => assert!(reason.contains("docker")),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_kills_running_task() {
    let log_dir = tempfile::tempdir().unwrap();
    let executor = TaskExecutor::new("alloc-1", exec_task("sleep", "sleep", &["60"]), log_dir.path());
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(executor.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("task should stop after cancellation")
        .unwrap();
    assert_eq!(outcome, TaskOutcome::Killed);
}

#[tokio::test]
async fn test_cancelled_before_start_never_spawns() {
    let log_dir = tempfile::tempdir().unwrap();
    let executor = TaskExecutor::new("alloc-1", exec_task("hello", "echo", &["hello"]), log_dir.path());
    std::fs::write(executor.stdout_path(), "previous run\n").unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = executor.clone().run(cancel).await;

    assert_eq!(outcome, TaskOutcome::Killed);
    let stdout = std::fs::read_to_string(executor.stdout_path()).unwrap();
    assert_eq!(stdout, "previous run\n");
    assert!(!executor.stderr_path().exists());
}

#[tokio::test]
async fn test_log_creation_failure_fails_only_that_task() {
    let root = tempfile::tempdir().unwrap();
    let missing_dir = root.path().join("does-not-exist");
    let executor = TaskExecutor::new("alloc-1", exec_task("hello", "echo", &["hello"]), &missing_dir);

    let outcome = executor.run(CancellationToken::new()).await;

    match outcome {
        TaskOutcome::Failed(reason) => assert!(reason.contains("cannot create log"), "{}", reason),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!missing_dir.exists());

    // The same task runs fine once its log directory is usable.
    let (outcome, _dir, _) = run_task(exec_task("hello", "echo", &["hello"])).await;
    assert_eq!(outcome, TaskOutcome::Exited(Some(0)));
}
