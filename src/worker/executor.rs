use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::allocs::driver::TaskDriverConfig;
use crate::error::{AgentError, Result};
use crate::structs::Task;

/// How a task's process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The process exited on its own. `None` when it died from a signal.
    Exited(Option<i32>),
    /// The process was killed because its allocation was stopped.
    Killed,
    /// The task never started or could not be waited on.
    Failed(String),
}

/// Runs one task's process on the host.
///
/// The executable is resolved on the search path unless given as an absolute
/// path. The process gets the task's environment only, and its stdout and
/// stderr go to `<log_dir>/<alloc_id>-<task>.stdout.log` and `.stderr.log`.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    alloc_id: String,
    task: Task,
    log_dir: PathBuf,
}

impl TaskExecutor {
    pub fn new(alloc_id: impl Into<String>, task: Task, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            alloc_id: alloc_id.into(),
            task,
            log_dir: log_dir.into(),
        }
    }

    pub fn stdout_path(&self) -> PathBuf {
        self.log_path("stdout")
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.log_path("stderr")
    }

    fn log_path(&self, stream: &str) -> PathBuf {
        self.log_dir
            .join(format!("{}-{}.{}.log", self.alloc_id, self.task.name, stream))
    }

    /// Run the task until it exits or `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> TaskOutcome {
        // Stopped before launch: leave no process and no truncated logs.
        if cancel.is_cancelled() {
            tracing::info!(alloc_id = %self.alloc_id, task = %self.task.name, "Task skipped, allocation already stopped");
            return TaskOutcome::Killed;
        }

        let mut child = match self.spawn().await {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(alloc_id = %self.alloc_id, task = %self.task.name, error = %e, "Failed to start task");
                return TaskOutcome::Failed(e.to_string());
            }
        };

        tracing::info!(alloc_id = %self.alloc_id, task = %self.task.name, pid = ?child.id(), "Task started");

        let outcome = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => TaskOutcome::Exited(status.code()),
                Err(e) => TaskOutcome::Failed(e.to_string()),
            },
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(alloc_id = %self.alloc_id, task = %self.task.name, error = %e, "Failed to kill task");
                }
                TaskOutcome::Killed
            }
        };

        tracing::info!(
            alloc_id = %self.alloc_id,
            task = %self.task.name,
            outcome = ?outcome,
            "Task finished"
        );
        outcome
    }

    async fn spawn(&self) -> Result<Child> {
        let TaskDriverConfig::RawExec(config) = TaskDriverConfig::from_task(&self.task)?;
        let program = resolve_command(&config.command)?;

        let stdout = create_log(&self.stdout_path()).await?;
        let stderr = create_log(&self.stderr_path()).await?;

        let child = Command::new(&program)
            .args(&config.args)
            .env_clear()
            .envs(&self.task.env)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::Task(format!("cannot spawn {}: {}", program.display(), e)))?;
        Ok(child)
    }
}

/// Absolute path of the executable for `command`.
fn resolve_command(command: &str) -> Result<PathBuf> {
    let path = Path::new(command);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    which::which(command)
        .map_err(|e| AgentError::Task(format!("cannot find executable {:?}: {}", command, e)))
}

async fn create_log(path: &Path) -> Result<Stdio> {
    let file = tokio::fs::File::create(path).await.map_err(|e| {
        AgentError::Task(format!("cannot create log {}: {}", path.display(), e))
    })?;
    Ok(Stdio::from(file.into_std().await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_paths_are_per_alloc_and_task() {
        let task = Task {
            name: "web".to_string(),
            ..Default::default()
        };
        let exec = TaskExecutor::new("a1", task, "/var/log/nomadlet");
        assert_eq!(
            exec.stdout_path(),
            PathBuf::from("/var/log/nomadlet/a1-web.stdout.log")
        );
        assert_eq!(
            exec.stderr_path(),
            PathBuf::from("/var/log/nomadlet/a1-web.stderr.log")
        );
    }

    #[test]
    fn absolute_command_used_as_is() {
        assert_eq!(
            resolve_command("/opt/app/bin/server").unwrap(),
            PathBuf::from("/opt/app/bin/server")
        );
    }

    #[test]
    fn unknown_command_fails_to_resolve() {
        assert!(resolve_command("nonexistent_command_12345").is_err());
    }
}
