use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::allocs::reconciler::{AllocHandle, AllocLauncher};
use crate::allocs::AllocationApi;
use crate::structs::Allocation;
use crate::worker::TaskExecutor;

#[derive(Debug, Clone)]
pub struct AllocRunnerConfig {
    /// Directory for task stdout/stderr logs.
    pub log_dir: PathBuf,
    /// Delay between failed attempts to fetch the allocation.
    pub fetch_retry: Duration,
}

impl Default for AllocRunnerConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("."),
            fetch_retry: Duration::from_secs(3),
        }
    }
}

/// Supervises one allocation until it is stopped.
///
/// Fetches the allocation, resolves its task group and starts one
/// [`TaskExecutor`] per task. Every executor observes the runner's
/// cancellation token.
pub struct AllocRunner<A: ?Sized> {
    alloc_id: String,
    modify_index: u64,
    api: Arc<A>,
    config: AllocRunnerConfig,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl<A: AllocationApi + ?Sized> AllocRunner<A> {
    pub async fn run(self) {
        let Some(alloc) = self.fetch().await else {
            tracing::debug!(alloc_id = %self.alloc_id, "Allocation stopped before it was fetched");
            return;
        };

        let Some(group) = alloc.group() else {
            tracing::error!(
                alloc_id = %self.alloc_id,
                task_group = %alloc.task_group,
                "Task group not found in job, not running allocation"
            );
            return;
        };

        tracing::info!(
            alloc_id = %self.alloc_id,
            modify_index = self.modify_index,
            task_group = %group.name,
            tasks = group.tasks.len(),
            "Starting allocation"
        );

        for task in &group.tasks {
            let executor = TaskExecutor::new(&self.alloc_id, task.clone(), &self.config.log_dir);
            self.tracker.spawn(executor.run(self.cancel.clone()));
        }

        self.cancel.cancelled().await;
        tracing::info!(alloc_id = %self.alloc_id, "Allocation stopped");
    }

    /// Fetch the allocation, retrying until it arrives or the runner is
    /// cancelled.
    async fn fetch(&self) -> Option<Allocation> {
        loop {
            let fetched = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                fetched = self.api.get_alloc(&self.alloc_id) => fetched,
            };

            match fetched {
                Ok(alloc) => return Some(alloc),
                Err(e) => {
                    tracing::error!(alloc_id = %self.alloc_id, error = %e, "Failed to fetch allocation, retrying");
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.config.fetch_retry) => {}
            }
        }
    }
}

/// The reconciler's handle on a running [`AllocRunner`].
#[derive(Debug)]
pub struct AllocRunnerHandle {
    alloc_id: String,
    modify_index: u64,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl AllocRunnerHandle {
    pub fn alloc_id(&self) -> &str {
        &self.alloc_id
    }

    /// Latest ModifyIndex signalled to this runner.
    pub fn modify_index(&self) -> u64 {
        self.modify_index
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the runner and every task it started have exited.
    ///
    /// Observability only: [`AllocHandle::stop`] never waits on this.
    pub async fn wait_exited(&self) {
        self.tracker.wait().await;
    }
}

impl AllocHandle for AllocRunnerHandle {
    fn update(&mut self, modify_index: u64) {
        tracing::warn!(
            alloc_id = %self.alloc_id,
            from = self.modify_index,
            to = modify_index,
            "In-place allocation update not implemented, keeping tasks running"
        );
        self.modify_index = modify_index;
    }

    fn stop(&mut self) {
        self.cancel.cancel();
    }
}

/// Starts an [`AllocRunner`] per allocation under a shared parent token.
pub struct RunnerLauncher<A: ?Sized> {
    api: Arc<A>,
    parent: CancellationToken,
    config: AllocRunnerConfig,
}

impl<A: ?Sized> RunnerLauncher<A> {
    pub fn new(api: Arc<A>, parent: CancellationToken, config: AllocRunnerConfig) -> Self {
        Self {
            api,
            parent,
            config,
        }
    }
}

impl<A: AllocationApi + ?Sized + 'static> AllocLauncher for RunnerLauncher<A> {
    type Handle = AllocRunnerHandle;

    fn launch(&self, alloc_id: &str, modify_index: u64) -> AllocRunnerHandle {
        let cancel = self.parent.child_token();
        let tracker = TaskTracker::new();

        let runner = AllocRunner {
            alloc_id: alloc_id.to_string(),
            modify_index,
            api: self.api.clone(),
            config: self.config.clone(),
            cancel: cancel.clone(),
            tracker: tracker.clone(),
        };
        tracker.spawn(runner.run());
        // The runner stays tracked while it spawns executors, so closing
        // now cannot let wait() finish early.
        tracker.close();

        AllocRunnerHandle {
            alloc_id: alloc_id.to_string(),
            modify_index,
            cancel,
            tracker,
        }
    }
}
