use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::allocs::AllocationApi;
use crate::structs::AllocationIndex;

/// Control surface of one running allocation supervisor.
pub trait AllocHandle: Send {
    /// The allocation changed on the server. Only called with a ModifyIndex
    /// greater than any previously applied for this allocation.
    fn update(&mut self, modify_index: u64);

    /// Cancel the allocation. Must not wait for its tasks to exit.
    fn stop(&mut self);
}

/// Creates and starts allocation supervisors.
pub trait AllocLauncher: Send + Sync {
    type Handle: AllocHandle;

    fn launch(&self, alloc_id: &str, modify_index: u64) -> Self::Handle;
}

struct RegistryEntry<H> {
    /// Highest ModifyIndex applied for this allocation.
    modify_index: u64,
    handle: H,
}

/// Actions taken by one reconciliation pass, each list sorted by ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub started: Vec<String>,
    pub updated: Vec<String>,
    pub stopped: Vec<String>,
}

impl ReconcileSummary {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.updated.is_empty() && self.stopped.is_empty()
    }
}

/// Converges running allocation supervisors toward the server's desired
/// allocation set.
///
/// The reconciler is the only writer of its registry. A supervisor whose
/// tasks have all exited stays registered until the server drops the
/// allocation.
pub struct Reconciler<L: AllocLauncher> {
    launcher: L,
    registry: HashMap<String, RegistryEntry<L::Handle>>,
}

impl<L: AllocLauncher> Reconciler<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            registry: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn contains(&self, alloc_id: &str) -> bool {
        self.registry.contains_key(alloc_id)
    }

    /// Last ModifyIndex applied for an allocation.
    pub fn modify_index(&self, alloc_id: &str) -> Option<u64> {
        self.registry.get(alloc_id).map(|e| e.modify_index)
    }

    pub fn handle(&self, alloc_id: &str) -> Option<&L::Handle> {
        self.registry.get(alloc_id).map(|e| &e.handle)
    }

    pub fn alloc_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Apply one desired-state snapshot to the registry.
    pub fn apply(&mut self, desired: &AllocationIndex) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for (alloc_id, &modify_index) in desired {
            match self.registry.get_mut(alloc_id) {
                None => {
                    tracing::debug!(alloc_id = %alloc_id, modify_index, "Starting allocation");
                    let handle = self.launcher.launch(alloc_id, modify_index);
                    self.registry.insert(
                        alloc_id.clone(),
                        RegistryEntry {
                            modify_index,
                            handle,
                        },
                    );
                    summary.started.push(alloc_id.clone());
                }
                Some(entry) if modify_index > entry.modify_index => {
                    tracing::debug!(
                        alloc_id = %alloc_id,
                        from = entry.modify_index,
                        to = modify_index,
                        "Updating allocation"
                    );
                    entry.handle.update(modify_index);
                    entry.modify_index = modify_index;
                    summary.updated.push(alloc_id.clone());
                }
                Some(_) => {}
            }
        }

        let removed: Vec<String> = self
            .registry
            .keys()
            .filter(|id| !desired.contains_key(*id))
            .cloned()
            .collect();
        for alloc_id in removed {
            if let Some(mut entry) = self.registry.remove(&alloc_id) {
                tracing::debug!(alloc_id = %alloc_id, "Stopping allocation");
                entry.handle.stop();
                summary.stopped.push(alloc_id);
            }
        }

        summary.started.sort();
        summary.updated.sort();
        summary.stopped.sort();
        summary
    }

    /// Poll `api` and reconcile until `cancel` fires.
    ///
    /// A failed poll leaves every running allocation as it is and is retried
    /// after `retry`.
    pub async fn run<A: AllocationApi + ?Sized>(
        &mut self,
        api: &A,
        poll_interval: Duration,
        retry: Duration,
        cancel: CancellationToken,
    ) {
        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = api.client_allocs() => polled,
            };

            let delay = match polled {
                Ok(desired) => {
                    let summary = self.apply(&desired);
                    if !summary.is_empty() {
                        tracing::info!(
                            started = summary.started.len(),
                            updated = summary.updated.len(),
                            stopped = summary.stopped.len(),
                            running = self.registry.len(),
                            "Reconciled allocations"
                        );
                    }
                    poll_interval
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to fetch client allocations");
                    retry
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::debug!(running = self.registry.len(), "No longer fetching allocations");
    }
}
