//! Allocation reconciliation and supervision.
//!
//! The control plane owns desired state; this module converges the node's
//! running allocations toward it.
//!
//! # Components
//!
//! - [`Reconciler`]: polls the desired [`AllocationIndex`] and starts,
//!   updates and stops allocation supervisors
//! - [`AllocRunner`]: per-allocation supervisor that fetches the allocation
//!   and launches one executor per task
//! - [`driver`]: typed task driver configuration
//!
//! # Reconciliation Rules
//!
//! For each poll result, per allocation ID:
//!
//! | Desired | Registry | Action |
//! |---------|----------|--------|
//! | present | absent | launch a supervisor |
//! | newer ModifyIndex | present | signal update in place |
//! | same or older ModifyIndex | present | nothing |
//! | absent | present | stop and remove |
//!
//! A failed poll changes nothing.

pub mod driver;
pub mod reconciler;
pub mod runner;

use async_trait::async_trait;

use crate::error::Result;
use crate::structs::{Allocation, AllocationIndex};

pub use reconciler::{AllocHandle, AllocLauncher, ReconcileSummary, Reconciler};
pub use runner::{AllocRunner, AllocRunnerConfig, AllocRunnerHandle, RunnerLauncher};

/// Control-plane queries the allocation engine depends on.
#[async_trait]
pub trait AllocationApi: Send + Sync {
    /// Desired allocations for this node.
    async fn client_allocs(&self) -> Result<AllocationIndex>;

    /// One allocation with its full job definition.
    async fn get_alloc(&self, alloc_id: &str) -> Result<Allocation>;
}
