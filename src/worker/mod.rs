//! Node-side workers.
//!
//! - [`heartbeat`]: periodic liveness reporting to the control plane
//! - [`executor`]: runs one task's process and captures its output to log
//!   files
//!
//! # Execution Flow
//!
//! 1. An allocation runner resolves its task group
//! 2. [`TaskExecutor::run`] resolves the task's driver config and executable
//! 3. The process runs with stdout/stderr redirected to per-task log files
//! 4. It ends on exit or when the allocation's cancellation fires

pub mod executor;
pub mod heartbeat;

pub use executor::{TaskExecutor, TaskOutcome};
pub use heartbeat::{HeartbeatLoop, StatusReporter};
