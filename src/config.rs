use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AgentError, Result};

/// Retry and polling intervals for the agent's background loops.
///
/// Every retry is owned by the loop that performs it; the RPC client itself
/// never retries.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Delay between failed registration attempts.
    pub register_retry: Duration,
    /// Delay before the next heartbeat after a failed one. Replaces the TTL.
    pub heartbeat_retry: Duration,
    /// Interval between successful allocation polls.
    pub poll_interval: Duration,
    /// Delay before polling again after a failed poll.
    pub poll_retry: Duration,
    /// Delay between failed attempts to fetch one allocation.
    pub alloc_fetch_retry: Duration,
    /// Interval of the server liveness probe.
    pub ping_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            register_retry: Duration::from_secs(10),
            heartbeat_retry: Duration::from_secs(3),
            poll_interval: Duration::from_secs(3),
            poll_retry: Duration::from_secs(3),
            alloc_fetch_retry: Duration::from_secs(3),
            ping_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub region: String,
    pub datacenter: String,
    /// Node name. Required.
    pub name: String,
    /// Control-plane RPC address, `host:port`.
    pub server: String,
    /// Where the node identity document lives.
    pub state_path: PathBuf,
    /// Directory for per-task stdout/stderr logs.
    pub log_dir: PathBuf,
    pub cores: u32,
    pub mhz: u32,
    pub mem_mb: u32,
    pub loops: LoopConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            region: "global".to_string(),
            datacenter: "dc1".to_string(),
            name: hostname().unwrap_or_default(),
            server: "127.0.0.1:4647".to_string(),
            state_path: PathBuf::from("state.json"),
            log_dir: PathBuf::from("."),
            cores: 2,
            mhz: 1000,
            mem_mb: 1000,
            loops: LoopConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server: server.into(),
            ..Default::default()
        }
    }

    pub fn with_loops(mut self, loops: LoopConfig) -> Self {
        self.loops = loops;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AgentError::Config("must specify node name".to_string()));
        }
        if self.server.trim().is_empty() {
            return Err(AgentError::Config("must specify server address".to_string()));
        }
        if self.region.trim().is_empty() {
            return Err(AgentError::Config("must specify region".to_string()));
        }
        Ok(())
    }
}

/// The host's name, if it can be determined.
pub fn hostname() -> Option<String> {
    ::hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
}
