use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::allocs::{AllocRunnerConfig, Reconciler, RunnerLauncher};
use crate::config::{hostname, AgentConfig};
use crate::error::Result;
use crate::rpc::structs::NodeUpdateResponse;
use crate::rpc::RpcClient;
use crate::state::NodeState;
use crate::structs::NodeDescriptor;
use crate::worker::HeartbeatLoop;

/// The client agent: owns the node identity and runs every background loop.
pub struct Node {
    config: AgentConfig,
    state: NodeState,
    descriptor: NodeDescriptor,
    client: Arc<RpcClient>,
}

impl Node {
    /// Validate the configuration and load (or create) the node identity.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or when the identity cannot be read or
    /// persisted. Nothing is sent to the server yet.
    pub async fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;

        let (state, generated) = NodeState::load_or_generate(&config.state_path).await?;
        if !generated {
            tracing::info!(node_id = %state.node_id, "Loaded node identity");
        }

        let host = hostname().unwrap_or_else(|| config.name.clone());
        let descriptor = NodeDescriptor::build(&state, &config, &host);
        let client = Arc::new(RpcClient::new(
            config.server.clone(),
            config.region.clone(),
            &state,
        ));

        Ok(Self {
            config,
            state,
            descriptor,
            client,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.state.node_id
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    pub fn client(&self) -> Arc<RpcClient> {
        self.client.clone()
    }

    /// Run the agent until `shutdown` fires.
    ///
    /// 1. Registers the node, retrying forever on a fixed delay
    /// 2. Spawns the heartbeat loop, seeded with the registration TTL
    /// 3. Spawns the allocation reconciler, whose runners hang off a child of
    ///    `shutdown`
    /// 4. Spawns the server liveness probe
    ///
    /// Returns once every loop has exited and every allocation's tasks have
    /// been torn down.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let Some(registration) = self.register(&shutdown).await else {
            tracing::info!("Shutdown requested before registration completed");
            return Ok(());
        };

        let loops = self.config.loops.clone();
        let tracker = TaskTracker::new();

        let heartbeat = HeartbeatLoop::new(registration.heartbeat_ttl, loops.heartbeat_retry);
        let client = self.client.clone();
        let cancel = shutdown.clone();
        tracker.spawn(async move {
            heartbeat.run(client.as_ref(), cancel).await;
        });

        let alloc_cancel = shutdown.child_token();
        let launcher = RunnerLauncher::new(
            self.client.clone(),
            alloc_cancel.clone(),
            AllocRunnerConfig {
                log_dir: self.config.log_dir.clone(),
                fetch_retry: loops.alloc_fetch_retry,
            },
        );
        let client = self.client.clone();
        tracker.spawn(async move {
            let mut reconciler = Reconciler::new(launcher);
            reconciler
                .run(
                    client.as_ref(),
                    loops.poll_interval,
                    loops.poll_retry,
                    alloc_cancel,
                )
                .await;

            // Runners were cancelled with their parent token; wait for their
            // tasks to be killed.
            for alloc_id in reconciler.alloc_ids() {
                if let Some(handle) = reconciler.handle(&alloc_id) {
                    handle.wait_exited().await;
                }
            }
        });

        tracker.spawn(ping_loop(
            self.client.clone(),
            loops.ping_interval,
            shutdown.clone(),
        ));

        tracker.close();
        tracker.wait().await;

        tracing::info!(node_id = %self.state.node_id, "Node shut down");
        Ok(())
    }

    /// Register until the server accepts, or `None` if cancelled first.
    async fn register(&self, cancel: &CancellationToken) -> Option<NodeUpdateResponse> {
        tracing::info!(
            node_id = %self.state.node_id,
            name = %self.config.name,
            server = %self.config.server,
            "Registering node"
        );

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => return None,
                result = self.client.register(&self.descriptor) => result,
            };

            match result {
                Ok(resp) => {
                    tracing::info!(
                        node_id = %self.state.node_id,
                        heartbeat_ttl_ms = resp.heartbeat_ttl.as_millis() as u64,
                        servers = ?resp.servers.iter().map(|s| s.rpc_advertise_addr.as_str()).collect::<Vec<_>>(),
                        "Registered node"
                    );
                    return Some(resp);
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        retry_ms = self.config.loops.register_retry.as_millis() as u64,
                        "Failed to register node, retrying"
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.config.loops.register_retry) => {}
            }
        }
    }
}

/// Probe the server on a fixed interval. Failures are only logged.
async fn ping_loop(client: Arc<RpcClient>, interval: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let started = tokio::time::Instant::now();
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = client.ping() => result,
        };

        match result {
            Ok(()) => {
                tracing::debug!(latency_us = started.elapsed().as_micros() as u64, "Server ping");
            }
            Err(e) => tracing::warn!(error = %e, "Server ping failed"),
        }
    }
}
