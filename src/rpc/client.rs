use std::time::Duration;

use async_trait::async_trait;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::allocs::AllocationApi;
use crate::error::{AgentError, Result};
use crate::rpc::codec::decode_frame;
use crate::rpc::structs::*;
use crate::rpc::transport::Connection;
use crate::state::NodeState;
use crate::structs::node::NODE_STATUS_READY;
use crate::structs::{Allocation, AllocationIndex, NodeDescriptor};
use crate::worker::heartbeat::StatusReporter;

/// Connection and sequence counter, only touched under the client's lock.
struct Wire {
    conn: Option<Connection>,
    seq: u64,
}

/// Synchronous RPC client for the control plane.
///
/// Calls are serialized: exactly one request/response exchange is on the
/// wire at a time and concurrent callers wait their turn. A failed exchange
/// discards the connection and the next call dials a fresh one. The client
/// never retries on its own.
pub struct RpcClient {
    addr: String,
    region: String,
    node_id: String,
    node_secret: String,
    wire: Mutex<Wire>,
}

impl RpcClient {
    pub fn new(addr: impl Into<String>, region: impl Into<String>, state: &NodeState) -> Self {
        Self {
            addr: addr.into(),
            region: region.into(),
            node_id: state.node_id.clone(),
            node_secret: state.node_secret.clone(),
            wire: Mutex::new(Wire { conn: None, seq: 0 }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Perform one request/response exchange.
    ///
    /// A response carrying an error is returned as [`AgentError::Remote`]
    /// after its body has been consumed, and the connection is kept.
    pub async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let mut wire = self.wire.lock().await;
        wire.seq += 1;
        let seq = wire.seq;

        // Held outside the lock state while in flight: if this future is
        // dropped mid-exchange the connection goes with it.
        let mut conn = match wire.conn.take() {
            Some(conn) => conn,
            None => Connection::connect(&self.addr).await?,
        };

        let result = Self::exchange(&mut conn, method, seq, request).await;
        match &result {
            Ok(_) | Err(AgentError::Remote { .. }) => wire.conn = Some(conn),
            Err(e) => {
                tracing::debug!(method, seq, error = %e, "Discarding server connection");
            }
        }
        result
    }

    async fn exchange<Req, Resp>(
        conn: &mut Connection,
        method: &str,
        seq: u64,
        request: &Req,
    ) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let header = RequestHeader {
            service_method: method.to_string(),
            seq,
        };
        conn.feed(&header).await?;
        conn.feed(request).await?;
        conn.flush().await?;

        let reply: ResponseHeader = conn.read().await?;
        // The body always follows, error or not.
        let body = conn.read_frame().await?;

        if reply.seq != seq {
            return Err(AgentError::Protocol(format!(
                "{} response carried seq {}, expected {}",
                method, reply.seq, seq
            )));
        }
        if !reply.error.is_empty() {
            return Err(AgentError::Remote {
                method: method.to_string(),
                message: reply.error,
            });
        }
        Ok(decode_frame(&body)?)
    }

    pub async fn ping(&self) -> Result<()> {
        let req = QueryRequest {
            region: self.region.clone(),
            namespace: String::new(),
            auth_token: self.node_secret.clone(),
        };
        let _: IgnoredAny = self.call(METHOD_STATUS_PING, &req).await?;
        Ok(())
    }

    pub async fn register(&self, node: &NodeDescriptor) -> Result<NodeUpdateResponse> {
        let req = NodeRegisterRequest {
            node: Some(node.clone()),
            region: self.region.clone(),
            auth_token: self.node_secret.clone(),
        };
        self.call(METHOD_NODE_REGISTER, &req).await
    }

    pub async fn update_status(&self, status: &str) -> Result<NodeUpdateResponse> {
        let req = NodeUpdateStatusRequest {
            node_id: self.node_id.clone(),
            status: status.to_string(),
            region: self.region.clone(),
            auth_token: self.node_secret.clone(),
        };
        self.call(METHOD_NODE_UPDATE_STATUS, &req).await
    }

    /// The allocations the server has placed on this node, with their
    /// modify indexes.
    pub async fn client_allocs(&self) -> Result<AllocationIndex> {
        let req = NodeSpecificRequest {
            node_id: self.node_id.clone(),
            secret_id: self.node_secret.clone(),
            region: self.region.clone(),
            auth_token: self.node_secret.clone(),
        };
        let resp: NodeClientAllocsResponse = self.call(METHOD_NODE_GET_CLIENT_ALLOCS, &req).await?;
        Ok(resp.allocs)
    }

    pub async fn get_allocs(&self, alloc_ids: &[String]) -> Result<Vec<Allocation>> {
        // Namespace left empty: allocations are fetched by ID alone.
        let req = AllocsGetRequest {
            alloc_ids: alloc_ids.to_vec(),
            region: self.region.clone(),
            namespace: String::new(),
            auth_token: self.node_secret.clone(),
        };
        let resp: AllocsGetResponse = self.call(METHOD_ALLOC_GET_ALLOCS, &req).await?;
        Ok(resp.allocs)
    }

    /// Fetch exactly one allocation. Any other result count is a protocol
    /// violation.
    pub async fn get_alloc(&self, alloc_id: &str) -> Result<Allocation> {
        let mut allocs = self.get_allocs(&[alloc_id.to_string()]).await?;
        if allocs.len() != 1 {
            return Err(AgentError::Protocol(format!(
                "expected 1 allocation for {}, got {}",
                alloc_id,
                allocs.len()
            )));
        }
        Ok(allocs.remove(0))
    }
}

#[async_trait]
impl AllocationApi for RpcClient {
    async fn client_allocs(&self) -> Result<AllocationIndex> {
        RpcClient::client_allocs(self).await
    }

    async fn get_alloc(&self, alloc_id: &str) -> Result<Allocation> {
        RpcClient::get_alloc(self, alloc_id).await
    }
}

#[async_trait]
impl StatusReporter for RpcClient {
    async fn heartbeat(&self) -> Result<Duration> {
        let resp = self.update_status(NODE_STATUS_READY).await?;
        Ok(resp.heartbeat_ttl)
    }
}
