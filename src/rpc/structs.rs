//! Request and response envelopes for the control-plane RPC methods.
//!
//! Field names follow the server's PascalCase encoding; durations travel as
//! signed nanosecond counts.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::structs::{duration_nanos, nullable, Allocation, NodeDescriptor};

pub const METHOD_STATUS_PING: &str = "Status.Ping";
pub const METHOD_NODE_REGISTER: &str = "Node.Register";
pub const METHOD_NODE_UPDATE_STATUS: &str = "Node.UpdateStatus";
pub const METHOD_NODE_GET_CLIENT_ALLOCS: &str = "Node.GetClientAllocs";
pub const METHOD_ALLOC_GET_ALLOCS: &str = "Alloc.GetAllocs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestHeader {
    pub service_method: String,
    pub seq: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ResponseHeader {
    pub method: String,
    pub seq: u64,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QueryRequest {
    pub region: String,
    pub namespace: String,
    pub auth_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeRegisterRequest {
    pub node: Option<NodeDescriptor>,
    pub region: String,
    pub auth_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeUpdateStatusRequest {
    #[serde(rename = "NodeID")]
    pub node_id: String,
    pub status: String,
    pub region: String,
    pub auth_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeSpecificRequest {
    #[serde(rename = "NodeID")]
    pub node_id: String,
    #[serde(rename = "SecretID")]
    pub secret_id: String,
    pub region: String,
    pub auth_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AllocsGetRequest {
    #[serde(rename = "AllocIDs", deserialize_with = "nullable")]
    pub alloc_ids: Vec<String>,
    pub region: String,
    pub namespace: String,
    pub auth_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeServerInfo {
    #[serde(rename = "RPCAdvertiseAddr")]
    pub rpc_advertise_addr: String,
    pub datacenter: String,
}

/// Reply to `Node.Register` and `Node.UpdateStatus`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeUpdateResponse {
    #[serde(rename = "HeartbeatTTL", with = "duration_nanos")]
    pub heartbeat_ttl: Duration,
    #[serde(deserialize_with = "nullable")]
    pub servers: Vec<NodeServerInfo>,
    pub scheduling_eligibility: String,
    pub index: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeClientAllocsResponse {
    #[serde(deserialize_with = "nullable")]
    pub allocs: HashMap<String, u64>,
    pub index: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AllocsGetResponse {
    #[serde(deserialize_with = "nullable")]
    pub allocs: Vec<Allocation>,
    pub index: u64,
}
