use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::nullable;
use crate::config::AgentConfig;
use crate::state::NodeState;

pub const NODE_STATUS_INITIALIZING: &str = "initializing";
pub const NODE_STATUS_READY: &str = "ready";

const DRIVER_RAW_EXEC: &str = "raw_exec";
const DISK_MB: i64 = 2000;
const MIN_DYNAMIC_PORT: i64 = 20000;
const MAX_DYNAMIC_PORT: i64 = 32000;
const OS_SIGNALS: &str = "SIGSEGV,SIGSTOP,SIGSYS,SIGWINCH,SIGNULL,SIGALRM,SIGBUS,SIGHUP,SIGILL,\
SIGIO,SIGTRAP,SIGTSTP,SIGFPE,SIGKILL,SIGPROF,SIGTERM,SIGTTIN,SIGUSR1,SIGUSR2,SIGXCPU,SIGABRT,\
SIGINT,SIGTTOU,SIGXFSZ,SIGCONT,SIGIOT,SIGPIPE,SIGQUIT";

/// Registration payload describing this node's identity and capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeDescriptor {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "SecretID")]
    pub secret_id: String,
    pub datacenter: String,
    pub name: String,
    pub status: String,
    #[serde(deserialize_with = "nullable")]
    pub attributes: HashMap<String, String>,
    #[serde(deserialize_with = "nullable")]
    pub drivers: HashMap<String, DriverInfo>,
    pub node_resources: Option<NodeResources>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DriverInfo {
    #[serde(deserialize_with = "nullable")]
    pub attributes: HashMap<String, String>,
    pub detected: bool,
    pub healthy: bool,
    pub health_description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeResources {
    pub min_dynamic_port: i64,
    pub max_dynamic_port: i64,
    pub disk: NodeDiskResources,
    pub memory: NodeMemoryResources,
    pub processors: NodeProcessorResources,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDiskResources {
    #[serde(rename = "DiskMB")]
    pub disk_mb: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeMemoryResources {
    #[serde(rename = "MemoryMB")]
    pub memory_mb: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeProcessorResources {
    pub topology: Topology,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Topology {
    #[serde(deserialize_with = "nullable")]
    pub cores: Vec<Core>,
    pub override_total_compute: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Core {
    #[serde(rename = "SocketID")]
    pub socket_id: u8,
    #[serde(rename = "NodeID")]
    pub node_id: u8,
    #[serde(rename = "ID")]
    pub id: u16,
    pub guess_speed: u64,
}

/// CPU architecture under the names the control plane expects.
fn cpu_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        other => other,
    }
}

impl NodeDescriptor {
    /// Build the descriptor from persisted identity, static config and the
    /// host name.
    pub fn build(state: &NodeState, config: &AgentConfig, hostname: &str) -> Self {
        let mhz = u64::from(config.mhz);
        let memory_mb = i64::from(config.mem_mb);

        let attributes = HashMap::from([
            ("cpu.arch".to_string(), cpu_arch().to_string()),
            ("cpu.numcores".to_string(), config.cores.to_string()),
            ("cpu.totalcompute".to_string(), mhz.to_string()),
            ("cpu.usablecompute".to_string(), mhz.to_string()),
            ("kernel.name".to_string(), std::env::consts::OS.to_string()),
            (
                "memory.totalbytes".to_string(),
                (memory_mb * 1024 * 1024).to_string(),
            ),
            ("nomad.service_discovery".to_string(), "false".to_string()),
            ("os.signals".to_string(), OS_SIGNALS.to_string()),
            ("unique.hostname".to_string(), hostname.to_string()),
            (
                "nomadlet.version".to_string(),
                env!("CARGO_PKG_VERSION").to_string(),
            ),
        ]);

        let drivers = HashMap::from([(
            DRIVER_RAW_EXEC.to_string(),
            DriverInfo {
                attributes: HashMap::new(),
                detected: true,
                healthy: true,
                health_description: "Healthy".to_string(),
            },
        )]);

        let resources = NodeResources {
            min_dynamic_port: MIN_DYNAMIC_PORT,
            max_dynamic_port: MAX_DYNAMIC_PORT,
            disk: NodeDiskResources { disk_mb: DISK_MB },
            memory: NodeMemoryResources { memory_mb },
            processors: NodeProcessorResources {
                topology: Topology {
                    cores: vec![Core {
                        guess_speed: mhz,
                        ..Default::default()
                    }],
                    override_total_compute: mhz,
                },
            },
        };

        Self {
            id: state.node_id.clone(),
            secret_id: state.node_secret.clone(),
            datacenter: config.datacenter.clone(),
            name: config.name.clone(),
            status: NODE_STATUS_INITIALIZING.to_string(),
            attributes,
            drivers,
            node_resources: Some(resources),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_carries_identity_and_capacity() {
        let state = NodeState {
            node_id: "6f1c1d4e-1111-2222-3333-444455556666".to_string(),
            node_secret: "secret".to_string(),
        };
        let config = AgentConfig {
            name: "worker-1".to_string(),
            datacenter: "dc2".to_string(),
            mhz: 2400,
            mem_mb: 512,
            ..AgentConfig::default()
        };

        let node = NodeDescriptor::build(&state, &config, "host-a");

        assert_eq!(node.id, state.node_id);
        assert_eq!(node.secret_id, "secret");
        assert_eq!(node.name, "worker-1");
        assert_eq!(node.datacenter, "dc2");
        assert_eq!(node.status, NODE_STATUS_INITIALIZING);
        assert_eq!(node.attributes["unique.hostname"], "host-a");
        assert_eq!(node.attributes["cpu.totalcompute"], "2400");
        assert_eq!(node.attributes["memory.totalbytes"], "536870912");
        assert!(node.drivers["raw_exec"].healthy);

        let resources = node.node_resources.unwrap();
        assert_eq!(resources.memory.memory_mb, 512);
        assert_eq!(resources.processors.topology.override_total_compute, 2400);
        assert_eq!(resources.processors.topology.cores.len(), 1);
    }
}
