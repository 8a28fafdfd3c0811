use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{duration_nanos, nullable};

/// A unit of work the control plane has placed on this node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Allocation {
    #[serde(rename = "ID")]
    pub id: String,
    pub namespace: String,
    pub job: Option<Job>,
    pub task_group: String,
    pub desired_status: String,
    pub client_status: String,
    pub client_description: String,
    pub modify_index: u64,
    /// Not bumped by client-side updates, only by the server.
    pub alloc_modify_index: u64,
}

impl Allocation {
    /// The task group this allocation declares, if its job defines it.
    pub fn group(&self) -> Option<&TaskGroup> {
        self.job
            .as_ref()?
            .task_groups
            .iter()
            .find(|tg| tg.name == self.task_group)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Job {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    #[serde(rename = "Type")]
    pub job_type: String,
    #[serde(deserialize_with = "nullable")]
    pub task_groups: Vec<TaskGroup>,
    #[serde(deserialize_with = "nullable")]
    pub meta: HashMap<String, String>,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskGroup {
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub tasks: Vec<Task>,
    #[serde(deserialize_with = "nullable")]
    pub meta: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Task {
    pub name: String,
    pub driver: String,
    pub user: String,
    /// Driver-specific settings, validated by
    /// [`TaskDriverConfig`](crate::allocs::driver::TaskDriverConfig).
    #[serde(deserialize_with = "nullable")]
    pub config: serde_json::Map<String, serde_json::Value>,
    #[serde(deserialize_with = "nullable")]
    pub env: HashMap<String, String>,
    pub resources: Option<Resources>,
    #[serde(deserialize_with = "nullable")]
    pub meta: HashMap<String, String>,
    #[serde(with = "duration_nanos")]
    pub kill_timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Resources {
    #[serde(rename = "CPU")]
    pub cpu: i64,
    pub cores: i64,
    #[serde(rename = "MemoryMB")]
    pub memory_mb: i64,
    #[serde(rename = "MemoryMaxMB")]
    pub memory_max_mb: i64,
    #[serde(rename = "DiskMB")]
    pub disk_mb: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::codec::{decode_frame, encode_message};

    fn alloc_with_groups(declared: &str, groups: &[&str]) -> Allocation {
        Allocation {
            id: "a1".to_string(),
            task_group: declared.to_string(),
            job: Some(Job {
                id: "example".to_string(),
                task_groups: groups
                    .iter()
                    .map(|name| TaskGroup {
                        name: name.to_string(),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn group_finds_declared_task_group() {
        let alloc = alloc_with_groups("cache", &["web", "cache"]);
        assert_eq!(alloc.group().map(|tg| tg.name.as_str()), Some("cache"));
    }

    #[test]
    fn group_missing_when_job_lacks_it() {
        assert!(alloc_with_groups("db", &["web"]).group().is_none());

        let no_job = Allocation {
            task_group: "web".to_string(),
            ..Default::default()
        };
        assert!(no_job.group().is_none());
    }

    #[test]
    fn allocation_decodes_with_nil_collections_and_extra_fields() {
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct GoTask {
            name: String,
            driver: String,
            config: Option<HashMap<String, String>>,
            env: Option<HashMap<String, String>>,
            kill_timeout: i64,
            leader: bool,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct GoGroup {
            name: String,
            tasks: Vec<GoTask>,
            meta: Option<HashMap<String, String>>,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct GoJob {
            #[serde(rename = "ID")]
            id: String,
            task_groups: Vec<GoGroup>,
            payload: Option<Vec<u8>>,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct GoAlloc {
            #[serde(rename = "ID")]
            id: String,
            job: GoJob,
            task_group: String,
            modify_index: u64,
            signing_key_id: String,
        }

        let encoded = encode_message(&GoAlloc {
            id: "a1".to_string(),
            job: GoJob {
                id: "example".to_string(),
                task_groups: vec![GoGroup {
                    name: "web".to_string(),
                    tasks: vec![GoTask {
                        name: "server".to_string(),
                        driver: "raw_exec".to_string(),
                        config: Some(HashMap::from([(
                            "command".to_string(),
                            "/bin/true".to_string(),
                        )])),
                        env: None,
                        kill_timeout: 5_000_000_000,
                        leader: false,
                    }],
                    meta: None,
                }],
                payload: None,
            },
            task_group: "web".to_string(),
            modify_index: 12,
            signing_key_id: String::new(),
        })
        .unwrap();

        let alloc: Allocation = decode_frame(&encoded).unwrap();
        assert_eq!(alloc.modify_index, 12);
        let group = alloc.group().unwrap();
        let task = &group.tasks[0];
        assert_eq!(task.driver, "raw_exec");
        assert_eq!(task.config["command"], "/bin/true");
        assert!(task.env.is_empty());
        assert_eq!(task.kill_timeout, Duration::from_secs(5));
        assert!(group.meta.is_empty());
    }
}
