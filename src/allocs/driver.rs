//! Typed task driver configuration.
//!
//! A task's `Config` arrives as a free-form map. It is resolved once, when
//! the task is launched, into the record for its driver kind. Unknown drivers
//! and malformed shapes are rejected rather than defaulted.

use serde::Deserialize;

use crate::structs::Task;

#[derive(Debug, thiserror::Error)]
pub enum DriverConfigError {
    #[error("Unsupported task driver: {0:?}")]
    UnsupportedDriver(String),

    #[error("Malformed {driver} config: {source}")]
    Malformed {
        driver: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Task config is missing a command")]
    MissingCommand,
}

/// Config for running one binary directly on the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawExecConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDriverConfig {
    RawExec(RawExecConfig),
}

impl TaskDriverConfig {
    pub fn from_task(task: &Task) -> Result<Self, DriverConfigError> {
        match task.driver.as_str() {
            "raw_exec" | "exec" => {
                let value = serde_json::Value::Object(task.config.clone());
                let config: RawExecConfig =
                    serde_json::from_value(value).map_err(|source| DriverConfigError::Malformed {
                        driver: task.driver.clone(),
                        source,
                    })?;
                if config.command.trim().is_empty() {
                    return Err(DriverConfigError::MissingCommand);
                }
                Ok(TaskDriverConfig::RawExec(config))
            }
            other => Err(DriverConfigError::UnsupportedDriver(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(driver: &str, config: serde_json::Value) -> Task {
        let config = match config {
            serde_json::Value::Object(map) => map,
            _ => panic!("config must be an object"),
        };
        Task {
            name: "server".to_string(),
            driver: driver.to_string(),
            config,
            ..Default::default()
        }
    }

    #[test]
    fn raw_exec_with_args() {
        let cfg = TaskDriverConfig::from_task(&task(
            "raw_exec",
            json!({"command": "/bin/echo", "args": ["hello", "world"]}),
        ))
        .unwrap();
        assert_eq!(
            cfg,
            TaskDriverConfig::RawExec(RawExecConfig {
                command: "/bin/echo".to_string(),
                args: vec!["hello".to_string(), "world".to_string()],
            })
        );
    }

    #[test]
    fn args_are_optional() {
        let TaskDriverConfig::RawExec(cfg) =
            TaskDriverConfig::from_task(&task("exec", json!({"command": "sleep"}))).unwrap();
        assert!(cfg.args.is_empty());
    }

    #[test]
    fn unknown_driver_rejected() {
        let err = TaskDriverConfig::from_task(&task("docker", json!({"image": "redis"})))
            .unwrap_err();
        assert!(matches!(err, DriverConfigError::UnsupportedDriver(d) if d == "docker"));
    }

    #[test]
    fn missing_command_rejected() {
        let err = TaskDriverConfig::from_task(&task("raw_exec", json!({"args": ["x"]})))
            .unwrap_err();
        assert!(matches!(err, DriverConfigError::Malformed { .. }));

        let err = TaskDriverConfig::from_task(&task("raw_exec", json!({"command": " "})))
            .unwrap_err();
        assert!(matches!(err, DriverConfigError::MissingCommand));
    }

    #[test]
    fn wrong_arg_type_rejected() {
        let err = TaskDriverConfig::from_task(&task(
            "raw_exec",
            json!({"command": "/bin/echo", "args": [1, 2]}),
        ))
        .unwrap_err();
        assert!(matches!(err, DriverConfigError::Malformed { .. }));
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = TaskDriverConfig::from_task(&task(
            "raw_exec",
            json!({"command": "/bin/echo", "image": "alpine"}),
        ))
        .unwrap_err();
        assert!(matches!(err, DriverConfigError::Malformed { .. }));
    }
}
