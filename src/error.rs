use thiserror::Error;

use crate::allocs::driver::DriverConfigError;
use crate::rpc::codec::CodecError;
use crate::state::StateError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Transport error: {0}")]
    Transport(#[from] CodecError),

    #[error("{method} rejected by server: {message}")]
    Remote { method: String, message: String },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Invalid task config: {0}")]
    TaskConfig(#[from] DriverConfigError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Task error: {0}")]
    Task(String),
}

impl AgentError {
    /// True for failures of the connection itself. The connection that
    /// produced one of these has already been discarded.
    pub fn is_transport(&self) -> bool {
        matches!(self, AgentError::Transport(_))
    }

    /// True when the server answered but rejected the request.
    pub fn is_remote(&self) -> bool {
        matches!(self, AgentError::Remote { .. })
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
