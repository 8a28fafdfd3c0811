pub mod allocs;
pub mod config;
pub mod error;
pub mod node;
pub mod rpc;
pub mod shutdown;
pub mod state;
pub mod structs;
pub mod worker;
