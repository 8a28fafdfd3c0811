//! Control-plane RPC.
//!
//! One persistent TCP stream per client, opened with [`RPC_MAGIC_BYTE`] and
//! then carrying alternating request/response exchanges:
//!
//! 1. Client writes a [`RequestHeader`] `{ServiceMethod, Seq}` and a request
//!    body.
//! 2. Server writes a [`ResponseHeader`] `{Method, Seq, Error}` and a
//!    response body. The body is present even when `Error` is set.
//!
//! Every value is a self-delimiting MessagePack message (see [`codec`]).
//!
//! # Components
//!
//! - [`codec`]: stream framing and message encoding
//! - [`transport`]: connection setup and framed I/O
//! - [`client`]: serialized request/response API and typed methods
//! - [`structs`]: request and response envelopes

pub mod client;
pub mod codec;
pub mod structs;
pub mod transport;

pub use client::RpcClient;
pub use codec::{CodecError, MsgpackCodec};
pub use structs::{RequestHeader, ResponseHeader};
pub use transport::{Connection, RPC_MAGIC_BYTE};
