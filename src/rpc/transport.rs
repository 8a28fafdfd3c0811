use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio_util::codec::Framed;

use crate::rpc::codec::{decode_frame, CodecError, MsgpackCodec};

/// First byte on every connection: selects the synchronous msgpack RPC
/// handler on the server.
pub const RPC_MAGIC_BYTE: u8 = 0x01;

/// One duplex stream to the server, framed into MessagePack values.
///
/// Only the RPC client holds one of these. Any error leaves the stream in an
/// unknown position, so callers drop the connection instead of reusing it.
pub struct Connection {
    framed: Framed<TcpStream, MsgpackCodec>,
    peer: SocketAddr,
}

impl Connection {
    /// Connect to `addr` (`host:port`), trying each resolved address in turn.
    pub async fn connect(addr: &str) -> Result<Self, CodecError> {
        let mut last_err = None;
        for sock_addr in lookup_host(addr).await? {
            match Self::connect_addr(sock_addr).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    tracing::debug!(addr = %sock_addr, error = %e, "Failed to connect to server address");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses resolved for {}", addr),
            )
            .into()
        }))
    }

    async fn connect_addr(addr: SocketAddr) -> Result<Self, CodecError> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(true)?;

        let mut stream = socket.connect(addr).await?;
        stream.set_nodelay(true)?;
        stream.write_all(&[RPC_MAGIC_BYTE]).await?;

        tracing::debug!(addr = %addr, "Connected to server");
        Ok(Self {
            framed: Framed::new(stream, MsgpackCodec::new()),
            peer: addr,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Buffer one message for sending.
    pub async fn feed<T: Serialize>(&mut self, msg: &T) -> Result<(), CodecError> {
        self.framed.feed(msg).await
    }

    pub async fn flush(&mut self) -> Result<(), CodecError> {
        SinkExt::<()>::flush(&mut self.framed).await
    }

    /// Read the next complete message as raw bytes.
    pub async fn read_frame(&mut self) -> Result<Bytes, CodecError> {
        match self.framed.next().await {
            Some(frame) => frame,
            None => Err(CodecError::Closed),
        }
    }

    pub async fn read<T: DeserializeOwned>(&mut self) -> Result<T, CodecError> {
        let frame = self.read_frame().await?;
        decode_frame(&frame)
    }
}
