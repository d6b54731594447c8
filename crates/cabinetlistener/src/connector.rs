//! Transport seam between the listener and the cabinet controllers
//!
//! Production code dials TCP through [`TcpConnector`]. Anything that can be
//! read and written asynchronously can stand in for a controller, which is
//! how the event loop is driven from in-process duplex pipes in tests.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A byte stream to one cabinet controller
pub trait CabinetStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> CabinetStream for T {}

pub type BoxStream = Box<dyn CabinetStream>;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a stream to `host:port`
    ///
    /// Callers bound the attempt with their own timeout.
    async fn connect(&self, host: &str, port: u16) -> io::Result<BoxStream>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> io::Result<BoxStream> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        tracing::debug!(
            "TCP connection established - peer: {}, local: {}",
            stream.peer_addr()?,
            stream.local_addr()?
        );
        Ok(Box::new(stream))
    }
}
