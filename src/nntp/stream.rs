//! Stream abstraction for the NNTP connection.
//!
//! [`NntpConnection`](super::NntpConnection) is generic over [`AsyncStream`] so
//! the protocol code does not depend on a concrete socket type;
//! [`TokioStream`] is the TCP implementation used in production.

use async_trait::async_trait;

/// A bidirectional byte stream to an NNTP server.
#[async_trait]
pub trait AsyncStream: Send + Unpin + 'static {
    /// Establishes a connection to `addr` ("host:port").
    async fn connect(addr: &str) -> std::io::Result<Self>
    where
        Self: Sized;

    /// Reads data into `buf`. Returns `Ok(0)` at EOF.
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Writes all of `buf`.
    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    /// Shuts down the write half.
    async fn shutdown(&mut self) -> std::io::Result<()>;
}

/// A newtype wrapper around `tokio::net::TcpStream`.
pub struct TokioStream(pub tokio::net::TcpStream);

#[async_trait]
impl AsyncStream for TokioStream {
    async fn connect(addr: &str) -> std::io::Result<Self>
    where
        Self: Sized,
    {
        let stream = tokio::net::TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(TokioStream(stream))
    }

    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        use tokio::io::AsyncReadExt;
        self.0.read(buf).await
    }

    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        tokio::io::AsyncWriteExt::write_all(&mut self.0, buf).await
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        tokio::io::AsyncWriteExt::shutdown(&mut self.0).await
    }
}
