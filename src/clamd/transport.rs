use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use super::endpoint::Endpoint;
use crate::error::{Error, Result};

const READ_BUFFER_SIZE: usize = 4096;

pub(crate) trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// A single-use connection to the daemon.
///
/// Every write and read takes its own timeout budget, measured from the
/// start of that call. Dropping the connection closes the socket.
pub struct Connection {
    stream: Box<dyn Stream>,
    peer: String,
}

impl Connection {
    pub async fn open(endpoint: &Endpoint, budget: Duration) -> Result<Self> {
        let peer = endpoint.to_string();
        debug!("Connecting to clamd at {}", peer);

        let stream: Box<dyn Stream> = match endpoint {
            Endpoint::Tcp(addr) => {
                let stream = connect_within(&peer, budget, TcpStream::connect(addr)).await?;
                stream.set_nodelay(true)?;
                Box::new(stream)
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = connect_within(&peer, budget, UnixStream::connect(path)).await?;
                Box::new(stream)
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => {
                return Err(Error::Connection(
                    "Unix sockets not supported on this platform".to_string(),
                ))
            }
        };

        Ok(Self { stream, peer })
    }

    #[cfg(test)]
    pub(crate) fn from_stream<S: Stream + 'static>(stream: S, peer: &str) -> Self {
        Self {
            stream: Box::new(stream),
            peer: peer.to_string(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn write_all(&mut self, bytes: &[u8], budget: Duration) -> Result<()> {
        trace!("Writing {} bytes to {}", bytes.len(), self.peer);

        timeout(budget, write_fully(&mut *self.stream, bytes))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "Write to {} timed out after {} ms",
                    self.peer,
                    budget.as_millis()
                ))
            })?
            .map_err(Error::Io)
    }

    /// Reads one reply: everything up to a trailing NUL, or up to the point
    /// where the peer closes the connection.
    pub async fn read_reply(&mut self, budget: Duration) -> Result<Vec<u8>> {
        let reply = timeout(budget, read_until_nul(&mut *self.stream))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "Read from {} timed out after {} ms",
                    self.peer,
                    budget.as_millis()
                ))
            })?
            .map_err(Error::Io)?;

        trace!("Read {} reply bytes from {}", reply.len(), self.peer);
        Ok(reply)
    }
}

async fn connect_within<F, S>(peer: &str, budget: Duration, connect: F) -> Result<S>
where
    F: Future<Output = io::Result<S>>,
{
    timeout(budget, connect)
        .await
        .map_err(|_| {
            Error::Timeout(format!(
                "Connection to {} timed out after {} ms",
                peer,
                budget.as_millis()
            ))
        })?
        .map_err(|e| Error::Connection(format!("Failed to connect to {}: {}", peer, e)))
}

async fn write_fully<W: AsyncWrite + Unpin + ?Sized>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

async fn read_until_nul<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut reply = Vec::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            // SHUTDOWN gets no reply, the daemon just hangs up
            return Ok(reply);
        }

        reply.extend_from_slice(&buf[..n]);
        if reply.last() == Some(&0) {
            reply.pop();
            return Ok(reply);
        }
    }
}
