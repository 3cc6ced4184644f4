use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{trace, warn};

use super::transport::Connection;
use super::types::ReadFailurePolicy;
use crate::error::{Error, Result};

/// Largest payload carried by a single INSTREAM chunk.
pub const CHUNK_SIZE: usize = 4096;

const LENGTH_PREFIX: usize = 4;

/// Zero-length chunk that ends an INSTREAM body.
pub const END_OF_STREAM: [u8; LENGTH_PREFIX] = [0; LENGTH_PREFIX];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Version,
    VersionCommands,
    Reload,
    Shutdown,
    InStream,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Version => "VERSION",
            Command::VersionCommands => "VERSIONCOMMANDS",
            Command::Reload => "RELOAD",
            Command::Shutdown => "SHUTDOWN",
            Command::InStream => "INSTREAM",
        }
    }

    /// `z<TOKEN>\0`, the daemon's NUL-delimited command form.
    pub fn encode(&self) -> Vec<u8> {
        let token = self.as_str().as_bytes();
        let mut frame = Vec::with_capacity(token.len() + 2);
        frame.push(b'z');
        frame.extend_from_slice(token);
        frame.push(0);
        frame
    }
}

/// Uploads `source` as an INSTREAM body and returns the payload byte count.
///
/// Chunks are filled up to [`CHUNK_SIZE`] before they are sent, so a source
/// of `n` bytes produces `ceil(n / CHUNK_SIZE)` data chunks followed by the
/// terminator. A failing source ends the body early under
/// [`ReadFailurePolicy::Truncate`].
pub async fn send_stream<R>(
    conn: &mut Connection,
    source: &mut R,
    budget: Duration,
    policy: ReadFailurePolicy,
) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; LENGTH_PREFIX + CHUNK_SIZE];
    let mut sent: u64 = 0;
    let mut chunks: u64 = 0;

    loop {
        let (filled, read_error) = fill_chunk(source, &mut buf[LENGTH_PREFIX..]).await;

        if filled > 0 {
            buf[..LENGTH_PREFIX].copy_from_slice(&(filled as u32).to_be_bytes());
            if !write_chunk(conn, &buf[..LENGTH_PREFIX + filled], budget).await? {
                return Ok(sent);
            }
            sent += filled as u64;
            chunks += 1;
            trace!("Sent chunk {} ({} bytes)", chunks, filled);
        }

        if let Some(e) = read_error {
            match policy {
                ReadFailurePolicy::Truncate => {
                    warn!(
                        "Source read failed after {} bytes, ending stream early: {}",
                        sent, e
                    );
                    break;
                }
                ReadFailurePolicy::Abort => return Err(Error::Io(e)),
            }
        }

        if filled < CHUNK_SIZE {
            break;
        }
    }

    if write_chunk(conn, &END_OF_STREAM, budget).await? {
        trace!("Stream of {} bytes in {} chunks terminated", sent, chunks);
    }
    Ok(sent)
}

/// Returns `false` when the daemon hung up mid-upload. It does that after
/// rejecting a stream (size limit), and its reply is still waiting to be read.
async fn write_chunk(conn: &mut Connection, frame: &[u8], budget: Duration) -> Result<bool> {
    match conn.write_all(frame, budget).await {
        Ok(()) => Ok(true),
        Err(Error::Io(e)) if peer_hung_up(&e) => {
            warn!("clamd at {} closed the stream early: {}", conn.peer(), e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn peer_hung_up(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}

/// Reads until `buf` is full or the source ends. A read error is handed
/// back next to the bytes read before it.
async fn fill_chunk<R>(source: &mut R, buf: &mut [u8]) -> (usize, Option<io::Error>)
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return (filled, Some(e)),
        }
    }
    (filled, None)
}
