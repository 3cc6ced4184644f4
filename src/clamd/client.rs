use async_trait::async_trait;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use super::codec::{self, Command};
use super::endpoint::{ClamdConnection, Endpoint};
use super::parser::Parser;
use super::transport::Connection;
use super::types::{ReadFailurePolicy, ScanResult, ScanVerdict, Timeouts, VersionInfo};
use crate::config::Config;
use crate::error::Result;

#[async_trait]
pub trait ClamdClient: Send + Sync {
    async fn ping(&self) -> Result<()>;
    async fn version(&self) -> Result<String>;
    async fn version_commands(&self) -> Result<VersionInfo>;
    async fn reload(&self) -> Result<()>;
    async fn shutdown(&self) -> Result<()>;
    async fn scan_stream(&self, source: Box<dyn AsyncRead + Unpin + Send>) -> Result<ScanResult>;
    async fn scan_bytes(&self, data: &[u8]) -> Result<ScanResult>;
}

/// Socket-backed client. Every call opens its own connection, so one
/// instance can be shared freely between tasks.
#[derive(Debug, Clone)]
pub struct ClamdClientImpl {
    endpoint: Endpoint,
    timeouts: Timeouts,
    read_failure: ReadFailurePolicy,
}

impl ClamdClientImpl {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            timeouts: Timeouts::default(),
            read_failure: ReadFailurePolicy::default(),
        }
    }

    pub async fn tcp(host: &str, port: u16) -> Result<Self> {
        Ok(Self::new(Endpoint::resolve(host, port).await?))
    }

    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::new(Endpoint::unix(path))
    }

    pub async fn from_connection(connection: &ClamdConnection) -> Result<Self> {
        Ok(Self::new(Endpoint::from_connection(connection).await?))
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let client = Self::from_connection(&config.connection()?).await?;
        Ok(client
            .with_timeouts(config.timeouts)
            .with_read_failure_policy(config.upload.on_read_error))
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_read_failure_policy(mut self, policy: ReadFailurePolicy) -> Self {
        self.read_failure = policy;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.timeouts.connect_ms = as_millis(timeout);
    }

    pub fn set_base_timeout(&mut self, timeout: Duration) {
        self.timeouts.base_ms = as_millis(timeout);
    }

    pub fn set_scan_timeout(&mut self, timeout: Duration) {
        self.timeouts.scan_ms = as_millis(timeout);
    }

    async fn send_command(&self, command: Command) -> Result<String> {
        let timeouts = self.timeouts;
        let mut conn = Connection::open(&self.endpoint, timeouts.connect()).await?;

        debug!("Sending command to clamd: {}", command.as_str());
        conn.write_all(&command.encode(), timeouts.base()).await?;

        let reply = conn.read_reply(timeouts.base()).await?;
        Ok(Parser::decode(&reply))
    }

    /// Uploads `source` with INSTREAM and classifies the daemon's verdict.
    pub async fn scan_reader<R>(&self, source: &mut R) -> Result<ScanResult>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let timeouts = self.timeouts;
        let start = Instant::now();
        let mut conn = Connection::open(&self.endpoint, timeouts.connect()).await?;

        debug!("Sending command to clamd: {}", Command::InStream.as_str());
        conn.write_all(&Command::InStream.encode(), timeouts.base())
            .await?;

        let bytes_sent =
            codec::send_stream(&mut conn, source, timeouts.base(), self.read_failure).await?;

        let reply = conn.read_reply(timeouts.scan()).await?;
        let duration_ms = start.elapsed().as_millis() as u64;
        let result = Parser::parse_scan_result(&Parser::decode(&reply))
            .with_transfer(bytes_sent, duration_ms);

        match result.verdict() {
            ScanVerdict::Found => warn!(
                virus = result.virus().unwrap_or_default(),
                bytes = bytes_sent,
                "Threat found in stream"
            ),
            ScanVerdict::Error => info!(reply = result.reply(), "Scan finished with error"),
            ScanVerdict::Ok => debug!("Scanned {} bytes in {} ms: clean", bytes_sent, duration_ms),
        }

        Ok(result)
    }
}

fn as_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl ClamdClient for ClamdClientImpl {
    async fn ping(&self) -> Result<()> {
        let response = self.send_command(Command::Ping).await?;
        Parser::parse_pong(&response)
    }

    async fn version(&self) -> Result<String> {
        self.send_command(Command::Version).await
    }

    async fn version_commands(&self) -> Result<VersionInfo> {
        let response = self.send_command(Command::VersionCommands).await?;
        Ok(Parser::parse_version_commands(&response))
    }

    async fn reload(&self) -> Result<()> {
        let response = self.send_command(Command::Reload).await?;
        Parser::parse_reload(&response)
    }

    async fn shutdown(&self) -> Result<()> {
        let timeouts = self.timeouts;
        let mut conn = Connection::open(&self.endpoint, timeouts.connect()).await?;

        debug!("Sending command to clamd: {}", Command::Shutdown.as_str());
        conn.write_all(&Command::Shutdown.encode(), timeouts.base())
            .await?;
        info!("Requested shutdown of clamd at {}", self.endpoint);
        Ok(())
    }

    async fn scan_stream(&self, mut source: Box<dyn AsyncRead + Unpin + Send>) -> Result<ScanResult> {
        self.scan_reader(&mut *source).await
    }

    async fn scan_bytes(&self, data: &[u8]) -> Result<ScanResult> {
        let mut source = data;
        self.scan_reader(&mut source).await
    }
}
