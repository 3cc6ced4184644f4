use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome classes of an INSTREAM scan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanVerdict {
    Ok,
    Found,
    Error,
}

/// Verdict of a single scan together with the daemon's raw reply.
///
/// `virus` is `Some` exactly when `verdict` is [`ScanVerdict::Found`]; the
/// constructors below are the only way to build one. Serialize-only for
/// that reason.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScanResult {
    verdict: ScanVerdict,
    reply: String,
    virus: Option<String>,
    pub scan_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub bytes_sent: u64,
}

impl ScanResult {
    pub fn clean(reply: impl Into<String>) -> Self {
        Self::build(ScanVerdict::Ok, reply.into(), None)
    }

    pub fn found(reply: impl Into<String>, virus: impl Into<String>) -> Self {
        Self::build(ScanVerdict::Found, reply.into(), Some(virus.into()))
    }

    pub fn error(reply: impl Into<String>) -> Self {
        Self::build(ScanVerdict::Error, reply.into(), None)
    }

    fn build(verdict: ScanVerdict, reply: String, virus: Option<String>) -> Self {
        Self {
            verdict,
            reply,
            virus,
            scan_time: Utc::now(),
            duration_ms: 0,
            bytes_sent: 0,
        }
    }

    pub fn with_transfer(mut self, bytes_sent: u64, duration_ms: u64) -> Self {
        self.bytes_sent = bytes_sent;
        self.duration_ms = duration_ms;
        self
    }

    pub fn verdict(&self) -> ScanVerdict {
        self.verdict
    }

    /// Full reply text as sent by the daemon (NUL stripped).
    pub fn reply(&self) -> &str {
        &self.reply
    }

    pub fn virus(&self) -> Option<&str> {
        self.virus.as_deref()
    }

    pub fn is_infected(&self) -> bool {
        self.verdict == ScanVerdict::Found
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
    pub commands: Vec<String>,
}

impl VersionInfo {
    pub fn supports(&self, command: &str) -> bool {
        self.commands.iter().any(|c| c == command)
    }
}

/// Per-operation timeout budgets, in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timeouts {
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_scan_ms")]
    pub scan_ms: u64,
}

fn default_connect_ms() -> u64 {
    2_000
}

fn default_base_ms() -> u64 {
    2_000
}

fn default_scan_ms() -> u64 {
    120_000
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_ms(),
            base_ms: default_base_ms(),
            scan_ms: default_scan_ms(),
        }
    }
}

impl Timeouts {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn scan(&self) -> Duration {
        Duration::from_millis(self.scan_ms)
    }
}

/// What INSTREAM does when the caller's source fails mid-upload.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReadFailurePolicy {
    /// End the stream at the failure point and let the daemon scan what it got.
    #[default]
    Truncate,
    /// Fail the call with the read error.
    Abort,
}
