pub mod clamd;
pub mod config;
pub mod error;

pub use clamd::{ClamdClient, ClamdClientImpl, ScanResult, ScanVerdict, VersionInfo};
pub use error::{Error, Result};
