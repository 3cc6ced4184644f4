pub mod client;
pub mod codec;
pub mod endpoint;
pub mod parser;
pub mod transport;
pub mod types;

pub use client::{ClamdClient, ClamdClientImpl};
pub use endpoint::{AddressFamily, ClamdConnection, Endpoint};
pub use types::{ReadFailurePolicy, ScanResult, ScanVerdict, Timeouts, VersionInfo};
