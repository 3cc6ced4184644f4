use super::types::{ScanResult, VersionInfo};
use crate::error::{Error, Result};

const PONG: &str = "PONG";
const RELOADING: &str = "RELOADING";
const COMMANDS_SEPARATOR: &str = "| COMMANDS:";
const FOUND_SUFFIX: &str = " FOUND";
const ERROR_SUFFIX: &str = " ERROR";
const OK_SUFFIX: &str = " OK";

pub struct Parser;

impl Parser {
    /// Decodes raw reply bytes, NUL terminator already stripped.
    pub fn decode(reply: &[u8]) -> String {
        String::from_utf8_lossy(reply).into_owned()
    }

    pub fn parse_pong(response: &str) -> Result<()> {
        if response == PONG {
            Ok(())
        } else {
            Err(Error::Protocol(format!(
                "Expected {}, but got: {}",
                PONG, response
            )))
        }
    }

    pub fn parse_reload(response: &str) -> Result<()> {
        if response == RELOADING {
            Ok(())
        } else {
            Err(Error::Protocol(format!(
                "Expected {}, but got: {}",
                RELOADING, response
            )))
        }
    }

    pub fn parse_version_commands(response: &str) -> VersionInfo {
        // Example: ClamAV 1.4.3/27691/Sun Jul  6 10:34:52 2025| COMMANDS: SCAN QUIT RELOAD ...
        match response.split_once(COMMANDS_SEPARATOR) {
            None => VersionInfo {
                version: response.to_string(),
                commands: Vec::new(),
            },
            Some((version, commands)) => VersionInfo {
                version: version.to_string(),
                commands: commands
                    .split_whitespace()
                    .map(|c| c.trim().to_string())
                    .collect(),
            },
        }
    }

    pub fn parse_scan_result(response: &str) -> ScanResult {
        if response.ends_with(FOUND_SUFFIX) {
            // "<context>: <virus name> FOUND"; the last ": " in the whole reply
            // separates the two and must leave a non-empty name before the suffix
            let name_end = response.len() - FOUND_SUFFIX.len();
            let virus = response
                .rfind(": ")
                .filter(|idx| idx + 2 < name_end)
                .map(|idx| response[idx + 2..name_end].trim())
                .unwrap_or(response);
            ScanResult::found(response, virus)
        } else if response.ends_with(ERROR_SUFFIX) {
            ScanResult::error(response)
        } else if response.ends_with(OK_SUFFIX) {
            ScanResult::clean(response)
        } else {
            ScanResult::error(format!("Unexpected scanning result: {}", response))
        }
    }
}
