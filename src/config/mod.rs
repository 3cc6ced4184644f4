use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::clamd::{ClamdConnection, ReadFailurePolicy, Timeouts};
use crate::error::{Error, Result};

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub clamd: ClamdConfig,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClamdConfig {
    pub socket_path: Option<String>,
    pub tcp_host: Option<String>,
    pub tcp_port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UploadConfig {
    #[serde(default)]
    pub on_read_error: ReadFailurePolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub async fn load_from_default_locations() -> Result<Self> {
        for path in Self::default_locations() {
            if path.exists() {
                tracing::info!("Loading config from: {:?}", path);
                return Self::load(path).await;
            }
        }

        Err(Error::Config(
            "No configuration file found in default locations".to_string(),
        ))
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from("/etc/clamd-client/client.toml")];
        if let Some(dir) = dirs::config_dir() {
            locations.push(dir.join("clamd-client/client.toml"));
        }
        if let Some(dir) = dirs::home_dir() {
            locations.push(dir.join(".clamd-client/client.toml"));
        }
        locations.push(PathBuf::from("./client.toml"));
        locations
    }

    pub fn validate(&self) -> Result<()> {
        self.connection()?;

        if self.timeouts.connect_ms == 0 || self.timeouts.base_ms == 0 || self.timeouts.scan_ms == 0
        {
            return Err(Error::Config(
                "Timeouts must be greater than zero".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "Invalid log level: {}",
                self.log_level
            )));
        }

        Ok(())
    }

    /// The Unix socket wins when both forms are configured.
    pub fn connection(&self) -> Result<ClamdConnection> {
        if let Some(path) = &self.clamd.socket_path {
            Ok(ClamdConnection::Unix { path: path.clone() })
        } else if let (Some(host), Some(port)) = (&self.clamd.tcp_host, self.clamd.tcp_port) {
            Ok(ClamdConnection::Tcp {
                host: host.clone(),
                port,
            })
        } else {
            Err(Error::Config(
                "Either socket_path or tcp_host/tcp_port must be configured".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID_CONFIG_TOML: &str = r#"
log_level = "debug"

[clamd]
socket_path = "/var/run/clamav/clamd.ctl"

[timeouts]
connect_ms = 500
base_ms = 1500
scan_ms = 600000

[upload]
on_read_error = "abort"
"#;

    const CONFIG_WITH_TCP: &str = r#"
[clamd]
tcp_host = "127.0.0.1"
tcp_port = 3310
"#;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[tokio::test]
    async fn test_config_load_valid() {
        let temp_file = write_config(VALID_CONFIG_TOML);
        let config = Config::load(temp_file.path()).await.unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.clamd.socket_path,
            Some("/var/run/clamav/clamd.ctl".to_string())
        );
        assert_eq!(config.timeouts.connect_ms, 500);
        assert_eq!(config.timeouts.base_ms, 1500);
        assert_eq!(config.timeouts.scan_ms, 600_000);
        assert_eq!(config.upload.on_read_error, ReadFailurePolicy::Abort);
    }

    #[tokio::test]
    async fn test_config_load_with_tcp_and_defaults() {
        let temp_file = write_config(CONFIG_WITH_TCP);
        let config = Config::load(temp_file.path()).await.unwrap();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.timeouts, Timeouts::default());
        assert_eq!(config.upload.on_read_error, ReadFailurePolicy::Truncate);
        assert_eq!(
            config.connection().unwrap(),
            ClamdConnection::Tcp {
                host: "127.0.0.1".to_string(),
                port: 3310,
            }
        );
    }

    #[tokio::test]
    async fn test_config_partial_timeouts() {
        let temp_file = write_config(
            r#"
[clamd]
socket_path = "/tmp/clamd.ctl"

[timeouts]
scan_ms = 5000
"#,
        );
        let config = Config::load(temp_file.path()).await.unwrap();

        assert_eq!(config.timeouts.connect_ms, 2_000);
        assert_eq!(config.timeouts.base_ms, 2_000);
        assert_eq!(config.timeouts.scan_ms, 5_000);
    }

    #[tokio::test]
    async fn test_config_load_invalid_file() {
        let result = Config::load("/nonexistent/file.toml").await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to read config file"));
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = write_config("invalid toml content [[[");

        let result = Config::load(temp_file.path()).await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config"));
    }

    #[tokio::test]
    async fn test_config_load_unknown_policy() {
        let temp_file = write_config(
            r#"
[clamd]
socket_path = "/tmp/clamd.ctl"

[upload]
on_read_error = "retry"
"#,
        );

        let result = Config::load(temp_file.path()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_config_validate_no_connection() {
        let config = Config {
            log_level: "info".to_string(),
            clamd: ClamdConfig::default(),
            timeouts: Timeouts::default(),
            upload: UploadConfig::default(),
        };

        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Either socket_path or tcp_host/tcp_port must be configured"));
    }

    #[test]
    fn test_config_validate_host_without_port() {
        let config = Config {
            log_level: "info".to_string(),
            clamd: ClamdConfig {
                socket_path: None,
                tcp_host: Some("localhost".to_string()),
                tcp_port: None,
            },
            timeouts: Timeouts::default(),
            upload: UploadConfig::default(),
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_zero_timeout() {
        let config = Config {
            log_level: "info".to_string(),
            clamd: ClamdConfig {
                socket_path: Some("/tmp/clamd.ctl".to_string()),
                ..Default::default()
            },
            timeouts: Timeouts {
                base_ms: 0,
                ..Timeouts::default()
            },
            upload: UploadConfig::default(),
        };

        match config.validate().unwrap_err() {
            Error::Config(msg) => assert!(msg.contains("greater than zero")),
            other => panic!("Expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_config_validate_invalid_log_level() {
        let config = Config {
            log_level: "verbose".to_string(),
            clamd: ClamdConfig {
                socket_path: Some("/tmp/clamd.ctl".to_string()),
                ..Default::default()
            },
            timeouts: Timeouts::default(),
            upload: UploadConfig::default(),
        };

        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Invalid log level: verbose"));
    }

    #[test]
    fn test_socket_path_preferred_over_tcp() {
        let config = Config {
            log_level: "INFO".to_string(),
            clamd: ClamdConfig {
                socket_path: Some("/tmp/clamd.ctl".to_string()),
                tcp_host: Some("localhost".to_string()),
                tcp_port: Some(3310),
            },
            timeouts: Timeouts::default(),
            upload: UploadConfig::default(),
        };

        assert!(config.validate().is_ok());
        assert_eq!(
            config.connection().unwrap(),
            ClamdConnection::Unix {
                path: "/tmp/clamd.ctl".to_string()
            }
        );
    }

    #[test]
    fn test_default_locations() {
        let locations = Config::default_locations();
        assert_eq!(locations[0], PathBuf::from("/etc/clamd-client/client.toml"));
        assert_eq!(locations.last(), Some(&PathBuf::from("./client.toml")));
    }
}
