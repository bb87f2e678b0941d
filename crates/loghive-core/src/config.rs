use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::LogHiveError;

/// Main configuration for loghive
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// TCP ingestion listener
    pub ingestion: IngestionConfig,

    /// On-disk sink storage
    pub storage: StorageConfig,

    /// HTTP status server
    pub status: StatusConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, LogHiveError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LogHiveError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, LogHiveError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| LogHiveError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, LogHiveError> {
        toml::to_string_pretty(self)
            .map_err(|e| LogHiveError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), LogHiveError> {
        match self.general.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LogHiveError::Config(format!(
                    "Unknown log level '{}'",
                    other
                )))
            }
        }
        if self.ingestion.max_frame_size == 0 {
            return Err(LogHiveError::Config(
                "ingestion.max_frame_size must be greater than zero".to_string(),
            ));
        }
        if self.storage.max_files == 0 {
            return Err(LogHiveError::Config(
                "storage.max_files must be greater than zero".to_string(),
            ));
        }
        if self.status.window_size == 0 {
            return Err(LogHiveError::Config(
                "status.window_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Instance name for identification
    pub instance_name: String,

    /// Internal log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            instance_name: "loghive".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// TCP ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub bind_address: String,
    pub port: u16,
    /// 0 disables the limit
    pub max_connections: usize,
    /// Largest accepted frame payload in bytes
    pub max_frame_size: usize,
    /// Seconds a connection may hold an incomplete frame before it is closed
    pub partial_frame_timeout_secs: u64,
    /// Socket read buffer size per connection
    pub read_buffer_size: usize,
}

impl IngestionConfig {
    /// Get the full bind address (ip:port)
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn partial_frame_timeout(&self) -> Duration {
        Duration::from_secs(self.partial_frame_timeout_secs)
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 9898,
            max_connections: 1024,
            max_frame_size: 16 * 1024 * 1024,
            partial_frame_timeout_secs: 60,
            read_buffer_size: 64 * 1024,
        }
    }
}

/// Sink storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding `<token>/<type>/<name>` files
    pub logs_dir: PathBuf,
    /// Number of rotated files to keep per sink
    pub max_files: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            max_files: 6,
        }
    }
}

/// HTTP status server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
    /// Number of recent payloads shown on the status page
    pub window_size: usize,
}

impl StatusConfig {
    /// Get the full bind address (ip:port)
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            port: 9900,
            window_size: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.instance_name, "loghive");
        assert_eq!(config.ingestion.port, 9898);
        assert_eq!(config.status.port, 9900);
        assert_eq!(config.status.window_size, 30);
        assert_eq!(config.storage.max_files, 6);
        assert_eq!(config.storage.logs_dir, PathBuf::from("logs"));
        assert!(config.status.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
[general]
instance_name = "edge-1"
"#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.general.instance_name, "edge-1");
        // Defaults should be applied
        assert_eq!(config.ingestion.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(config.ingestion.partial_frame_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[general]
log_level = "debug"

[ingestion]
bind_address = "127.0.0.1"
port = 7000
max_connections = 0
max_frame_size = 4096

[storage]
logs_dir = "/var/lib/loghive"
max_files = 3

[status]
enabled = false
port = 7001
window_size = 5
"#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.ingestion.bind_addr(), "127.0.0.1:7000");
        assert_eq!(config.ingestion.max_connections, 0);
        assert_eq!(config.ingestion.max_frame_size, 4096);
        assert_eq!(config.storage.logs_dir, PathBuf::from("/var/lib/loghive"));
        assert_eq!(config.storage.max_files, 3);
        assert!(!config.status.enabled);
        assert_eq!(config.status.bind_addr(), "0.0.0.0:7001");
        assert_eq!(config.status.window_size, 5);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_str("[status]\nwindow_size = 0\n").is_err());
        assert!(Config::from_str("[storage]\nmax_files = 0\n").is_err());
        assert!(Config::from_str("[ingestion]\nmax_frame_size = 0\n").is_err());
        assert!(Config::from_str("[general]\nlog_level = \"loud\"\n").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loghive.toml");
        std::fs::write(&path, "[ingestion]\nport = 1234\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.ingestion.port, 1234);

        assert!(Config::from_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_serialize_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[ingestion]"));
        assert!(toml.contains("logs_dir"));
        let reparsed = Config::from_str(&toml).unwrap();
        assert_eq!(reparsed.ingestion.port, config.ingestion.port);
    }
}
