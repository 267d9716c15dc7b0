//! Configuration for the ccbench server and client.
//!
//! The server reads command-line arguments and an optional TOML file.
//! CLI arguments take precedence over config file values. The client is
//! configured from the command line only.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Default port shared by the server and the client.
pub const DEFAULT_PORT: u16 = 5000;

/// Default number of payload bytes the client sends.
pub const DEFAULT_SIZE: usize = 1000;

/// Command-line arguments for the sink server
#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(version)]
#[command(about = "Accept TCP connections and drain everything they send", long_about = None)]
pub struct ServerArgs {
    /// The port to listen on (default: 5000)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of connection slots, listener included
    pub capacity: Option<usize>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            capacity: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Slot count override. `None` sizes the table from the open-file limit.
    pub capacity: Option<usize>,
    pub log_level: String,
}

impl ServerConfig {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(ServerArgs::parse())
    }

    pub fn from_args(cli: ServerArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: ServerArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        if let Some(capacity) = toml_config.server.capacity {
            if capacity < 2 {
                return Err(ConfigError::Capacity(capacity));
            }
        }

        Ok(ServerConfig {
            port: cli.port.unwrap_or(toml_config.server.port),
            capacity: toml_config.server.capacity,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Congestion control algorithms the client knows how to select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CongestionControl {
    Reno,
    Cubic,
    Vegas,
}

impl CongestionControl {
    /// Name the kernel uses for this algorithm.
    pub fn as_str(self) -> &'static str {
        match self {
            CongestionControl::Reno => "reno",
            CongestionControl::Cubic => "cubic",
            CongestionControl::Vegas => "vegas",
        }
    }
}

impl fmt::Display for CongestionControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command-line arguments for the streaming client
#[derive(Parser, Debug)]
#[command(name = "client")]
#[command(version)]
#[command(about = "Stream pseudo-random bytes to a server over one TCP connection", long_about = None)]
pub struct ClientArgs {
    /// The port the server is listening on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// The number of pseudo-random bytes to send to the server
    #[arg(short = 'n', long, default_value_t = DEFAULT_SIZE, value_parser = parse_size)]
    pub size: usize,

    /// Congestion control algorithm to use
    #[arg(short, long, value_enum, default_value_t = CongestionControl::Cubic)]
    pub congestion: CongestionControl,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Server IPv4 address or hostname
    pub server: String,
}

fn parse_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) | Err(_) => Err("size must be an integer greater than 0".to_string()),
        Ok(n) => Ok(n),
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Capacity(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Capacity(n) => {
                write!(f, "Invalid capacity {n}: at least 2 slots are required")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.capacity, None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            port = 6000
            capacity = 64

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.capacity, Some(64));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_file() {
        let cli = ServerArgs::try_parse_from(["server", "-p", "7000", "--log-level", "warn"]).unwrap();
        let file: TomlConfig = toml::from_str("[server]\nport = 6000\n[logging]\nlevel = \"debug\"").unwrap();

        let config = ServerConfig::merge(cli, file).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_rejects_tiny_capacity() {
        let cli = ServerArgs::try_parse_from(["server"]).unwrap();
        let file: TomlConfig = toml::from_str("[server]\ncapacity = 1").unwrap();
        assert!(matches!(
            ServerConfig::merge(cli, file),
            Err(ConfigError::Capacity(1))
        ));
    }

    #[test]
    fn test_server_rejects_positional() {
        assert!(ServerArgs::try_parse_from(["server", "unknown"]).is_err());
        assert!(ServerArgs::try_parse_from(["server", "--unknown"]).is_err());
    }

    #[test]
    fn test_client_defaults() {
        let args = ClientArgs::try_parse_from(["client", "127.0.0.1"]).unwrap();
        assert_eq!(args.port, 5000);
        assert_eq!(args.size, 1000);
        assert_eq!(args.congestion, CongestionControl::Cubic);
        assert_eq!(args.server, "127.0.0.1");
    }

    #[test]
    fn test_client_rejects_bad_values() {
        assert!(ClientArgs::try_parse_from(["client", "-c", "bogus", "127.0.0.1"]).is_err());
        assert!(ClientArgs::try_parse_from(["client", "-n", "0", "127.0.0.1"]).is_err());
        assert!(ClientArgs::try_parse_from(["client", "-n", "-5", "127.0.0.1"]).is_err());
        assert!(ClientArgs::try_parse_from(["client", "-p", "70000", "127.0.0.1"]).is_err());
        assert!(ClientArgs::try_parse_from(["client"]).is_err());
    }

    #[test]
    fn test_client_long_flags() {
        let args = ClientArgs::try_parse_from([
            "client",
            "--port",
            "6000",
            "--size",
            "4096",
            "--congestion",
            "vegas",
            "example.com",
        ])
        .unwrap();
        assert_eq!(args.port, 6000);
        assert_eq!(args.size, 4096);
        assert_eq!(args.congestion, CongestionControl::Vegas);
        assert_eq!(args.congestion.as_str(), "vegas");
    }
}
