//! Configuration module for the edge-reactor server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values, and every value
//! has a built-in default so the server runs with no configuration at all.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: i32 = 128;

/// Protocol served on the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// Raw byte echo.
    Echo,
    /// Newline-delimited JSON primality queries.
    Prime,
    /// Fixed 9-byte price insert/query records.
    Means,
    /// Line-oriented broadcast chat room.
    Chat,
}

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "edge-reactor")]
#[command(author = "edge-reactor authors")]
#[command(version = "0.1.0")]
#[command(about = "A single-threaded edge-triggered TCP server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Listen backlog
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Protocol to serve
    #[arg(long, value_enum)]
    pub protocol: Option<ProtocolType>,

    /// Maximum number of concurrent connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Readiness events drained per poll
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolType,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
            protocol: default_protocol(),
            max_connections: default_max_connections(),
            batch_size: default_batch_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_backlog() -> i32 {
    DEFAULT_BACKLOG
}

fn default_protocol() -> ProtocolType {
    ProtocolType::Echo
}

fn default_max_connections() -> usize {
    10_000
}

fn default_batch_size() -> usize {
    128
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backlog: i32,
    pub protocol: ProtocolType,
    pub max_connections: usize,
    pub batch_size: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliArgs::default_values(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve an already-parsed set of CLI arguments.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            protocol: cli.protocol.unwrap_or(toml_config.server.protocol),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            batch_size: cli.batch_size.unwrap_or(toml_config.server.batch_size),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    /// Socket address the listener binds to.
    pub fn listen_addr(&self) -> io::Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl CliArgs {
    fn default_values() -> Self {
        CliArgs {
            config: None,
            host: None,
            port: None,
            backlog: None,
            protocol: None,
            max_connections: None,
            batch_size: None,
            log_level: None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
