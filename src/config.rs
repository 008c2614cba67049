//! Configuration module for the query receiver.
//!
//! Supports command-line arguments, environment variables and a TOML
//! configuration file. CLI arguments take precedence over environment
//! variables, which take precedence over config file values.

use crate::protocols::http::handler::DEFAULT_PATH;
use crate::protocols::http::parser::{MAX_BODY_BYTES, MAX_HEADER_BYTES};
use crate::query::{DecodingError, QueryDecoder};
use clap::Parser;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Command-line arguments for the receiver
#[derive(Parser, Debug)]
#[command(name = "query-receiver")]
#[command(author = "query-receiver authors")]
#[command(version = "0.1.0")]
#[command(about = "An HTTP receiver that echoes back decoded query parameters", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0)
    #[arg(long, env = "RECEIVER_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "EDC_HTTP_SERVER_PORT")]
    pub port: Option<u16>,

    /// Endpoint path served by the receiver
    #[arg(long)]
    pub path: Option<String>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Character encoding of percent-escaped query bytes
    #[arg(long)]
    pub encoding: Option<String>,

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
    pub limits: LimitsConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Endpoint path
    #[serde(default = "default_path")]
    pub path: String,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Maximum number of concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            workers: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Request size limits
#[derive(Debug, Deserialize)]
pub struct LimitsConfig {
    /// Maximum size of a request line plus headers
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,
    /// Maximum size of a request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: default_max_header_bytes(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Query decoding configuration
#[derive(Debug, Deserialize)]
pub struct QueryConfig {
    /// Encoding label for escaped bytes
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
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
    4000
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

fn default_max_connections() -> usize {
    10000
}

fn default_max_header_bytes() -> usize {
    MAX_HEADER_BYTES
}

fn default_max_body_bytes() -> usize {
    MAX_BODY_BYTES
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub path: String,
    pub workers: Option<usize>,
    pub max_connections: usize,
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
    pub decoder: QueryDecoder,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args, environment and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve parsed arguments against the TOML file they point at.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
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

    /// Merge CLI args with TOML config (CLI takes precedence)
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let host = cli.host.unwrap_or(toml_config.server.host);
        let port = cli.port.unwrap_or(toml_config.server.port);
        let ip: IpAddr = host
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(host.clone()))?;

        let path = cli.path.unwrap_or(toml_config.server.path);
        if !path.starts_with('/') {
            return Err(ConfigError::InvalidPath(path));
        }

        let workers = cli.workers.or(toml_config.server.workers);
        if workers == Some(0) {
            return Err(ConfigError::InvalidWorkers);
        }

        let encoding = cli.encoding.unwrap_or(toml_config.query.encoding);
        let decoder = QueryDecoder::for_label(&encoding).map_err(ConfigError::Encoding)?;

        Ok(Config {
            listen: SocketAddr::new(ip, port),
            path,
            workers,
            max_connections: toml_config.server.max_connections.max(1),
            max_header_bytes: toml_config.limits.max_header_bytes,
            max_body_bytes: toml_config.limits.max_body_bytes,
            decoder,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidAddress(String),
    InvalidPath(String),
    InvalidWorkers,
    Encoding(DecodingError),
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
            ConfigError::InvalidAddress(host) => write!(f, "Invalid listen host '{}'", host),
            ConfigError::InvalidPath(path) => {
                write!(f, "Endpoint path '{}' must start with '/'", path)
            }
            ConfigError::InvalidWorkers => write!(f, "Worker count must be at least 1"),
            ConfigError::Encoding(e) => write!(f, "Invalid query encoding: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
