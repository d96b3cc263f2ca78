use config::{self, File};
use log::{debug, error, warn};
use serde::Deserialize;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

use crate::error::{EmitterError, Result};

/// Connection settings for the monitoring server
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct EmitterConfig {
    /// Hostname or IP address of the server
    pub host: String,
    /// Connection port of the server
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Default server port
fn default_port() -> u16 {
    5555
}

impl EmitterConfig {
    /// Create a connection config for a host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Check that the host is usable
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(EmitterError::Config("emitter host must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Top-level configuration document
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    /// Server connection configuration
    pub emitter: EmitterConfig,
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
}

impl BridgeConfig {
    /// Load and validate a bridge configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: BridgeConfig = load_file(path)?;
        config.emitter.validate()?;
        Ok(config)
    }

    /// Load and validate a bridge configuration from several sources
    pub fn load_from_sources(sources: Vec<ConfigSource>) -> Result<Self> {
        let config: BridgeConfig = load_config(sources)?;
        config.emitter.validate()?;
        Ok(config)
    }
}

/// Logging level
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

impl std::str::FromStr for LogLevel {
    type Err = EmitterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(EmitterError::Config(format!("Invalid log level: {}", other))),
        }
    }
}

/// Source of configuration
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path, format picked from the extension
    File(PathBuf),
    /// Environment variables with a prefix
    Environment(String),
    /// TOML string
    Toml(String),
}

/// Pick the file format from a path's extension
fn file_format(path: &Path) -> Result<config::FileFormat> {
    let extension = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_lowercase(),
        None => {
            error!("Configuration file has no extension");
            return Err(EmitterError::Config(format!(
                "Configuration file has no extension: {}",
                path.display()
            )));
        }
    };

    match extension.as_str() {
        "toml" => Ok(config::FileFormat::Toml),
        "json" => Ok(config::FileFormat::Json),
        "yaml" | "yml" => Ok(config::FileFormat::Yaml),
        format => {
            error!("Unsupported configuration format: {}", format);
            Err(EmitterError::Config(format!("Unsupported config format: {}", format)))
        }
    }
}

/// Load configuration from a single file
pub fn load_file<T, P>(path: P) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());

    if !path.exists() {
        error!("Configuration file {} does not exist", path.display());
        return Err(EmitterError::Config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    load_config(vec![ConfigSource::File(path.to_path_buf())])
}

/// Load configuration from several sources, later sources overriding earlier ones
pub fn load_config<T>(sources: Vec<ConfigSource>) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    let mut builder = config::Config::builder();

    for source in sources {
        match source {
            ConfigSource::File(path) => {
                if !path.exists() {
                    warn!("Configuration file not found: {}", path.display());
                    continue;
                }
                let format = file_format(&path)?;
                builder = builder.add_source(File::from(path.as_path()).format(format));
            }
            ConfigSource::Environment(prefix) => {
                debug!("Loading configuration from environment with prefix: {}", prefix);
                builder = builder.add_source(
                    config::Environment::with_prefix(&prefix)
                        .separator("__")
                        .try_parsing(true),
                );
            }
            ConfigSource::Toml(toml_str) => {
                debug!("Loading configuration from TOML string");
                builder = builder.add_source(File::from_str(&toml_str, config::FileFormat::Toml));
            }
        }
    }

    let config = builder
        .build()
        .map_err(|e| EmitterError::Config(format!("Failed to build configuration: {}", e)))?;

    let result = config
        .try_deserialize()
        .map_err(|e| EmitterError::Config(format!("Failed to deserialize configuration: {}", e)))?;

    debug!("Configuration loaded successfully: {:?}", result);

    Ok(result)
}
