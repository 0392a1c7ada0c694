//! Configuration loading and constants.
//!
//! Loads the server configuration from a TOML file. `AppConfig` is the root
//! configuration struct containing all settings.

use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::http::{ServerOptions, HTTPS_PORT, HTTP_PORT};

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/autotls.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "autotls=info,rustls_acme=info,tower_http=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Default bind host for both listeners
pub const DEFAULT_HOST: &str = "::";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpServerConfig,
    #[serde(default)]
    pub acme: AcmeSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    /// HTTPS listener port (default: 443)
    #[serde(default = "HttpServerConfig::default_https_port")]
    pub https_port: u16,
    /// Plain HTTP redirect listener port (default: 80)
    #[serde(default = "HttpServerConfig::default_redirect_port")]
    pub redirect_port: u16,
    /// Deadline for in-flight requests on shutdown. Absent means wait indefinitely.
    pub shutdown_grace_seconds: Option<u64>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            https_port: Self::default_https_port(),
            redirect_port: Self::default_redirect_port(),
            shutdown_grace_seconds: None,
        }
    }
}

impl HttpServerConfig {
    fn default_host() -> String {
        DEFAULT_HOST.to_string()
    }

    fn default_https_port() -> u16 {
        HTTPS_PORT
    }

    fn default_redirect_port() -> u16 {
        HTTP_PORT
    }

    fn ip(&self) -> Result<IpAddr, ConfigError> {
        self.host
            .parse()
            .map_err(|e| ConfigError::Validation(format!("Invalid http.host '{}': {}", self.host, e)))
    }

    pub fn https_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.ip()?, self.https_port))
    }

    pub fn redirect_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.ip()?, self.redirect_port))
    }

    pub fn grace_period(&self) -> Option<Duration> {
        self.shutdown_grace_seconds.map(Duration::from_secs)
    }

    /// Options for the HTTPS listener
    pub fn server_options(&self) -> Result<ServerOptions, ConfigError> {
        Ok(ServerOptions {
            addr: self.https_addr()?,
            grace_period: self.grace_period(),
        })
    }
}

/// Certificate issuance settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcmeSettings {
    /// Hosts to obtain certificates for. Empty accepts any host.
    #[serde(default)]
    pub domains: Vec<String>,
    /// Account contacts, e.g. "admin@example.com"
    #[serde(default)]
    pub contacts: Vec<String>,
    /// Use the Let's Encrypt production directory (default: staging)
    #[serde(default)]
    pub production: bool,
    /// Overrides the platform cache directory
    pub cache_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.http.https_port == self.http.redirect_port {
            return Err(ConfigError::Validation(format!(
                "http.https_port and http.redirect_port must differ (both {})",
                self.http.https_port
            )));
        }
        self.http.ip()?;

        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "Unknown logging.format '{}', expected \"text\" or \"json\"",
                other
            ))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
