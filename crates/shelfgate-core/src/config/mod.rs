//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations below
//! 2. **Config file**: TOML file named by `SHELFGATE_CONFIG` (default `config/config.toml`,
//!    optional)
//! 3. **Environment variables**: `SHELFGATE__SECTION__FIELD`
//! 4. **`BCRYPT_ROUNDS`**: overrides `security.hashing.salt_rounds`
//!
//! # Example
//!
//! ```toml
//! environment = "production"
//!
//! [server]
//! bind_port = 8080
//!
//! [security.hashing]
//! salt_rounds = 14
//!
//! [security.api_keys]
//! signing_secret = "a-long-random-value-from-your-secret-store"
//! ```

use crate::{middleware::sanitize::SanitizeMode, password::HashingConfig};
use config::{Config, ConfigError, Environment as EnvSource, File};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};

/// Variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "SHELFGATE_CONFIG";
/// Variable overriding the bcrypt cost factor.
pub const BCRYPT_ROUNDS_VAR: &str = "BCRYPT_ROUNDS";

/// Signing secrets shorter than this are refused in production.
pub const MIN_SIGNING_SECRET_BYTES: usize = 32;

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `8080`.
    pub bind_port: u16,

    /// Largest accepted request body. Defaults to 1 MiB.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1".to_string(), bind_port: 8080, max_body_bytes: 1 << 20 }
    }
}

/// Settings for the built-in API key store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeysConfig {
    /// Prefix of issued keys, as in `lba_<key id>.<secret>`.
    pub key_prefix: String,

    /// HMAC key for stored secret digests. Required in production.
    pub signing_secret: String,

    pub requests_per_hour: u32,
    pub requests_per_day: u32,
}

impl Default for ApiKeysConfig {
    fn default() -> Self {
        Self {
            key_prefix: "lba".to_string(),
            signing_secret: String::new(),
            requests_per_hour: 1000,
            requests_per_day: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub hashing: HashingConfig,
    pub api_keys: ApiKeysConfig,
}

/// Request validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub sanitize_mode: SanitizeMode,

    /// Uploads scoring below this are rejected. Range `0..=100`, defaults to `70`.
    pub min_file_security_score: u8,

    pub max_file_size_bytes: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            sanitize_mode: SanitizeMode::Escape,
            min_file_security_score: 70,
            max_file_size_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive. Defaults to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub validation: ValidationConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Use `__` as a separator for nested fields, e.g.
    /// `SHELFGATE__SECURITY__API_KEYS__REQUESTS_PER_HOUR=500`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed, a value cannot be deserialized,
    /// or `BCRYPT_ROUNDS` is not a number.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(
                EnvSource::with_prefix("SHELFGATE").prefix_separator("__").separator("__"),
            );

        if let Ok(raw) = std::env::var(BCRYPT_ROUNDS_VAR) {
            let rounds: u32 = raw.trim().parse().map_err(|_| {
                ConfigError::Message(format!("{BCRYPT_ROUNDS_VAR} must be an integer, got {raw}"))
            })?;
            builder = builder.set_override("security.hashing.salt_rounds", i64::from(rounds))?;
        }

        builder.build()?.try_deserialize()
    }

    /// Loads from `SHELFGATE_CONFIG`, falling back to `config/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Returns the parsed socket address for the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed into a valid [`SocketAddr`].
    ///
    /// [`SocketAddr`]: std::net::SocketAddr
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
            .parse()
            .map_err(|_| {
                format!(
                    "Invalid socket address: {}:{}",
                    self.server.bind_address, self.server.bind_port
                )
            })
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        self.security.hashing.validate().map_err(|e| e.to_string())?;

        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }

        if self.server.max_body_bytes == 0 {
            return Err("Max body size must be greater than 0".to_string());
        }

        let keys = &self.security.api_keys;
        if keys.key_prefix.is_empty() || !keys.key_prefix.chars().all(char::is_alphanumeric) {
            return Err("API key prefix must be non-empty and alphanumeric".to_string());
        }

        if keys.requests_per_hour == 0 || keys.requests_per_day < keys.requests_per_hour {
            return Err(
                "API key limits must be positive with the daily limit at least the hourly one"
                    .to_string(),
            );
        }

        if self.environment.is_production() && keys.signing_secret.len() < MIN_SIGNING_SECRET_BYTES
        {
            return Err(format!(
                "API key signing secret must be at least {MIN_SIGNING_SECRET_BYTES} bytes in production"
            ));
        }

        if self.validation.min_file_security_score > 100 {
            return Err("Minimum file security score must be between 0 and 100".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }
}
