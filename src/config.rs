// Configuration File Support
//
// This module provides configuration file parsing for the Pdfbirch server.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from XDG config directory: ~/.config/pdfbirch/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::document::DocumentConfig;
use crate::quota::{QuotaConfig, StoreKind};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Download quota configuration
    pub quota: QuotaConfig,

    /// Identity provider configuration
    pub auth: AuthConfig,

    /// Generated document layout
    pub document: DocumentConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub bind_address: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Identity provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    /// Fixed token table from `[auth.tokens]`
    Static,
    /// Google Sign-In ID tokens
    Google,
}

impl std::str::FromStr for AuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "static" => Ok(AuthProvider::Static),
            "google" => Ok(AuthProvider::Google),
            other => Err(format!(
                "Invalid auth provider: {}. Must be 'static' or 'google'",
                other
            )),
        }
    }
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Which verifier resolves credentials
    pub provider: AuthProvider,

    /// OAuth client ID (required for the google provider)
    pub google_client_id: Option<String>,

    /// Credential to identity table for the static provider
    pub tokens: HashMap<String, String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: AuthProvider::Static,
            google_client_id: None,
            tokens: HashMap::new(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct MetricsConfig {
    /// Expose /metrics on the main server
    pub enabled: bool,
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// the result fails validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/pdfbirch/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "pdfbirch", "Pdfbirch") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            // Fallback if XDG dirs cannot be determined
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config").join("pdfbirch").join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - PDFBIRCH_LOG_LEVEL, PDFBIRCH_LOG_FORMAT
    /// - PDFBIRCH_BIND_ADDRESS, PDFBIRCH_PORT
    /// - PDFBIRCH_QUOTA_MAX_EVENTS, PDFBIRCH_QUOTA_WINDOW_SECS
    /// - PDFBIRCH_QUOTA_STORE, PDFBIRCH_DATABASE_URL
    /// - PDFBIRCH_AUTH_PROVIDER, PDFBIRCH_GOOGLE_CLIENT_ID
    /// - PDFBIRCH_METRICS_ENABLED
    ///
    /// Values that fail to parse are ignored.
    fn apply_env_overrides(mut self) -> Self {
        // Logging overrides
        if let Ok(level) = std::env::var("PDFBIRCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("PDFBIRCH_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Server overrides
        if let Ok(address) = std::env::var("PDFBIRCH_BIND_ADDRESS") {
            self.server.bind_address = address;
        }
        if let Ok(port) = std::env::var("PDFBIRCH_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        // Quota overrides
        if let Ok(max) = std::env::var("PDFBIRCH_QUOTA_MAX_EVENTS") {
            if let Ok(max) = max.parse::<u32>() {
                if max > 0 {
                    self.quota.max_events = max;
                }
            }
        }
        if let Ok(window) = std::env::var("PDFBIRCH_QUOTA_WINDOW_SECS") {
            if let Ok(window) = window.parse::<u64>() {
                if window >= 60 {
                    self.quota.window_secs = window;
                }
            }
        }
        if let Ok(store) = std::env::var("PDFBIRCH_QUOTA_STORE") {
            if let Ok(store) = store.parse::<StoreKind>() {
                self.quota.store = store;
            }
        }
        if let Ok(url) = std::env::var("PDFBIRCH_DATABASE_URL") {
            self.quota.database_url = Some(url);
        }

        // Auth overrides
        if let Ok(provider) = std::env::var("PDFBIRCH_AUTH_PROVIDER") {
            if let Ok(provider) = provider.parse::<AuthProvider>() {
                self.auth.provider = provider;
            }
        }
        if let Ok(client_id) = std::env::var("PDFBIRCH_GOOGLE_CLIENT_ID") {
            self.auth.google_client_id = Some(client_id);
        }

        // Metrics overrides
        if let Ok(enabled) = std::env::var("PDFBIRCH_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        // Validate logging level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}. Must be one of: trace, debug, info, warn, error", self.logging.level),
        }

        // Validate logging format
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!("Invalid log format: {}. Must be one of: json, pretty, compact", self.logging.format),
        }

        // Validate server configuration
        if self.server.bind_address.trim().is_empty() {
            anyhow::bail!("Server bind address must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }

        // Validate quota configuration
        if self.quota.max_events == 0 {
            anyhow::bail!("Quota max_events must be > 0");
        }
        if self.quota.window_secs < 60 {
            anyhow::bail!("Quota window must be at least 60 seconds");
        }
        if self.quota.store == StoreKind::Sqlite
            && self.quota.database_url.as_deref().map_or(true, |url| url.trim().is_empty())
        {
            anyhow::bail!("Quota store 'sqlite' requires a database_url");
        }

        // Validate auth configuration
        if self.auth.provider == AuthProvider::Google
            && self.auth.google_client_id.as_deref().map_or(true, |id| id.trim().is_empty())
        {
            anyhow::bail!("Auth provider 'google' requires a google_client_id");
        }
        if self.auth.provider == AuthProvider::Static && self.auth.tokens.is_empty() {
            tracing::warn!("Static auth provider has no tokens configured; every request will be rejected");
        }

        // Validate document layout
        self.document
            .validate()
            .context("Invalid document configuration")?;

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging.level.to_lowercase().parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }

    /// Socket address string for the listener
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Tests touching process environment must not interleave
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.quota.max_events, 20);
        assert_eq!(config.quota.window_secs, 86_400);
        assert_eq!(config.auth.provider, AuthProvider::Static);
        assert_eq!(config.document.pages, 10);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_config_validation_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_quota() {
        let mut config = Config::default();
        config.quota.max_events = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.quota.window_secs = 59;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_sqlite_needs_url() {
        let mut config = Config::default();
        config.quota.store = StoreKind::Sqlite;
        assert!(config.validate().is_err());

        config.quota.database_url = Some("sqlite://quota.db".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_google_needs_client_id() {
        let mut config = Config::default();
        config.auth.provider = AuthProvider::Google;
        assert!(config.validate().is_err());

        config.auth.google_client_id = Some("client-123.apps.googleusercontent.com".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_document() {
        let mut config = Config::default();
        config.document.min_lines = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        let config = Config::load_from_path("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config.quota.max_events, 20);
    }

    #[test]
    fn test_load_valid_toml_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[logging]
level = "debug"
format = "json"

[server]
bind_address = "0.0.0.0"
port = 9000

[quota]
max_events = 5
window_secs = 18000
store = "sqlite"
database_url = "sqlite://quota.db"

[auth]
provider = "static"

[auth.tokens]
"dev-token" = "dev@example.com"

[document]
pages = 3
min_lines = 2
max_lines = 4

[metrics]
enabled = true
"#;
        fs::write(temp_file.path(), toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.listen_address(), "0.0.0.0:9000");
        assert_eq!(config.quota.max_events, 5);
        assert_eq!(config.quota.window_secs, 5 * 3600);
        assert_eq!(config.quota.store, StoreKind::Sqlite);
        assert_eq!(
            config.auth.tokens.get("dev-token").map(String::as_str),
            Some("dev@example.com")
        );
        assert_eq!(config.document.pages, 3);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_load_invalid_toml_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[quota\nmax_events = ").unwrap();
        assert!(Config::load_from_path(temp_file.path()).is_err());
    }

    #[test]
    fn test_config_partial_toml() {
        let _guard = ENV_LOCK.lock().unwrap();
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[quota]\nmax_events = 3\n").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.quota.max_events, 3);
        // Everything else falls back to defaults
        assert_eq!(config.quota.window_secs, 86_400);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("PDFBIRCH_QUOTA_MAX_EVENTS", "7");
        std::env::set_var("PDFBIRCH_QUOTA_WINDOW_SECS", "3600");
        std::env::set_var("PDFBIRCH_PORT", "9191");
        std::env::set_var("PDFBIRCH_METRICS_ENABLED", "true");

        let config = Config::default().apply_env_overrides();

        std::env::remove_var("PDFBIRCH_QUOTA_MAX_EVENTS");
        std::env::remove_var("PDFBIRCH_QUOTA_WINDOW_SECS");
        std::env::remove_var("PDFBIRCH_PORT");
        std::env::remove_var("PDFBIRCH_METRICS_ENABLED");

        assert_eq!(config.quota.max_events, 7);
        assert_eq!(config.quota.window_secs, 3600);
        assert_eq!(config.server.port, 9191);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_env_overrides_invalid_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("PDFBIRCH_QUOTA_MAX_EVENTS", "0");
        std::env::set_var("PDFBIRCH_QUOTA_WINDOW_SECS", "abc");
        std::env::set_var("PDFBIRCH_QUOTA_STORE", "redis");

        let config = Config::default().apply_env_overrides();

        std::env::remove_var("PDFBIRCH_QUOTA_MAX_EVENTS");
        std::env::remove_var("PDFBIRCH_QUOTA_WINDOW_SECS");
        std::env::remove_var("PDFBIRCH_QUOTA_STORE");

        assert_eq!(config.quota.max_events, 20);
        assert_eq!(config.quota.window_secs, 86_400);
        assert_eq!(config.quota.store, StoreKind::Memory);
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.ends_with("config.toml"));
    }

    #[test]
    fn test_log_level_parsing() {
        let mut config = Config::default();
        config.logging.level = "DEBUG".to_string();
        assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_auth_provider_parsing() {
        assert_eq!("Google".parse::<AuthProvider>(), Ok(AuthProvider::Google));
        assert!("ldap".parse::<AuthProvider>().is_err());
    }
}
