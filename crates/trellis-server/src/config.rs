//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;
use trellis_db::DbSettings;
use trellis_events::EventConfig;
use trellis_types::DEFAULT_ROOM_VERSION;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub events: EventsConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// The name this server signs and sends events as.
    #[serde(default = "default_server_name")]
    pub server_name: String,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file, or `:memory:` for a throwaway store.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

impl DatabaseConfig {
    pub fn settings(&self) -> DbSettings {
        DbSettings {
            path: self.path.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trellis_store=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Event construction settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Refuse content replacement on every event, including owned copies.
    #[serde(default)]
    pub frozen: bool,

    /// Room version assumed for submitted PDUs that do not name one.
    #[serde(default = "default_room_version")]
    pub default_room_version: String,
}

impl EventsConfig {
    pub fn event_config(&self) -> EventConfig {
        EventConfig {
            frozen: self.frozen,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8448
}

fn default_server_name() -> String {
    "localhost".to_string()
}

fn default_db_path() -> String {
    "trellis.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_room_version() -> String {
    DEFAULT_ROOM_VERSION.identifier.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            server_name: default_server_name(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            frozen: false,
            default_room_version: default_room_version(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults when the
/// file does not exist.
///
/// Environment variable overrides:
/// - `TRELLIS_HOST` overrides `server.host`
/// - `TRELLIS_PORT` overrides `server.port`
/// - `TRELLIS_SERVER_NAME` overrides `server.server_name`
/// - `TRELLIS_DB_PATH` overrides `database.path`
/// - `TRELLIS_LOG_LEVEL` overrides `logging.level`
/// - `TRELLIS_LOG_JSON` overrides `logging.json` ("true" or "1" to enable)
/// - `TRELLIS_FROZEN_EVENTS` overrides `events.frozen` ("true" or "1" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = read_config_file(path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn read_config_file(path: Option<&str>) -> Result<Config, ConfigError> {
    match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Ok(Config::default())
            }
            Err(e) => Err(ConfigError::FileRead(e)),
        },
        None => Ok(Config::default()),
    }
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("TRELLIS_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("TRELLIS_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(server_name) = var("TRELLIS_SERVER_NAME") {
        config.server.server_name = server_name;
    }
    if let Some(db_path) = var("TRELLIS_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("TRELLIS_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("TRELLIS_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(frozen) = var("TRELLIS_FROZEN_EVENTS") {
        config.events.frozen = frozen == "true" || frozen == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = read_config_file(path.to_str()).unwrap();

        assert_eq!(config.server.port, 8448);
        assert_eq!(config.server.server_name, "localhost");
        assert_eq!(config.database.path, "trellis.db");
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.database.pool_max_size, 8);
        assert_eq!(config.database.settings(), DbSettings::default());
        assert_eq!(config.logging.level, "info");
        assert!(!config.events.frozen);
        assert_eq!(config.events.default_room_version, "1");
    }

    #[test]
    fn parses_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9000
server_name = "trellis.example"

[events]
frozen = true
"#
        )
        .unwrap();

        let config = read_config_file(file.path().to_str()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.server_name, "trellis.example");
        assert_eq!(config.server.host, default_host());
        assert!(config.events.frozen);
        assert!(config.events.event_config().frozen);
        assert_eq!(config.events.default_room_version, "1");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        assert!(matches!(
            read_config_file(file.path().to_str()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn environment_overrides_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TRELLIS_HOST", "0.0.0.0"),
            ("TRELLIS_PORT", "not-a-port"),
            ("TRELLIS_SERVER_NAME", "env.example"),
            ("TRELLIS_DB_PATH", "/tmp/env.db"),
            ("TRELLIS_LOG_JSON", "1"),
            ("TRELLIS_FROZEN_EVENTS", "true"),
        ]);
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        // unparseable values are ignored
        assert_eq!(config.server.port, 8448);
        assert_eq!(config.server.server_name, "env.example");
        assert_eq!(config.database.path, "/tmp/env.db");
        assert!(config.logging.json);
        assert!(config.events.frozen);
        assert_eq!(config.logging.level, "info");
    }
}
