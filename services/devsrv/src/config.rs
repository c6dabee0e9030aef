//! Service configuration
//!
//! Layered with figment: compiled defaults, then the YAML file, then
//! `DEVSRV_`-prefixed environment variables (`__` separates sections, e.g.
//! `DEVSRV_SERVER__BIND=0.0.0.0:9009`).

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{DevSrvError, Result};
use crate::link::LinkSettings;
use crate::session::SessionSettings;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/devsrv.yaml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "DEVSRV_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub backlog: u32,
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9009".to_string(),
            backlog: 256,
            max_sessions: 65536,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Per-receive timeout in exchanges and while idle
    pub recv_timeout_ms: u64,
    /// Time allowed for the identifier after accept
    pub handshake_timeout_ms: u64,
    /// Sends per exchange before the device is declared unreachable
    pub max_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recv_timeout_ms: 5000,
            handshake_timeout_ms: 5000,
            max_attempts: 5,
        }
    }
}

impl SessionConfig {
    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            link: LinkSettings {
                recv_timeout: Duration::from_millis(self.recv_timeout_ms),
                max_attempts: self.max_attempts,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file holding the `device` table
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/devsrv.db".to_string(),
            max_connections: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub dir: String,
    pub level: String,
    /// JSON lines in the log file instead of text
    pub json: bool,
    /// Hex dump of every frame into a separate file
    pub frame_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            level: "info".to_string(),
            json: false,
            frame_log: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 60,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub monitor: MonitorConfig,
}

impl Config {
    /// Defaults < YAML file (if present) < environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Config = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.bind.trim().is_empty() {
            return Err(DevSrvError::config("server.bind cannot be empty"));
        }
        if self.server.max_sessions == 0 {
            return Err(DevSrvError::config("server.max_sessions must be positive"));
        }
        if self.session.recv_timeout_ms == 0 || self.session.handshake_timeout_ms == 0 {
            return Err(DevSrvError::config("session timeouts must be positive"));
        }
        if self.session.max_attempts == 0 {
            return Err(DevSrvError::config("session.max_attempts must be positive"));
        }
        if self.redis.url.trim().is_empty() {
            return Err(DevSrvError::config("redis.url cannot be empty"));
        }
        if self.database.path.trim().is_empty() {
            return Err(DevSrvError::config("database.path cannot be empty"));
        }
        if self.monitor.enabled && self.monitor.interval_secs == 0 {
            return Err(DevSrvError::config("monitor.interval_secs must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9009");
        assert_eq!(config.session.max_attempts, 5);

        let settings = config.session.settings();
        assert_eq!(settings.link.recv_timeout, Duration::from_secs(5));
        assert_eq!(settings.handshake_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.server.backlog, 256);
        assert!(!config.monitor.enabled);
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  bind: \"127.0.0.1:7000\"\nsession:\n  max_attempts: 3\nmonitor:\n  enabled: true\n  interval_secs: 30"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:7000");
        // Unset fields in a present section keep their defaults
        assert_eq!(config.server.max_sessions, 65536);
        assert_eq!(config.session.max_attempts, 3);
        assert_eq!(config.session.recv_timeout_ms, 5000);
        assert!(config.monitor.enabled);
        assert_eq!(config.monitor.interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "session:\n  max_attempts: 0").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, DevSrvError::ConfigError(_)));
    }

    #[test]
    fn test_validation_rejects_empty_redis_url() {
        let mut config = Config::default();
        config.redis.url = String::new();
        assert!(config.validate().is_err());
    }
}
