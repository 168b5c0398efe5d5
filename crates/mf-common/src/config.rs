//! ---
//! mfg_section: "01-core-functionality"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "Shared primitives and utilities for the gateway runtime."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::LogFormat;

fn default_broker_url() -> String {
    "tcp://localhost:1883".to_owned()
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_auto_reset_on_alarm() -> bool {
    true
}

fn default_stats_interval_secs() -> u64 {
    10
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default api address")
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the gateway runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "MF_GATEWAY_CONFIG";

    /// Load configuration from disk, respecting the `MF_GATEWAY_CONFIG`
    /// override, then apply environment-variable overrides. When no
    /// candidate file exists the built-in defaults are used; every
    /// recognized option is optional.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path, if any.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let mut config = Self::from_path(&path)?;
                config.apply_env_overrides();
                config.validate()?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let mut config = Self::from_path(&path)?;
                config.apply_env_overrides();
                config.validate()?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Fold the documented environment variables into the configuration.
    /// Environment always wins over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("MQTT_BROKER_URL") {
            if !url.trim().is_empty() {
                self.bus.broker_url = url;
            }
        }
        if let Ok(user) = std::env::var("MQTT_USERNAME") {
            self.bus.username = Some(user);
        }
        if let Ok(pass) = std::env::var("MQTT_PASSWORD") {
            self.bus.password = Some(pass);
        }
        if let Ok(flag) = std::env::var("AUTO_RESET_ON_ALARM") {
            self.gateway.auto_reset_on_alarm = flag.trim().eq_ignore_ascii_case("true");
        }
        if let Ok(listen) = std::env::var("MF_API_LISTEN") {
            match listen.parse() {
                Ok(addr) => self.api.listen = addr,
                Err(err) => debug!(value = %listen, error = %err, "ignoring invalid MF_API_LISTEN"),
            }
        }
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.bus.host_port()?;
        if self.gateway.stats_interval_secs == 0 {
            return Err(anyhow!("gateway.stats_interval_secs must be at least 1"));
        }
        Ok(())
    }
}

/// MQTT broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Broker endpoint, `tcp://host:port` or plain `host:port`.
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl BusConfig {
    /// Split the broker endpoint into host and port, defaulting the port
    /// to 1883 when omitted.
    pub fn host_port(&self) -> Result<(String, u16)> {
        let trimmed = self
            .broker_url
            .trim()
            .strip_prefix("tcp://")
            .or_else(|| self.broker_url.trim().strip_prefix("mqtt://"))
            .unwrap_or_else(|| self.broker_url.trim());
        if trimmed.is_empty() {
            return Err(anyhow!("bus.broker_url must not be empty"));
        }
        match trimmed.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port
                    .parse()
                    .with_context(|| format!("invalid broker port in {}", self.broker_url))?;
                Ok((host.to_owned(), port))
            }
            None => Ok((trimmed.to_owned(), 1883)),
        }
    }
}

/// Gateway behaviour toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Automatically publish a RESET when a robot reports ALARM.
    #[serde(default = "default_auto_reset_on_alarm")]
    pub auto_reset_on_alarm: bool,
    /// Period of the aggregate statistics log line.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            auto_reset_on_alarm: default_auto_reset_on_alarm(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
        }
    }
}

/// Logging sink settings consumed by [`crate::logging::init_tracing`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            file_prefix: None,
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().expect("defaults validate");
        assert!(config.gateway.auto_reset_on_alarm);
        assert_eq!(config.gateway.stats_interval_secs, 10);
        assert_eq!(config.api.listen.port(), 8080);
    }

    #[test]
    fn broker_url_parsing_handles_scheme_and_bare_forms() {
        let mut bus = BusConfig::default();
        assert_eq!(bus.host_port().unwrap(), ("localhost".to_owned(), 1883));

        bus.broker_url = "tcp://broker.lan:2883".into();
        assert_eq!(bus.host_port().unwrap(), ("broker.lan".to_owned(), 2883));

        bus.broker_url = "broker.lan".into();
        assert_eq!(bus.host_port().unwrap(), ("broker.lan".to_owned(), 1883));

        bus.broker_url = "tcp://broker.lan:not-a-port".into();
        assert!(bus.host_port().is_err());
    }

    #[test]
    fn partial_toml_files_fall_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[bus]\nbroker_url = \"tcp://broker.lan:1883\"\n\n[gateway]\nauto_reset_on_alarm = false\n"
        )
        .expect("write config");

        let loaded = AppConfig::load_with_source(&[file.path()]).expect("load");
        assert_eq!(loaded.source.as_deref(), Some(file.path()));
        let config = loaded.config;
        assert_eq!(config.bus.broker_url, "tcp://broker.lan:1883");
        assert!(!config.gateway.auto_reset_on_alarm);
        assert!(config.api.enabled);
    }

    #[test]
    fn missing_candidates_yield_defaults() {
        let loaded =
            AppConfig::load_with_source(&[PathBuf::from("does/not/exist.toml")]).expect("load");
        assert!(loaded.source.is_none());
        assert_eq!(loaded.config.bus.broker_url, "tcp://localhost:1883");
    }
}
