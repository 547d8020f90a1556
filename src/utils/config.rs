//! Process configuration: compiled-in defaults, optional TOML file, then CLI overrides.
//!
//! Both binaries call `load_or_default` with the `--config` path (if any) and then patch the
//! result with whatever flags were passed explicitly.

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::utils::error::ConfigError;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8080;

/// Sensing/dispatch process settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub server_host: String,
    pub server_port: u16,
    pub tick_ms: u64,
    /// Start-up connect only; reconnects during the loop use `send_timeout_ms`.
    pub connect_timeout_ms: u64,
    pub send_timeout_ms: u64,
    /// Coins a chute must gain since its last dispatch before `START_TRACK_<c>` is sent.
    pub dispatch_threshold: u64,
    /// Global coins between telemetry records.
    pub telemetry_threshold: u64,
    pub weight_read_every: u64,
    /// IR beam sensors read low while a coin blocks them.
    pub inverted_logic: bool,
    pub scale_factor: f64,
    pub telemetry_csv: String,
    pub telemetry_attempts: u32,
    pub telemetry_retry_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_HOST.to_string(),
            server_port: DEFAULT_PORT,
            tick_ms: 100,
            connect_timeout_ms: 5_000,
            send_timeout_ms: 1_000,
            dispatch_threshold: 5,
            telemetry_threshold: 5,
            weight_read_every: 20,
            inverted_logic: true,
            scale_factor: 992.0,
            telemetry_csv: "data/telemetry.csv".to_string(),
            telemetry_attempts: 3,
            telemetry_retry_ms: 2_000,
        }
    }
}

impl DeviceConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Pause after a faulted tick.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.tick_ms * 5)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Simulation/control process settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tick_hz: f64,
    /// Overrides every track's own time budget when set.
    pub time_budget_secs: Option<u64>,
    pub data_dir: String,
    pub record_trajectory: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tick_hz: 60.0,
            time_budget_secs: None,
            data_dir: "data".to_string(),
            record_trajectory: true,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Reads a TOML file into `T`, or returns `T::default()` when no path is given.
pub fn load_or_default<T>(path: Option<&Path>) -> Result<T, ConfigError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    let Some(path) = path else {
        return Ok(T::default());
    };

    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: DeviceConfig = toml::from_str("server_port = 9090\ntick_ms = 50").unwrap();
        assert_eq!(cfg.server_port, 9090);
        assert_eq!(cfg.tick_ms, 50);
        assert_eq!(cfg.server_host, "localhost");
        assert_eq!(cfg.dispatch_threshold, 5);
        assert_eq!(cfg.backoff(), Duration::from_millis(250));
    }

    #[test]
    fn missing_path_yields_default() {
        let cfg: ServerConfig = load_or_default(None).unwrap();
        assert_eq!(cfg, ServerConfig::default());
        assert_eq!(cfg.bind_addr(), "localhost:8080");
    }

    #[test]
    fn unreadable_file_is_reported() {
        let err = load_or_default::<ServerConfig>(Some(Path::new("/nonexistent/coin.toml")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
