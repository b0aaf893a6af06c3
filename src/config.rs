use std::path::Path;
use std::time::Duration;

use crate::capture::{LiveOptions, DEFAULT_BATCH_LIMIT, DEFAULT_READ_TIMEOUT, DEFAULT_SNAPLEN};
use crate::error::ConfigError;
use crate::reassembly::{DEFAULT_TCP_IDLE_TIMEOUT, DEFAULT_UDP_IDLE_TIMEOUT, DEFAULT_UDP_MAX_DATAGRAMS};

const DEFAULT_CONFIG_PATH: &str = "/etc/pcapflow.conf";
const CONFIG_PATH_VAR: &str = "PCAPFLOW_CONFIG";
const ENV_PREFIX: &str = "PCAPFLOW_";

const KEYS: &[&str] = &[
    "tcp_reassembly",
    "udp_reassembly",
    "unknown_layer_as_error",
    "eager_copy",
    "tcp_idle_timeout_secs",
    "udp_idle_timeout_secs",
    "udp_max_datagrams",
    "snaplen",
    "read_timeout_ms",
    "batch_limit",
];

/// Packet reader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    pub tcp_reassembly: bool,
    pub udp_reassembly: bool,
    /// Deliver packets with unrecognized layers as errors instead of
    /// discarding them
    pub unknown_layer_as_error: bool,
    /// Copy every frame before parsing
    pub eager_copy: bool,
    pub tcp_idle_timeout: Duration,
    pub udp_idle_timeout: Duration,
    pub udp_max_datagrams: usize,
    pub snaplen: u32,
    pub read_timeout: Duration,
    pub batch_limit: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            tcp_reassembly: true,
            udp_reassembly: true,
            unknown_layer_as_error: false,
            eager_copy: false,
            tcp_idle_timeout: DEFAULT_TCP_IDLE_TIMEOUT,
            udp_idle_timeout: DEFAULT_UDP_IDLE_TIMEOUT,
            udp_max_datagrams: DEFAULT_UDP_MAX_DATAGRAMS,
            snaplen: DEFAULT_SNAPLEN,
            read_timeout: DEFAULT_READ_TIMEOUT,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }
}

impl ReaderConfig {
    /// Load from the config file and environment.
    ///
    /// The file named by `PCAPFLOW_CONFIG` (default `/etc/pcapflow.conf`)
    /// is read if it exists, then `PCAPFLOW_<KEY>` variables override it.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = Self::default();
        if Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            config.apply_file(&content)?;
        }
        config.apply_env()?;

        Ok(config)
    }

    /// Parse `key = value` lines on top of the defaults.
    pub fn from_contents(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_file(content)?;
        Ok(config)
    }

    fn apply_file(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                self.set(key.trim(), value.trim())?;
            }
        }
        Ok(())
    }

    // Allow environment variable overrides
    fn apply_env(&mut self) -> Result<(), ConfigError> {
        for key in KEYS {
            let var = format!("{}{}", ENV_PREFIX, key.to_uppercase());
            if let Ok(value) = std::env::var(&var) {
                self.set(key, value.trim())?;
            }
        }
        Ok(())
    }

    /// Set one option by name. Unknown keys are ignored.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "tcp_reassembly" => self.tcp_reassembly = parse_bool(key, value)?,
            "udp_reassembly" => self.udp_reassembly = parse_bool(key, value)?,
            "unknown_layer_as_error" => self.unknown_layer_as_error = parse_bool(key, value)?,
            "eager_copy" => self.eager_copy = parse_bool(key, value)?,
            "tcp_idle_timeout_secs" => {
                self.tcp_idle_timeout = Duration::from_secs(parse_number(key, value)?)
            }
            "udp_idle_timeout_secs" => {
                self.udp_idle_timeout = Duration::from_secs(parse_number(key, value)?)
            }
            "udp_max_datagrams" => self.udp_max_datagrams = parse_number(key, value)?,
            "snaplen" => self.snaplen = parse_number(key, value)?,
            "read_timeout_ms" => {
                self.read_timeout = Duration::from_millis(parse_number(key, value)?)
            }
            "batch_limit" => self.batch_limit = parse_number(key, value)?,
            _ => tracing::debug!("Ignoring unknown config key '{}'", key),
        }
        Ok(())
    }

    /// Options for opening a live interface.
    pub fn live_options(&self, promiscuous: bool) -> LiveOptions {
        LiveOptions::new()
            .with_promiscuous(promiscuous)
            .with_snaplen(self.snaplen)
            .with_read_timeout(self.read_timeout)
            .with_batch_limit(self.batch_limit)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    fn clear_env() {
        env::remove_var(CONFIG_PATH_VAR);
        for key in KEYS {
            env::remove_var(format!("{}{}", ENV_PREFIX, key.to_uppercase()));
        }
    }

    #[test]
    fn test_defaults() {
        let config = ReaderConfig::default();
        assert!(config.tcp_reassembly);
        assert!(config.udp_reassembly);
        assert!(!config.unknown_layer_as_error);
        assert!(!config.eager_copy);
        assert_eq!(config.snaplen, 65536);
        assert_eq!(config.read_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_from_contents() {
        let config = ReaderConfig::from_contents(
            "# reader settings\n\
             tcp_reassembly = false\n\
             \n\
             udp_max_datagrams = 8\n\
             read_timeout_ms=250\n\
             something_else = 1\n",
        )
        .unwrap();

        assert!(!config.tcp_reassembly);
        assert!(config.udp_reassembly);
        assert_eq!(config.udp_max_datagrams, 8);
        assert_eq!(config.read_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_value() {
        let err = ReaderConfig::from_contents("snaplen = lots").unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for 'snaplen': lots");

        let err = ReaderConfig::from_contents("eager_copy = maybe").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_live_options() {
        let config = ReaderConfig::from_contents("snaplen = 1500\nbatch_limit = 0").unwrap();
        let options = config.live_options(true);

        assert!(options.promiscuous);
        assert_eq!(options.snaplen, 1500);
        assert_eq!(options.batch_limit, 0);
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        clear_env();
        let temp = TempDir::new().unwrap();
        env::set_var(CONFIG_PATH_VAR, temp.path().join("absent.conf"));

        let config = ReaderConfig::load().unwrap();
        assert_eq!(config, ReaderConfig::default());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_file_then_env() {
        clear_env();
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pcapflow.conf");
        fs::write(&path, "udp_reassembly = off\ntcp_idle_timeout_secs = 5\n").unwrap();
        env::set_var(CONFIG_PATH_VAR, &path);
        env::set_var("PCAPFLOW_TCP_IDLE_TIMEOUT_SECS", "9");
        env::set_var("PCAPFLOW_EAGER_COPY", "yes");

        let config = ReaderConfig::load().unwrap();
        assert!(!config.udp_reassembly);
        assert_eq!(config.tcp_idle_timeout, Duration::from_secs(9));
        assert!(config.eager_copy);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_rejects_bad_env() {
        clear_env();
        env::set_var(CONFIG_PATH_VAR, "/nonexistent/pcapflow.conf");
        env::set_var("PCAPFLOW_BATCH_LIMIT", "-3");

        assert!(ReaderConfig::load().is_err());
        clear_env();
    }
}
