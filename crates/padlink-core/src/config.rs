use std::path::Path;
use std::time::Duration;

use padlink_transport::ScanFilter;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::SessionOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),
    #[error("config parse error: {0}")]
    ParseError(String),
    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PadlinkConfig {
    /// Trace every packet and event
    pub debug: bool,
    pub handshake_timeout_ms: u64,
    /// Buffered events per listener before a slow one starts lagging
    pub event_capacity: usize,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub name_prefix: Option<String>,
    pub service_uuid: Option<String>,
}

impl Default for PadlinkConfig {
    fn default() -> Self {
        Self {
            debug: false,
            handshake_timeout_ms: 10_000,
            event_capacity: 256,
            scan: ScanConfig::default(),
        }
    }
}

impl PadlinkConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: PadlinkConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Self {
        let mut config = Self::default();

        if let Ok(debug) = std::env::var("PADLINK_DEBUG") {
            config.debug = matches!(debug.as_str(), "1" | "true" | "yes" | "on");
        }
        if let Ok(timeout) = std::env::var("PADLINK_HANDSHAKE_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                config.handshake_timeout_ms = ms;
            }
        }
        if let Ok(prefix) = std::env::var("PADLINK_DEVICE_NAME_PREFIX") {
            config.scan.name_prefix = Some(prefix);
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "handshake_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        if matches!(self.scan.name_prefix.as_deref(), Some("")) {
            return Err(ConfigError::ValidationError(
                "scan.name_prefix must not be empty when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn scan_filter(&self) -> ScanFilter {
        ScanFilter {
            name_prefix: self.scan.name_prefix.clone(),
            service_uuid: self.scan.service_uuid.clone(),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            handshake_timeout: self.handshake_timeout(),
            debug: self.debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PadlinkConfig::default();
        config.validate().unwrap();
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.scan_filter(), ScanFilter::default());
    }

    #[test]
    fn test_parse_partial_file() {
        let config = PadlinkConfig::parse(
            r#"
            debug = true

            [scan]
            name_prefix = "PAD"
            "#,
        )
        .unwrap();

        assert!(config.debug);
        assert_eq!(config.handshake_timeout_ms, 10_000);
        assert_eq!(config.scan.name_prefix.as_deref(), Some("PAD"));
        assert!(config.session_options().debug);
    }

    #[test]
    fn test_validation_errors() {
        let err = PadlinkConfig::parse("handshake_timeout_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let err = PadlinkConfig::parse("event_capacity = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let err = PadlinkConfig::parse("[scan]\nname_prefix = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = PadlinkConfig::parse("debug = \"maybe\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = PadlinkConfig::load_from_file(Path::new("/nonexistent/padlink.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_from_env() {
        std::env::set_var("PADLINK_HANDSHAKE_TIMEOUT_MS", "2500");
        std::env::set_var("PADLINK_DEBUG", "true");
        let config = PadlinkConfig::load_from_env();
        std::env::remove_var("PADLINK_HANDSHAKE_TIMEOUT_MS");
        std::env::remove_var("PADLINK_DEBUG");

        assert_eq!(config.handshake_timeout(), Duration::from_millis(2500));
        assert!(config.debug);
    }
}
