//! Configuration loading and validation
//!
//! The proxy is configured from a TOML file with one section per
//! component:
//!
//! ```toml
//! [general]
//! application_name = "packet-proxy"
//! verbosity = 3
//!
//! [frontend]
//! host = "0.0.0.0"
//! port = 50000
//! maximum_message_size_bytes = 8192
//! maximum_number_of_publishers = 64
//! maximum_number_of_consecutive_invalid_messages = 10
//! # server_key_path = "/etc/proxy/server.key"
//! # server_certificate_path = "/etc/proxy/server.crt"
//! # access_token = "..."
//!
//! [backend]
//! host = "0.0.0.0"
//! port = 50001
//! maximum_number_of_subscribers = 32
//! queue_capacity = 32
//! maximum_write_queue_size = 32
//! poll_interval_milliseconds = 20
//!
//! [proxy]
//! queue_capacity = 8192
//!
//! [duplicate_detector]
//! circular_buffer_size = 1024
//! # circular_buffer_duration = 90   # seconds
//! ```
//!
//! Every section is optional; defaults match the values above. Setting an
//! access token on an endpoint without TLS credentials is a configuration
//! error, and the frontend and backend may not bind the same host:port.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::detector::DetectorOptions;
use crate::error::{Error, Result};

/// Logging identity and verbosity
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Name reported in logs
    pub application_name: String,
    /// 1 = critical only .. 4 = debug
    pub verbosity: u8,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            application_name: "packet-proxy".to_string(),
            verbosity: 3,
        }
    }
}

/// Frontend (publisher-facing) endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// PEM-encoded private key; TLS requires both key and certificate
    pub server_key_path: Option<PathBuf>,
    /// PEM-encoded certificate chain
    pub server_certificate_path: Option<PathBuf>,
    /// Shared bearer token; enforced only on a TLS listener
    pub access_token: Option<String>,
    /// Maximum inbound frame size
    pub maximum_message_size_bytes: usize,
    /// Concurrent publisher cap
    pub maximum_number_of_publishers: usize,
    /// Consecutive invalid packets before the publisher is kicked
    pub maximum_number_of_consecutive_invalid_messages: u64,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50000,
            server_key_path: None,
            server_certificate_path: None,
            access_token: None,
            maximum_message_size_bytes: 8192,
            maximum_number_of_publishers: 64,
            maximum_number_of_consecutive_invalid_messages: 10,
        }
    }
}

impl FrontendConfig {
    /// `host:port` string for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Backend (subscriber-facing) endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// PEM-encoded private key; TLS requires both key and certificate
    pub server_key_path: Option<PathBuf>,
    /// PEM-encoded certificate chain
    pub server_certificate_path: Option<PathBuf>,
    /// Shared bearer token; enforced only on a TLS listener
    pub access_token: Option<String>,
    /// Concurrent subscriber cap
    pub maximum_number_of_subscribers: usize,
    /// Per-subscriber packet queue capacity
    pub queue_capacity: usize,
    /// Local write queue capacity per subscriber connection
    pub maximum_write_queue_size: usize,
    /// Sleep between queue polls when a subscriber is idle
    pub poll_interval_milliseconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50001,
            server_key_path: None,
            server_certificate_path: None,
            access_token: None,
            maximum_number_of_subscribers: 32,
            queue_capacity: 32,
            maximum_write_queue_size: 32,
            poll_interval_milliseconds: 20,
        }
    }
}

impl BackendConfig {
    /// `host:port` string for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Idle poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_milliseconds)
    }
}

/// Proxy core configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Shared ingress queue capacity
    pub queue_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 8192,
        }
    }
}

/// Duplicate detector configuration; the section is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DuplicateDetectorConfig {
    /// Retain at most this many recent fingerprints
    pub circular_buffer_size: Option<usize>,
    /// Drop fingerprints older than this many seconds
    pub circular_buffer_duration: Option<u64>,
}

impl DuplicateDetectorConfig {
    /// Convert to detector options
    pub fn options(&self) -> DetectorOptions {
        let mut options = DetectorOptions::default();
        if let Some(size) = self.circular_buffer_size {
            options = options.circular_buffer_size(size);
        }
        if let Some(seconds) = self.circular_buffer_duration {
            options = options.circular_buffer_duration(Duration::from_secs(seconds));
        }
        options
    }
}

/// Complete proxy configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub frontend: FrontendConfig,
    pub backend: BackendConfig,
    pub proxy: CoreConfig,
    /// Present only when duplicate detection is enabled
    pub duplicate_detector: Option<DuplicateDetectorConfig>,
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<()> {
        if self.frontend.maximum_message_size_bytes == 0 {
            return Err(Error::Config(
                "frontend.maximum_message_size_bytes must be positive".to_string(),
            ));
        }
        if self.frontend.maximum_number_of_publishers == 0 {
            return Err(Error::Config(
                "frontend.maximum_number_of_publishers must be positive".to_string(),
            ));
        }
        if self.backend.maximum_number_of_subscribers == 0 {
            return Err(Error::Config(
                "backend.maximum_number_of_subscribers must be positive".to_string(),
            ));
        }
        if self.backend.queue_capacity == 0 {
            return Err(Error::Config(
                "backend.queue_capacity must be positive".to_string(),
            ));
        }
        if self.backend.maximum_write_queue_size == 0 {
            return Err(Error::Config(
                "backend.maximum_write_queue_size must be positive".to_string(),
            ));
        }
        if self.proxy.queue_capacity == 0 {
            return Err(Error::Config(
                "proxy.queue_capacity must be positive".to_string(),
            ));
        }

        validate_endpoint_credentials(
            "frontend",
            self.frontend.server_key_path.as_deref(),
            self.frontend.server_certificate_path.as_deref(),
            self.frontend.access_token.as_deref(),
        )?;
        validate_endpoint_credentials(
            "backend",
            self.backend.server_key_path.as_deref(),
            self.backend.server_certificate_path.as_deref(),
            self.backend.access_token.as_deref(),
        )?;

        // Port 0 asks the OS for an ephemeral port, so two zeros never collide
        if self.frontend.host == self.backend.host
            && self.frontend.port == self.backend.port
            && self.frontend.port != 0
        {
            return Err(Error::Config(
                "cannot bind frontend and backend on the same host and port".to_string(),
            ));
        }

        if let Some(detector) = &self.duplicate_detector {
            if detector.circular_buffer_size.is_none()
                && detector.circular_buffer_duration.is_none()
            {
                return Err(Error::Config(
                    "duplicate_detector requires circular_buffer_size or circular_buffer_duration"
                        .to_string(),
                ));
            }
            if detector.circular_buffer_size == Some(0) {
                return Err(Error::Config(
                    "duplicate_detector.circular_buffer_size must be positive".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn validate_endpoint_credentials(
    section: &str,
    key: Option<&Path>,
    certificate: Option<&Path>,
    access_token: Option<&str>,
) -> Result<()> {
    match (key, certificate) {
        (Some(key), Some(certificate)) => {
            if !key.exists() {
                return Err(Error::Config(format!(
                    "{section} server key file {} does not exist",
                    key.display()
                )));
            }
            if !certificate.exists() {
                return Err(Error::Config(format!(
                    "{section} server certificate file {} does not exist",
                    certificate.display()
                )));
            }
        }
        (None, None) => {
            if access_token.is_some() {
                return Err(Error::Config(format!(
                    "{section} must set server certificate and key to use an access token"
                )));
            }
        }
        _ => {
            return Err(Error::Config(format!(
                "{section} must set both server_key_path and server_certificate_path or neither"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.frontend.port, 50000);
        assert_eq!(config.backend.port, 50001);
        assert_eq!(config.frontend.maximum_message_size_bytes, 8192);
        assert_eq!(config.frontend.maximum_number_of_publishers, 64);
        assert_eq!(config.backend.maximum_number_of_subscribers, 32);
        assert_eq!(config.backend.queue_capacity, 32);
        assert_eq!(config.proxy.queue_capacity, 8192);
        assert_eq!(config.general.verbosity, 3);
        assert!(config.duplicate_detector.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            [general]
            verbosity = 4

            [frontend]
            port = 58151
            maximum_number_of_consecutive_invalid_messages = 3

            [backend]
            port = 58152
            queue_capacity = 4

            [duplicate_detector]
            circular_buffer_size = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.general.verbosity, 4);
        assert_eq!(config.frontend.port, 58151);
        assert_eq!(
            config.frontend.maximum_number_of_consecutive_invalid_messages,
            3
        );
        assert_eq!(config.backend.queue_capacity, 4);
        assert_eq!(
            config.duplicate_detector.unwrap().circular_buffer_size,
            Some(8)
        );
        // Unspecified fields keep their defaults
        assert_eq!(config.frontend.host, "0.0.0.0");
        assert_eq!(config.backend.maximum_write_queue_size, 32);
    }

    #[test]
    fn test_same_bind_address_rejected() {
        let mut config = Config::default();
        config.backend.port = config.frontend.port;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_requires_tls() {
        let mut config = Config::default();
        config.frontend.access_token = Some("secret".to_string());

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_key_without_certificate_rejected() {
        let mut config = Config::default();
        config.backend.server_key_path = Some(PathBuf::from("/tmp/server.key"));

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_capacities_rejected() {
        let mut config = Config::default();
        config.proxy.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.backend.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_detector_without_bounds_rejected() {
        let mut config = Config::default();
        config.duplicate_detector = Some(DuplicateDetectorConfig::default());

        assert!(config.validate().is_err());
    }
}
