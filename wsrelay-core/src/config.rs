use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::service::MissingDestinationPolicy;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub registry: RegistryConfig,
    pub delivery: DeliveryConfig,
    pub dispatcher: DispatcherConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub key_prefix: String,
    pub operation_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "wsrelay:".to_string(),
            operation_timeout_ms: 5000,
        }
    }
}

/// Which `SubscriptionStore` backs the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryBackend {
    #[default]
    Redis,
    /// Single node only, contents are lost on restart
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub backend: RegistryBackend,
    pub table_name: String,
    /// Retries of a partially applied bulk write
    pub backoff_ceiling: u32,
    pub page_size: usize,
    /// Items accepted per bulk write call
    pub max_batch_write: usize,
    /// Expired row purge period of the memory backend
    pub sweep_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::Redis,
            table_name: "subscriptions".to_string(),
            backoff_ceiling: 5,
            page_size: 100,
            max_batch_write: 25,
            sweep_interval_secs: 60,
        }
    }
}

impl RegistryConfig {
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub region: String,
    /// Base URL of the connection management API
    pub endpoint: String,
    /// Must stay below `dispatcher.safety_margin_ms` so a push started
    /// just before the cutoff still ends before the deadline
    pub request_timeout_ms: u64,
    /// Message attribute carrying the destination connection id
    pub destination_attribute: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: String::new(),
            request_timeout_ms: 4000,
            destination_attribute: "connectionId".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub safety_margin_ms: u64,
    pub invocation_timeout_ms: u64,
    pub missing_destination: MissingDestinationPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            safety_margin_ms: 5000,
            invocation_timeout_ms: 30_000,
            missing_destination: MissingDestinationPolicy::Redeliver,
        }
    }
}

impl DispatcherConfig {
    #[must_use]
    pub const fn safety_margin(&self) -> Duration {
        Duration::from_millis(self.safety_margin_ms)
    }

    #[must_use]
    pub const fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // WSRELAY__DELIVERY__ENDPOINT, WSRELAY__REGISTRY__TABLE_NAME, ...
        builder = builder.add_source(
            Environment::with_prefix("WSRELAY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check the configuration, collecting every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.http_port == 0 {
            errors.push("server.http_port must be non-zero".to_string());
        }
        if self.delivery.endpoint.trim().is_empty() {
            errors.push("delivery.endpoint is required".to_string());
        } else if !self.delivery.endpoint.starts_with("http://")
            && !self.delivery.endpoint.starts_with("https://")
        {
            errors.push(format!(
                "delivery.endpoint must be an http(s) URL, got '{}'",
                self.delivery.endpoint
            ));
        }
        if self.delivery.destination_attribute.is_empty() {
            errors.push("delivery.destination_attribute must not be empty".to_string());
        }
        if self.delivery.request_timeout_ms == 0 {
            errors.push("delivery.request_timeout_ms must be non-zero".to_string());
        } else if self.delivery.request_timeout_ms >= self.dispatcher.safety_margin_ms {
            errors.push(format!(
                "delivery.request_timeout_ms ({}) must be below dispatcher.safety_margin_ms ({})",
                self.delivery.request_timeout_ms, self.dispatcher.safety_margin_ms
            ));
        }
        if self.registry.table_name.is_empty() {
            errors.push("registry.table_name must not be empty".to_string());
        }
        if self.registry.page_size == 0 {
            errors.push("registry.page_size must be non-zero".to_string());
        }
        if self.registry.max_batch_write == 0 {
            errors.push("registry.max_batch_write must be non-zero".to_string());
        }
        if self.registry.backend == RegistryBackend::Memory
            && self.registry.sweep_interval_secs == 0
        {
            errors.push(
                "registry.sweep_interval_secs must be non-zero for the memory backend".to_string(),
            );
        }
        if self.registry.backend == RegistryBackend::Redis {
            if self.redis.url.is_empty() {
                errors.push("redis.url is required for the redis backend".to_string());
            }
            if self.redis.operation_timeout_ms == 0 {
                errors.push("redis.operation_timeout_ms must be non-zero".to_string());
            }
        }
        if self.dispatcher.safety_margin_ms >= self.dispatcher.invocation_timeout_ms {
            errors.push(format!(
                "dispatcher.safety_margin_ms ({}) must be below dispatcher.invocation_timeout_ms ({})",
                self.dispatcher.safety_margin_ms, self.dispatcher.invocation_timeout_ms
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.delivery.endpoint =
            "https://abc.execute-api.us-east-1.amazonaws.com/prod".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.registry.backend, RegistryBackend::Redis);
        assert_eq!(config.registry.backoff_ceiling, 5);
        assert_eq!(config.registry.max_batch_write, 25);
        assert_eq!(config.dispatcher.safety_margin(), Duration::from_secs(5));
        assert_eq!(config.dispatcher.missing_destination, MissingDestinationPolicy::Redeliver);
        assert_eq!(config.delivery.destination_attribute, "connectionId");
        assert_eq!(config.redis.key_prefix, "wsrelay:");
    }

    #[test]
    fn test_http_address() {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                http_port: 9000,
            },
            ..Config::default()
        };

        assert_eq!(config.http_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_endpoint() {
        let errors = Config::default().validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("delivery.endpoint")));
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = valid_config();
        config.delivery.endpoint = "ftp://nope".to_string();
        config.registry.page_size = 0;
        config.dispatcher.safety_margin_ms = 40_000;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn test_memory_backend_skips_redis_checks() {
        let mut config = valid_config();
        config.registry.backend = RegistryBackend::Memory;
        config.redis.url = String::new();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_push_timeout_past_margin() {
        let mut config = valid_config();
        config.delivery.request_timeout_ms = 10_000;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("delivery.request_timeout_ms"));
    }

    #[test]
    fn test_validate_memory_backend_needs_sweep_interval() {
        let mut config = valid_config();
        config.registry.backend = RegistryBackend::Memory;
        config.registry.sweep_interval_secs = 0;

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("sweep_interval_secs")));
    }

    #[test]
    fn test_load_from_yaml_file() {
        // File source only, so WSRELAY__* variables in the test process cannot leak in
        let config: Config = ConfigBuilder::builder()
            .add_source(File::from_str(
                "registry:\n  backend: memory\n  table_name: subs\n\
                 delivery:\n  endpoint: http://localhost:3001\n\
                 dispatcher:\n  missing_destination: skip\n",
                FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.registry.backend, RegistryBackend::Memory);
        assert_eq!(config.registry.table_name, "subs");
        assert_eq!(config.registry.page_size, 100);
        assert_eq!(config.delivery.endpoint, "http://localhost:3001");
        assert_eq!(config.dispatcher.missing_destination, MissingDestinationPolicy::Skip);
    }
}
