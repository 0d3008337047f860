use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub holding: HoldingConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Redis,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Where performances and venues come from. Without a path the built-in
/// sample catalog is served.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CatalogConfig {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HoldingConfig {
    pub ttl_seconds: u64,
    pub max_party_size: u32,
    /// `single_active` or `allow_multiple`.
    pub policy: String,
    pub sweep_interval_seconds: u64,
    /// How long an expired holding record is kept before the sweeper drops it.
    pub retention_seconds: u64,
}

impl HoldingConfig {
    pub fn ttl(&self) -> chrono::Duration {
        saturating_seconds(self.ttl_seconds)
    }

    pub fn retention(&self) -> chrono::Duration {
        saturating_seconds(self.retention_seconds)
    }
}

/// Seconds beyond what `chrono::Duration` can hold clamp to its maximum.
fn saturating_seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

impl Default for HoldingConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 600,
            max_party_size: 4,
            policy: "single_active".to_string(),
            sweep_interval_seconds: 30,
            retention_seconds: 3600,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional.
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in.
            .add_source(config::File::with_name("config/local").required(false))
            // `CURTAIN_HOLDING__TTL_SECONDS=120` sets `holding.ttl_seconds`.
            .add_source(config::Environment::with_prefix("CURTAIN").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_TOML: &str = include_str!("../../config/default.toml");

    fn from_toml(extra: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_TOML, config::FileFormat::Toml))
            .add_source(config::File::from_str(extra, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config_parses() {
        let config = from_toml("");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.holding, HoldingConfig::default());
        assert!(!config.kafka.enabled);
        assert!(config.catalog.path.is_none());
    }

    #[test]
    fn test_overrides_layer_on_defaults() {
        let config = from_toml(
            r#"
            [storage]
            backend = "redis"

            [holding]
            ttl_seconds = 120
            "#,
        );
        assert_eq!(config.storage.backend, StorageBackend::Redis);
        assert_eq!(config.holding.ttl_seconds, 120);
        assert_eq!(config.holding.max_party_size, 4);
    }

    #[test]
    fn test_holding_windows_saturate() {
        let holding = HoldingConfig::default();
        assert_eq!(holding.ttl(), chrono::Duration::minutes(10));
        assert_eq!(holding.retention(), chrono::Duration::hours(1));

        let huge = HoldingConfig {
            ttl_seconds: u64::MAX,
            retention_seconds: i64::MAX as u64 + 1,
            ..HoldingConfig::default()
        };
        assert_eq!(huge.ttl(), chrono::Duration::MAX);
        assert_eq!(huge.retention(), chrono::Duration::MAX);
    }
}
