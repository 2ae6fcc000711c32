//! Application configuration.
//!
//! Settings are read from a TOML document and then overridden by `APP_*`
//! environment variables. Every field has a default, so an empty document is
//! a valid configuration.
//!
//! ```toml
//! environment = "prod"
//! server_prefix = "shop-eu1"
//!
//! [cache]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1/"
//!
//! [routing]
//! api_prefix = "/api"
//! access_denied_url = "/access-denied"
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Route tables are rebuilt on every start.
    #[default]
    Dev,
    Test,
    /// Route tables are served from the shared cache when present.
    Prod,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Prod => "prod",
        }
    }

    pub fn is_development(self) -> bool {
        self == Self::Dev
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" | "production" => Ok(Self::Prod),
            _ => Err(ConfigError::InvalidValue {
                key: "APP_ENV",
                value: s.to_owned(),
            }),
        }
    }
}

/// Which cache adapter [`crate::cache::connect`] should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Host-shared in-memory store.
    #[default]
    Memory,
    /// Store owned by a single adapter instance.
    Local,
    /// Distributed Redis store.
    Redis,
}

impl FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "local" => Ok(Self::Local),
            "redis" => Ok(Self::Redis),
            _ => Err(ConfigError::InvalidValue {
                key: "APP_CACHE_BACKEND",
                value: s.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Read-through caching for entity repositories.
    pub repository_cache: bool,
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            repository_cache: true,
            backend: CacheBackend::Memory,
            redis_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Paths under this prefix get JSON errors instead of redirects.
    pub api_prefix: String,
    /// Redirect target when a middleware denies a non-API request.
    pub access_denied_url: String,
    /// Cache key the serialized route table is stored under.
    pub route_table_key: String,
    /// Upper bound on memoized path resolutions.
    pub resolution_cache_capacity: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            api_prefix: "/api".to_owned(),
            access_denied_url: "/access-denied".to_owned(),
            route_table_key: "route_table".to_owned(),
            resolution_cache_capacity: 10_000,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub environment: Environment,
    /// Distinguishes deployments that share a cache server.
    pub server_prefix: String,
    pub cache: CacheConfig,
    pub routing: RoutingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Dev,
            server_prefix: "routegate".to_owned(),
            cache: CacheConfig::default(),
            routing: RoutingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Applies `APP_*` overrides from the process environment.
    pub fn with_process_env(self) -> Result<Self, ConfigError> {
        self.with_env(|key| std::env::var(key).ok())
    }

    /// Applies `APP_*` overrides using `lookup` as the variable source.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("APP_ENV") {
            self.environment = v.parse()?;
        }
        if let Some(v) = lookup("APP_SERVER_PREFIX") {
            self.server_prefix = v;
        }
        if let Some(v) = lookup("APP_REPOSITORY_CACHE") {
            self.cache.repository_cache = parse_bool("APP_REPOSITORY_CACHE", &v)?;
        }
        if let Some(v) = lookup("APP_CACHE_BACKEND") {
            self.cache.backend = v.parse()?;
        }
        if let Some(v) = lookup("APP_REDIS_URL") {
            self.cache.redis_url = Some(v);
        }
        if let Some(v) = lookup("APP_API_PREFIX") {
            self.routing.api_prefix = v;
        }
        if let Some(v) = lookup("APP_ACCESS_DENIED_URL") {
            self.routing.access_denied_url = v;
        }
        Ok(self)
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.environment.is_development());
        assert_eq!(config.routing.api_prefix, "/api");
    }

    #[test]
    fn toml_sections_are_read() {
        let config = AppConfig::from_toml_str(
            r#"
            environment = "prod"
            server_prefix = "eu1"

            [cache]
            backend = "local"
            repository_cache = false

            [routing]
            access_denied_url = "/login"
            "#,
        )
        .unwrap();
        assert_eq!(config.environment, Environment::Prod);
        assert_eq!(config.server_prefix, "eu1");
        assert_eq!(config.cache.backend, CacheBackend::Local);
        assert!(!config.cache.repository_cache);
        assert_eq!(config.routing.access_denied_url, "/login");
        assert_eq!(config.routing.route_table_key, "route_table");
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            AppConfig::from_toml_str("environment = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let config = AppConfig::default()
            .with_env(env(&[
                ("APP_ENV", "production"),
                ("APP_REPOSITORY_CACHE", "off"),
                ("APP_CACHE_BACKEND", "redis"),
                ("APP_REDIS_URL", "redis://cache:6379/"),
            ]))
            .unwrap();
        assert_eq!(config.environment, Environment::Prod);
        assert!(!config.cache.repository_cache);
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://cache:6379/"));
    }

    #[test]
    fn invalid_env_value_names_the_variable() {
        let err = AppConfig::default()
            .with_env(env(&[("APP_REPOSITORY_CACHE", "maybe")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid value `maybe` for APP_REPOSITORY_CACHE");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            AppConfig::from_file("/nonexistent/routegate.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
