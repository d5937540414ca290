//! Database connectivity
//!
//! Pool configuration read from the environment and the PostgreSQL pool
//! constructor used by [`PostgresDriver`](crate::driver::PostgresDriver).

use std::env;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::error::{ConfigError, ModelError};

/// Database connection pool error types
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Connection acquisition failed: {0}")]
    AcquisitionFailed(#[from] sqlx::Error),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },
}

impl From<PoolError> for ModelError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::AcquisitionFailed(sqlx_err) => {
                ModelError::Connection(format!("Database connection failed: {}", sqlx_err))
            }
            PoolError::ConfigurationError { message } => {
                ModelError::Connection(format!("Database configuration error: {}", message))
            }
        }
    }
}

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
    pub idle_timeout: Option<u64>,
    pub max_lifetime: Option<u64>,
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: 30,
            idle_timeout: Some(600),  // 10 minutes
            max_lifetime: Some(1800), // 30 minutes
            test_before_acquire: true,
        }
    }
}

/// Connection settings for one database group
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool: PoolConfig,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            url: url.into(),
            pool: PoolConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Read `DATABASE_URL` and the optional `DB_MAX_CONNECTIONS`,
    /// `DB_MIN_CONNECTIONS` and `DB_ACQUIRE_TIMEOUT` variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("DATABASE_URL").map_err(|_| {
            ConfigError::missing_required("database_url", "DATABASE_URL environment variable is required")
        })?;

        let mut config = Self {
            url,
            pool: PoolConfig::default(),
        };

        if let Ok(value) = env::var("DB_MAX_CONNECTIONS") {
            config.pool.max_connections = parse_number("max_connections", &value)?;
        }
        if let Ok(value) = env::var("DB_MIN_CONNECTIONS") {
            config.pool.min_connections = parse_number("min_connections", &value)?;
        }
        if let Ok(value) = env::var("DB_ACQUIRE_TIMEOUT") {
            config.pool.acquire_timeout = parse_number("acquire_timeout", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| ConfigError::invalid_value("database_url", self.url.clone(), e.to_string()))?;

        if !matches!(parsed.scheme(), "postgres" | "postgresql") {
            return Err(ConfigError::invalid_value(
                "database_url",
                parsed.scheme(),
                "postgres:// or postgresql:// URL",
            ));
        }

        if self.pool.min_connections > self.pool.max_connections {
            return Err(ConfigError::invalid_value(
                "min_connections",
                self.pool.min_connections.to_string(),
                format!("at most max_connections ({})", self.pool.max_connections),
            ));
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid_value(field, value, "a non-negative integer"))
}

/// Create a PostgreSQL pool
pub async fn create_pool(config: &DatabaseConfig) -> Result<Arc<Pool<Postgres>>, ModelError> {
    let pool_config = &config.pool;
    tracing::debug!(
        "Creating database pool with config: max={}, min={}, timeout={}s, idle_timeout={:?}s, max_lifetime={:?}s",
        pool_config.max_connections,
        pool_config.min_connections,
        pool_config.acquire_timeout,
        pool_config.idle_timeout,
        pool_config.max_lifetime
    );

    let mut options = PgPoolOptions::new()
        .max_connections(pool_config.max_connections)
        .min_connections(pool_config.min_connections)
        .acquire_timeout(Duration::from_secs(pool_config.acquire_timeout))
        .test_before_acquire(pool_config.test_before_acquire);

    if let Some(idle_timeout) = pool_config.idle_timeout {
        options = options.idle_timeout(Duration::from_secs(idle_timeout));
    }

    if let Some(max_lifetime) = pool_config.max_lifetime {
        options = options.max_lifetime(Duration::from_secs(max_lifetime));
    }

    let pool = options.connect(&config.url).await.map_err(|e| {
        tracing::error!("Failed to create database pool: {}", e);
        PoolError::AcquisitionFailed(e)
    })?;

    tracing::info!(
        "Database pool created with {} max connections",
        pool_config.max_connections
    );
    Ok(Arc::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout, 30);
        assert_eq!(config.idle_timeout, Some(600));
        assert_eq!(config.max_lifetime, Some(1800));
        assert!(config.test_before_acquire);
    }

    #[test]
    fn test_url_scheme_is_checked() {
        assert!(DatabaseConfig::new("postgres://localhost/app").is_ok());
        assert!(DatabaseConfig::new("postgresql://user:pw@db:5432/app").is_ok());

        let err = DatabaseConfig::new("mysql://localhost/app").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "database_url"));

        assert!(DatabaseConfig::new("not a url").is_err());
    }

    #[test]
    fn test_pool_error_maps_to_connection_error() {
        let err: ModelError = PoolError::ConfigurationError {
            message: "bad".to_string(),
        }
        .into();
        assert!(matches!(err, ModelError::Connection(_)));
    }
}
