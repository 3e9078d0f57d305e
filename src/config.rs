//! Configuration handling for tablemap.
//!
//! This module provides configuration management via CLI arguments and environment variables.
//! Credentials are read separately from the connection URL so they never have to
//! be embedded in it.

use crate::db::pool::DEFAULT_ACQUIRE_TIMEOUT_SECS;
use crate::db::{ConnectionPool, ConnectionSource};
use crate::error::{DbError, DbResult};
use crate::models::ConnectionConfig;
use crate::orm::{DEFAULT_STATEMENT_TIMEOUT_SECS, OrmOptions};
use clap::Parser;
use std::time::Duration;
use tracing::info;

/// Largest pool the configuration accepts.
pub const MAX_POOL_SIZE: usize = 256;

/// Store connectivity and logging configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "tablemap")]
#[command(version, about = "Check connectivity of a tablemap store configuration")]
pub struct Config {
    /// Store connection URL (postgres://, mysql://, sqlite:)
    #[arg(short = 'd', long = "database-url", value_name = "URL", env = "DATABASE_URL")]
    pub database_url: String,

    /// Username applied on top of the URL
    #[arg(long, env = "DB_USERNAME")]
    pub username: Option<String>,

    /// Password applied on top of the URL
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Number of pooled connections; without it every operation opens its own connection
    #[arg(long, env = "DB_POOL_SIZE")]
    pub pool_size: Option<usize>,

    /// Seconds to wait for a free pooled connection
    #[arg(long, default_value_t = DEFAULT_ACQUIRE_TIMEOUT_SECS, env = "DB_ACQUIRE_TIMEOUT_SECS")]
    pub acquire_timeout: u64,

    /// Seconds allowed for a single statement
    #[arg(long, default_value_t = DEFAULT_STATEMENT_TIMEOUT_SECS, env = "DB_STATEMENT_TIMEOUT_SECS")]
    pub statement_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Check value ranges clap cannot express.
    pub fn validate(&self) -> DbResult<()> {
        if let Some(size) = self.pool_size {
            if size == 0 {
                return Err(DbError::invalid_input("Pool size must be at least 1"));
            }
            if size > MAX_POOL_SIZE {
                return Err(DbError::invalid_input(format!(
                    "Pool size {} exceeds the maximum of {}",
                    size, MAX_POOL_SIZE
                )));
            }
        }
        if self.acquire_timeout == 0 {
            return Err(DbError::invalid_input(
                "Acquire timeout must be greater than 0",
            ));
        }
        if self.statement_timeout == 0 {
            return Err(DbError::invalid_input(
                "Statement timeout must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn connection_config(&self) -> DbResult<ConnectionConfig> {
        Ok(ConnectionConfig::new(self.database_url.as_str())?
            .with_credentials(self.username.clone(), self.password.clone()))
    }

    /// Open a pool when a size is configured, otherwise use direct connections.
    pub async fn connection_source(&self) -> DbResult<ConnectionSource> {
        self.validate()?;
        let config = self.connection_config()?;
        match self.pool_size {
            Some(size) => {
                let pool = ConnectionPool::initialize(
                    &config,
                    size,
                    Duration::from_secs(self.acquire_timeout),
                )
                .await?;
                Ok(ConnectionSource::Pooled(pool))
            }
            None => {
                info!(
                    db_type = %config.db_type,
                    "No pool size configured, using one connection per operation"
                );
                Ok(ConnectionSource::Direct(config))
            }
        }
    }

    pub fn orm_options(&self) -> OrmOptions {
        OrmOptions {
            statement_timeout: Duration::from_secs(self.statement_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseType;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["tablemap"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--database-url", "sqlite::memory:"]);
        assert_eq!(config.pool_size, None);
        assert_eq!(config.acquire_timeout, DEFAULT_ACQUIRE_TIMEOUT_SECS);
        assert_eq!(config.statement_timeout, DEFAULT_STATEMENT_TIMEOUT_SECS);
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_credentials_applied() {
        let config = parse(&[
            "-d",
            "postgres://localhost:5432/app",
            "--username",
            "app",
            "--password",
            "secret",
        ]);
        let conn = config.connection_config().unwrap();
        assert_eq!(conn.db_type, DatabaseType::PostgreSQL);
        assert_eq!(conn.username.as_deref(), Some("app"));
        assert_eq!(conn.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_validate_pool_size() {
        let config = parse(&["-d", "sqlite::memory:", "--pool-size", "0"]);
        assert!(matches!(
            config.validate(),
            Err(DbError::InvalidInput { .. })
        ));

        let config = parse(&["-d", "sqlite::memory:", "--pool-size", "1000"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_timeouts() {
        let config = parse(&["-d", "sqlite::memory:", "--statement-timeout", "0"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_scheme_is_invalid_input() {
        let config = parse(&["-d", "oracle://host/db"]);
        assert!(matches!(
            config.connection_config(),
            Err(DbError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_orm_options() {
        let config = parse(&["-d", "sqlite::memory:", "--statement-timeout", "5"]);
        assert_eq!(
            config.orm_options().statement_timeout,
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn test_connection_source_modes() {
        let direct = parse(&["-d", "sqlite::memory:"]);
        assert!(matches!(
            direct.connection_source().await.unwrap(),
            ConnectionSource::Direct(_)
        ));

        let pooled = parse(&["-d", "sqlite::memory:", "--pool-size", "2"]);
        let source = pooled.connection_source().await.unwrap();
        assert_eq!(source.pool_status().unwrap().capacity, 2);
        source.shutdown().await;
    }
}
