//! The process-wide PostgreSQL connection pool.

use async_trait::async_trait;
use sqlx::Connection;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};

use super::LivenessProbe;
use super::migrations::{Direction, MigrationSource, Migrator};
use super::postgres::PgMigrationStore;
use crate::config::DatabaseConfig;
use crate::error::{DatabaseError, MigrationError};

/// Bounded pool of PostgreSQL connections.
///
/// Callers never own a connection: each operation borrows one through a
/// pool guard that goes back to the pool when dropped, on every exit path.
/// The pool enforces `DB_MAX_OPEN_CONNS` itself.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
    migrations_table: String,
}

impl Database {
    /// Connects using `config` and verifies the server answers a ping.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Connect`] if no connection can be made or
    /// the first probe fails.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let pool = pool_options(config)
            .connect_with(connect_options(config))
            .await
            .map_err(DatabaseError::Connect)?;

        let database = Self::from_pool(pool, config.migrations_table.clone());
        database.ping().await.map_err(DatabaseError::Connect)?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            max_open_conns = config.max_open_conns,
            max_idle_conns = config.min_connections(),
            "connected to database"
        );
        Ok(database)
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool, migrations_table: impl Into<String>) -> Self {
        Self {
            pool,
            migrations_table: migrations_table.into(),
        }
    }

    /// The underlying `sqlx` pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Pings the server over one borrowed connection.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Probe`] if no connection is available or
    /// the ping fails.
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        self.ping().await.map_err(DatabaseError::Probe)
    }

    /// Moves the migration cut point in `direction`, at most `limit` steps.
    ///
    /// Returns the number of steps applied.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] on the first failing step; steps before
    /// it remain applied.
    pub async fn apply_migrations(
        &self,
        direction: Direction,
        source: &dyn MigrationSource,
        limit: Option<usize>,
    ) -> Result<usize, MigrationError> {
        let set = source.load().await?;
        let store = PgMigrationStore::new(self.pool.clone(), self.migrations_table.as_str());
        Migrator::new(store).run(&set, direction, limit).await
    }

    /// Closes every connection. Further borrows fail.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("database pool closed");
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await
    }
}

#[async_trait]
impl LivenessProbe for Database {
    async fn probe(&self) -> Result<(), DatabaseError> {
        self.health_check().await
    }
}

/// Connection parameters for `config`.
#[must_use]
pub fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.name)
        .ssl_mode(ssl_mode(config.ssl_enabled))
}

/// Pool bounds for `config`.
#[must_use]
pub fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_open_conns)
        .min_connections(config.min_connections())
        .acquire_timeout(config.connect_timeout)
}

/// `require` when TLS is enabled, `disable` otherwise.
#[must_use]
pub const fn ssl_mode(enabled: bool) -> PgSslMode {
    if enabled {
        PgSslMode::Require
    } else {
        PgSslMode::Disable
    }
}
