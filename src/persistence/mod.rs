//! Persistence layer: PostgreSQL pool, liveness probe and migrations.
//!
//! [`Database`] owns the `sqlx::PgPool`; [`migrations`] holds the
//! store-independent cut-point logic and [`postgres`] its PostgreSQL
//! bookkeeping.

pub mod database;
pub mod migrations;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;

pub use database::Database;
pub use migrations::{Direction, DirectorySource, Migration, MigrationSet, MigrationSource};

use crate::error::DatabaseError;

/// A lightweight reachability check for a dependency.
///
/// Implementations must not change any state beyond borrowing and
/// returning a connection.
#[async_trait]
pub trait LivenessProbe: fmt::Debug + Send + Sync {
    /// Succeeds if the dependency answers.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Probe`] when it does not.
    async fn probe(&self) -> Result<(), DatabaseError>;
}
