//! PostgreSQL bookkeeping for applied migrations.

use async_trait::async_trait;
use sqlx::PgPool;

use super::migrations::{Direction, Migration, MigrationStore};
use crate::error::MigrationError;

/// Records applied steps in a table of the target database.
///
/// The table name must already be a validated plain identifier; it is
/// quoted but not escaped.
#[derive(Debug, Clone)]
pub struct PgMigrationStore {
    pool: PgPool,
    table: String,
}

impl PgMigrationStore {
    /// Creates a store using `table` for bookkeeping.
    #[must_use]
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    /// Name of the bookkeeping table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl MigrationStore for PgMigrationStore {
    async fn ensure_table(&self) -> Result<(), MigrationError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\
             id BIGINT PRIMARY KEY, \
             name TEXT NOT NULL, \
             applied_at TIMESTAMPTZ NOT NULL DEFAULT now())",
            self.table
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(MigrationError::Store)?;
        Ok(())
    }

    async fn applied_versions(&self) -> Result<Vec<i64>, MigrationError> {
        let sql = format!("SELECT id FROM \"{}\" ORDER BY id ASC", self.table);
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(MigrationError::Store)
    }

    async fn apply(&self, step: &Migration, direction: Direction) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let script = step.script(direction);
        if !script.trim().is_empty() {
            sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(script)).await?;
        }

        match direction {
            Direction::Up => {
                let sql = format!("INSERT INTO \"{}\" (id, name) VALUES ($1, $2)", self.table);
                sqlx::query(&sql)
                    .bind(step.version)
                    .bind(step.name.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
            Direction::Down => {
                let sql = format!("DELETE FROM \"{}\" WHERE id = $1", self.table);
                sqlx::query(&sql)
                    .bind(step.version)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await
    }
}
