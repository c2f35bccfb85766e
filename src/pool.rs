//! Connection pooling (spec §5: "Database connections: pooled; a single
//! query acquires one connection for the duration of execution").
//!
//! Grounded on `defi-wonderland-gaia`'s indexer Postgres storage
//! (`other_examples/2ae24621_..._storage-postgres.rs.rs`), which builds a
//! `sqlx::Pool<Postgres>` via `PgPoolOptions` once and shares it across all
//! store operations; the teacher's one-connection-per-process shape
//! (`kroeg-cellar/src/cellarconnection.rs`) is generalized here into a real
//! pool since the engine must serve concurrent workers (§5).

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::error::EngineResult;

/// Thin wrapper so call sites depend on `Pool` rather than on `sqlx`
/// directly, keeping the driver swappable behind one seam.
#[derive(Clone)]
pub struct Pool {
    pub(crate) inner: PgPool,
}

impl Pool {
    pub async fn connect(config: &DatabaseConfig) -> EngineResult<Self> {
        let inner = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await?;
        Ok(Self { inner })
    }

    pub fn raw(&self) -> &PgPool {
        &self.inner
    }

    /// Opens a transaction for callers that must apply several statements
    /// atomically (spec §4.8's composite `DELETE`/`INSERT` updates).
    pub async fn begin(&self) -> EngineResult<sqlx::Transaction<'static, sqlx::Postgres>> {
        Ok(self.inner.begin().await?)
    }
}
