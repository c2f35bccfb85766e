//! C3: named graph catalog against `{prefix}graph` (spec §3, §6).
//!
//! Kept as a thin cached set rather than re-querying `rdf_quad` on every
//! lookup, mirroring the registry's front-cache shape (`registry.rs`).

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use sqlx::Row;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::pool::Pool;
use crate::space::SpaceTables;
use crate::term::Term;

pub struct GraphCatalog {
    pool: Pool,
    tables: SpaceTables,
    cache: RwLock<HashSet<Uuid>>,
}

impl GraphCatalog {
    pub fn new(pool: Pool, tables: SpaceTables) -> Arc<Self> {
        Arc::new(Self {
            pool,
            tables,
            cache: RwLock::new(HashSet::new()),
        })
    }

    /// Registers a graph in the catalog if absent (spec §6 `ensure_graph`).
    /// Interning the graph's own term UUID is the caller's responsibility
    /// (the engine facade does this before delegating here).
    pub async fn ensure_graph(&self, context: Uuid) -> EngineResult<()> {
        if self.cache.read().contains(&context) {
            return Ok(());
        }
        sqlx::query(&format!(
            "INSERT INTO {} (context_uuid) VALUES ($1) ON CONFLICT DO NOTHING",
            self.tables.graph()
        ))
        .bind(context)
        .execute(self.pool.raw())
        .await?;
        self.cache.write().insert(context);
        Ok(())
    }

    /// Removes a graph from the catalog (its quads are removed separately by
    /// the caller via `QuadStore::delete_quads`, per spec §4.8's CLEAR/DROP
    /// split between catalog membership and quad data).
    pub async fn drop_graph(&self, context: Uuid) -> EngineResult<()> {
        let default_graph = Term::default_graph().uuid();
        if context == default_graph {
            return Err(EngineError::UnknownGraph(
                "the default graph cannot be dropped".to_string(),
            ));
        }
        sqlx::query(&format!(
            "DELETE FROM {} WHERE context_uuid = $1",
            self.tables.graph()
        ))
        .bind(context)
        .execute(self.pool.raw())
        .await?;
        self.cache.write().remove(&context);
        Ok(())
    }

    pub async fn contains(&self, context: Uuid) -> EngineResult<bool> {
        if self.cache.read().contains(&context) {
            return Ok(true);
        }
        let row = sqlx::query(&format!(
            "SELECT 1 FROM {} WHERE context_uuid = $1",
            self.tables.graph()
        ))
        .bind(context)
        .fetch_optional(self.pool.raw())
        .await?;
        let present = row.is_some();
        if present {
            self.cache.write().insert(context);
        }
        Ok(present)
    }

    /// Lists every registered graph's UUID (spec §6 `list_graphs`); the
    /// engine facade resolves these back to lexical terms.
    pub async fn list_graphs(&self) -> EngineResult<Vec<Uuid>> {
        let rows = sqlx::query(&format!("SELECT context_uuid FROM {}", self.tables.graph()))
            .fetch_all(self.pool.raw())
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("context_uuid")?;
            out.push(id);
        }
        let mut cache = self.cache.write();
        for id in &out {
            cache.insert(*id);
        }
        Ok(out)
    }
}
