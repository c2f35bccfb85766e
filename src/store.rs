//! C2: quad storage operations against `{prefix}rdf_quad` (spec §3, §6).
//!
//! Bulk insert follows the same unnest-array pattern as the teacher's
//! `insert_quads` statement (`src/statements.rs`), chunked to keep each
//! statement's parameter arrays bounded.

use std::sync::Arc;

use sqlx::Row;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::pool::Pool;
use crate::quad::{Quad, QuadPattern};
use crate::registry::TermRegistry;
use crate::space::SpaceTables;
use crate::term::Term;

/// Quads are inserted in batches of this size per `UNNEST` statement, to
/// keep individual statements from growing unbounded on large loads.
const INSERT_CHUNK_SIZE: usize = 10_000;

pub struct QuadStore {
    pool: Pool,
    tables: SpaceTables,
    registry: Arc<TermRegistry>,
}

impl QuadStore {
    pub fn new(pool: Pool, tables: SpaceTables, registry: Arc<TermRegistry>) -> Self {
        Self {
            pool,
            tables,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<TermRegistry> {
        &self.registry
    }

    /// Exposes the underlying pool so callers can open a transaction that
    /// spans several store operations (spec §4.8's composite updates).
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Interns every term referenced by `quads` and bulk-inserts the quad
    /// rows, `ON CONFLICT DO NOTHING` (spec §6: duplicate inserts are a
    /// silent no-op, not a `ConstraintViolation`). Returns the count of rows
    /// actually inserted (excludes duplicates already present).
    pub async fn insert_quads(&self, quads: &[Quad]) -> EngineResult<u64> {
        if quads.is_empty() {
            return Ok(0);
        }
        self.intern_all(quads).await?;
        let mut inserted = 0u64;
        for chunk in quads.chunks(INSERT_CHUNK_SIZE) {
            inserted += self.insert_quad_rows(self.pool.raw(), chunk).await?;
        }
        Ok(inserted)
    }

    /// Same as [`insert_quads`](Self::insert_quads), but running every
    /// chunked statement against an already-open transaction instead of a
    /// fresh pooled connection per statement, so a caller composing several
    /// delete/insert steps into one atomic unit (spec §4.8's `DELETE ...
    /// INSERT ... WHERE`) can commit or roll them all back together.
    pub async fn insert_quads_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        quads: &[Quad],
    ) -> EngineResult<u64> {
        if quads.is_empty() {
            return Ok(0);
        }
        self.intern_all(quads).await?;
        let mut inserted = 0u64;
        for chunk in quads.chunks(INSERT_CHUNK_SIZE) {
            inserted += self.insert_quad_rows(&mut **tx, chunk).await?;
        }
        Ok(inserted)
    }

    /// Interns the four terms of every quad (subject/predicate/object/
    /// context) ahead of the row insert. Left outside any surrounding
    /// transaction deliberately: term rows are content-addressed upserts,
    /// so re-running this after a rolled-back quad insert is harmless.
    async fn intern_all(&self, quads: &[Quad]) -> EngineResult<()> {
        let mut terms = Vec::with_capacity(quads.len() * 4);
        for q in quads {
            terms.push(q.subject.clone());
            terms.push(q.predicate.clone());
            terms.push(q.object.clone());
            terms.push(q.context.clone());
        }
        self.registry.intern_batch(&terms).await?;
        Ok(())
    }

    async fn insert_quad_rows<'e, E>(&self, executor: E, chunk: &[Quad]) -> EngineResult<u64>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let quad_uuids: Vec<Uuid> = chunk
            .iter()
            .map(|q| {
                // The quad's own identity is derived from its four
                // member UUIDs, so a repeated insert of the same quad
                // always maps to the same primary key.
                let joined = format!(
                    "{}\u{0}{}\u{0}{}\u{0}{}",
                    q.subject.uuid(),
                    q.predicate.uuid(),
                    q.object.uuid(),
                    q.context.uuid()
                );
                Uuid::new_v5(&crate::term::TERM_NAMESPACE, joined.as_bytes())
            })
            .collect();
        let subjects: Vec<Uuid> = chunk.iter().map(|q| q.subject.uuid()).collect();
        let predicates: Vec<Uuid> = chunk.iter().map(|q| q.predicate.uuid()).collect();
        let objects: Vec<Uuid> = chunk.iter().map(|q| q.object.uuid()).collect();
        let contexts: Vec<Uuid> = chunk.iter().map(|q| q.context.uuid()).collect();

        let result = sqlx::query(&format!(
            "INSERT INTO {} (quad_uuid, subject_uuid, predicate_uuid, object_uuid, context_uuid)
             SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[], $4::uuid[], $5::uuid[])
             ON CONFLICT (subject_uuid, predicate_uuid, object_uuid, context_uuid) DO NOTHING",
            self.tables.rdf_quad()
        ))
        .bind(&quad_uuids)
        .bind(&subjects)
        .bind(&predicates)
        .bind(&objects)
        .bind(&contexts)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Deletes quads matching `pattern`; any `None` position matches
    /// everything at that position (spec §6 `delete_quads`).
    pub async fn delete_quads(&self, pattern: &QuadPattern) -> EngineResult<u64> {
        self.delete_quad_rows(self.pool.raw(), pattern).await
    }

    /// Same as [`delete_quads`](Self::delete_quads), scoped to an
    /// already-open transaction (spec §4.8's composite update atomicity).
    pub async fn delete_quads_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        pattern: &QuadPattern,
    ) -> EngineResult<u64> {
        self.delete_quad_rows(&mut **tx, pattern).await
    }

    async fn delete_quad_rows<'e, E>(&self, executor: E, pattern: &QuadPattern) -> EngineResult<u64>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let mut clauses = Vec::new();
        let mut binds: Vec<Uuid> = Vec::new();

        if let Some(s) = &pattern.subject {
            binds.push(s.uuid());
            clauses.push(format!("subject_uuid = ${}", binds.len()));
        }
        if let Some(p) = &pattern.predicate {
            binds.push(p.uuid());
            clauses.push(format!("predicate_uuid = ${}", binds.len()));
        }
        if let Some(o) = &pattern.object {
            binds.push(o.uuid());
            clauses.push(format!("object_uuid = ${}", binds.len()));
        }
        if let Some(c) = &pattern.context {
            binds.push(c.uuid());
            clauses.push(format!("context_uuid = ${}", binds.len()));
        }

        let where_clause = if clauses.is_empty() {
            "TRUE".to_string()
        } else {
            clauses.join(" AND ")
        };
        let sql = format!("DELETE FROM {} WHERE {}", self.tables.rdf_quad(), where_clause);

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let result = query.execute(executor).await?;
        Ok(result.rows_affected())
    }

    /// Streams quads matching `pattern`, decoded to terms (spec §4.2
    /// `scan`), used by administrative tooling and by the Update Planner
    /// when resolving `DELETE WHERE` without a full SPARQL WHERE clause.
    pub async fn scan(&self, pattern: &QuadPattern, limit: Option<u64>) -> EngineResult<Vec<Quad>> {
        let mut clauses = Vec::new();
        let mut binds: Vec<Uuid> = Vec::new();

        if let Some(s) = &pattern.subject {
            binds.push(s.uuid());
            clauses.push(format!("subject_uuid = ${}", binds.len()));
        }
        if let Some(p) = &pattern.predicate {
            binds.push(p.uuid());
            clauses.push(format!("predicate_uuid = ${}", binds.len()));
        }
        if let Some(o) = &pattern.object {
            binds.push(o.uuid());
            clauses.push(format!("object_uuid = ${}", binds.len()));
        }
        if let Some(c) = &pattern.context {
            binds.push(c.uuid());
            clauses.push(format!("context_uuid = ${}", binds.len()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let limit_clause = limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
        let sql = format!(
            "SELECT subject_uuid, predicate_uuid, object_uuid, context_uuid FROM {}{where_clause}{limit_clause}",
            self.tables.rdf_quad()
        );

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(self.pool.raw()).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let s: Uuid = row.try_get("subject_uuid")?;
            let p: Uuid = row.try_get("predicate_uuid")?;
            let o: Uuid = row.try_get("object_uuid")?;
            let c: Uuid = row.try_get("context_uuid")?;
            let terms = self.registry.lookup_batch(&[s, p, o, c]).await?;
            let get = |u: Uuid| -> EngineResult<Term> {
                terms
                    .get(&u)
                    .cloned()
                    .ok_or_else(|| crate::error::EngineError::StorageError(format!("dangling term uuid {u}")))
            };
            out.push(Quad::new(get(s)?, get(p)?, get(o)?, get(c)?));
        }
        Ok(out)
    }

    /// Returns the total quad count for the space, optionally restricted to
    /// one graph (used by `list_graphs`/diagnostics, spec §6).
    pub async fn count(&self, context: Option<Uuid>) -> EngineResult<u64> {
        let row = match context {
            Some(c) => {
                sqlx::query(&format!(
                    "SELECT count(*) AS n FROM {} WHERE context_uuid = $1",
                    self.tables.rdf_quad()
                ))
                .bind(c)
                .fetch_one(self.pool.raw())
                .await?
            }
            None => {
                sqlx::query(&format!("SELECT count(*) AS n FROM {}", self.tables.rdf_quad()))
                    .fetch_one(self.pool.raw())
                    .await?
            }
        };
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }
}
