//! C4 Space Manager: per-space table lifecycle and identifier validation
//! (spec §3, §4.4).

use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::pool::Pool;
use crate::term::SEEDED_DATATYPES;

/// Validates a space id or global prefix against spec §3's rule:
/// "alphanumeric plus `_`/`-`, no `__`".
pub fn validate_identifier(id: &str) -> EngineResult<()> {
    if id.is_empty() {
        return Err(EngineError::InvalidIdentifier(
            "identifier must not be empty".to_string(),
        ));
    }
    if !id.is_ascii() {
        return Err(EngineError::InvalidIdentifier(format!(
            "identifier must be ASCII: {id:?}"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(EngineError::InvalidIdentifier(format!(
            "identifier may only contain alphanumerics, '_' and '-': {id:?}"
        )));
    }
    if id.contains("__") {
        return Err(EngineError::InvalidIdentifier(format!(
            "identifier must not contain '__': {id:?}"
        )));
    }
    Ok(())
}

/// Builds the per-space table name prefix `{global_prefix}__{space_id}__`
/// (spec §3) and the five owned table names.
#[derive(Debug, Clone)]
pub struct SpaceTables {
    pub space_id: String,
    prefix: String,
}

impl SpaceTables {
    pub fn new(global_prefix: &str, space_id: &str) -> EngineResult<Self> {
        validate_identifier(global_prefix)?;
        validate_identifier(space_id)?;
        Ok(Self {
            space_id: space_id.to_string(),
            prefix: format!("{global_prefix}__{space_id}__"),
        })
    }

    pub fn table(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub fn term(&self) -> String {
        self.table("term")
    }
    pub fn datatype(&self) -> String {
        self.table("datatype")
    }
    pub fn rdf_quad(&self) -> String {
        self.table("rdf_quad")
    }
    pub fn namespace(&self) -> String {
        self.table("namespace")
    }
    pub fn graph(&self) -> String {
        self.table("graph")
    }
}

/// C4: creates/drops per-space table sets, enforces naming, builds indices.
pub struct SpaceManager {
    pool: Pool,
    global_prefix: String,
}

impl SpaceManager {
    pub fn new(pool: Pool, global_prefix: String) -> EngineResult<Self> {
        validate_identifier(&global_prefix)?;
        Ok(Self { pool, global_prefix })
    }

    pub fn tables(&self, space_id: &str) -> EngineResult<SpaceTables> {
        SpaceTables::new(&self.global_prefix, space_id)
    }

    /// Creates the five tables, required indices, seeds the datatype
    /// registry and the default-graph term (spec §4.4).
    pub async fn create_space(&self, space_id: &str) -> EngineResult<()> {
        let tables = self.tables(space_id)?;
        let mut tx = self.pool.raw().begin().await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                term_uuid UUID PRIMARY KEY,
                term_text TEXT NOT NULL,
                term_type CHAR(1) NOT NULL,
                lang TEXT,
                datatype_id INT
            )",
            tables.term()
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                datatype_id INT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
                datatype_uri TEXT NOT NULL UNIQUE,
                datatype_name TEXT
            )",
            tables.datatype()
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                quad_uuid UUID PRIMARY KEY,
                subject_uuid UUID NOT NULL,
                predicate_uuid UUID NOT NULL,
                object_uuid UUID NOT NULL,
                context_uuid UUID NOT NULL,
                created_time TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (subject_uuid, predicate_uuid, object_uuid, context_uuid)
            )",
            tables.rdf_quad()
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                prefix TEXT PRIMARY KEY,
                uri TEXT NOT NULL
            )",
            tables.namespace()
        ))
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                context_uuid UUID PRIMARY KEY
            )",
            tables.graph()
        ))
        .execute(&mut *tx)
        .await?;

        create_indices(&mut tx, &tables).await?;

        // Seed the datatype registry (§3).
        for (uri, name) in SEEDED_DATATYPES {
            sqlx::query(&format!(
                "INSERT INTO {} (datatype_uri, datatype_name) VALUES ($1, $2)
                 ON CONFLICT (datatype_uri) DO NOTHING",
                tables.datatype()
            ))
            .bind(uri)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }

        // Default-graph term and catalog entry, created once and never
        // removed (§3 "Ownership").
        let default_graph = crate::term::Term::default_graph();
        let default_uuid = default_graph.uuid();
        sqlx::query(&format!(
            "INSERT INTO {} (term_uuid, term_text, term_type, lang, datatype_id)
             VALUES ($1, $2, 'U', NULL, NULL) ON CONFLICT (term_uuid) DO NOTHING",
            tables.term()
        ))
        .bind(default_uuid)
        .bind(&default_graph.text)
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            "INSERT INTO {} (context_uuid) VALUES ($1) ON CONFLICT DO NOTHING",
            tables.graph()
        ))
        .bind(default_uuid)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(space = space_id, "created space");
        Ok(())
    }

    /// Drops all tables belonging to the space prefix (spec §3 "dropped
    /// atomically").
    pub async fn drop_space(&self, space_id: &str) -> EngineResult<()> {
        let tables = self.tables(space_id)?;
        let mut tx = self.pool.raw().begin().await?;
        for table in [
            tables.rdf_quad(),
            tables.graph(),
            tables.term(),
            tables.datatype(),
            tables.namespace(),
        ] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        info!(space = space_id, "dropped space");
        Ok(())
    }

    /// Lists spaces by inspecting `information_schema` for tables matching
    /// this manager's global prefix (no separate space catalog table is
    /// kept; the table set itself is authoritative, per spec §3's lifecycle
    /// note that a space *is* its table set).
    pub async fn list_spaces(&self) -> EngineResult<Vec<String>> {
        let like_pattern = format!("{}\\_\\_%\\_\\_rdf\\_quad", self.global_prefix);
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT table_name FROM information_schema.tables WHERE table_name LIKE $1 ESCAPE '\\'",
        )
        .bind(&like_pattern)
        .fetch_all(self.pool.raw())
        .await?;

        let marker_prefix = format!("{}__", self.global_prefix);
        let mut spaces = Vec::new();
        for (table_name,) in rows {
            if let Some(rest) = table_name.strip_prefix(&marker_prefix) {
                if let Some(space_id) = rest.strip_suffix("__rdf_quad") {
                    spaces.push(space_id.to_string());
                }
            }
        }
        spaces.sort();
        Ok(spaces)
    }

    /// Drops and recreates indices for maintenance (spec §4.4).
    pub async fn reindex_space(&self, space_id: &str) -> EngineResult<()> {
        let tables = self.tables(space_id)?;
        let mut tx = self.pool.raw().begin().await?;
        for name in index_names(&tables) {
            sqlx::query(&format!("DROP INDEX IF EXISTS {name}"))
                .execute(&mut *tx)
                .await?;
        }
        create_indices(&mut tx, &tables).await?;
        tx.commit().await?;
        info!(space = space_id, "reindexed space");
        Ok(())
    }
}

/// The composite indices spec §4.2 requires the translator's generated
/// plans to be able to rely on, plus a trigram index on `term_text` backing
/// substring functions (`CONTAINS`/`STRSTARTS`/`STRENDS`) per §11.
fn index_names(tables: &SpaceTables) -> Vec<String> {
    let t = &tables.space_id;
    vec![
        format!("idx_{t}_quad_spoc"),
        format!("idx_{t}_quad_poc_s"),
        format!("idx_{t}_quad_opc_s"),
        format!("idx_{t}_quad_cpso"),
        format!("idx_{t}_quad_pco"),
        format!("idx_{t}_quad_context"),
        format!("idx_{t}_term_text_trgm"),
    ]
}

async fn create_indices(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    tables: &SpaceTables,
) -> EngineResult<()> {
    let quad = tables.rdf_quad();
    let term = tables.term();
    let t = &tables.space_id;

    sqlx::query("CREATE EXTENSION IF NOT EXISTS pg_trgm")
        .execute(&mut **tx)
        .await?;

    let statements = [
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{t}_quad_spoc ON {quad} (subject_uuid, predicate_uuid, object_uuid, context_uuid)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{t}_quad_poc_s ON {quad} (predicate_uuid, object_uuid, context_uuid, subject_uuid)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{t}_quad_opc_s ON {quad} (object_uuid, predicate_uuid, context_uuid, subject_uuid)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{t}_quad_cpso ON {quad} (context_uuid, predicate_uuid, subject_uuid, object_uuid)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{t}_quad_pco ON {quad} (predicate_uuid, context_uuid, object_uuid)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{t}_quad_context ON {quad} (context_uuid)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{t}_term_text_trgm ON {term} USING gin (term_text gin_trgm_ops)"
        ),
    ];
    for stmt in statements {
        sqlx::query(&stmt).execute(&mut **tx).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_rules() {
        assert!(validate_identifier("space1").is_ok());
        assert!(validate_identifier("my-space_1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("has__double").is_err());
        assert!(validate_identifier("has space").is_err());
        assert!(validate_identifier("has.dot").is_err());
        assert!(validate_identifier("héllo").is_err());
    }

    #[test]
    fn table_naming_matches_spec_rule() {
        let tables = SpaceTables::new("qs", "s1").unwrap();
        assert_eq!(tables.term(), "qs__s1__term");
        assert_eq!(tables.rdf_quad(), "qs__s1__rdf_quad");
        assert_eq!(tables.graph(), "qs__s1__graph");
    }
}
