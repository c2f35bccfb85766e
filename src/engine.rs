//! C6/C7/C8 front door: the `Engine` facade spec §6 describes as the Core
//! API — space/graph lifecycle, quad mutation, and SPARQL query/update —
//! wired up the way the teacher's `CellarConnection::connect` hands back one
//! object a caller drives everything through (`cellarconnection.rs`),
//! generalized here into a per-space registry since one engine instance now
//! serves many concurrent spaces rather than one fixed actor collection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::algebra::{ParsedQuery, ParsedUpdate};
use crate::catalog::GraphCatalog;
use crate::config::Config;
use crate::error::EngineResult;
use crate::executor::{QueryResult, SqlExecutor};
use crate::planner::{UpdateOutcome, UpdatePlanner};
use crate::pool::Pool;
use crate::quad::{Quad, QuadPattern};
use crate::registry::TermRegistry;
use crate::space::{SpaceManager, SpaceTables};
use crate::sql::{self, TranslatedQuery};
use crate::store::QuadStore;
use crate::term::Term;

use spargebra::Query;

/// `execute_query`'s per-call options (spec §6).
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Sets the effective default graph as the union of these graphs,
    /// overriding the reserved default-graph URI for unwrapped patterns.
    pub default_graph_uris: Vec<String>,
    /// Restricts what `GRAPH ?g` (an unbound graph variable) ranges over.
    pub named_graph_uris: Vec<String>,
    /// Per-query deadline; falls back to `limits.query_timeout_ms` when unset.
    pub timeout_ms: Option<u64>,
    /// Hard row cap; falls back to `limits.max_rows` when unset.
    pub max_rows: Option<usize>,
    /// Base IRI for resolving relative IRIs in the query text.
    pub base_iri: Option<String>,
}

/// The handful of per-space components (C1-C3, C6-C8) bound to one
/// `SpaceTables`, built once per space and cached for the engine's lifetime.
struct SpaceHandle {
    tables: SpaceTables,
    store: Arc<QuadStore>,
    catalog: Arc<GraphCatalog>,
    planner: UpdatePlanner,
}

/// The Core API facade (spec §6): applications embed this and never touch
/// `sqlx`/`spargebra` directly.
pub struct Engine {
    pool: Pool,
    spaces: SpaceManager,
    config: Config,
    handles: RwLock<HashMap<String, Arc<SpaceHandle>>>,
}

impl Engine {
    /// Connects to the configured database and prepares the space manager;
    /// no space-specific state is built until first use (spec §5 "lazy
    /// per-space resource acquisition").
    pub async fn connect(config: Config) -> EngineResult<Self> {
        let pool = Pool::connect(&config.database).await?;
        let spaces = SpaceManager::new(pool.clone(), config.tables.global_prefix.clone())?;
        Ok(Self {
            pool,
            spaces,
            config,
            handles: RwLock::new(HashMap::new()),
        })
    }

    // ---- C4 Space Manager -------------------------------------------------

    pub async fn create_space(&self, space_id: &str) -> EngineResult<()> {
        self.spaces.create_space(space_id).await
    }

    pub async fn drop_space(&self, space_id: &str) -> EngineResult<()> {
        self.spaces.drop_space(space_id).await?;
        self.handles.write().remove(space_id);
        Ok(())
    }

    pub async fn list_spaces(&self) -> EngineResult<Vec<String>> {
        self.spaces.list_spaces().await
    }

    // ---- C3 Graph Catalog ---------------------------------------------------

    pub async fn ensure_graph(&self, space_id: &str, graph_uri: &str) -> EngineResult<()> {
        let handle = self.handle(space_id).await?;
        let term = Term::uri(graph_uri);
        handle.store.registry().intern(&term).await?;
        handle.catalog.ensure_graph(term.uuid()).await
    }

    pub async fn drop_graph(&self, space_id: &str, graph_uri: &str) -> EngineResult<()> {
        let handle = self.handle(space_id).await?;
        handle.catalog.drop_graph(Term::uri(graph_uri).uuid()).await
    }

    pub async fn list_graphs(&self, space_id: &str) -> EngineResult<Vec<String>> {
        let handle = self.handle(space_id).await?;
        let uuids = handle.catalog.list_graphs().await?;
        let resolved = handle.store.registry().lookup_batch(&uuids).await?;
        let mut names: Vec<String> = uuids.iter().filter_map(|u| resolved.get(u).map(|t| t.text.clone())).collect();
        names.sort();
        Ok(names)
    }

    // ---- C2 Quad storage ----------------------------------------------------

    pub async fn insert_quads(&self, space_id: &str, quads: &[Quad]) -> EngineResult<u64> {
        let handle = self.handle(space_id).await?;
        let inserted = handle.store.insert_quads(quads).await?;
        for ctx_uuid in distinct_contexts(quads) {
            handle.catalog.ensure_graph(ctx_uuid).await?;
        }
        Ok(inserted)
    }

    pub async fn delete_quads(&self, space_id: &str, pattern: &QuadPattern) -> EngineResult<u64> {
        let handle = self.handle(space_id).await?;
        handle.store.delete_quads(pattern).await
    }

    // ---- C5/C6/C7 Query ----------------------------------------------------

    /// Parses, translates and executes `sparql_text` against `space_id`
    /// (spec §6 `execute_query`).
    pub async fn execute_query(
        &self,
        space_id: &str,
        sparql_text: &str,
        options: &QueryOptions,
    ) -> EngineResult<QueryResult> {
        let handle = self.handle(space_id).await?;
        let parsed = ParsedQuery::parse(sparql_text, options.base_iri.as_deref())?;

        let default_graph_override = self.resolve_graph_uris(&handle, &options.default_graph_uris).await?;
        let named_graph_restriction = self.resolve_graph_uris(&handle, &options.named_graph_uris).await?;

        let node_budget = self.config.limits.max_algebra_nodes;
        let max_path_depth = self.config.limits.max_path_depth;
        let translated = translate_with_dataset(
            &handle.tables,
            &parsed.inner,
            node_budget,
            max_path_depth,
            default_graph_override,
            named_graph_restriction,
        )?;

        let timeout = Duration::from_millis(options.timeout_ms.unwrap_or(self.config.limits.query_timeout_ms));
        let max_rows = options.max_rows.unwrap_or(self.config.limits.max_rows);
        let executor = self.executor_for(&handle, timeout, max_rows);
        executor.run(&translated).await
    }

    /// Parses and applies a SPARQL Update request (spec §6 `execute_update`).
    pub async fn execute_update(&self, space_id: &str, sparql_text: &str) -> EngineResult<UpdateOutcome> {
        let handle = self.handle(space_id).await?;
        let parsed = ParsedUpdate::parse(sparql_text, None)?;
        handle.planner.apply(&parsed.inner).await
    }

    /// Resolves each graph URI to its UUID, ignoring URIs never interned in
    /// this space (an override naming a graph that doesn't exist yet simply
    /// contributes no rows, rather than erroring).
    async fn resolve_graph_uris(&self, handle: &SpaceHandle, uris: &[String]) -> EngineResult<Vec<Uuid>> {
        let mut out = Vec::with_capacity(uris.len());
        for uri in uris {
            if let Some(uuid) = handle.store.registry().resolve(&Term::uri(uri.clone())).await? {
                out.push(uuid);
            }
        }
        Ok(out)
    }

    fn executor_for(&self, handle: &Arc<SpaceHandle>, timeout: Duration, max_rows: usize) -> SqlExecutor {
        SqlExecutor::new(self.pool.clone(), handle.store.clone(), timeout, max_rows)
    }

    /// Returns the cached per-space handle, building it on first use.
    async fn handle(&self, space_id: &str) -> EngineResult<Arc<SpaceHandle>> {
        if let Some(handle) = self.handles.read().get(space_id) {
            return Ok(handle.clone());
        }

        let tables = self.spaces.tables(space_id)?;
        let registry = TermRegistry::new(self.pool.clone(), tables.clone(), self.config.limits.term_cache_size);
        let store = Arc::new(QuadStore::new(self.pool.clone(), tables.clone(), registry));
        let catalog = GraphCatalog::new(self.pool.clone(), tables.clone());
        let executor = Arc::new(SqlExecutor::new(
            self.pool.clone(),
            store.clone(),
            Duration::from_millis(self.config.limits.query_timeout_ms),
            self.config.limits.max_rows,
        ));
        let planner = UpdatePlanner::new(
            store.clone(),
            catalog.clone(),
            executor.clone(),
            tables.clone(),
            self.config.limits.max_algebra_nodes,
            self.config.limits.max_path_depth,
        );
        let handle = Arc::new(SpaceHandle {
            tables,
            store,
            catalog,
            planner,
        });

        self.handles.write().insert(space_id.to_string(), handle.clone());
        Ok(handle)
    }
}

fn distinct_contexts(quads: &[Quad]) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for q in quads {
        let uuid = q.context.uuid();
        if seen.insert(uuid) {
            out.push(uuid);
        }
    }
    out
}

/// `sql::translate_query`, but threading the dataset-override options into
/// every query form's `TranslationContext` (spec §6 `default_graph_uris`/
/// `named_graph_uris`), rather than only the plain defaults
/// `sql::translate_query` assumes.
fn translate_with_dataset(
    tables: &SpaceTables,
    query: &Query,
    node_budget: usize,
    max_path_depth: u32,
    default_graph_override: Vec<Uuid>,
    named_graph_restriction: Vec<Uuid>,
) -> EngineResult<TranslatedQuery> {
    if default_graph_override.is_empty() && named_graph_restriction.is_empty() {
        return sql::translate_query(tables, query, node_budget, max_path_depth);
    }
    sql::translate_query_with_dataset(
        tables,
        query,
        node_budget,
        max_path_depth,
        default_graph_override,
        named_graph_restriction,
    )
}

