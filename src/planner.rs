//! C8 Update Planner (spec §4.8): composes INSERT DATA / DELETE DATA /
//! DELETE…INSERT…WHERE / LOAD / CLEAR / DROP / CREATE into quad-insert and
//! quad-delete operations against C1/C2/C3, translating WHERE patterns via
//! C6 and running them through the executor (C7).
//!
//! `COPY`/`MOVE`/`ADD` have no dedicated match arms here: `spargebra`'s
//! parser desugars all three surface forms into combinations of
//! `Clear`/`DeleteInsert`/`Drop` before this planner ever sees them.

use std::collections::HashMap;
use std::sync::Arc;

use spargebra::algebra::GraphTarget;
use spargebra::term::{GraphNamePattern, GroundQuadPattern, QuadPattern as SparqlQuadPattern};
use spargebra::{GraphUpdateOperation, Update};
use tracing::debug;

use crate::catalog::GraphCatalog;
use crate::error::{EngineError, EngineResult};
use crate::executor::{QueryResult, SqlExecutor};
use crate::quad::{Quad, QuadPattern};
use crate::space::SpaceTables;
use crate::sql::{self, TranslatedQuery};
use crate::store::QuadStore;
use crate::term::Term;

/// Row-count outcome of one `execute_update` call (spec §6
/// `{inserted, deleted}`).
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOutcome {
    pub inserted: u64,
    pub deleted: u64,
}

impl UpdateOutcome {
    fn combine(self, other: Self) -> Self {
        Self {
            inserted: self.inserted + other.inserted,
            deleted: self.deleted + other.deleted,
        }
    }
}

pub struct UpdatePlanner {
    store: Arc<QuadStore>,
    catalog: Arc<GraphCatalog>,
    executor: Arc<SqlExecutor>,
    tables: SpaceTables,
    node_budget: usize,
    max_path_depth: u32,
}

impl UpdatePlanner {
    pub fn new(
        store: Arc<QuadStore>,
        catalog: Arc<GraphCatalog>,
        executor: Arc<SqlExecutor>,
        tables: SpaceTables,
        node_budget: usize,
        max_path_depth: u32,
    ) -> Self {
        Self {
            store,
            catalog,
            executor,
            tables,
            node_budget,
            max_path_depth,
        }
    }

    /// Applies every operation of `update` in order (spec §4.8; SPARQL
    /// Update requests are a sequence of independent operations, each its
    /// own transaction boundary).
    pub async fn apply(&self, update: &Update) -> EngineResult<UpdateOutcome> {
        let mut total = UpdateOutcome::default();
        for op in &update.operations {
            total = total.combine(self.apply_one(op).await?);
        }
        Ok(total)
    }

    async fn apply_one(&self, op: &GraphUpdateOperation) -> EngineResult<UpdateOutcome> {
        match op {
            GraphUpdateOperation::InsertData { data } => self.insert_data(data).await,
            GraphUpdateOperation::DeleteData { data } => self.delete_data(data).await,
            GraphUpdateOperation::DeleteInsert {
                delete,
                insert,
                pattern,
                ..
            } => self.delete_insert(delete, insert, pattern).await,
            GraphUpdateOperation::Load { silent, source, .. } => {
                if *silent {
                    Ok(UpdateOutcome::default())
                } else {
                    Err(EngineError::UnsupportedFeature(format!(
                        "LOAD <{}> requires an external fetcher to resolve the source into quads for INSERT DATA; not part of the core engine (spec §4.8)",
                        source.as_str()
                    )))
                }
            }
            GraphUpdateOperation::Clear { silent, graph } => self.clear(*silent, graph).await,
            GraphUpdateOperation::Create { silent, graph } => self.create(*silent, graph).await,
            GraphUpdateOperation::Drop { silent, graph } => self.drop_target(*silent, graph).await,
        }
    }

    /// `INSERT DATA { quads }`: intern terms, bulk-insert, and register any
    /// graph not already in the catalog (spec §4.8).
    async fn insert_data(&self, data: &[spargebra::term::Quad]) -> EngineResult<UpdateOutcome> {
        let quads: Vec<Quad> = data
            .iter()
            .map(|q| {
                Quad::new(
                    Term::from_subject(&q.subject),
                    Term::from_named_node(&q.predicate),
                    Term::from_rdf_term(&q.object),
                    Term::from_graph_name(&q.graph_name),
                )
            })
            .collect();
        let inserted = self.store.insert_quads(&quads).await?;
        self.register_graphs(&quads).await?;
        debug!(inserted, "INSERT DATA applied");
        Ok(UpdateOutcome {
            inserted,
            deleted: 0,
        })
    }

    /// `DELETE DATA { quads }`: every quad is fully bound, so each is its own
    /// exact-match pattern (spec §4.8).
    async fn delete_data(&self, data: &[spargebra::term::GroundQuad]) -> EngineResult<UpdateOutcome> {
        let mut deleted = 0u64;
        for q in data {
            let pattern = QuadPattern {
                subject: Some(Term::from_ground_subject(&q.subject)),
                predicate: Some(Term::from_named_node(&q.predicate)),
                object: Some(Term::from_ground_term(&q.object)),
                context: Some(Term::from_graph_name(&q.graph_name)),
            };
            deleted += self.store.delete_quads(&pattern).await?;
        }
        debug!(deleted, "DELETE DATA applied");
        Ok(UpdateOutcome {
            inserted: 0,
            deleted,
        })
    }

    /// `DELETE { T_d } INSERT { T_i } WHERE { P }`: translate `P` via C6
    /// once, materialize its bindings, then delete before insert (spec §4.8,
    /// §5 "Ordering"). The delete/insert row changes run inside one
    /// transaction so a crash or error midway never leaves the store with
    /// only half of a composite update applied.
    async fn delete_insert(
        &self,
        delete: &[GroundQuadPattern],
        insert: &[SparqlQuadPattern],
        pattern: &spargebra::algebra::GraphPattern,
    ) -> EngineResult<UpdateOutcome> {
        let plan = sql::translate_select(&self.tables, pattern, self.node_budget, self.max_path_depth)?;
        let result = self.executor.run(&TranslatedQuery::Select(plan)).await?;
        let QueryResult::Bindings { vars, rows, .. } = result else {
            unreachable!("translate_select always yields Bindings")
        };

        let mut to_insert = Vec::new();
        for row in &rows {
            let binding = bind_row(&vars, row);
            for tmpl in insert {
                if let Some(quad) = instantiate_quad_pattern(tmpl, &binding) {
                    to_insert.push(quad);
                }
            }
        }
        // Interning new terms ahead of the transaction keeps the
        // transaction itself limited to the `rdf_quad` row changes.
        if !to_insert.is_empty() {
            self.register_graphs(&to_insert).await?;
        }

        let mut tx = self.store.pool().begin().await?;
        let mut deleted = 0u64;
        for row in &rows {
            let binding = bind_row(&vars, row);
            for tmpl in delete {
                if let Some(quad) = instantiate_ground_quad_pattern(tmpl, &binding) {
                    let pattern = QuadPattern {
                        subject: Some(quad.subject),
                        predicate: Some(quad.predicate),
                        object: Some(quad.object),
                        context: Some(quad.context),
                    };
                    deleted += self.store.delete_quads_tx(&mut tx, &pattern).await?;
                }
            }
        }
        let inserted = if to_insert.is_empty() {
            0
        } else {
            self.store.insert_quads_tx(&mut tx, &to_insert).await?
        };
        tx.commit().await?;

        debug!(deleted, inserted, "DELETE/INSERT/WHERE applied");
        Ok(UpdateOutcome { inserted, deleted })
    }

    /// `CLEAR [SILENT] (GRAPH <g> | DEFAULT | NAMED | ALL)`: deletes quads
    /// only; catalog membership is untouched (DROP, not CLEAR, removes a
    /// graph from C3).
    async fn clear(&self, silent: bool, target: &GraphTarget) -> EngineResult<UpdateOutcome> {
        let mut deleted = 0u64;
        match target {
            GraphTarget::NamedNode(n) => {
                let term = Term::from_named_node(n);
                if !self.catalog.contains(term.uuid()).await? {
                    if silent {
                        return Ok(UpdateOutcome::default());
                    }
                    return Err(EngineError::UnknownGraph(term.text));
                }
                deleted += self.store.delete_quads(&QuadPattern::with_context(term)).await?;
            }
            GraphTarget::DefaultGraph => {
                deleted += self
                    .store
                    .delete_quads(&QuadPattern::with_context(Term::default_graph()))
                    .await?;
            }
            GraphTarget::NamedGraphs => {
                for uuid in self.catalog.list_graphs().await? {
                    if uuid == Term::default_graph().uuid() {
                        continue;
                    }
                    if let Some(term) = self.store.registry().lookup(uuid).await? {
                        deleted += self.store.delete_quads(&QuadPattern::with_context(term)).await?;
                    }
                }
            }
            GraphTarget::AllGraphs => {
                deleted += self
                    .store
                    .delete_quads(&QuadPattern::with_context(Term::default_graph()))
                    .await?;
                for uuid in self.catalog.list_graphs().await? {
                    if uuid == Term::default_graph().uuid() {
                        continue;
                    }
                    if let Some(term) = self.store.registry().lookup(uuid).await? {
                        deleted += self.store.delete_quads(&QuadPattern::with_context(term)).await?;
                    }
                }
            }
        }
        debug!(deleted, "CLEAR applied");
        Ok(UpdateOutcome {
            inserted: 0,
            deleted,
        })
    }

    /// `CREATE [SILENT] GRAPH <g>` (spec §4.8 `ensure_graph`). Treated as
    /// idempotent even without SILENT: once `ensure_graph` is an upsert,
    /// there is no distinguishable "already exists" failure to surface.
    async fn create(&self, _silent: bool, graph: &spargebra::term::NamedNode) -> EngineResult<UpdateOutcome> {
        let term = Term::from_named_node(graph);
        self.store.registry().intern(&term).await?;
        self.catalog.ensure_graph(term.uuid()).await?;
        Ok(UpdateOutcome::default())
    }

    /// `DROP [SILENT] (GRAPH <g> | DEFAULT | NAMED | ALL)`: clear then
    /// remove from C3 (spec §4.8). The default graph is cleared but never
    /// removed from the catalog (it is permanent, per `catalog.rs`).
    async fn drop_target(&self, silent: bool, target: &GraphTarget) -> EngineResult<UpdateOutcome> {
        let outcome = self.clear(silent, target).await?;
        match target {
            GraphTarget::NamedNode(n) => {
                let term = Term::from_named_node(n);
                self.catalog.drop_graph(term.uuid()).await?;
            }
            GraphTarget::DefaultGraph => {}
            GraphTarget::NamedGraphs | GraphTarget::AllGraphs => {
                for uuid in self.catalog.list_graphs().await? {
                    if uuid == Term::default_graph().uuid() {
                        continue;
                    }
                    self.catalog.drop_graph(uuid).await?;
                }
            }
        }
        Ok(outcome)
    }

    /// Registers every distinct context a batch of quads targets that the
    /// catalog doesn't already know about (spec §4.8 "add unseen graphs to
    /// C3").
    async fn register_graphs(&self, quads: &[Quad]) -> EngineResult<()> {
        let mut seen = std::collections::HashSet::new();
        for q in quads {
            let uuid = q.context.uuid();
            if seen.insert(uuid) {
                self.catalog.ensure_graph(uuid).await?;
            }
        }
        Ok(())
    }
}

fn bind_row<'a>(vars: &'a [String], row: &'a [Option<Term>]) -> HashMap<&'a str, &'a Term> {
    vars.iter()
        .map(String::as_str)
        .zip(row.iter())
        .filter_map(|(v, t)| t.as_ref().map(|t| (v, t)))
        .collect()
}

fn instantiate_quad_pattern(pattern: &SparqlQuadPattern, binding: &HashMap<&str, &Term>) -> Option<Quad> {
    let subject = resolve_term_pattern(&pattern.subject, binding)?;
    let predicate = resolve_named_node_pattern(&pattern.predicate, binding)?;
    let object = resolve_term_pattern(&pattern.object, binding)?;
    let context = resolve_graph_name_pattern(&pattern.graph_name, binding)?;
    Some(Quad::new(subject, predicate, object, context))
}

fn instantiate_ground_quad_pattern(pattern: &GroundQuadPattern, binding: &HashMap<&str, &Term>) -> Option<Quad> {
    let subject = resolve_ground_term_pattern(&pattern.subject, binding)?;
    let predicate = resolve_named_node_pattern(&pattern.predicate, binding)?;
    let object = resolve_ground_term_pattern(&pattern.object, binding)?;
    let context = resolve_graph_name_pattern(&pattern.graph_name, binding)?;
    Some(Quad::new(subject, predicate, object, context))
}

fn resolve_term_pattern(pattern: &spargebra::term::TermPattern, binding: &HashMap<&str, &Term>) -> Option<Term> {
    match pattern {
        spargebra::term::TermPattern::Variable(v) => binding.get(v.as_str()).map(|t| (*t).clone()),
        other => Term::from_term_pattern(other),
    }
}

fn resolve_ground_term_pattern(
    pattern: &spargebra::term::GroundTermPattern,
    binding: &HashMap<&str, &Term>,
) -> Option<Term> {
    match pattern {
        spargebra::term::GroundTermPattern::Variable(v) => binding.get(v.as_str()).map(|t| (*t).clone()),
        other => Term::from_ground_term_pattern(other),
    }
}

fn resolve_named_node_pattern(
    pattern: &spargebra::term::NamedNodePattern,
    binding: &HashMap<&str, &Term>,
) -> Option<Term> {
    match pattern {
        spargebra::term::NamedNodePattern::Variable(v) => binding.get(v.as_str()).map(|t| (*t).clone()),
        spargebra::term::NamedNodePattern::NamedNode(n) => Some(Term::from_named_node(n)),
    }
}

fn resolve_graph_name_pattern(pattern: &GraphNamePattern, binding: &HashMap<&str, &Term>) -> Option<Term> {
    match pattern {
        GraphNamePattern::Variable(v) => binding.get(v.as_str()).map(|t| (*t).clone()),
        GraphNamePattern::NamedNode(n) => Some(Term::from_named_node(n)),
        GraphNamePattern::DefaultGraph => Some(Term::default_graph()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_combines_additively() {
        let a = UpdateOutcome {
            inserted: 2,
            deleted: 1,
        };
        let b = UpdateOutcome {
            inserted: 3,
            deleted: 4,
        };
        let c = a.combine(b);
        assert_eq!(c.inserted, 5);
        assert_eq!(c.deleted, 5);
    }

    #[test]
    fn bind_row_skips_unbound_variables() {
        let vars = vec!["s".to_string(), "o".to_string()];
        let row = vec![Some(Term::uri("http://ex/s")), None];
        let binding = bind_row(&vars, &row);
        assert!(binding.contains_key("s"));
        assert!(!binding.contains_key("o"));
    }
}
