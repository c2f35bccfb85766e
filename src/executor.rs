//! C7 SQL Executor (spec §4.7): validates, runs and decodes the SQL the
//! translator (C6) produced, enforcing the per-query timeout and row cap.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::Row;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::pool::Pool;
use crate::quad::{Quad, QuadPattern};
use crate::registry::TermRegistry;
use crate::sql::plan::{ConstructPlan, QueryPlan};
use crate::sql::TranslatedQuery;
use crate::store::QuadStore;
use crate::term::Term;

/// Substrings that must never appear in translator-generated SQL. Defense in
/// depth against a translator bug rather than a user-input sanitizer — every
/// value the translator splices in is either a table/column identifier it
/// generated itself or a `$n` bind parameter, never user text.
const DENIED_SUBSTRINGS: &[&str] = &[
    "DROP ", "ALTER ", "TRUNCATE ", "GRANT ", "REVOKE ", "EXEC ", "EXECUTE ", "CREATE ", "INSERT ",
    "UPDATE ", "DELETE ", "COPY ", "VACUUM ", "--", "/*",
];

/// One row of a SELECT result, keyed by output column position (spec §6
/// `Bindings`): `None` means the variable is unbound in that solution.
pub type BindingRow = Vec<Option<Term>>;

/// A decoded-but-not-yet-resolved cell: either a term UUID awaiting a
/// `term` table lookup, or an already-lexical scalar (BIND/aggregate
/// output, `OutputColumn::is_term == false`) that only needs wrapping in a
/// plain literal (spec §4.6.6 "errors in an expression... " / §4.6.10).
enum RawCell {
    Term(Option<Uuid>),
    Value(Option<String>),
}

impl RawCell {
    fn into_term(self, resolved: &HashMap<Uuid, Term>) -> Option<Term> {
        match self {
            RawCell::Term(uuid) => uuid.and_then(|u| resolved.get(&u).cloned()),
            RawCell::Value(text) => text.map(Term::plain_literal),
        }
    }
}

/// The three result shapes `execute_query` can return (spec §6).
pub enum QueryResult {
    Bindings {
        vars: Vec<String>,
        rows: Vec<BindingRow>,
        truncated: bool,
    },
    Triples {
        triples: Vec<Quad>,
    },
    Boolean {
        value: bool,
    },
}

pub struct SqlExecutor {
    pool: Pool,
    store: Arc<QuadStore>,
    query_timeout: Duration,
    max_rows: usize,
}

impl SqlExecutor {
    pub fn new(pool: Pool, store: Arc<QuadStore>, query_timeout: Duration, max_rows: usize) -> Self {
        Self {
            pool,
            store,
            query_timeout,
            max_rows,
        }
    }

    fn registry(&self) -> &Arc<TermRegistry> {
        self.store.registry()
    }

    /// Runs a translated query and returns its decoded result (spec §4.7,
    /// §6's `execute_query`).
    pub async fn run(&self, translated: &TranslatedQuery) -> EngineResult<QueryResult> {
        match translated {
            TranslatedQuery::Select(plan) => self.run_select(plan).await,
            TranslatedQuery::Ask(plan) => self.run_ask(plan).await,
            TranslatedQuery::Construct(plan) => self.run_construct(plan).await,
            TranslatedQuery::Describe(plan) => self.run_describe(plan).await,
        }
    }

    async fn run_select(&self, plan: &QueryPlan) -> EngineResult<QueryResult> {
        let (rows, truncated) = self.fetch_capped(&plan.sql).await?;
        let mut out_rows = Vec::with_capacity(rows.len());

        let mut all_uuids: Vec<Uuid> = Vec::new();
        let mut raw: Vec<Vec<RawCell>> = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut cells = Vec::with_capacity(plan.columns.len());
            for col in &plan.columns {
                if col.is_term {
                    let uuid: Option<Uuid> = row.try_get(col.sql_alias.as_str())?;
                    if let Some(u) = uuid {
                        all_uuids.push(u);
                    }
                    cells.push(RawCell::Term(uuid));
                } else {
                    let text: Option<String> = row.try_get(col.sql_alias.as_str())?;
                    cells.push(RawCell::Value(text));
                }
            }
            raw.push(cells);
        }

        let resolved = self.registry().lookup_batch(&all_uuids).await?;
        for cells in raw {
            out_rows.push(cells.into_iter().map(|c| c.into_term(&resolved)).collect());
        }

        Ok(QueryResult::Bindings {
            vars: plan.columns.iter().map(|c| c.variable.as_str().to_string()).collect(),
            rows: out_rows,
            truncated,
        })
    }

    async fn run_ask(&self, plan: &QueryPlan) -> EngineResult<QueryResult> {
        validate_select_sql(&plan.sql)?;
        let row = self
            .with_timeout(sqlx::query(&plan.sql).fetch_one(self.pool.raw()))
            .await?;
        let value: bool = row.try_get("ask_result")?;
        Ok(QueryResult::Boolean { value })
    }

    async fn run_construct(&self, plan: &ConstructPlan) -> EngineResult<QueryResult> {
        let (rows, _truncated) = self.fetch_capped(&plan.query.sql).await?;
        let mut all_uuids: Vec<Uuid> = Vec::new();
        let mut raw_rows: Vec<HashMap<String, RawCell>> = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut cells = HashMap::new();
            for col in &plan.query.columns {
                let cell = if col.is_term {
                    let uuid: Option<Uuid> = row.try_get(col.sql_alias.as_str())?;
                    if let Some(u) = uuid {
                        all_uuids.push(u);
                    }
                    RawCell::Term(uuid)
                } else {
                    RawCell::Value(row.try_get(col.sql_alias.as_str())?)
                };
                cells.insert(col.variable.as_str().to_string(), cell);
            }
            raw_rows.push(cells);
        }
        let resolved = self.registry().lookup_batch(&all_uuids).await?;

        let mut triples = Vec::new();
        for cells in raw_rows {
            let binding: HashMap<String, Term> = cells
                .into_iter()
                .filter_map(|(v, c)| c.into_term(&resolved).map(|t| (v, t)))
                .collect();
            for pattern in &plan.template {
                if let Some(quad) = instantiate_triple(pattern, &binding) {
                    triples.push(quad);
                }
            }
        }
        dedup_quads(&mut triples);
        Ok(QueryResult::Triples { triples })
    }

    /// DESCRIBE (spec §4.6.13): the query's projected columns are the
    /// resolved resources (`sql/mod.rs::translate_describe`); this gathers
    /// every distinct resolved resource across all rows/columns and returns
    /// every quad with that resource as subject.
    async fn run_describe(&self, plan: &ConstructPlan) -> EngineResult<QueryResult> {
        let (rows, _truncated) = self.fetch_capped(&plan.query.sql).await?;
        let mut all_uuids: Vec<Uuid> = Vec::new();
        for row in &rows {
            // A described resource must be an actual term (a URI/blank
            // node to scan quads by); a BIND/aggregate-computed column
            // could never be a meaningful DESCRIBE target, so it is skipped.
            for col in plan.query.columns.iter().filter(|c| c.is_term) {
                if let Some(u) = row.try_get::<Option<Uuid>, _>(col.sql_alias.as_str())? {
                    all_uuids.push(u);
                }
            }
        }
        let resolved = self.registry().lookup_batch(&all_uuids).await?;

        let mut triples = Vec::new();
        let mut seen_resources = std::collections::HashSet::new();
        for uuid in all_uuids {
            if !seen_resources.insert(uuid) {
                continue;
            }
            let Some(resource) = resolved.get(&uuid) else { continue };
            if triples.len() >= self.max_rows {
                break;
            }
            let remaining = (self.max_rows - triples.len()) as u64;
            let pattern = QuadPattern {
                subject: Some(resource.clone()),
                ..QuadPattern::default()
            };
            let matched = self.store.scan(&pattern, Some(remaining)).await?;
            triples.extend(matched);
        }
        dedup_quads(&mut triples);
        Ok(QueryResult::Triples { triples })
    }

    /// Runs `sql`, wrapped in an outer cap of `max_rows + 1` rows so
    /// truncation can be detected without a streaming cursor, subject to the
    /// configured wall-clock timeout (spec §4.7, §5 "Cancellation and
    /// timeouts").
    async fn fetch_capped(&self, sql: &str) -> EngineResult<(Vec<sqlx::postgres::PgRow>, bool)> {
        validate_select_sql(sql)?;
        let capped = format!(
            "SELECT * FROM ({}) AS __capped LIMIT {}",
            sql,
            self.max_rows as u64 + 1
        );
        let rows = self.with_timeout(sqlx::query(&capped).fetch_all(self.pool.raw())).await?;
        let truncated = rows.len() > self.max_rows;
        let mut rows = rows;
        rows.truncate(self.max_rows);
        Ok((rows, truncated))
    }

    async fn with_timeout<F, T>(&self, fut: F) -> EngineResult<T>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EngineError::Cancelled(format!(
                "query exceeded {}ms timeout",
                self.query_timeout.as_millis()
            ))),
        }
    }
}

/// The deny-list check spec §4.7 names: no stacked statements, no comment
/// splicing, and only the keywords a translated SELECT/ASK statement ever
/// legitimately needs.
fn validate_select_sql(sql: &str) -> EngineResult<()> {
    let trimmed = sql.trim();
    if trimmed.trim_end_matches(';').contains(';') {
        return Err(EngineError::StorageError(
            "refusing to execute stacked statements".to_string(),
        ));
    }
    let upper = trimmed.to_uppercase();
    if !(upper.starts_with("SELECT") || upper.starts_with("WITH")) {
        return Err(EngineError::StorageError(
            "translator output must be a SELECT statement".to_string(),
        ));
    }
    for needle in DENIED_SUBSTRINGS {
        if upper.contains(needle) {
            return Err(EngineError::StorageError(format!(
                "refusing to execute SQL containing {}",
                needle.trim()
            )));
        }
    }
    Ok(())
}

fn instantiate_triple(
    pattern: &spargebra::term::TriplePattern,
    binding: &HashMap<String, Term>,
) -> Option<Quad> {
    let subject = resolve_term_pattern(&pattern.subject, binding)?;
    let predicate = resolve_named_node_pattern(&pattern.predicate, binding)?;
    let object = resolve_term_pattern(&pattern.object, binding)?;
    Some(Quad::in_default_graph(subject, predicate, object))
}

fn resolve_term_pattern(pattern: &spargebra::term::TermPattern, binding: &HashMap<String, Term>) -> Option<Term> {
    match pattern {
        spargebra::term::TermPattern::Variable(v) => binding.get(v.as_str()).cloned(),
        other => Term::from_term_pattern(other),
    }
}

fn resolve_named_node_pattern(
    pattern: &spargebra::term::NamedNodePattern,
    binding: &HashMap<String, Term>,
) -> Option<Term> {
    match pattern {
        spargebra::term::NamedNodePattern::Variable(v) => binding.get(v.as_str()).cloned(),
        spargebra::term::NamedNodePattern::NamedNode(n) => Some(Term::from_named_node(n)),
    }
}

fn dedup_quads(quads: &mut Vec<Quad>) {
    let mut seen = std::collections::HashSet::new();
    quads.retain(|q| {
        let key = (q.subject.uuid(), q.predicate.uuid(), q.object.uuid(), q.context.uuid());
        seen.insert(key)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_stacked_statements() {
        assert!(validate_select_sql("SELECT 1; DROP TABLE foo").is_err());
    }

    #[test]
    fn rejects_non_select() {
        assert!(validate_select_sql("DELETE FROM foo").is_err());
    }

    #[test]
    fn accepts_plain_select() {
        assert!(validate_select_sql("SELECT v_s FROM t0").is_ok());
    }

    #[test]
    fn accepts_recursive_cte_select() {
        assert!(validate_select_sql("WITH RECURSIVE walk AS (SELECT 1) SELECT * FROM walk").is_ok());
    }

    #[test]
    fn dedup_removes_repeated_quads() {
        let s = Term::uri("http://ex/s");
        let p = Term::uri("http://ex/p");
        let o = Term::uri("http://ex/o");
        let mut quads = vec![
            Quad::in_default_graph(s.clone(), p.clone(), o.clone()),
            Quad::in_default_graph(s, p, o),
        ];
        dedup_quads(&mut quads);
        assert_eq!(quads.len(), 1);
    }
}
