//! C6 SQL Translator entry points (spec §4.6): takes a parsed SPARQL query
//! and produces one SQL statement plus a projection plan, tying together
//! `context.rs` (translation state), `bgp.rs` (pattern lowering), `path.rs`
//! (property paths), `expr.rs` (expression compilation) and `aggregate.rs`
//! (GROUP BY/ORDER BY/DISTINCT/Slice).

pub mod aggregate;
pub mod bgp;
pub mod context;
pub mod expr;
pub mod path;
pub mod plan;

use std::collections::HashMap;

use spargebra::algebra::GraphPattern;
use spargebra::term::{GraphNamePattern, NamedNodePattern, TermPattern, TriplePattern, Variable};
use spargebra::Query;

use crate::error::{EngineError, EngineResult};
use crate::space::SpaceTables;
use crate::term::Term;

use self::aggregate::compile_project;
use self::bgp::compile_pattern;
use self::context::{is_value_column, AliasAllocator, CompiledPattern, TranslationContext};
use self::plan::{ConstructPlan, OutputColumn, QueryPlan};

/// Translates a parsed SELECT query into a `QueryPlan` (spec §4.6.1–§4.6.13).
/// `variables` is the SELECT's output variable order (`*` already expanded by
/// `spargebra` into the pattern's in-scope variables).
pub fn translate_select(
    tables: &SpaceTables,
    pattern: &GraphPattern,
    node_budget: usize,
    max_path_depth: u32,
) -> EngineResult<QueryPlan> {
    translate_select_inner(tables, pattern, node_budget, max_path_depth, Vec::new(), Vec::new())
}

/// Translates a parsed `Query::Select { pattern, .. }`, top-level entry used
/// by `engine.rs::execute_query`.
pub fn translate_query(
    tables: &SpaceTables,
    query: &Query,
    node_budget: usize,
    max_path_depth: u32,
) -> EngineResult<TranslatedQuery> {
    translate_query_with_dataset(tables, query, node_budget, max_path_depth, Vec::new(), Vec::new())
}

/// `translate_query`, additionally threading `execute_query`'s
/// `default_graph_uris`/`named_graph_uris` dataset-override options (spec
/// §6) into the `TranslationContext` every query form builds.
pub fn translate_query_with_dataset(
    tables: &SpaceTables,
    query: &Query,
    node_budget: usize,
    max_path_depth: u32,
    default_graph_override: Vec<uuid::Uuid>,
    named_graph_restriction: Vec<uuid::Uuid>,
) -> EngineResult<TranslatedQuery> {
    match query {
        Query::Select { pattern, .. } => Ok(TranslatedQuery::Select(translate_select_inner(
            tables,
            pattern,
            node_budget,
            max_path_depth,
            default_graph_override,
            named_graph_restriction,
        )?)),
        Query::Ask { pattern, .. } => Ok(TranslatedQuery::Ask(translate_ask_inner(
            tables,
            pattern,
            node_budget,
            max_path_depth,
            default_graph_override,
            named_graph_restriction,
        )?)),
        Query::Construct { template, pattern, .. } => Ok(TranslatedQuery::Construct(translate_construct_inner(
            tables,
            template,
            pattern,
            node_budget,
            max_path_depth,
            default_graph_override,
            named_graph_restriction,
        )?)),
        Query::Describe { pattern, .. } => Ok(TranslatedQuery::Describe(translate_describe_inner(
            tables,
            pattern,
            node_budget,
            max_path_depth,
            default_graph_override,
            named_graph_restriction,
        )?)),
    }
}

fn new_context<'a>(
    tables: &'a SpaceTables,
    node_budget: usize,
    max_path_depth: u32,
    default_graph_override: Vec<uuid::Uuid>,
    named_graph_restriction: Vec<uuid::Uuid>,
) -> TranslationContext<'a> {
    let mut ctx = TranslationContext::new(tables, node_budget, max_path_depth);
    ctx.default_graph_override = default_graph_override;
    ctx.named_graph_restriction = named_graph_restriction;
    ctx
}

fn translate_select_inner(
    tables: &SpaceTables,
    pattern: &GraphPattern,
    node_budget: usize,
    max_path_depth: u32,
    default_graph_override: Vec<uuid::Uuid>,
    named_graph_restriction: Vec<uuid::Uuid>,
) -> EngineResult<QueryPlan> {
    let mut ctx = new_context(tables, node_budget, max_path_depth, default_graph_override, named_graph_restriction);
    let mut alloc = AliasAllocator::new();
    let compiled = compile_pattern(&mut ctx, &mut alloc, pattern)?;
    Ok(finish_query(&mut alloc, compiled, false))
}

/// The four SPARQL query forms spec §4.6.13 names, each with its own result
/// shape the executor (C7) must handle differently.
pub enum TranslatedQuery {
    Select(QueryPlan),
    Ask(QueryPlan),
    Construct(ConstructPlan),
    /// DESCRIBE's minimum contract (spec §4.6.13): the resources to
    /// describe, resolved once the WHERE pattern (if any) has run. The
    /// executor treats this like a CONSTRUCT whose template is
    /// `?resource ?p ?o` / `?s ?p ?resource` for every solution.
    Describe(ConstructPlan),
}

/// Wraps the translated pattern in `SELECT EXISTS(...)` (spec §4.6.13 ASK).
fn translate_ask_inner(
    tables: &SpaceTables,
    pattern: &GraphPattern,
    node_budget: usize,
    max_path_depth: u32,
    default_graph_override: Vec<uuid::Uuid>,
    named_graph_restriction: Vec<uuid::Uuid>,
) -> EngineResult<QueryPlan> {
    let mut ctx = new_context(tables, node_budget, max_path_depth, default_graph_override, named_graph_restriction);
    let mut alloc = AliasAllocator::new();
    let compiled = compile_pattern(&mut ctx, &mut alloc, pattern)?;
    let sql = format!("SELECT EXISTS({}) AS ask_result", cleanup(&compiled.sql));
    Ok(QueryPlan {
        sql,
        columns: Vec::new(),
        distinct: false,
        is_ask: true,
    })
}

/// Compiles a CONSTRUCT query (spec §4.6.13): the WHERE-clause SELECT
/// projects every variable the template references; the executor
/// instantiates template triples per solution row.
fn translate_construct_inner(
    tables: &SpaceTables,
    template: &[TriplePattern],
    pattern: &GraphPattern,
    node_budget: usize,
    max_path_depth: u32,
    default_graph_override: Vec<uuid::Uuid>,
    named_graph_restriction: Vec<uuid::Uuid>,
) -> EngineResult<ConstructPlan> {
    let mut ctx = new_context(tables, node_budget, max_path_depth, default_graph_override, named_graph_restriction);
    let mut alloc = AliasAllocator::new();
    let compiled = compile_pattern(&mut ctx, &mut alloc, pattern)?;

    let mut template_vars: Vec<Variable> = Vec::new();
    for triple in template {
        collect_template_vars(&triple.subject, &mut template_vars);
        if let NamedNodePattern::Variable(v) = &triple.predicate {
            push_unique(&mut template_vars, v.clone());
        }
        collect_template_vars(&triple.object, &mut template_vars);
    }

    let projected = compile_project(&mut alloc, compiled, &template_vars)?;
    let query = finish_query(&mut alloc, projected, false);
    Ok(ConstructPlan {
        query,
        template: template.to_vec(),
    })
}

/// DESCRIBE's minimum contract (spec §4.6.13): returns every quad where a
/// described resource is the subject. `spargebra` desugars both forms
/// (`DESCRIBE <a> <b>` and `DESCRIBE ?x WHERE {...}`) into a `Project` over
/// an `Extend`/`Bgp` that binds each described resource to an output
/// variable, so the pattern here is always well-formed SELECT-shaped
/// algebra; the executor resolves each output column's bound value per row
/// and scans for quads with that subject (`executor.rs`).
fn translate_describe_inner(
    tables: &SpaceTables,
    pattern: &GraphPattern,
    node_budget: usize,
    max_path_depth: u32,
    default_graph_override: Vec<uuid::Uuid>,
    named_graph_restriction: Vec<uuid::Uuid>,
) -> EngineResult<ConstructPlan> {
    let query = translate_select_inner(tables, pattern, node_budget, max_path_depth, default_graph_override, named_graph_restriction)?;
    // The template is synthesized by the executor (per resolved subject) so
    // an empty placeholder is used here; `executor.rs` special-cases
    // `TranslatedQuery::Describe` rather than reusing the CONSTRUCT template
    // path verbatim.
    Ok(ConstructPlan { query, template: Vec::new() })
}

fn collect_template_vars(pattern: &TermPattern, out: &mut Vec<Variable>) {
    if let TermPattern::Variable(v) = pattern {
        push_unique(out, v.clone());
    }
}

fn push_unique(vars: &mut Vec<Variable>, v: Variable) {
    if !vars.contains(&v) {
        vars.push(v);
    }
}

fn finish_query(alloc: &mut AliasAllocator, compiled: CompiledPattern, distinct: bool) -> QueryPlan {
    let mut columns = Vec::new();
    let mut var_names: Vec<&Variable> = compiled.columns.keys().collect();
    var_names.sort_by_key(|v| v.as_str().to_string());
    for var in var_names {
        let sql_alias = compiled.columns[var].clone();
        columns.push(OutputColumn {
            variable: var.clone(),
            is_term: !is_value_column(&sql_alias),
            sql_alias,
        });
    }
    let _ = alloc;
    QueryPlan {
        sql: cleanup(&compiled.sql),
        columns,
        distinct,
        is_ask: false,
    }
}

/// The one named textual fix spec §4.6.14/§11 allows: compositional
/// emission occasionally produces `FROM FROM` when a fragment forgets its
/// own `FROM` keyword is already present in the splice point. This collapses
/// exactly that, nothing else — it is not a general rewrite engine.
pub fn cleanup(sql: &str) -> String {
    sql.replace("FROM FROM", "FROM")
}

/// Resolves a WHERE pattern's default-graph context, used by the Update
/// Planner (C8) when a Modify's WHERE clause has no explicit GRAPH wrapper
/// (spec §4.8).
pub fn default_graph_context_uuid() -> uuid::Uuid {
    Term::default_graph().uuid()
}

/// Builds the translation context's active graph for an explicit named graph
/// (used by CLEAR/DROP GRAPH and Modify's USING clauses, spec §4.8).
pub fn graph_name_for(uri: Option<&str>) -> GraphNamePattern {
    match uri {
        Some(u) => GraphNamePattern::NamedNode(spargebra::term::NamedNode::new_unchecked(u.to_string())),
        None => GraphNamePattern::DefaultGraph,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::ParsedQuery;

    fn tables() -> SpaceTables {
        SpaceTables::new("qs", "s1").unwrap()
    }

    fn select_plan(sparql: &str) -> QueryPlan {
        let parsed = ParsedQuery::parse(sparql, None).unwrap();
        match translate_query(&tables(), &parsed.inner, 10_000, 50).unwrap() {
            TranslatedQuery::Select(plan) => plan,
            _ => panic!("expected SELECT"),
        }
    }

    #[test]
    fn simple_bgp_joins_on_shared_variable() {
        let plan = select_plan("SELECT ?s ?o WHERE { ?s <http://ex/p> ?o }");
        assert!(plan.sql.contains("qs__s1__rdf_quad"));
        assert_eq!(plan.columns.len(), 2);
    }

    #[test]
    fn optional_produces_left_join() {
        let plan = select_plan(
            "SELECT ?s ?n ?e WHERE { ?s <http://ex/name> ?n OPTIONAL { ?s <http://ex/email> ?e } }",
        );
        assert!(plan.sql.contains("LEFT JOIN"));
    }

    #[test]
    fn union_produces_union_all() {
        let plan = select_plan(
            "SELECT ?s WHERE { { ?s <http://ex/type> <http://ex/T1> } UNION { ?s <http://ex/type> <http://ex/T2> } }",
        );
        assert!(plan.sql.contains("UNION ALL"));
    }

    #[test]
    fn minus_with_shared_variable_uses_not_exists() {
        let plan = select_plan(
            "SELECT ?s WHERE { ?s <http://ex/p> ?o MINUS { ?s <http://ex/q> ?o2 } }",
        );
        assert!(plan.sql.contains("NOT EXISTS"));
    }

    #[test]
    fn ask_wraps_in_exists() {
        let parsed = ParsedQuery::parse("ASK { ?s ?p ?o }", None).unwrap();
        match translate_query(&tables(), &parsed.inner, 10_000, 50).unwrap() {
            TranslatedQuery::Ask(plan) => {
                assert!(plan.is_ask);
                assert!(plan.sql.contains("EXISTS"));
            }
            _ => panic!("expected ASK"),
        }
    }

    #[test]
    fn service_is_unsupported() {
        let parsed = ParsedQuery::parse(
            "SELECT ?s WHERE { SERVICE <http://remote/sparql> { ?s ?p ?o } }",
            None,
        )
        .unwrap();
        let err = translate_query(&tables(), &parsed.inner, 10_000, 50).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFeature(_)));
    }

    #[test]
    fn node_budget_rejects_pathological_trees() {
        let parsed = ParsedQuery::parse(
            "SELECT ?s WHERE { ?s <http://ex/p> ?o OPTIONAL { ?s <http://ex/q> ?o2 } }",
            None,
        )
        .unwrap();
        let err = translate_query(&tables(), &parsed.inner, 1, 50).unwrap_err();
        assert!(matches!(err, EngineError::QueryTooComplex(_)));
    }
}
