//! Translation state threaded through the recursive descent over
//! `GraphPattern` (spec §4.6): alias allocation, the active graph, and
//! variable-nullability tracking for correct OPTIONAL/MINUS lowering.

use std::collections::{HashMap, HashSet};

use spargebra::term::{NamedNodePattern, Variable};

use crate::space::SpaceTables;

/// The common currency every `GraphPattern` node lowers to: a complete SQL
/// `SELECT` statement (never wrapped in parens by its producer — callers
/// wrap it when splicing it into a FROM clause), plus enough bookkeeping to
/// keep composing it further.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub sql: String,
    /// Maps each SPARQL variable bound anywhere in this fragment to the
    /// output column alias carrying its term UUID.
    pub columns: HashMap<Variable, String>,
    /// Variables whose column may be `NULL` in some output rows (produced
    /// by the right side of an OPTIONAL, or padding introduced by UNION).
    pub nullable: HashSet<Variable>,
}

impl CompiledPattern {
    pub fn is_bound(&self, var: &Variable) -> bool {
        self.columns.contains_key(var) && !self.nullable.contains(var)
    }
}

/// Translates a SPARQL variable into a SQL-safe column alias. Variable names
/// are already restricted to `[A-Za-z0-9_]` by the grammar, so this only
/// needs a prefix to avoid colliding with reserved words or starting with a
/// digit.
pub fn column_alias(var: &Variable) -> String {
    format!("v_{}", var.as_str())
}

/// Column alias for a computed scalar binding (BIND, an aggregate's output
/// variable): already-lexical text rather than a term UUID, so it gets a
/// distinct prefix the translator and executor both recognize (`is_value_column`).
pub fn value_column_alias(var: &Variable) -> String {
    format!("x_{}", var.as_str())
}

/// True if `sql_alias` names a computed scalar column (`value_column_alias`)
/// rather than a term-UUID column. Column names are never renamed once
/// allocated (joins/projections re-select under the same alias), so this
/// stays accurate as a fragment's output threads through further combinators.
pub fn is_value_column(sql_alias: &str) -> bool {
    sql_alias.starts_with("x_")
}

/// Tracks allocation of unique table aliases (`t0`, `t1`, ...) for each
/// `rdf_quad` instance a BGP triple pattern lowers to, and `s0`, `s1`, ... for
/// nested subqueries produced by compound patterns.
#[derive(Debug)]
pub struct AliasAllocator {
    next_table: u32,
    next_subquery: u32,
}

impl AliasAllocator {
    pub fn new() -> Self {
        Self {
            next_table: 0,
            next_subquery: 0,
        }
    }

    pub fn next_table_alias(&mut self) -> String {
        let alias = format!("t{}", self.next_table);
        self.next_table += 1;
        alias
    }

    pub fn next_subquery_alias(&mut self) -> String {
        let alias = format!("s{}", self.next_subquery);
        self.next_subquery += 1;
        alias
    }
}

/// Per-translation context: the space's table names, the active graph
/// (`GRAPH` blocks push/pop this; empty stack means the query is over the
/// default graph, spec §4.6.1), the `execute_query` dataset-override options
/// (spec §6 `default_graph_uris`/`named_graph_uris`), and a budget counter
/// guarding against pathological algebra trees (spec §4.6.15
/// `QueryTooComplex`).
///
/// `GraphPattern::Graph`'s `name` field is a `NamedNodePattern` (only a URI
/// or a variable can follow the `GRAPH` keyword; there is no syntax for
/// `GRAPH DEFAULT`), so the stack holds that type rather than the richer
/// `GraphNamePattern` used by quad patterns elsewhere in this crate.
pub struct TranslationContext<'a> {
    pub tables: &'a SpaceTables,
    pub graph_stack: Vec<NamedNodePattern>,
    pub node_budget: usize,
    pub nodes_seen: usize,
    pub max_path_depth: u32,
    /// Non-empty means `default_graph_uris` was given: an unwrapped pattern
    /// ranges over the union of these graphs instead of the reserved
    /// default-graph URI.
    pub default_graph_override: Vec<uuid::Uuid>,
    /// Non-empty means `named_graph_uris` was given: `GRAPH ?g` only ranges
    /// over these graphs.
    pub named_graph_restriction: Vec<uuid::Uuid>,
}

impl<'a> TranslationContext<'a> {
    pub fn new(tables: &'a SpaceTables, node_budget: usize, max_path_depth: u32) -> Self {
        Self {
            tables,
            graph_stack: Vec::new(),
            node_budget,
            nodes_seen: 0,
            max_path_depth,
            default_graph_override: Vec::new(),
            named_graph_restriction: Vec::new(),
        }
    }

    /// The active `GRAPH` scope, or `None` when the pattern is not wrapped
    /// in one — in which case it ranges over the default graph (spec §3
    /// "Default graph", §4.6.1).
    pub fn active_graph(&self) -> Option<&NamedNodePattern> {
        self.graph_stack.last()
    }

    /// The graph-scope condition BGP/path compilation must apply at
    /// `column_ref` (e.g. `"t0.context_uuid"` or bare `"context_uuid"`),
    /// `None` meaning no restriction applies. A pattern not wrapped in
    /// `GRAPH` is pinned to the default graph (or, with `default_graph_uris`
    /// set, to the union of those graphs); `GRAPH <uri>` is always pinned to
    /// that URI regardless of overrides; `GRAPH ?g` is unconstrained unless
    /// `named_graph_uris` narrows it.
    pub fn graph_condition(&self, column_ref: &str) -> Option<String> {
        match self.active_graph() {
            None => Some(if self.default_graph_override.is_empty() {
                format!("{column_ref} = '{}'::uuid", crate::term::Term::default_graph().uuid())
            } else {
                format!("{column_ref} = ANY(ARRAY[{}]::uuid[])", uuid_list(&self.default_graph_override))
            }),
            Some(NamedNodePattern::NamedNode(n)) => Some(format!(
                "{column_ref} = '{}'::uuid",
                crate::term::Term::from_named_node(n).uuid()
            )),
            Some(NamedNodePattern::Variable(_)) => {
                if self.named_graph_restriction.is_empty() {
                    None
                } else {
                    Some(format!(
                        "{column_ref} = ANY(ARRAY[{}]::uuid[])",
                        uuid_list(&self.named_graph_restriction)
                    ))
                }
            }
        }
    }

    pub fn charge_node(&mut self) -> crate::error::EngineResult<()> {
        self.nodes_seen += 1;
        if self.nodes_seen > self.node_budget {
            return Err(crate::error::EngineError::QueryTooComplex(format!(
                "algebra tree exceeds node budget of {}",
                self.node_budget
            )));
        }
        Ok(())
    }
}

fn uuid_list(uuids: &[uuid::Uuid]) -> String {
    uuids.iter().map(|u| format!("'{u}'::uuid")).collect::<Vec<_>>().join(", ")
}

/// The set of variables a compiled fragment is guaranteed to have bound
/// (non-NULL); every other column in its output may be NULL, which the
/// expression compiler (`expr.rs`) consults to decide whether `BOUND(?x)`
/// lowers to a constant or to an `IS NOT NULL` test.
pub fn certain_vars(columns: &[(Variable, bool)]) -> HashSet<Variable> {
    columns
        .iter()
        .filter(|(_, nullable)| !nullable)
        .map(|(v, _)| v.clone())
        .collect()
}
