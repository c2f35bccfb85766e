//! Output shapes handed from the translator (C6) to the executor (C7):
//! the finished SQL text plus enough metadata to re-hydrate UUID columns
//! into lexical RDF terms (spec §4.6.16, §6).

use spargebra::term::Variable;

/// One column of a compiled query's result set.
#[derive(Debug, Clone)]
pub struct OutputColumn {
    pub variable: Variable,
    pub sql_alias: String,
    /// Whether the projected value is a term UUID that needs resolving
    /// against the term table (true for ordinary pattern-bound variables),
    /// or an already-lexical scalar computed by BIND or an aggregate, which
    /// the executor decodes directly as a plain literal (spec §4.6.7,
    /// §4.6.10).
    pub is_term: bool,
}

/// A fully compiled SELECT/ASK query, ready for `executor.rs` to run.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub sql: String,
    pub columns: Vec<OutputColumn>,
    pub distinct: bool,
    pub is_ask: bool,
}

/// A compiled CONSTRUCT query: the WHERE-clause SELECT plus the template
/// triples to instantiate per solution row (spec §4.7).
#[derive(Debug, Clone)]
pub struct ConstructPlan {
    pub query: QueryPlan,
    pub template: Vec<spargebra::term::TriplePattern>,
}
