//! C6 translation shape assertions for BGP/Join/OPTIONAL/UNION/MINUS/FILTER
//! (spec §4.6.2–§4.6.7), checked against the generated SQL text the way the
//! in-crate `sql::mod` tests do, kept here as black-box coverage driven
//! entirely through the public API.

use quadstore::sql::{translate_query, TranslatedQuery};
use quadstore::space::SpaceTables;

fn tables() -> SpaceTables {
    SpaceTables::new("qs", "bgptest").unwrap()
}

fn select_sql(query: &str) -> String {
    select_plan(query).sql
}

fn select_plan(query: &str) -> quadstore::sql::plan::QueryPlan {
    let parsed = spargebra::Query::parse(query, None).unwrap();
    match translate_query(&tables(), &parsed, 10_000, 50).unwrap() {
        TranslatedQuery::Select(plan) => plan,
        _ => panic!("expected a Select plan"),
    }
}

#[test]
fn a_two_triple_bgp_joins_on_the_shared_variable() {
    let sql = select_sql(
        "SELECT ?name WHERE { ?person <http://xmlns.com/foaf/0.1/knows> ?friend . \
         ?friend <http://xmlns.com/foaf/0.1/name> ?name }",
    );
    assert!(sql.to_uppercase().contains("JOIN"));
}

#[test]
fn optional_lowers_to_a_left_join() {
    let sql = select_sql(
        "SELECT ?s ?o WHERE { ?s <http://example.com/p> ?x OPTIONAL { ?x <http://example.com/q> ?o } }",
    );
    assert!(sql.to_uppercase().contains("LEFT JOIN"));
}

#[test]
fn union_lowers_to_union_all() {
    let sql = select_sql(
        "SELECT ?s WHERE { { ?s <http://example.com/a> <http://example.com/x> } \
         UNION { ?s <http://example.com/b> <http://example.com/y> } }",
    );
    assert!(sql.to_uppercase().contains("UNION ALL"));
}

#[test]
fn minus_with_a_shared_variable_lowers_to_not_exists() {
    let sql = select_sql(
        "SELECT ?s WHERE { ?s <http://example.com/a> ?o MINUS { ?s <http://example.com/b> ?o } }",
    );
    assert!(sql.to_uppercase().contains("NOT EXISTS"));
}

#[test]
fn minus_with_no_shared_variable_is_a_no_op() {
    let with_minus = select_sql(
        "SELECT ?s WHERE { ?s <http://example.com/a> ?o MINUS { ?t <http://example.com/b> ?u } }",
    );
    let without_minus = select_sql("SELECT ?s WHERE { ?s <http://example.com/a> ?o }");
    assert!(!with_minus.to_uppercase().contains("NOT EXISTS"));
    assert_eq!(with_minus, without_minus);
}

#[test]
fn filter_lowers_into_a_where_clause() {
    let sql = select_sql(
        "SELECT ?s WHERE { ?s <http://example.com/age> ?age FILTER(?age > 18) }",
    );
    assert!(sql.to_uppercase().contains("WHERE"));
}

/// A variable-to-variable comparison can't be assumed numeric at translate
/// time (spec §4.6.6): the lowered SQL must fall back to a lexical compare
/// for non-numeric datatypes at runtime rather than unconditionally casting
/// both sides to a number, which would turn `FILTER(?x = ?y)` over two equal
/// URIs into SQL NULL and silently drop the row.
#[test]
fn variable_equality_filter_falls_back_to_lexical_comparison_at_runtime() {
    let sql = select_sql(
        "SELECT ?s WHERE { ?s <http://example.com/a> ?x . ?s <http://example.com/b> ?y \
         FILTER(?x = ?y) }",
    );
    let upper = sql.to_uppercase();
    assert!(upper.contains("CASE WHEN"));
    assert!(upper.contains("ELSE"));
}

#[test]
fn bind_introduces_the_bound_variable_name_in_the_select_list() {
    let sql = select_sql(
        "SELECT ?doubled WHERE { ?s <http://example.com/n> ?n BIND(?n * 2 AS ?doubled) }",
    );
    assert!(sql.contains("doubled"));
}

/// A BIND'd value is a computed SQL scalar, not a term UUID: casting it to
/// `::uuid` blows up at runtime for anything that isn't a UUID string
/// literal (a plain string, an arithmetic result, a URI). The projection
/// must cast to text and mark the column non-term instead.
#[test]
fn bind_output_is_projected_as_text_and_is_not_a_term_column() {
    let plan = select_plan(
        "SELECT ?doubled WHERE { ?s <http://example.com/n> ?n BIND(?n * 2 AS ?doubled) }",
    );
    assert!(!plan.sql.to_uppercase().contains("::UUID"));
    let doubled_col = plan
        .columns
        .iter()
        .find(|c| c.variable.as_str() == "doubled")
        .unwrap();
    assert!(!doubled_col.is_term);
}

#[test]
fn bind_of_a_plain_string_literal_does_not_cast_to_uuid() {
    let plan =
        select_plan("SELECT ?y WHERE { ?s <http://example.com/p> ?o BIND(\"x\" AS ?y) }");
    assert!(!plan.sql.to_uppercase().contains("::UUID"));
    let y_col = plan.columns.iter().find(|c| c.variable.as_str() == "y").unwrap();
    assert!(!y_col.is_term);
}

#[test]
fn graph_restricts_to_the_named_graph_variable() {
    let sql = select_sql(
        "SELECT ?s WHERE { GRAPH <http://example.com/g1> { ?s <http://example.com/a> ?o } }",
    );
    assert!(sql.to_uppercase().contains("WHERE"));
}

#[test]
fn a_service_clause_is_rejected_rather_than_silently_ignored() {
    let parsed = spargebra::Query::parse(
        "SELECT ?s WHERE { SERVICE <http://example.com/sparql> { ?s ?p ?o } }",
        None,
    )
    .unwrap();
    assert!(translate_query(&tables(), &parsed, 10_000, 50).is_err());
}

#[test]
fn a_pathological_tree_is_rejected_before_it_ever_reaches_postgres() {
    let mut pattern = "?s0 <http://example.com/p> ?s1 .".to_string();
    for i in 1..500 {
        pattern.push_str(&format!(" ?s{i} <http://example.com/p> ?s{}.", i + 1));
    }
    let query = format!("SELECT * WHERE {{ {pattern} }}");
    let parsed = spargebra::Query::parse(&query, None).unwrap();
    assert!(translate_query(&tables(), &parsed, 50, 50).is_err());
}
