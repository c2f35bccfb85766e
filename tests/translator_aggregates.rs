//! C6 GROUP BY/aggregate/ORDER BY/DISTINCT/Slice lowering (spec §4.6.10–
//! §4.6.12).

use quadstore::sql::{translate_query, TranslatedQuery};
use quadstore::space::SpaceTables;

fn tables() -> SpaceTables {
    SpaceTables::new("qs", "aggtest").unwrap()
}

fn select_plan(query: &str) -> quadstore::sql::plan::QueryPlan {
    let parsed = spargebra::Query::parse(query, None).unwrap();
    match translate_query(&tables(), &parsed, 10_000, 50).unwrap() {
        TranslatedQuery::Select(plan) => plan,
        _ => panic!("expected a Select plan"),
    }
}

#[test]
fn count_group_by_lowers_to_a_group_by_clause() {
    let plan = select_plan(
        "SELECT ?p (COUNT(?o) AS ?n) WHERE { ?s ?p ?o } GROUP BY ?p",
    );
    assert!(plan.sql.to_uppercase().contains("GROUP BY"));
    assert!(plan.sql.to_uppercase().contains("COUNT"));
}

/// An aggregate's output is a computed SQL scalar (`bigint`/`numeric`/
/// `text`), never a term UUID; the projection plan must mark it so the
/// executor decodes it as a plain literal instead of a `term` lookup, while
/// the GROUP BY key (re-exposing an already-bound variable) stays a term
/// column (spec §4.6.10, §4.6.11, §8 "Aggregate idempotence").
#[test]
fn aggregate_output_column_is_not_a_term_column() {
    let plan = select_plan("SELECT ?p (COUNT(?o) AS ?n) WHERE { ?s ?p ?o } GROUP BY ?p");
    let n_col = plan.columns.iter().find(|c| c.variable.as_str() == "n").unwrap();
    assert!(!n_col.is_term);
    let p_col = plan.columns.iter().find(|c| c.variable.as_str() == "p").unwrap();
    assert!(p_col.is_term);
}

#[test]
fn bare_count_star_is_cast_to_text_for_uniform_decoding() {
    let plan = select_plan("SELECT (COUNT(*) AS ?n) WHERE { ?s ?p ?o }");
    assert!(plan.sql.to_uppercase().contains("COUNT(*)"));
    let n_col = &plan.columns[0];
    assert!(!n_col.is_term);
}

#[test]
fn distinct_count_deduplicates_before_counting() {
    let plan = select_plan("SELECT (COUNT(DISTINCT ?o) AS ?n) WHERE { ?s ?p ?o }");
    assert!(plan.sql.to_uppercase().contains("COUNT(DISTINCT"));
}

#[test]
fn order_by_lowers_to_an_order_by_clause() {
    let plan = select_plan("SELECT ?s ?o WHERE { ?s <http://example.com/age> ?o } ORDER BY ?o");
    assert!(plan.sql.to_uppercase().contains("ORDER BY"));
}

#[test]
fn order_by_desc_is_preserved() {
    let plan = select_plan("SELECT ?s ?o WHERE { ?s <http://example.com/age> ?o } ORDER BY DESC(?o)");
    assert!(plan.sql.to_uppercase().contains("DESC"));
}

#[test]
fn select_distinct_is_preserved() {
    let plan = select_plan("SELECT DISTINCT ?p WHERE { ?s ?p ?o }");
    assert!(plan.distinct);
}

#[test]
fn limit_and_offset_lower_to_limit_offset() {
    let plan = select_plan("SELECT ?s WHERE { ?s ?p ?o } LIMIT 10 OFFSET 5");
    assert!(plan.sql.to_uppercase().contains("LIMIT"));
    assert!(plan.sql.to_uppercase().contains("OFFSET"));
}

#[test]
fn group_concat_with_a_custom_separator_is_supported() {
    let plan = select_plan(
        "SELECT (GROUP_CONCAT(?o; separator=\",\") AS ?names) WHERE { ?s <http://example.com/name> ?o }",
    );
    assert!(plan.sql.to_uppercase().contains("STRING_AGG"));
}
