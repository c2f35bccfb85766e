//! C6 property path lowering (spec §4.6.8): fixed-length paths unroll into
//! joins, `*`/`+`/`?` lower to a recursive CTE with a cycle guard.

use quadstore::sql::{translate_query, TranslatedQuery};
use quadstore::space::SpaceTables;

fn tables() -> SpaceTables {
    SpaceTables::new("qs", "pathtest").unwrap()
}

fn select_sql(query: &str) -> String {
    let parsed = spargebra::Query::parse(query, None).unwrap();
    match translate_query(&tables(), &parsed, 10_000, 50).unwrap() {
        TranslatedQuery::Select(plan) => plan.sql,
        _ => panic!("expected a Select plan"),
    }
}

#[test]
fn a_one_or_more_path_lowers_to_a_recursive_cte() {
    let sql = select_sql("SELECT ?y WHERE { <http://example.com/a> <http://example.com/knows>+ ?y }");
    assert!(sql.to_uppercase().contains("WITH RECURSIVE"));
}

#[test]
fn a_zero_or_more_path_includes_the_reflexive_base_case() {
    let sql = select_sql("SELECT ?y WHERE { <http://example.com/a> <http://example.com/knows>* ?y }");
    assert!(sql.to_uppercase().contains("WITH RECURSIVE"));
}

#[test]
fn an_inverse_path_swaps_subject_and_object() {
    let sql = select_sql("SELECT ?x WHERE { ?x ^<http://example.com/parentOf> <http://example.com/bob> }");
    assert!(sql.to_uppercase().contains("SELECT"));
}

#[test]
fn a_sequence_path_joins_through_an_intermediate_variable() {
    let sql = select_sql(
        "SELECT ?gp WHERE { <http://example.com/a> <http://example.com/parentOf>/<http://example.com/parentOf> ?gp }",
    );
    assert!(sql.to_uppercase().contains("JOIN"));
}

#[test]
fn an_alternative_path_lowers_to_a_union() {
    let sql = select_sql(
        "SELECT ?x WHERE { <http://example.com/a> (<http://example.com/knows>|<http://example.com/likes>) ?x }",
    );
    assert!(sql.to_uppercase().contains("UNION"));
}

#[test]
fn a_negated_property_set_excludes_the_listed_predicates() {
    let sql = select_sql(
        "SELECT ?x WHERE { <http://example.com/a> !(<http://example.com/knows>|<http://example.com/likes>) ?x }",
    );
    assert!(sql.to_uppercase().contains("NOT IN"));
}

#[test]
fn an_excessive_path_depth_is_rejected_rather_than_running_unbounded() {
    let parsed = spargebra::Query::parse(
        "SELECT ?y WHERE { <http://example.com/a> <http://example.com/knows>+ ?y }",
        None,
    )
    .unwrap();
    // max_path_depth = 0 leaves no room for even a single hop.
    assert!(translate_query(&tables(), &parsed, 10_000, 0).is_err());
}
