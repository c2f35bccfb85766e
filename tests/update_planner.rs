//! C8 Update Planner (spec §4.8): InsertData/DeleteData/Modify/Clear/Create/
//! Drop against a live space.

mod common;

use quadstore::{Quad, QueryOptions, QueryResult, Term};

async fn count_all(engine: &quadstore::Engine, space: &str) -> i64 {
    let result = engine
        .execute_query(space, "SELECT (COUNT(*) AS ?n) WHERE { ?s ?p ?o }", &QueryOptions::default())
        .await
        .unwrap();
    match result {
        QueryResult::Bindings { rows, .. } => rows[0][0].as_ref().unwrap().text.parse().unwrap(),
        _ => panic!("expected bindings"),
    }
}

#[tokio::test]
async fn insert_data_is_visible_to_a_subsequent_query() {
    let Some(engine) = common::connect().await else { return };
    let space = common::unique_space("ins");
    engine.create_space(&space).await.unwrap();

    engine
        .execute_update(
            &space,
            "INSERT DATA { <http://example.com/a> <http://example.com/p> \"v\" }",
        )
        .await
        .unwrap();
    assert_eq!(count_all(&engine, &space).await, 1);

    engine.drop_space(&space).await.unwrap();
}

#[tokio::test]
async fn delete_data_removes_only_the_named_quad() {
    let Some(engine) = common::connect().await else { return };
    let space = common::unique_space("deld");
    engine.create_space(&space).await.unwrap();

    engine
        .insert_quads(
            &space,
            &[
                Quad::in_default_graph(
                    Term::uri("http://example.com/a"),
                    Term::uri("http://example.com/p"),
                    Term::plain_literal("keep"),
                ),
                Quad::in_default_graph(
                    Term::uri("http://example.com/a"),
                    Term::uri("http://example.com/p"),
                    Term::plain_literal("drop"),
                ),
            ],
        )
        .await
        .unwrap();

    let outcome = engine
        .execute_update(
            &space,
            "DELETE DATA { <http://example.com/a> <http://example.com/p> \"drop\" }",
        )
        .await
        .unwrap();
    assert_eq!(outcome.deleted, 1);
    assert_eq!(count_all(&engine, &space).await, 1);

    engine.drop_space(&space).await.unwrap();
}

#[tokio::test]
async fn delete_insert_with_where_replaces_matching_rows() {
    let Some(engine) = common::connect().await else { return };
    let space = common::unique_space("modi");
    engine.create_space(&space).await.unwrap();

    engine
        .insert_quads(
            &space,
            &[Quad::in_default_graph(
                Term::uri("http://example.com/a"),
                Term::uri("http://example.com/status"),
                Term::plain_literal("draft"),
            )],
        )
        .await
        .unwrap();

    engine
        .execute_update(
            &space,
            "DELETE { ?s <http://example.com/status> ?old } \
             INSERT { ?s <http://example.com/status> \"published\" } \
             WHERE { ?s <http://example.com/status> ?old }",
        )
        .await
        .unwrap();

    let result = engine
        .execute_query(
            &space,
            "SELECT ?status WHERE { <http://example.com/a> <http://example.com/status> ?status }",
            &QueryOptions::default(),
        )
        .await
        .unwrap();
    match result {
        QueryResult::Bindings { rows, .. } => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0][0].as_ref().unwrap().text, "published");
        }
        _ => panic!("expected bindings"),
    }

    engine.drop_space(&space).await.unwrap();
}

#[tokio::test]
async fn clear_empties_a_named_graph_without_touching_others() {
    let Some(engine) = common::connect().await else { return };
    let space = common::unique_space("clr");
    engine.create_space(&space).await.unwrap();

    let g1 = Term::uri("http://example.com/g1");
    let g2 = Term::uri("http://example.com/g2");
    engine
        .insert_quads(
            &space,
            &[
                Quad::new(
                    Term::uri("http://example.com/a"),
                    Term::uri("http://example.com/p"),
                    Term::plain_literal("1"),
                    g1.clone(),
                ),
                Quad::new(
                    Term::uri("http://example.com/b"),
                    Term::uri("http://example.com/p"),
                    Term::plain_literal("2"),
                    g2.clone(),
                ),
            ],
        )
        .await
        .unwrap();

    engine
        .execute_update(&space, "CLEAR GRAPH <http://example.com/g1>")
        .await
        .unwrap();

    let g1_count = engine
        .execute_query(
            &space,
            "SELECT (COUNT(*) AS ?n) WHERE { GRAPH <http://example.com/g1> { ?s ?p ?o } }",
            &QueryOptions::default(),
        )
        .await
        .unwrap();
    let g2_count = engine
        .execute_query(
            &space,
            "SELECT (COUNT(*) AS ?n) WHERE { GRAPH <http://example.com/g2> { ?s ?p ?o } }",
            &QueryOptions::default(),
        )
        .await
        .unwrap();
    let extract = |r: QueryResult| -> String {
        match r {
            QueryResult::Bindings { rows, .. } => rows[0][0].as_ref().unwrap().text.clone(),
            _ => panic!("expected bindings"),
        }
    };
    assert_eq!(extract(g1_count), "0");
    assert_eq!(extract(g2_count), "1");

    engine.drop_space(&space).await.unwrap();
}

#[tokio::test]
async fn a_non_silent_load_is_rejected_as_unsupported() {
    let Some(engine) = common::connect().await else { return };
    let space = common::unique_space("load");
    engine.create_space(&space).await.unwrap();

    let err = engine
        .execute_update(&space, "LOAD <http://example.com/data.ttl>")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "UnsupportedFeature");

    engine.drop_space(&space).await.unwrap();
}
