//! The six concrete end-to-end scenarios spec §8 names verbatim, run
//! against a live Postgres instance end-to-end through the `Engine` facade.

mod common;

use quadstore::{Quad, QueryOptions, QueryResult, Term};

fn text_at(result: &QueryResult, row: usize, col: usize) -> String {
    match result {
        QueryResult::Bindings { rows, .. } => rows[row][col]
            .as_ref()
            .expect("binding must be present")
            .text
            .clone(),
        _ => panic!("expected bindings"),
    }
}

#[tokio::test]
async fn scenario_1_insert_and_count() {
    let Some(engine) = common::connect().await else { return };
    let space = common::unique_space("sc1");
    engine.create_space(&space).await.unwrap();

    let g1 = Term::uri("http://example.com/g1");
    engine
        .insert_quads(
            &space,
            &[
                Quad::new(
                    Term::uri("http://example.com/a"),
                    Term::uri("http://example.com/p"),
                    Term::typed_literal("1", "http://www.w3.org/2001/XMLSchema#integer"),
                    g1.clone(),
                ),
                Quad::new(
                    Term::uri("http://example.com/a"),
                    Term::uri("http://example.com/p"),
                    Term::typed_literal("2", "http://www.w3.org/2001/XMLSchema#integer"),
                    g1.clone(),
                ),
            ],
        )
        .await
        .unwrap();

    let result = engine
        .execute_query(
            &space,
            "SELECT (COUNT(*) AS ?n) WHERE { GRAPH <http://example.com/g1> { ?s ?p ?o } }",
            &QueryOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(text_at(&result, 0, 0), "2");

    engine.drop_space(&space).await.unwrap();
}

#[tokio::test]
async fn scenario_2_filter_on_numeric_literal() {
    let Some(engine) = common::connect().await else { return };
    let space = common::unique_space("sc2");
    engine.create_space(&space).await.unwrap();

    let g1 = Term::uri("http://example.com/g1");
    engine
        .insert_quads(
            &space,
            &[
                Quad::new(
                    Term::uri("http://example.com/a"),
                    Term::uri("http://example.com/p"),
                    Term::typed_literal("1", "http://www.w3.org/2001/XMLSchema#integer"),
                    g1.clone(),
                ),
                Quad::new(
                    Term::uri("http://example.com/a"),
                    Term::uri("http://example.com/p"),
                    Term::typed_literal("2", "http://www.w3.org/2001/XMLSchema#integer"),
                    g1.clone(),
                ),
            ],
        )
        .await
        .unwrap();

    let result = engine
        .execute_query(
            &space,
            "SELECT ?o WHERE { GRAPH <http://example.com/g1> { ?s ?p ?o . FILTER(?o > 1) } }",
            &QueryOptions::default(),
        )
        .await
        .unwrap();
    match &result {
        QueryResult::Bindings { rows, .. } => assert_eq!(rows.len(), 1),
        _ => panic!("expected bindings"),
    }
    assert_eq!(text_at(&result, 0, 0), "2");

    engine.drop_space(&space).await.unwrap();
}

#[tokio::test]
async fn scenario_3_optional_with_missing_side() {
    let Some(engine) = common::connect().await else { return };
    let space = common::unique_space("sc3");
    engine.create_space(&space).await.unwrap();

    engine
        .insert_quads(
            &space,
            &[Quad::in_default_graph(
                Term::uri("http://example.com/x"),
                Term::uri("http://example.com/name"),
                Term::plain_literal("X"),
            )],
        )
        .await
        .unwrap();

    let result = engine
        .execute_query(
            &space,
            "SELECT ?n ?e WHERE { ?x <http://example.com/name> ?n OPTIONAL { ?x <http://example.com/email> ?e } }",
            &QueryOptions::default(),
        )
        .await
        .unwrap();
    match &result {
        QueryResult::Bindings { vars, rows, .. } => {
            assert_eq!(rows.len(), 1);
            let n_col = vars.iter().position(|v| v == "n").unwrap();
            let e_col = vars.iter().position(|v| v == "e").unwrap();
            assert_eq!(rows[0][n_col].as_ref().unwrap().text, "X");
            assert!(rows[0][e_col].is_none(), "?e must be unbound");
        }
        _ => panic!("expected bindings"),
    }

    engine.drop_space(&space).await.unwrap();
}

#[tokio::test]
async fn scenario_4_union() {
    let Some(engine) = common::connect().await else { return };
    let space = common::unique_space("sc4");
    engine.create_space(&space).await.unwrap();

    engine
        .insert_quads(
            &space,
            &[
                Quad::in_default_graph(
                    Term::uri("http://example.com/a"),
                    Term::uri("http://example.com/type"),
                    Term::uri("http://example.com/T1"),
                ),
                Quad::in_default_graph(
                    Term::uri("http://example.com/b"),
                    Term::uri("http://example.com/type"),
                    Term::uri("http://example.com/T2"),
                ),
            ],
        )
        .await
        .unwrap();

    let result = engine
        .execute_query(
            &space,
            "SELECT ?s WHERE { { ?s <http://example.com/type> <http://example.com/T1> } \
             UNION { ?s <http://example.com/type> <http://example.com/T2> } }",
            &QueryOptions::default(),
        )
        .await
        .unwrap();
    match &result {
        QueryResult::Bindings { rows, .. } => {
            let mut subjects: Vec<String> = rows
                .iter()
                .map(|row| row[0].as_ref().unwrap().text.clone())
                .collect();
            subjects.sort();
            assert_eq!(
                subjects,
                vec!["http://example.com/a".to_string(), "http://example.com/b".to_string()]
            );
        }
        _ => panic!("expected bindings"),
    }

    engine.drop_space(&space).await.unwrap();
}

#[tokio::test]
async fn scenario_5_transitive_path() {
    let Some(engine) = common::connect().await else { return };
    let space = common::unique_space("sc5");
    engine.create_space(&space).await.unwrap();

    engine
        .insert_quads(
            &space,
            &[
                Quad::in_default_graph(
                    Term::uri("http://example.com/a"),
                    Term::uri("http://example.com/knows"),
                    Term::uri("http://example.com/b"),
                ),
                Quad::in_default_graph(
                    Term::uri("http://example.com/b"),
                    Term::uri("http://example.com/knows"),
                    Term::uri("http://example.com/c"),
                ),
                Quad::in_default_graph(
                    Term::uri("http://example.com/c"),
                    Term::uri("http://example.com/knows"),
                    Term::uri("http://example.com/d"),
                ),
            ],
        )
        .await
        .unwrap();

    let result = engine
        .execute_query(
            &space,
            "SELECT ?y WHERE { <http://example.com/a> <http://example.com/knows>+ ?y }",
            &QueryOptions::default(),
        )
        .await
        .unwrap();
    match &result {
        QueryResult::Bindings { rows, .. } => {
            let mut ys: Vec<String> = rows.iter().map(|row| row[0].as_ref().unwrap().text.clone()).collect();
            ys.sort();
            assert_eq!(
                ys,
                vec![
                    "http://example.com/b".to_string(),
                    "http://example.com/c".to_string(),
                    "http://example.com/d".to_string(),
                ]
            );
            assert!(!ys.contains(&"http://example.com/a".to_string()));
        }
        _ => panic!("expected bindings"),
    }

    engine.drop_space(&space).await.unwrap();
}

#[tokio::test]
async fn scenario_6_delete_where() {
    let Some(engine) = common::connect().await else { return };
    let space = common::unique_space("sc6");
    engine.create_space(&space).await.unwrap();

    let g1 = Term::uri("http://example.com/g1");
    engine
        .insert_quads(
            &space,
            &[
                Quad::new(
                    Term::uri("http://example.com/a"),
                    Term::uri("http://example.com/p"),
                    Term::typed_literal("1", "http://www.w3.org/2001/XMLSchema#integer"),
                    g1.clone(),
                ),
                Quad::new(
                    Term::uri("http://example.com/a"),
                    Term::uri("http://example.com/p"),
                    Term::typed_literal("2", "http://www.w3.org/2001/XMLSchema#integer"),
                    g1.clone(),
                ),
            ],
        )
        .await
        .unwrap();

    let outcome = engine
        .execute_update(
            &space,
            "DELETE WHERE { GRAPH <http://example.com/g1> { ?s ?p ?o . FILTER(?o > 1) } }",
        )
        .await
        .unwrap();
    assert_eq!(outcome.deleted, 1);

    let result = engine
        .execute_query(
            &space,
            "SELECT (COUNT(*) AS ?n) WHERE { GRAPH <http://example.com/g1> { ?s ?p ?o } }",
            &QueryOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(text_at(&result, 0, 0), "1");

    engine.drop_space(&space).await.unwrap();
}
