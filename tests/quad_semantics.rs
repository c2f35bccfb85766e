//! Quad-set semantics (spec §8 "Quad-set semantics"): inserting the same
//! quad twice increases the row count by exactly one, and deleting by
//! pattern removes exactly the matching rows.

mod common;

use quadstore::{Quad, QuadPattern, Term};

#[tokio::test]
async fn inserting_a_duplicate_quad_increases_the_count_by_one() {
    let Some(engine) = common::connect().await else { return };
    let space = common::unique_space("dupe");
    engine.create_space(&space).await.unwrap();

    let quad = Quad::in_default_graph(
        Term::uri("http://example.com/a"),
        Term::uri("http://example.com/p"),
        Term::plain_literal("1"),
    );

    let first = engine.insert_quads(&space, &[quad.clone()]).await.unwrap();
    let second = engine.insert_quads(&space, &[quad.clone()]).await.unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 0, "duplicate insert must not create a second row");

    engine.drop_space(&space).await.unwrap();
}

#[tokio::test]
async fn deleting_by_pattern_removes_only_the_matching_rows() {
    let Some(engine) = common::connect().await else { return };
    let space = common::unique_space("del");
    engine.create_space(&space).await.unwrap();

    let keep = Quad::in_default_graph(
        Term::uri("http://example.com/a"),
        Term::uri("http://example.com/p"),
        Term::plain_literal("keep"),
    );
    let drop_me = Quad::in_default_graph(
        Term::uri("http://example.com/a"),
        Term::uri("http://example.com/p"),
        Term::plain_literal("drop"),
    );
    engine
        .insert_quads(&space, &[keep.clone(), drop_me.clone()])
        .await
        .unwrap();

    let pattern = QuadPattern {
        subject: Some(drop_me.subject.clone()),
        predicate: Some(drop_me.predicate.clone()),
        object: Some(drop_me.object.clone()),
        context: Some(drop_me.context.clone()),
    };
    let deleted = engine.delete_quads(&space, &pattern).await.unwrap();
    assert_eq!(deleted, 1);

    let result = engine
        .execute_query(
            &space,
            "SELECT (COUNT(*) AS ?n) WHERE { ?s ?p ?o }",
            &Default::default(),
        )
        .await
        .unwrap();
    assert_count(result, 1);

    engine.drop_space(&space).await.unwrap();
}

fn assert_count(result: quadstore::QueryResult, expected: i64) {
    match result {
        quadstore::QueryResult::Bindings { rows, .. } => {
            assert_eq!(rows.len(), 1);
            let n = rows[0][0].as_ref().expect("?n must be bound");
            assert_eq!(n.text, expected.to_string());
        }
        _ => panic!("expected bindings"),
    }
}
