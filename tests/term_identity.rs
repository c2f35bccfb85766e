//! Term identity and validation (spec §3): UUID derivation must be
//! deterministic and content-sensitive, and malformed terms must be
//! rejected before they ever reach the database.

use quadstore::{Term, TermKind};

#[test]
fn same_uri_always_derives_the_same_uuid() {
    let a = Term::uri("http://example.com/alice");
    let b = Term::uri("http://example.com/alice");
    assert_eq!(a.uuid(), b.uuid());
}

#[test]
fn different_uris_derive_different_uuids() {
    let a = Term::uri("http://example.com/alice");
    let b = Term::uri("http://example.com/bob");
    assert_ne!(a.uuid(), b.uuid());
}

#[test]
fn a_uri_and_a_literal_with_the_same_text_differ() {
    let uri = Term::uri("42");
    let literal = Term::plain_literal("42");
    assert_ne!(uri.uuid(), literal.uuid());
    assert_eq!(uri.kind, TermKind::Uri);
    assert_eq!(literal.kind, TermKind::Literal);
}

#[test]
fn language_tag_changes_identity() {
    let en = Term::lang_literal("chat", "en");
    let fr = Term::lang_literal("chat", "fr");
    assert_ne!(en.uuid(), fr.uuid());
}

#[test]
fn datatype_changes_identity() {
    let as_int = Term::typed_literal("1", "http://www.w3.org/2001/XMLSchema#integer");
    let as_string = Term::typed_literal("1", "http://www.w3.org/2001/XMLSchema#string");
    assert_ne!(as_int.uuid(), as_string.uuid());
}

#[test]
fn default_graph_is_a_stable_well_known_term() {
    let a = Term::default_graph();
    let b = Term::default_graph();
    assert_eq!(a.uuid(), b.uuid());
    assert_eq!(a.kind, TermKind::Uri);
}

#[test]
fn blank_nodes_are_scoped_by_label() {
    let a = Term::blank("b0");
    let b = Term::blank("b0");
    let c = Term::blank("b1");
    assert_eq!(a.uuid(), b.uuid());
    assert_ne!(a.uuid(), c.uuid());
}

#[test]
fn a_literal_cannot_carry_both_a_language_tag_and_a_datatype() {
    let mut literal = Term::lang_literal("chat", "fr");
    literal.datatype = Some("http://www.w3.org/2001/XMLSchema#string".to_string());
    assert!(literal.validate().is_err());
}

#[test]
fn a_uri_term_must_not_carry_a_language_tag() {
    let mut uri = Term::uri("http://example.com/alice");
    uri.lang = Some("en".to_string());
    assert!(uri.validate().is_err());
}
