//! C5: SPARQL parsing, delegated entirely to `spargebra` (spec §4.5 "leverage
//! an existing SPARQL parser rather than writing one"). This module is a
//! thin seam so the rest of the crate depends on `ParsedQuery`/`ParsedUpdate`
//! rather than on `spargebra` directly.

use spargebra::{Query, Update};

use crate::error::EngineResult;

/// A parsed SPARQL query, one of SELECT/CONSTRUCT/ASK/DESCRIBE (spec §4.1).
pub struct ParsedQuery {
    pub inner: Query,
}

impl ParsedQuery {
    pub fn parse(text: &str, base_iri: Option<&str>) -> EngineResult<Self> {
        let inner = Query::parse(text, base_iri)?;
        Ok(Self { inner })
    }
}

/// A parsed SPARQL Update request, a sequence of graph-update operations
/// (spec §4.8).
pub struct ParsedUpdate {
    pub inner: Update,
}

impl ParsedUpdate {
    pub fn parse(text: &str, base_iri: Option<&str>) -> EngineResult<Self> {
        let inner = Update::parse(text, base_iri)?;
        Ok(Self { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_select() {
        let parsed = ParsedQuery::parse(
            "SELECT ?s ?p ?o WHERE { ?s ?p ?o }",
            None,
        )
        .unwrap();
        matches!(parsed.inner, Query::Select { .. });
    }

    #[test]
    fn parses_insert_data() {
        let parsed = ParsedUpdate::parse(
            "INSERT DATA { <http://example.com/a> <http://example.com/b> <http://example.com/c> }",
            None,
        )
        .unwrap();
        assert_eq!(parsed.inner.operations.len(), 1);
    }

    #[test]
    fn rejects_malformed_query() {
        assert!(ParsedQuery::parse("SELECT ?s WHERE", None).is_err());
    }
}
