//! C1 data model: RDF terms and their deterministic UUID addressing (spec §3).

use std::fmt;

use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Fixed namespace UUID terms are hashed under, carried over unchanged from
/// the original system (`vitalgraph/db/postgresql/original/postgresql_utils.py`,
/// `generate_term_uuid`) so UUIDs stay reproducible across implementations.
pub const TERM_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0xa7, 0xb8, 0x10, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30, 0xc8,
]);

/// The well-known context URI representing the SPARQL default graph.
pub const DEFAULT_GRAPH_URI: &str = "urn:quadstore:default-graph";

pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

/// `kind ∈ {URI (U), Literal (L), Blank (B)}` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TermKind {
    Uri,
    Literal,
    Blank,
}

impl TermKind {
    /// The single-character code stored in `term.term_type` (spec §6).
    pub fn code(self) -> char {
        match self {
            Self::Uri => 'U',
            Self::Literal => 'L',
            Self::Blank => 'B',
        }
    }

    pub fn from_code(c: char) -> EngineResult<Self> {
        match c {
            'U' => Ok(Self::Uri),
            'L' => Ok(Self::Literal),
            'B' => Ok(Self::Blank),
            other => Err(EngineError::StorageError(format!(
                "unknown term_type code: {other}"
            ))),
        }
    }
}

impl fmt::Display for TermKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uri => "uri",
            Self::Literal => "literal",
            Self::Blank => "blank",
        })
    }
}

/// An RDF term, as described in spec §3. `datatype` is carried as the
/// datatype's URI here; the registry is responsible for resolving it to a
/// per-space `datatype_id` on write and back on read (§3's `Datatype`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Term {
    pub kind: TermKind,
    pub text: String,
    pub lang: Option<String>,
    pub datatype: Option<String>,
}

impl Term {
    pub fn uri(text: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Uri,
            text: text.into(),
            lang: None,
            datatype: None,
        }
    }

    pub fn blank(text: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Blank,
            text: text.into(),
            lang: None,
            datatype: None,
        }
    }

    pub fn plain_literal(text: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Literal,
            text: text.into(),
            lang: None,
            datatype: Some(XSD_STRING.to_string()),
        }
    }

    pub fn lang_literal(text: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Literal,
            text: text.into(),
            lang: Some(lang.into()),
            datatype: Some(RDF_LANG_STRING.to_string()),
        }
    }

    pub fn typed_literal(text: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            kind: TermKind::Literal,
            text: text.into(),
            lang: None,
            datatype: Some(datatype.into()),
        }
    }

    pub fn default_graph() -> Self {
        Self::uri(DEFAULT_GRAPH_URI)
    }

    /// Validates the combinations §4.1 calls out as `InvalidTerm`: a
    /// lang-tagged literal whose datatype is explicitly set to something
    /// other than `rdf:langString`, or a URI containing characters that make
    /// it unparseable.
    pub fn validate(&self) -> EngineResult<()> {
        match self.kind {
            TermKind::Uri => {
                if self.text.is_empty() || self.text.chars().any(char::is_whitespace) {
                    return Err(EngineError::InvalidTerm(format!(
                        "URI contains disallowed characters: {:?}",
                        self.text
                    )));
                }
            }
            TermKind::Blank => {}
            TermKind::Literal => {
                if let Some(lang) = &self.lang {
                    if lang.is_empty() {
                        return Err(EngineError::InvalidTerm(
                            "language tag must not be empty".to_string(),
                        ));
                    }
                    if let Some(dt) = &self.datatype {
                        if dt != RDF_LANG_STRING {
                            return Err(EngineError::InvalidTerm(format!(
                                "literal with lang {lang:?} must have datatype rdf:langString, got {dt:?}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Converts a parsed SPARQL `NamedNode` constant into a term.
    pub fn from_named_node(node: &spargebra::term::NamedNode) -> Self {
        Self::uri(node.as_str())
    }

    /// Converts a parsed SPARQL `BlankNode` constant into a term. Blank node
    /// identifiers are scoped to one request the way the teacher's stores
    /// treat local identifiers; they are not cross-request-stable unless
    /// the caller arranges otherwise.
    pub fn from_blank_node(node: &spargebra::term::BlankNode) -> Self {
        Self::blank(node.as_str())
    }

    /// Converts a parsed SPARQL `Literal` constant into a term.
    pub fn from_literal(lit: &spargebra::term::Literal) -> Self {
        if let Some(lang) = lit.language() {
            Self::lang_literal(lit.value(), lang)
        } else {
            Self::typed_literal(lit.value(), lit.datatype().as_str())
        }
    }

    /// Converts any constant `TermPattern` (subject/predicate/object
    /// position) into a term; returns `None` for a `Variable`.
    pub fn from_term_pattern(pattern: &spargebra::term::TermPattern) -> Option<Self> {
        match pattern {
            spargebra::term::TermPattern::NamedNode(n) => Some(Self::from_named_node(n)),
            spargebra::term::TermPattern::BlankNode(b) => Some(Self::from_blank_node(b)),
            spargebra::term::TermPattern::Literal(l) => Some(Self::from_literal(l)),
            spargebra::term::TermPattern::Variable(_) => None,
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// Converts a `NamedNodePattern` (predicate position) into a term;
    /// `None` for a `Variable`.
    pub fn from_named_node_pattern(pattern: &spargebra::term::NamedNodePattern) -> Option<Self> {
        match pattern {
            spargebra::term::NamedNodePattern::NamedNode(n) => Some(Self::from_named_node(n)),
            spargebra::term::NamedNodePattern::Variable(_) => None,
        }
    }

    /// Converts an `INSERT DATA` object position (`spargebra::term::Term`,
    /// distinct from this crate's own `Term`) into a term.
    pub fn from_rdf_term(term: &spargebra::term::Term) -> Self {
        match term {
            spargebra::term::Term::NamedNode(n) => Self::from_named_node(n),
            spargebra::term::Term::BlankNode(b) => Self::from_blank_node(b),
            spargebra::term::Term::Literal(l) => Self::from_literal(l),
            #[allow(unreachable_patterns)]
            _ => Self::uri("urn:quadstore:unsupported-rdf-term"),
        }
    }

    /// Converts an `INSERT DATA` subject (URI or blank node) into a term.
    pub fn from_subject(subject: &spargebra::term::Subject) -> Self {
        match subject {
            spargebra::term::Subject::NamedNode(n) => Self::from_named_node(n),
            spargebra::term::Subject::BlankNode(b) => Self::from_blank_node(b),
            #[allow(unreachable_patterns)]
            _ => Self::blank("unsupported-subject"),
        }
    }

    /// Converts a `DELETE DATA` subject into a term; ground subjects are
    /// restricted to URIs by the SPARQL grammar (no blank nodes in DELETE
    /// DATA, since they could never match anything already stored).
    pub fn from_ground_subject(subject: &spargebra::term::GroundSubject) -> Self {
        match subject {
            spargebra::term::GroundSubject::NamedNode(n) => Self::from_named_node(n),
            #[allow(unreachable_patterns)]
            _ => Self::uri("urn:quadstore:unsupported-ground-subject"),
        }
    }

    /// Converts a ground (variable-free) object term, as seen in `DELETE DATA`.
    pub fn from_ground_term(term: &spargebra::term::GroundTerm) -> Self {
        match term {
            spargebra::term::GroundTerm::NamedNode(n) => Self::from_named_node(n),
            spargebra::term::GroundTerm::Literal(l) => Self::from_literal(l),
            #[allow(unreachable_patterns)]
            _ => Self::uri("urn:quadstore:unsupported-ground-term"),
        }
    }

    /// Converts a ground term pattern (object position of a DELETE
    /// template); `None` for a `Variable`.
    pub fn from_ground_term_pattern(pattern: &spargebra::term::GroundTermPattern) -> Option<Self> {
        match pattern {
            spargebra::term::GroundTermPattern::NamedNode(n) => Some(Self::from_named_node(n)),
            spargebra::term::GroundTermPattern::Literal(l) => Some(Self::from_literal(l)),
            spargebra::term::GroundTermPattern::Variable(_) => None,
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// Converts a `GraphName` (INSERT DATA's per-quad graph) into a term;
    /// the default graph maps to the well-known default-graph term.
    pub fn from_graph_name(name: &spargebra::term::GraphName) -> Self {
        match name {
            spargebra::term::GraphName::NamedNode(n) => Self::from_named_node(n),
            spargebra::term::GraphName::DefaultGraph => Self::default_graph(),
        }
    }

    /// Converts a `GraphNamePattern` (WHERE-clause graph position) into a
    /// term; `None` for a `Variable`.
    pub fn from_graph_name_pattern(pattern: &spargebra::term::GraphNamePattern) -> Option<Self> {
        match pattern {
            spargebra::term::GraphNamePattern::NamedNode(n) => Some(Self::from_named_node(n)),
            spargebra::term::GraphNamePattern::DefaultGraph => Some(Self::default_graph()),
            spargebra::term::GraphNamePattern::Variable(_) => None,
        }
    }

    /// Deterministic UUID derivation (spec §3, §11): UUIDv5 over
    /// `TERM_NAMESPACE` and the NUL-joined tuple `(text, kind, lang?, datatype?)`.
    pub fn uuid(&self) -> Uuid {
        let mut parts = vec![self.text.as_str(), match self.kind {
            TermKind::Uri => "U",
            TermKind::Literal => "L",
            TermKind::Blank => "B",
        }];
        let lang_part;
        if let Some(lang) = &self.lang {
            lang_part = format!("lang:{lang}");
            parts.push(&lang_part);
        }
        let datatype_part;
        if let Some(datatype) = &self.datatype {
            datatype_part = format!("datatype:{datatype}");
            parts.push(&datatype_part);
        }
        let joined = parts.join("\u{0}");
        Uuid::new_v5(&TERM_NAMESPACE, joined.as_bytes())
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TermKind::Uri => write!(f, "<{}>", self.text),
            TermKind::Blank => write!(f, "_:{}", self.text),
            TermKind::Literal => {
                write!(f, "\"{}\"", self.text.replace('"', "\\\""))?;
                if let Some(lang) = &self.lang {
                    write!(f, "@{lang}")
                } else if let Some(dt) = &self.datatype {
                    if dt != XSD_STRING {
                        write!(f, "^^<{dt}>")
                    } else {
                        Ok(())
                    }
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// A registry row for `{prefix}datatype` (spec §3/§6). `rdf:langString` and
/// the XSD primitives are seeded at space creation (`space.rs`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datatype {
    pub datatype_id: i32,
    pub uri: String,
    pub name: Option<String>,
}

/// XSD primitives and `rdf:langString` seeded into every new space's
/// datatype table (spec §3).
pub const SEEDED_DATATYPES: &[(&str, &str)] = &[
    (RDF_LANG_STRING, "langString"),
    (XSD_STRING, "string"),
    ("http://www.w3.org/2001/XMLSchema#boolean", "boolean"),
    ("http://www.w3.org/2001/XMLSchema#integer", "integer"),
    ("http://www.w3.org/2001/XMLSchema#decimal", "decimal"),
    ("http://www.w3.org/2001/XMLSchema#double", "double"),
    ("http://www.w3.org/2001/XMLSchema#float", "float"),
    ("http://www.w3.org/2001/XMLSchema#dateTime", "dateTime"),
    ("http://www.w3.org/2001/XMLSchema#date", "date"),
    ("http://www.w3.org/2001/XMLSchema#anyURI", "anyURI"),
];

/// XSD datatypes the SQL translator treats as numeric for comparison and
/// arithmetic (spec §4.6.6, §4.6.12).
pub const NUMERIC_DATATYPES: &[&str] = &[
    "http://www.w3.org/2001/XMLSchema#integer",
    "http://www.w3.org/2001/XMLSchema#decimal",
    "http://www.w3.org/2001/XMLSchema#double",
    "http://www.w3.org/2001/XMLSchema#float",
    "http://www.w3.org/2001/XMLSchema#int",
    "http://www.w3.org/2001/XMLSchema#long",
    "http://www.w3.org/2001/XMLSchema#short",
    "http://www.w3.org/2001/XMLSchema#nonNegativeInteger",
];

pub fn is_numeric_datatype(uri: &str) -> bool {
    NUMERIC_DATATYPES.contains(&uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_is_deterministic_and_content_sensitive() {
        let a = Term::uri("http://example.com/a");
        let b = Term::uri("http://example.com/a");
        let c = Term::uri("http://example.com/b");
        assert_eq!(a.uuid(), b.uuid());
        assert_ne!(a.uuid(), c.uuid());
    }

    #[test]
    fn uuid_distinguishes_kind_lang_and_datatype() {
        let plain = Term::plain_literal("1");
        let typed = Term::typed_literal("1", "http://www.w3.org/2001/XMLSchema#integer");
        let lang = Term::lang_literal("1", "en");
        let uri = Term::uri("1");
        let blank = Term::blank("1");
        let uuids = [
            plain.uuid(),
            typed.uuid(),
            lang.uuid(),
            uri.uuid(),
            blank.uuid(),
        ];
        for i in 0..uuids.len() {
            for j in (i + 1)..uuids.len() {
                assert_ne!(uuids[i], uuids[j], "terms {i} and {j} collided");
            }
        }
    }

    #[test]
    fn lang_literal_with_conflicting_datatype_is_invalid() {
        let term = Term {
            kind: TermKind::Literal,
            text: "hi".into(),
            lang: Some("en".into()),
            datatype: Some(XSD_STRING.into()),
        };
        assert!(term.validate().is_err());
    }

    #[test]
    fn default_graph_uuid_is_stable() {
        assert_eq!(Term::default_graph().uuid(), Term::default_graph().uuid());
    }
}
