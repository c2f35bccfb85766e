//! Crate-wide error type (spec §7).
//!
//! Every component propagates failures to the Core API boundary unchanged
//! in kind, per §7's propagation policy: "No error is swallowed."
//! `ConstraintViolation` on `insert_quads` is the one exception (converted
//! to a silent skipped-duplicate inside the store, see `store.rs`).

use std::fmt;

/// The error kinds named in spec §7.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid term: {0}")]
    InvalidTerm(String),

    #[error("unknown space: {0}")]
    UnknownSpace(String),

    #[error("unknown graph: {0}")]
    UnknownGraph(String),

    #[error("SPARQL parse error: {0}")]
    ParseError(String),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("translation error: {0}")]
    TranslationError(String),

    #[error("query too complex: {0}")]
    QueryTooComplex(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Short machine-readable name of the error kind, used in logs and by
    /// callers that branch on kind without matching the whole enum.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier(_) => "InvalidIdentifier",
            Self::InvalidTerm(_) => "InvalidTerm",
            Self::UnknownSpace(_) => "UnknownSpace",
            Self::UnknownGraph(_) => "UnknownGraph",
            Self::ParseError(_) => "ParseError",
            Self::UnsupportedFeature(_) => "UnsupportedFeature",
            Self::TranslationError(_) => "TranslationError",
            Self::QueryTooComplex(_) => "QueryTooComplex",
            Self::Cancelled(_) => "Cancelled",
            Self::StorageError(_) => "StorageError",
            Self::ConstraintViolation(_) => "ConstraintViolation",
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(db_err.message().to_string())
            }
            _ => Self::StorageError(e.to_string()),
        }
    }
}

impl From<spargebra::ParseError> for EngineError {
    fn from(e: spargebra::ParseError) -> Self {
        Self::ParseError(e.to_string())
    }
}

/// A human message paired with the offending variable, for
/// `TranslationError`'s "unbound-before-use" case (§4.6.15).
pub(crate) fn translation_error(message: impl fmt::Display, variable: &str) -> EngineError {
    EngineError::TranslationError(format!("{message} (variable: ?{variable})"))
}
