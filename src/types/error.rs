use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors raised by the ledger, the cascade, and the lookup layer.
///
/// None of these are retried internally. Callers are expected to abandon the
/// enclosing transaction, which [`crate::store::Store::transaction`] does by
/// rolling back on any `Err`.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A structural rule of the ledger or a batch contract was broken.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// A registered relation predicate rejected the change.
    #[error("constraint violation on {relation}: '{owner}' may not relate to {other}")]
    ConstraintViolation {
        /// Relation name.
        relation: String,
        /// Owner id.
        owner: String,
        /// Other side id, or `"<none>"` for owned children.
        other: String,
    },
    /// A referenced row could not be resolved.
    #[error("missing reference: {kind} '{id}' not found")]
    MissingReference {
        /// What was being resolved (entity type or relation name).
        kind: String,
        /// The unresolved identifier.
        id: String,
    },
    /// Schema definition rejected.
    #[error("invalid schema: {0}")]
    Schema(String),
    /// Options or configuration file rejected.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    /// Backing store failure.
    #[error("storage: {0}")]
    Storage(#[from] rusqlite::Error),
    /// Attribute payload could not be encoded or decoded.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`LedgerError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`LedgerError::InvariantViolation`].
    InvariantViolation,
    /// See [`LedgerError::ConstraintViolation`].
    ConstraintViolation,
    /// See [`LedgerError::MissingReference`].
    MissingReference,
    /// Schema, storage, serialization, and I/O failures.
    Infrastructure,
}

impl LedgerError {
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        LedgerError::InvariantViolation(message.into())
    }

    pub(crate) fn missing(kind: impl Into<String>, id: impl Into<String>) -> Self {
        LedgerError::MissingReference {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            LedgerError::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            LedgerError::MissingReference { .. } => ErrorKind::MissingReference,
            LedgerError::Schema(_)
            | LedgerError::Config(_)
            | LedgerError::Storage(_)
            | LedgerError::Serialization(_)
            | LedgerError::Io(_) => ErrorKind::Infrastructure,
        }
    }
}
