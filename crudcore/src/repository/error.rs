//! Repository error types
//!
//! Every failure a repository or unit of work can report, grouped into a
//! small set of [`RepositoryErrorKind`] categories so boundary layers can map
//! them to client rejections or server failures.
//!
//! # Example
//!
//! ```rust
//! use crudcore::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::not_found("User", "usr_123");
//! assert_eq!(error.kind(), RepositoryErrorKind::NotFound);
//! assert!(error.is_client_error());
//! assert!(!error.is_retriable());
//! ```

use std::fmt;

use thiserror::Error;

use crate::query::RelationalOperator;
use crate::repository::validation::FieldError;
use crate::store::StorageError;
use crate::unit_of_work::{TransactionOperation, TransactionState};

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Paginated, filtered and sorted listing
    GetManyAndCount,
    /// Finding a single entity by ID
    Get,
    /// Finding entities matching a predicate
    GetWhere,
    /// Counting entities
    Count,
    /// Inserting a new entity
    Add,
    /// Inserting or updating an entity
    Save,
    /// Deleting an entity
    Delete,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetManyAndCount => write!(f, "get_many_and_count"),
            Self::Get => write!(f, "get"),
            Self::GetWhere => write!(f, "get_where"),
            Self::Count => write!(f, "count"),
            Self::Add => write!(f, "add"),
            Self::Save => write!(f, "save"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Validator rejected the entity
    ValidationFailed,
    /// Entity with the same key already exists
    AlreadyExists,
    /// Entity was not found
    NotFound,
    /// Filter string could not be parsed
    MalformedFilter,
    /// Sort string could not be parsed
    MalformedSort,
    /// Query referenced an unregistered field
    UnknownField,
    /// Operator does not apply to the field's kind
    UnsupportedOperator,
    /// Unit of work used in the wrong state
    TransactionState,
    /// Backing store failure
    Storage,
    /// Pending store round trip was cancelled
    Cancelled,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::AlreadyExists => write!(f, "already_exists"),
            Self::NotFound => write!(f, "not_found"),
            Self::MalformedFilter => write!(f, "malformed_filter"),
            Self::MalformedSort => write!(f, "malformed_sort"),
            Self::UnknownField => write!(f, "unknown_field"),
            Self::UnsupportedOperator => write!(f, "unsupported_operator"),
            Self::TransactionState => write!(f, "transaction_state"),
            Self::Storage => write!(f, "storage"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Structured repository error
///
/// Grammar, validation and duplicate errors are raised before any store
/// mutation and always carry the offending field, token or key.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepositoryError {
    /// Validator reported field errors
    #[error("validation failed: {}", describe_field_errors(.field_errors))]
    Validation {
        /// Field-level messages, never empty
        field_errors: Vec<FieldError>,
    },

    /// An entity with the same id or unique key already exists
    #[error("{entity} already exists [key: {key}]")]
    Duplicate {
        /// Entity type name
        entity: &'static str,
        /// Colliding key
        key: String,
    },

    /// No entity with the given id
    #[error("{entity} not found [id: {id}]")]
    NotFound {
        /// Entity type name
        entity: &'static str,
        /// Requested id
        id: String,
    },

    /// Filter string violates the grammar
    #[error("malformed filter near '{token}'")]
    MalformedFilter {
        /// Offending clause or value
        token: String,
    },

    /// Sort string violates the grammar
    #[error("malformed sort token '{token}'")]
    MalformedSort {
        /// Offending token
        token: String,
    },

    /// Field is not registered for filtering or sorting
    #[error("unknown field '{field}'")]
    UnknownField {
        /// Requested field name
        field: String,
    },

    /// Operator cannot be applied to the field's kind
    #[error("operator '{operator}' is not supported for field '{field}'")]
    UnsupportedOperator {
        /// Field name
        field: String,
        /// Rejected operator
        operator: RelationalOperator,
    },

    /// Unit of work state machine misuse
    #[error("cannot {attempted} while unit of work is {state}")]
    TransactionState {
        /// Attempted transition or access
        attempted: TransactionOperation,
        /// State at the time of the attempt
        state: TransactionState,
    },

    /// Backing store failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Store round trip aborted by the caller's cancellation token
    #[error("{operation} cancelled before the store responded")]
    Cancelled {
        /// Operation that was cancelled
        operation: RepositoryOperation,
    },
}

fn describe_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl RepositoryError {
    /// Create a validation error from field errors
    pub fn validation(field_errors: Vec<FieldError>) -> Self {
        Self::Validation { field_errors }
    }

    /// Create a duplicate-key error
    pub fn duplicate(entity: &'static str, key: impl Into<String>) -> Self {
        Self::Duplicate {
            entity,
            key: key.into(),
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create a malformed filter error
    pub fn malformed_filter(token: impl Into<String>) -> Self {
        Self::MalformedFilter {
            token: token.into(),
        }
    }

    /// Create a malformed sort error
    pub fn malformed_sort(token: impl Into<String>) -> Self {
        Self::MalformedSort {
            token: token.into(),
        }
    }

    /// Create an unknown field error
    pub fn unknown_field(field: impl Into<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
        }
    }

    /// Create an unsupported operator error
    pub fn unsupported_operator(field: impl Into<String>, operator: RelationalOperator) -> Self {
        Self::UnsupportedOperator {
            field: field.into(),
            operator,
        }
    }

    /// Create a transaction state error
    pub fn transaction_state(attempted: TransactionOperation, state: TransactionState) -> Self {
        Self::TransactionState { attempted, state }
    }

    /// Category of this error
    pub fn kind(&self) -> RepositoryErrorKind {
        match self {
            Self::Validation { .. } => RepositoryErrorKind::ValidationFailed,
            Self::Duplicate { .. } => RepositoryErrorKind::AlreadyExists,
            Self::NotFound { .. } => RepositoryErrorKind::NotFound,
            Self::MalformedFilter { .. } => RepositoryErrorKind::MalformedFilter,
            Self::MalformedSort { .. } => RepositoryErrorKind::MalformedSort,
            Self::UnknownField { .. } => RepositoryErrorKind::UnknownField,
            Self::UnsupportedOperator { .. } => RepositoryErrorKind::UnsupportedOperator,
            Self::TransactionState { .. } => RepositoryErrorKind::TransactionState,
            Self::Storage(_) => RepositoryErrorKind::Storage,
            Self::Cancelled { .. } => RepositoryErrorKind::Cancelled,
        }
    }

    /// Check if this error is retriable (transient store errors only)
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_transient())
    }

    /// Check if the caller's input caused the error
    ///
    /// Client errors map to rejection responses; everything else is a
    /// server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            RepositoryErrorKind::ValidationFailed
                | RepositoryErrorKind::AlreadyExists
                | RepositoryErrorKind::NotFound
                | RepositoryErrorKind::MalformedFilter
                | RepositoryErrorKind::MalformedSort
                | RepositoryErrorKind::UnknownField
                | RepositoryErrorKind::UnsupportedOperator
        )
    }
}
