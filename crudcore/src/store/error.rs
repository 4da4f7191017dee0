//! Structured backing-store errors

use std::fmt;

/// Store operation being performed when the error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// Opening a session
    OpenSession,
    /// Beginning a transaction
    Begin,
    /// Committing a transaction
    Commit,
    /// Rolling back a transaction
    Rollback,
    /// Closing a session
    Close,
    /// Looking up one record by id
    Find,
    /// Running a predicate query
    Query,
    /// Counting records
    Count,
    /// Inserting a record
    Insert,
    /// Updating a record
    Update,
    /// Deleting a record
    Delete,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenSession => write!(f, "open_session"),
            Self::Begin => write!(f, "begin"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
            Self::Close => write!(f, "close"),
            Self::Find => write!(f, "find"),
            Self::Query => write!(f, "query"),
            Self::Count => write!(f, "count"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Category of store error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageErrorKind {
    /// Could not reach the store
    ConnectionFailed,
    /// Round trip timed out
    Timeout,
    /// Session was already closed
    SessionClosed,
    /// Transaction bookkeeping mismatch (nested begin, commit without begin)
    TransactionFailed,
    /// Write conflicts with stored data
    Conflict,
    /// Target record does not exist
    Missing,
    /// Internal lock was poisoned by a panicking writer
    LockPoisoned,
    /// Other/unknown error
    Other,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::SessionClosed => write!(f, "session_closed"),
            Self::TransactionFailed => write!(f, "transaction_failed"),
            Self::Conflict => write!(f, "conflict"),
            Self::Missing => write!(f, "missing"),
            Self::LockPoisoned => write!(f, "lock_poisoned"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Opaque store failure with operation context
///
/// Stores translate their native errors into this type so repositories never
/// depend on a concrete driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageError {
    /// The operation being performed when the error occurred
    pub operation: StoreOperation,
    /// The category of error
    pub kind: StorageErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl StorageError {
    /// Create a new store error
    pub fn new(operation: StoreOperation, kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }

    /// Session used after `close`
    pub fn session_closed(operation: StoreOperation) -> Self {
        Self::new(operation, StorageErrorKind::SessionClosed, "session is closed")
    }

    /// Transaction bookkeeping error
    pub fn transaction_failed(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StorageErrorKind::TransactionFailed, message)
    }

    /// Write conflicts with a stored record
    pub fn conflict(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StorageErrorKind::Conflict, message)
    }

    /// Target record does not exist
    pub fn missing(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StorageErrorKind::Missing, message)
    }

    /// Internal lock poisoned
    pub fn lock_poisoned(operation: StoreOperation) -> Self {
        Self::new(operation, StorageErrorKind::LockPoisoned, "store lock poisoned")
    }

    /// Check if this error is transient (may succeed on a later attempt)
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            StorageErrorKind::ConnectionFailed | StorageErrorKind::Timeout
        )
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Store {} error during {}: {}",
            self.kind, self.operation, self.message
        )
    }
}

impl std::error::Error for StorageError {}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_operation_display() {
        assert_eq!(format!("{}", StoreOperation::OpenSession), "open_session");
        assert_eq!(format!("{}", StoreOperation::Query), "query");
        assert_eq!(format!("{}", StoreOperation::Rollback), "rollback");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::conflict(StoreOperation::Insert, "Subscription 7 already stored");
        assert_eq!(
            err.to_string(),
            "Store conflict error during insert: Subscription 7 already stored"
        );
    }

    #[test]
    fn test_is_transient() {
        assert!(StorageError::new(StoreOperation::Query, StorageErrorKind::Timeout, "slow").is_transient());
        assert!(StorageError::new(
            StoreOperation::OpenSession,
            StorageErrorKind::ConnectionFailed,
            "refused"
        )
        .is_transient());
        assert!(!StorageError::session_closed(StoreOperation::Find).is_transient());
        assert!(!StorageError::lock_poisoned(StoreOperation::Commit).is_transient());
    }
}
