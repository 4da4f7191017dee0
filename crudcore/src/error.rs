//! Crate-level error type
//!
//! Repository operations return [`RepositoryError`] directly. [`Error`] is the
//! wider type for setup code that also loads configuration and installs
//! logging.

use thiserror::Error;

use crate::repository::RepositoryError;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Configuration loaded but violates a constraint
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Repository or unit of work failure
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}
