//! # crudcore
//!
//! Data-access core for layered CRUD backends.
//!
//! ## Features
//!
//! - **Unit of work**: one session per logical operation, at most one active
//!   transaction, released exactly once on `dispose` or drop
//! - **Repositories**: read-only and write-capable, with validation and
//!   duplicate probing before any store mutation
//! - **Filter/sort compiler**: client query strings such as
//!   `status:eq:Active;age:ge:18` and `age:desc,id` compiled against an
//!   explicit per-entity field table
//! - **Pluggable stores**: any [`store::Store`] implementation; an in-memory
//!   reference store ships with the crate
//! - **Configuration**: Figment layering of defaults, TOML and environment
//!
//! ## Example
//!
//! ```rust,ignore
//! use crudcore::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let store = MemoryStore::from_config(&config.store);
//!     let factory = UnitOfWorkFactory::from_config(store, &config);
//!
//!     let mut uow = factory.begin_transaction()?;
//!     let users = uow.repository::<User>()?;
//!     users.add(user)?;
//!     let page = users.get_many_and_count(
//!         &GetManyQuery::new().with_filter("status:eq:Active"),
//!         "id",
//!     )?;
//!     uow.commit()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod observability;
pub mod query;
pub mod repository;
pub mod store;
pub mod unit_of_work;

#[cfg(test)]
pub(crate) mod test_support;

pub use entity::Entity;

/// Commonly used types
pub mod prelude {
    pub use crate::config::{Config, RepositoryConfig, ServiceConfig, StoreConfig};
    pub use crate::entity::Entity;
    pub use crate::error::{Error, Result};
    pub use crate::observability::{init_tracing, shutdown_tracing};
    pub use crate::query::{
        FieldKind, FieldTable, FieldValue, FilterExpression, Predicate, RelationalOperator,
        SortCriterion, SortDirection, Sorting,
    };
    pub use crate::repository::{
        FieldError, GetManyAndCountResult, GetManyQuery, ReadOnlyRepository, Repository,
        RepositoryError, RepositoryErrorKind, RepositoryResult, Validator, ValidatorRegistry,
        WriteRepository,
    };
    pub use crate::store::{MemoryStore, Session, StorageError, Store};
    pub use crate::unit_of_work::{TransactionState, UnitOfWork, UnitOfWorkFactory};

    pub use tokio_util::sync::CancellationToken;
}
