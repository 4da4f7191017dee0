//! Repository abstraction over a unit of work's session
//!
//! # Features
//!
//! - **Paged queries**: [`ReadOnlyRepository::get_many_and_count`] compiles
//!   filter and sort strings and returns one page plus the total match count
//! - **Validated writes**: [`WriteRepository`] runs the entity's [`Validator`]
//!   and a duplicate check before any store mutation
//! - **Cancellation**: every async method takes a `CancellationToken`
//! - **Structured errors**: [`RepositoryError`] with a [`RepositoryErrorKind`]
//!   category for boundary-layer mapping
//!
//! # Example
//!
//! ```rust,ignore
//! use crudcore::repository::{GetManyQuery, ReadOnlyRepository, WriteRepository};
//!
//! let repo = uow.repository::<User>()?;
//! repo.add(new_user)?;
//!
//! let page = repo.get_many_and_count(
//!     &GetManyQuery::new()
//!         .with_filter("status:eq:Active;age:ge:18")
//!         .with_sort("created_at:desc")
//!         .with_page(2)
//!         .with_page_size(20),
//!     "id",
//! )?;
//! ```

mod error;
mod pagination;
mod read_only;
mod validation;
mod writable;

pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult};
pub use pagination::{GetManyAndCountResult, GetManyQuery, Pagination};
pub use read_only::{ReadOnlyRepository, Repository};
pub use validation::{AcceptAll, FieldError, Validator, ValidatorRegistry};
pub use writable::WriteRepository;
