//! Backing-store contract
//!
//! A [`Store`] hands out [`Session`]s. A session is one logical connection:
//! it runs at most one transaction at a time and outside a transaction every
//! write is committed immediately. Repositories only talk to sessions, so any
//! store honoring this contract can back a unit of work.
//!
//! Async methods default to the sync call; stores with a real network round
//! trip override them.
//!
//! # Example
//!
//! ```rust,ignore
//! use crudcore::store::{MemoryStore, Session, Store};
//!
//! let store = MemoryStore::new();
//! let session = store.open_session()?;
//! session.begin()?;
//! session.insert(user)?;
//! session.commit()?;
//! session.close()?;
//! ```

mod error;
pub mod memory;

use std::future::Future;

pub use error::{StorageError, StorageErrorKind, StoreOperation, StoreResult};
pub use memory::{MemorySession, MemoryStore};

use crate::entity::Entity;
use crate::query::Predicate;

/// Source of sessions
pub trait Store: Send + Sync + 'static {
    /// Session type produced by this store
    type Session: Session;

    /// Open a new session
    fn open_session(&self) -> StoreResult<Self::Session>;
}

/// One logical connection to a store
///
/// Records come back in store order. Implementations must make `close`
/// idempotent and release the connection exactly once.
pub trait Session: Send + Sync + 'static {
    /// Start a transaction
    fn begin(&self) -> StoreResult<()>;

    /// Publish the transaction's writes
    fn commit(&self) -> StoreResult<()>;

    /// Discard the transaction's writes
    fn rollback(&self) -> StoreResult<()>;

    /// Release the session, discarding any open transaction
    fn close(&self) -> StoreResult<()>;

    /// Whether a transaction is open
    fn in_transaction(&self) -> bool;

    /// Whether the session has been closed
    fn is_closed(&self) -> bool;

    /// Load one record by id
    fn find<T: Entity>(&self, id: &T::Id) -> StoreResult<Option<T>>;

    /// Load every record satisfying the predicate
    fn query<T: Entity>(&self, predicate: &Predicate<T>) -> StoreResult<Vec<T>>;

    /// Count records satisfying the predicate
    fn count<T: Entity>(&self, predicate: &Predicate<T>) -> StoreResult<usize>;

    /// Insert a record whose id is not yet stored
    fn insert<T: Entity>(&self, entity: T) -> StoreResult<()>;

    /// Replace the stored record with the same id
    fn update<T: Entity>(&self, entity: T) -> StoreResult<()>;

    /// Remove a record, returning whether it existed
    fn delete<T: Entity>(&self, id: &T::Id) -> StoreResult<bool>;

    /// Async form of [`Session::find`]
    fn find_async<T: Entity>(
        &self,
        id: &T::Id,
    ) -> impl Future<Output = StoreResult<Option<T>>> + Send {
        async move { self.find(id) }
    }

    /// Async form of [`Session::query`]
    fn query_async<T: Entity>(
        &self,
        predicate: &Predicate<T>,
    ) -> impl Future<Output = StoreResult<Vec<T>>> + Send {
        async move { self.query(predicate) }
    }

    /// Async form of [`Session::count`]
    fn count_async<T: Entity>(
        &self,
        predicate: &Predicate<T>,
    ) -> impl Future<Output = StoreResult<usize>> + Send {
        async move { self.count(predicate) }
    }

    /// Async form of [`Session::insert`]
    fn insert_async<T: Entity>(&self, entity: T) -> impl Future<Output = StoreResult<()>> + Send {
        async move { self.insert(entity) }
    }

    /// Async form of [`Session::update`]
    fn update_async<T: Entity>(&self, entity: T) -> impl Future<Output = StoreResult<()>> + Send {
        async move { self.update(entity) }
    }

    /// Async form of [`Session::delete`]
    fn delete_async<T: Entity>(
        &self,
        id: &T::Id,
    ) -> impl Future<Output = StoreResult<bool>> + Send {
        async move { self.delete::<T>(id) }
    }
}
