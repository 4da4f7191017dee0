//! In-memory reference store
//!
//! Committed data lives in one table per entity type behind an `RwLock`.
//! `begin` snapshots the committed tables into a per-session working set;
//! reads and writes inside the transaction hit the working set, `commit`
//! publishes the tables the transaction wrote to and `rollback` drops the
//! working set. Outside a transaction writes go straight to the committed
//! tables.
//!
//! Tables are `BTreeMap`s keyed by id, so store order is id order.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::config::StoreConfig;
use crate::entity::Entity;
use crate::query::Predicate;
use crate::store::{Session, StorageError, Store, StoreOperation, StoreResult};

trait AnyTable: Send + Sync {
    fn clone_box(&self) -> Box<dyn AnyTable>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Table<T: Entity> {
    rows: BTreeMap<T::Id, T>,
}

impl<T: Entity> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<T: Entity> AnyTable for Table<T> {
    fn clone_box(&self) -> Box<dyn AnyTable> {
        Box::new(Self {
            rows: self.rows.clone(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
struct Tables {
    by_type: HashMap<TypeId, Box<dyn AnyTable>>,
}

impl Tables {
    fn get<T: Entity>(&self) -> Option<&Table<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|table| table.as_any().downcast_ref())
    }

    fn get_or_create<T: Entity>(&mut self) -> &mut Table<T> {
        self.by_type
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Table::<T>::default()))
            .as_any_mut()
            .downcast_mut()
            .expect("tables are keyed by their own TypeId")
    }

    fn take(&mut self, type_id: &TypeId) -> Option<Box<dyn AnyTable>> {
        self.by_type.remove(type_id)
    }
}

impl Clone for Tables {
    fn clone(&self) -> Self {
        Self {
            by_type: self
                .by_type
                .iter()
                .map(|(type_id, table)| (*type_id, table.clone_box()))
                .collect(),
        }
    }
}

struct MemoryInner {
    committed: RwLock<Tables>,
    latency: Duration,
    next_session_id: AtomicU64,
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
}

/// Thread-safe in-memory store
///
/// Cloning is cheap and every clone shares the same data.
///
/// # Example
///
/// ```rust,ignore
/// use crudcore::store::{MemoryStore, Session, Store};
///
/// let store = MemoryStore::new();
/// store.seed(vec![alice, bob])?;
///
/// let session = store.open_session()?;
/// assert_eq!(session.count(&Predicate::<User>::always())?, 2);
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    /// Create an empty store with no simulated latency
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Create an empty store whose async calls sleep for `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                committed: RwLock::new(Tables::default()),
                latency,
                next_session_id: AtomicU64::new(1),
                sessions_opened: AtomicU64::new(0),
                sessions_closed: AtomicU64::new(0),
            }),
        }
    }

    /// Create an empty store from configuration
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::with_latency(Duration::from_millis(config.simulated_latency_ms))
    }

    /// Commit records directly, bypassing sessions
    ///
    /// Existing records with the same id are replaced.
    pub fn seed<T: Entity>(&self, entities: impl IntoIterator<Item = T>) -> StoreResult<()> {
        let mut committed = self
            .inner
            .committed
            .write()
            .map_err(|_| StorageError::lock_poisoned(StoreOperation::Insert))?;
        let table = committed.get_or_create::<T>();
        for entity in entities {
            table.rows.insert(entity.id().clone(), entity);
        }
        Ok(())
    }

    /// Number of committed records of one type
    pub fn committed_count<T: Entity>(&self) -> StoreResult<usize> {
        let committed = self
            .inner
            .committed
            .read()
            .map_err(|_| StorageError::lock_poisoned(StoreOperation::Count))?;
        Ok(committed.get::<T>().map_or(0, |table| table.rows.len()))
    }

    /// Sessions opened and not yet closed
    pub fn open_sessions(&self) -> u64 {
        self.sessions_opened() - self.sessions_closed()
    }

    /// Sessions opened since the store was created
    pub fn sessions_opened(&self) -> u64 {
        self.inner.sessions_opened.load(Ordering::SeqCst)
    }

    /// Sessions closed since the store was created
    pub fn sessions_closed(&self) -> u64 {
        self.inner.sessions_closed.load(Ordering::SeqCst)
    }

    /// Simulated round-trip latency of async calls
    pub fn latency(&self) -> Duration {
        self.inner.latency
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("latency", &self.inner.latency)
            .field("open_sessions", &self.open_sessions())
            .finish_non_exhaustive()
    }
}

impl Store for MemoryStore {
    type Session = MemorySession;

    fn open_session(&self) -> StoreResult<MemorySession> {
        let id = self.inner.next_session_id.fetch_add(1, Ordering::SeqCst);
        self.inner.sessions_opened.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(session_id = id, "memory session opened");
        Ok(MemorySession {
            id,
            inner: Arc::clone(&self.inner),
            state: Mutex::new(SessionState::default()),
        })
    }
}

#[derive(Default)]
struct SessionState {
    working: Option<Tables>,
    touched: HashSet<TypeId>,
    closed: bool,
}

/// Session over a [`MemoryStore`]
///
/// Dropping an open session closes it and discards any open transaction.
pub struct MemorySession {
    id: u64,
    inner: Arc<MemoryInner>,
    state: Mutex<SessionState>,
}

impl MemorySession {
    /// Session number, unique per store
    pub fn id(&self) -> u64 {
        self.id
    }

    fn lock(&self, operation: StoreOperation) -> StoreResult<std::sync::MutexGuard<'_, SessionState>> {
        let state = self
            .state
            .lock()
            .map_err(|_| StorageError::lock_poisoned(operation))?;
        if state.closed {
            return Err(StorageError::session_closed(operation));
        }
        Ok(state)
    }

    fn read<T, R>(&self, operation: StoreOperation, f: impl FnOnce(Option<&Table<T>>) -> R) -> StoreResult<R>
    where
        T: Entity,
    {
        let state = self.lock(operation)?;
        if let Some(working) = &state.working {
            return Ok(f(working.get::<T>()));
        }
        drop(state);

        let committed = self
            .inner
            .committed
            .read()
            .map_err(|_| StorageError::lock_poisoned(operation))?;
        Ok(f(committed.get::<T>()))
    }

    fn write<T, R>(
        &self,
        operation: StoreOperation,
        f: impl FnOnce(&mut Table<T>) -> StoreResult<R>,
    ) -> StoreResult<R>
    where
        T: Entity,
    {
        let mut state = self.lock(operation)?;
        let state = &mut *state;
        if let Some(working) = state.working.as_mut() {
            state.touched.insert(TypeId::of::<T>());
            return f(working.get_or_create::<T>());
        }

        let mut committed = self
            .inner
            .committed
            .write()
            .map_err(|_| StorageError::lock_poisoned(operation))?;
        f(committed.get_or_create::<T>())
    }

    async fn round_trip(&self) {
        if self.inner.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.inner.latency).await;
        }
    }
}

impl fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySession")
            .field("id", &self.id)
            .field("in_transaction", &self.in_transaction())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session for MemorySession {
    fn begin(&self) -> StoreResult<()> {
        let mut state = self.lock(StoreOperation::Begin)?;
        if state.working.is_some() {
            return Err(StorageError::transaction_failed(
                StoreOperation::Begin,
                "transaction already open",
            ));
        }
        let snapshot = self
            .inner
            .committed
            .read()
            .map_err(|_| StorageError::lock_poisoned(StoreOperation::Begin))?
            .clone();
        state.working = Some(snapshot);
        state.touched.clear();
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        let mut state = self.lock(StoreOperation::Commit)?;
        let Some(mut working) = state.working.take() else {
            return Err(StorageError::transaction_failed(
                StoreOperation::Commit,
                "no open transaction",
            ));
        };
        let touched = std::mem::take(&mut state.touched);

        let mut committed = self
            .inner
            .committed
            .write()
            .map_err(|_| StorageError::lock_poisoned(StoreOperation::Commit))?;
        for type_id in touched {
            if let Some(table) = working.take(&type_id) {
                committed.by_type.insert(type_id, table);
            }
        }
        Ok(())
    }

    fn rollback(&self) -> StoreResult<()> {
        let mut state = self.lock(StoreOperation::Rollback)?;
        if state.working.take().is_none() {
            return Err(StorageError::transaction_failed(
                StoreOperation::Rollback,
                "no open transaction",
            ));
        }
        state.touched.clear();
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StorageError::lock_poisoned(StoreOperation::Close))?;
        if state.closed {
            return Ok(());
        }
        if state.working.take().is_some() {
            tracing::debug!(session_id = self.id, "open transaction discarded on close");
        }
        state.touched.clear();
        state.closed = true;
        self.inner.sessions_closed.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(session_id = self.id, "memory session closed");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.working.is_some())
            .unwrap_or(false)
    }

    fn is_closed(&self) -> bool {
        self.state.lock().map(|state| state.closed).unwrap_or(true)
    }

    fn find<T: Entity>(&self, id: &T::Id) -> StoreResult<Option<T>> {
        self.read::<T, _>(StoreOperation::Find, |table| {
            table.and_then(|t| t.rows.get(id).cloned())
        })
    }

    fn query<T: Entity>(&self, predicate: &Predicate<T>) -> StoreResult<Vec<T>> {
        self.read::<T, _>(StoreOperation::Query, |table| {
            table
                .map(|t| {
                    t.rows
                        .values()
                        .filter(|entity| predicate.evaluate(entity))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    fn count<T: Entity>(&self, predicate: &Predicate<T>) -> StoreResult<usize> {
        self.read::<T, _>(StoreOperation::Count, |table| {
            table.map_or(0, |t| {
                t.rows.values().filter(|entity| predicate.evaluate(entity)).count()
            })
        })
    }

    fn insert<T: Entity>(&self, entity: T) -> StoreResult<()> {
        self.write::<T, _>(StoreOperation::Insert, |table| {
            if table.rows.contains_key(entity.id()) {
                return Err(StorageError::conflict(
                    StoreOperation::Insert,
                    format!("{} {} already stored", T::ENTITY_NAME, entity.id()),
                ));
            }
            table.rows.insert(entity.id().clone(), entity);
            Ok(())
        })
    }

    fn update<T: Entity>(&self, entity: T) -> StoreResult<()> {
        self.write::<T, _>(StoreOperation::Update, |table| {
            match table.rows.get_mut(entity.id()) {
                Some(slot) => {
                    *slot = entity;
                    Ok(())
                }
                None => Err(StorageError::missing(
                    StoreOperation::Update,
                    format!("{} {} is not stored", T::ENTITY_NAME, entity.id()),
                )),
            }
        })
    }

    fn delete<T: Entity>(&self, id: &T::Id) -> StoreResult<bool> {
        self.write::<T, _>(StoreOperation::Delete, |table| Ok(table.rows.remove(id).is_some()))
    }

    async fn find_async<T: Entity>(&self, id: &T::Id) -> StoreResult<Option<T>> {
        self.round_trip().await;
        self.find(id)
    }

    async fn query_async<T: Entity>(&self, predicate: &Predicate<T>) -> StoreResult<Vec<T>> {
        self.round_trip().await;
        self.query(predicate)
    }

    async fn count_async<T: Entity>(&self, predicate: &Predicate<T>) -> StoreResult<usize> {
        self.round_trip().await;
        self.count(predicate)
    }

    async fn insert_async<T: Entity>(&self, entity: T) -> StoreResult<()> {
        self.round_trip().await;
        self.insert(entity)
    }

    async fn update_async<T: Entity>(&self, entity: T) -> StoreResult<()> {
        self.round_trip().await;
        self.update(entity)
    }

    async fn delete_async<T: Entity>(&self, id: &T::Id) -> StoreResult<bool> {
        self.round_trip().await;
        self.delete::<T>(id)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(session_id = self.id, error = %e, "failed to close memory session");
        }
    }
}
