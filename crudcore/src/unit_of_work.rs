//! Transaction-scoped unit of work
//!
//! A [`UnitOfWork`] owns one store session for one logical operation and runs
//! at most one transaction on it at a time:
//!
//! ```text
//! Created ──begin──▶ Active ──commit──▶ Committed ──reset──▶ Active
//!                      │                                      ▲
//!                      └──rollback──▶ RolledBack ──reset──────┘
//!
//! any state ──dispose──▶ Disposed
//! ```
//!
//! Repositories are built lazily, one per entity type, and share the unit of
//! work's session, so they all see its uncommitted writes. Disposal rolls back
//! an open transaction, closes the session and happens exactly once, either
//! explicitly or when the unit of work is dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! use crudcore::prelude::*;
//!
//! let factory = UnitOfWorkFactory::new(MemoryStore::new());
//! let mut uow = factory.begin_transaction()?;
//! uow.repository::<User>()?.add(user)?;
//! uow.commit()?;
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::{Config, RepositoryConfig};
use crate::entity::Entity;
use crate::repository::{Repository, RepositoryError, RepositoryResult, ValidatorRegistry};
use crate::store::{Session, Store};

/// Lifecycle state of a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Session open, no transaction begun yet
    Created,
    /// Transaction in progress
    Active,
    /// Last transaction committed
    Committed,
    /// Last transaction rolled back
    RolledBack,
    /// Session released; terminal
    Disposed,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Active => write!(f, "active"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled back"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

/// Transition or access attempted on a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionOperation {
    /// `begin_transaction`
    Begin,
    /// `commit`
    Commit,
    /// `rollback`
    Rollback,
    /// `reset_transaction`
    Reset,
    /// Repository access or a repository call
    UseSession,
}

impl fmt::Display for TransactionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => write!(f, "begin a transaction"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "roll back"),
            Self::Reset => write!(f, "reset the transaction"),
            Self::UseSession => write!(f, "use the session"),
        }
    }
}

/// One session, at most one active transaction
///
/// State transitions take `&mut self`; create one unit of work per logical
/// operation and never share it between tasks.
pub struct UnitOfWork<S: Session> {
    session: Option<Arc<S>>,
    state: TransactionState,
    repositories: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    validators: Arc<ValidatorRegistry>,
    settings: RepositoryConfig,
}

impl<S: Session> UnitOfWork<S> {
    /// Wrap an open session
    pub fn new(session: S, validators: Arc<ValidatorRegistry>, settings: RepositoryConfig) -> Self {
        Self {
            session: Some(Arc::new(session)),
            state: TransactionState::Created,
            repositories: DashMap::new(),
            validators,
            settings,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Whether a transaction is in progress
    pub fn is_active_transaction(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Whether the unit of work has been disposed
    pub fn is_disposed(&self) -> bool {
        self.state == TransactionState::Disposed
    }

    fn reject(&self, attempted: TransactionOperation) -> RepositoryError {
        tracing::warn!(%attempted, state = %self.state, "invalid unit of work transition");
        RepositoryError::transaction_state(attempted, self.state)
    }

    fn live_session(&self, attempted: TransactionOperation) -> RepositoryResult<&Arc<S>> {
        match (&self.session, self.state) {
            (Some(session), state) if state != TransactionState::Disposed => Ok(session),
            _ => Err(self.reject(attempted)),
        }
    }

    fn transition(&mut self, to: TransactionState) {
        tracing::info!(from = %self.state, to = %to, "unit of work transition");
        self.state = to;
    }

    /// Begin a transaction
    ///
    /// # Errors
    ///
    /// `TransactionState` when a transaction is already active or the unit of
    /// work is disposed.
    pub fn begin_transaction(&mut self) -> RepositoryResult<()> {
        match self.state {
            TransactionState::Created | TransactionState::Committed | TransactionState::RolledBack => {
                self.live_session(TransactionOperation::Begin)?.begin()?;
                self.transition(TransactionState::Active);
                Ok(())
            }
            TransactionState::Active | TransactionState::Disposed => {
                Err(self.reject(TransactionOperation::Begin))
            }
        }
    }

    /// Commit the active transaction
    ///
    /// A store failure leaves the transaction active so it can be rolled back.
    pub fn commit(&mut self) -> RepositoryResult<()> {
        if self.state != TransactionState::Active {
            return Err(self.reject(TransactionOperation::Commit));
        }
        self.live_session(TransactionOperation::Commit)?.commit()?;
        self.transition(TransactionState::Committed);
        Ok(())
    }

    /// Roll back the active transaction
    pub fn rollback(&mut self) -> RepositoryResult<()> {
        if self.state != TransactionState::Active {
            return Err(self.reject(TransactionOperation::Rollback));
        }
        self.live_session(TransactionOperation::Rollback)?.rollback()?;
        self.transition(TransactionState::RolledBack);
        Ok(())
    }

    /// Begin a fresh transaction after a commit or rollback
    pub fn reset_transaction(&mut self) -> RepositoryResult<()> {
        match self.state {
            TransactionState::Committed | TransactionState::RolledBack => {
                self.live_session(TransactionOperation::Reset)?.begin()?;
                self.transition(TransactionState::Active);
                Ok(())
            }
            _ => Err(self.reject(TransactionOperation::Reset)),
        }
    }

    /// Repository for `T` bound to this unit of work's session
    ///
    /// Built on first access and reused for the lifetime of the unit of work.
    pub fn repository<T: Entity>(&self) -> RepositoryResult<Arc<Repository<T, S>>> {
        let session = self.live_session(TransactionOperation::UseSession)?;
        let entry = self
            .repositories
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                tracing::debug!(entity = T::ENTITY_NAME, "repository created");
                Arc::new(Repository::<T, S>::new(
                    session,
                    self.validators.validator_for::<T>(),
                    self.settings.clone(),
                )) as Arc<dyn Any + Send + Sync>
            });
        let repository = Arc::clone(entry.value());
        drop(entry);

        Ok(repository
            .downcast::<Repository<T, S>>()
            .unwrap_or_else(|_| unreachable!("repositories are keyed by their entity TypeId")))
    }

    /// Release the transaction and session
    ///
    /// Rolls back an active transaction, then closes the session. Later calls
    /// are no-ops.
    pub fn dispose(&mut self) -> RepositoryResult<()> {
        if self.state == TransactionState::Disposed {
            return Ok(());
        }
        let was_active = self.state == TransactionState::Active;
        self.transition(TransactionState::Disposed);
        self.repositories.clear();

        let Some(session) = self.session.take() else {
            return Ok(());
        };
        let rolled_back = if was_active { session.rollback() } else { Ok(()) };
        let closed = session.close();
        rolled_back?;
        closed?;
        Ok(())
    }
}

impl<S: Session> Drop for UnitOfWork<S> {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            tracing::error!(error = %e, "failed to dispose unit of work");
        }
    }
}

impl<S: Session> fmt::Debug for UnitOfWork<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("state", &self.state)
            .field("repositories", &self.repositories.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Creates one [`UnitOfWork`] per logical operation
///
/// Holds the store, the validator registry and repository settings.
#[derive(Debug, Clone)]
pub struct UnitOfWorkFactory<St: Store> {
    store: St,
    validators: Arc<ValidatorRegistry>,
    settings: RepositoryConfig,
}

impl<St: Store> UnitOfWorkFactory<St> {
    /// Factory with default settings and no validators
    pub fn new(store: St) -> Self {
        Self {
            store,
            validators: Arc::new(ValidatorRegistry::new()),
            settings: RepositoryConfig::default(),
        }
    }

    /// Factory using the repository section of a loaded configuration
    pub fn from_config(store: St, config: &Config) -> Self {
        Self::new(store).with_settings(config.repository.clone())
    }

    /// Replace the validator registry
    #[must_use]
    pub fn with_validators(mut self, validators: ValidatorRegistry) -> Self {
        self.validators = Arc::new(validators);
        self
    }

    /// Replace the repository settings
    #[must_use]
    pub fn with_settings(mut self, settings: RepositoryConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Open a session and wrap it in a unit of work in the `Created` state
    pub fn begin(&self) -> RepositoryResult<UnitOfWork<St::Session>> {
        let session = self.store.open_session()?;
        Ok(UnitOfWork::new(
            session,
            Arc::clone(&self.validators),
            self.settings.clone(),
        ))
    }

    /// Open a unit of work with a transaction already begun
    pub fn begin_transaction(&self) -> RepositoryResult<UnitOfWork<St::Session>> {
        let mut uow = self.begin()?;
        uow.begin_transaction()?;
        Ok(uow)
    }

    /// Underlying store
    pub fn store(&self) -> &St {
        &self.store
    }

    /// Repository settings handed to every unit of work
    pub fn settings(&self) -> &RepositoryConfig {
        &self.settings
    }
}
