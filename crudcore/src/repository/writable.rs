//! Write-capable repository
//!
//! Every mutation runs in the same order:
//!
//! 1. the entity's validator; field errors reject the write with no store access
//! 2. the duplicate check (`add` and `save` only)
//! 3. the store write
//!
//! Nothing is retried. A rejected call leaves the store untouched.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::entity::Entity;
use crate::query::Predicate;
use crate::repository::error::{RepositoryError, RepositoryOperation, RepositoryResult};
use crate::repository::read_only::{cancellable, ReadOnlyRepository, Repository};
use crate::store::Session;

/// Mutating operations over one entity type
///
/// # Example
///
/// ```rust,ignore
/// use crudcore::repository::WriteRepository;
///
/// let repo = uow.repository::<User>()?;
/// match repo.add(user) {
///     Ok(created) => println!("created {}", created.id),
///     Err(e) if e.is_client_error() => println!("rejected: {e}"),
///     Err(e) => return Err(e.into()),
/// }
/// ```
pub trait WriteRepository<T: Entity>: ReadOnlyRepository<T> {
    /// Insert a new entity
    ///
    /// # Errors
    ///
    /// - `Validation` when the validator reports field errors
    /// - `Duplicate` when the id or unique key is already stored
    fn add(&self, entity: T) -> RepositoryResult<T>;

    /// Async form of [`add`](Self::add)
    fn add_async(
        &self,
        entity: T,
        cancel: &CancellationToken,
    ) -> impl Future<Output = RepositoryResult<T>> + Send;

    /// Insert the entity if its id is unseen, otherwise replace it
    ///
    /// # Errors
    ///
    /// - `Validation` when the validator reports field errors
    /// - `Duplicate` when another entity already holds the unique key
    fn save(&self, entity: T) -> RepositoryResult<T>;

    /// Async form of [`save`](Self::save)
    fn save_async(
        &self,
        entity: T,
        cancel: &CancellationToken,
    ) -> impl Future<Output = RepositoryResult<T>> + Send;

    /// Delete a stored entity
    ///
    /// # Errors
    ///
    /// - `Validation` when the validator reports field errors
    /// - `NotFound` when the entity's id is not stored
    fn delete(&self, entity: &T) -> RepositoryResult<()>;

    /// Async form of [`delete`](Self::delete)
    fn delete_async(
        &self,
        entity: &T,
        cancel: &CancellationToken,
    ) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Delete by id without validation, failing with `NotFound` on a miss
    fn delete_by_id(&self, id: &T::Id) -> RepositoryResult<()>;
}

fn same_unique_key<T: Entity>(key: String) -> Predicate<T> {
    Predicate::new(move |candidate: &T| candidate.unique_key() == key)
}

impl<T: Entity, S: Session> Repository<T, S> {
    fn validate(&self, entity: &T, operation: RepositoryOperation) -> RepositoryResult<()> {
        let field_errors = self.validator().validate(entity);
        if field_errors.is_empty() {
            return Ok(());
        }
        tracing::warn!(
            entity = T::ENTITY_NAME,
            id = %entity.id(),
            %operation,
            errors = field_errors.len(),
            "write rejected by validator"
        );
        Err(RepositoryError::validation(field_errors))
    }

    fn duplicate(&self, entity: &T, key: String, operation: RepositoryOperation) -> RepositoryError {
        tracing::warn!(
            entity = T::ENTITY_NAME,
            id = %entity.id(),
            %operation,
            key = %key,
            "write rejected as duplicate"
        );
        RepositoryError::duplicate(T::ENTITY_NAME, key)
    }

    fn not_found(&self, id: &T::Id) -> RepositoryError {
        RepositoryError::not_found(T::ENTITY_NAME, id.to_string())
    }

    /// First stored entity holding `key` other than the one with `id`
    fn key_holder(holders: Vec<T>, id: &T::Id) -> Option<T> {
        holders.into_iter().find(|holder| holder.id() != id)
    }
}

impl<T: Entity, S: Session> WriteRepository<T> for Repository<T, S> {
    fn add(&self, entity: T) -> RepositoryResult<T> {
        let session = self.session()?;
        self.validate(&entity, RepositoryOperation::Add)?;

        if session.find::<T>(entity.id())?.is_some() {
            return Err(self.duplicate(&entity, entity.id().to_string(), RepositoryOperation::Add));
        }
        let key = entity.unique_key();
        if session.count(&same_unique_key::<T>(key.clone()))? > 0 {
            return Err(self.duplicate(&entity, key, RepositoryOperation::Add));
        }

        session.insert(entity.clone())?;
        Ok(entity)
    }

    async fn add_async(&self, entity: T, cancel: &CancellationToken) -> RepositoryResult<T> {
        const OP: RepositoryOperation = RepositoryOperation::Add;
        let session = self.session()?;
        self.validate(&entity, OP)?;

        if cancellable(OP, cancel, session.find_async::<T>(entity.id()))
            .await?
            .is_some()
        {
            return Err(self.duplicate(&entity, entity.id().to_string(), OP));
        }
        let key = entity.unique_key();
        let same_key = same_unique_key::<T>(key.clone());
        if cancellable(OP, cancel, session.count_async(&same_key)).await? > 0 {
            return Err(self.duplicate(&entity, key, OP));
        }

        cancellable(OP, cancel, session.insert_async(entity.clone())).await?;
        Ok(entity)
    }

    fn save(&self, entity: T) -> RepositoryResult<T> {
        let session = self.session()?;
        self.validate(&entity, RepositoryOperation::Save)?;

        let key = entity.unique_key();
        let holders = session.query(&same_unique_key::<T>(key.clone()))?;
        if Self::key_holder(holders, entity.id()).is_some() {
            return Err(self.duplicate(&entity, key, RepositoryOperation::Save));
        }

        if session.find::<T>(entity.id())?.is_some() {
            session.update(entity.clone())?;
        } else {
            session.insert(entity.clone())?;
        }
        Ok(entity)
    }

    async fn save_async(&self, entity: T, cancel: &CancellationToken) -> RepositoryResult<T> {
        const OP: RepositoryOperation = RepositoryOperation::Save;
        let session = self.session()?;
        self.validate(&entity, OP)?;

        let key = entity.unique_key();
        let same_key = same_unique_key::<T>(key.clone());
        let holders = cancellable(OP, cancel, session.query_async(&same_key)).await?;
        if Self::key_holder(holders, entity.id()).is_some() {
            return Err(self.duplicate(&entity, key, OP));
        }

        let exists = cancellable(OP, cancel, session.find_async::<T>(entity.id()))
            .await?
            .is_some();
        if exists {
            cancellable(OP, cancel, session.update_async(entity.clone())).await?;
        } else {
            cancellable(OP, cancel, session.insert_async(entity.clone())).await?;
        }
        Ok(entity)
    }

    fn delete(&self, entity: &T) -> RepositoryResult<()> {
        let session = self.session()?;
        self.validate(entity, RepositoryOperation::Delete)?;

        if session.delete::<T>(entity.id())? {
            Ok(())
        } else {
            Err(self.not_found(entity.id()))
        }
    }

    async fn delete_async(&self, entity: &T, cancel: &CancellationToken) -> RepositoryResult<()> {
        const OP: RepositoryOperation = RepositoryOperation::Delete;
        let session = self.session()?;
        self.validate(entity, OP)?;

        if cancellable(OP, cancel, session.delete_async::<T>(entity.id())).await? {
            Ok(())
        } else {
            Err(self.not_found(entity.id()))
        }
    }

    fn delete_by_id(&self, id: &T::Id) -> RepositoryResult<()> {
        if self.session()?.delete::<T>(id)? {
            Ok(())
        } else {
            Err(self.not_found(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::RepositoryConfig;
    use crate::repository::validation::FieldError;
    use crate::store::{MemorySession, MemoryStore, Store};
    use crate::test_support::{sample, subscription, subscription_validator, Subscription};

    struct Fixture {
        store: MemoryStore,
        _session: Arc<MemorySession>,
        repo: Repository<Subscription, MemorySession>,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        store.seed(sample()).unwrap();
        let session = Arc::new(store.open_session().unwrap());
        let repo = Repository::new(
            &session,
            Arc::new(subscription_validator()),
            RepositoryConfig::default(),
        );
        Fixture {
            store,
            _session: session,
            repo,
        }
    }

    fn invalid(id: i64) -> Subscription {
        let mut s = subscription(id, "", "Active");
        s.email = "broken".to_string();
        s
    }

    #[test]
    fn test_add_inserts_and_returns_entity() {
        let f = fixture();
        let added = f.repo.add(subscription(6, "Gina", "Active")).unwrap();
        assert_eq!(added.id, 6);
        assert_eq!(f.repo.count().unwrap(), 6);
        assert_eq!(f.repo.get(&6).unwrap().email, "gina@example.com");
    }

    #[test]
    fn test_add_rejects_invalid_entity_without_writing() {
        let f = fixture();
        let err = f.repo.add(invalid(6)).unwrap_err();
        assert_eq!(
            err,
            RepositoryError::validation(vec![
                FieldError::new("name", "must not be empty"),
                FieldError::new("email", "must contain '@'"),
            ])
        );
        assert!(err.is_client_error());
        assert_eq!(f.repo.count().unwrap(), 5);
    }

    #[test]
    fn test_add_duplicate_unique_key_leaves_count_unchanged() {
        let f = fixture();
        let mut twin = subscription(6, "Alice Again", "Active");
        twin.email = "alice@example.com".to_string();

        let err = f.repo.add(twin).unwrap_err();
        assert_eq!(err, RepositoryError::duplicate("Subscription", "alice@example.com"));
        assert_eq!(f.repo.count().unwrap(), 5);
    }

    #[test]
    fn test_add_duplicate_id() {
        let f = fixture();
        let err = f.repo.add(subscription(1, "Zed", "Active")).unwrap_err();
        assert_eq!(err, RepositoryError::duplicate("Subscription", "1"));
        assert_eq!(f.repo.get(&1).unwrap().name, "Alice");
    }

    #[test]
    fn test_save_inserts_then_updates() {
        let f = fixture();
        f.repo.save(subscription(6, "Gina", "Pending")).unwrap();
        assert_eq!(f.repo.count().unwrap(), 6);

        let mut renamed = f.repo.get(&6).unwrap();
        renamed.status = "Active".to_string();
        f.repo.save(renamed).unwrap();

        assert_eq!(f.repo.count().unwrap(), 6);
        assert_eq!(f.repo.get(&6).unwrap().status, "Active");
    }

    #[test]
    fn test_save_rejects_unique_key_held_by_other_entity() {
        let f = fixture();
        let mut bob = f.repo.get(&3).unwrap();
        bob.email = "dana@example.com".to_string();

        let err = f.repo.save(bob).unwrap_err();
        assert_eq!(err, RepositoryError::duplicate("Subscription", "dana@example.com"));
        assert_eq!(f.repo.get(&3).unwrap().email, "bob@example.org");
    }

    #[test]
    fn test_save_rejects_invalid_entity() {
        let f = fixture();
        assert!(matches!(
            f.repo.save(invalid(1)).unwrap_err(),
            RepositoryError::Validation { .. }
        ));
        assert_eq!(f.repo.get(&1).unwrap().name, "Alice");
    }

    #[test]
    fn test_delete() {
        let f = fixture();
        let dana = f.repo.get(&2).unwrap();
        f.repo.delete(&dana).unwrap();
        assert!(f.repo.find(&2).unwrap().is_none());

        assert_eq!(
            f.repo.delete(&dana).unwrap_err(),
            RepositoryError::not_found("Subscription", "2")
        );
        assert!(matches!(
            f.repo.delete(&invalid(3)).unwrap_err(),
            RepositoryError::Validation { .. }
        ));
        assert!(f.repo.find(&3).unwrap().is_some());
    }

    #[test]
    fn test_delete_by_id() {
        let f = fixture();
        f.repo.delete_by_id(&4).unwrap();
        assert_eq!(f.repo.count().unwrap(), 4);
        assert_eq!(
            f.repo.delete_by_id(&4).unwrap_err(),
            RepositoryError::not_found("Subscription", "4")
        );
        assert_eq!(f.store.committed_count::<Subscription>().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_async_writes() {
        let f = fixture();
        let cancel = CancellationToken::new();

        f.repo
            .add_async(subscription(6, "Gina", "Active"), &cancel)
            .await
            .unwrap();
        assert!(matches!(
            f.repo
                .add_async(subscription(7, "Gina", "Active"), &cancel)
                .await
                .unwrap_err(),
            RepositoryError::Duplicate { .. }
        ));

        let mut gina = f.repo.get(&6).unwrap();
        gina.age = 61;
        f.repo.save_async(gina.clone(), &cancel).await.unwrap();
        assert_eq!(f.repo.get(&6).unwrap().age, 61);

        f.repo.delete_async(&gina, &cancel).await.unwrap();
        assert!(matches!(
            f.repo.delete_async(&gina, &cancel).await.unwrap_err(),
            RepositoryError::NotFound { .. }
        ));
        assert_eq!(f.repo.count().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_cancelled_write_does_not_reach_store() {
        let f = fixture();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = f
            .repo
            .add_async(subscription(6, "Gina", "Active"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RepositoryError::Cancelled {
                operation: RepositoryOperation::Add
            }
        );
        assert_eq!(f.repo.count().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_validation_runs_before_cancellation_check() {
        let f = fixture();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            f.repo.save_async(invalid(6), &cancel).await.unwrap_err(),
            RepositoryError::Validation { .. }
        ));
    }
}
