//! Read-only repository
//!
//! [`ReadOnlyRepository`] is the query half of the repository contract. Its
//! centerpiece is [`get_many_and_count`](ReadOnlyRepository::get_many_and_count),
//! which compiles caller filter and sort strings, counts the whole matching
//! set and returns one page of it.
//!
//! Traits use RPITIT (Return Position Impl Trait In Traits) for the async
//! forms, so no `async_trait` boxing is needed.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use tokio_util::sync::CancellationToken;

use crate::config::RepositoryConfig;
use crate::entity::Entity;
use crate::query::{FieldTable, FilterExpression, Predicate, Sorting};
use crate::repository::error::{RepositoryError, RepositoryOperation, RepositoryResult};
use crate::repository::pagination::{GetManyAndCountResult, GetManyQuery, Pagination};
use crate::repository::validation::Validator;
use crate::store::{Session, StoreResult};
use crate::unit_of_work::{TransactionOperation, TransactionState};

/// Query operations over one entity type
///
/// # Example
///
/// ```rust,ignore
/// use crudcore::repository::{GetManyQuery, ReadOnlyRepository};
///
/// let page = repo.get_many_and_count(
///     &GetManyQuery::new().with_filter("status:eq:Active").with_page_size(10),
///     "id:asc",
/// )?;
/// println!("{} of {} active", page.items.len(), page.count);
/// ```
pub trait ReadOnlyRepository<T: Entity>: Send + Sync {
    /// Filtered, sorted page plus the size of the whole matching set
    ///
    /// `default_sort` is a sort string used when the query carries none.
    ///
    /// # Errors
    ///
    /// Grammar errors (`MalformedFilter`, `MalformedSort`, `UnknownField`,
    /// `UnsupportedOperator`) surface before the store is queried.
    fn get_many_and_count(
        &self,
        query: &GetManyQuery,
        default_sort: &str,
    ) -> RepositoryResult<GetManyAndCountResult<T>>;

    /// Async form of [`get_many_and_count`](Self::get_many_and_count)
    fn get_many_and_count_async(
        &self,
        query: &GetManyQuery,
        default_sort: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = RepositoryResult<GetManyAndCountResult<T>>> + Send;

    /// Load an entity by id, failing with `NotFound` when it is missing
    fn get(&self, id: &T::Id) -> RepositoryResult<T>;

    /// Async form of [`get`](Self::get)
    fn get_async(
        &self,
        id: &T::Id,
        cancel: &CancellationToken,
    ) -> impl Future<Output = RepositoryResult<T>> + Send;

    /// Load an entity by id
    fn find(&self, id: &T::Id) -> RepositoryResult<Option<T>>;

    /// Async form of [`find`](Self::find)
    fn find_async(
        &self,
        id: &T::Id,
        cancel: &CancellationToken,
    ) -> impl Future<Output = RepositoryResult<Option<T>>> + Send;

    /// Load every entity in store order
    fn get_all(&self) -> RepositoryResult<Vec<T>>;

    /// Load every entity satisfying the predicate, in store order
    fn get_where(&self, predicate: &Predicate<T>) -> RepositoryResult<Vec<T>>;

    /// Async form of [`get_where`](Self::get_where)
    fn get_where_async(
        &self,
        predicate: &Predicate<T>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = RepositoryResult<Vec<T>>> + Send;

    /// Number of stored entities
    fn count(&self) -> RepositoryResult<usize>;

    /// Number of entities satisfying the predicate
    fn count_where(&self, predicate: &Predicate<T>) -> RepositoryResult<usize>;

    /// Async form of [`count_where`](Self::count_where)
    fn count_where_async(
        &self,
        predicate: &Predicate<T>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = RepositoryResult<usize>> + Send;
}

/// Repository bound to one session
///
/// Holds only a weak reference to the session, so it never keeps a disposed
/// unit of work's session alive; every call after disposal fails with
/// `TransactionState`.
pub struct Repository<T: Entity, S: Session> {
    session: Weak<S>,
    fields: &'static FieldTable<T>,
    validator: Arc<dyn Validator<T>>,
    settings: RepositoryConfig,
}

struct QueryPlan<T> {
    predicate: Predicate<T>,
    sorting: Sorting,
    pagination: Pagination,
    page_number: usize,
}

impl<T: Entity, S: Session> Repository<T, S> {
    /// Bind a repository to a session
    pub fn new(session: &Arc<S>, validator: Arc<dyn Validator<T>>, settings: RepositoryConfig) -> Self {
        Self {
            session: Arc::downgrade(session),
            fields: T::fields(),
            validator,
            settings,
        }
    }

    /// Registered filter/sort fields
    pub fn fields(&self) -> &'static FieldTable<T> {
        self.fields
    }

    /// Paging settings
    pub fn settings(&self) -> &RepositoryConfig {
        &self.settings
    }

    pub(crate) fn validator(&self) -> &dyn Validator<T> {
        self.validator.as_ref()
    }

    pub(crate) fn session(&self) -> RepositoryResult<Arc<S>> {
        self.session.upgrade().ok_or_else(|| {
            RepositoryError::transaction_state(
                TransactionOperation::UseSession,
                TransactionState::Disposed,
            )
        })
    }

    fn plan(&self, query: &GetManyQuery, default_sort: &str) -> RepositoryResult<QueryPlan<T>> {
        let expression = match query.filter_str() {
            Some(raw) => FilterExpression::parse(raw, self.fields)?,
            None => FilterExpression::match_all(),
        };
        let predicate = Predicate::build(&expression, self.fields)?;
        let sorting = Sorting::parse_required(query.sort_str().unwrap_or(default_sort), self.fields)?;
        let page_number = query.page_number();
        let pagination = query.pagination(&self.settings);

        tracing::debug!(
            entity = T::ENTITY_NAME,
            filter = %expression,
            sorting = %sorting,
            page = page_number,
            page_size = pagination.limit,
            "compiled paged query"
        );

        Ok(QueryPlan {
            predicate,
            sorting,
            pagination,
            page_number,
        })
    }

    fn paginate(
        &self,
        matches: Vec<T>,
        plan: QueryPlan<T>,
    ) -> RepositoryResult<GetManyAndCountResult<T>> {
        let count = matches.len();
        let sorted = plan.sorting.apply(matches, self.fields)?;
        Ok(GetManyAndCountResult {
            items: plan.pagination.slice(sorted),
            count,
            page_number: plan.page_number,
            page_size: plan.pagination.limit,
            sorting: plan.sorting,
        })
    }
}

/// Race a store round trip against the caller's cancellation token
///
/// Cancellation wins ties. A cancelled round trip is dropped, not rolled back.
pub(crate) async fn cancellable<F, R>(
    operation: RepositoryOperation,
    cancel: &CancellationToken,
    round_trip: F,
) -> RepositoryResult<R>
where
    F: Future<Output = StoreResult<R>>,
{
    tokio::select! {
        biased;

        () = cancel.cancelled() => {
            tracing::debug!(%operation, "store round trip cancelled");
            Err(RepositoryError::Cancelled { operation })
        }
        result = round_trip => result.map_err(RepositoryError::from),
    }
}

impl<T: Entity, S: Session> ReadOnlyRepository<T> for Repository<T, S> {
    fn get_many_and_count(
        &self,
        query: &GetManyQuery,
        default_sort: &str,
    ) -> RepositoryResult<GetManyAndCountResult<T>> {
        let session = self.session()?;
        let plan = self.plan(query, default_sort)?;
        let matches = session.query(&plan.predicate)?;
        self.paginate(matches, plan)
    }

    async fn get_many_and_count_async(
        &self,
        query: &GetManyQuery,
        default_sort: &str,
        cancel: &CancellationToken,
    ) -> RepositoryResult<GetManyAndCountResult<T>> {
        let session = self.session()?;
        let plan = self.plan(query, default_sort)?;
        let matches = cancellable(
            RepositoryOperation::GetManyAndCount,
            cancel,
            session.query_async(&plan.predicate),
        )
        .await?;
        self.paginate(matches, plan)
    }

    fn get(&self, id: &T::Id) -> RepositoryResult<T> {
        self.find(id)?
            .ok_or_else(|| RepositoryError::not_found(T::ENTITY_NAME, id.to_string()))
    }

    async fn get_async(&self, id: &T::Id, cancel: &CancellationToken) -> RepositoryResult<T> {
        let session = self.session()?;
        cancellable(RepositoryOperation::Get, cancel, session.find_async::<T>(id))
            .await?
            .ok_or_else(|| RepositoryError::not_found(T::ENTITY_NAME, id.to_string()))
    }

    fn find(&self, id: &T::Id) -> RepositoryResult<Option<T>> {
        Ok(self.session()?.find(id)?)
    }

    async fn find_async(&self, id: &T::Id, cancel: &CancellationToken) -> RepositoryResult<Option<T>> {
        let session = self.session()?;
        cancellable(RepositoryOperation::Get, cancel, session.find_async::<T>(id)).await
    }

    fn get_all(&self) -> RepositoryResult<Vec<T>> {
        self.get_where(&Predicate::always())
    }

    fn get_where(&self, predicate: &Predicate<T>) -> RepositoryResult<Vec<T>> {
        Ok(self.session()?.query(predicate)?)
    }

    async fn get_where_async(
        &self,
        predicate: &Predicate<T>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Vec<T>> {
        let session = self.session()?;
        cancellable(RepositoryOperation::GetWhere, cancel, session.query_async(predicate)).await
    }

    fn count(&self) -> RepositoryResult<usize> {
        self.count_where(&Predicate::always())
    }

    fn count_where(&self, predicate: &Predicate<T>) -> RepositoryResult<usize> {
        Ok(self.session()?.count(predicate)?)
    }

    async fn count_where_async(
        &self,
        predicate: &Predicate<T>,
        cancel: &CancellationToken,
    ) -> RepositoryResult<usize> {
        let session = self.session()?;
        cancellable(RepositoryOperation::Count, cancel, session.count_async(predicate)).await
    }
}

impl<T: Entity, S: Session> Clone for Repository<T, S> {
    fn clone(&self) -> Self {
        Self {
            session: Weak::clone(&self.session),
            fields: self.fields,
            validator: Arc::clone(&self.validator),
            settings: self.settings.clone(),
        }
    }
}

impl<T: Entity, S: Session> fmt::Debug for Repository<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &T::ENTITY_NAME)
            .field("session_alive", &(self.session.strong_count() > 0))
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::repository::validation::AcceptAll;
    use crate::store::{MemorySession, MemoryStore, Store};
    use crate::test_support::{sample, subscription, Subscription};

    struct Fixture {
        store: MemoryStore,
        session: Arc<MemorySession>,
        repo: Repository<Subscription, MemorySession>,
    }

    fn fixture_with(settings: RepositoryConfig, data: Vec<Subscription>) -> Fixture {
        let store = MemoryStore::new();
        store.seed(data).unwrap();
        let session = Arc::new(store.open_session().unwrap());
        let repo = Repository::new(&session, Arc::new(AcceptAll), settings);
        Fixture { store, session, repo }
    }

    fn fixture() -> Fixture {
        fixture_with(RepositoryConfig::default(), sample())
    }

    fn ids(items: &[Subscription]) -> Vec<i64> {
        items.iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_status_filter_page() {
        let f = fixture_with(
            RepositoryConfig::default(),
            vec![
                subscription(1, "a", "Active"),
                subscription(2, "b", "Expired"),
                subscription(3, "c", "Active"),
            ],
        );
        let query = GetManyQuery::new()
            .with_filter("status:eq:Active")
            .with_sort("id:asc")
            .with_page(1)
            .with_page_size(10);

        let page = f.repo.get_many_and_count(&query, "id").unwrap();
        assert_eq!(ids(&page.items), vec![1, 3]);
        assert_eq!(page.count, 2);
        assert_eq!(page.page_number, 1);
        assert_eq!(page.page_size, 10);
        assert_eq!(page.sorting.to_string(), "id:asc");
    }

    #[test]
    fn test_default_sort_applies_when_query_has_none() {
        let f = fixture();
        let page = f.repo.get_many_and_count(&GetManyQuery::new(), "age:desc").unwrap();
        assert_eq!(ids(&page.items), vec![3, 5, 2, 1, 4]);
        assert_eq!(page.count, 5);
        assert_eq!(page.page_size, 25);
    }

    #[test]
    fn test_pages_cover_filtered_set_exactly_once() {
        let f = fixture();
        let mut seen = Vec::new();
        let mut counts = HashSet::new();

        for page_number in 1..=4 {
            let query = GetManyQuery::new()
                .with_filter("age:ge:20")
                .with_sort("name:desc")
                .with_page(page_number)
                .with_page_size(2);
            let page = f.repo.get_many_and_count(&query, "id").unwrap();
            assert!(page.items.len() <= 2);
            counts.insert(page.count);
            seen.extend(ids(&page.items));
        }

        // Dana(2), Carol(5), Bob(3), Alice(1); Frank is 19
        assert_eq!(seen, vec![2, 5, 3, 1]);
        assert_eq!(counts, HashSet::from([4]));
    }

    #[test]
    fn test_page_past_end_is_empty_with_count() {
        let f = fixture();
        let query = GetManyQuery::new().with_page(9).with_page_size(2);
        let page = f.repo.get_many_and_count(&query, "id").unwrap();
        assert!(page.is_empty());
        assert_eq!(page.count, 5);
        assert_eq!(page.total_pages(), 3);
        assert!(!page.has_next());
    }

    #[test]
    fn test_page_values_are_clamped() {
        let f = fixture_with(
            RepositoryConfig {
                default_page_size: 2,
                max_page_size: 3,
            },
            sample(),
        );

        let page = f
            .repo
            .get_many_and_count(&GetManyQuery::new().with_page(-1).with_page_size(0), "id")
            .unwrap();
        assert_eq!(page.page_number, 1);
        assert_eq!(page.page_size, 2);
        assert_eq!(ids(&page.items), vec![1, 2]);

        let page = f
            .repo
            .get_many_and_count(&GetManyQuery::new().with_page_size(500), "id")
            .unwrap();
        assert_eq!(page.page_size, 3);
        assert_eq!(ids(&page.items), vec![1, 2, 3]);
    }

    #[test]
    fn test_repeated_runs_are_deterministic() {
        let f = fixture();
        let query = GetManyQuery::new().with_sort("active").with_page_size(10);
        let first = f.repo.get_many_and_count(&query, "id").unwrap();
        let second = f.repo.get_many_and_count(&query, "id").unwrap();
        assert_eq!(ids(&first.items), ids(&second.items));
        assert_eq!(ids(&first.items), vec![2, 4, 5, 1, 3]);
    }

    #[test]
    fn test_grammar_errors_surface() {
        let f = fixture();
        let run = |query: GetManyQuery| f.repo.get_many_and_count(&query, "id").unwrap_err();

        assert_eq!(
            run(GetManyQuery::new().with_filter("age>>5")),
            RepositoryError::malformed_filter("age>>5")
        );
        assert_eq!(
            run(GetManyQuery::new().with_filter("nonexistent:eq:5")),
            RepositoryError::unknown_field("nonexistent")
        );
        assert_eq!(
            run(GetManyQuery::new().with_sort("age:up")),
            RepositoryError::malformed_sort("age:up")
        );
        assert!(matches!(
            f.repo.get_many_and_count(&GetManyQuery::new(), "").unwrap_err(),
            RepositoryError::MalformedSort { .. }
        ));
    }

    #[test]
    fn test_get_and_find() {
        let f = fixture();
        assert_eq!(f.repo.get(&3).unwrap().name, "Bob");
        assert!(f.repo.find(&42).unwrap().is_none());
        assert_eq!(
            f.repo.get(&42).unwrap_err(),
            RepositoryError::not_found("Subscription", "42")
        );
    }

    #[test]
    fn test_get_all_where_and_counts() {
        let f = fixture();
        let active = Predicate::new(|s: &Subscription| s.active);

        assert_eq!(ids(&f.repo.get_all().unwrap()), vec![1, 2, 3, 4, 5]);
        assert_eq!(ids(&f.repo.get_where(&active).unwrap()), vec![1, 3]);
        assert_eq!(f.repo.count().unwrap(), 5);
        assert_eq!(f.repo.count_where(&active).unwrap(), 2);
    }

    #[test]
    fn test_dropped_session_is_transaction_state_error() {
        let f = fixture();
        let repo = f.repo.clone();
        drop(f.repo);
        drop(f.session);

        assert_eq!(
            repo.count().unwrap_err(),
            RepositoryError::transaction_state(
                TransactionOperation::UseSession,
                TransactionState::Disposed
            )
        );
        assert_eq!(f.store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_async_reads() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let query = GetManyQuery::new().with_filter("status:eq:Active").with_page_size(2);

        let page = f
            .repo
            .get_many_and_count_async(&query, "score:desc", &cancel)
            .await
            .unwrap();
        assert_eq!(ids(&page.items), vec![5, 3]);
        assert_eq!(page.count, 3);

        assert_eq!(f.repo.get_async(&1, &cancel).await.unwrap().name, "Alice");
        assert!(f.repo.find_async(&9, &cancel).await.unwrap().is_none());
        assert!(matches!(
            f.repo.get_async(&9, &cancel).await.unwrap_err(),
            RepositoryError::NotFound { .. }
        ));

        let young = Predicate::new(|s: &Subscription| s.age < 30);
        assert_eq!(ids(&f.repo.get_where_async(&young, &cancel).await.unwrap()), vec![1, 4]);
        assert_eq!(f.repo.count_where_async(&young, &cancel).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_read() {
        let f = fixture();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = f
            .repo
            .get_many_and_count_async(&GetManyQuery::new(), "id", &cancel)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RepositoryError::Cancelled {
                operation: RepositoryOperation::GetManyAndCount
            }
        );
        assert!(!err.is_client_error());
    }
}
