//! Capability traits
//!
//! Repository capabilities are split so that a caller only receives what it
//! needs:
//!
//! - [`ReadRepository`]: lookups, pagination, counting
//! - [`WriteRepository`]: creation and updates (extends read)
//! - [`DeleteRepository`]: deletion (extends write)
//! - [`BulkRepository`]: ordered bulk writes and aggregation
//! - [`FullRepository`]: all of the above plus transactions
//!
//! The traits use RPITIT (Return Position Impl Trait In Traits), so every
//! method is an `async fn` in implementations and returns a `Send` future.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::document::{Document, Filter, UpdatePatch};
use crate::store::{BulkOperation, BulkWriteResult, Session};

use super::error::RepositoryError;
use super::options::{
    DeleteManyResult, PaginatedResult, PaginationOptions, QueryOptions, SessionOptions,
    UpdateManyResult,
};

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// A type that can be stored as a document
///
/// Implemented for every `Serialize + DeserializeOwned + Clone + Send + Sync`
/// type. The identity is expected in a field serialized as `_id`.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Entity for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Read capability
pub trait ReadRepository<T: Entity>: Send + Sync {
    /// Find an entity by id
    ///
    /// Returns `Ok(None)` when no document has that id. An id the store
    /// cannot interpret is an [`InvalidId`](super::RepositoryErrorKind::InvalidId) error.
    ///
    /// ```rust,ignore
    /// match repo.find_by_id(&id, QueryOptions::default()).await? {
    ///     Some(user) => println!("found {}", user.name),
    ///     None => println!("no such user"),
    /// }
    /// ```
    fn find_by_id(
        &self,
        id: &str,
        options: QueryOptions,
    ) -> impl Future<Output = RepositoryResult<Option<T>>> + Send;

    /// Find the first entity matching `filter` (after sort and skip)
    fn find_one(
        &self,
        filter: Filter,
        options: QueryOptions,
    ) -> impl Future<Output = RepositoryResult<Option<T>>> + Send;

    /// Find every entity matching `filter`
    ///
    /// ```rust,ignore
    /// let newest = repo
    ///     .find_many(
    ///         doc! { "status": "active" },
    ///         QueryOptions::new()
    ///             .sort_by("createdAt", OrderDirection::Descending)
    ///             .limit(20),
    ///     )
    ///     .await?;
    /// ```
    fn find_many(
        &self,
        filter: Filter,
        options: QueryOptions,
    ) -> impl Future<Output = RepositoryResult<Vec<T>>> + Send;

    /// Fetch one page of matches together with the total count
    ///
    /// The page and the count are read concurrently and both bound to the
    /// options' session.
    fn find_with_pagination(
        &self,
        filter: Filter,
        pagination: PaginationOptions,
        options: QueryOptions,
    ) -> impl Future<Output = RepositoryResult<PaginatedResult<T>>> + Send;

    /// Count entities matching `filter`
    fn count(&self, filter: Filter) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Whether any entity matches `filter`
    fn exists(&self, filter: Filter) -> impl Future<Output = RepositoryResult<bool>> + Send;
}

/// Write capability
pub trait WriteRepository<T: Entity>: ReadRepository<T> {
    /// Create an entity from any serializable input
    ///
    /// Runs `before_create`, applies schema defaults and timestamps, persists,
    /// then runs `after_create` on the stored entity.
    ///
    /// ```rust,ignore
    /// let widget = repo.create(doc! { "name": "Widget", "price": 5 }, SessionOptions::new()).await?;
    /// assert!(widget.id.is_some());
    /// ```
    fn create<D>(
        &self,
        data: D,
        options: SessionOptions,
    ) -> impl Future<Output = RepositoryResult<T>> + Send
    where
        D: Serialize + Send;

    /// Create several entities in one round trip; hooks are not run
    fn create_many<D>(
        &self,
        data: Vec<D>,
        options: SessionOptions,
    ) -> impl Future<Output = RepositoryResult<Vec<T>>> + Send
    where
        D: Serialize + Send;

    /// Apply `patch` to the entity with `id`, returning the updated entity
    fn update_by_id(
        &self,
        id: &str,
        patch: UpdatePatch,
        options: SessionOptions,
    ) -> impl Future<Output = RepositoryResult<Option<T>>> + Send;

    /// Apply `patch` to the first match, returning the updated entity
    fn update_one(
        &self,
        filter: Filter,
        patch: UpdatePatch,
        options: SessionOptions,
    ) -> impl Future<Output = RepositoryResult<Option<T>>> + Send;

    /// Apply `patch` to every match
    fn update_many(
        &self,
        filter: Filter,
        patch: UpdatePatch,
        options: SessionOptions,
    ) -> impl Future<Output = RepositoryResult<UpdateManyResult>> + Send;
}

/// Delete capability
pub trait DeleteRepository<T: Entity>: WriteRepository<T> {
    /// Delete the entity with `id`, returning what was deleted
    ///
    /// Deleting an absent id returns `Ok(None)`.
    fn delete_by_id(
        &self,
        id: &str,
        options: SessionOptions,
    ) -> impl Future<Output = RepositoryResult<Option<T>>> + Send;

    /// Delete the first match, returning it
    fn delete_one(
        &self,
        filter: Filter,
        options: SessionOptions,
    ) -> impl Future<Output = RepositoryResult<Option<T>>> + Send;

    /// Delete every match
    fn delete_many(
        &self,
        filter: Filter,
        options: SessionOptions,
    ) -> impl Future<Output = RepositoryResult<DeleteManyResult>> + Send;
}

/// Bulk capability
pub trait BulkRepository: Send + Sync {
    /// Execute an ordered list of operations in one round trip
    ///
    /// Stops at the first failing operation. Earlier operations stay applied
    /// unless the call is bound to a transaction that is then aborted.
    fn bulk_write(
        &self,
        operations: Vec<BulkOperation>,
        options: SessionOptions,
    ) -> impl Future<Output = RepositoryResult<BulkWriteResult>> + Send;

    /// Run an aggregation pipeline, decoding each result document into `R`
    fn aggregate<R>(
        &self,
        pipeline: Vec<Document>,
        options: SessionOptions,
    ) -> impl Future<Output = RepositoryResult<Vec<R>>> + Send
    where
        R: DeserializeOwned + Send;
}

/// Every capability plus transactions
pub trait FullRepository<T: Entity>: DeleteRepository<T> + BulkRepository {
    /// Run `work` inside a transaction
    ///
    /// `work` receives the session and must pass it into the options of every
    /// call that belongs to the transaction. On `Ok` the transaction commits;
    /// on `Err` it aborts and the error is returned unchanged. The session is
    /// always ended.
    ///
    /// ```rust,ignore
    /// let order = orders
    ///     .with_transaction(|session| {
    ///         let orders = orders.clone();
    ///         async move {
    ///             let order = orders.create(new_order, SessionOptions::with_session(&session)).await?;
    ///             items.bulk_write(lines, SessionOptions::with_session(&session)).await?;
    ///             Ok::<_, RepositoryError>(order)
    ///         }
    ///     })
    ///     .await?;
    /// ```
    fn with_transaction<F, Fut, R, E>(
        &self,
        work: F,
    ) -> impl Future<Output = Result<R, E>> + Send
    where
        F: FnOnce(Session) -> Fut + Send,
        Fut: Future<Output = Result<R, E>> + Send,
        R: Send,
        E: From<RepositoryError> + Send;
}
