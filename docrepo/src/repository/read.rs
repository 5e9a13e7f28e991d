//! Read capability, available on every repository

use serde_json::Value;
use tracing::debug;

use crate::document::{Document, Filter, ID_FIELD};
use crate::store::{DocumentStore, FindQuery};

use super::adapter::{Capability, RepositoryHandle};
use super::error::RepositoryOperation;
use super::options::{PaginatedResult, PaginationMeta, PaginationOptions, QueryOptions};
use super::traits::{Entity, ReadRepository, RepositoryResult};

impl<T, S, C> ReadRepository<T> for RepositoryHandle<T, S, C>
where
    T: Entity,
    S: DocumentStore,
    C: Capability,
{
    async fn find_by_id(&self, id: &str, options: QueryOptions) -> RepositoryResult<Option<T>> {
        let op = RepositoryOperation::FindById;
        let filter = self.id_filter(op, id)?;
        let mut query = options.to_find_query(filter);
        query.skip = None;
        query.limit = Some(1);

        let found = self
            .store()
            .find(self.collection(), &query, options.session.as_ref())
            .await
            .map_err(|e| self.store_error(op, e).with_entity(self.model().name(), id))?;

        found
            .into_iter()
            .next()
            .map(|d| self.decode(op, d))
            .transpose()
    }

    async fn find_one(&self, filter: Filter, options: QueryOptions) -> RepositoryResult<Option<T>> {
        let op = RepositoryOperation::FindOne;
        let mut query = options.to_find_query(filter);
        query.limit = Some(1);

        let found = self
            .store()
            .find(self.collection(), &query, options.session.as_ref())
            .await
            .map_err(|e| self.store_error(op, e))?;

        found
            .into_iter()
            .next()
            .map(|d| self.decode(op, d))
            .transpose()
    }

    async fn find_many(&self, filter: Filter, options: QueryOptions) -> RepositoryResult<Vec<T>> {
        let op = RepositoryOperation::FindMany;
        let query = options.to_find_query(filter);

        let found = self
            .store()
            .find(self.collection(), &query, options.session.as_ref())
            .await
            .map_err(|e| self.store_error(op, e))?;

        debug!(collection = %self.collection(), count = found.len(), "find_many");
        self.decode_all(op, found)
    }

    async fn find_with_pagination(
        &self,
        filter: Filter,
        pagination: PaginationOptions,
        options: QueryOptions,
    ) -> RepositoryResult<PaginatedResult<T>> {
        let op = RepositoryOperation::FindWithPagination;
        let pagination = pagination.normalized();

        let mut query = options.to_find_query(filter);
        query.skip = Some(pagination.skip());
        query.limit = Some(pagination.limit);

        let session = options.session.as_ref();
        let store = self.store();
        let (page, total) = futures::try_join!(
            store.find(self.collection(), &query, session),
            store.count(self.collection(), &query.filter, session),
        )
        .map_err(|e| self.store_error(op, e))?;

        Ok(PaginatedResult {
            data: self.decode_all(op, page)?,
            pagination: PaginationMeta::new(total, pagination.page, pagination.limit),
        })
    }

    async fn count(&self, filter: Filter) -> RepositoryResult<u64> {
        self.store()
            .count(self.collection(), &filter, None)
            .await
            .map_err(|e| self.store_error(RepositoryOperation::Count, e))
    }

    async fn exists(&self, filter: Filter) -> RepositoryResult<bool> {
        let mut projection = Document::new();
        projection.insert(ID_FIELD.to_string(), Value::from(1));
        let query = FindQuery {
            projection: Some(projection),
            limit: Some(1),
            ..FindQuery::new(filter)
        };

        let found = self
            .store()
            .find(self.collection(), &query, None)
            .await
            .map_err(|e| self.store_error(RepositoryOperation::Exists, e))?;
        Ok(!found.is_empty())
    }
}
