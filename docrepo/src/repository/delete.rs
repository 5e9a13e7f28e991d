//! Delete capability, available on full repositories only

use tracing::debug;

use crate::document::Filter;
use crate::store::{DocumentStore, FindQuery};

use super::adapter::{CanDelete, RepositoryHandle};
use super::error::RepositoryOperation;
use super::options::{DeleteManyResult, SessionOptions};
use super::traits::{DeleteRepository, Entity, RepositoryResult};

impl<T, S, C> DeleteRepository<T> for RepositoryHandle<T, S, C>
where
    T: Entity,
    S: DocumentStore,
    C: CanDelete,
{
    async fn delete_by_id(&self, id: &str, options: SessionOptions) -> RepositoryResult<Option<T>> {
        let op = RepositoryOperation::DeleteById;
        let filter = self.id_filter(op, id)?;
        let session = options.session.as_ref();
        let in_context = |e| self.store_error(op, e).with_entity(self.model().name(), id);

        // The hook sees the entity before it is removed, in the same session.
        if self.hooks().has_before_delete() {
            let query = FindQuery {
                limit: Some(1),
                ..FindQuery::new(filter.clone())
            };
            let current = self
                .store()
                .find(self.collection(), &query, session)
                .await
                .map_err(in_context)?;
            let Some(current) = current.into_iter().next() else {
                return Ok(None);
            };
            let entity = self.decode(op, current)?;
            self.hooks()
                .run_before_delete(entity)
                .await
                .map_err(|e| self.hook_error(op, e))?;
        }

        let removed = self
            .store()
            .delete(self.collection(), &filter, false, session)
            .await
            .map_err(in_context)?;

        match removed.into_iter().next() {
            Some(document) => {
                debug!(entity = %self.model().name(), id, "Deleted");
                self.decode(op, document).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn delete_one(&self, filter: Filter, options: SessionOptions) -> RepositoryResult<Option<T>> {
        let op = RepositoryOperation::DeleteOne;
        let removed = self
            .store()
            .delete(self.collection(), &filter, false, options.session.as_ref())
            .await
            .map_err(|e| self.store_error(op, e))?;

        removed
            .into_iter()
            .next()
            .map(|d| self.decode(op, d))
            .transpose()
    }

    async fn delete_many(
        &self,
        filter: Filter,
        options: SessionOptions,
    ) -> RepositoryResult<DeleteManyResult> {
        let removed = self
            .store()
            .delete(self.collection(), &filter, true, options.session.as_ref())
            .await
            .map_err(|e| self.store_error(RepositoryOperation::DeleteMany, e))?;

        debug!(entity = %self.model().name(), count = removed.len(), "Deleted batch");
        Ok(DeleteManyResult {
            deleted_count: removed.len() as u64,
        })
    }
}
