//! Bulk writes and aggregation, available on full repositories only

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::document::Document;
use crate::store::{BulkOperation, BulkWriteResult, DocumentStore};

use super::adapter::{Full, RepositoryHandle};
use super::error::{RepositoryError, RepositoryOperation};
use super::options::SessionOptions;
use super::traits::{BulkRepository, Entity, RepositoryResult};

impl<T, S> BulkRepository for RepositoryHandle<T, S, Full>
where
    T: Entity,
    S: DocumentStore,
{
    async fn bulk_write(
        &self,
        operations: Vec<BulkOperation>,
        options: SessionOptions,
    ) -> RepositoryResult<BulkWriteResult> {
        let op = RepositoryOperation::BulkWrite;
        if operations.is_empty() {
            return Ok(BulkWriteResult::default());
        }

        let model = self.model();
        let operations = operations
            .into_iter()
            .map(|operation| match operation {
                BulkOperation::InsertOne { document } => BulkOperation::InsertOne {
                    document: model.prepare_insert(document),
                },
                BulkOperation::UpdateOne { filter, update } => BulkOperation::UpdateOne {
                    filter,
                    update: model.prepare_update(update),
                },
                BulkOperation::UpdateMany { filter, update } => BulkOperation::UpdateMany {
                    filter,
                    update: model.prepare_update(update),
                },
                delete => delete,
            })
            .collect::<Vec<_>>();
        let submitted = operations.len();

        let result = self
            .store()
            .bulk_write(
                self.collection(),
                operations,
                model.schema(),
                options.session.as_ref(),
            )
            .await
            .map_err(|e| self.store_error(op, e))?;

        debug!(
            entity = %model.name(),
            operations = submitted,
            inserted = result.inserted_count,
            modified = result.modified_count,
            deleted = result.deleted_count,
            "Bulk write"
        );
        Ok(result)
    }

    async fn aggregate<R>(
        &self,
        pipeline: Vec<Document>,
        options: SessionOptions,
    ) -> RepositoryResult<Vec<R>>
    where
        R: DeserializeOwned + Send,
    {
        let op = RepositoryOperation::Aggregate;
        let documents = self
            .store()
            .aggregate(self.collection(), &pipeline, options.session.as_ref())
            .await
            .map_err(|e| self.store_error(op, e))?;

        documents
            .into_iter()
            .map(|d| {
                serde_json::from_value(Value::Object(d)).map_err(|e| {
                    RepositoryError::serialization_error(op, e.to_string())
                        .with_entity_type(self.model().name())
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::repository::test_support::{product_model, Product};
    use crate::repository::{ReadRepository, RepositoryErrorKind, RepositoryFactory, WriteRepository};
    use crate::store::MemoryStore;
    use serde::Deserialize;

    #[tokio::test]
    async fn test_bulk_write_mixed_operations() {
        let store = MemoryStore::new("bulk-tests");
        let repo = RepositoryFactory::create_full::<Product, _>(&product_model(&store));
        repo.create_many(
            vec![Product::new("a", 1.0), Product::new("b", 2.0)],
            SessionOptions::new(),
        )
        .await
        .unwrap();

        let result = repo
            .bulk_write(
                vec![
                    BulkOperation::InsertOne {
                        document: doc! { "name": "c", "price": 3 },
                    },
                    BulkOperation::UpdateMany {
                        filter: doc! { "price": { "$lte": 2 } },
                        update: doc! { "$set": { "status": "active" } },
                    },
                    BulkOperation::DeleteOne {
                        filter: doc! { "name": "a" },
                    },
                ],
                SessionOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.inserted_count, 1);
        assert_eq!(result.inserted_ids.len(), 1);
        assert_eq!(result.matched_count, 2);
        assert_eq!(result.modified_count, 2);
        assert_eq!(result.deleted_count, 1);

        let inserted = repo
            .find_by_id(&result.inserted_ids[0], Default::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inserted.status, "draft");
        assert!(inserted.created_at.is_some());
    }

    #[tokio::test]
    async fn test_bulk_write_empty_and_failing() {
        let store = MemoryStore::new("bulk-tests");
        let repo = RepositoryFactory::create_full::<Product, _>(&product_model(&store));
        assert_eq!(
            repo.bulk_write(vec![], SessionOptions::new()).await.unwrap(),
            BulkWriteResult::default()
        );

        let err = repo
            .bulk_write(
                vec![
                    BulkOperation::InsertOne {
                        document: doc! { "name": "ok", "price": 1 },
                    },
                    BulkOperation::InsertOne {
                        document: doc! { "name": "bad", "price": -1 },
                    },
                ],
                SessionOptions::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(err.operation, RepositoryOperation::BulkWrite);
        assert_eq!(repo.count(doc! {}).await.unwrap(), 1);
    }

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct StatusTotals {
        #[serde(rename = "_id")]
        status: String,
        count: u64,
        stock: i64,
    }

    #[tokio::test]
    async fn test_aggregate_decodes_results() {
        let store = MemoryStore::new("bulk-tests");
        let repo = RepositoryFactory::create_full::<Product, _>(&product_model(&store));
        repo.create_many(
            vec![
                doc! { "name": "a", "price": 1, "status": "active", "stockQuantity": 4 },
                doc! { "name": "b", "price": 2, "status": "active", "stockQuantity": 6 },
                doc! { "name": "c", "price": 3, "status": "draft", "stockQuantity": 1 },
            ],
            SessionOptions::new(),
        )
        .await
        .unwrap();

        let totals: Vec<StatusTotals> = repo
            .aggregate(
                vec![
                    doc! { "$group": { "_id": "$status", "count": { "$sum": 1 }, "stock": { "$sum": "$stockQuantity" } } },
                    doc! { "$sort": { "_id": 1 } },
                ],
                SessionOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            totals,
            vec![
                StatusTotals { status: "active".into(), count: 2, stock: 10 },
                StatusTotals { status: "draft".into(), count: 1, stock: 1 },
            ]
        );

        let err = repo
            .aggregate::<Value>(vec![doc! { "$explode": {} }], SessionOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::QueryFailed);
    }
}
