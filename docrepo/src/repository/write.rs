//! Write capability, available on writable and full repositories

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::document::{Document, Filter, UpdatePatch, ID_FIELD};
use crate::store::{DocumentStore, Session, UpdateCommand};

use super::adapter::{CanWrite, RepositoryHandle};
use super::error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
use super::options::{SessionOptions, UpdateManyResult};
use super::traits::{Entity, RepositoryResult, WriteRepository};

/// A null `_id` means "let the store assign one"
fn strip_null_id(mut document: Document) -> Document {
    if document.get(ID_FIELD).is_some_and(Value::is_null) {
        document.remove(ID_FIELD);
    }
    document
}

impl<T, S, C> RepositoryHandle<T, S, C>
where
    T: Entity,
    S: DocumentStore,
    C: CanWrite,
{
    /// Single-document update shared by `update_by_id` and `update_one`
    async fn update_first(
        &self,
        op: RepositoryOperation,
        filter: Filter,
        patch: UpdatePatch,
        session: Option<&Session>,
    ) -> RepositoryResult<Option<T>> {
        let patch = self
            .hooks()
            .run_before_update(patch)
            .await
            .map_err(|e| self.hook_error(op, e))?;
        let command = UpdateCommand {
            filter,
            update: self.model().prepare_update(patch),
            multi: false,
        };

        let outcome = self
            .store()
            .update(self.collection(), &command, self.model().schema(), session)
            .await
            .map_err(|e| self.store_error(op, e))?;

        let Some(document) = outcome.documents.into_iter().next() else {
            return Ok(None);
        };
        let entity = self.decode(op, document)?;
        let entity = self
            .hooks()
            .run_after_update(entity)
            .await
            .map_err(|e| self.hook_error(op, e))?;
        Ok(Some(entity))
    }
}

impl<T, S, C> WriteRepository<T> for RepositoryHandle<T, S, C>
where
    T: Entity,
    S: DocumentStore,
    C: CanWrite,
{
    async fn create<D>(&self, data: D, options: SessionOptions) -> RepositoryResult<T>
    where
        D: Serialize + Send,
    {
        let op = RepositoryOperation::Create;
        let document = strip_null_id(self.encode(op, &data)?);
        let document = self
            .hooks()
            .run_before_create(document)
            .await
            .map_err(|e| self.hook_error(op, e))?;
        let document = self.model().prepare_insert(document);

        let stored = self
            .store()
            .insert_many(
                self.collection(),
                vec![document],
                self.model().schema(),
                options.session.as_ref(),
            )
            .await
            .map_err(|e| self.store_error(op, e))?;

        let document = stored.into_iter().next().ok_or_else(|| {
            RepositoryError::new(op, RepositoryErrorKind::Other, "store returned no document")
                .with_entity_type(self.model().name())
        })?;
        debug!(
            entity = %self.model().name(),
            id = crate::document::document_id(&document).unwrap_or_default(),
            "Created"
        );

        let entity = self.decode(op, document)?;
        self.hooks()
            .run_after_create(entity)
            .await
            .map_err(|e| self.hook_error(op, e))
    }

    async fn create_many<D>(&self, data: Vec<D>, options: SessionOptions) -> RepositoryResult<Vec<T>>
    where
        D: Serialize + Send,
    {
        let op = RepositoryOperation::CreateMany;
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let documents = data
            .iter()
            .map(|item| {
                self.encode(op, item)
                    .map(|d| self.model().prepare_insert(strip_null_id(d)))
            })
            .collect::<RepositoryResult<Vec<_>>>()?;

        let stored = self
            .store()
            .insert_many(
                self.collection(),
                documents,
                self.model().schema(),
                options.session.as_ref(),
            )
            .await
            .map_err(|e| self.store_error(op, e))?;

        debug!(entity = %self.model().name(), count = stored.len(), "Created batch");
        self.decode_all(op, stored)
    }

    async fn update_by_id(
        &self,
        id: &str,
        patch: UpdatePatch,
        options: SessionOptions,
    ) -> RepositoryResult<Option<T>> {
        let op = RepositoryOperation::UpdateById;
        let filter = self.id_filter(op, id)?;
        self.update_first(op, filter, patch, options.session.as_ref())
            .await
            .map_err(|e| {
                if e.entity_id.is_none() {
                    e.with_entity(self.model().name(), id)
                } else {
                    e
                }
            })
    }

    async fn update_one(
        &self,
        filter: Filter,
        patch: UpdatePatch,
        options: SessionOptions,
    ) -> RepositoryResult<Option<T>> {
        self.update_first(
            RepositoryOperation::UpdateOne,
            filter,
            patch,
            options.session.as_ref(),
        )
        .await
    }

    async fn update_many(
        &self,
        filter: Filter,
        patch: UpdatePatch,
        options: SessionOptions,
    ) -> RepositoryResult<UpdateManyResult> {
        let op = RepositoryOperation::UpdateMany;
        let command = UpdateCommand {
            filter,
            update: self.model().prepare_update(patch),
            multi: true,
        };

        let outcome = self
            .store()
            .update(
                self.collection(),
                &command,
                self.model().schema(),
                options.session.as_ref(),
            )
            .await
            .map_err(|e| self.store_error(op, e))?;

        Ok(UpdateManyResult {
            matched_count: outcome.matched,
            modified_count: outcome.modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::repository::test_support::{product_model, Product};
    use crate::repository::{
        Hooks, QueryOptions, ReadRepository, RepositoryFactory, WritableRepository,
    };
    use crate::store::MemoryStore;

    fn writable(store: &MemoryStore) -> WritableRepository<Product, MemoryStore> {
        RepositoryFactory::create_writable(&product_model(store))
    }

    #[tokio::test]
    async fn test_create_applies_defaults_and_timestamps() {
        let store = MemoryStore::new("write-tests");
        let repo = writable(&store);

        let widget = repo
            .create(doc! { "name": "Widget", "price": 9.5 }, SessionOptions::new())
            .await
            .unwrap();
        assert!(widget.id.is_some());
        assert_eq!(widget.status, "draft");
        assert_eq!(widget.stock_quantity, 0);
        assert!(widget.created_at.is_some());
        assert_eq!(widget.created_at, widget.updated_at);

        let fetched = repo
            .find_by_id(widget.id(), QueryOptions::new())
            .await
            .unwrap();
        assert_eq!(fetched, Some(widget));
    }

    #[tokio::test]
    async fn test_create_from_typed_value() {
        let store = MemoryStore::new("write-tests");
        let repo = writable(&store);
        let created = repo
            .create(Product::new("Gadget", 3.0), SessionOptions::new())
            .await
            .unwrap();
        assert_eq!(created.name, "Gadget");
        assert!(!created.id().is_empty());
    }

    #[tokio::test]
    async fn test_create_validation_failure_persists_nothing() {
        let store = MemoryStore::new("write-tests");
        let repo = writable(&store);

        let err = repo
            .create(doc! { "name": "Widget", "price": -5 }, SessionOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(err.operation, RepositoryOperation::Create);
        assert_eq!(err.field_errors.len(), 1);
        assert_eq!(err.field_errors[0].field, "price");
        assert_eq!(repo.count(doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_duplicate_id_already_exists() {
        let store = MemoryStore::new("write-tests");
        let repo = writable(&store);
        let first = doc! { "_id": "fixed", "name": "A", "price": 1 };
        repo.create(first.clone(), SessionOptions::new()).await.unwrap();
        let err = repo.create(first, SessionOptions::new()).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_create_runs_hooks_in_order() {
        let store = MemoryStore::new("write-tests");
        let hooks = Hooks::<Product>::new()
            .before_create(|mut d| async move {
                if let Some(Value::String(name)) = d.get_mut("name") {
                    *name = name.trim().to_string();
                }
                Ok(d)
            })
            .after_create(|mut p: Product| async move {
                p.name = format!("[{}]", p.name);
                Ok(p)
            });
        let repo = RepositoryFactory::create_writable_with_hooks(&product_model(&store), hooks);

        let created = repo
            .create(doc! { "name": "  Spaced  ", "price": 1 }, SessionOptions::new())
            .await
            .unwrap();
        assert_eq!(created.name, "[Spaced]");

        let stored = repo
            .find_by_id(created.id(), QueryOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "Spaced");
    }

    #[tokio::test]
    async fn test_before_create_error_aborts() {
        let store = MemoryStore::new("write-tests");
        let hooks = Hooks::<Product>::new().before_create(|_| async {
            Err(RepositoryError::hook_failed(RepositoryOperation::Create, "closed"))
        });
        let repo = RepositoryFactory::create_writable_with_hooks(&product_model(&store), hooks);
        let err = repo
            .create(doc! { "name": "A", "price": 1 }, SessionOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::HookFailed);
        assert_eq!(repo.count(doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_many_is_all_or_nothing() {
        let store = MemoryStore::new("write-tests");
        let repo = writable(&store);

        assert!(repo
            .create_many(Vec::<Product>::new(), SessionOptions::new())
            .await
            .unwrap()
            .is_empty());

        let created = repo
            .create_many(
                vec![Product::new("a", 1.0), Product::new("b", 2.0)],
                SessionOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(created[1].name, "b");

        let err = repo
            .create_many(
                vec![Product::new("c", 1.0), Product::new("d", -1.0)],
                SessionOptions::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(repo.count(doc! {}).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_by_id_returns_updated_entity() {
        let store = MemoryStore::new("write-tests");
        let repo = writable(&store);
        let created = repo
            .create(Product::new("Widget", 5.0), SessionOptions::new())
            .await
            .unwrap();

        let updated = repo
            .update_by_id(created.id(), doc! { "price": 7.5 }, SessionOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.price, 7.5);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);

        let missing = repo
            .update_by_id("missing", doc! { "price": 1 }, SessionOptions::new())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_update_with_operators_and_validation() {
        let store = MemoryStore::new("write-tests");
        let repo = writable(&store);
        let created = repo
            .create(Product::new("Widget", 5.0), SessionOptions::new())
            .await
            .unwrap();

        let bumped = repo
            .update_one(
                doc! { "name": "Widget" },
                doc! { "$inc": { "stockQuantity": 3 } },
                SessionOptions::new(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bumped.stock_quantity, 3);

        let err = repo
            .update_by_id(created.id(), doc! { "price": -1 }, SessionOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(err.entity_id.as_deref(), Some(created.id()));

        let unchanged = repo
            .find_by_id(created.id(), QueryOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.price, 5.0);
    }

    #[tokio::test]
    async fn test_update_hooks() {
        let store = MemoryStore::new("write-tests");
        let hooks = Hooks::<Product>::new()
            .before_update(|mut patch| async move {
                patch.insert("status".into(), Value::from("active"));
                Ok(patch)
            })
            .after_update(|mut p: Product| async move {
                p.name = p.name.to_uppercase();
                Ok(p)
            });
        let repo = RepositoryFactory::create_writable_with_hooks(&product_model(&store), hooks);
        let created = repo
            .create(Product::new("Widget", 5.0), SessionOptions::new())
            .await
            .unwrap();
        let updated = repo
            .update_by_id(created.id(), doc! { "price": 6 }, SessionOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, "active");
        assert_eq!(updated.name, "WIDGET");
    }

    #[tokio::test]
    async fn test_update_many_counts() {
        let store = MemoryStore::new("write-tests");
        let repo = writable(&store);
        repo.create_many(
            vec![
                Product::new("a", 1.0),
                Product::new("b", 2.0),
                Product::new("c", 30.0),
            ],
            SessionOptions::new(),
        )
        .await
        .unwrap();

        let result = repo
            .update_many(
                doc! { "price": { "$lt": 10 } },
                doc! { "$set": { "status": "active" } },
                SessionOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.matched_count, 2);
        assert_eq!(result.modified_count, 2);
        assert_eq!(repo.count(doc! { "status": "active" }).await.unwrap(), 2);

        let none = repo
            .update_many(doc! { "name": "zzz" }, doc! { "price": 1 }, SessionOptions::new())
            .await
            .unwrap();
        assert_eq!(none, UpdateManyResult::default());
    }
}
