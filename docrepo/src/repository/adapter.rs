//! Capability-scoped repository handle
//!
//! One generic type, [`RepositoryHandle`], backs every repository. Its third
//! parameter is a capability marker; each capability trait is implemented only
//! for the markers that grant it, so a [`ReadOnlyRepository`] simply has no
//! `create` or `delete_by_id` method:
//!
//! | Alias | Marker | Capabilities |
//! |-------|--------|--------------|
//! | [`ReadOnlyRepository`] | [`ReadOnly`] | read |
//! | [`WritableRepository`] | [`Writable`] | read, write |
//! | [`Repository`] | [`Full`] | read, write, delete, bulk, transactions |
//!
//! Handles are built by [`RepositoryFactory`](super::RepositoryFactory).

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::document::{from_document, to_document, Document, Filter, ID_FIELD};
use crate::model::Model;
use crate::store::{DocumentStore, StoreError};

use super::error::{RepositoryError, RepositoryOperation};
use super::hooks::Hooks;
use super::traits::{Entity, RepositoryResult};

mod sealed {
    pub trait Sealed {}
}

/// Capability marker
pub trait Capability: sealed::Sealed + Send + Sync + 'static {}

/// Markers that allow creating and updating
pub trait CanWrite: Capability {}

/// Markers that allow deleting
pub trait CanDelete: CanWrite {}

/// Read-only capability
#[derive(Debug, Clone, Copy)]
pub enum ReadOnly {}

/// Read and write capability
#[derive(Debug, Clone, Copy)]
pub enum Writable {}

/// Every capability
#[derive(Debug, Clone, Copy)]
pub enum Full {}

impl sealed::Sealed for ReadOnly {}
impl sealed::Sealed for Writable {}
impl sealed::Sealed for Full {}

impl Capability for ReadOnly {}
impl Capability for Writable {}
impl Capability for Full {}

impl CanWrite for Writable {}
impl CanWrite for Full {}

impl CanDelete for Full {}

/// Repository over entities `T` stored in `S`, limited to capability `C`
pub struct RepositoryHandle<T, S, C> {
    model: Model<S>,
    hooks: Hooks<T>,
    _capability: PhantomData<fn() -> C>,
}

/// Repository that can only read
pub type ReadOnlyRepository<T, S> = RepositoryHandle<T, S, ReadOnly>;

/// Repository that can read, create and update
pub type WritableRepository<T, S> = RepositoryHandle<T, S, Writable>;

/// Repository with every capability
pub type Repository<T, S> = RepositoryHandle<T, S, Full>;

impl<T, S, C> Clone for RepositoryHandle<T, S, C> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            hooks: self.hooks.clone(),
            _capability: PhantomData,
        }
    }
}

impl<T, S, C> fmt::Debug for RepositoryHandle<T, S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("model", &self.model)
            .field("capability", &std::any::type_name::<C>())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl<T: Entity, S: DocumentStore, C: Capability> RepositoryHandle<T, S, C> {
    pub(crate) fn new(model: Model<S>, hooks: Hooks<T>) -> Self {
        Self {
            model,
            hooks,
            _capability: PhantomData,
        }
    }

    /// The model this repository is bound to
    pub fn model(&self) -> &Model<S> {
        &self.model
    }

    /// The registered lifecycle hooks
    pub fn hooks(&self) -> &Hooks<T> {
        &self.hooks
    }

    /// A read-only view of the same collection
    pub fn read_only(&self) -> ReadOnlyRepository<T, S> {
        RepositoryHandle::new(self.model.clone(), self.hooks.clone())
    }

    pub(crate) fn store(&self) -> &S {
        self.model.store()
    }

    pub(crate) fn collection(&self) -> &str {
        self.model.collection()
    }

    /// Wrap a store failure with the operation and entity type, and log it
    pub(crate) fn store_error(&self, operation: RepositoryOperation, error: StoreError) -> RepositoryError {
        let error = RepositoryError::from_store(operation, error).with_entity_type(self.model.name());
        warn!(
            operation = %operation,
            entity = %self.model.name(),
            kind = %error.kind,
            error = %error.message,
            "Repository operation failed"
        );
        error
    }

    /// Equality filter on the identity field, after checking the id is valid
    pub(crate) fn id_filter(&self, operation: RepositoryOperation, id: &str) -> RepositoryResult<Filter> {
        self.store()
            .check_id(id)
            .map_err(|_| RepositoryError::invalid_id(operation, id).with_entity_type(self.model.name()))?;
        let mut filter = Filter::new();
        filter.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        Ok(filter)
    }

    pub(crate) fn encode<D: Serialize + ?Sized>(
        &self,
        operation: RepositoryOperation,
        data: &D,
    ) -> RepositoryResult<Document> {
        to_document(data).map_err(|e| {
            RepositoryError::serialization_error(operation, e.to_string())
                .with_entity_type(self.model.name())
        })
    }

    pub(crate) fn decode(&self, operation: RepositoryOperation, document: Document) -> RepositoryResult<T> {
        let id = crate::document::document_id(&document).map(str::to_string);
        from_document(document).map_err(|e| {
            let error = RepositoryError::serialization_error(operation, e.to_string());
            match id {
                Some(id) => error.with_entity(self.model.name(), id),
                None => error.with_entity_type(self.model.name()),
            }
        })
    }

    pub(crate) fn decode_all(
        &self,
        operation: RepositoryOperation,
        documents: Vec<Document>,
    ) -> RepositoryResult<Vec<T>> {
        documents
            .into_iter()
            .map(|d| self.decode(operation, d))
            .collect()
    }

    /// Tag hook failures with the operation they interrupted
    pub(crate) fn hook_error(&self, operation: RepositoryOperation, error: RepositoryError) -> RepositoryError {
        warn!(operation = %operation, entity = %self.model.name(), error = %error, "Lifecycle hook failed");
        error.with_operation(operation)
    }
}
