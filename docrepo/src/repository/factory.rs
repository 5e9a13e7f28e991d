//! Repository construction

use crate::model::Model;
use crate::store::DocumentStore;

use super::adapter::{ReadOnlyRepository, Repository, RepositoryHandle, WritableRepository};
use super::hooks::Hooks;
use super::traits::Entity;

/// Builds capability-scoped repositories from a [`Model`]
///
/// Every repository built from the same model shares its store and schema;
/// only the set of available operations differs.
///
/// ```rust
/// use docrepo::model::Model;
/// use docrepo::repository::RepositoryFactory;
/// use docrepo::store::MemoryStore;
///
/// #[derive(Clone, serde::Serialize, serde::Deserialize)]
/// struct Tag {
///     name: String,
/// }
///
/// let model = Model::builder("Tag", MemoryStore::new("blog")).build();
/// let reader = RepositoryFactory::create_read_only::<Tag, _>(&model);
/// let admin = RepositoryFactory::create_full::<Tag, _>(&model);
/// assert_eq!(reader.model().collection(), admin.model().collection());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Repository with read operations only
    pub fn create_read_only<T: Entity, S: DocumentStore>(model: &Model<S>) -> ReadOnlyRepository<T, S> {
        RepositoryHandle::new(model.clone(), Hooks::new())
    }

    /// Repository with read and write operations
    pub fn create_writable<T: Entity, S: DocumentStore>(model: &Model<S>) -> WritableRepository<T, S> {
        Self::create_writable_with_hooks(model, Hooks::new())
    }

    /// Writable repository with lifecycle hooks
    pub fn create_writable_with_hooks<T: Entity, S: DocumentStore>(
        model: &Model<S>,
        hooks: Hooks<T>,
    ) -> WritableRepository<T, S> {
        RepositoryHandle::new(model.clone(), hooks)
    }

    /// Repository with every capability
    pub fn create_full<T: Entity, S: DocumentStore>(model: &Model<S>) -> Repository<T, S> {
        Self::create_full_with_hooks(model, Hooks::new())
    }

    /// Full repository with lifecycle hooks
    pub fn create_full_with_hooks<T: Entity, S: DocumentStore>(
        model: &Model<S>,
        hooks: Hooks<T>,
    ) -> Repository<T, S> {
        RepositoryHandle::new(model.clone(), hooks)
    }
}
