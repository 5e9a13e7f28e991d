//! Lifecycle hooks
//!
//! Hooks are optional async functions injected when a repository is built.
//! `before_*` hooks can rewrite the data about to be persisted (or veto the
//! operation by returning an error); `after_*` hooks see, and may replace, the
//! stored entity.
//!
//! ```rust
//! use docrepo::repository::Hooks;
//! use serde_json::Value;
//!
//! #[derive(Clone, serde::Serialize, serde::Deserialize)]
//! struct Tag { name: String }
//!
//! let hooks = Hooks::<Tag>::new().before_create(|mut doc| async move {
//!     if let Some(Value::String(name)) = doc.get_mut("name") {
//!         *name = name.trim().to_lowercase();
//!     }
//!     Ok(doc)
//! });
//! assert!(hooks.has_before_create());
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::document::Document;

use super::RepositoryResult;

type DocumentHook = Arc<dyn Fn(Document) -> BoxFuture<'static, RepositoryResult<Document>> + Send + Sync>;
type EntityHook<T> = Arc<dyn Fn(T) -> BoxFuture<'static, RepositoryResult<T>> + Send + Sync>;
type DeleteHook<T> = Arc<dyn Fn(T) -> BoxFuture<'static, RepositoryResult<()>> + Send + Sync>;

/// Optional lifecycle hooks for entities of type `T`
pub struct Hooks<T> {
    before_create: Option<DocumentHook>,
    after_create: Option<EntityHook<T>>,
    before_update: Option<DocumentHook>,
    after_update: Option<EntityHook<T>>,
    before_delete: Option<DeleteHook<T>>,
}

impl<T> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            before_create: None,
            after_create: None,
            before_update: None,
            after_update: None,
            before_delete: None,
        }
    }
}

impl<T> Clone for Hooks<T> {
    fn clone(&self) -> Self {
        Self {
            before_create: self.before_create.clone(),
            after_create: self.after_create.clone(),
            before_update: self.before_update.clone(),
            after_update: self.after_update.clone(),
            before_delete: self.before_delete.clone(),
        }
    }
}

impl<T> fmt::Debug for Hooks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_create", &self.before_create.is_some())
            .field("after_create", &self.after_create.is_some())
            .field("before_update", &self.before_update.is_some())
            .field("after_update", &self.after_update.is_some())
            .field("before_delete", &self.before_delete.is_some())
            .finish()
    }
}

impl<T: Send + 'static> Hooks<T> {
    /// No hooks
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite the document before it is inserted
    #[must_use]
    pub fn before_create<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Document) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RepositoryResult<Document>> + Send + 'static,
    {
        self.before_create = Some(Arc::new(move |doc| hook(doc).boxed()));
        self
    }

    /// Inspect or replace the created entity
    #[must_use]
    pub fn after_create<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RepositoryResult<T>> + Send + 'static,
    {
        self.after_create = Some(Arc::new(move |entity| hook(entity).boxed()));
        self
    }

    /// Rewrite the update patch before it is applied
    #[must_use]
    pub fn before_update<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Document) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RepositoryResult<Document>> + Send + 'static,
    {
        self.before_update = Some(Arc::new(move |patch| hook(patch).boxed()));
        self
    }

    /// Inspect or replace the updated entity
    #[must_use]
    pub fn after_update<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RepositoryResult<T>> + Send + 'static,
    {
        self.after_update = Some(Arc::new(move |entity| hook(entity).boxed()));
        self
    }

    /// Inspect the entity about to be deleted; an error cancels the delete
    #[must_use]
    pub fn before_delete<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RepositoryResult<()>> + Send + 'static,
    {
        self.before_delete = Some(Arc::new(move |entity| hook(entity).boxed()));
        self
    }

    /// Whether a `before_create` hook is registered
    pub fn has_before_create(&self) -> bool {
        self.before_create.is_some()
    }

    /// Whether a `before_delete` hook is registered
    pub fn has_before_delete(&self) -> bool {
        self.before_delete.is_some()
    }

    pub(crate) async fn run_before_create(&self, document: Document) -> RepositoryResult<Document> {
        match &self.before_create {
            Some(hook) => hook(document).await,
            None => Ok(document),
        }
    }

    pub(crate) async fn run_after_create(&self, entity: T) -> RepositoryResult<T> {
        match &self.after_create {
            Some(hook) => hook(entity).await,
            None => Ok(entity),
        }
    }

    pub(crate) async fn run_before_update(&self, patch: Document) -> RepositoryResult<Document> {
        match &self.before_update {
            Some(hook) => hook(patch).await,
            None => Ok(patch),
        }
    }

    pub(crate) async fn run_after_update(&self, entity: T) -> RepositoryResult<T> {
        match &self.after_update {
            Some(hook) => hook(entity).await,
            None => Ok(entity),
        }
    }

    pub(crate) async fn run_before_delete(&self, entity: T) -> RepositoryResult<()> {
        match &self.before_delete {
            Some(hook) => hook(entity).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::repository::{RepositoryError, RepositoryOperation};
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_hooks_pass_through() {
        let hooks = Hooks::<u32>::new();
        assert_eq!(hooks.run_before_create(doc! { "a": 1 }).await.unwrap(), doc! { "a": 1 });
        assert_eq!(hooks.run_after_update(7).await.unwrap(), 7);
        assert!(hooks.run_before_delete(7).await.is_ok());
        assert!(!hooks.has_before_delete());
    }

    #[tokio::test]
    async fn test_hooks_transform_values() {
        let hooks = Hooks::<u32>::new()
            .before_update(|mut patch| async move {
                patch.insert("touched".into(), json!(true));
                Ok(patch)
            })
            .after_create(|n| std::future::ready(Ok(n * 2)));
        let patch = hooks.run_before_update(doc! {}).await.unwrap();
        assert_eq!(patch["touched"], json!(true));
        assert_eq!(hooks.run_after_create(21).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_hook_error_propagates_and_clones_share() {
        let hooks = Hooks::<u32>::new().before_delete(|n| async move {
            if n == 0 {
                Err(RepositoryError::hook_failed(RepositoryOperation::DeleteById, "protected"))
            } else {
                Ok(())
            }
        });
        let clone = hooks.clone();
        assert!(clone.has_before_delete());
        let err = clone.run_before_delete(0).await.unwrap_err();
        assert_eq!(err.message, "protected");
        assert!(hooks.run_before_delete(1).await.is_ok());
    }
}
