//! Capability-segregated repositories over a document store
//!
//! Each entity gets consistent CRUD, pagination, bulk writes and transactions
//! through one generic implementation. Callers receive only the capabilities
//! they need:
//!
//! - [`ReadOnlyRepository`] implements [`ReadRepository`]
//! - [`WritableRepository`] adds [`WriteRepository`]
//! - [`Repository`] adds [`DeleteRepository`], [`BulkRepository`] and
//!   [`FullRepository::with_transaction`]
//!
//! Repositories are built by [`RepositoryFactory`] from an explicitly passed
//! [`Model`](crate::model::Model), optionally with lifecycle [`Hooks`].
//!
//! # Example
//!
//! ```rust
//! use docrepo::doc;
//! use docrepo::model::Model;
//! use docrepo::repository::{
//!     PaginationOptions, QueryOptions, ReadRepository, RepositoryFactory, SessionOptions,
//!     WriteRepository,
//! };
//! use docrepo::store::MemoryStore;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Widget {
//!     #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
//!     id: Option<String>,
//!     name: String,
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let model = Model::builder("Widget", MemoryStore::new("shop")).build();
//! let widgets = RepositoryFactory::create_writable::<Widget, _>(&model);
//!
//! let created = widgets.create(doc! { "name": "Widget" }, SessionOptions::new()).await.unwrap();
//! assert!(created.id.is_some());
//!
//! let page = widgets
//!     .find_with_pagination(doc! {}, PaginationOptions::default(), QueryOptions::new())
//!     .await
//!     .unwrap();
//! assert_eq!(page.pagination.total, 1);
//! # });
//! ```

mod adapter;
mod bulk;
mod delete;
mod error;
mod factory;
mod hooks;
mod options;
mod read;
mod traits;
mod transaction;
mod write;

#[cfg(test)]
pub(crate) mod test_support;
#[cfg(test)]
mod tests;

pub use adapter::{
    CanDelete, CanWrite, Capability, Full, ReadOnly, ReadOnlyRepository, Repository,
    RepositoryHandle, Writable, WritableRepository,
};
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use factory::RepositoryFactory;
pub use hooks::Hooks;
pub use options::{
    DeleteManyResult, PaginatedResult, PaginationMeta, PaginationOptions, QueryOptions,
    SessionOptions, UpdateManyResult,
};
pub use traits::{
    BulkRepository, DeleteRepository, Entity, FullRepository, ReadRepository, RepositoryResult,
    WriteRepository,
};
pub use transaction::run_in_transaction;

pub use crate::store::{BulkOperation, BulkWriteResult, OrderDirection, Populate, Session};
