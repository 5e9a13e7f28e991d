//! # docrepo
//!
//! Capability-segregated repositories over a document store. Every entity gets
//! consistent CRUD, pagination, ordered bulk writes and cross-collection
//! transactions from one generic implementation.
//!
//! ## Features
//!
//! - **Capability typestate**: read-only, writable and full repositories share
//!   one implementation; restricted handles simply lack the methods
//! - **Lifecycle hooks**: injected async `before_*` / `after_*` functions
//! - **Pagination**: `{data, pagination: {total, page, limit, pages, hasNext, hasPrev}}`
//! - **Transactions**: session-scoped staging, atomic commit, abort on error
//! - **In-memory store**: filter and update grammar, projections, population,
//!   aggregation, schema validation
//!
//! ## Example
//!
//! ```rust,no_run
//! use docrepo::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let store = docrepo::database::connect(&config.database)?;
//!     let users = UserRepository::new(&UserRepository::model(store.clone()));
//!
//!     users
//!         .create(NewUser::new("ada@example.com", "Ada"), SessionOptions::new())
//!         .await?;
//!     let page = users
//!         .find_with_pagination(doc! {}, PaginationOptions::default(), QueryOptions::new())
//!         .await?;
//!     tracing::info!(total = page.pagination.total, "Users loaded");
//!
//!     docrepo::database::disconnect(&store);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod document;
pub mod domain;
pub mod error;
pub mod ids;
pub mod model;
pub mod observability;
pub mod repository;
pub mod schema;
pub mod store;

#[doc(hidden)]
pub use serde_json;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, DatabaseConfig, ServiceConfig};
    pub use crate::doc;
    pub use crate::document::{Document, Filter, UpdatePatch};
    pub use crate::domain::{NewUser, User, UserRepository, UserRole, UserStatus};
    pub use crate::error::{Error, Result};
    pub use crate::model::Model;
    pub use crate::observability::init_tracing;
    pub use crate::repository::{
        run_in_transaction, BulkOperation, BulkRepository, BulkWriteResult, DeleteRepository,
        FullRepository, Hooks, OrderDirection, PaginatedResult, PaginationOptions, Populate,
        QueryOptions, ReadOnlyRepository, ReadRepository, Repository, RepositoryError,
        RepositoryErrorKind, RepositoryFactory, RepositoryOperation, RepositoryResult,
        SessionOptions, WritableRepository, WriteRepository,
    };
    pub use crate::schema::{FieldRule, Schema};
    pub use crate::store::{DocumentStore, MemoryStore, Session};
}
