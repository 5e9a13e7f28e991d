//! Document store contract
//!
//! Repositories never talk to a database driver directly. They build commands
//! ([`FindQuery`], [`UpdateCommand`], [`BulkOperation`]) and hand them to a
//! [`DocumentStore`], optionally bound to a [`Session`] that scopes them to a
//! transaction. Filters, update patches and aggregation pipelines are forwarded
//! untouched; interpreting them is the store's job.
//!
//! [`MemoryStore`] is the bundled implementation. It keeps collections in
//! process memory, stages transactional writes per session and validates
//! documents against the collection [`Schema`].

mod aggregate;
mod memory;
pub mod query;
mod session;
pub mod update;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{Document, Filter, UpdatePatch};
use crate::schema::{FieldError, Schema};

pub use memory::MemoryStore;
pub use session::{Session, TransactionState};

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures reported by a document store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The identity value is not valid for this store
    #[error("invalid document id: {0:?}")]
    InvalidId(String),

    /// The store cannot be reached or has been closed
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Filter, update, projection or pipeline could not be interpreted
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    /// Document failed schema validation
    #[error("validation failed: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),

    /// Identity already present in the collection
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Session or transaction used in an invalid state
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Commit rejected because a staged collection changed underneath it
    #[error("write conflict: {0}")]
    WriteConflict(String),

    /// Stored data could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An operation inside an ordered bulk write failed
    #[error("bulk operation {index} failed: {source}")]
    BulkOperationFailed {
        /// Position of the failing operation in the batch
        index: usize,
        /// Underlying failure
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// The innermost error (unwraps bulk-operation wrappers)
    pub fn root(&self) -> &StoreError {
        match self {
            Self::BulkOperationFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Sort direction for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Ascending (A-Z, 0-9)
    #[default]
    Ascending,
    /// Descending (Z-A, 9-0)
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// Relation expansion: replace the id(s) stored at `path` with the referenced
/// documents of collection `from`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Populate {
    /// Field holding an id or an array of ids
    pub path: String,
    /// Collection the ids refer to
    pub from: String,
    /// Optional projection applied to the referenced documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Document>,
}

impl Populate {
    /// Expand `path` from collection `from`
    pub fn new(path: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            from: from.into(),
            select: None,
        }
    }

    /// Restrict the fields of the referenced documents
    #[must_use]
    pub fn select(mut self, projection: Document) -> Self {
        self.select = Some(projection);
        self
    }
}

/// A find command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    /// Match condition
    pub filter: Filter,
    /// Inclusion or exclusion projection
    pub projection: Option<Document>,
    /// Sort keys, most significant first
    pub sort: Vec<(String, OrderDirection)>,
    /// Documents to skip after sorting
    pub skip: Option<u64>,
    /// Maximum documents to return; `Some(0)` means no limit
    pub limit: Option<u64>,
    /// Relations to expand
    pub populate: Vec<Populate>,
}

impl FindQuery {
    /// Find everything matching `filter`
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

/// An update command
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCommand {
    /// Documents to update
    pub filter: Filter,
    /// Patch or update operators
    pub update: UpdatePatch,
    /// Update every match instead of the first one
    pub multi: bool,
}

/// What an update did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Documents matching the filter
    pub matched: u64,
    /// Documents whose content changed
    pub modified: u64,
    /// Post-update state of every matched document
    pub documents: Vec<Document>,
}

/// One entry of an ordered bulk write
///
/// Serialized in the familiar tagged form, e.g.
/// `{"updateOne": {"filter": {...}, "update": {...}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BulkOperation {
    /// Insert one document
    InsertOne {
        /// Document to insert
        document: Document,
    },
    /// Update the first match
    UpdateOne {
        /// Match condition
        filter: Filter,
        /// Patch or update operators
        update: UpdatePatch,
    },
    /// Update every match
    UpdateMany {
        /// Match condition
        filter: Filter,
        /// Patch or update operators
        update: UpdatePatch,
    },
    /// Delete the first match
    DeleteOne {
        /// Match condition
        filter: Filter,
    },
    /// Delete every match
    DeleteMany {
        /// Match condition
        filter: Filter,
    },
}

/// Summary of a bulk write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkWriteResult {
    /// Documents inserted
    pub inserted_count: u64,
    /// Documents matched by update operations
    pub matched_count: u64,
    /// Documents changed by update operations
    pub modified_count: u64,
    /// Documents removed
    pub deleted_count: u64,
    /// Ids of inserted documents, in operation order
    pub inserted_ids: Vec<String>,
}

/// Asynchronous document store
///
/// Every method may be bound to a [`Session`]. An idle session runs the
/// operation directly; an active one stages it in the session's transaction.
/// Operations on committed, aborted or ended sessions are rejected.
pub trait DocumentStore: Clone + Send + Sync + 'static {
    /// Check that `id` is a valid identity value for this store
    fn check_id(&self, id: &str) -> StoreResult<()> {
        if id.trim().is_empty() {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(())
    }

    /// Run a find command
    fn find(
        &self,
        collection: &str,
        query: &FindQuery,
        session: Option<&Session>,
    ) -> impl Future<Output = StoreResult<Vec<Document>>> + Send;

    /// Count documents matching `filter`
    fn count(
        &self,
        collection: &str,
        filter: &Filter,
        session: Option<&Session>,
    ) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Insert documents, generating ids where missing
    ///
    /// All documents are validated before any is written; the stored documents
    /// are returned in input order.
    fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        schema: &Schema,
        session: Option<&Session>,
    ) -> impl Future<Output = StoreResult<Vec<Document>>> + Send;

    /// Apply an update, validating the resulting documents
    fn update(
        &self,
        collection: &str,
        command: &UpdateCommand,
        schema: &Schema,
        session: Option<&Session>,
    ) -> impl Future<Output = StoreResult<UpdateOutcome>> + Send;

    /// Delete the first match (or every match when `multi`), returning the
    /// removed documents
    fn delete(
        &self,
        collection: &str,
        filter: &Filter,
        multi: bool,
        session: Option<&Session>,
    ) -> impl Future<Output = StoreResult<Vec<Document>>> + Send;

    /// Execute an ordered batch in one round trip, stopping at the first failure
    fn bulk_write(
        &self,
        collection: &str,
        operations: Vec<BulkOperation>,
        schema: &Schema,
        session: Option<&Session>,
    ) -> impl Future<Output = StoreResult<BulkWriteResult>> + Send;

    /// Run an aggregation pipeline
    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Document],
        session: Option<&Session>,
    ) -> impl Future<Output = StoreResult<Vec<Document>>> + Send;

    /// Open a new idle session
    fn start_session(&self) -> impl Future<Output = StoreResult<Session>> + Send;

    /// Begin a transaction on `session`
    fn start_transaction(&self, session: &Session)
        -> impl Future<Output = StoreResult<()>> + Send;

    /// Publish the staged changes of `session` atomically
    fn commit_transaction(
        &self,
        session: &Session,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Discard the staged changes of `session`
    fn abort_transaction(
        &self,
        session: &Session,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Release `session`; an open transaction is aborted
    fn end_session(&self, session: &Session) -> impl Future<Output = StoreResult<()>> + Send;
}
