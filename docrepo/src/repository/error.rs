//! Repository error types
//!
//! Every repository failure is a [`RepositoryError`] naming the operation that
//! failed, a coarse [`RepositoryErrorKind`], and the underlying message. "Not
//! found" is never an error: lookups return `None`.
//!
//! # Example
//!
//! ```rust
//! use docrepo::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
//!
//! let error = RepositoryError::invalid_id(RepositoryOperation::FindById, "");
//! assert!(matches!(error.kind, RepositoryErrorKind::InvalidId));
//! assert_eq!(error.to_string(), "Repository invalid_id error during find_by_id: Invalid document id \"\"");
//! ```

use std::fmt;

use crate::schema::FieldError;
use crate::store::StoreError;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Finding a single entity by id
    FindById,
    /// Finding the first entity matching a filter
    FindOne,
    /// Finding every entity matching a filter
    FindMany,
    /// Paginated find
    FindWithPagination,
    /// Counting entities matching a filter
    Count,
    /// Checking whether any entity matches a filter
    Exists,
    /// Creating a new entity
    Create,
    /// Creating several entities in one round trip
    CreateMany,
    /// Updating an entity by id
    UpdateById,
    /// Updating the first entity matching a filter
    UpdateOne,
    /// Updating every entity matching a filter
    UpdateMany,
    /// Deleting an entity by id
    DeleteById,
    /// Deleting the first entity matching a filter
    DeleteOne,
    /// Deleting every entity matching a filter
    DeleteMany,
    /// Ordered bulk write
    BulkWrite,
    /// Aggregation pipeline
    Aggregate,
    /// Transaction orchestration
    Transaction,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FindById => write!(f, "find_by_id"),
            Self::FindOne => write!(f, "find_one"),
            Self::FindMany => write!(f, "find_many"),
            Self::FindWithPagination => write!(f, "find_with_pagination"),
            Self::Count => write!(f, "count"),
            Self::Exists => write!(f, "exists"),
            Self::Create => write!(f, "create"),
            Self::CreateMany => write!(f, "create_many"),
            Self::UpdateById => write!(f, "update_by_id"),
            Self::UpdateOne => write!(f, "update_one"),
            Self::UpdateMany => write!(f, "update_many"),
            Self::DeleteById => write!(f, "delete_by_id"),
            Self::DeleteOne => write!(f, "delete_one"),
            Self::DeleteMany => write!(f, "delete_many"),
            Self::BulkWrite => write!(f, "bulk_write"),
            Self::Aggregate => write!(f, "aggregate"),
            Self::Transaction => write!(f, "transaction"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Document failed schema validation
    ValidationFailed,
    /// Identity already present (duplicate key)
    AlreadyExists,
    /// Identity value is not valid for the store
    InvalidId,
    /// Store unreachable or closed
    ConnectionFailed,
    /// Filter, update, projection or pipeline rejected by the store
    QueryFailed,
    /// Document could not be converted to or from the entity type
    SerializationError,
    /// Session or transaction misuse, or commit/abort failure
    TransactionFailed,
    /// Commit rejected because data changed underneath the transaction
    WriteConflict,
    /// A lifecycle hook failed
    HookFailed,
    /// Other unclassified error
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::AlreadyExists => write!(f, "already_exists"),
            Self::InvalidId => write!(f, "invalid_id"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::QueryFailed => write!(f, "query_failed"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::TransactionFailed => write!(f, "transaction_failed"),
            Self::WriteConflict => write!(f, "write_conflict"),
            Self::HookFailed => write!(f, "hook_failed"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured repository error with operation context
///
/// ```rust
/// use docrepo::repository::{RepositoryError, RepositoryOperation};
///
/// let error = RepositoryError::connection_failed(RepositoryOperation::Count, "store closed")
///     .with_entity("User", "0190c3a1");
/// assert!(error.is_retriable());
/// assert_eq!(
///     error.to_string(),
///     "Repository connection_failed error during count: store closed [User: 0190c3a1]"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The type of entity involved (e.g., "User", "Order")
    pub entity_type: Option<String>,
    /// The id of the entity involved
    pub entity_id: Option<String>,
    /// Per-field validation failures
    pub field_errors: Vec<FieldError>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
            field_errors: Vec::new(),
        }
    }

    /// Create a validation error from per-field failures
    ///
    /// ```rust
    /// use docrepo::repository::{RepositoryError, RepositoryOperation};
    /// use docrepo::schema::FieldError;
    ///
    /// let error = RepositoryError::validation_failed(
    ///     RepositoryOperation::Create,
    ///     vec![FieldError::new("price", "MIN", "Path `price` (-5) is less than minimum allowed value (0).")],
    /// );
    /// assert_eq!(error.field_errors[0].field, "price");
    /// ```
    pub fn validation_failed(operation: RepositoryOperation, field_errors: Vec<FieldError>) -> Self {
        let message = field_errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            field_errors,
            ..Self::new(
                operation,
                RepositoryErrorKind::ValidationFailed,
                format!("Validation failed: {message}"),
            )
        }
    }

    /// Create an invalid-id error
    pub fn invalid_id(operation: RepositoryOperation, id: &str) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::InvalidId,
            format!("Invalid document id {id:?}"),
        )
    }

    /// Create a connection failed error
    pub fn connection_failed(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::ConnectionFailed, message)
    }

    /// Create a query failed error
    pub fn query_failed(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::QueryFailed, message)
    }

    /// Create a serialization error
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Create a transaction error
    pub fn transaction_failed(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::TransactionFailed, message)
    }

    /// Create a hook failure
    ///
    /// Hooks return this to abort the surrounding operation.
    ///
    /// ```rust
    /// use docrepo::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
    ///
    /// let error = RepositoryError::hook_failed(RepositoryOperation::Create, "email is blocked");
    /// assert_eq!(error.kind, RepositoryErrorKind::HookFailed);
    /// ```
    pub fn hook_failed(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::HookFailed, message)
    }

    /// Wrap a store failure with the operation that caused it
    pub fn from_store(operation: RepositoryOperation, error: StoreError) -> Self {
        let message = error.to_string();
        match error.root() {
            StoreError::Validation(field_errors) => Self {
                message,
                ..Self::validation_failed(operation, field_errors.clone())
            },
            root => {
                let kind = match root {
                    StoreError::InvalidId(_) => RepositoryErrorKind::InvalidId,
                    StoreError::Unavailable(_) => RepositoryErrorKind::ConnectionFailed,
                    StoreError::MalformedQuery(_) => RepositoryErrorKind::QueryFailed,
                    StoreError::DuplicateKey(_) => RepositoryErrorKind::AlreadyExists,
                    StoreError::Transaction(_) => RepositoryErrorKind::TransactionFailed,
                    StoreError::WriteConflict(_) => RepositoryErrorKind::WriteConflict,
                    StoreError::Serialization(_) => RepositoryErrorKind::SerializationError,
                    StoreError::Validation(_) | StoreError::BulkOperationFailed { .. } => {
                        RepositoryErrorKind::Other
                    }
                };
                Self::new(operation, kind, message)
            }
        }
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Add the entity type only (no id known)
    #[must_use]
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    ///
    /// The layer itself never retries; this only informs the caller.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed | RepositoryErrorKind::WriteConflict
        )
    }

    /// Whether this is a schema validation failure
    pub fn is_validation(&self) -> bool {
        self.kind == RepositoryErrorKind::ValidationFailed
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        match (&self.entity_type, &self.entity_id) {
            (Some(entity_type), Some(entity_id)) => write!(f, " [{entity_type}: {entity_id}]")?,
            (Some(entity_type), None) => write!(f, " [{entity_type}]")?,
            _ => {}
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}
