//! Model handles
//!
//! A [`Model`] binds one entity kind to its collection, its [`Schema`], its
//! timestamp policy and the store that holds it. Repositories are built from a
//! model; nothing is looked up from global state.
//!
//! ```rust
//! use docrepo::model::Model;
//! use docrepo::schema::{FieldRule, Schema};
//! use docrepo::store::MemoryStore;
//!
//! let model = Model::builder("Category", MemoryStore::new("shop"))
//!     .schema(Schema::new().field("name", FieldRule::string().required()))
//!     .timestamps(true)
//!     .build();
//! assert_eq!(model.collection(), "categories");
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::document::{Document, UpdatePatch};
use crate::schema::Schema;
use crate::store::DocumentStore;

/// Name of the creation timestamp field
pub const CREATED_AT: &str = "createdAt";
/// Name of the modification timestamp field
pub const UPDATED_AT: &str = "updatedAt";

/// Immutable handle to one entity's collection
pub struct Model<S> {
    inner: Arc<ModelInner<S>>,
}

struct ModelInner<S> {
    name: String,
    collection: String,
    schema: Schema,
    timestamps: bool,
    store: S,
}

impl<S> Clone for Model<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for Model<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.inner.name)
            .field("collection", &self.inner.collection)
            .field("timestamps", &self.inner.timestamps)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore> Model<S> {
    /// Start building a model named `name` (e.g. `"User"`)
    pub fn builder(name: impl Into<String>, store: S) -> ModelBuilder<S> {
        ModelBuilder {
            name: name.into(),
            store,
            collection: None,
            schema: Schema::new(),
            timestamps: false,
        }
    }

    /// Model name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Collection holding the documents
    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    /// Validation rules
    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Whether `createdAt` / `updatedAt` are managed
    pub fn timestamps(&self) -> bool {
        self.inner.timestamps
    }

    /// Store handle
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Apply schema defaults and creation timestamps to a new document
    pub fn prepare_insert(&self, mut document: Document) -> Document {
        self.inner.schema.apply_defaults(&mut document);
        if self.inner.timestamps {
            let now = timestamp_now();
            if !document.contains_key(CREATED_AT) {
                document.insert(CREATED_AT.to_string(), now.clone());
            }
            document.insert(UPDATED_AT.to_string(), now);
        }
        document
    }

    /// Stamp `updatedAt` onto an update patch
    pub fn prepare_update(&self, mut patch: UpdatePatch) -> UpdatePatch {
        if !self.inner.timestamps {
            return patch;
        }
        let now = timestamp_now();
        let uses_operators = patch.keys().any(|k| k.starts_with('$'));
        if !uses_operators {
            patch.entry(UPDATED_AT.to_string()).or_insert(now);
            return patch;
        }
        if let Value::Object(set) = patch
            .entry("$set".to_string())
            .or_insert_with(|| Value::Object(Map::new()))
        {
            set.entry(UPDATED_AT.to_string()).or_insert(now);
        }
        patch
    }
}

fn timestamp_now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Default collection name: lower-cased, pluralised model name
fn collection_name(model: &str) -> String {
    let lower = model.to_lowercase();
    let ends_with_consonant_y = lower.ends_with('y')
        && !lower
            .chars()
            .rev()
            .nth(1)
            .is_some_and(|c| "aeiou".contains(c));
    if ends_with_consonant_y {
        format!("{}ies", &lower[..lower.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|end| lower.ends_with(end)) {
        format!("{lower}es")
    } else {
        format!("{lower}s")
    }
}

/// Builder for [`Model`]
pub struct ModelBuilder<S> {
    name: String,
    store: S,
    collection: Option<String>,
    schema: Schema,
    timestamps: bool,
}

impl<S: DocumentStore> ModelBuilder<S> {
    /// Override the collection name
    #[must_use]
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Set the validation rules
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Manage `createdAt` / `updatedAt`
    #[must_use]
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Finish the model
    pub fn build(self) -> Model<S> {
        let collection = self
            .collection
            .unwrap_or_else(|| collection_name(&self.name));
        Model {
            inner: Arc::new(ModelInner {
                name: self.name,
                collection,
                schema: self.schema,
                timestamps: self.timestamps,
                store: self.store,
            }),
        }
    }
}
