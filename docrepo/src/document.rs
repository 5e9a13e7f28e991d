//! Document representation shared by models, stores and repositories
//!
//! Documents are JSON objects. Filters and update patches use the same shape and
//! are forwarded to the store as-is; the [`doc!`](crate::doc) macro builds any
//! of them with `serde_json::json!` syntax:
//!
//! ```rust
//! use docrepo::doc;
//!
//! let filter = doc! { "status": "active", "age": { "$gte": 18 } };
//! assert_eq!(filter.len(), 2);
//!
//! let all = doc! {};
//! assert!(all.is_empty());
//! ```

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

/// A stored document (JSON object)
pub type Document = Map<String, Value>;

/// Field path to match-condition mapping; empty matches everything
pub type Filter = Document;

/// Field path to new-value (or update operator) mapping
pub type UpdatePatch = Document;

/// Name of the identity field
pub const ID_FIELD: &str = "_id";

/// Build a [`Document`] using `serde_json::json!` object syntax.
#[macro_export]
macro_rules! doc {
    ($($body:tt)*) => {
        match $crate::serde_json::json!({ $($body)* }) {
            $crate::serde_json::Value::Object(map) => map,
            _ => $crate::serde_json::Map::new(),
        }
    };
}

/// Serialize any value into a document.
///
/// Fails when the value does not serialize to a JSON object.
pub fn to_document<V: Serialize + ?Sized>(value: &V) -> Result<Document, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(serde::ser::Error::custom(format!(
            "expected an object, got {}",
            type_name(&other)
        ))),
    }
}

/// Deserialize a document into a typed value.
pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(document))
}

/// Read the identity of a document, if it has a string one.
pub fn document_id(document: &Document) -> Option<&str> {
    document.get(ID_FIELD).and_then(Value::as_str)
}

/// Resolve a dot-separated path inside a document.
///
/// Numeric segments index into arrays (`items.0.sku`).
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = document.get(first)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set a value at a dot-separated path, creating intermediate objects.
///
/// Returns `false` when an intermediate segment exists but is not an object.
pub fn set_path(document: &mut Document, path: &str, value: Value) -> bool {
    match path.split_once('.') {
        None => {
            document.insert(path.to_string(), value);
            true
        }
        Some((head, rest)) => {
            let entry = document
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if entry.is_null() {
                *entry = Value::Object(Map::new());
            }
            match entry {
                Value::Object(child) => set_path(child, rest, value),
                _ => false,
            }
        }
    }
}

/// Remove the value at a dot-separated path, returning it.
pub fn remove_path(document: &mut Document, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head)? {
            Value::Object(child) => remove_path(child, rest),
            _ => None,
        },
    }
}

/// Human-readable JSON type name, used in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
