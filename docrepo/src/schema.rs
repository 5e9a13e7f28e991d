//! Per-collection schema rules
//!
//! A [`Schema`] lists field rules for one collection. Defaults are filled in
//! by the model before insertion; the store validates complete documents after
//! every insert and update so that partial patches cannot bypass a rule.
//!
//! ```rust
//! use docrepo::schema::{FieldRule, Schema};
//! use docrepo::doc;
//!
//! let schema = Schema::new()
//!     .field("name", FieldRule::string().required().max_length(255))
//!     .field("price", FieldRule::number().required().min(0.0));
//!
//! let errors = schema.validate(&doc! { "name": "Widget", "price": -5 }).unwrap_err();
//! assert_eq!(errors[0].field, "price");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{get_path, set_path, Document};

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field path
    pub field: String,
    /// Error code (e.g., "REQUIRED", "MIN", "ENUM")
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl FieldError {
    /// Create a new field error
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Expected JSON type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// Any number
    Number,
    /// Whole number
    Integer,
    /// true / false
    Boolean,
    /// JSON array
    Array,
    /// Nested object
    Object,
    /// No type check
    #[default]
    Any,
}

impl FieldType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::Integer => "Integer",
            Self::Boolean => "Boolean",
            Self::Array => "Array",
            Self::Object => "Object",
            Self::Any => "Any",
        }
    }
}

/// Validation rule for one field path
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldRule {
    /// Expected type
    pub field_type: FieldType,
    /// Whether the field must be present and non-null
    pub required: bool,
    /// Minimum numeric value (inclusive)
    pub min: Option<f64>,
    /// Maximum numeric value (inclusive)
    pub max: Option<f64>,
    /// Minimum string / array length
    pub min_length: Option<usize>,
    /// Maximum string / array length
    pub max_length: Option<usize>,
    /// Allowed values; empty means unrestricted
    pub enum_values: Vec<Value>,
    /// Value filled in on insert when the field is absent
    pub default: Option<Value>,
}

impl FieldRule {
    /// Rule with the given type and no constraints
    pub fn of_type(field_type: FieldType) -> Self {
        Self {
            field_type,
            ..Self::default()
        }
    }

    /// String field
    pub fn string() -> Self {
        Self::of_type(FieldType::String)
    }

    /// Numeric field
    pub fn number() -> Self {
        Self::of_type(FieldType::Number)
    }

    /// Integer field
    pub fn integer() -> Self {
        Self::of_type(FieldType::Integer)
    }

    /// Boolean field
    pub fn boolean() -> Self {
        Self::of_type(FieldType::Boolean)
    }

    /// Array field
    pub fn array() -> Self {
        Self::of_type(FieldType::Array)
    }

    /// Object field
    pub fn object() -> Self {
        Self::of_type(FieldType::Object)
    }

    /// Untyped field
    pub fn any() -> Self {
        Self::of_type(FieldType::Any)
    }

    /// Mark the field as required
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Minimum numeric value
    #[must_use]
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Maximum numeric value
    #[must_use]
    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Minimum length
    #[must_use]
    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }

    /// Maximum length
    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    /// Restrict the field to a fixed set of values
    #[must_use]
    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Default value applied on insert
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn check(&self, path: &str, value: Option<&Value>, errors: &mut Vec<FieldError>) {
        let value = match value {
            None | Some(Value::Null) => {
                if self.required {
                    errors.push(FieldError::new(
                        path,
                        "REQUIRED",
                        format!("Path `{path}` is required."),
                    ));
                }
                return;
            }
            Some(value) => value,
        };

        if !self.field_type.accepts(value) {
            errors.push(FieldError::new(
                path,
                "INVALID_TYPE",
                format!(
                    "Cast to {} failed for value {} at path `{path}`",
                    self.field_type.label(),
                    value
                ),
            ));
            return;
        }

        if let Some(number) = value.as_f64() {
            if let Some(min) = self.min {
                if number < min {
                    errors.push(FieldError::new(
                        path,
                        "MIN",
                        format!(
                            "Path `{path}` ({value}) is less than minimum allowed value ({min})."
                        ),
                    ));
                }
            }
            if let Some(max) = self.max {
                if number > max {
                    errors.push(FieldError::new(
                        path,
                        "MAX",
                        format!(
                            "Path `{path}` ({value}) is more than maximum allowed value ({max})."
                        ),
                    ));
                }
            }
        }

        let length = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let Some(length) = length {
            if let Some(max_length) = self.max_length {
                if length > max_length {
                    errors.push(FieldError::new(
                        path,
                        "MAX_LENGTH",
                        format!(
                            "Path `{path}` is longer than the maximum allowed length ({max_length})."
                        ),
                    ));
                }
            }
            if let Some(min_length) = self.min_length {
                if length < min_length {
                    errors.push(FieldError::new(
                        path,
                        "MIN_LENGTH",
                        format!(
                            "Path `{path}` is shorter than the minimum allowed length ({min_length})."
                        ),
                    ));
                }
            }
        }

        if !self.enum_values.is_empty() && !self.enum_values.contains(value) {
            errors.push(FieldError::new(
                path,
                "ENUM",
                format!("{value} is not a valid enum value for path `{path}`."),
            ));
        }
    }
}

/// Ordered set of field rules for a collection
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    fields: Vec<(String, FieldRule)>,
}

impl Schema {
    /// Empty schema (accepts every document)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the rule for a field path
    #[must_use]
    pub fn field(mut self, path: impl Into<String>, rule: FieldRule) -> Self {
        let path = path.into();
        match self.fields.iter_mut().find(|(p, _)| *p == path) {
            Some(existing) => existing.1 = rule,
            None => self.fields.push((path, rule)),
        }
        self
    }

    /// Rule for a field path
    pub fn rule(&self, path: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|(p, _)| p == path).map(|(_, r)| r)
    }

    /// Whether the schema has no rules
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fill in defaults for absent fields
    pub fn apply_defaults(&self, document: &mut Document) {
        for (path, rule) in &self.fields {
            if let Some(default) = &rule.default {
                if get_path(document, path).is_none() {
                    set_path(document, path, default.clone());
                }
            }
        }
    }

    /// Validate a complete document, collecting every field error
    pub fn validate(&self, document: &Document) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        for (path, rule) in &self.fields {
            rule.check(path, get_path(document, path), &mut errors);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
