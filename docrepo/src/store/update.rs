//! Update patch application
//!
//! A patch is either a plain field map (treated as `$set`) or a map of update
//! operators: `$set` `$unset` `$inc` `$mul` `$min` `$max` `$push` `$pull`
//! `$addToSet`. Plain keys next to operators are folded into `$set`. The
//! identity field can never change.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use crate::document::{get_path, remove_path, set_path, type_name, Document, UpdatePatch, ID_FIELD};

use super::query::{compare_values, value_matches, values_equal};
use super::{StoreError, StoreResult};

fn malformed(message: impl Into<String>) -> StoreError {
    StoreError::MalformedQuery(message.into())
}

/// Apply `patch` to `document` in place; returns whether anything changed.
///
/// On error the document may be partially updated, so callers apply patches
/// to a copy.
pub fn apply_update(document: &mut Document, patch: &UpdatePatch) -> StoreResult<bool> {
    let before = document.clone();

    let mut implicit_set = Map::new();
    for (key, value) in patch {
        if !key.starts_with('$') {
            implicit_set.insert(key.clone(), value.clone());
        }
    }
    if !implicit_set.is_empty() {
        apply_operator(document, "$set", &implicit_set)?;
    }

    for (key, operand) in patch.iter().filter(|(k, _)| k.starts_with('$')) {
        let fields = operand
            .as_object()
            .ok_or_else(|| malformed(format!("modifier {key} needs an object of fields")))?;
        apply_operator(document, key, fields)?;
    }

    Ok(*document != before)
}

fn apply_operator(document: &mut Document, operator: &str, fields: &Map<String, Value>) -> StoreResult<()> {
    for (path, operand) in fields {
        guard_identity(document, operator, path, operand)?;
        match operator {
            "$set" => assign(document, path, operand.clone())?,
            "$unset" => {
                remove_path(document, path);
            }
            "$inc" | "$mul" => {
                let value = arithmetic(operator, path, get_path(document, path), operand)?;
                assign(document, path, value)?;
            }
            "$min" | "$max" => {
                let wanted = if operator == "$min" {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let replace = match get_path(document, path) {
                    None => true,
                    Some(current) => compare_values(operand, current) == wanted,
                };
                if replace {
                    assign(document, path, operand.clone())?;
                }
            }
            "$push" | "$addToSet" => {
                let items = match operand {
                    Value::Object(spec) if spec.contains_key("$each") => spec
                        .get("$each")
                        .and_then(Value::as_array)
                        .cloned()
                        .ok_or_else(|| malformed("$each needs an array"))?,
                    single => vec![single.clone()],
                };
                let mut array = current_array(document, operator, path)?;
                for item in items {
                    if operator == "$push" || !array.iter().any(|e| values_equal(e, &item)) {
                        array.push(item);
                    }
                }
                assign(document, path, Value::Array(array))?;
            }
            "$pull" => {
                if get_path(document, path).is_none() {
                    continue;
                }
                let array = current_array(document, operator, path)?;
                let mut kept = Vec::with_capacity(array.len());
                for item in array {
                    if !value_matches(&item, operand)? {
                        kept.push(item);
                    }
                }
                assign(document, path, Value::Array(kept))?;
            }
            unknown => return Err(malformed(format!("unknown update modifier: {unknown}"))),
        }
    }
    Ok(())
}

fn guard_identity(document: &Document, operator: &str, path: &str, operand: &Value) -> StoreResult<()> {
    let touches_id = path == ID_FIELD || path.starts_with("_id.");
    if !touches_id {
        return Ok(());
    }
    // re-setting the same identity is a no-op
    if operator == "$set" && get_path(document, path).is_some_and(|current| values_equal(current, operand)) {
        return Ok(());
    }
    Err(malformed(format!(
        "performing an update on the path '{path}' would modify the immutable field '{ID_FIELD}'"
    )))
}

fn assign(document: &mut Document, path: &str, value: Value) -> StoreResult<()> {
    if set_path(document, path, value) {
        Ok(())
    } else {
        Err(malformed(format!("cannot create field along path '{path}'")))
    }
}

fn current_array(document: &Document, operator: &str, path: &str) -> StoreResult<Vec<Value>> {
    match get_path(document, path) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(malformed(format!(
            "cannot apply {operator} to non-array field '{path}' of type {}",
            type_name(other)
        ))),
    }
}

fn arithmetic(operator: &str, path: &str, current: Option<&Value>, operand: &Value) -> StoreResult<Value> {
    let operand = match operand {
        Value::Number(n) => n,
        other => {
            return Err(malformed(format!(
                "cannot {operator} with non-numeric argument of type {}",
                type_name(other)
            )))
        }
    };
    let zero = Number::from(0);
    let current = match current {
        None | Some(Value::Null) => &zero,
        Some(Value::Number(n)) => n,
        Some(other) => {
            return Err(malformed(format!(
                "cannot apply {operator} to field '{path}' of non-numeric type {}",
                type_name(other)
            )))
        }
    };

    if let (Some(a), Some(b)) = (current.as_i64(), operand.as_i64()) {
        let exact = if operator == "$inc" {
            a.checked_add(b)
        } else {
            a.checked_mul(b)
        };
        if let Some(result) = exact {
            return Ok(Value::from(result));
        }
    }

    let (a, b) = (
        current.as_f64().unwrap_or_default(),
        operand.as_f64().unwrap_or_default(),
    );
    let result = if operator == "$inc" { a + b } else { a * b };
    Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| malformed(format!("{operator} on '{path}' produced a non-finite number")))
}
