//! Filter matching, sorting and projection
//!
//! Supported filter grammar:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `{"field": value}` | equality (or array membership) |
//! | `$eq` `$ne` `$gt` `$gte` `$lt` `$lte` | comparison |
//! | `$in` `$nin` | set membership |
//! | `$exists` | presence |
//! | `$regex` (+ `$options`) | pattern match on strings |
//! | `$size` | array length |
//! | `$not` | negated operator expression |
//! | `$elemMatch` | some array element matches |
//! | `$and` `$or` `$nor` | top-level logic |
//!
//! Dotted paths descend into nested objects and fan out across arrays.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::{Map, Value};

use crate::document::{get_path, remove_path, set_path, Document, Filter, ID_FIELD};

use super::{OrderDirection, StoreError, StoreResult};

fn malformed(message: impl Into<String>) -> StoreError {
    StoreError::MalformedQuery(message.into())
}

/// Whether `document` satisfies `filter`
pub fn matches(document: &Document, filter: &Filter) -> StoreResult<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(document, key, condition)?,
            "$nor" => !any_clause(document, key, condition)?,
            op if op.starts_with('$') => {
                return Err(malformed(format!("unknown top level operator: {op}")))
            }
            path => {
                let candidates = resolve(document, path);
                matches_condition(&candidates, condition)?
            }
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(operator: &str, value: &'a Value) -> StoreResult<Vec<&'a Document>> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| malformed(format!("{operator} must be a nonempty array")))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| malformed(format!("{operator} entries must be objects")))
        })
        .collect()
}

fn any_clause(document: &Document, operator: &str, value: &Value) -> StoreResult<bool> {
    for clause in clauses(operator, value)? {
        if matches(document, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Every value reachable at `path`, fanning out across arrays of objects.
fn resolve<'a>(document: &'a Document, path: &str) -> Vec<&'a Value> {
    let mut current: Vec<&Value> = match path.split_once('.') {
        None => return document.get(path).into_iter().collect(),
        Some((head, _)) => document.get(head).into_iter().collect(),
    };
    for segment in path.split('.').skip(1) {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => next.extend(map.get(segment)),
                Value::Array(items) => match segment.parse::<usize>() {
                    Ok(index) => next.extend(items.get(index)),
                    Err(_) => next.extend(
                        items
                            .iter()
                            .filter_map(|item| item.as_object())
                            .filter_map(|map| map.get(segment)),
                    ),
                },
                _ => {}
            }
        }
        current = next;
    }
    current
}

fn is_operator_object(map: &Map<String, Value>) -> StoreResult<bool> {
    let operators = map.keys().filter(|k| k.starts_with('$')).count();
    if operators == 0 {
        Ok(false)
    } else if operators == map.len() {
        Ok(true)
    } else {
        Err(malformed(
            "cannot mix operators and plain fields in one condition",
        ))
    }
}

fn matches_condition(candidates: &[&Value], condition: &Value) -> StoreResult<bool> {
    match condition {
        Value::Object(ops) if is_operator_object(ops)? => apply_operators(candidates, ops),
        literal => Ok(equals_any(candidates, literal)),
    }
}

/// Whether a standalone value satisfies a condition (operator object or literal).
pub(crate) fn value_matches(value: &Value, condition: &Value) -> StoreResult<bool> {
    match (value, condition) {
        (Value::Object(map), Value::Object(cond)) if !is_operator_object(cond)? => {
            if values_equal(value, condition) {
                return Ok(true);
            }
            matches(map, cond)
        }
        _ => matches_condition(&[value], condition),
    }
}

fn apply_operators(candidates: &[&Value], ops: &Map<String, Value>) -> StoreResult<bool> {
    for (op, operand) in ops {
        let satisfied = match op.as_str() {
            "$eq" => equals_any(candidates, operand),
            "$ne" => !equals_any(candidates, operand),
            "$gt" => compare_any(candidates, operand, |o| o == Ordering::Greater),
            "$gte" => compare_any(candidates, operand, |o| o != Ordering::Less),
            "$lt" => compare_any(candidates, operand, |o| o == Ordering::Less),
            "$lte" => compare_any(candidates, operand, |o| o != Ordering::Greater),
            "$in" => in_list(candidates, op, operand)?,
            "$nin" => !in_list(candidates, op, operand)?,
            "$exists" => candidates.is_empty() != truthy(operand),
            "$regex" => regex_any(candidates, operand, ops.get("$options"))?,
            "$options" => {
                if !ops.contains_key("$regex") {
                    return Err(malformed("$options needs a $regex"));
                }
                true
            }
            "$size" => {
                let size = operand
                    .as_u64()
                    .ok_or_else(|| malformed("$size needs a non-negative integer"))?;
                candidates
                    .iter()
                    .any(|c| c.as_array().is_some_and(|a| a.len() as u64 == size))
            }
            "$not" => match operand {
                Value::Object(inner) if is_operator_object(inner)? => {
                    !apply_operators(candidates, inner)?
                }
                _ => return Err(malformed("$not needs an operator expression")),
            },
            "$elemMatch" => {
                let cond = operand
                    .as_object()
                    .ok_or_else(|| malformed("$elemMatch needs an object"))?;
                let operator_form = is_operator_object(cond)?;
                let mut found = false;
                'outer: for candidate in candidates {
                    if let Value::Array(items) = candidate {
                        for item in items {
                            let hit = match item {
                                _ if operator_form => apply_operators(&[item], cond)?,
                                Value::Object(map) => matches(map, cond)?,
                                _ => false,
                            };
                            if hit {
                                found = true;
                                break 'outer;
                            }
                        }
                    }
                }
                found
            }
            unknown => return Err(malformed(format!("unknown operator: {unknown}"))),
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

/// Equality where a missing field equals `null` and arrays match by membership.
fn equals_any(candidates: &[&Value], target: &Value) -> bool {
    if candidates.is_empty() {
        return target.is_null();
    }
    candidates.iter().any(|candidate| {
        values_equal(candidate, target)
            || matches!(candidate, Value::Array(items) if !target.is_array() && items.iter().any(|i| values_equal(i, target)))
    })
}

fn in_list(candidates: &[&Value], op: &str, operand: &Value) -> StoreResult<bool> {
    let list = operand
        .as_array()
        .ok_or_else(|| malformed(format!("{op} needs an array")))?;
    Ok(list.iter().any(|target| equals_any(candidates, target)))
}

fn compare_any(candidates: &[&Value], operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |value: &Value| comparable(value, operand).is_some_and(&accept);
    candidates.iter().any(|candidate| match *candidate {
        Value::Array(items) if !operand.is_array() => items.iter().any(check),
        other => check(other),
    })
}

/// Ordering between values of the same kind; `None` across kinds.
fn comparable(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            Some(compare_values(a, b))
        }
        _ => None,
    }
}

fn regex_any(candidates: &[&Value], pattern: &Value, options: Option<&Value>) -> StoreResult<bool> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| malformed("$regex needs a string pattern"))?;
    let options = match options {
        None => "",
        Some(Value::String(o)) => o.as_str(),
        Some(_) => return Err(malformed("$options needs a string")),
    };
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => return Err(malformed(format!("invalid regex option: {other}"))),
        };
    }
    let regex = builder
        .build()
        .map_err(|e| malformed(format!("invalid regex: {e}")))?;
    let hit = |value: &Value| value.as_str().is_some_and(|s| regex.is_match(s));
    Ok(candidates.iter().any(|candidate| match *candidate {
        Value::Array(items) => items.iter().any(hit),
        other => hit(other),
    }))
}

/// Structural equality with numbers compared by value (`1 == 1.0`).
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order across all values: null < numbers < strings < objects < arrays < booleans.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y) {
                let ord = lk.cmp(rk).then_with(|| compare_values(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Stable multi-key sort; missing fields sort as `null`.
pub fn sort_documents(documents: &mut [Document], keys: &[(String, OrderDirection)]) {
    if keys.is_empty() {
        return;
    }
    documents.sort_by(|a, b| {
        for (path, direction) in keys {
            let left = get_path(a, path).unwrap_or(&Value::Null);
            let right = get_path(b, path).unwrap_or(&Value::Null);
            let ord = compare_values(left, right);
            let ord = match direction {
                OrderDirection::Ascending => ord,
                OrderDirection::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Parse a sort document (`{"field": 1 | -1 | "asc" | "desc"}`).
pub fn parse_sort(spec: &Document) -> StoreResult<Vec<(String, OrderDirection)>> {
    spec.iter()
        .map(|(field, direction)| {
            let direction = match direction {
                Value::Number(n) if n.as_f64() == Some(1.0) => OrderDirection::Ascending,
                Value::Number(n) if n.as_f64() == Some(-1.0) => OrderDirection::Descending,
                Value::String(s) if matches!(s.as_str(), "asc" | "ascending") => {
                    OrderDirection::Ascending
                }
                Value::String(s) if matches!(s.as_str(), "desc" | "descending") => {
                    OrderDirection::Descending
                }
                other => {
                    return Err(malformed(format!(
                        "invalid sort direction for {field}: {other}"
                    )))
                }
            };
            Ok((field.clone(), direction))
        })
        .collect()
}

fn projection_flag(field: &str, value: &Value) -> StoreResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        other => Err(malformed(format!(
            "invalid projection value for {field}: {other}"
        ))),
    }
}

/// Apply an inclusion or exclusion projection.
///
/// `_id` is kept unless explicitly excluded; mixing inclusion and exclusion of
/// other fields is rejected.
pub fn project(document: &Document, projection: &Document) -> StoreResult<Document> {
    if projection.is_empty() {
        return Ok(document.clone());
    }
    let mut include_id = true;
    let mut fields = Vec::new();
    let mut mode: Option<bool> = None;
    for (field, value) in projection {
        let flag = projection_flag(field, value)?;
        if field == ID_FIELD {
            include_id = flag;
            continue;
        }
        match mode {
            Some(existing) if existing != flag => {
                return Err(malformed(
                    "projection cannot mix inclusion and exclusion",
                ))
            }
            _ => mode = Some(flag),
        }
        fields.push(field.as_str());
    }

    // only `_id` given: inclusion of `_id` alone, or exclusion of it
    let inclusive = mode.unwrap_or(include_id);

    if inclusive {
        let mut out = Document::new();
        if include_id {
            if let Some(id) = document.get(ID_FIELD) {
                out.insert(ID_FIELD.to_string(), id.clone());
            }
        }
        for field in fields {
            if let Some(value) = get_path(document, field) {
                set_path(&mut out, field, value.clone());
            }
        }
        Ok(out)
    } else {
        let mut out = document.clone();
        if !include_id {
            out.remove(ID_FIELD);
        }
        for field in fields {
            remove_path(&mut out, field);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use serde_json::json;

    fn user() -> Document {
        doc! {
            "_id": "u1",
            "name": "Ada",
            "age": 36,
            "tags": ["admin", "ops"],
            "address": { "city": "London" },
            "orders": [{ "sku": "A", "qty": 2 }, { "sku": "B", "qty": 5 }]
        }
    }

    #[test]
    fn test_equality_and_membership() {
        let d = user();
        assert!(matches(&d, &doc! {}).unwrap());
        assert!(matches(&d, &doc! { "name": "Ada" }).unwrap());
        assert!(matches(&d, &doc! { "age": 36.0 }).unwrap());
        assert!(matches(&d, &doc! { "tags": "ops" }).unwrap());
        assert!(matches(&d, &doc! { "address.city": "London" }).unwrap());
        assert!(matches(&d, &doc! { "orders.sku": "B" }).unwrap());
        assert!(matches(&d, &doc! { "missing": null }).unwrap());
        assert!(!matches(&d, &doc! { "name": "Bob" }).unwrap());
    }

    #[test]
    fn test_comparison_operators() {
        let d = user();
        assert!(matches(&d, &doc! { "age": { "$gte": 18, "$lt": 40 } }).unwrap());
        assert!(!matches(&d, &doc! { "age": { "$gt": 36 } }).unwrap());
        assert!(matches(&d, &doc! { "age": { "$ne": 20 } }).unwrap());
        assert!(!matches(&d, &doc! { "name": { "$gt": 5 } }).unwrap());
        assert!(matches(&d, &doc! { "orders.qty": { "$gt": 4 } }).unwrap());
    }

    #[test]
    fn test_set_and_existence_operators() {
        let d = user();
        assert!(matches(&d, &doc! { "name": { "$in": ["Ada", "Bob"] } }).unwrap());
        assert!(matches(&d, &doc! { "name": { "$nin": ["Bob"] } }).unwrap());
        assert!(matches(&d, &doc! { "tags": { "$in": ["ops"] } }).unwrap());
        assert!(matches(&d, &doc! { "age": { "$exists": true } }).unwrap());
        assert!(matches(&d, &doc! { "email": { "$exists": false } }).unwrap());
        assert!(matches(&d, &doc! { "tags": { "$size": 2 } }).unwrap());
    }

    #[test]
    fn test_regex_and_negation() {
        let d = user();
        assert!(matches(&d, &doc! { "name": { "$regex": "^a", "$options": "i" } }).unwrap());
        assert!(!matches(&d, &doc! { "name": { "$regex": "^a" } }).unwrap());
        assert!(matches(&d, &doc! { "age": { "$not": { "$gt": 40 } } }).unwrap());
    }

    #[test]
    fn test_elem_match() {
        let d = user();
        assert!(matches(
            &d,
            &doc! { "orders": { "$elemMatch": { "sku": "B", "qty": { "$gte": 5 } } } }
        )
        .unwrap());
        assert!(!matches(
            &d,
            &doc! { "orders": { "$elemMatch": { "sku": "A", "qty": { "$gte": 5 } } } }
        )
        .unwrap());
    }

    #[test]
    fn test_logical_operators() {
        let d = user();
        assert!(matches(&d, &doc! { "$or": [{ "name": "Bob" }, { "age": 36 }] }).unwrap());
        assert!(!matches(&d, &doc! { "$and": [{ "name": "Ada" }, { "age": 1 }] }).unwrap());
        assert!(matches(&d, &doc! { "$nor": [{ "name": "Bob" }] }).unwrap());
    }

    #[test]
    fn test_malformed_filters() {
        let d = user();
        for filter in [
            doc! { "age": { "$between": [1, 2] } },
            doc! { "$where": "1" },
            doc! { "$or": [] },
            doc! { "name": { "$in": "Ada" } },
            doc! { "age": { "$gt": 1, "plain": 2 } },
            doc! { "name": { "$regex": "(" } },
        ] {
            let err = matches(&d, &filter).unwrap_err();
            assert!(matches!(err, StoreError::MalformedQuery(_)), "{filter:?}");
        }
    }

    #[test]
    fn test_sort_is_total_and_stable() {
        let mut docs = vec![
            doc! { "k": "b", "n": 1 },
            doc! { "n": 2 },
            doc! { "k": 3, "n": 3 },
            doc! { "k": "a", "n": 4 },
            doc! { "k": "a", "n": 5 },
        ];
        sort_documents(&mut docs, &[("k".into(), OrderDirection::Ascending)]);
        let order: Vec<_> = docs.iter().map(|d| d["n"].clone()).collect();
        assert_eq!(order, vec![json!(2), json!(3), json!(4), json!(5), json!(1)]);

        sort_documents(
            &mut docs,
            &[
                ("k".into(), OrderDirection::Descending),
                ("n".into(), OrderDirection::Descending),
            ],
        );
        let order: Vec<_> = docs.iter().map(|d| d["n"].clone()).collect();
        assert_eq!(order, vec![json!(1), json!(5), json!(4), json!(3), json!(2)]);
    }

    #[test]
    fn test_parse_sort() {
        let keys = parse_sort(&doc! { "createdAt": -1, "name": "asc" }).unwrap();
        assert_eq!(
            keys,
            vec![
                ("createdAt".to_string(), OrderDirection::Descending),
                ("name".to_string(), OrderDirection::Ascending)
            ]
        );
        assert!(parse_sort(&doc! { "name": 2 }).is_err());
    }

    #[test]
    fn test_projection() {
        let d = user();
        let inc = project(&d, &doc! { "name": 1, "address.city": 1 }).unwrap();
        assert_eq!(
            Value::Object(inc),
            json!({ "_id": "u1", "name": "Ada", "address": { "city": "London" } })
        );

        let exc = project(&d, &doc! { "_id": 0, "orders": 0, "tags": false }).unwrap();
        assert!(!exc.contains_key("_id"));
        assert!(!exc.contains_key("orders"));
        assert!(exc.contains_key("age"));

        let id_only = project(&d, &doc! { "_id": 1 }).unwrap();
        assert_eq!(Value::Object(id_only), json!({ "_id": "u1" }));

        assert!(project(&d, &doc! { "name": 1, "age": 0 }).is_err());
    }
}
