use serde_json::{Map, Number, Value};

use crate::document::{get_path, set_path, Document, ID_FIELD};

use super::query::{compare_values, matches, parse_sort, project, sort_documents, values_equal};
use super::{StoreError, StoreResult};

fn malformed(message: impl Into<String>) -> StoreError {
    StoreError::MalformedQuery(message.into())
}

/// Run `pipeline` over `documents`.
///
/// Stages: `$match` `$sort` `$skip` `$limit` `$project` `$unwind` `$group`
/// `$count`. Groups come out in first-seen order.
pub(crate) fn run_pipeline(mut documents: Vec<Document>, pipeline: &[Document]) -> StoreResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (name, spec) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => return Err(malformed("a pipeline stage must have exactly one field")),
        };
        documents = match name.as_str() {
            "$match" => {
                let filter = object(name, spec)?;
                let mut kept = Vec::with_capacity(documents.len());
                for d in documents {
                    if matches(&d, filter)? {
                        kept.push(d);
                    }
                }
                kept
            }
            "$sort" => {
                let keys = parse_sort(object(name, spec)?)?;
                sort_documents(&mut documents, &keys);
                documents
            }
            "$skip" => {
                let n = count_arg(name, spec)?;
                documents.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = count_arg(name, spec)?;
                documents.truncate(n);
                documents
            }
            "$project" => {
                let projection = object(name, spec)?;
                documents
                    .iter()
                    .map(|d| project(d, projection))
                    .collect::<StoreResult<_>>()?
            }
            "$unwind" => unwind(documents, spec)?,
            "$group" => group(&documents, object(name, spec)?)?,
            "$count" => {
                let field = spec
                    .as_str()
                    .filter(|f| !f.is_empty() && !f.starts_with('$'))
                    .ok_or_else(|| malformed("$count needs a field name"))?;
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Map::new();
                    out.insert(field.to_string(), Value::from(documents.len() as u64));
                    vec![out]
                }
            }
            other => return Err(malformed(format!("unrecognized pipeline stage name: '{other}'"))),
        };
    }
    Ok(documents)
}

fn object<'a>(stage: &str, spec: &'a Value) -> StoreResult<&'a Document> {
    spec.as_object()
        .ok_or_else(|| malformed(format!("{stage} needs an object")))
}

fn count_arg(stage: &str, spec: &Value) -> StoreResult<usize> {
    spec.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| malformed(format!("{stage} needs a non-negative integer")))
}

fn field_ref(expr: &str) -> Option<&str> {
    expr.strip_prefix('$').filter(|p| !p.is_empty())
}

fn unwind(documents: Vec<Document>, spec: &Value) -> StoreResult<Vec<Document>> {
    let path = spec
        .as_str()
        .and_then(field_ref)
        .ok_or_else(|| malformed("$unwind needs a field path such as \"$items\""))?;
    let mut out = Vec::with_capacity(documents.len());
    for d in documents {
        match get_path(&d, path) {
            Some(Value::Array(items)) => {
                for item in items.clone() {
                    let mut copy = d.clone();
                    set_path(&mut copy, path, item);
                    out.push(copy);
                }
            }
            None | Some(Value::Null) => {}
            Some(_) => out.push(d),
        }
    }
    Ok(out)
}

/// Evaluate a group expression: `"$path"`, an object of expressions, or a literal.
fn evaluate(document: &Document, expr: &Value) -> Value {
    match expr {
        Value::String(s) => match field_ref(s) {
            Some(path) => get_path(document, path).cloned().unwrap_or(Value::Null),
            None => expr.clone(),
        },
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), evaluate(document, v)))
                .collect(),
        ),
        literal => literal.clone(),
    }
}

enum Accumulator {
    Sum { int: Option<i64>, float: f64 },
    Avg { total: f64, count: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
    First(Option<Value>),
    Last(Option<Value>),
    Push(Vec<Value>),
}

impl Accumulator {
    fn new(operator: &str) -> StoreResult<Self> {
        Ok(match operator {
            "$sum" => Self::Sum {
                int: Some(0),
                float: 0.0,
            },
            "$avg" => Self::Avg { total: 0.0, count: 0 },
            "$min" => Self::Min(None),
            "$max" => Self::Max(None),
            "$first" => Self::First(None),
            "$last" => Self::Last(None),
            "$push" => Self::Push(Vec::new()),
            other => return Err(malformed(format!("unknown group operator '{other}'"))),
        })
    }

    fn add(&mut self, value: Value) {
        match self {
            Self::Sum { int, float } => {
                if let Value::Number(n) = &value {
                    *float += n.as_f64().unwrap_or_default();
                    *int = match (*int, n.as_i64()) {
                        (Some(acc), Some(v)) => acc.checked_add(v),
                        _ => None,
                    };
                }
            }
            Self::Avg { total, count } => {
                if let Some(n) = value.as_f64() {
                    *total += n;
                    *count += 1;
                }
            }
            Self::Min(current) => {
                if !value.is_null()
                    && current
                        .as_ref()
                        .map_or(true, |c| compare_values(&value, c).is_lt())
                {
                    *current = Some(value);
                }
            }
            Self::Max(current) => {
                if !value.is_null()
                    && current
                        .as_ref()
                        .map_or(true, |c| compare_values(&value, c).is_gt())
                {
                    *current = Some(value);
                }
            }
            Self::First(current) => {
                if current.is_none() {
                    *current = Some(value);
                }
            }
            Self::Last(current) => *current = Some(value),
            Self::Push(items) => items.push(value),
        }
    }

    fn finish(self) -> Value {
        match self {
            Self::Sum { int: Some(i), .. } => Value::from(i),
            Self::Sum { float, .. } => Number::from_f64(float).map_or(Value::Null, Value::Number),
            Self::Avg { count: 0, .. } => Value::Null,
            Self::Avg { total, count } => {
                Number::from_f64(total / count as f64).map_or(Value::Null, Value::Number)
            }
            Self::Min(v) | Self::Max(v) | Self::First(v) | Self::Last(v) => v.unwrap_or(Value::Null),
            Self::Push(items) => Value::Array(items),
        }
    }
}

fn group(documents: &[Document], spec: &Document) -> StoreResult<Vec<Document>> {
    let key_expr = spec
        .get(ID_FIELD)
        .ok_or_else(|| malformed("$group needs an _id expression"))?;

    let mut fields = Vec::new();
    for (name, accumulator) in spec.iter().filter(|(k, _)| k.as_str() != ID_FIELD) {
        let mut entries = accumulator
            .as_object()
            .map(|a| a.iter())
            .ok_or_else(|| malformed(format!("group field '{name}' needs an accumulator object")))?;
        match (entries.next(), entries.next()) {
            (Some((operator, expr)), None) => {
                Accumulator::new(operator)?;
                fields.push((name.as_str(), operator.as_str(), expr));
            }
            _ => {
                return Err(malformed(format!(
                    "group field '{name}' needs exactly one accumulator"
                )))
            }
        }
    }

    let mut groups: Vec<(Value, Vec<Accumulator>)> = Vec::new();
    for d in documents {
        let key = evaluate(d, key_expr);
        let index = match groups.iter().position(|(k, _)| values_equal(k, &key)) {
            Some(index) => index,
            None => {
                let accumulators = fields
                    .iter()
                    .map(|(_, operator, _)| Accumulator::new(operator))
                    .collect::<StoreResult<Vec<_>>>()?;
                groups.push((key, accumulators));
                groups.len() - 1
            }
        };
        for ((_, _, expr), accumulator) in fields.iter().zip(groups[index].1.iter_mut()) {
            accumulator.add(evaluate(d, expr));
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accumulators)| {
            let mut out = Map::new();
            out.insert(ID_FIELD.to_string(), key);
            for ((name, _, _), accumulator) in fields.iter().zip(accumulators) {
                out.insert((*name).to_string(), accumulator.finish());
            }
            out
        })
        .collect())
}
