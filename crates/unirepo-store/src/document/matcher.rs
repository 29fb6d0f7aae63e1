//! Filter evaluation, projection and sorting over JSON documents
//!
//! Supports the operator subset the document backend emits: `$and`, `$or`,
//! `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`. A missing key compares
//! equal to `null`. Ordering comparisons only match values of the same type
//! bracket (numbers with numbers, strings with strings, booleans with
//! booleans).

use std::cmp::Ordering;

use serde_json::{Map, Value};
use unirepo_core::model::document::OBJECT_ID_KEY;
use unirepo_core::Document;

use crate::document::server::ServerError;

/// Whether `doc` satisfies `filter`
pub fn matches(filter: &Value, doc: &Document) -> Result<bool, ServerError> {
    match filter {
        Value::Object(clauses) => {
            for (key, condition) in clauses {
                if !matches_clause(key, condition, doc)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Value::Null => Ok(true),
        other => Err(ServerError::BadFilter(format!(
            "filter must be an object, got {}",
            other
        ))),
    }
}

fn matches_clause(key: &str, condition: &Value, doc: &Document) -> Result<bool, ServerError> {
    match key {
        "$and" => {
            for child in branches(key, condition)? {
                if !matches(child, doc)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "$or" => {
            for child in branches(key, condition)? {
                if matches(child, doc)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        k if k.starts_with('$') => Err(ServerError::UnknownOperator(k.to_string())),
        field => {
            let actual = doc.get(field).unwrap_or(&Value::Null);
            match operator_object(condition) {
                Some(operators) => {
                    for (op, operand) in operators {
                        if !apply_operator(op, actual, operand)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                None => Ok(values_equal(actual, condition)),
            }
        }
    }
}

fn branches<'a>(key: &str, condition: &'a Value) -> Result<&'a Vec<Value>, ServerError> {
    match condition.as_array() {
        Some(items) if !items.is_empty() => Ok(items),
        _ => Err(ServerError::BadFilter(format!(
            "{} needs a non-empty array",
            key
        ))),
    }
}

/// `{"$gt": 1}` style condition; `{"$oid": ...}` is a literal
fn operator_object(condition: &Value) -> Option<&Map<String, Value>> {
    match condition {
        Value::Object(map)
            if !map.is_empty()
                && !map.contains_key(OBJECT_ID_KEY)
                && map.keys().all(|k| k.starts_with('$')) =>
        {
            Some(map)
        }
        _ => None,
    }
}

fn apply_operator(op: &str, actual: &Value, operand: &Value) -> Result<bool, ServerError> {
    let ordering = || compare_same_type(actual, operand);
    Ok(match op {
        "$eq" => values_equal(actual, operand),
        "$ne" => !values_equal(actual, operand),
        "$gt" => ordering() == Some(Ordering::Greater),
        "$gte" => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
        "$lt" => ordering() == Some(Ordering::Less),
        "$lte" => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
        "$in" => {
            let items = operand
                .as_array()
                .ok_or_else(|| ServerError::BadFilter("$in needs an array".to_string()))?;
            items.iter().any(|item| values_equal(actual, item))
        }
        other => return Err(ServerError::UnknownOperator(other.to_string())),
    })
}

/// Deep equality with numeric normalization (`1 == 1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map_or(false, |y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => Some(i.cmp(&j)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
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

/// Total order used for sorting: type bracket first, then value
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    compare_same_type(a, b).unwrap_or_else(|| {
        let by_type = type_rank(a).cmp(&type_rank(b));
        if by_type == Ordering::Equal {
            a.to_string().cmp(&b.to_string())
        } else {
            by_type
        }
    })
}

/// Stable multi-key sort; `1` ascending, `-1` descending
pub fn sort_documents(docs: &mut [Document], sort: &[(String, i32)]) {
    if sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (key, direction) in sort {
            let x = a.get(key).unwrap_or(&Value::Null);
            let y = b.get(key).unwrap_or(&Value::Null);
            let ord = sort_order(x, y);
            let ord = if *direction < 0 { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Apply an inclusion (`1`) or exclusion (`0`) projection
///
/// `_id` is kept unless explicitly set to `0`.
pub fn project(doc: Document, projection: &Map<String, Value>) -> Result<Document, ServerError> {
    if projection.is_empty() {
        return Ok(doc);
    }

    let flag = |v: &Value| match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        _ => true,
    };
    let keep_id = projection.get("_id").map_or(true, flag);
    let mut modes = projection
        .iter()
        .filter(|(k, _)| k.as_str() != "_id")
        .map(|(_, v)| flag(v));
    let inclusive = match modes.next() {
        Some(first) => {
            if modes.any(|m| m != first) {
                return Err(ServerError::MixedProjection);
            }
            first
        }
        // only `_id` named: inclusive when it is kept
        None => keep_id,
    };

    Ok(doc
        .into_iter()
        .filter(|(key, _)| {
            if key == "_id" {
                return keep_id;
            }
            match projection.get(key) {
                Some(v) => flag(v) == inclusive && inclusive,
                None => !inclusive,
            }
        })
        .collect())
}
