//! Filter predicate tree

use std::fmt;

use serde_json::{Map, Value};

use crate::errors::{RepoError, Result};

/// Leaf comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Value must be an array; matches when the field equals any element
    In,
}

impl ComparisonOp {
    /// Operator key in the filter shorthand (`$eq`, `$gt`, ...)
    pub fn operator_name(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "$eq",
            ComparisonOp::Ne => "$ne",
            ComparisonOp::Gt => "$gt",
            ComparisonOp::Gte => "$gte",
            ComparisonOp::Lt => "$lt",
            ComparisonOp::Lte => "$lte",
            ComparisonOp::In => "$in",
        }
    }

    pub fn from_operator_name(name: &str) -> Option<Self> {
        match name {
            "$eq" => Some(ComparisonOp::Eq),
            "$ne" => Some(ComparisonOp::Ne),
            "$gt" => Some(ComparisonOp::Gt),
            "$gte" => Some(ComparisonOp::Gte),
            "$lt" => Some(ComparisonOp::Lt),
            "$lte" => Some(ComparisonOp::Lte),
            "$in" => Some(ComparisonOp::In),
            _ => None,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operator_name())
    }
}

/// Logical combinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn operator_name(&self) -> &'static str {
        match self {
            LogicalOp::And => "$and",
            LogicalOp::Or => "$or",
        }
    }
}

/// Backend-agnostic filter tree
///
/// Field names are logical names; the translator checks them against the
/// entity metadata before lowering.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateNode {
    Compare {
        field: String,
        op: ComparisonOp,
        value: Value,
    },
    Logical {
        op: LogicalOp,
        children: Vec<PredicateNode>,
    },
}

impl PredicateNode {
    pub fn compare(field: impl Into<String>, op: ComparisonOp, value: impl Into<Value>) -> Self {
        PredicateNode::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::Lte, value)
    }

    pub fn is_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self::compare(field, ComparisonOp::In, Value::Array(values))
    }

    pub fn and(children: impl IntoIterator<Item = PredicateNode>) -> Self {
        PredicateNode::Logical {
            op: LogicalOp::And,
            children: children.into_iter().collect(),
        }
    }

    pub fn or(children: impl IntoIterator<Item = PredicateNode>) -> Self {
        PredicateNode::Logical {
            op: LogicalOp::Or,
            children: children.into_iter().collect(),
        }
    }

    /// Every field name referenced in the tree, in traversal order
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            PredicateNode::Compare { field, .. } => out.push(field),
            PredicateNode::Logical { children, .. } => {
                for child in children {
                    child.collect_fields(out);
                }
            }
        }
    }

    /// Parse the JSON filter shorthand
    ///
    /// `{"title": "x"}` is an equality, `{"age": {"$gt": 3}}` an operator
    /// comparison, `{"$or": [...]}` / `{"$and": [...]}` combinators. Several
    /// keys in one object combine with AND. An empty object (or `null`)
    /// means "no filter" and yields `None`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a non-object filter, an unknown `$` operator, an
    /// empty combinator list or a non-array `$in` value.
    pub fn from_filter(filter: &Value) -> Result<Option<PredicateNode>> {
        match filter {
            Value::Null => Ok(None),
            Value::Object(map) if map.is_empty() => Ok(None),
            Value::Object(map) => parse_object(map).map(Some),
            other => Err(invalid(format!(
                "filter must be a JSON object, got {}",
                other
            ))),
        }
    }
}

fn invalid(reason: String) -> RepoError {
    RepoError::InvalidInput { reason }
}

fn parse_object(map: &Map<String, Value>) -> Result<PredicateNode> {
    let mut clauses = Vec::with_capacity(map.len());
    for (key, value) in map {
        match key.as_str() {
            "$and" => clauses.push(parse_combinator(LogicalOp::And, value)?),
            "$or" => clauses.push(parse_combinator(LogicalOp::Or, value)?),
            k if k.starts_with('$') => {
                return Err(invalid(format!("unknown logical operator '{}'", k)))
            }
            field => clauses.extend(parse_field(field, value)?),
        }
    }

    if clauses.len() == 1 {
        Ok(clauses.remove(0))
    } else {
        Ok(PredicateNode::and(clauses))
    }
}

fn parse_combinator(op: LogicalOp, value: &Value) -> Result<PredicateNode> {
    let items = value.as_array().ok_or_else(|| {
        invalid(format!("{} expects an array of filters", op.operator_name()))
    })?;
    if items.is_empty() {
        return Err(invalid(format!(
            "{} needs at least one filter",
            op.operator_name()
        )));
    }

    let children = items
        .iter()
        .map(|item| match item {
            Value::Object(map) if !map.is_empty() => parse_object(map),
            other => Err(invalid(format!(
                "{} entries must be non-empty objects, got {}",
                op.operator_name(),
                other
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PredicateNode::Logical { op, children })
}

/// `{"$gt": 1, "$lt": 5}` becomes two comparisons; anything else is equality
fn parse_field(field: &str, value: &Value) -> Result<Vec<PredicateNode>> {
    let operators = match value {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => map,
        other => return Ok(vec![PredicateNode::eq(field, other.clone())]),
    };

    operators
        .iter()
        .map(|(name, operand)| {
            let op = ComparisonOp::from_operator_name(name).ok_or_else(|| {
                invalid(format!("unknown operator '{}' on field '{}'", name, field))
            })?;
            if op == ComparisonOp::In && !operand.is_array() {
                return Err(invalid(format!("$in on field '{}' expects an array", field)));
            }
            Ok(PredicateNode::compare(field, op, operand.clone()))
        })
        .collect()
}
