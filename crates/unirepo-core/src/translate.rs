//! Find descriptor → native query
//!
//! Validation happens entirely here, before any backend round trip: every
//! referenced field must be declared, comparison values must fit the field
//! type, and `select`/`exclude` must not both be given.

use serde_json::Value;

use crate::backend::{Backend, Page, QueryPlan};
use crate::errors::{RepoError, Result};
use crate::model::field::value_kind;
use crate::model::{EntityMetadata, FieldSpec};
use crate::query::projection::{self, ResolvedProjection};
use crate::query::{ComparisonOp, FindDescriptor, PredicateNode};

/// Compiled query plus the projection the hydrator must apply
#[derive(Debug)]
pub struct TranslatedQuery<Q> {
    pub native: Q,
    pub projection: ResolvedProjection,
}

/// Translate a find descriptor for one backend
///
/// # Errors
///
/// `UnknownField`, `ProjectionConflict` or `InvalidInput` when the
/// descriptor does not fit the entity; lowering errors from the backend.
pub fn translate<B: Backend>(
    backend: &B,
    metadata: &EntityMetadata,
    descriptor: &FindDescriptor,
) -> Result<TranslatedQuery<B::Query>> {
    let projection = projection::resolve(metadata, &descriptor.select, &descriptor.exclude)?;

    let order = descriptor
        .order
        .iter()
        .map(|key| {
            metadata
                .require_field(&key.field)
                .map(|spec| (spec.storage_name.clone(), key.direction))
        })
        .collect::<Result<Vec<_>>>()?;

    let filter = translate_filter(backend, metadata, descriptor.filter.as_ref())?;
    let lowered_projection = backend.lower_projection(metadata, &projection);

    let native = backend.compile(
        metadata,
        QueryPlan {
            filter,
            projection: lowered_projection,
            order,
            page: Page {
                skip: descriptor.skip,
                limit: descriptor.limit,
            },
        },
    );

    tracing::debug!(
        entity = metadata.name(),
        backend = backend.name(),
        query = ?native,
        "translated find descriptor"
    );

    Ok(TranslatedQuery { native, projection })
}

/// Validate and lower an optional predicate
///
/// # Errors
///
/// Same validation errors as [`translate`].
pub fn translate_filter<B: Backend>(
    backend: &B,
    metadata: &EntityMetadata,
    filter: Option<&PredicateNode>,
) -> Result<Option<B::Filter>> {
    match filter {
        Some(node) => {
            validate_predicate(metadata, node)?;
            lower_predicate(backend, metadata, node).map(Some)
        }
        None => Ok(None),
    }
}

/// Check field names, combinator arity and value types
///
/// # Errors
///
/// `UnknownField` naming the first undeclared field, `InvalidInput` for an
/// empty combinator or a mistyped value.
pub fn validate_predicate(metadata: &EntityMetadata, node: &PredicateNode) -> Result<()> {
    match node {
        PredicateNode::Compare { field, op, value } => {
            let spec = metadata.require_field(field)?;
            match (op, value) {
                (ComparisonOp::In, Value::Array(items)) => items
                    .iter()
                    .try_for_each(|item| check_value(metadata, spec, *op, item)),
                (ComparisonOp::In, other) => Err(RepoError::InvalidInput {
                    reason: format!(
                        "$in on {}.{} expects an array, got {}",
                        metadata.name(),
                        field,
                        value_kind(other)
                    ),
                }),
                (_, value) => check_value(metadata, spec, *op, value),
            }
        }
        PredicateNode::Logical { op, children } => {
            if children.is_empty() {
                return Err(RepoError::InvalidInput {
                    reason: format!("{} needs at least one child", op.operator_name()),
                });
            }
            children
                .iter()
                .try_for_each(|child| validate_predicate(metadata, child))
        }
    }
}

fn check_value(
    metadata: &EntityMetadata,
    spec: &FieldSpec,
    op: ComparisonOp,
    value: &Value,
) -> Result<()> {
    if value.is_null() || spec.field_type.accepts(value) {
        return Ok(());
    }
    Err(RepoError::InvalidInput {
        reason: format!(
            "{} on {}.{} expects {}, got {}",
            op,
            metadata.name(),
            spec.name,
            spec.field_type.name(),
            value_kind(value)
        ),
    })
}

fn lower_predicate<B: Backend>(
    backend: &B,
    metadata: &EntityMetadata,
    node: &PredicateNode,
) -> Result<B::Filter> {
    match node {
        PredicateNode::Compare { field, op, value } => {
            let spec = metadata.require_field(field)?;
            backend.lower_comparison(spec, *op, value)
        }
        PredicateNode::Logical { op, children } => {
            let lowered = children
                .iter()
                .map(|child| lower_predicate(backend, metadata, child))
                .collect::<Result<Vec<_>>>()?;
            Ok(backend.lower_logical(*op, lowered))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldType;
    use serde_json::json;

    fn meta() -> EntityMetadata {
        EntityMetadata::builder("post")
            .field(FieldSpec::new("id", FieldType::String).identifier())
            .field(FieldSpec::new("title", FieldType::String))
            .field(FieldSpec::new("views", FieldType::Integer))
            .build()
            .unwrap()
    }

    #[test]
    fn test_validate_accepts_declared_fields() {
        let node = PredicateNode::or([
            PredicateNode::eq("title", "a"),
            PredicateNode::gt("views", 3),
            PredicateNode::eq("title", Value::Null),
        ]);
        assert!(validate_predicate(&meta(), &node).is_ok());
    }

    #[test]
    fn test_validate_reports_nested_unknown_field() {
        let node = PredicateNode::and([
            PredicateNode::eq("title", "a"),
            PredicateNode::or([PredicateNode::eq("author", "x")]),
        ]);
        let err = validate_predicate(&meta(), &node).unwrap_err();
        assert!(matches!(err, RepoError::UnknownField { field, .. } if field == "author"));
    }

    #[test]
    fn test_validate_rejects_mistyped_values() {
        let err = validate_predicate(&meta(), &PredicateNode::gt("views", "three")).unwrap_err();
        assert!(matches!(err, RepoError::InvalidInput { .. }));

        let err = validate_predicate(&meta(), &PredicateNode::is_in("views", [json!(1), json!("2")]))
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidInput { .. }));
    }

    #[test]
    fn test_validate_rejects_empty_combinator() {
        let err = validate_predicate(&meta(), &PredicateNode::and(Vec::new())).unwrap_err();
        assert!(matches!(err, RepoError::InvalidInput { .. }));
    }
}
