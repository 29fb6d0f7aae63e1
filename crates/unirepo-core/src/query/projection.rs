//! Projection resolution
//!
//! Turns `select`/`exclude` into the set of fields to retrieve from the
//! backend and the set visible on hydrated records. The identifier is always
//! retrieved so records can be de-duplicated and identified.

use std::collections::BTreeSet;

use crate::errors::{RepoError, Result};
use crate::model::EntityMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    /// No select/exclude: every field not hidden by default
    All,
    Include,
    Exclude,
}

/// Resolved projection, in logical field names and declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProjection {
    pub mode: ProjectionMode,
    /// Fields fetched from the backend (identifier included)
    pub retrieve: Vec<String>,
    /// Fields present on hydrated records
    pub visible: Vec<String>,
}

impl ResolvedProjection {
    pub fn is_visible(&self, field: &str) -> bool {
        self.visible.iter().any(|f| f == field)
    }

    pub fn retrieves(&self, field: &str) -> bool {
        self.retrieve.iter().any(|f| f == field)
    }

    /// Whether the retrieve set is the full default shape
    pub fn is_default(&self) -> bool {
        self.mode == ProjectionMode::All
    }
}

/// Resolve `select`/`exclude` against the entity declaration
///
/// # Errors
///
/// `ProjectionConflict` when both lists are non-empty, `UnknownField` for an
/// undeclared name.
pub fn resolve(
    metadata: &EntityMetadata,
    select: &[String],
    exclude: &[String],
) -> Result<ResolvedProjection> {
    if !select.is_empty() && !exclude.is_empty() {
        let fields: BTreeSet<String> = select.iter().chain(exclude).cloned().collect();
        return Err(RepoError::ProjectionConflict {
            entity: metadata.name().to_string(),
            fields: fields.into_iter().collect(),
        });
    }
    for name in select.iter().chain(exclude) {
        metadata.require_field(name)?;
    }

    let id = metadata.identifier().name.as_str();
    let (mode, retrieve, visible) = if !select.is_empty() {
        let visible: Vec<String> = metadata
            .field_names()
            .filter(|f| named(f, select))
            .map(str::to_string)
            .collect();
        let retrieve: Vec<String> = metadata
            .field_names()
            .filter(|f| *f == id || named(f, select))
            .map(str::to_string)
            .collect();
        (ProjectionMode::Include, retrieve, visible)
    } else if !exclude.is_empty() {
        let kept = |f: &&str| *f == id || !named(f, exclude);
        let retrieve: Vec<String> = metadata
            .fields()
            .iter()
            .filter(|f| !f.excluded_by_default || f.is_identifier)
            .map(|f| f.name.as_str())
            .filter(kept)
            .map(str::to_string)
            .collect();
        let visible: Vec<String> = retrieve
            .iter()
            .filter(|f| !named(f, exclude))
            .cloned()
            .collect();
        (ProjectionMode::Exclude, retrieve, visible)
    } else {
        let all: Vec<String> = metadata
            .fields()
            .iter()
            .filter(|f| !f.excluded_by_default)
            .map(|f| f.name.clone())
            .collect();
        (ProjectionMode::All, all.clone(), all)
    };

    Ok(ResolvedProjection {
        mode,
        retrieve,
        visible,
    })
}

fn named(field: &str, list: &[String]) -> bool {
    list.iter().any(|n| n == field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldSpec, FieldType};

    fn meta() -> EntityMetadata {
        EntityMetadata::builder("post")
            .field(FieldSpec::new("id", FieldType::String).identifier())
            .field(FieldSpec::new("title", FieldType::String))
            .field(FieldSpec::new("text", FieldType::String))
            .field(FieldSpec::new("secret", FieldType::String).hidden())
            .build()
            .unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_projection_skips_hidden() {
        let p = resolve(&meta(), &[], &[]).unwrap();
        assert_eq!(p.mode, ProjectionMode::All);
        assert_eq!(p.visible, names(&["id", "title", "text"]));
        assert_eq!(p.retrieve, p.visible);
    }

    #[test]
    fn test_select_always_retrieves_identifier() {
        let p = resolve(&meta(), &names(&["title"]), &[]).unwrap();
        assert_eq!(p.retrieve, names(&["id", "title"]));
        assert_eq!(p.visible, names(&["title"]));
        assert!(!p.is_visible("id"));
    }

    #[test]
    fn test_select_can_reveal_hidden_field() {
        let p = resolve(&meta(), &names(&["secret"]), &[]).unwrap();
        assert_eq!(p.visible, names(&["secret"]));
    }

    #[test]
    fn test_exclude_keeps_identifier_retrieved() {
        let p = resolve(&meta(), &[], &names(&["id", "text"])).unwrap();
        assert_eq!(p.retrieve, names(&["id", "title"]));
        assert_eq!(p.visible, names(&["title"]));
    }

    #[test]
    fn test_select_and_exclude_agree() {
        let m = meta();
        let selected = resolve(&m, &names(&["title"]), &[]).unwrap();
        let excluded = resolve(&m, &[], &names(&["id", "text"])).unwrap();
        assert_eq!(selected.retrieve, excluded.retrieve);
        assert_eq!(selected.visible, excluded.visible);
    }

    #[test]
    fn test_conflict_and_unknown_field() {
        let err = resolve(&meta(), &names(&["title"]), &names(&["text"])).unwrap_err();
        assert_eq!(
            err,
            RepoError::ProjectionConflict {
                entity: "post".to_string(),
                fields: names(&["text", "title"]),
            }
        );

        let err = resolve(&meta(), &names(&["author"]), &[]).unwrap_err();
        assert!(matches!(err, RepoError::UnknownField { field, .. } if field == "author"));
    }
}
