use serde_json::Value;

use crate::errors::Result;
use crate::query::predicate::PredicateNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One `order` entry: logical field name plus direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// Declarative find request
///
/// `select` and `exclude` are mutually exclusive; the translator rejects a
/// descriptor carrying both. `skip`/`limit` of `None` mean unbounded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindDescriptor {
    pub filter: Option<PredicateNode>,
    pub select: Vec<String>,
    pub exclude: Vec<String>,
    pub order: Vec<SortKey>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl FindDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor matching a JSON filter shorthand
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the shorthand is malformed.
    pub fn from_filter(filter: &Value) -> Result<Self> {
        Ok(Self {
            filter: PredicateNode::from_filter(filter)?,
            ..Self::default()
        })
    }

    pub fn filter(mut self, predicate: PredicateNode) -> Self {
        self.filter = Some(predicate);
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order.push(SortKey {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_accumulates() {
        let d = FindDescriptor::new()
            .filter(PredicateNode::eq("title", "a"))
            .select(["title"])
            .order_by("title", SortDirection::Desc)
            .skip(2)
            .limit(5);
        assert_eq!(d.select, vec!["title".to_string()]);
        assert!(d.exclude.is_empty());
        assert_eq!(d.order[0].direction, SortDirection::Desc);
        assert_eq!((d.skip, d.limit), (Some(2), Some(5)));
    }

    #[test]
    fn test_from_filter() {
        let d = FindDescriptor::from_filter(&json!({"title": "a"})).unwrap();
        assert_eq!(d.filter, Some(PredicateNode::eq("title", "a")));
        assert!(FindDescriptor::from_filter(&json!("x")).is_err());
    }
}
