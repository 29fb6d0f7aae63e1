#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use serde_json::{json, Value};
use unirepo_core::backend::RawRecord;
use unirepo_core::hydrate::hydrate;
use unirepo_core::model::{Document, EntityMetadata, FieldSpec, FieldType, NativeId};
use unirepo_core::query::projection::resolve;

const FIELDS: [&str; 4] = ["title", "text", "views", "draft"];

fn metadata() -> EntityMetadata {
    EntityMetadata::builder("post")
        .field(FieldSpec::new("id", FieldType::Integer).identifier())
        .field(FieldSpec::new("title", FieldType::String))
        .field(FieldSpec::new("text", FieldType::String).stored_as("body"))
        .field(FieldSpec::new("views", FieldType::Integer))
        .field(FieldSpec::new("draft", FieldType::Boolean))
        .build()
        .unwrap()
}

fn raw_record(id: i64, title: &str, text: &str, views: i64, draft: bool) -> RawRecord {
    let mut fields = Document::new();
    fields.insert("title".to_string(), json!(title));
    fields.insert("body".to_string(), json!(text));
    fields.insert("views".to_string(), json!(views));
    fields.insert("draft".to_string(), Value::Bool(draft));
    RawRecord::new(NativeId::Integer(id), fields)
}

proptest! {
    #[test]
    fn prop_select_equals_exclude_complement(
        id in 1i64..10_000,
        title in "[a-zA-Z #0-9]{0,16}",
        text in "[a-z ]{0,24}",
        views in 0i64..1_000,
        draft in any::<bool>(),
        mask in proptest::collection::vec(any::<bool>(), 4),
        with_id in any::<bool>(),
    ) {
        let meta = metadata();
        let mut select: Vec<String> = FIELDS
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|(f, _)| f.to_string())
            .collect();
        if with_id {
            select.insert(0, "id".to_string());
        }
        prop_assume!(!select.is_empty());

        let exclude: Vec<String> = meta
            .field_names()
            .filter(|f| !select.iter().any(|s| s == f))
            .map(str::to_string)
            .collect();
        prop_assume!(!exclude.is_empty());

        let by_select = resolve(&meta, &select, &[]).unwrap();
        let by_exclude = resolve(&meta, &[], &exclude).unwrap();

        let a = hydrate(&meta, raw_record(id, &title, &text, views, draft), &by_select).unwrap();
        let b = hydrate(&meta, raw_record(id, &title, &text, views, draft), &by_exclude).unwrap();

        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.identity(), &json!(id));
        prop_assert_eq!(a.get("id").is_some(), with_id);
    }
}
