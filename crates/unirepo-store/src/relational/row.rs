//! Row decoding
//!
//! Column 0 is the integer identifier; the rest follow the projection's
//! column list. Values are decoded by their SQLite storage class; the
//! hydrator then checks them against the declared field type.

use rusqlite::types::ValueRef;
use rusqlite::Row;
use serde_json::{Number, Value};

use unirepo_core::backend::RawRecord;
use unirepo_core::errors::{RepoError, Result};
use unirepo_core::model::{Document, FieldType, NativeId};

use crate::errors::from_rusqlite;

pub fn decode_row(backend: &str, row: &Row<'_>, columns: &[(String, FieldType)]) -> Result<RawRecord> {
    let id = match row.get_ref(0).map_err(|e| from_rusqlite(backend, e))? {
        ValueRef::Integer(i) => NativeId::Integer(i),
        other => {
            return Err(RepoError::query(
                backend,
                format!("identifier column holds {:?}, expected an integer", other.data_type()),
            ))
        }
    };

    let mut fields = Document::new();
    for (i, (name, field_type)) in columns.iter().enumerate() {
        let raw = row.get_ref(i + 1).map_err(|e| from_rusqlite(backend, e))?;
        fields.insert(name.clone(), decode_value(backend, name, *field_type, raw)?);
    }
    Ok(RawRecord::new(id, fields))
}

fn decode_value(backend: &str, column: &str, field_type: FieldType, raw: ValueRef<'_>) -> Result<Value> {
    Ok(match (field_type, raw) {
        (_, ValueRef::Null) => Value::Null,
        (FieldType::Boolean, ValueRef::Integer(i)) => Value::Bool(i != 0),
        (FieldType::Json, ValueRef::Text(bytes)) => serde_json::from_slice(bytes).map_err(|e| {
            RepoError::query(backend, format!("column {} holds invalid JSON: {}", column, e))
        })?,
        (_, ValueRef::Integer(i)) => Value::from(i),
        (_, ValueRef::Real(f)) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        (_, ValueRef::Text(bytes)) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        (_, ValueRef::Blob(_)) => {
            return Err(RepoError::query(
                backend,
                format!("column {} holds a blob, which no field type maps to", column),
            ))
        }
    })
}
