//! Table synchronization
//!
//! Creates missing entity tables and records each entity's declaration
//! checksum; refuses to continue when a recorded checksum no longer matches.

use rusqlite::{Connection, OptionalExtension};

use unirepo_core::model::{EntityMetadata, FieldType};
use unirepo_core::registry::MetadataRegistry;

use crate::errors::{from_rusqlite, schema_drift, Result};
use crate::relational::schema::checksums::declaration_checksum;
use crate::relational::sql::quote;

pub const ENTITIES_TABLE: &str = "_unirepo_entities";

/// What a synchronize run did per entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created { entity: String, table: String },
    Unchanged { entity: String, table: String },
}

impl SyncOutcome {
    pub fn entity(&self) -> &str {
        match self {
            SyncOutcome::Created { entity, .. } | SyncOutcome::Unchanged { entity, .. } => entity,
        }
    }
}

/// Synchronize every registered entity in one transaction
///
/// # Errors
///
/// `InvalidMetadata` on drift, `QueryExecution` when SQLite fails. Nothing
/// is created when any entity drifted.
pub fn synchronize(backend: &str, conn: &mut Connection, registry: &MetadataRegistry) -> Result<Vec<SyncOutcome>> {
    create_entities_table(backend, conn)?;

    let tx = conn.transaction().map_err(|e| from_rusqlite(backend, e))?;
    let mut outcomes = Vec::new();
    for metadata in registry.entities() {
        outcomes.push(sync_entity(backend, &tx, metadata)?);
    }
    tx.commit().map_err(|e| from_rusqlite(backend, e))?;

    Ok(outcomes)
}

fn create_entities_table(backend: &str, conn: &Connection) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
                entity TEXT PRIMARY KEY,
                table_name TEXT NOT NULL,
                checksum TEXT NOT NULL,
                synchronized_at TEXT NOT NULL
            )",
            ENTITIES_TABLE
        ),
        [],
    )
    .map_err(|e| from_rusqlite(backend, e))?;
    Ok(())
}

fn sync_entity(backend: &str, conn: &Connection, metadata: &EntityMetadata) -> Result<SyncOutcome> {
    let checksum = declaration_checksum(metadata);
    let recorded: Option<String> = conn
        .query_row(
            &format!("SELECT checksum FROM {} WHERE entity = ?1", ENTITIES_TABLE),
            [metadata.name()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| from_rusqlite(backend, e))?;

    let entity = metadata.name().to_string();
    let table = metadata.storage_name().to_string();
    match recorded {
        Some(recorded) if recorded == checksum => Ok(SyncOutcome::Unchanged { entity, table }),
        Some(recorded) => Err(schema_drift(&entity, &table, &recorded, &checksum)),
        None => {
            conn.execute(&create_table_sql(metadata), [])
                .map_err(|e| from_rusqlite(backend, e))?;
            conn.execute(
                &format!(
                    "INSERT INTO {} (entity, table_name, checksum, synchronized_at) VALUES (?1, ?2, ?3, ?4)",
                    ENTITIES_TABLE
                ),
                rusqlite::params![entity, table, checksum, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(|e| from_rusqlite(backend, e))?;
            tracing::info!(backend, entity = entity.as_str(), table = table.as_str(), "table synchronized");
            Ok(SyncOutcome::Created { entity, table })
        }
    }
}

/// `CREATE TABLE IF NOT EXISTS` for an entity; the identifier is always an
/// auto-incremented integer key
pub fn create_table_sql(metadata: &EntityMetadata) -> String {
    let columns: Vec<String> = metadata
        .fields()
        .iter()
        .map(|field| {
            if field.is_identifier {
                format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote(&field.storage_name))
            } else {
                format!("{} {}", quote(&field.storage_name), column_type(field.field_type))
            }
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote(metadata.storage_name()),
        columns.join(", ")
    )
}

fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String | FieldType::Json => "TEXT",
        FieldType::Integer | FieldType::Boolean => "INTEGER",
        FieldType::Float => "REAL",
    }
}
