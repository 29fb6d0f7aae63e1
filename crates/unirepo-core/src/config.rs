//! TOML configuration
//!
//! ```toml
//! [connection]
//! name = "blog"
//! backend = "sqlite"
//! path = "blog.db"
//! cursor_batch_size = 50
//! query_timeout_ms = 2000
//! synchronize = true
//!
//! [[entities]]
//! name = "post"
//! storage_name = "posts"
//!
//! [[entities.fields]]
//! name = "id"
//! type = "string"
//! identifier = true
//!
//! [[entities.fields]]
//! name = "title"
//! type = "string"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::driver::ExecutionOptions;
use crate::errors::{RepoError, Result};
use crate::model::{EntityMetadata, FieldSpec, FieldType};
use crate::registry::MetadataRegistry;

pub const DEFAULT_CURSOR_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Document,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    #[serde(default = "default_connection_name")]
    pub name: String,
    pub backend: BackendKind,
    /// Database file for `sqlite`; in-memory when absent
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_batch_size")]
    pub cursor_batch_size: usize,
    #[serde(default)]
    pub query_timeout_ms: Option<u64>,
    /// Create missing tables on connect (relational only)
    #[serde(default)]
    pub synchronize: bool,
}

fn default_connection_name() -> String {
    "default".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_CURSOR_BATCH_SIZE
}

impl ConnectionConfig {
    /// In-memory connection with default settings
    pub fn new(backend: BackendKind) -> Self {
        Self {
            name: default_connection_name(),
            backend,
            path: None,
            cursor_batch_size: DEFAULT_CURSOR_BATCH_SIZE,
            query_timeout_ms: None,
            synchronize: false,
        }
    }

    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            timeout: self.query_timeout_ms.map(Duration::from_millis),
        }
    }

    /// # Errors
    ///
    /// `Config` for an empty name, a zero batch size or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(config_error("connection.name cannot be empty"));
        }
        if self.cursor_batch_size == 0 {
            return Err(config_error("connection.cursor_batch_size must be positive"));
        }
        if self.query_timeout_ms == Some(0) {
            return Err(config_error("connection.query_timeout_ms must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub storage_name: Option<String>,
    #[serde(default)]
    pub identifier: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl FieldDecl {
    pub fn to_spec(&self) -> FieldSpec {
        let mut spec = FieldSpec::new(&self.name, self.field_type);
        if let Some(storage_name) = &self.storage_name {
            spec = spec.stored_as(storage_name);
        }
        if self.identifier {
            spec = spec.identifier();
        }
        if self.hidden {
            spec = spec.hidden();
        }
        if let Some(default) = &self.default {
            spec = spec.with_default(default.clone());
        }
        spec
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityDecl {
    pub name: String,
    #[serde(default)]
    pub storage_name: Option<String>,
    pub fields: Vec<FieldDecl>,
}

impl EntityDecl {
    /// # Errors
    ///
    /// `InvalidMetadata` when the declaration breaks a metadata invariant.
    pub fn to_metadata(&self) -> Result<EntityMetadata> {
        let mut builder = EntityMetadata::builder(&self.name)
            .fields(self.fields.iter().map(FieldDecl::to_spec));
        if let Some(storage_name) = &self.storage_name {
            builder = builder.storage_name(storage_name);
        }
        builder.build()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub entities: Vec<EntityDecl>,
}

impl AppConfig {
    /// # Errors
    ///
    /// `Config` when the text is not valid TOML for this schema or fails
    /// validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(text).map_err(|e| config_error(e.to_string()))?;
        config.connection.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// `Config` when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| config_error(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(
            path = %path.display(),
            entities = config.entities.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Registry holding every declared entity
    ///
    /// # Errors
    ///
    /// `InvalidMetadata` or `DuplicateEntity` from registration.
    pub fn build_registry(&self) -> Result<MetadataRegistry> {
        self.entities
            .iter()
            .try_fold(MetadataRegistry::builder(), |builder, decl| {
                builder.register_metadata(decl.to_metadata()?)
            })
            .map(|builder| builder.build())
    }
}

fn config_error(message: impl Into<String>) -> RepoError {
    RepoError::Config {
        message: message.into(),
    }
}
