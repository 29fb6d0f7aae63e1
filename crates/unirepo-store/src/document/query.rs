use serde_json::{json, Map, Value};

/// Compiled find against one collection
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub collection: String,
    /// Filter document; `{}` matches everything
    pub filter: Value,
    /// Inclusion projection; empty returns whole documents
    pub projection: Map<String, Value>,
    /// `(key, 1 | -1)` pairs, most significant first
    pub sort: Vec<(String, i32)>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl DocumentQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: Value::Object(Map::new()),
            projection: Map::new(),
            sort: Vec::new(),
            skip: 0,
            limit: None,
        }
    }

    /// The query as a `find` command document
    pub fn to_command(&self) -> Value {
        let mut command = Map::new();
        command.insert("find".to_string(), json!(self.collection));
        command.insert("filter".to_string(), self.filter.clone());
        if !self.projection.is_empty() {
            command.insert(
                "projection".to_string(),
                Value::Object(self.projection.clone()),
            );
        }
        if !self.sort.is_empty() {
            let sort: Map<String, Value> = self
                .sort
                .iter()
                .map(|(key, dir)| (key.clone(), json!(dir)))
                .collect();
            command.insert("sort".to_string(), Value::Object(sort));
        }
        if self.skip > 0 {
            command.insert("skip".to_string(), json!(self.skip));
        }
        if let Some(limit) = self.limit {
            command.insert("limit".to_string(), json!(limit));
        }
        Value::Object(command)
    }
}
