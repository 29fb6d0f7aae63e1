//! SQL fragments and query rendering

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use unirepo_core::errors::{RepoError, Result};
use unirepo_core::model::FieldType;
use unirepo_core::query::{ComparisonOp, LogicalOp, SortDirection};

/// Quote an identifier for SQLite
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Convert a JSON value into the column representation of `field_type`
pub fn to_sql_value(field_type: FieldType, value: &Value) -> Result<SqlValue> {
    let mismatch = || RepoError::InvalidInput {
        reason: format!("cannot store {} as {}", value, field_type.name()),
    };
    Ok(match (field_type, value) {
        (_, Value::Null) => SqlValue::Null,
        (FieldType::Json, v) => SqlValue::Text(v.to_string()),
        (FieldType::String, Value::String(s)) => SqlValue::Text(s.clone()),
        (FieldType::Integer, Value::Number(n)) => SqlValue::Integer(n.as_i64().ok_or_else(mismatch)?),
        (FieldType::Float, Value::Number(n)) => SqlValue::Real(n.as_f64().ok_or_else(mismatch)?),
        (FieldType::Boolean, Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        _ => return Err(mismatch()),
    })
}

/// WHERE fragment with positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SqlFilter {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Comparison of one column against already converted values
    pub fn compare(column: &str, op: ComparisonOp, values: Vec<SqlValue>) -> Self {
        let column = quote(column);
        match op {
            ComparisonOp::In => {
                let has_null = values.iter().any(|v| *v == SqlValue::Null);
                let params: Vec<SqlValue> =
                    values.into_iter().filter(|v| *v != SqlValue::Null).collect();
                let mut parts = Vec::new();
                if !params.is_empty() {
                    let placeholders = vec!["?"; params.len()].join(", ");
                    parts.push(format!("{} IN ({})", column, placeholders));
                }
                if has_null {
                    parts.push(format!("{} IS NULL", column));
                }
                match parts.len() {
                    0 => Self::new("0", Vec::new()),
                    1 => Self::new(parts.remove(0), params),
                    _ => Self::new(format!("({})", parts.join(" OR ")), params),
                }
            }
            op => {
                let value = values.into_iter().next().unwrap_or(SqlValue::Null);
                match (op, value) {
                    (ComparisonOp::Eq, SqlValue::Null) => {
                        Self::new(format!("{} IS NULL", column), Vec::new())
                    }
                    (ComparisonOp::Ne, SqlValue::Null) => {
                        Self::new(format!("{} IS NOT NULL", column), Vec::new())
                    }
                    // NULL never orders against a value
                    (_, SqlValue::Null) => Self::new("0", Vec::new()),
                    (op, value) => {
                        let symbol = match op {
                            ComparisonOp::Eq => "=",
                            ComparisonOp::Ne => "IS NOT",
                            ComparisonOp::Gt => ">",
                            ComparisonOp::Gte => ">=",
                            ComparisonOp::Lt => "<",
                            ComparisonOp::Lte => "<=",
                            ComparisonOp::In => "IN",
                        };
                        Self::new(format!("{} {} ?", column, symbol), vec![value])
                    }
                }
            }
        }
    }

    /// Join children with AND/OR, parameters kept in child order
    pub fn combine(op: LogicalOp, children: Vec<SqlFilter>) -> Self {
        let joiner = match op {
            LogicalOp::And => " AND ",
            LogicalOp::Or => " OR ",
        };
        let mut params = Vec::new();
        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            parts.push(format!("({})", child.sql));
            params.extend(child.params);
        }
        Self::new(parts.join(joiner), params)
    }
}

/// Column list with the declared type of each column
#[derive(Debug, Clone, PartialEq)]
pub struct SqlProjection {
    pub columns: Vec<(String, FieldType)>,
}

/// Compiled SELECT
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub table: String,
    pub id_column: String,
    pub projection: SqlProjection,
    pub filter: Option<SqlFilter>,
    pub order: Vec<(String, SortDirection)>,
    pub offset: u64,
    pub limit: Option<u64>,
}

impl SqlQuery {
    /// SELECT over the whole page described by `offset`/`limit`
    pub fn render(&self) -> (String, Vec<SqlValue>) {
        self.render_page(self.offset, self.limit)
    }

    /// SELECT for an explicit page; the identifier is always column 0
    pub fn render_page(&self, offset: u64, limit: Option<u64>) -> (String, Vec<SqlValue>) {
        self.render_select(&self.columns(), offset, limit)
    }

    /// Identifiers of the whole page, in result order
    pub fn render_ids(&self) -> (String, Vec<SqlValue>) {
        self.render_select(&[quote(&self.id_column)], self.offset, self.limit)
    }

    /// Projected rows for the given identifiers, in no particular order
    pub fn render_rows(&self, ids: &[i64]) -> (String, Vec<SqlValue>) {
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE {} IN ({})",
            self.columns().join(", "),
            quote(&self.table),
            quote(&self.id_column),
            placeholders
        );
        (sql, ids.iter().copied().map(SqlValue::Integer).collect())
    }

    fn columns(&self) -> Vec<String> {
        let mut columns = vec![quote(&self.id_column)];
        columns.extend(
            self.projection
                .columns
                .iter()
                .map(|(name, _)| quote(name)),
        );
        columns
    }

    fn render_select(&self, columns: &[String], offset: u64, limit: Option<u64>) -> (String, Vec<SqlValue>) {
        let mut sql = format!("SELECT {} FROM {}", columns.join(", "), quote(&self.table));

        let params = match &self.filter {
            Some(filter) => {
                sql.push_str(" WHERE ");
                sql.push_str(&filter.sql);
                filter.params.clone()
            }
            None => Vec::new(),
        };

        let mut order: Vec<String> = self
            .order
            .iter()
            .map(|(column, direction)| {
                let dir = match direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                format!("{} {}", quote(column), dir)
            })
            .collect();
        if !self.order.iter().any(|(c, _)| c == &self.id_column) {
            // insertion order, and a stable tiebreaker for paging
            order.push(format!("{} ASC", quote(&self.id_column)));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));

        match (limit, offset) {
            (Some(limit), 0) => sql.push_str(&format!(" LIMIT {}", limit)),
            (Some(limit), offset) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (None, 0) => {}
            (None, offset) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
        }

        (sql, params)
    }

    /// SELECT COUNT(*) over the same filter
    pub fn render_count(table: &str, filter: Option<&SqlFilter>) -> (String, Vec<SqlValue>) {
        match filter {
            Some(filter) => (
                format!("SELECT COUNT(*) FROM {} WHERE {}", quote(table), filter.sql),
                filter.params.clone(),
            ),
            None => (format!("SELECT COUNT(*) FROM {}", quote(table)), Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(filter: Option<SqlFilter>) -> SqlQuery {
        SqlQuery {
            table: "posts".to_string(),
            id_column: "id".to_string(),
            projection: SqlProjection {
                columns: vec![("title".to_string(), FieldType::String)],
            },
            filter,
            order: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("posts"), "\"posts\"");
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_compare_null_handling() {
        let eq = SqlFilter::compare("title", ComparisonOp::Eq, vec![SqlValue::Null]);
        assert_eq!(eq.sql, "\"title\" IS NULL");
        let ne = SqlFilter::compare("title", ComparisonOp::Ne, vec![SqlValue::Text("a".into())]);
        assert_eq!(ne.sql, "\"title\" IS NOT ?");
    }

    #[test]
    fn test_in_variants() {
        let empty = SqlFilter::compare("n", ComparisonOp::In, Vec::new());
        assert_eq!(empty.sql, "0");

        let with_null = SqlFilter::compare(
            "n",
            ComparisonOp::In,
            vec![SqlValue::Integer(1), SqlValue::Null, SqlValue::Integer(2)],
        );
        assert_eq!(with_null.sql, "(\"n\" IN (?, ?) OR \"n\" IS NULL)");
        assert_eq!(with_null.params.len(), 2);
    }

    #[test]
    fn test_combine_keeps_parameter_order() {
        let or = SqlFilter::combine(
            LogicalOp::Or,
            vec![
                SqlFilter::compare("title", ComparisonOp::Eq, vec![SqlValue::Text("a".into())]),
                SqlFilter::compare("body", ComparisonOp::Eq, vec![SqlValue::Text("b".into())]),
            ],
        );
        assert_eq!(or.sql, "(\"title\" = ?) OR (\"body\" = ?)");
        assert_eq!(
            or.params,
            vec![SqlValue::Text("a".into()), SqlValue::Text("b".into())]
        );
    }

    #[test]
    fn test_render_with_page() {
        let mut q = query(Some(SqlFilter::compare(
            "title",
            ComparisonOp::Eq,
            vec![SqlValue::Text("Post #1".into())],
        )));
        q.order = vec![("title".to_string(), SortDirection::Desc)];
        q.offset = 2;
        q.limit = Some(5);
        let (sql, params) = q.render();
        assert_eq!(
            sql,
            "SELECT \"id\", \"title\" FROM \"posts\" WHERE \"title\" = ? ORDER BY \"title\" DESC, \"id\" ASC LIMIT 5 OFFSET 2"
        );
        assert_eq!(params.len(), 1);

        let (sql, _) = query(None).render_page(3, None);
        assert!(sql.ends_with("ORDER BY \"id\" ASC LIMIT -1 OFFSET 3"));
    }

    #[test]
    fn test_render_ids_and_rows() {
        let mut q = query(None);
        q.order = vec![("title".to_string(), SortDirection::Asc)];
        q.limit = Some(10);
        let (sql, params) = q.render_ids();
        assert_eq!(
            sql,
            "SELECT \"id\" FROM \"posts\" ORDER BY \"title\" ASC, \"id\" ASC LIMIT 10"
        );
        assert!(params.is_empty());

        let (sql, params) = q.render_rows(&[3, 1]);
        assert_eq!(sql, "SELECT \"id\", \"title\" FROM \"posts\" WHERE \"id\" IN (?, ?)");
        assert_eq!(params, vec![SqlValue::Integer(3), SqlValue::Integer(1)]);
    }

    #[test]
    fn test_to_sql_value() {
        assert_eq!(
            to_sql_value(FieldType::Boolean, &json!(true)).unwrap(),
            SqlValue::Integer(1)
        );
        assert_eq!(
            to_sql_value(FieldType::Json, &json!({"a": 1})).unwrap(),
            SqlValue::Text("{\"a\":1}".into())
        );
        assert!(to_sql_value(FieldType::Integer, &json!(1.5)).is_err());
        assert!(to_sql_value(FieldType::String, &json!(3)).is_err());
    }
}
