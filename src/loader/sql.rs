//! SQL rendering for the destination tables. All value escaping lives in
//! `SqlValue::render`; nothing else in the crate builds SQL from strings.

use crate::loader::project::TableBatch;

/// A typed cell value. Conversion impls keep the projection code free of
/// manual escaping and NULL handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    /// Render as a SQL literal. Text doubles embedded single quotes.
    pub fn render(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl From<i32> for SqlValue {
    fn from(i: i32) -> Self {
        SqlValue::Int(i64::from(i))
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Int(i)
    }
}

impl From<u32> for SqlValue {
    fn from(i: u32) -> Self {
        SqlValue::Int(i64::from(i))
    }
}

impl From<u64> for SqlValue {
    fn from(i: u64) -> Self {
        SqlValue::Int(i as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(f: f64) -> Self {
        SqlValue::Float(f)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(SqlValue::Null, Into::into)
    }
}

fn qualified(catalog: &str, schema: &str, table: &str) -> String {
    format!("{catalog}.{schema}.{table}")
}

/// Multi-row INSERT for one batch
pub fn insert_statement(catalog: &str, schema: &str, batch: &TableBatch) -> String {
    let rows: Vec<String> = batch
        .rows
        .iter()
        .map(|row| {
            let values: Vec<String> = row.0.iter().map(SqlValue::render).collect();
            format!("({})", values.join(", "))
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        qualified(catalog, schema, batch.schema.name),
        batch.schema.columns.join(", "),
        rows.join(", ")
    )
}

/// DELETE targeting exactly the keys present in the batch, so a reload
/// replaces its own rows and nothing else. None when the batch is empty.
pub fn delete_statement(catalog: &str, schema: &str, batch: &TableBatch) -> Option<String> {
    if batch.rows.is_empty() {
        return None;
    }
    let key_indices = batch.schema.key_indices();
    let mut keys: Vec<String> = batch
        .rows
        .iter()
        .map(|row| {
            let parts: Vec<String> = key_indices.iter().map(|i| row.0[*i].render()).collect();
            if parts.len() == 1 {
                parts.into_iter().next().unwrap()
            } else {
                format!("({})", parts.join(", "))
            }
        })
        .collect();
    keys.sort();
    keys.dedup();

    let key_columns = if batch.schema.keys.len() == 1 {
        batch.schema.keys[0].to_string()
    } else {
        format!("({})", batch.schema.keys.join(", "))
    };
    Some(format!(
        "DELETE FROM {} WHERE {} IN ({})",
        qualified(catalog, schema, batch.schema.name),
        key_columns,
        keys.join(", ")
    ))
}
