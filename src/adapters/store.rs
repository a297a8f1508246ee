//! Generic tabular store surface.
//!
//! The pipeline only needs select / count / upsert / update / delete over
//! JSON-shaped rows plus one compound operation, `replace_for_key`, that
//! swaps every row sharing a key value for a new set. Typed records go
//! through `to_row` / `from_row`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{RinkError, Result};

pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _)
            | Filter::Gt(c, _)
            | Filter::Gte(c, _)
            | Filter::Lt(c, _)
            | Filter::Lte(c, _)
            | Filter::In(c, _)
            | Filter::IsNull(c) => c,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// A select over one table
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(column.to_string(), value.into()))
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Gte(column.to_string(), value.into()))
    }

    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Lte(column.to_string(), value.into()))
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Lt(column.to_string(), value.into()))
    }

    pub fn is_in(self, column: &str, values: Vec<Value>) -> Self {
        self.filter(Filter::In(column.to_string(), values))
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order.push(OrderBy {
            column: column.to_string(),
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order.push(OrderBy {
            column: column.to_string(),
            descending: true,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

#[async_trait]
pub trait TableStore: Send + Sync {
    async fn select(&self, query: &Query) -> Result<Vec<Row>>;

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<usize>;

    /// Insert-or-merge on `conflict_keys`. Returns affected rows.
    async fn upsert(&self, table: &str, rows: &[Row], conflict_keys: &[&str]) -> Result<usize>;

    /// Set the columns of `patch` on every row matching `filters`.
    async fn update(&self, table: &str, filters: &[Filter], patch: &Row) -> Result<usize>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize>;

    /// Replace every row whose `key` equals `value` with `rows`.
    ///
    /// Safe to retry after a partial failure: a repeated call deletes
    /// whatever the failed attempt left behind before inserting again.
    async fn replace_for_key(
        &self,
        table: &str,
        key: &str,
        value: &Value,
        rows: &[Row],
        conflict_keys: &[&str],
    ) -> Result<usize> {
        self.delete(table, &[Filter::Eq(key.to_string(), value.clone())])
            .await?;
        if rows.is_empty() {
            return Ok(0);
        }
        self.upsert(table, rows, conflict_keys).await
    }
}

/// Serialize a typed record into a store row.
pub fn to_row<T: Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(RinkError::Store(format!(
            "expected a JSON object row, got {}",
            other
        ))),
    }
}

pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

/// Page through a query until exhausted.
pub async fn select_all(store: &dyn TableStore, query: Query, page_size: usize) -> Result<Vec<Row>> {
    let page_size = page_size.max(1);
    let mut out = Vec::new();
    let mut offset = query.offset;
    loop {
        let page = store
            .select(&query.clone().limit(page_size).offset(offset))
            .await?;
        let n = page.len();
        out.extend(page);
        if n < page_size {
            break;
        }
        offset += n;
    }
    Ok(out)
}

/// Column names are interpolated into SQL; only plain identifiers pass.
pub fn validate_ident(name: &str) -> Result<&str> {
    let ok = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .next()
            .map(|c| c.is_ascii_lowercase() || c == '_')
            .unwrap_or(false)
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if ok {
        Ok(name)
    } else {
        Err(RinkError::Store(format!("invalid identifier: {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        game_id: i64,
        processed: bool,
    }

    #[test]
    fn typed_rows_round_trip() {
        let s = Sample {
            game_id: 7,
            processed: true,
        };
        let row = to_row(&s).unwrap();
        assert_eq!(row.get("game_id"), Some(&Value::from(7)));
        let back: Sample = from_row(row).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn non_object_rows_rejected() {
        assert!(to_row(&5).is_err());
    }

    #[test]
    fn identifiers_are_checked() {
        assert!(validate_ident("game_id").is_ok());
        assert!(validate_ident("Game").is_err());
        assert!(validate_ident("x; DROP TABLE games").is_err());
        assert!(validate_ident("").is_err());
    }

    #[test]
    fn query_builder_accumulates() {
        let q = Query::table("games")
            .eq("processed", false)
            .lt("game_id", 10)
            .order_by("game_id")
            .limit(5);
        assert_eq!(q.filters.len(), 2);
        assert_eq!(q.limit, Some(5));
        assert_eq!(q.order[0].column, "game_id");
    }
}
