use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row as _};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

use super::store::{validate_ident, Filter, Query, Row, TableStore};
use crate::error::{RinkError, Result};

/// PostgreSQL storage adapter.
///
/// Rows travel as JSON: selects return `to_jsonb(t)`, and bound values are
/// cast to the column types through `jsonb_populate_record(NULL::table, ..)`
/// so the same filter code works for integers, dates, timestamps and text.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn push_compare(
    qb: &mut QueryBuilder<'static, Postgres>,
    table: &str,
    col: &str,
    op: &str,
    value: &Value,
) {
    let mut wrapper = serde_json::Map::new();
    wrapper.insert(col.to_string(), value.clone());
    qb.push(format!(
        "t.{col} {op} (jsonb_populate_record(NULL::{table}, "
    ));
    qb.push_bind(Json(Value::Object(wrapper)));
    qb.push(format!(")).{col}"));
}

fn push_filters(
    qb: &mut QueryBuilder<'static, Postgres>,
    table: &str,
    filters: &[Filter],
) -> Result<()> {
    for (i, filter) in filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        let col = validate_ident(filter.column())?;
        match filter {
            Filter::Eq(_, v) if v.is_null() => {
                qb.push(format!("t.{col} IS NULL"));
            }
            Filter::Eq(_, v) => push_compare(qb, table, col, "=", v),
            Filter::Gt(_, v) => push_compare(qb, table, col, ">", v),
            Filter::Gte(_, v) => push_compare(qb, table, col, ">=", v),
            Filter::Lt(_, v) => push_compare(qb, table, col, "<", v),
            Filter::Lte(_, v) => push_compare(qb, table, col, "<=", v),
            Filter::In(_, values) if values.is_empty() => {
                qb.push("FALSE");
            }
            Filter::In(_, values) => {
                qb.push(format!(
                    "t.{col} IN (SELECT (jsonb_populate_record(NULL::{table}, \
                     jsonb_build_object('{col}', e))).{col} FROM jsonb_array_elements("
                ));
                qb.push_bind(Json(Value::Array(values.clone())));
                qb.push(") AS e)");
            }
            Filter::IsNull(_) => {
                qb.push(format!("t.{col} IS NULL"));
            }
        }
    }
    Ok(())
}

fn build_select(query: &Query) -> Result<QueryBuilder<'static, Postgres>> {
    let table = validate_ident(&query.table)?;
    let mut qb = QueryBuilder::new(format!("SELECT to_jsonb(t) AS doc FROM {table} AS t"));
    push_filters(&mut qb, table, &query.filters)?;

    for (i, order) in query.order.iter().enumerate() {
        let col = validate_ident(&order.column)?;
        qb.push(if i == 0 { " ORDER BY " } else { ", " });
        qb.push(format!(
            "t.{col} {}",
            if order.descending {
                "DESC NULLS LAST"
            } else {
                "ASC NULLS LAST"
            }
        ));
    }
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(limit as i64);
    }
    if query.offset > 0 {
        qb.push(" OFFSET ");
        qb.push_bind(query.offset as i64);
    }
    Ok(qb)
}

fn build_upsert(
    table: &str,
    rows: &[Row],
    conflict_keys: &[&str],
) -> Result<QueryBuilder<'static, Postgres>> {
    let table = validate_ident(table)?;
    let mut columns = BTreeSet::new();
    for row in rows {
        for key in row.keys() {
            columns.insert(validate_ident(key)?.to_string());
        }
    }
    for key in conflict_keys {
        validate_ident(key)?;
    }
    if columns.is_empty() {
        return Err(RinkError::Store(format!("upsert into {table} without columns")));
    }

    let cols = columns.iter().cloned().collect::<Vec<_>>().join(", ");
    let mut qb = QueryBuilder::new(format!(
        "INSERT INTO {table} ({cols}) SELECT {cols} FROM jsonb_populate_recordset(NULL::{table}, "
    ));
    qb.push_bind(Json(Value::Array(
        rows.iter().cloned().map(Value::Object).collect(),
    )));
    qb.push(")");

    if !conflict_keys.is_empty() {
        qb.push(format!(" ON CONFLICT ({}) ", conflict_keys.join(", ")));
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| !conflict_keys.contains(&c.as_str()))
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect();
        if updates.is_empty() {
            qb.push("DO NOTHING");
        } else {
            qb.push(format!("DO UPDATE SET {}", updates.join(", ")));
        }
    }
    Ok(qb)
}

fn build_delete(table: &str, filters: &[Filter]) -> Result<QueryBuilder<'static, Postgres>> {
    let table = validate_ident(table)?;
    let mut qb = QueryBuilder::new(format!("DELETE FROM {table} AS t"));
    push_filters(&mut qb, table, filters)?;
    Ok(qb)
}

#[async_trait]
impl TableStore for PostgresStore {
    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn select(&self, query: &Query) -> Result<Vec<Row>> {
        let mut qb = build_select(query)?;
        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            match row.try_get::<Value, _>("doc")? {
                Value::Object(map) => out.push(map),
                other => {
                    return Err(RinkError::Store(format!(
                        "non-object row from {}: {}",
                        query.table, other
                    )))
                }
            }
        }
        Ok(out)
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        let table = validate_ident(table)?;
        let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) AS n FROM {table} AS t"));
        push_filters(&mut qb, table, filters)?;
        let row = qb.build().fetch_one(&self.pool).await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.max(0) as usize)
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn upsert(&self, table: &str, rows: &[Row], conflict_keys: &[&str]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut qb = build_upsert(table, rows, conflict_keys)?;
        let result = qb.build().execute(&self.pool).await?;
        debug!("Upserted {} rows into {}", result.rows_affected(), table);
        Ok(result.rows_affected() as usize)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: &Row) -> Result<usize> {
        let table = validate_ident(table)?;
        if patch.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::new(format!("UPDATE {table} AS t SET "));
        for (i, col) in patch.keys().enumerate() {
            let col = validate_ident(col)?;
            if i > 0 {
                qb.push(", ");
            }
            qb.push(format!("{col} = (jsonb_populate_record(NULL::{table}, "));
            qb.push_bind(Json(Value::Object(patch.clone())));
            qb.push(format!(")).{col}"));
        }
        push_filters(&mut qb, table, filters)?;
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        let mut qb = build_delete(table, filters)?;
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    /// Delete and insert inside one transaction.
    #[instrument(skip(self, value, rows), fields(rows = rows.len()))]
    async fn replace_for_key(
        &self,
        table: &str,
        key: &str,
        value: &Value,
        rows: &[Row],
        conflict_keys: &[&str],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let mut del = build_delete(table, &[Filter::Eq(key.to_string(), value.clone())])?;
        let deleted = del.build().execute(&mut *tx).await?.rows_affected();

        let inserted = if rows.is_empty() {
            0
        } else {
            let mut ins = build_upsert(table, rows, conflict_keys)?;
            ins.build().execute(&mut *tx).await?.rows_affected()
        };

        tx.commit().await?;
        debug!(
            "Replaced {} rows with {} in {} for {}={}",
            deleted, inserted, table, key, value
        );
        Ok(inserted as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_sql_shape() {
        let q = Query::table("games")
            .eq("processed", false)
            .is_in("game_id", vec![json!(1), json!(2)])
            .order_by("game_id")
            .limit(10);
        let qb = build_select(&q).unwrap();
        let sql = qb.sql();
        assert!(sql.starts_with("SELECT to_jsonb(t) AS doc FROM games AS t WHERE "));
        assert!(sql.contains("jsonb_populate_record(NULL::games"));
        assert!(sql.contains("jsonb_array_elements("));
        assert!(sql.contains("ORDER BY t.game_id ASC NULLS LAST"));
        assert!(sql.contains("LIMIT $"));
    }

    #[test]
    fn upsert_sql_updates_non_key_columns() {
        let row = json!({"game_id": 1, "event_index": 3, "distance": 12.0})
            .as_object()
            .cloned()
            .unwrap();
        let qb = build_upsert("shots", &[row], &["game_id", "event_index"]).unwrap();
        let sql = qb.sql();
        assert!(sql.contains("INSERT INTO shots (distance, event_index, game_id)"));
        assert!(sql.contains("ON CONFLICT (game_id, event_index) DO UPDATE SET distance = EXCLUDED.distance"));
        assert!(!sql.contains("game_id = EXCLUDED.game_id"));
    }

    #[test]
    fn null_equality_becomes_is_null() {
        let qb = build_delete("shots", &[Filter::Eq("goalie_id".into(), Value::Null)]).unwrap();
        assert!(qb.sql().ends_with("WHERE t.goalie_id IS NULL"));
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        let q = Query::table("games; drop table games");
        assert!(build_select(&q).is_err());
    }
}
