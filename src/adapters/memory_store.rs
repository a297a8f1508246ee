//! In-process `TableStore` used by tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::cmp::Ordering;

use super::store::{Filter, Query, Row, TableStore};
use crate::error::Result;

#[derive(Default)]
pub struct MemoryStore {
    tables: DashMap<String, Vec<Row>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a table, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .get(table)
            .map(|t| t.value().clone())
            .unwrap_or_default()
    }
}

fn column<'a>(row: &'a Row, name: &str) -> &'a Value {
    row.get(name).unwrap_or(&Value::Null)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Ordering between two JSON scalars of compatible kinds.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_ts(x), parse_ts(y)) {
            (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match compare_values(a, b) {
        Some(ord) => ord == Ordering::Equal,
        None => a == b,
    }
}

fn matches(row: &Row, filter: &Filter) -> bool {
    let cmp = |c: &str, v: &Value| compare_values(column(row, c), v);
    match filter {
        Filter::Eq(c, v) => values_equal(column(row, c), v),
        Filter::Gt(c, v) => cmp(c, v) == Some(Ordering::Greater),
        Filter::Gte(c, v) => matches!(cmp(c, v), Some(Ordering::Greater | Ordering::Equal)),
        Filter::Lt(c, v) => cmp(c, v) == Some(Ordering::Less),
        Filter::Lte(c, v) => matches!(cmp(c, v), Some(Ordering::Less | Ordering::Equal)),
        Filter::In(c, vs) => vs.iter().any(|v| values_equal(column(row, c), v)),
        Filter::IsNull(c) => column(row, c).is_null(),
    }
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches(row, f))
}

fn same_key(a: &Row, b: &Row, keys: &[&str]) -> bool {
    !keys.is_empty() && keys.iter().all(|k| values_equal(column(a, k), column(b, k)))
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn select(&self, query: &Query) -> Result<Vec<Row>> {
        let mut rows: Vec<Row> = match self.tables.get(&query.table) {
            Some(t) => t
                .iter()
                .filter(|r| matches_all(r, &query.filters))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        if !query.order.is_empty() {
            rows.sort_by(|a, b| {
                for o in &query.order {
                    let (va, vb) = (column(a, &o.column), column(b, &o.column));
                    let ord = match (va.is_null(), vb.is_null()) {
                        // nulls last
                        (true, false) => Ordering::Greater,
                        (false, true) => Ordering::Less,
                        _ => compare_values(va, vb).unwrap_or(Ordering::Equal),
                    };
                    let ord = if o.descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let rows = rows.into_iter().skip(query.offset);
        Ok(match query.limit {
            Some(n) => rows.take(n).collect(),
            None => rows.collect(),
        })
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        Ok(self
            .tables
            .get(table)
            .map(|t| t.iter().filter(|r| matches_all(r, filters)).count())
            .unwrap_or(0))
    }

    async fn upsert(&self, table: &str, rows: &[Row], conflict_keys: &[&str]) -> Result<usize> {
        let mut entry = self.tables.entry(table.to_string()).or_default();
        for row in rows {
            match entry.iter().position(|r| same_key(r, row, conflict_keys)) {
                Some(i) => {
                    let existing = &mut entry[i];
                    for (k, v) in row {
                        existing.insert(k.clone(), v.clone());
                    }
                }
                None => entry.push(row.clone()),
            }
        }
        Ok(rows.len())
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: &Row) -> Result<usize> {
        let Some(mut entry) = self.tables.get_mut(table) else {
            return Ok(0);
        };
        let mut n = 0;
        for row in entry.iter_mut().filter(|r| matches_all(r, filters)) {
            for (k, v) in patch {
                row.insert(k.clone(), v.clone());
            }
            n += 1;
        }
        Ok(n)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        let Some(mut entry) = self.tables.get_mut(table) else {
            return Ok(0);
        };
        let before = entry.len();
        entry.retain(|r| !matches_all(r, filters));
        Ok(before - entry.len())
    }
}
