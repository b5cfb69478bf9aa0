//! Query builder over a single table
//!
//! Column names are checked against the table's whitelist before any SQL is
//! built, so predicates can be assembled from runtime values safely.

use crate::error::{Result, StorageError};
use crate::store::LocalStore;
use crate::table::LocalTable;
use cadence_core::time;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite};
use std::fmt::Write as _;
use std::marker::PhantomData;

/// A value bound into a statement
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Integer(time::to_micros(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Real(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "'{}'", v),
        }
    }
}

pub(crate) type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

pub(crate) fn bind_value(query: SqliteQuery<'_>, value: Value) -> SqliteQuery<'_> {
    match value {
        Value::Null => query.bind(Option::<i64>::None),
        Value::Integer(v) => query.bind(v),
        Value::Real(v) => query.bind(v),
        Value::Text(v) => query.bind(v),
    }
}

/// Comparison operator of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Op {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
struct Filter {
    column: String,
    op: Op,
    value: Value,
}

/// Query over the rows of `T`'s table
#[derive(Debug)]
pub struct Query<T> {
    filters: Vec<Filter>,
    sort: Vec<(String, Order)>,
    limit: Option<i64>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            sort: self.sort.clone(),
            limit: self.limit,
            _marker: PhantomData,
        }
    }
}

impl<T: LocalTable> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: LocalTable> Query<T> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            sort: Vec::new(),
            limit: None,
            _marker: PhantomData,
        }
    }

    /// Add a predicate; `Eq`/`Ne` against `Value::Null` become `IS [NOT] NULL`
    #[must_use]
    pub fn filter(mut self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, Op::Eq, value)
    }

    #[must_use]
    pub fn ne(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, Op::Ne, value)
    }

    #[must_use]
    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, Op::Gt, value)
    }

    #[must_use]
    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, Op::Gte, value)
    }

    #[must_use]
    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, Op::Lt, value)
    }

    #[must_use]
    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, Op::Lte, value)
    }

    /// Sort by a column; later calls break ties of earlier ones
    #[must_use]
    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.sort.push((column.to_string(), order));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Stable identity of this query: table, predicates and sort
    pub fn fingerprint(&self) -> String {
        let mut out = T::TABLE.as_str().to_string();
        for filter in &self.filters {
            let _ = write!(out, "|{}{}{}", filter.column, filter.op.as_sql(), filter.value);
        }
        for (column, order) in &self.sort {
            let _ = write!(out, "|sort:{}:{:?}", column, order);
        }
        if let Some(limit) = self.limit {
            let _ = write!(out, "|limit:{}", limit);
        }
        out
    }

    fn check_column(column: &str) -> Result<()> {
        if T::COLUMNS.contains(&column) || column == "dirty" {
            Ok(())
        } else {
            Err(StorageError::InvalidQuery(format!(
                "unknown column `{}` on {}",
                column,
                T::TABLE
            )))
        }
    }

    /// Build the SQL for this query with the given select list
    pub(crate) fn to_sql(&self, select: &str) -> Result<(String, Vec<Value>)> {
        let mut sql = format!("SELECT {} FROM {}", select, T::TABLE.as_str());
        let mut binds = Vec::new();

        for (i, filter) in self.filters.iter().enumerate() {
            Self::check_column(&filter.column)?;
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });

            match (&filter.value, filter.op) {
                (Value::Null, Op::Eq) => {
                    let _ = write!(sql, "{} IS NULL", filter.column);
                }
                (Value::Null, Op::Ne) => {
                    let _ = write!(sql, "{} IS NOT NULL", filter.column);
                }
                (value, op) => {
                    let _ = write!(sql, "{} {} ?", filter.column, op.as_sql());
                    binds.push(value.clone());
                }
            }
        }

        for (i, (column, order)) in self.sort.iter().enumerate() {
            Self::check_column(column)?;
            sql.push_str(if i == 0 { " ORDER BY " } else { ", " });
            let dir = match order {
                Order::Asc => "ASC",
                Order::Desc => "DESC",
            };
            let _ = write!(sql, "{} {}", column, dir);
        }

        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {}", limit);
        }

        Ok((sql, binds))
    }

    /// Run the query and decode every matching row
    pub async fn fetch(&self, store: &LocalStore) -> Result<Vec<T>> {
        let (sql, binds) = self.to_sql(&T::COLUMNS.join(", "))?;
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = bind_value(query, value);
        }

        let rows = query.fetch_all(store.pool()).await?;
        rows.iter()
            .map(|row| T::from_row(row).map_err(StorageError::from))
            .collect()
    }

    /// First matching row, if any
    pub async fn fetch_one(&self, store: &LocalStore) -> Result<Option<T>> {
        let mut rows = self.clone().limit(1).fetch(store).await?;
        Ok(rows.pop())
    }

    /// Number of matching rows (sort and limit are ignored)
    pub async fn count(&self, store: &LocalStore) -> Result<i64> {
        let unsorted = Self {
            filters: self.filters.clone(),
            sort: Vec::new(),
            limit: None,
            _marker: PhantomData,
        };
        let (sql, binds) = unsorted.to_sql("COUNT(*) AS count")?;
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = bind_value(query, value);
        }

        let row: SqliteRow = query.fetch_one(store.pool()).await?;
        Ok(row.get("count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::Playlist;

    #[test]
    fn builds_predicates_and_sort() {
        let query = Query::<Playlist>::new()
            .eq("user_id", "u-1")
            .eq("is_deleted", false)
            .gte("updated_at", 10)
            .order_by("updated_at", Order::Desc)
            .limit(5);

        let (sql, binds) = query.to_sql("id").unwrap();
        assert_eq!(
            sql,
            "SELECT id FROM playlists WHERE user_id = ? AND is_deleted = ? AND updated_at >= ? \
             ORDER BY updated_at DESC LIMIT 5"
        );
        assert_eq!(
            binds,
            vec![Value::from("u-1"), Value::Integer(0), Value::Integer(10)]
        );
    }

    #[test]
    fn null_equality_uses_is_null() {
        let (sql, binds) = Query::<Playlist>::new()
            .eq("deleted_at", Value::Null)
            .to_sql("id")
            .unwrap();
        assert!(sql.ends_with("WHERE deleted_at IS NULL"));
        assert!(binds.is_empty());
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let err = Query::<Playlist>::new()
            .eq("name; DROP TABLE playlists", "x")
            .to_sql("id")
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidQuery(_)));
    }

    #[test]
    fn fingerprint_distinguishes_predicates() {
        let a = Query::<Playlist>::new().eq("user_id", "a");
        let b = Query::<Playlist>::new().eq("user_id", "b");
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }
}
