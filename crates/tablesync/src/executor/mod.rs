//! The database seam.
//!
//! The engine only needs to run a statement and read rows back. [`Executor`]
//! is that capability; [`mysql`] implements it for a live
//! `sqlx::MySqlConnection`.

pub mod mysql;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::DbError;

/// A bound statement parameter or a value read from a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Text.
    Text(String),
    /// Date and time without zone.
    DateTime(NaiveDateTime),
}

impl Value {
    /// Returns the text content, if this is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Option<String>> for Value {
    fn from(s: Option<String>) -> Self {
        s.map_or(Self::Null, Self::Text)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Self::DateTime(dt)
    }
}

/// One result row, columns in select order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row(pub Vec<Value>);

impl Row {
    /// Value at `index`, or `Null` if out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> &Value {
        self.0.get(index).unwrap_or(&Value::Null)
    }

    /// Text at `index`.
    #[must_use]
    pub fn text(&self, index: usize) -> Option<&str> {
        self.get(index).as_str()
    }

    /// Timestamp at `index`.
    #[must_use]
    pub fn datetime(&self, index: usize) -> Option<NaiveDateTime> {
        match self.get(index) {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

/// Runs SQL against one database session.
///
/// Takes `&mut self`: a session runs one statement at a time, and a pass
/// holding the borrow cannot be interleaved with another on the same session.
#[async_trait]
pub trait Executor: Send {
    /// Executes a statement and returns the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError>;

    /// Runs a query and returns every row.
    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError>;
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for &mut E {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        (**self).execute(sql, params).await
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        (**self).fetch_all(sql, params).await
    }
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Box<E> {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        (**self).execute(sql, params).await
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        (**self).fetch_all(sql, params).await
    }
}
