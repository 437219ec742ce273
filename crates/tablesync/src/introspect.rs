//! Live schema introspection.
//!
//! Reads the columns a table currently has from `INFORMATION_SCHEMA`. A
//! missing table yields an empty [`SchemaSnapshot`], which the diff engine
//! reads as "create it".

use serde::Serialize;

use crate::error::{Result, SyncError};
use crate::executor::{Executor, Value};

/// Catalog query for one table in the current database.
///
/// The table name is compared byte for byte, whatever the catalog collation
/// and `lower_case_table_names`; column names are matched without regard to
/// case afterwards.
pub const COLUMNS_QUERY: &str = "SELECT COLUMN_NAME, COLUMN_TYPE \
     FROM INFORMATION_SCHEMA.COLUMNS \
     WHERE TABLE_SCHEMA = DATABASE() AND BINARY TABLE_NAME = ? \
     ORDER BY ORDINAL_POSITION";

/// The observed shape of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    table: String,
    columns: Vec<(String, String)>,
}

impl SchemaSnapshot {
    /// Creates an empty snapshot for `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Adds an observed column.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        self.insert(name, sql_type);
        self
    }

    /// Records an observed column, replacing any earlier entry of the same name.
    pub fn insert(&mut self, name: impl Into<String>, sql_type: impl Into<String>) {
        let name = name.into();
        let sql_type = sql_type.into();
        match self
            .columns
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, sql_type),
            None => self.columns.push((name, sql_type)),
        }
    }

    /// Table the snapshot was taken of.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// True when the table has no columns, i.e. does not exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Number of observed columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Observed SQL type of `column`, ignoring case in the name.
    #[must_use]
    pub fn sql_type(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, ty)| ty.as_str())
    }

    /// Observed columns in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }
}

/// Reads the current shape of `table`.
pub async fn introspect<E: Executor + ?Sized>(executor: &mut E, table: &str) -> Result<SchemaSnapshot> {
    let rows = executor
        .fetch_all(COLUMNS_QUERY, &[Value::from(table)])
        .await
        .map_err(|e| SyncError::from_db(COLUMNS_QUERY, e))?;

    let mut snapshot = SchemaSnapshot::new(table);
    for row in rows {
        let (Some(name), Some(sql_type)) = (row.text(0), row.text(1)) else {
            return Err(SyncError::UnexpectedRow(format!(
                "expected (COLUMN_NAME, COLUMN_TYPE) for '{table}', got {row:?}"
            )));
        };
        snapshot.insert(name, sql_type);
    }
    Ok(snapshot)
}
