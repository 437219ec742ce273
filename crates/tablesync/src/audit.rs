//! Schema change audit trail.
//!
//! This module manages the `schema_change_log` table, an append-only history
//! of every column drift the synchronizer detected. Records are written
//! whether or not the change was applied, and are never updated or deleted.

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::diff::{Change, ChangeKind};
use crate::error::{Result, SyncError};
use crate::executor::{Executor, Row, Value};

/// Name of the audit table.
pub const AUDIT_TABLE: &str = "schema_change_log";

/// SQL to create the audit table.
pub const CREATE_AUDIT_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS schema_change_log (\
id CHAR(36) PRIMARY KEY, \
table_name VARCHAR(255) NOT NULL, \
column_name VARCHAR(255) NULL, \
change_kind ENUM('AddColumn','ModifyColumn') NOT NULL, \
old_type VARCHAR(255) NULL, \
new_type VARCHAR(255) NULL, \
changed_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6))";

const INSERT_SQL: &str = "INSERT INTO schema_change_log \
(id, table_name, column_name, change_kind, old_type, new_type, changed_at) \
VALUES (?, ?, ?, ?, ?, ?, ?)";

const SELECT_COLUMNS: &str =
    "SELECT id, table_name, column_name, change_kind, old_type, new_type, changed_at FROM schema_change_log";

/// One audited change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    /// Record identifier.
    pub id: Uuid,
    /// Table the change belongs to.
    pub table_name: String,
    /// Column the change belongs to.
    pub column_name: Option<String>,
    /// What kind of change was detected.
    pub kind: ChangeKind,
    /// Type before the change, for modifications.
    pub old_type: Option<String>,
    /// Declared type.
    pub new_type: Option<String>,
    /// When the change was detected.
    pub changed_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// Builds a fresh record for a column-level change.
    ///
    /// Returns `None` for table creation, which is not audited.
    #[must_use]
    pub fn for_change(change: &Change) -> Option<Self> {
        let (kind, old_type, new_type) = match change {
            Change::CreateTable { .. } => return None,
            Change::AddColumn { sql_type, .. } => (ChangeKind::AddColumn, None, sql_type.clone()),
            Change::ModifyColumn {
                old_type, new_type, ..
            } => (
                ChangeKind::ModifyColumn,
                Some(old_type.clone()),
                new_type.clone(),
            ),
        };

        Some(Self {
            id: Uuid::new_v4(),
            table_name: change.table().to_string(),
            column_name: change.column().map(str::to_string),
            kind,
            old_type,
            new_type: Some(new_type),
            changed_at: Utc::now().trunc_subsecs(6),
        })
    }

    fn params(&self) -> Vec<Value> {
        vec![
            Value::from(self.id.to_string()),
            Value::from(self.table_name.as_str()),
            Value::from(self.column_name.clone()),
            Value::from(self.kind.as_str()),
            Value::from(self.old_type.clone()),
            Value::from(self.new_type.clone()),
            Value::from(self.changed_at.naive_utc()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        let bad = |what: &str| SyncError::UnexpectedRow(format!("{AUDIT_TABLE}: {what} in {row:?}"));

        let id = row
            .text(0)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| bad("invalid id"))?;
        let table_name = row.text(1).ok_or_else(|| bad("missing table_name"))?;
        let kind = row
            .text(3)
            .and_then(ChangeKind::parse)
            .ok_or_else(|| bad("unknown change_kind"))?;
        let changed_at = row
            .datetime(6)
            .ok_or_else(|| bad("missing changed_at"))?
            .and_utc();

        Ok(Self {
            id,
            table_name: table_name.to_string(),
            column_name: row.text(2).map(str::to_string),
            kind,
            old_type: row.text(4).map(str::to_string),
            new_type: row.text(5).map(str::to_string),
            changed_at,
        })
    }
}

/// Reads and appends audit records.
///
/// Holds no connection: every call takes the session it runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeAuditLog;

impl ChangeAuditLog {
    /// Creates an audit log handle.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Ensures the audit table exists.
    pub async fn ensure_table<E: Executor + ?Sized>(&self, executor: &mut E) -> Result<()> {
        executor
            .execute(CREATE_AUDIT_TABLE_SQL, &[])
            .await
            .map_err(|e| SyncError::from_ddl(AUDIT_TABLE, CREATE_AUDIT_TABLE_SQL, e))?;
        Ok(())
    }

    /// Appends a record for `change`.
    ///
    /// Returns `None` without touching the database for table creation.
    pub async fn append<E: Executor + ?Sized>(
        &self,
        executor: &mut E,
        change: &Change,
    ) -> Result<Option<ChangeRecord>> {
        let Some(record) = ChangeRecord::for_change(change) else {
            return Ok(None);
        };
        self.insert(executor, &record).await?;
        Ok(Some(record))
    }

    /// Writes an already built record.
    pub async fn insert<E: Executor + ?Sized>(&self, executor: &mut E, record: &ChangeRecord) -> Result<()> {
        debug!(
            table = %record.table_name,
            column = ?record.column_name,
            kind = %record.kind,
            "Recording schema change"
        );
        executor
            .execute(INSERT_SQL, &record.params())
            .await
            .map_err(|e| SyncError::from_db(INSERT_SQL, e))?;
        Ok(())
    }

    /// Gets the most recent records, newest first.
    pub async fn recent<E: Executor + ?Sized>(&self, executor: &mut E, limit: usize) -> Result<Vec<ChangeRecord>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY changed_at DESC LIMIT {limit}");
        self.query(executor, &sql, &[]).await
    }

    /// Gets the most recent records for one table, newest first.
    pub async fn history_for<E: Executor + ?Sized>(
        &self,
        executor: &mut E,
        table: &str,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE table_name = ? ORDER BY changed_at DESC LIMIT {limit}"
        );
        self.query(executor, &sql, &[Value::from(table)]).await
    }

    async fn query<E: Executor + ?Sized>(
        &self,
        executor: &mut E,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<ChangeRecord>> {
        let rows = executor
            .fetch_all(sql, params)
            .await
            .map_err(|e| SyncError::from_db(sql, e))?;
        rows.iter().map(ChangeRecord::from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_for_modify() {
        let change = Change::ModifyColumn {
            table: "Person".into(),
            column: "Age".into(),
            old_type: "VARCHAR(255)".into(),
            new_type: "INT".into(),
        };
        let record = ChangeRecord::for_change(&change).unwrap();
        assert_eq!(record.table_name, "Person");
        assert_eq!(record.column_name.as_deref(), Some("Age"));
        assert_eq!(record.kind, ChangeKind::ModifyColumn);
        assert_eq!(record.old_type.as_deref(), Some("VARCHAR(255)"));
        assert_eq!(record.new_type.as_deref(), Some("INT"));
    }

    #[test]
    fn test_record_for_add_has_no_old_type() {
        let change = Change::AddColumn {
            table: "Person".into(),
            column: "Age".into(),
            sql_type: "INT".into(),
        };
        let record = ChangeRecord::for_change(&change).unwrap();
        assert_eq!(record.kind, ChangeKind::AddColumn);
        assert!(record.old_type.is_none());
    }

    #[test]
    fn test_records_get_fresh_ids() {
        let change = Change::AddColumn {
            table: "Person".into(),
            column: "Age".into(),
            sql_type: "INT".into(),
        };
        let a = ChangeRecord::for_change(&change).unwrap();
        let b = ChangeRecord::for_change(&change).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_create_table_has_no_record() {
        let change = Change::CreateTable {
            table: "Person".into(),
            columns: Vec::new(),
        };
        assert!(ChangeRecord::for_change(&change).is_none());
    }

    #[test]
    fn test_row_round_trip() {
        let change = Change::ModifyColumn {
            table: "Person".into(),
            column: "Age".into(),
            old_type: "VARCHAR(255)".into(),
            new_type: "INT".into(),
        };
        let record = ChangeRecord::for_change(&change).unwrap();
        let row = Row(record.params());
        let parsed = ChangeRecord::from_row(&row).unwrap();
        assert_eq!(parsed.id, record.id);
        assert_eq!(parsed.kind, record.kind);
        assert_eq!(parsed.old_type, record.old_type);
        assert_eq!(parsed.changed_at.naive_utc(), record.changed_at.naive_utc());
    }

    #[test]
    fn test_audit_table_schema() {
        assert!(CREATE_AUDIT_TABLE_SQL.starts_with("CREATE TABLE IF NOT EXISTS schema_change_log"));
        assert!(CREATE_AUDIT_TABLE_SQL.contains("id CHAR(36) PRIMARY KEY"));
        assert!(CREATE_AUDIT_TABLE_SQL.contains("ENUM('AddColumn','ModifyColumn')"));
        assert!(CREATE_AUDIT_TABLE_SQL.contains("DEFAULT CURRENT_TIMESTAMP"));
    }

    #[test]
    fn test_changed_at_keeps_microseconds() {
        // Records of one pass land within the same second and are ordered by
        // this column alone.
        assert!(CREATE_AUDIT_TABLE_SQL.contains("changed_at DATETIME(6) NOT NULL"));

        let change = Change::AddColumn {
            table: "Person".into(),
            column: "Age".into(),
            sql_type: "INT".into(),
        };
        let record = ChangeRecord::for_change(&change).unwrap();
        assert_eq!(record.changed_at.timestamp_subsec_nanos() % 1_000, 0);
    }
}
