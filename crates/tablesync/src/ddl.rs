//! DDL rendering and execution.
//!
//! Identifiers are interpolated bare: they have already been checked by
//! [`is_valid_identifier`](crate::entity::is_valid_identifier) when the
//! descriptor was built. Types are interpolated as declared.

use tracing::{debug, info};

use crate::diff::Change;
use crate::entity::ColumnDescriptor;
use crate::error::{Result, SyncError};
use crate::executor::Executor;

/// Renders a column clause of a `CREATE TABLE`.
#[must_use]
pub fn column_definition(column: &ColumnDescriptor) -> String {
    if column.primary_key {
        format!("{} {} PRIMARY KEY", column.name, column.sql_type)
    } else {
        format!("{} {}", column.name, column.sql_type)
    }
}

/// Renders the statement for a change.
#[must_use]
pub fn render(change: &Change) -> String {
    match change {
        Change::CreateTable { table, columns } => {
            let defs: Vec<String> = columns.iter().map(column_definition).collect();
            format!("CREATE TABLE IF NOT EXISTS {table} ({})", defs.join(", "))
        }
        Change::AddColumn {
            table,
            column,
            sql_type,
        } => format!("ALTER TABLE {table} ADD COLUMN {column} {sql_type}"),
        Change::ModifyColumn {
            table,
            column,
            new_type,
            ..
        } => format!("ALTER TABLE {table} MODIFY COLUMN {column} {new_type}"),
    }
}

/// Issues DDL for changes, one autocommitted statement at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DdlExecutor {
    dry_run: bool,
}

impl DdlExecutor {
    /// Creates an executor that runs statements.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables dry-run mode (statements are rendered and logged only).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Whether statements are skipped.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Renders and runs the statement for `change`, returning it.
    ///
    /// A rejected statement is reported as [`SyncError::Privilege`] when the
    /// database says so; nothing already applied is undone.
    pub async fn apply<E: Executor + ?Sized>(&self, executor: &mut E, change: &Change) -> Result<String> {
        let sql = render(change);

        if self.dry_run {
            info!(table = %change.table(), sql = %sql, "Dry run, not executing");
            return Ok(sql);
        }

        debug!(table = %change.table(), sql = %sql, "Executing DDL");
        executor
            .execute(&sql, &[])
            .await
            .map_err(|e| SyncError::from_ddl(change.table(), &sql, e))?;
        info!(table = %change.table(), change = %change, "Applied schema change");
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor {
                name: "Id".into(),
                sql_type: "CHAR(36)".into(),
                primary_key: true,
            },
            ColumnDescriptor {
                name: "FirstName".into(),
                sql_type: "VARCHAR(255)".into(),
                primary_key: false,
            },
            ColumnDescriptor {
                name: "Age".into(),
                sql_type: "INT".into(),
                primary_key: false,
            },
        ]
    }

    #[test]
    fn test_create_table() {
        let sql = render(&Change::CreateTable {
            table: "Person".into(),
            columns: columns(),
        });
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS Person (Id CHAR(36) PRIMARY KEY, FirstName VARCHAR(255), Age INT)"
        );
    }

    #[test]
    fn test_add_column() {
        let sql = render(&Change::AddColumn {
            table: "Person".into(),
            column: "Age".into(),
            sql_type: "INT".into(),
        });
        assert_eq!(sql, "ALTER TABLE Person ADD COLUMN Age INT");
    }

    #[test]
    fn test_modify_column_uses_new_type() {
        let sql = render(&Change::ModifyColumn {
            table: "Person".into(),
            column: "Age".into(),
            old_type: "VARCHAR(255)".into(),
            new_type: "INT".into(),
        });
        assert_eq!(sql, "ALTER TABLE Person MODIFY COLUMN Age INT");
    }
}
