//! Drift detection.
//!
//! Compares an [`EntityDescriptor`] against a [`SchemaSnapshot`] and lists the
//! changes that would bring the table in line with the declaration. Only
//! additive changes are produced: columns present in the database but not in
//! the declaration are left alone.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{ColumnDescriptor, EntityDescriptor};
use crate::introspect::SchemaSnapshot;

/// Kind of a column-level change, as stored in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A column was missing.
    AddColumn,
    /// A column had a different type.
    ModifyColumn,
}

impl ChangeKind {
    /// Name stored in the audit table.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddColumn => "AddColumn",
            Self::ModifyColumn => "ModifyColumn",
        }
    }

    /// Parses a stored name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AddColumn" => Some(Self::AddColumn),
            "ModifyColumn" => Some(Self::ModifyColumn),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single required change to a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Change {
    /// The table does not exist.
    CreateTable {
        /// Table name.
        table: String,
        /// Every declared column.
        columns: Vec<ColumnDescriptor>,
    },
    /// A declared column is missing.
    AddColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Declared type.
        sql_type: String,
    },
    /// A declared column exists with another type.
    ModifyColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Type reported by the database.
        old_type: String,
        /// Declared type.
        new_type: String,
    },
}

impl Change {
    /// Table this change applies to.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table, .. }
            | Self::AddColumn { table, .. }
            | Self::ModifyColumn { table, .. } => table,
        }
    }

    /// Column this change applies to, for column-level changes.
    #[must_use]
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::CreateTable { .. } => None,
            Self::AddColumn { column, .. } | Self::ModifyColumn { column, .. } => Some(column),
        }
    }

    /// Audit kind, for column-level changes.
    #[must_use]
    pub fn kind(&self) -> Option<ChangeKind> {
        match self {
            Self::CreateTable { .. } => None,
            Self::AddColumn { .. } => Some(ChangeKind::AddColumn),
            Self::ModifyColumn { .. } => Some(ChangeKind::ModifyColumn),
        }
    }

    /// Returns true for [`Change::CreateTable`].
    #[must_use]
    pub fn is_create_table(&self) -> bool {
        matches!(self, Self::CreateTable { .. })
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable { table, columns } => {
                write!(f, "create table {table} ({} columns)", columns.len())
            }
            Self::AddColumn {
                table,
                column,
                sql_type,
            } => write!(f, "add column {table}.{column} {sql_type}"),
            Self::ModifyColumn {
                table,
                column,
                old_type,
                new_type,
            } => write!(f, "modify column {table}.{column} {old_type} -> {new_type}"),
        }
    }
}

/// Options for the diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOptions {
    /// Compare types after normalizing them instead of literally.
    ///
    /// MySQL reports some types differently from how they were declared
    /// (`int(11)` for `INT` on 5.7). With this off such columns are reported
    /// as drifted on every pass.
    pub normalize_types: bool,
}

impl DiffOptions {
    /// Creates the default options: literal, case-insensitive comparison.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables type normalization.
    #[must_use]
    pub fn with_normalized_types(mut self) -> Self {
        self.normalize_types = true;
        self
    }

    fn types_match(self, observed: &str, expected: &str) -> bool {
        if self.normalize_types {
            normalize_type(observed) == normalize_type(expected)
        } else {
            observed.eq_ignore_ascii_case(expected)
        }
    }
}

/// Lowercases, drops whitespace and strips integer display widths.
///
/// `tinyint(1)` keeps its width since it is how booleans are declared.
#[must_use]
pub fn normalize_type(sql_type: &str) -> String {
    const INTEGER_TYPES: &[&str] = &["tinyint", "smallint", "mediumint", "int", "integer", "bigint"];

    let compact: String = sql_type
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    if let Some(open) = compact.find('(') {
        let (base, rest) = compact.split_at(open);
        if INTEGER_TYPES.contains(&base) && !(base == "tinyint" && rest.starts_with("(1)")) {
            if let Some(close) = rest.find(')') {
                return format!("{base}{}", &rest[close + 1..]);
            }
        }
    }
    compact
}

/// Lists the changes needed to make `snapshot` match `descriptor`.
///
/// An empty snapshot produces a single [`Change::CreateTable`]. Otherwise
/// changes follow the descriptor's column order.
#[must_use]
pub fn diff(
    descriptor: &EntityDescriptor,
    snapshot: &SchemaSnapshot,
    options: DiffOptions,
) -> Vec<Change> {
    let table = descriptor.table();

    if snapshot.is_empty() {
        return vec![Change::CreateTable {
            table: table.to_string(),
            columns: descriptor.columns().to_vec(),
        }];
    }

    let mut changes = Vec::new();
    for column in descriptor.columns() {
        match snapshot.sql_type(&column.name) {
            None => changes.push(Change::AddColumn {
                table: table.to_string(),
                column: column.name.clone(),
                sql_type: column.sql_type.clone(),
            }),
            Some(observed) if !options.types_match(observed, &column.sql_type) => {
                changes.push(Change::ModifyColumn {
                    table: table.to_string(),
                    column: column.name.clone(),
                    old_type: observed.to_string(),
                    new_type: column.sql_type.clone(),
                });
            }
            Some(_) => {}
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityDef, FieldDef};
    use crate::mapping::ScalarType;

    fn person() -> EntityDescriptor {
        EntityDescriptor::build(
            &EntityDef::new("Person")
                .field(FieldDef::new("Id", ScalarType::Identifier).primary_key())
                .field(FieldDef::new("FirstName", ScalarType::Text))
                .field(FieldDef::new("Age", ScalarType::Int32)),
        )
        .unwrap()
    }

    fn literal(snapshot: &SchemaSnapshot) -> Vec<Change> {
        diff(&person(), snapshot, DiffOptions::new())
    }

    #[test]
    fn test_missing_table_is_single_create() {
        let changes = literal(&SchemaSnapshot::new("Person"));
        assert_eq!(changes.len(), 1);
        match &changes[0] {
            Change::CreateTable { table, columns } => {
                assert_eq!(table, "Person");
                assert_eq!(columns.len(), 3);
            }
            other => panic!("Expected CreateTable, got {other:?}"),
        }
    }

    #[test]
    fn test_no_changes() {
        let snapshot = SchemaSnapshot::new("Person")
            .column("Id", "CHAR(36)")
            .column("FirstName", "VARCHAR(255)")
            .column("Age", "INT");
        assert!(literal(&snapshot).is_empty());
    }

    #[test]
    fn test_type_case_is_ignored() {
        let snapshot = SchemaSnapshot::new("Person")
            .column("id", "char(36)")
            .column("firstname", "varchar(255)")
            .column("age", "int");
        assert!(literal(&snapshot).is_empty());
    }

    #[test]
    fn test_display_width_is_drift_by_default() {
        let snapshot = SchemaSnapshot::new("Person")
            .column("Id", "CHAR(36)")
            .column("FirstName", "VARCHAR(255)")
            .column("Age", "INT(11)");
        let changes = literal(&snapshot);
        assert_eq!(
            changes,
            vec![Change::ModifyColumn {
                table: "Person".to_string(),
                column: "Age".to_string(),
                old_type: "INT(11)".to_string(),
                new_type: "INT".to_string(),
            }]
        );
    }

    #[test]
    fn test_normalized_types() {
        let snapshot = SchemaSnapshot::new("Person")
            .column("Id", "char(36)")
            .column("FirstName", "varchar(255)")
            .column("Age", "int(11)");
        let options = DiffOptions::new().with_normalized_types();
        assert!(diff(&person(), &snapshot, options).is_empty());
    }

    #[test]
    fn test_add_and_modify_follow_declaration_order() {
        let snapshot = SchemaSnapshot::new("Person")
            .column("Age", "VARCHAR(255)")
            .column("Id", "CHAR(36)");
        let changes = literal(&snapshot);
        assert_eq!(changes.len(), 2);
        assert!(matches!(
            &changes[0],
            Change::AddColumn { column, sql_type, .. } if column == "FirstName" && sql_type == "VARCHAR(255)"
        ));
        assert!(matches!(
            &changes[1],
            Change::ModifyColumn { column, old_type, new_type, .. }
                if column == "Age" && old_type == "VARCHAR(255)" && new_type == "INT"
        ));
    }

    #[test]
    fn test_extra_columns_are_left_alone() {
        let snapshot = SchemaSnapshot::new("Person")
            .column("Id", "CHAR(36)")
            .column("FirstName", "VARCHAR(255)")
            .column("Age", "INT")
            .column("Legacy", "TEXT");
        assert!(literal(&snapshot).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let snapshot = SchemaSnapshot::new("Person").column("Age", "BIGINT");
        assert_eq!(literal(&snapshot), literal(&snapshot));
    }

    #[test]
    fn test_normalize_type() {
        assert_eq!(normalize_type("INT(11)"), "int");
        assert_eq!(normalize_type("bigint(20) unsigned"), "bigintunsigned");
        assert_eq!(normalize_type("tinyint(1)"), "tinyint(1)");
        assert_eq!(normalize_type("tinyint(4)"), "tinyint");
        assert_eq!(normalize_type("DECIMAL(18, 2)"), "decimal(18,2)");
        assert_eq!(normalize_type("VARCHAR(255)"), "varchar(255)");
    }

    #[test]
    fn test_change_accessors() {
        let change = Change::AddColumn {
            table: "Person".into(),
            column: "Age".into(),
            sql_type: "INT".into(),
        };
        assert_eq!(change.table(), "Person");
        assert_eq!(change.column(), Some("Age"));
        assert_eq!(change.kind(), Some(ChangeKind::AddColumn));
        assert_eq!(change.to_string(), "add column Person.Age INT");
        assert_eq!(ChangeKind::parse("ModifyColumn"), Some(ChangeKind::ModifyColumn));
        assert_eq!(ChangeKind::parse("DropColumn"), None);
    }
}
