//! Error types for schema synchronization.

use std::fmt;
use std::path::PathBuf;

/// Classification of a failure reported by an [`Executor`](crate::executor::Executor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// The database could not be reached (network, TLS, pool exhaustion).
    Connectivity,
    /// The statement was rejected for lack of privileges.
    Privilege,
    /// Any other statement failure.
    Other,
}

/// A failure reported by an executor, stripped of driver-specific types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DbError {
    /// What kind of failure this was.
    pub kind: DbErrorKind,
    /// Driver message.
    pub message: String,
}

impl DbError {
    /// Creates a new executor error.
    pub fn new(kind: DbErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a connectivity failure.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(DbErrorKind::Connectivity, message)
    }

    /// Shorthand for a privilege failure.
    pub fn privilege(message: impl Into<String>) -> Self {
        Self::new(DbErrorKind::Privilege, message)
    }

    /// Shorthand for any other failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(DbErrorKind::Other, message)
    }
}

/// An audit append that failed during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditFailure {
    /// Table the change belonged to.
    pub table: String,
    /// Column the change belonged to.
    pub column: Option<String>,
    /// Driver message.
    pub message: String,
}

impl fmt::Display for AuditFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(f, "{}.{}: {}", self.table, column, self.message),
            None => write!(f, "{}: {}", self.table, self.message),
        }
    }
}

/// Errors that can occur while synchronizing a schema.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Declared metadata cannot be turned into a table description.
    #[error("Invalid mapping for '{entity}': {reason}")]
    Mapping {
        /// Type name of the offending entity.
        entity: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The database could not be reached.
    #[error("Database unreachable: {message}")]
    Connectivity {
        /// Driver message.
        message: String,
    },

    /// The database refused a DDL statement.
    #[error("Insufficient privilege on '{table}' executing `{sql}`: {message}")]
    Privilege {
        /// Table being synchronized.
        table: String,
        /// The rejected statement.
        sql: String,
        /// Driver message.
        message: String,
    },

    /// A statement failed for a reason other than privilege or connectivity.
    #[error("Database error executing `{sql}`: {message}")]
    Database {
        /// The failed statement.
        sql: String,
        /// Driver message.
        message: String,
    },

    /// One or more audit records could not be written.
    #[error("Failed to write {} audit record(s):\n{}", .failures.len(), .failures.iter().map(|f| format!("  - {f}")).collect::<Vec<_>>().join("\n"))]
    AuditWrite {
        /// Every append that failed, in pass order.
        failures: Vec<AuditFailure>,
    },

    /// Several entities or tables failed during one pass.
    ///
    /// Each element is the error that stopped one entity or table, in pass
    /// order, followed by any audit failures.
    #[error("{} schema synchronization failure(s):\n{}", .errors.len(), .errors.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"))]
    Partial {
        /// The collected errors.
        errors: Vec<SyncError>,
    },

    /// A catalog row did not have the expected shape.
    #[error("Unexpected catalog row: {0}")]
    UnexpectedRow(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Failed to read a configuration file.
    #[error("Failed to read '{path}': {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Creates a mapping error for the given entity.
    pub fn mapping(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Mapping {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error ends the whole pass rather than one table.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// Folds the errors collected during a pass into one result.
    pub fn combine(mut errors: Vec<Self>) -> std::result::Result<(), Self> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Partial { errors }),
        }
    }

    /// Lifts an executor error raised by a statement that is not DDL.
    pub fn from_db(sql: &str, err: DbError) -> Self {
        match err.kind {
            DbErrorKind::Connectivity => Self::Connectivity {
                message: err.message,
            },
            DbErrorKind::Privilege | DbErrorKind::Other => Self::Database {
                sql: sql.to_string(),
                message: err.message,
            },
        }
    }

    /// Lifts an executor error raised by DDL issued against `table`.
    pub fn from_ddl(table: &str, sql: &str, err: DbError) -> Self {
        match err.kind {
            DbErrorKind::Connectivity => Self::Connectivity {
                message: err.message,
            },
            DbErrorKind::Privilege => Self::Privilege {
                table: table.to_string(),
                sql: sql.to_string(),
                message: err.message,
            },
            DbErrorKind::Other => Self::Database {
                sql: sql.to_string(),
                message: err.message,
            },
        }
    }
}

/// Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddl_privilege_keeps_table() {
        let err = SyncError::from_ddl(
            "Person",
            "ALTER TABLE Person ADD COLUMN Age INT",
            DbError::privilege("ALTER command denied"),
        );
        match err {
            SyncError::Privilege { table, sql, .. } => {
                assert_eq!(table, "Person");
                assert!(sql.starts_with("ALTER TABLE"));
            }
            other => panic!("Expected Privilege, got {other:?}"),
        }
    }

    #[test]
    fn test_connectivity_wins_over_statement() {
        let err = SyncError::from_db("SELECT 1", DbError::connectivity("refused"));
        assert!(matches!(err, SyncError::Connectivity { .. }));
    }

    #[test]
    fn test_only_connectivity_is_fatal() {
        assert!(SyncError::Connectivity {
            message: "refused".to_string()
        }
        .is_fatal());
        assert!(!SyncError::mapping("Person", "no primary key declared").is_fatal());
        assert!(!SyncError::from_ddl("Person", "ALTER", DbError::privilege("denied")).is_fatal());
    }

    #[test]
    fn test_combine() {
        assert!(SyncError::combine(Vec::new()).is_ok());

        let single = SyncError::combine(vec![SyncError::mapping("A", "bad")]).unwrap_err();
        assert!(matches!(single, SyncError::Mapping { .. }));

        let both = SyncError::combine(vec![
            SyncError::mapping("A", "bad"),
            SyncError::from_ddl("B", "ALTER TABLE B", DbError::privilege("denied")),
        ])
        .unwrap_err();
        match &both {
            SyncError::Partial { errors } => assert_eq!(errors.len(), 2),
            other => panic!("Expected Partial, got {other:?}"),
        }
        assert!(both.to_string().starts_with("2 schema synchronization failure(s)"));
    }

    #[test]
    fn test_audit_write_message_lists_failures() {
        let err = SyncError::AuditWrite {
            failures: vec![AuditFailure {
                table: "Person".to_string(),
                column: Some("Age".to_string()),
                message: "disk full".to_string(),
            }],
        };
        let message = err.to_string();
        assert!(message.contains("1 audit record"));
        assert!(message.contains("Person.Age: disk full"));
    }
}
