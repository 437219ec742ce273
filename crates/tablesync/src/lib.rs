//! Keeps a MySQL schema in sync with statically declared record types.
//!
//! `tablesync` maps record types to tables and, on every pass, reconciles the
//! live schema with those declarations:
//! - Missing tables are created
//! - Missing columns are added
//! - Columns whose type drifted are modified
//! - Detected column changes are written to an append-only audit table
//!
//! Columns are never dropped or renamed.
//!
//! # Architecture
//!
//! - **Entity** - Declared shape of a record type, resolved into a cached
//!   `EntityDescriptor`
//! - **Mapping** - Scalar type to SQL type resolution
//! - **Introspect** - Reads the live table from `INFORMATION_SCHEMA`
//! - **Diff** - Compares descriptor and snapshot, producing ordered changes
//! - **Policy** - `lockdown` / `log_only` switches deciding apply vs. record
//! - **DDL** - Renders and executes `CREATE TABLE` / `ALTER TABLE`
//! - **Audit** - The `schema_change_log` table
//! - **Sync** - Orchestrates a pass over every selected entity
//!
//! # Example
//!
//! ```rust,ignore
//! use tablesync::prelude::*;
//!
//! #[derive(Entity)]
//! struct Person {
//!     #[column(primary_key)]
//!     Id: uuid::Uuid,
//!     FirstName: String,
//!     Age: i32,
//!     #[column(ignore)]
//!     cached_display_name: Option<String>,
//! }
//!
//! let mut conn = tablesync::executor::mysql::connect("mysql://app@localhost/app").await?;
//! let report = synchronize(&mut conn, &SyncConfig::default()).await?;
//! println!("{} change(s) applied", report.applied_count());
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Show what would change
//! tablesync plan
//!
//! # Apply changes and record drift
//! tablesync sync
//!
//! # Record drift without touching the schema
//! tablesync sync --lockdown
//!
//! # Show the audit trail
//! tablesync history --table Person
//! ```

pub mod audit;
pub mod cli;
pub mod config;
pub mod ddl;
pub mod diff;
pub mod entity;
pub mod error;
pub mod executor;
pub mod introspect;
pub mod mapping;
pub mod policy;
pub mod sync;

pub use entity::Entity;
pub use inventory;
pub use tablesync_derive::Entity;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::audit::{ChangeAuditLog, ChangeRecord};
    pub use crate::config::SyncConfig;
    pub use crate::diff::{diff, Change, ChangeKind, DiffOptions};
    pub use crate::entity::{
        descriptor_of, registered_entities, ColumnDescriptor, Entity, EntityDef,
        EntityDescriptor, EntityRegistration, FieldDef,
    };
    pub use crate::error::{Result, SyncError};
    pub use crate::executor::Executor;
    pub use crate::introspect::{introspect, SchemaSnapshot};
    pub use crate::mapping::{sql_type_for, ScalarType};
    pub use crate::policy::{ChangePolicy, Decision};
    pub use crate::sync::{synchronize, SyncReport, Synchronizer};
    pub use tablesync_derive::Entity;
}
