//! Apply/record decisions.
//!
//! Two independent switches decide what happens to each detected change:
//! `lockdown` suppresses DDL, `log_only` records column drift in the audit
//! log.
//!
//! | lockdown | log_only | apply DDL | audit |
//! |----------|----------|-----------|-------|
//! | false    | false    | yes       | no    |
//! | false    | true     | yes       | yes   |
//! | true     | true     | no        | yes   |
//! | true     | false    | no        | no    |
//!
//! Table creation follows `lockdown` like any other DDL but is never audited,
//! whatever `log_only` says.

use serde::{Deserialize, Serialize};

use crate::diff::Change;

/// What to do with one change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Execute the DDL for the change.
    pub apply: bool,
    /// Append an audit record for the change.
    pub audit: bool,
}

/// The two policy switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePolicy {
    /// Never execute DDL.
    pub lockdown: bool,
    /// Record every detected column change.
    pub log_only: bool,
}

impl Default for ChangePolicy {
    fn default() -> Self {
        Self {
            lockdown: false,
            log_only: true,
        }
    }
}

impl ChangePolicy {
    /// Creates a policy from both switches.
    #[must_use]
    pub const fn new(lockdown: bool, log_only: bool) -> Self {
        Self { lockdown, log_only }
    }

    /// Decides what to do with `change`.
    #[must_use]
    pub fn decide(&self, change: &Change) -> Decision {
        let apply = !self.lockdown;
        let audit = match change {
            Change::CreateTable { .. } => false,
            Change::AddColumn { .. } | Change::ModifyColumn { .. } => self.log_only,
        };
        Decision { apply, audit }
    }
}
