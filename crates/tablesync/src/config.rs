//! Synchronization configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::diff::DiffOptions;
use crate::error::{Result, SyncError};
use crate::policy::ChangePolicy;

/// Settings for one synchronization pass.
///
/// Missing keys in a JSON file take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Never execute DDL.
    pub lockdown: bool,
    /// Record every detected column change in the audit log.
    pub log_only: bool,
    /// Names of the registered entities to synchronize; all when unset.
    pub entities: Option<Vec<String>>,
    /// Normalize type strings before comparing them.
    pub normalize_types: bool,
    /// Render DDL without executing it.
    pub dry_run: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lockdown: false,
            log_only: true,
            entities: None,
            normalize_types: false,
            dry_run: false,
        }
    }
}

impl SyncConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets lockdown.
    #[must_use]
    pub fn lockdown(mut self, enabled: bool) -> Self {
        self.lockdown = enabled;
        self
    }

    /// Sets log-only.
    #[must_use]
    pub fn log_only(mut self, enabled: bool) -> Self {
        self.log_only = enabled;
        self
    }

    /// Restricts the pass to the named entities.
    #[must_use]
    pub fn entities<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Sets type normalization.
    #[must_use]
    pub fn normalize_types(mut self, enabled: bool) -> Self {
        self.normalize_types = enabled;
        self
    }

    /// Sets dry-run mode.
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// The apply/record policy these settings describe.
    #[must_use]
    pub fn policy(&self) -> ChangePolicy {
        ChangePolicy::new(self.lockdown, self.log_only)
    }

    /// Diff options these settings describe.
    #[must_use]
    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            normalize_types: self.normalize_types,
        }
    }

    /// Parses a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Checks the settings for contradictions.
    pub fn validate(&self) -> Result<()> {
        if let Some(names) = &self.entities {
            if names.is_empty() {
                return Err(SyncError::Config(
                    "`entities` is empty; omit it to synchronize every registered entity".into(),
                ));
            }
            if let Some(blank) = names.iter().find(|n| n.trim().is_empty()) {
                return Err(SyncError::Config(format!("blank entity name {blank:?}")));
            }
        }
        Ok(())
    }
}
