//! Schema synchronization.
//!
//! This module drives a pass: for every selected entity it builds the
//! descriptor, reads the live table, diffs the two and then applies and/or
//! audits each change according to the [`ChangePolicy`](crate::policy::ChangePolicy).
//! Tables are processed one after another on the caller's session.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::ChangeAuditLog;
use crate::config::SyncConfig;
use crate::ddl::{render, DdlExecutor};
use crate::diff::{diff, Change};
use crate::entity::{registered_entities, EntityRegistration};
use crate::error::{AuditFailure, Result, SyncError};
use crate::executor::Executor;
use crate::introspect::introspect;
use crate::policy::Decision;

/// What happened to one detected change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeOutcome {
    /// The change.
    pub change: Change,
    /// Statement that applies it.
    pub sql: String,
    /// What the policy asked for.
    pub decision: Decision,
    /// Whether the statement was executed.
    pub applied: bool,
    /// Whether an audit record was written.
    pub audited: bool,
}

/// Outcome for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    /// Entity name.
    pub entity: String,
    /// Table name.
    pub table: String,
    /// Every change handled before the table finished or failed, in order.
    pub changes: Vec<ChangeOutcome>,
}

impl TableReport {
    /// True when the table already matched its declaration.
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Outcome of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Per-table outcomes, in processing order.
    pub tables: Vec<TableReport>,
}

impl SyncReport {
    /// Every detected change across tables.
    pub fn changes(&self) -> impl Iterator<Item = &ChangeOutcome> {
        self.tables.iter().flat_map(|t| t.changes.iter())
    }

    /// Number of changes whose DDL ran.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.changes().filter(|c| c.applied).count()
    }

    /// Number of changes written to the audit log.
    #[must_use]
    pub fn audited_count(&self) -> usize {
        self.changes().filter(|c| c.audited).count()
    }

    /// Number of column-level changes (add or modify) detected.
    #[must_use]
    pub fn drift_count(&self) -> usize {
        self.changes().filter(|c| !c.change.is_create_table()).count()
    }

    /// True when no table needed any change.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.tables.iter().all(TableReport::is_up_to_date)
    }
}

/// Runs synchronization passes.
#[derive(Debug, Clone, Default)]
pub struct Synchronizer {
    config: SyncConfig,
    entities: Option<Vec<EntityRegistration>>,
    audit: ChangeAuditLog,
}

impl Synchronizer {
    /// Creates a synchronizer over every registered entity.
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            entities: None,
            audit: ChangeAuditLog::new(),
        }
    }

    /// Uses an explicit entity set instead of the registry.
    #[must_use]
    pub fn with_entities(mut self, entities: impl IntoIterator<Item = EntityRegistration>) -> Self {
        self.entities = Some(entities.into_iter().collect());
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Resolves the entities this synchronizer will process, in order.
    pub fn selected_entities(&self) -> Result<Vec<EntityRegistration>> {
        let available: Vec<EntityRegistration> = match &self.entities {
            Some(explicit) => explicit.clone(),
            None => registered_entities().into_iter().copied().collect(),
        };

        let Some(names) = &self.config.entities else {
            return Ok(available);
        };

        names
            .iter()
            .map(|name| {
                available
                    .iter()
                    .find(|e| e.name() == name)
                    .copied()
                    .ok_or_else(|| SyncError::Config(format!("unknown entity '{name}'")))
            })
            .collect()
    }

    /// Runs a pass and reports what was done.
    ///
    /// A mapping error skips its entity, and a failed DDL statement abandons
    /// the remaining changes of its table; the pass goes on with the next
    /// entity either way and changes already applied stay applied. Audit
    /// failures do not stop anything. Everything collected is returned once
    /// the pass completes. Losing the connection ends the pass at once.
    pub async fn run<E: Executor + ?Sized>(&self, executor: &mut E) -> Result<SyncReport> {
        self.pass(executor, self.config.dry_run).await
    }

    /// Reports what a pass would do without executing or recording anything.
    pub async fn plan<E: Executor + ?Sized>(&self, executor: &mut E) -> Result<SyncReport> {
        self.pass(executor, true).await
    }

    async fn pass<E: Executor + ?Sized>(&self, executor: &mut E, dry_run: bool) -> Result<SyncReport> {
        let entities = self.selected_entities()?;
        let policy = self.config.policy();
        let options = self.config.diff_options();
        let ddl = DdlExecutor::new().dry_run(dry_run);

        info!(
            entities = entities.len(),
            lockdown = policy.lockdown,
            log_only = policy.log_only,
            dry_run,
            "Starting schema synchronization"
        );

        let mut report = SyncReport {
            dry_run,
            tables: Vec::with_capacity(entities.len()),
        };
        let mut audit_ready = false;
        let mut errors = Vec::new();
        let mut audit_failures = Vec::new();

        for entity in &entities {
            let descriptor = match entity.descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(entity = entity.name(), error = %e, "Skipping entity");
                    errors.push(e);
                    continue;
                }
            };
            let table = descriptor.table();

            let snapshot = match introspect(executor, table).await {
                Ok(snapshot) => snapshot,
                Err(e) if e.is_fatal() => return Err(abort(e, &errors, &audit_failures)),
                Err(e) => {
                    warn!(entity = entity.name(), table = %table, error = %e, "Skipping table");
                    errors.push(e);
                    continue;
                }
            };
            let changes = diff(&descriptor, &snapshot, options);

            if changes.is_empty() {
                debug!(entity = entity.name(), table = %table, "Table is up to date");
            }

            let mut outcomes = Vec::with_capacity(changes.len());
            let mut table_error = None;
            for change in changes {
                let decision = policy.decide(&change);
                let mut outcome = ChangeOutcome {
                    sql: render(&change),
                    change,
                    decision,
                    applied: false,
                    audited: false,
                };

                if decision.audit && !dry_run {
                    match self.record(executor, &outcome.change, &mut audit_ready).await {
                        Ok(()) => outcome.audited = true,
                        Err(e) if e.is_fatal() => return Err(abort(e, &errors, &audit_failures)),
                        Err(e) => {
                            warn!(
                                table = %table,
                                change = %outcome.change,
                                error = %e,
                                "Failed to record schema change"
                            );
                            audit_failures.push(AuditFailure {
                                table: table.to_string(),
                                column: outcome.change.column().map(str::to_string),
                                message: e.to_string(),
                            });
                        }
                    }
                }

                if decision.apply {
                    match ddl.apply(executor, &outcome.change).await {
                        Ok(_) => outcome.applied = !dry_run,
                        Err(e) if e.is_fatal() => return Err(abort(e, &errors, &audit_failures)),
                        Err(e) => {
                            warn!(
                                table = %table,
                                change = %outcome.change,
                                error = %e,
                                "Abandoning remaining changes for table"
                            );
                            outcomes.push(outcome);
                            table_error = Some(e);
                            break;
                        }
                    }
                } else {
                    warn!(table = %table, change = %outcome.change, "Lockdown, not applying");
                }

                outcomes.push(outcome);
            }

            report.tables.push(TableReport {
                entity: entity.name().to_string(),
                table: table.to_string(),
                changes: outcomes,
            });
            errors.extend(table_error);
        }

        if !dry_run {
            match self.audit.ensure_table(executor).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(abort(e, &errors, &audit_failures)),
                Err(e) => errors.push(e),
            }
        }

        info!(
            tables = report.tables.len(),
            applied = report.applied_count(),
            audited = report.audited_count(),
            failed = errors.len(),
            "Schema synchronization finished"
        );

        if !audit_failures.is_empty() {
            errors.push(SyncError::AuditWrite {
                failures: audit_failures,
            });
        }
        SyncError::combine(errors)?;
        Ok(report)
    }

    /// Appends an audit record, creating the audit table on first use.
    async fn record<E: Executor + ?Sized>(
        &self,
        executor: &mut E,
        change: &Change,
        audit_ready: &mut bool,
    ) -> Result<()> {
        if !*audit_ready {
            self.audit.ensure_table(executor).await?;
            *audit_ready = true;
        }
        self.audit.append(executor, change).await?;
        Ok(())
    }
}

/// Logs what was collected before a fatal error and hands the error back.
fn abort(fatal: SyncError, errors: &[SyncError], audit_failures: &[AuditFailure]) -> SyncError {
    for error in errors {
        warn!(error = %error, "Failure superseded by a fatal error");
    }
    for failure in audit_failures {
        warn!(failure = %failure, "Audit failure superseded by a fatal error");
    }
    fatal
}

/// Runs one pass with `config` over the registered entities.
pub async fn synchronize<E: Executor + ?Sized>(executor: &mut E, config: &SyncConfig) -> Result<SyncReport> {
    Synchronizer::new(config.clone()).run(executor).await
}
