//! Command-line interface.
//!
//! Applications that declare entities call [`run`] from their own `main`, so
//! their registrations are linked into the binary. The `tablesync` binary
//! calls the same function.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::audit::{ChangeAuditLog, ChangeRecord};
use crate::config::SyncConfig;
use crate::entity::{registered_entities, EntityRegistration};
use crate::error::SyncError;
use crate::executor::mysql;
use crate::introspect::introspect;
use crate::sync::{SyncReport, Synchronizer};

/// Keeps a MySQL schema in sync with declared record types.
#[derive(Debug, Parser)]
#[command(name = "tablesync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database URL.
    #[arg(short, long, env = "DATABASE_URL", default_value = "mysql://root@localhost/app")]
    pub database_url: String,

    /// JSON configuration file; flags override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Never execute DDL.
    #[arg(long, env = "TABLESYNC_LOCKDOWN")]
    pub lockdown: Option<bool>,

    /// Record detected column changes in the audit log.
    #[arg(long, env = "TABLESYNC_LOG_ONLY")]
    pub log_only: Option<bool>,

    /// Ignore integer display widths and spacing when comparing types.
    #[arg(long)]
    pub normalize_types: bool,

    /// Only synchronize the named entity (repeatable).
    #[arg(short, long = "entity")]
    pub entities: Vec<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Synchronize the schema.
    Sync {
        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the changes a sync would make.
    Plan {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Create the audit table.
    Init,

    /// Show recorded schema changes.
    History {
        /// Only show changes to this table.
        #[arg(short, long)]
        table: Option<String>,

        /// Maximum number of records.
        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        /// Print records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the live columns of a table.
    Inspect {
        /// Table name.
        table: String,
    },

    /// List registered entities.
    Entities,
}

impl Cli {
    /// Builds the effective configuration: file first, then flags.
    pub fn sync_config(&self) -> Result<SyncConfig, SyncError> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::from_json_file(path)?,
            None => SyncConfig::default(),
        };

        if let Some(lockdown) = self.lockdown {
            config.lockdown = lockdown;
        }
        if let Some(log_only) = self.log_only {
            config.log_only = log_only;
        }
        if self.normalize_types {
            config.normalize_types = true;
        }
        if !self.entities.is_empty() {
            config.entities = Some(self.entities.clone());
        }
        if let Commands::Sync { dry_run: true, .. } = self.command {
            config.dry_run = true;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parses arguments and runs the requested command.
pub async fn run() -> anyhow::Result<()> {
    run_with(Cli::parse()).await
}

/// Runs an already parsed command line.
pub async fn run_with(cli: Cli) -> anyhow::Result<()> {
    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = cli.sync_config()?;

    let url = cli.database_url.clone();
    let audit = ChangeAuditLog::new();

    match cli.command {
        Commands::Entities => print_entities(&registered_entities()),

        Commands::Sync { json, .. } => {
            let mut conn = mysql::connect(&url).await?;
            let report = Synchronizer::new(config).run(&mut conn).await?;
            print_report(&report, json)?;
        }

        Commands::Plan { json } => {
            let mut conn = mysql::connect(&url).await?;
            let report = Synchronizer::new(config).plan(&mut conn).await?;
            print_report(&report, json)?;
        }

        Commands::Init => {
            let mut conn = mysql::connect(&url).await?;
            info!("Creating audit table...");
            audit.ensure_table(&mut conn).await?;
            info!("Audit table created successfully.");
        }

        Commands::History { table, limit, json } => {
            let mut conn = mysql::connect(&url).await?;
            let records = match &table {
                Some(table) => audit.history_for(&mut conn, table, limit).await?,
                None => audit.recent(&mut conn, limit).await?,
            };
            print_history(&records, json)?;
        }

        Commands::Inspect { table } => {
            let mut conn = mysql::connect(&url).await?;
            let snapshot = introspect(&mut conn, &table).await?;
            if snapshot.is_empty() {
                info!("Table '{}' does not exist.", table);
            } else {
                println!("\n{table}:");
                println!("{:-<60}", "");
                for (name, sql_type) in snapshot.iter() {
                    println!(" {name:<30} {sql_type}");
                }
                println!();
            }
        }
    }

    Ok(())
}

fn print_entities(entities: &[&'static EntityRegistration]) {
    if entities.is_empty() {
        info!("No entities registered. Derive `tablesync::Entity` on your record types.");
        return;
    }

    for entity in entities {
        match entity.descriptor() {
            Ok(descriptor) => {
                println!("\n{} -> {}", entity.name(), descriptor.table());
                println!("{:-<60}", "");
                for column in descriptor.columns() {
                    let marker = if column.primary_key { " [PK]" } else { "" };
                    println!(" {:<30} {}{}", column.name, column.sql_type, marker);
                }
                for ignored in descriptor.ignored_fields() {
                    println!(" {ignored:<30} (ignored)");
                }
            }
            Err(e) => println!("\n{}: {}", entity.name(), e),
        }
    }
    println!();
}

fn print_report(report: &SyncReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if report.is_converged() {
        info!("Schema is up to date.");
        return Ok(());
    }

    for table in &report.tables {
        if table.is_up_to_date() {
            continue;
        }
        println!("\n{} ({}):", table.table, table.entity);
        println!("{:-<60}", "");
        for outcome in &table.changes {
            let status = match (outcome.applied, outcome.audited) {
                (true, true) => "applied, recorded",
                (true, false) => "applied",
                (false, true) => "recorded",
                (false, false) if report.dry_run => "planned",
                (false, false) => "skipped",
            };
            println!(" [{status}] {};", outcome.sql);
        }
    }
    println!();

    info!(
        "{} change(s) applied, {} recorded.",
        report.applied_count(),
        report.audited_count()
    );
    Ok(())
}

fn print_history(records: &[ChangeRecord], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }

    if records.is_empty() {
        info!("No schema changes have been recorded yet.");
        return Ok(());
    }

    println!("\nRecorded schema changes:");
    println!("{:-<60}", "");
    for record in records {
        let column = record.column_name.as_deref().unwrap_or("-");
        let old_type = record.old_type.as_deref().unwrap_or("-");
        let new_type = record.new_type.as_deref().unwrap_or("-");
        println!(
            " {} {:<12} {}.{} {} -> {}",
            record.changed_at.format("%Y-%m-%d %H:%M:%S"),
            record.kind,
            record.table_name,
            column,
            old_type,
            new_type
        );
    }
    println!();
    Ok(())
}
