//! # avotrace CLI Module
//!
//! This module implements the CLI interface for avotrace.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize new database
//! - `status` - Show collection counts and lot progress
//! - `lot` - Create, fill in and complete lots
//! - `archive` - Browse archived lots
//! - `employee`, `shift`, `payroll` - Personnel and pay
//! - `inspect` - Quality inspections
//! - `doc` - Attached files
//! - `export` - CSV reports and binary snapshots
//! - `import` - Restore a snapshot
//! - `hash` - Compute BLAKE3 cryptographic hash of the store
//! - `sync` - Push local writes to and pull from a shared server

mod commands;

use crate::config::{AppConfig, DEFAULT_CONFIG_FILE};
use avotrace_core::{ConflictPolicy, LotSort, LotStatus, RecordId, Stage, TraceError};
use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// avotrace - avocado lot traceability
///
/// Tracks lots through harvest, transport, sorting, packaging, storage,
/// export and delivery, with personnel, quality and document records.
#[derive(Parser, Debug)]
#[command(name = "avotrace")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the database
    #[arg(short = 'D', long, global = true, default_value = "avotrace.db")]
    pub database: PathBuf,

    /// Storage backend: "redb" (ACID database) or "file" (snapshot file)
    #[arg(short = 'B', long, global = true, value_enum, default_value_t = Backend::Redb)]
    pub backend: Backend,

    /// Configuration file
    #[arg(short = 'c', long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// User the command acts as
    #[arg(short = 'u', long, global = true, default_value = "local")]
    pub user: String,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where the local data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// redb database file
    Redb,
    /// In-memory store saved as a snapshot file after each command
    File,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (default from config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (default from config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show collection counts and lot progress
    Status,

    /// Work with lots
    #[command(subcommand)]
    Lot(LotCommand),

    /// Browse archived lots
    #[command(subcommand)]
    Archive(ArchiveCommand),

    /// Manage personnel
    #[command(subcommand)]
    Employee(EmployeeCommand),

    /// Manage the work schedule
    #[command(subcommand)]
    Shift(ShiftCommand),

    /// Compute pay for a period
    Payroll {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },

    /// Quality inspections
    #[command(subcommand)]
    Inspect(InspectCommand),

    /// Attached files
    #[command(subcommand)]
    Doc(DocCommand),

    /// Export reports or a snapshot
    Export(ExportArgs),

    /// Restore a snapshot into the database
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Import even if the database already holds documents
        #[arg(short, long)]
        force: bool,
    },

    /// Compute BLAKE3 cryptographic hash of the store
    Hash,

    /// Synchronize with a shared server
    Sync {
        /// Server URL (default from config or AVOTRACE_REMOTE_URL)
        #[arg(short, long)]
        remote: Option<String>,

        /// Conflict policy (default from config)
        #[arg(long)]
        policy: Option<ConflictPolicy>,

        /// Only push, or only pull
        #[arg(long, value_enum, default_value_t = SyncMode::Both)]
        mode: SyncMode,
    },
}

#[derive(Subcommand, Debug)]
pub enum LotCommand {
    /// Create a draft
    Create {
        lot_number: String,
        /// Visible only to you and administrators
        #[arg(long)]
        restricted: bool,
    },
    /// Show a lot and its per-stage validity
    Show { id: RecordId },
    /// List lots
    List {
        #[arg(long)]
        status: Option<LotStatus>,
        /// Lot number prefix
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long, default_value = "created_at")]
        sort: LotSort,
        #[arg(long)]
        desc: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Save a stage record (JSON file) without completing it
    Save {
        id: RecordId,
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long)]
        expected: Option<u64>,
    },
    /// Validate and complete a stage from a JSON record
    Advance {
        id: RecordId,
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long)]
        expected: Option<u64>,
    },
    /// Move the wizard to a stage (name or number)
    Step {
        id: RecordId,
        stage: Stage,
        #[arg(long)]
        expected: Option<u64>,
    },
    /// Change the lot number
    Rename {
        id: RecordId,
        lot_number: String,
        #[arg(long)]
        expected: Option<u64>,
    },
    /// Copy a lot as a new draft
    Duplicate {
        id: RecordId,
        /// Number for the copy (default: original plus a suffix)
        #[arg(long)]
        lot_number: Option<String>,
    },
    /// Archive a completed lot
    Archive {
        id: RecordId,
        #[arg(long)]
        expected: Option<u64>,
    },
    /// Delete a working lot
    Delete {
        id: RecordId,
        #[arg(long)]
        expected: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ArchiveCommand {
    /// List archived lots
    List,
    /// Show one archived lot
    Show { id: RecordId },
}

#[derive(Subcommand, Debug)]
pub enum EmployeeCommand {
    /// Register an employee
    Add {
        #[arg(long)]
        name: String,
        /// National id or passport number
        #[arg(long)]
        document: String,
        #[arg(long, default_value = "")]
        role: String,
        #[arg(long)]
        rate_cents: u64,
    },
    /// List employees
    List {
        #[arg(long)]
        active_only: bool,
    },
    /// Mark an employee inactive
    Deactivate { id: RecordId },
}

#[derive(Subcommand, Debug)]
pub enum ShiftCommand {
    /// Record a shift
    Add {
        #[arg(long)]
        employee: RecordId,
        #[arg(long)]
        date: NaiveDate,
        /// Start time, HH:MM
        #[arg(long)]
        start: NaiveTime,
        /// End time, HH:MM (earlier than start means overnight)
        #[arg(long)]
        end: NaiveTime,
        #[arg(long, default_value_t = 0)]
        break_minutes: u32,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// List shifts
    List {
        #[arg(long)]
        employee: Option<RecordId>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

#[derive(Subcommand, Debug)]
pub enum InspectCommand {
    /// Record an inspection from a JSON file
    Add {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// List inspections
    List {
        #[arg(long)]
        lot: Option<RecordId>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DocCommand {
    /// Attach a file
    Attach {
        path: PathBuf,
        #[arg(long)]
        lot: Option<RecordId>,
        #[arg(long, default_value = "")]
        content_type: String,
    },
    /// List files
    List {
        #[arg(long)]
        lot: Option<RecordId>,
    },
    /// Write a file's content to disk
    Get {
        id: RecordId,
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// What to export
    #[arg(value_enum)]
    pub what: ExportKind,

    /// Output file path
    #[arg(short, long)]
    pub output: PathBuf,

    /// Payroll period start
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Payroll period end
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportKind {
    Lots,
    Payroll,
    Inspections,
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SyncMode {
    Push,
    Pull,
    Both,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
///
/// The server runs on the async runtime. Every other command runs on a
/// blocking thread, since storage and the sync client are synchronous.
pub async fn execute(cli: Cli) -> Result<(), TraceError> {
    let config = AppConfig::load(&cli.config)?;
    let ctx = Context::new(&cli, config)?;

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&ctx, host, port).await,
        command => tokio::task::spawn_blocking(move || run_blocking(&ctx, command))
            .await
            .map_err(|e| TraceError::IoError(format!("Command task failed: {}", e)))?,
    }
}

fn run_blocking(ctx: &Context, command: Option<Commands>) -> Result<(), TraceError> {
    match command {
        Some(Commands::Init { force }) => cmd_init(ctx, force),
        Some(Commands::Status) | None => cmd_status(ctx),
        Some(Commands::Lot(command)) => cmd_lot(ctx, command),
        Some(Commands::Archive(command)) => cmd_archive(ctx, command),
        Some(Commands::Employee(command)) => cmd_employee(ctx, command),
        Some(Commands::Shift(command)) => cmd_shift(ctx, command),
        Some(Commands::Payroll { from, to }) => cmd_payroll(ctx, from, to),
        Some(Commands::Inspect(command)) => cmd_inspect(ctx, command),
        Some(Commands::Doc(command)) => cmd_doc(ctx, command),
        Some(Commands::Export(args)) => cmd_export(ctx, &args),
        Some(Commands::Import { input, force }) => cmd_import(ctx, &input, force),
        Some(Commands::Hash) => cmd_hash(ctx),
        Some(Commands::Sync {
            remote,
            policy,
            mode,
        }) => cmd_sync(ctx, remote.as_deref(), policy, mode),
        Some(Commands::Server { .. }) => Err(TraceError::InvalidInput(
            "the server does not run on a blocking thread".to_string(),
        )),
    }
}

// =============================================================================
// TESTS
// =============================================================================
