//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Every command opens the local database, works through a [`Ledger`],
//! and (for the file backend) writes the snapshot back. When a remote is
//! configured the ledger runs over a [`TieredStore`], so local writes are
//! queued for the next `sync`.

use super::{
    ArchiveCommand, Backend, Cli, DocCommand, EmployeeCommand, ExportArgs, ExportKind,
    InspectCommand, LotCommand, ShiftCommand, SyncMode,
};
use crate::api::{self, AppState, LotView, StepStatus};
use crate::config::AppConfig;
use crate::remote::RemoteStore;
use avotrace_core::{
    Collection, ConflictPolicy, DocumentStore, EmployeeInput, FileBlobStore, InspectionInput,
    Ledger, LotQuery, RecordId, ShiftInput, StageRecord, StorageBackend, StoredDocument,
    SyncReport, TieredStore, TraceError, UserId, Viewer, Visibility, WriteOp,
    export::{
        compute_blake3_hash, export_snapshot, import_snapshot, restore_into, snapshot_checksum,
    },
    inspections_csv, lots_csv, payroll_csv,
    primitives::{MAX_DOCUMENT_SIZE, MAX_SNAPSHOT_SIZE},
    report::pending_stage_label,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a JSON input file (stage record, inspection): 1 MB.
const MAX_JSON_FILE_SIZE: u64 = 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), TraceError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| TraceError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(TraceError::InvalidInput(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, TraceError> {
    let canonical = path.canonicalize().map_err(|e| {
        TraceError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(TraceError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path: the parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, TraceError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        TraceError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(TraceError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| TraceError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read a whole input file after path and size checks.
fn read_input(path: &Path, max_size: u64) -> Result<Vec<u8>, TraceError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, max_size)?;
    std::fs::read(&validated).map_err(|e| TraceError::IoError(format!("Read file: {}", e)))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, TraceError> {
    let data = read_input(path, MAX_JSON_FILE_SIZE)?;
    serde_json::from_slice(&data).map_err(|e| {
        TraceError::InvalidInput(format!("Invalid JSON in '{}': {}", path.display(), e))
    })
}

/// Write `data` next to `path` and rename it into place.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), TraceError> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, data).map_err(|e| TraceError::IoError(format!("Write file: {}", e)))?;
    std::fs::rename(&tmp, path).map_err(|e| TraceError::IoError(format!("Rename file: {}", e)))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), TraceError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| TraceError::SerializationError(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Global options resolved once per invocation.
#[derive(Debug, Clone)]
pub struct Context {
    pub database: PathBuf,
    pub backend: Backend,
    pub config: AppConfig,
    pub viewer: Viewer,
    pub json_mode: bool,
}

impl Context {
    pub fn new(cli: &Cli, config: AppConfig) -> Result<Self, TraceError> {
        let viewer = config.viewer(UserId::new(cli.user.as_str())?);
        Ok(Self {
            database: cli.database.clone(),
            backend: cli.backend,
            config,
            viewer,
            json_mode: cli.json_mode,
        })
    }

    fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Redb => "redb",
            Backend::File => "file",
        }
    }
}

// =============================================================================
// STORES
// =============================================================================

/// The store CLI commands run on: local only, or local in front of a
/// remote server.
#[derive(Debug)]
pub enum CliStore {
    Local(StorageBackend),
    Tiered(TieredStore<StorageBackend, RemoteStore>),
}

impl DocumentStore for CliStore {
    fn get(
        &self,
        collection: Collection,
        id: RecordId,
    ) -> Result<Option<StoredDocument>, TraceError> {
        match self {
            Self::Local(store) => store.get(collection, id),
            Self::Tiered(store) => store.get(collection, id),
        }
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(RecordId, StoredDocument)>, TraceError> {
        match self {
            Self::Local(store) => store.scan(collection),
            Self::Tiered(store) => store.scan(collection),
        }
    }

    fn commit(&mut self, ops: &[WriteOp]) -> Result<Vec<u64>, TraceError> {
        match self {
            Self::Local(store) => store.commit(ops),
            Self::Tiered(store) => store.commit(ops),
        }
    }

    fn replicate(
        &mut self,
        collection: Collection,
        id: RecordId,
        doc: Option<StoredDocument>,
    ) -> Result<(), TraceError> {
        match self {
            Self::Local(store) => store.replicate(collection, id, doc),
            Self::Tiered(store) => store.replicate(collection, id, doc),
        }
    }

    fn count(&self, collection: Collection) -> Result<usize, TraceError> {
        match self {
            Self::Local(store) => store.count(collection),
            Self::Tiered(store) => store.count(collection),
        }
    }
}

/// Open the local database.
pub fn open_local(ctx: &Context) -> Result<StorageBackend, TraceError> {
    match ctx.backend {
        Backend::Redb => StorageBackend::persistent(&ctx.database),
        Backend::File => {
            if ctx.database.exists() {
                let data = read_input(&ctx.database, MAX_SNAPSHOT_SIZE as u64)?;
                Ok(StorageBackend::InMemory(import_snapshot(&data)?))
            } else {
                Ok(StorageBackend::default())
            }
        }
    }
}

fn remote_store(ctx: &Context, url_override: Option<&str>) -> Result<Option<RemoteStore>, TraceError> {
    let url = url_override.or(ctx.config.remote.url.as_deref());
    url.map(|u| RemoteStore::new(u, ctx.config.remote.api_key.as_deref()))
        .transpose()
}

/// Apply the configured policies and blob directory to a ledger.
pub fn configure<S: DocumentStore>(ctx: &Context, ledger: Ledger<S>) -> Result<Ledger<S>, TraceError> {
    let blobs = FileBlobStore::open(ctx.config.documents_dir(&ctx.database))?;
    Ok(ledger
        .with_blob_store(blobs)
        .with_lifecycle(ctx.config.lifecycle)
        .with_payroll_policy(ctx.config.payroll)
        .with_quality_policy(ctx.config.quality))
}

/// Open the ledger CLI commands work on.
pub fn open_ledger(ctx: &Context) -> Result<Ledger<CliStore>, TraceError> {
    let local = open_local(ctx)?;
    let store = match remote_store(ctx, None)? {
        Some(remote) => {
            tracing::debug!(remote = remote.base_url(), "opening tiered store");
            CliStore::Tiered(
                TieredStore::new(local, remote).with_policy(ctx.config.remote.conflict_policy),
            )
        }
        None => CliStore::Local(local),
    };
    configure(ctx, Ledger::new(store))
}

/// Write a file-backed store back to disk. redb commits as it goes.
pub fn persist<S: DocumentStore + ?Sized>(ctx: &Context, store: &S) -> Result<(), TraceError> {
    if ctx.backend == Backend::File {
        let data = export_snapshot(store)?;
        write_atomic(&ctx.database, &data)?;
        tracing::debug!(bytes = data.len(), path = %ctx.database.display(), "snapshot saved");
    }
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server. The file backend is saved on shutdown.
pub async fn cmd_server(
    ctx: &Context,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), TraceError> {
    let ledger = configure(ctx, Ledger::new(open_local(ctx)?))?;
    let state = AppState::new(ledger).with_admins(ctx.config.server.admins.iter().cloned());

    let host = host.unwrap_or_else(|| ctx.config.server.host.clone());
    let port = port.unwrap_or(ctx.config.server.port);

    println!("avotrace server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Backend:  {}", ctx.backend_name());
    println!("  Database: {:?}", ctx.database);
    println!("  Admins:   {}", ctx.config.server.admins.join(", "));
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, state.clone()).await?;

    let ledger = state.ledger.read().await;
    persist(ctx, ledger.store())
}

// =============================================================================
// INIT / STATUS
// =============================================================================

/// Initialize new database.
pub fn cmd_init(ctx: &Context, force: bool) -> Result<(), TraceError> {
    if ctx.database.exists() {
        if !force {
            return Err(TraceError::InvalidInput(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&ctx.database)
            .map_err(|e| TraceError::IoError(format!("Remove database: {}", e)))?;
    }

    let store = open_local(ctx)?;
    persist(ctx, &store)?;
    println!(
        "Initialized new {} database at {:?}",
        ctx.backend_name(),
        ctx.database
    );
    Ok(())
}

/// Show collection counts and lot progress.
pub fn cmd_status(ctx: &Context) -> Result<(), TraceError> {
    let ledger = open_ledger(ctx)?;
    let counts = ledger.collection_counts()?;
    let summary = ledger.lot_summary(&ctx.viewer)?;
    let pending = match ledger.store() {
        CliStore::Tiered(tiered) => Some(tiered.pending()?),
        CliStore::Local(_) => None,
    };

    if ctx.json_mode {
        let collections: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(c, n)| (c.as_str().to_string(), serde_json::Value::from(*n)))
            .collect();
        return print_json(&serde_json::json!({
            "database": ctx.database.to_string_lossy(),
            "backend": ctx.backend_name(),
            "user": ctx.viewer.user.as_str(),
            "collections": collections,
            "lots": summary,
            "pending_sync": pending,
        }));
    }

    println!("avotrace Status");
    println!("===============");
    println!("Database: {:?}", ctx.database);
    println!("Backend:  {}", ctx.backend_name());
    println!("User:     {}", ctx.viewer.user);
    println!();
    for (collection, count) in &counts {
        println!("{:<12} {}", collection.as_str(), count);
    }
    println!();
    println!("Lots:        {}", summary.total);
    println!("  Draft:       {}", summary.draft);
    println!("  In progress: {}", summary.in_progress);
    println!("  Completed:   {}", summary.completed);
    println!("  Archived:    {}", summary.archived);
    println!("Average completion: {}%", summary.average_completion_percent);
    if let Some(pending) = pending {
        println!("Pending sync: {} writes", pending);
    }
    Ok(())
}

// =============================================================================
// LOT COMMANDS
// =============================================================================

fn print_lot(ctx: &Context, view: &LotView) -> Result<(), TraceError> {
    if ctx.json_mode {
        return print_json(view);
    }
    let lot = &view.lot;
    println!("Lot {} ({})", lot.lot_number, lot.id);
    println!("  Status:     {} ({}%)", lot.status, view.completion_percent);
    println!("  Waiting on: {}", pending_stage_label(lot));
    println!("  Step:       {}", lot.current_step);
    println!("  Owner:      {} ({})", lot.owner, lot.visibility);
    println!("  Version:    {}", lot.version);
    Ok(())
}

fn print_steps(ctx: &Context, steps: &[StepStatus]) -> Result<(), TraceError> {
    if ctx.json_mode {
        return print_json(steps);
    }
    for step in steps {
        let mark = if step.completed { "x" } else { " " };
        let detail = if step.missing.is_empty() {
            "ok".to_string()
        } else {
            format!("missing: {}", step.missing.join(", "))
        };
        println!("  [{}] {}. {:<10} {}", mark, step.number, step.stage, detail);
    }
    Ok(())
}

/// Lot subcommands.
pub fn cmd_lot(ctx: &Context, command: LotCommand) -> Result<(), TraceError> {
    let mut ledger = open_ledger(ctx)?;
    let viewer = &ctx.viewer;

    match command {
        LotCommand::Create {
            lot_number,
            restricted,
        } => {
            let visibility = if restricted {
                Visibility::Restricted
            } else {
                Visibility::Global
            };
            let lot = ledger.create_lot(&lot_number, visibility, viewer)?;
            persist(ctx, ledger.store())?;
            print_lot(ctx, &lot.into())
        }
        LotCommand::Show { id } => {
            let lot = ledger.get_lot(id, viewer)?;
            let steps: Vec<StepStatus> = ledger
                .lot_validation(id, viewer)?
                .into_iter()
                .map(Into::into)
                .collect();
            if ctx.json_mode {
                return print_json(&serde_json::json!({
                    "lot": LotView::from(lot),
                    "steps": steps,
                }));
            }
            print_lot(ctx, &lot.into())?;
            print_steps(ctx, &steps)
        }
        LotCommand::List {
            status,
            prefix,
            sort,
            desc,
            limit,
        } => {
            let query = LotQuery {
                status,
                lot_number_prefix: prefix,
                sort,
                descending: desc,
                limit,
                ..LotQuery::default()
            };
            let lots = ledger.list_lots(&query, viewer)?;
            if ctx.json_mode {
                let views: Vec<LotView> = lots.into_iter().map(LotView::from).collect();
                return print_json(&views);
            }
            println!(
                "{:<36}  {:<20} {:<12} {:>4}  {}",
                "ID", "LOT", "STATUS", "%", "WAITING ON"
            );
            for lot in &lots {
                println!(
                    "{:<36}  {:<20} {:<12} {:>4}  {}",
                    lot.id,
                    lot.lot_number,
                    lot.status,
                    lot.completion_percent(),
                    pending_stage_label(lot)
                );
            }
            println!("{} lots", lots.len());
            Ok(())
        }
        LotCommand::Save { id, file, expected } => {
            let record: StageRecord = read_json(&file)?;
            let lot = ledger.save_stage(id, expected, record, viewer)?;
            persist(ctx, ledger.store())?;
            print_lot(ctx, &lot.into())
        }
        LotCommand::Advance { id, file, expected } => {
            let record: StageRecord = read_json(&file)?;
            let result = ledger.advance_step(id, expected, record, viewer)?;
            persist(ctx, ledger.store())?;
            if !ctx.json_mode {
                println!(
                    "Stage {} {}",
                    result.outcome.stage,
                    if result.outcome.newly_completed {
                        "completed"
                    } else {
                        "updated"
                    }
                );
                if result.archived.is_some() {
                    println!(
                        "Lot complete and archived{}",
                        if result.deleted {
                            "; working copy removed"
                        } else {
                            ""
                        }
                    );
                }
            }
            print_lot(ctx, &result.lot.into())
        }
        LotCommand::Step {
            id,
            stage,
            expected,
        } => {
            let lot = ledger.go_to_step(id, expected, stage, viewer)?;
            persist(ctx, ledger.store())?;
            print_lot(ctx, &lot.into())
        }
        LotCommand::Rename {
            id,
            lot_number,
            expected,
        } => {
            let lot = ledger.rename_lot(id, expected, &lot_number, viewer)?;
            persist(ctx, ledger.store())?;
            print_lot(ctx, &lot.into())
        }
        LotCommand::Duplicate { id, lot_number } => {
            let copy = ledger.duplicate_lot(id, lot_number.as_deref(), viewer)?;
            persist(ctx, ledger.store())?;
            print_lot(ctx, &copy.into())
        }
        LotCommand::Archive { id, expected } => {
            let archived = ledger.archive_lot(id, expected, viewer)?;
            persist(ctx, ledger.store())?;
            if ctx.json_mode {
                return print_json(&archived);
            }
            println!(
                "Archived lot {} at {}",
                archived.lot.lot_number,
                archived.archived_at.to_rfc3339()
            );
            Ok(())
        }
        LotCommand::Delete { id, expected } => {
            ledger.delete_lot(id, expected, viewer)?;
            persist(ctx, ledger.store())?;
            if ctx.json_mode {
                return print_json(&serde_json::json!({ "deleted": id }));
            }
            println!("Deleted lot {}", id);
            Ok(())
        }
    }
}

/// Archive subcommands.
pub fn cmd_archive(ctx: &Context, command: ArchiveCommand) -> Result<(), TraceError> {
    let ledger = open_ledger(ctx)?;
    match command {
        ArchiveCommand::List => {
            let archived = ledger.list_archive(&ctx.viewer)?;
            if ctx.json_mode {
                return print_json(&archived);
            }
            for a in &archived {
                println!(
                    "{}  {:<20} archived {} by {}",
                    a.id(),
                    a.lot.lot_number,
                    a.archived_at.to_rfc3339(),
                    a.archived_by
                );
            }
            println!("{} archived lots", archived.len());
            Ok(())
        }
        ArchiveCommand::Show { id } => {
            let archived = ledger.get_archived(id, &ctx.viewer)?;
            if ctx.json_mode {
                return print_json(&archived);
            }
            println!(
                "Archived {} by {}",
                archived.archived_at.to_rfc3339(),
                archived.archived_by
            );
            print_lot(ctx, &archived.lot.into())
        }
    }
}

// =============================================================================
// PERSONNEL COMMANDS
// =============================================================================

fn format_cents(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// Employee subcommands.
pub fn cmd_employee(ctx: &Context, command: EmployeeCommand) -> Result<(), TraceError> {
    let mut ledger = open_ledger(ctx)?;
    match command {
        EmployeeCommand::Add {
            name,
            document,
            role,
            rate_cents,
        } => {
            let employee = ledger.create_employee(EmployeeInput {
                full_name: name,
                document_number: document,
                role,
                hourly_rate_cents: rate_cents,
            })?;
            persist(ctx, ledger.store())?;
            if ctx.json_mode {
                return print_json(&employee);
            }
            println!("Registered {} ({})", employee.full_name, employee.id);
            Ok(())
        }
        EmployeeCommand::List { active_only } => {
            let employees = ledger.list_employees(active_only)?;
            if ctx.json_mode {
                return print_json(&employees);
            }
            for e in &employees {
                println!(
                    "{}  {:<24} {:<12} {:>8}/h{}",
                    e.id,
                    e.full_name,
                    e.role,
                    format_cents(e.hourly_rate_cents),
                    if e.active { "" } else { "  (inactive)" }
                );
            }
            Ok(())
        }
        EmployeeCommand::Deactivate { id } => {
            let employee = ledger.deactivate_employee(id, None)?;
            persist(ctx, ledger.store())?;
            println!("{} is now inactive", employee.full_name);
            Ok(())
        }
    }
}

/// Shift subcommands.
pub fn cmd_shift(ctx: &Context, command: ShiftCommand) -> Result<(), TraceError> {
    let mut ledger = open_ledger(ctx)?;
    match command {
        ShiftCommand::Add {
            employee,
            date,
            start,
            end,
            break_minutes,
            notes,
        } => {
            let shift = ledger.record_shift(ShiftInput {
                employee_id: employee,
                date,
                start,
                end,
                break_minutes,
                notes,
            })?;
            persist(ctx, ledger.store())?;
            if ctx.json_mode {
                return print_json(&shift);
            }
            println!(
                "Recorded shift {} on {}: {} minutes worked",
                shift.id,
                shift.date,
                shift.worked_minutes()
            );
            Ok(())
        }
        ShiftCommand::List { employee, from, to } => {
            let shifts = ledger.list_shifts(employee, from, to)?;
            if ctx.json_mode {
                return print_json(&shifts);
            }
            for s in &shifts {
                println!(
                    "{}  {}  {}-{}  {:>4} min  {}",
                    s.employee_id,
                    s.date,
                    s.start.format("%H:%M"),
                    s.end.format("%H:%M"),
                    s.worked_minutes(),
                    s.notes
                );
            }
            Ok(())
        }
    }
}

/// Pay per employee for `[from, to]`.
pub fn cmd_payroll(ctx: &Context, from: NaiveDate, to: NaiveDate) -> Result<(), TraceError> {
    let ledger = open_ledger(ctx)?;
    let summaries = ledger.payroll(from, to)?;
    if ctx.json_mode {
        return print_json(&summaries);
    }
    println!("Payroll {} to {}", from, to);
    for s in &summaries {
        println!(
            "{:<24} days {:>3}  regular {:>6} min  overtime {:>5} min  gross {:>10}",
            s.full_name,
            s.days_worked,
            s.regular_minutes,
            s.overtime_minutes,
            format_cents(s.gross_pay_cents)
        );
    }
    let total: u64 = summaries.iter().map(|s| s.gross_pay_cents).sum();
    println!("Total gross: {}", format_cents(total));
    Ok(())
}

// =============================================================================
// QUALITY / DOCUMENT COMMANDS
// =============================================================================

/// Inspection subcommands.
pub fn cmd_inspect(ctx: &Context, command: InspectCommand) -> Result<(), TraceError> {
    let mut ledger = open_ledger(ctx)?;
    match command {
        InspectCommand::Add { file } => {
            let input: InspectionInput = read_json(&file)?;
            let inspection = ledger.record_inspection(input, &ctx.viewer)?;
            persist(ctx, ledger.store())?;
            if ctx.json_mode {
                return print_json(&inspection);
            }
            println!(
                "Inspection {} of lot {}: {} ({} defects per mille)",
                inspection.id,
                inspection.lot_number,
                inspection.verdict,
                inspection.defect_permille
            );
            Ok(())
        }
        InspectCommand::List { lot } => {
            let inspections = ledger.list_inspections(lot, &ctx.viewer)?;
            if ctx.json_mode {
                return print_json(&inspections);
            }
            for i in &inspections {
                println!(
                    "{}  {}  {:<20} {:<9} {:>4}‰  {}",
                    i.id, i.inspected_on, i.lot_number, i.verdict, i.defect_permille, i.inspector
                );
            }
            Ok(())
        }
    }
}

/// Document subcommands.
pub fn cmd_doc(ctx: &Context, command: DocCommand) -> Result<(), TraceError> {
    let mut ledger = open_ledger(ctx)?;
    match command {
        DocCommand::Attach {
            path,
            lot,
            content_type,
        } => {
            let content = read_input(&path, MAX_DOCUMENT_SIZE as u64)?;
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| TraceError::InvalidInput("file name is not UTF-8".to_string()))?;
            let record =
                ledger.attach_document(lot, file_name, &content_type, &content, &ctx.viewer)?;
            persist(ctx, ledger.store())?;
            if ctx.json_mode {
                return print_json(&record);
            }
            println!(
                "Attached {} ({} bytes) as {}",
                record.file_name, record.size_bytes, record.id
            );
            Ok(())
        }
        DocCommand::List { lot } => {
            let documents = ledger.list_documents(lot, &ctx.viewer)?;
            if ctx.json_mode {
                return print_json(&documents);
            }
            for d in &documents {
                println!(
                    "{}  {:<32} {:>10} bytes  {}",
                    d.id, d.file_name, d.size_bytes, d.content_type
                );
            }
            Ok(())
        }
        DocCommand::Get { id, output } => {
            let output = validate_output_path(&output)?;
            let (record, bytes) = ledger.document_content(id, &ctx.viewer)?;
            std::fs::write(&output, &bytes)
                .map_err(|e| TraceError::IoError(format!("Write file: {}", e)))?;
            println!("Wrote {} ({} bytes) to {:?}", record.file_name, bytes.len(), output);
            Ok(())
        }
    }
}

// =============================================================================
// EXPORT / IMPORT / HASH
// =============================================================================

/// Export a CSV report or a binary snapshot.
pub fn cmd_export(ctx: &Context, args: &ExportArgs) -> Result<(), TraceError> {
    let output = validate_output_path(&args.output)?;
    let ledger = open_ledger(ctx)?;

    let data = match args.what {
        ExportKind::Lots => lots_csv(&ledger.all_lots(&ctx.viewer)?)?.into_bytes(),
        ExportKind::Payroll => {
            let (Some(from), Some(to)) = (args.from, args.to) else {
                return Err(TraceError::InvalidInput(
                    "payroll export needs --from and --to".to_string(),
                ));
            };
            payroll_csv(&ledger.payroll(from, to)?)?.into_bytes()
        }
        ExportKind::Inspections => {
            inspections_csv(&ledger.list_inspections(None, &ctx.viewer)?)?.into_bytes()
        }
        ExportKind::Snapshot => {
            if !ctx.viewer.admin {
                tracing::warn!(
                    user = %ctx.viewer.user,
                    "snapshot includes restricted lots of every owner"
                );
            }
            let data = export_snapshot(ledger.store())?;
            println!("Checksum: {}", snapshot_checksum(ledger.store())?);
            data
        }
    };

    std::fs::write(&output, &data)
        .map_err(|e| TraceError::IoError(format!("Write file: {}", e)))?;
    println!("Exported {} bytes to {:?}", data.len(), output);
    Ok(())
}

/// Restore a snapshot into the database.
pub fn cmd_import(ctx: &Context, input: &Path, force: bool) -> Result<(), TraceError> {
    let data = read_input(input, MAX_SNAPSHOT_SIZE as u64)?;
    // Validates magic, checksum and ordering before anything is touched.
    let imported = import_snapshot(&data)?;

    let mut store = open_local(ctx)?;
    let existing: usize = Collection::ALL
        .iter()
        .map(|&c| store.count(c))
        .sum::<Result<usize, _>>()?;
    if existing > 0 && !force {
        return Err(TraceError::InvalidInput(format!(
            "Database already holds {} documents. Use --force to merge the snapshot into it.",
            existing
        )));
    }

    let count = match &mut store {
        StorageBackend::InMemory(memory) if existing == 0 => {
            *memory = imported;
            memory.total_documents()
        }
        _ => restore_into(&data, &mut store)?,
    };
    persist(ctx, &store)?;

    println!("Imported {} documents", count);
    Ok(())
}

/// BLAKE3 hash of the canonical snapshot.
pub fn cmd_hash(ctx: &Context) -> Result<(), TraceError> {
    let store = open_local(ctx)?;
    let data = export_snapshot(&store)?;
    let hash = compute_blake3_hash(&data);
    let checksum = snapshot_checksum(&store)?;

    if ctx.json_mode {
        return print_json(&serde_json::json!({
            "hash": hash,
            "algorithm": "blake3",
            "checksum": checksum,
        }));
    }
    println!("BLAKE3:   {}", hash);
    println!("Checksum: {}", checksum);
    Ok(())
}

// =============================================================================
// SYNC COMMAND
// =============================================================================

/// Push pending writes to the remote, pull its documents, or both.
pub fn cmd_sync(
    ctx: &Context,
    remote: Option<&str>,
    policy: Option<ConflictPolicy>,
    mode: SyncMode,
) -> Result<(), TraceError> {
    let remote = remote_store(ctx, remote)?.ok_or_else(|| {
        TraceError::InvalidInput(
            "No remote configured. Use --remote, [remote] url or AVOTRACE_REMOTE_URL.".to_string(),
        )
    })?;
    let policy = policy.unwrap_or(ctx.config.remote.conflict_policy);
    tracing::info!(remote = remote.base_url(), %policy, ?mode, "sync started");

    let tiered = TieredStore::new(open_local(ctx)?, remote.clone()).with_policy(policy);
    let mut ledger = configure(ctx, Ledger::new(tiered))?;
    let result = match mode {
        SyncMode::Push => ledger.store_mut().push(),
        SyncMode::Pull => ledger.store_mut().pull(&Collection::DATA),
        SyncMode::Both => ledger.store_mut().sync(),
    };
    // Contents follow once the records they belong to are settled.
    let result = result.and_then(|mut report| {
        ledger.sync_document_content(&remote, &mut report)?;
        Ok(report)
    });
    let pending = ledger.store().pending()?;
    let local = ledger.into_store().into_local()?;
    // Whatever was applied locally is kept, even if a later step failed.
    persist(ctx, &local)?;
    let report: SyncReport = result?;

    if ctx.json_mode {
        return print_json(&serde_json::json!({
            "report": report,
            "pending": pending,
        }));
    }
    println!("Pushed:    {}", report.pushed);
    println!("Pulled:    {}", report.pulled);
    println!("Removed:   {}", report.removed);
    println!(
        "Conflicts: {} (kept remote {}, kept local {})",
        report.conflicts, report.resolved_remote, report.resolved_local
    );
    println!(
        "Contents:  {} uploaded, {} downloaded, {} removed",
        report.content_pushed, report.content_pulled, report.content_removed
    );
    println!("Failed:    {}", report.failed);
    println!("Pending:   {}", pending);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn context(dir: &Path, backend: Backend) -> Context {
        let config = AppConfig::parse(&format!(
            "[server]\ndocuments_dir = {:?}",
            dir.join("docs").to_string_lossy()
        ))
        .unwrap();
        Context {
            database: dir.join("avotrace.db"),
            backend,
            viewer: config.viewer(UserId::new("tester").unwrap()),
            config,
            json_mode: true,
        }
    }

    fn harvest_file(dir: &Path) -> PathBuf {
        let path = dir.join("harvest.json");
        std::fs::write(
            &path,
            r#"{"stage": "harvest", "harvest_date": "2026-03-01", "farmer_id": "F-7"}"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn file_backend_persists_between_commands() {
        let dir = tempdir().expect("create temp dir");
        let ctx = context(dir.path(), Backend::File);

        cmd_init(&ctx, false).unwrap();
        cmd_lot(
            &ctx,
            LotCommand::Create {
                lot_number: "L-1".to_string(),
                restricted: false,
            },
        )
        .unwrap();

        let ledger = open_ledger(&ctx).unwrap();
        let lots = ledger.all_lots(&ctx.viewer).unwrap();
        assert_eq!(lots.len(), 1);
        let id = lots[0].id;

        cmd_lot(
            &ctx,
            LotCommand::Advance {
                id,
                file: harvest_file(dir.path()),
                expected: None,
            },
        )
        .unwrap();

        let lot = open_ledger(&ctx).unwrap().get_lot(id, &ctx.viewer).unwrap();
        assert_eq!(lot.completion_percent(), 14);
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempdir().expect("create temp dir");
        let ctx = context(dir.path(), Backend::File);
        cmd_init(&ctx, false).unwrap();
        assert!(matches!(
            cmd_init(&ctx, false),
            Err(TraceError::InvalidInput(_))
        ));
        cmd_init(&ctx, true).unwrap();
    }

    #[test]
    fn snapshot_export_and_import_between_backends() {
        let dir = tempdir().expect("create temp dir");
        let source = context(dir.path(), Backend::File);
        cmd_lot(
            &source,
            LotCommand::Create {
                lot_number: "L-9".to_string(),
                restricted: true,
            },
        )
        .unwrap();

        let snapshot = dir.path().join("snap.avt");
        cmd_export(
            &source,
            &ExportArgs {
                what: ExportKind::Snapshot,
                output: snapshot.clone(),
                from: None,
                to: None,
            },
        )
        .unwrap();

        let mut target = context(dir.path(), Backend::Redb);
        target.database = dir.path().join("target.redb");
        cmd_import(&target, &snapshot, false).unwrap();

        let source_sum = snapshot_checksum(&open_local(&source).unwrap()).unwrap();
        let target_sum = snapshot_checksum(&open_local(&target).unwrap()).unwrap();
        assert_eq!(source_sum, target_sum);

        // A second import needs --force.
        assert!(cmd_import(&target, &snapshot, false).is_err());
        cmd_import(&target, &snapshot, true).unwrap();
    }

    #[test]
    fn payroll_export_needs_a_period() {
        let dir = tempdir().expect("create temp dir");
        let ctx = context(dir.path(), Backend::File);
        let err = cmd_export(
            &ctx,
            &ExportArgs {
                what: ExportKind::Payroll,
                output: dir.path().join("payroll.csv"),
                from: None,
                to: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TraceError::InvalidInput(_)));
    }

    #[test]
    fn sync_without_remote_is_an_error() {
        let dir = tempdir().expect("create temp dir");
        let ctx = context(dir.path(), Backend::File);
        assert!(matches!(
            cmd_sync(&ctx, None, None, SyncMode::Both),
            Err(TraceError::InvalidInput(_))
        ));
    }
}
