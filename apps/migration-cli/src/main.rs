use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Args as ClapArgs, Parser, Subcommand};
use db_infra::db::{sslmode_from_env, ConnDescriptor};
use db_infra::{orchestrate_migration, DbInfraError};
use migration::{
    DbState, EngineConfig, MigrationCommand, MigrationSet, MigrationStatus, MigrationSummary,
    Outcome, ReconcileReport,
};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "migration=info,db_infra=info,sqlx=warn";

#[derive(Parser)]
#[command(name = "migrator")]
#[command(about = "Apply SQL migration files to a PostgreSQL database")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database if needed and apply every pending migration
    Upgrade(Target),
    /// Show the tracking state and pending migrations without changing anything
    Status(Target),
}

#[derive(ClapArgs)]
struct Target {
    /// Connection descriptor: driver:host:port:dbname:user:password
    db: String,

    /// Directory holding the *.sql migration files
    dir: PathBuf,

    /// libpq sslmode (default: $MIGRATOR_SSLMODE, then "disable")
    #[arg(long)]
    sslmode: Option<String>,

    /// Tracking table name (default: $MIGRATOR_TABLE, then "schema_migrations")
    #[arg(long)]
    table: Option<String>,

    /// Append log output to this file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Command {
    fn target(&self) -> &Target {
        match self {
            Command::Upgrade(t) | Command::Status(t) => t,
        }
    }

    fn migration_command(&self) -> MigrationCommand {
        match self {
            Command::Upgrade(_) => MigrationCommand::Up,
            Command::Status(_) => MigrationCommand::Status,
        }
    }
}

fn init_logging(log_file: Option<&Path>) -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let (writer, ansi) = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(ansi)
        .without_time()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_env_filter(filter)
        .init();
    Ok(())
}

/// Resolve descriptor, config and migration set, then hand off to db-infra.
async fn run(target: &Target, command: MigrationCommand) -> Result<MigrationSummary, DbInfraError> {
    let mut con = ConnDescriptor::parse(&target.db)?;
    if let Some(mode) = target.sslmode.clone().or_else(sslmode_from_env) {
        con = con.with_sslmode(mode);
    }

    let config = match &target.table {
        Some(table) => EngineConfig::new(table.as_str())?,
        None => EngineConfig::from_env()?,
    };
    let set = MigrationSet::discover(&target.dir)?;

    orchestrate_migration(&con, &set, command, &config).await
}

fn print_upgrade(report: &ReconcileReport) {
    if report.switched_over() {
        println!(
            "Switched over from legacy tracking ({} legacy migrations recorded)",
            report.recorded.len()
        );
    }
    match report.outcome() {
        Outcome::UpToDate => println!("Database is up to date"),
        Outcome::Applied(n) => println!("Applied {n} migration(s)"),
    }
}

fn print_status(status: &MigrationStatus) {
    println!("State: {}", status.state);
    if let Some(check) = status.switchover {
        if check.ready() {
            println!("Legacy switchover: ready (version {})", check.applied);
        } else {
            println!(
                "Legacy switchover: blocked (database at version {}, files at version {})",
                check.applied, check.available
            );
        }
    }
    if status.pending.is_empty() {
        println!("No pending migrations");
    } else {
        let label = match status.state {
            DbState::Legacy => "Pending after switchover",
            _ => "Pending",
        };
        println!("{label} ({}):", status.pending.len());
        for name in &status.pending {
            println!("  {name}");
        }
    }
}

/// Best-effort database name for the failure line.
fn db_label(descriptor: &str) -> &str {
    descriptor.split(':').nth(3).unwrap_or(descriptor)
}

#[tokio::main]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 2 } else { 0 });
        }
    };
    let target = args.command.target();

    if let Err(e) = init_logging(target.log_file.as_deref()) {
        eprintln!(
            "Failed to open log file {}: {e}",
            target.log_file.as_deref().unwrap_or(Path::new("")).display()
        );
        std::process::exit(1);
    }

    match run(target, args.command.migration_command()).await {
        Ok(MigrationSummary::Up(report)) => print_upgrade(&report),
        Ok(MigrationSummary::Status(status)) => print_status(&status),
        Err(e) => {
            let dbname = db_label(&target.db);
            tracing::error!("{dbname}: {e}");
            eprintln!("{dbname}: {e}");
            std::process::exit(1);
        }
    }
}
