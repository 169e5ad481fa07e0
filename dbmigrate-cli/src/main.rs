//! dbmigrate command-line tool
//!
//! Runs the migration adapter for one logical database from a configuration
//! file. Intended for deploy pipelines: exit code 0 on success, 1 on failure.

use anyhow::Context;
use clap::{Parser, Subcommand};
use dbmigrate::config::{self, DEFAULT_CONFIG_FILE};
use dbmigrate::engine::{EngineConfig, MigrationStatus};
use dbmigrate::{ErrorContext, Location, LocationKind, MigrateError, MigrationAdapter, ScriptEngine};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Error code attached to every failure reported by this tool
const ERROR_CODE: i32 = 1;

#[derive(Parser)]
#[command(name = "dbmigrate")]
#[command(about = "Configuration-driven database migrations")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML); DBMIGRATE__<DATABASE>__<KEY> variables override it
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Logical database name, i.e. the configuration section to read
    #[arg(long)]
    database: Option<String>,

    /// Read script locations from the filesystem instead of bundled resources
    #[arg(long)]
    filesystem: bool,

    /// Extra script location, e.g. filesystem:sql/patches (repeatable)
    #[arg(long = "location", value_name = "ID")]
    locations: Vec<Location>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending scripts
    Migrate,

    /// Show applied and pending scripts
    Status,

    /// Check applied scripts against the current ones without migrating
    Validate,

    /// Check that the migration history table can be queried
    Probe,
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(()) => {
            if !cli.quiet && !cli.json {
                println!("✅ Success");
            }
            process::exit(0);
        }
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let database = cli
        .database
        .clone()
        .or_else(|| std::env::var("DBMIGRATE_DATABASE").ok())
        .context("database name not provided. Use --database or set DBMIGRATE_DATABASE")?;

    let settings = config::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    let context = Arc::new(ErrorContext::new(
        ERROR_CODE,
        format!("dbmigrate {} '{}'", command_name(&cli.command), database),
    ));
    let mut adapter = MigrationAdapter::new(Arc::new(settings), database, context);
    for location in &cli.locations {
        adapter.add_file_location(location.path(), location.kind() == LocationKind::Filesystem);
    }

    let result = match cli.command {
        Commands::Migrate => handle_migrate(&mut adapter, cli),
        Commands::Status => handle_status(&mut adapter, cli),
        Commands::Validate => handle_validate(&mut adapter, cli),
        Commands::Probe => handle_probe(&mut adapter),
    };
    finish(result, adapter.close())
}

/// Combine the command result with the result of closing the connection.
///
/// A close failure only becomes the reported error when the command itself
/// succeeded; otherwise it is logged and the command's error is kept.
fn finish(result: anyhow::Result<()>, closed: Result<(), MigrateError>) -> anyhow::Result<()> {
    match (result, closed) {
        (Ok(()), closed) => Ok(closed?),
        (Err(e), Err(close_error)) => {
            log::warn!("failed to close connection: {}", close_error);
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Migrate => "migrate",
        Commands::Status => "status",
        Commands::Validate => "validate",
        Commands::Probe => "probe",
    }
}

fn handle_migrate(adapter: &mut MigrationAdapter, cli: &Cli) -> anyhow::Result<()> {
    let outcome = adapter.migrate_db(cli.filesystem)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    if outcome.applied.is_empty() {
        println!("✅ No scripts to apply");
    } else {
        for applied in &outcome.applied {
            println!("  ✓ {} ({}ms)", applied.script, applied.execution_time_ms);
        }
        println!("✅ Applied {} script(s)", outcome.migrations_executed());
    }
    if let Some(version) = &outcome.target_version {
        println!("Schema version: {}", version);
    }
    Ok(())
}

/// Register the default locations and check connectivity, as `migrate` does
fn prepare(adapter: &mut MigrationAdapter, cli: &Cli) -> anyhow::Result<EngineConfig> {
    adapter.add_default_locations(cli.filesystem);
    adapter.get_connection()?;
    Ok(adapter.engine_config()?)
}

fn handle_status(adapter: &mut MigrationAdapter, cli: &Cli) -> anyhow::Result<()> {
    let status: MigrationStatus = ScriptEngine::new().info(&prepare(adapter, cli)?)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("\n📊 Migration Status\n");

    if !status.has_history {
        println!("✅ Applied Scripts: None (no migration history yet)");
    } else if status.applied.is_empty() {
        println!("✅ Applied Scripts: None");
    } else {
        println!("✅ Applied Scripts ({}):", status.applied_count());
        for record in &status.applied {
            println!(
                "  ✓ {} ({}, {}ms)",
                record.script,
                record.installed_on.format("%Y-%m-%d %H:%M:%S"),
                record.execution_time_ms
            );
        }
    }

    println!();

    if status.pending.is_empty() {
        println!("⏳ Pending Scripts: None");
    } else {
        println!("⏳ Pending Scripts ({}):", status.pending_count());
        for pending in &status.pending {
            println!("  ⏳ {} from {}", pending.script, pending.location);
        }
    }

    println!(
        "\n📈 Summary: {} applied, {} pending",
        status.applied_count(),
        status.pending_count()
    );
    Ok(())
}

fn handle_validate(adapter: &mut MigrationAdapter, cli: &Cli) -> anyhow::Result<()> {
    ScriptEngine::new().validate(&prepare(adapter, cli)?)?;
    if !cli.json {
        println!("✅ Applied scripts match the current locations");
    }
    Ok(())
}

fn handle_probe(adapter: &mut MigrationAdapter) -> anyhow::Result<()> {
    adapter.check_history_table()?;
    println!("✅ Migration history table is reachable");
    Ok(())
}
