//! mysql-pg-transfer CLI - bulk MySQL to PostgreSQL data transfer.

use clap::{Parser, Subcommand};
use mysql_pg_transfer::{
    Config, MigrateError, MigrationOptions, MigrationReport, OptionOverrides, Orchestrator,
    RowCountMismatch,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mysql-pg-transfer")]
#[command(about = "Bulk MySQL to PostgreSQL data transfer")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON report to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Log a progress line after every page
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transfer data from the source to the target environment
    Run {
        /// Roll back every transaction instead of committing
        #[arg(long)]
        dry_run: bool,

        /// Disable target triggers while loading each table
        #[arg(long)]
        drop_triggers: bool,

        /// Leave target indexes in place during the load
        #[arg(long)]
        keep_indexes: bool,

        /// Do not run the schema load command
        #[arg(long)]
        skip_schema: bool,

        /// Do not run the schema migration command
        #[arg(long)]
        skip_migration_step: bool,

        /// Only transfer these tables (repeatable)
        #[arg(long, value_name = "TABLE")]
        only: Vec<String>,

        /// Skip these tables (repeatable)
        #[arg(long, value_name = "TABLE")]
        except: Vec<String>,

        /// Rows per page (default: 10000)
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Validate row counts between source and target
    Validate {
        /// Only validate these tables (repeatable)
        #[arg(long, value_name = "TABLE")]
        only: Vec<String>,

        /// Skip these tables (repeatable)
        #[arg(long, value_name = "TABLE")]
        except: Vec<String>,
    },

    /// Check engines and schema conformance without moving data
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            dry_run,
            drop_triggers,
            keep_indexes,
            skip_schema,
            skip_migration_step,
            only,
            except,
            page_size,
        } => {
            let overrides = OptionOverrides {
                dry_run,
                drop_triggers,
                keep_indexes,
                skip_schema,
                skip_migration_step,
                show_progress: cli.progress,
                only,
                except,
                page_size,
            };
            let options = MigrationOptions::resolve(&config, &overrides)?;

            // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
            let cancel_token = setup_signal_handler();

            let orchestrator = Orchestrator::connect(&config, options).await?;
            let report = orchestrator.run(cancel_token).await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                print_report(&report);
            }
        }

        Commands::Validate { only, except } => {
            let overrides = OptionOverrides {
                only,
                except,
                ..Default::default()
            };
            let options = MigrationOptions::resolve(&config, &overrides)?;
            let orchestrator = Orchestrator::connect(&config, options).await?;
            let mismatches = orchestrator.validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&mismatches)?);
            } else if mismatches.is_empty() {
                println!("Validation completed successfully: all row counts match");
            } else {
                print_mismatches(&mismatches);
            }
        }

        Commands::Check => {
            let options = MigrationOptions::resolve(&config, &OptionOverrides::default())?;
            let orchestrator = Orchestrator::connect(&config, options).await?;
            let tables = orchestrator.check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                println!("Schemas conform: {} tables ready to transfer", tables.len());
                for table in &tables {
                    println!("  {}", table);
                }
            }
        }
    }

    Ok(())
}

fn print_report(report: &MigrationReport) {
    let status_msg = if report.dry_run {
        "Dry run completed!"
    } else {
        "Transfer completed!"
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", report.run_id);

    for table in &report.tables {
        println!("  {}", table.summary_line());
        if !table.errors.is_empty() {
            println!("    Failed rows: {}", table.error_ids().join(", "));
        }
        if !table.repairs.is_empty() {
            println!("    Repaired rows: {}", table.repairs.len());
        }
    }

    println!("  Duration: {:.2}s", report.elapsed.as_secs_f64());
    println!("  Tables: {}", report.tables.len());
    println!("  Rows: {}", report.rows_migrated);
    println!("  Failed rows: {}", report.rows_failed);
    println!("  Throughput: {} rows/sec", report.rows_per_second);

    if report.validated {
        if report.mismatches.is_empty() {
            println!("  Row counts: all match");
        } else {
            print_mismatches(&report.mismatches);
        }
    }
}

fn print_mismatches(mismatches: &[RowCountMismatch]) {
    println!("Row count mismatches:");
    for m in mismatches {
        println!("  {}", m);
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM. Cancellation takes effect
/// between tables; the table in flight always finishes.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current table...", name);
                    token.cancel();
                });
            }
            Err(e) => warn!("Failed to install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\nReceived Ctrl-C. Stopping after the current table...");
                token.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    cancel_token
}
