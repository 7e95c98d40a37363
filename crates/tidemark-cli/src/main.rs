//! tidemark CLI - schema migration and seed-data orchestration.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tidemark::{
    generate_script, Config, ConfigOverrides, MigrateError, MigrationCommand, MigrationReport,
    Migrator,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Configuration file used when `--config` is not given and the file exists.
const DEFAULT_CONFIG: &str = "tidemark.yaml";

#[derive(Parser)]
#[command(name = "tidemark")]
#[command(about = "Schema migration and seed-data orchestration for PostgreSQL and SQL Server")]
#[command(version)]
struct Cli {
    /// Command: drop, create, migrate, codegen, schema, reset, data, deploy,
    /// deploywithdata, database, all, dropandall, resetanddata, resetandall,
    /// execute, script. Combine phases with '|' or ','
    command: String,

    /// SQL statements or .sql files for execute; template and target for script
    args: Vec<String>,

    /// Path to YAML configuration file [default: tidemark.yaml when present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target connection string (overrides config and TIDEMARK_CONNECTION_STRING)
    #[arg(long)]
    connection_string: Option<String>,

    /// Database provider: postgres or sqlserver
    #[arg(long)]
    provider: Option<String>,

    /// Comma-separated schema priority list
    #[arg(long)]
    schema_order: Option<String>,

    /// Output directory for generated scripts
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Runtime parameter for seed data, key=value (repeatable)
    #[arg(short, long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Drop every schema object before recreating it
    #[arg(long)]
    force_drop: bool,

    /// Log each executed script
    #[arg(short, long)]
    verbose: bool,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Timeout in seconds for graceful shutdown (default: 60)
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,
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

    setup_logging(&cli.verbosity, &cli.log_format).map_err(MigrateError::Config)?;

    // Reject bad commands before touching configuration or the database
    let command: MigrationCommand = cli.command.parse()?;

    let mut config = load_config(cli.config.as_deref())?;
    config.apply_overrides(ConfigOverrides {
        provider: cli.provider,
        connection_string: cli.connection_string,
        schema_order: cli.schema_order,
        output_dir: cli.output,
        params: cli.params,
        force_drop: cli.force_drop,
        verbose: cli.verbose,
    })?;
    let config = config.with_env_fallback();
    config.validate()?;

    if command == MigrationCommand::SCRIPT {
        let path = generate_script(&config, &cli.args)?;
        println!("{}", path.display());
        return Ok(());
    }

    let args = if command == MigrationCommand::EXECUTE {
        read_statements(&cli.args)?
    } else {
        cli.args
    };

    let migrator = Migrator::from_config(config)?;
    let cancel_token = setup_signal_handler(cli.shutdown_timeout).await?;
    let migrator = migrator.with_cancellation(cancel_token);

    let report = migrator.run(command, &args).await?;

    if cli.output_json {
        println!("{}", report.to_json()?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config, MigrateError> {
    match path {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        None if Path::new(DEFAULT_CONFIG).exists() => {
            let config = Config::load(DEFAULT_CONFIG)?;
            info!("Loaded configuration from {}", DEFAULT_CONFIG);
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

/// Arguments naming an existing `.sql` file are replaced by its content.
fn read_statements(args: &[String]) -> Result<Vec<String>, MigrateError> {
    args.iter()
        .map(|arg| {
            let path = Path::new(arg);
            if arg.to_lowercase().ends_with(".sql") && path.is_file() {
                Ok(std::fs::read_to_string(path)?)
            } else {
                Ok(arg.clone())
            }
        })
        .collect()
}

fn print_report(report: &MigrationReport) {
    println!("\nMigration completed!");
    println!("  Run ID: {}", report.run_id);
    println!("  Database: {} ({})", report.database, report.provider);
    println!("  Command: {}", report.command);
    println!("  Duration: {:.2}s", report.duration_seconds);
    for phase in &report.phases {
        println!(
            "  {:<8} {:>7} ms  {}",
            phase.phase, phase.elapsed_ms, phase.summary
        );
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'. Valid values: text, json", other)),
    }

    Ok(())
}

/// Cancel the token on a signal, then give the run `shutdown_timeout`
/// seconds to stop between scripts before exiting.
fn cancel_with_deadline(token: CancellationToken, shutdown_timeout: u64, signal_name: &str) {
    eprintln!(
        "\nReceived {}. Shutting down gracefully (timeout: {}s)...",
        signal_name, shutdown_timeout
    );
    token.cancel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(shutdown_timeout)).await;
        eprintln!("Shutdown timeout elapsed, exiting");
        std::process::exit(130);
    });
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
#[cfg(unix)]
async fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        cancel_with_deadline(token, shutdown_timeout, name);
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_with_deadline(token, shutdown_timeout, "Ctrl-C");
        }
    });

    Ok(cancel_token)
}
