//! Schema Reconciler
//!
//! Deploy-pipeline entry point: validates configuration, reconciles the
//! database schema, seeds baseline records and reports consistency.
//! Exits non-zero only when the run ends in the failed state.

use clap::{Parser, Subcommand};
use schema_reconciler::config::Settings;
use schema_reconciler::db;
use schema_reconciler::{
    ConsistencyReporter, DriftDetector, ExpectedSchema, MigrationExecutor, SchemaIntrospector,
    StartupOrchestrator, UpsertPolicy,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "schema-reconciler", version, about = "Reconcile, migrate and seed the application database")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Write the structured JSON report to this file
    #[arg(long, global = true, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Recreate default staff accounts with fresh credentials
    #[arg(long, global = true)]
    reset_credentials: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Full startup sequence: validate, migrate, seed, report (default)
    Run,
    /// Introspect and print the consistency report without writing
    Report,
    /// Introspect and print the planned actions and DDL without writing
    Plan,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut settings = Settings::load();
    if cli.reset_credentials {
        settings.tenant.upsert_policy = UpsertPolicy::ReplaceCredentialsEveryRun;
    }
    if let Some(path) = cli.report {
        settings.report_path = Some(path);
    }

    let code = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(settings).await,
        Command::Report => report(settings).await?,
        Command::Plan => plan(settings).await?,
    };

    std::process::exit(code);
}

async fn run(settings: Settings) -> i32 {
    info!("🚀 Starting schema reconciliation ({:?})", settings.environment);
    let report_path = settings.report_path.clone();

    let outcome = StartupOrchestrator::new(settings).run().await;

    if let Some(path) = report_path {
        if let Err(e) = outcome.write_to(&path) {
            warn!("⚠️  {}", e);
        }
    }
    outcome.exit_code()
}

/// Read-only consistency check for CI; exits 1 while anything is missing
async fn report(settings: Settings) -> anyhow::Result<i32> {
    let database = db::connect(&settings.database()?).await?;
    let actual = SchemaIntrospector::introspect(database.as_ref()).await?;
    let report = ConsistencyReporter::report(&ExpectedSchema::standard(), &actual);
    report.log();

    if let Some(path) = &settings.report_path {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        info!("📝 Consistency report written to {}", path.display());
    }

    Ok(if report.is_complete() { 0 } else { 1 })
}

/// Dry run: the deterministic action log plus the DDL it would execute
async fn plan(settings: Settings) -> anyhow::Result<i32> {
    let database = db::connect(&settings.database()?).await?;
    let actual = SchemaIntrospector::introspect(database.as_ref()).await?;
    let plan = DriftDetector::detect(&ExpectedSchema::standard(), &actual);
    plan.log();

    for line in plan.action_log() {
        println!("{}", line);
    }
    for statement in MigrationExecutor::new(database.as_ref()).render(&plan.units) {
        println!("{};", statement);
    }

    if let Some(path) = &settings.report_path {
        std::fs::write(path, serde_json::to_string_pretty(&plan)?)?;
    }
    Ok(0)
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schema_reconciler=debug"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| fmt::layer().json().with_current_span(false)))
        .with((!json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact()
        }))
        .init();
}
