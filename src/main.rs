//! Command-line driver for batch GSI provisioning.
//!
//! Reads a JSON plan of index definitions, replays it against the checkpoint
//! file, and drives every not-yet-active index to completion. Exits non-zero
//! when any index exhausted its retry budget.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dynogsi::{
    BatchSummary, ClientConfig, ControlPlane, DEFAULT_MAX_ATTEMPTS, DynamoControlPlane,
    Orchestrator, Plan, Provisioner, RetryPolicy, RunReport, SharedState, StateStore, build_client,
    plan_preview,
};

#[derive(Parser)]
#[command(name = "dynogsi")]
#[command(about = "Batch-provision DynamoDB global secondary indexes", long_about = None)]
struct Args {
    /// JSON plan listing the indexes to create, grouped by table.
    #[arg(long, value_name = "FILE")]
    plan: Option<PathBuf>,

    /// Checkpoint file recording per-index progress across runs.
    #[arg(long, value_name = "FILE", default_value = "dynogsi_state.json")]
    state_file: PathBuf,

    /// Name stamped into the state file; a file created under a different
    /// name is rejected.
    #[arg(long, default_value = "dynogsi")]
    script_name: String,

    /// Print the work the plan implies without calling DynamoDB.
    #[arg(long)]
    dry_run: bool,

    /// Pick up an interrupted run; fails if no state file exists.
    #[arg(long)]
    resume: bool,

    /// Print per-index status from the state file and exit.
    #[arg(long)]
    check_status: bool,

    /// Probe each index after it reports ACTIVE to confirm queries are
    /// actually served by the index.
    #[arg(long)]
    validate: bool,

    /// Return as soon as each create call is accepted instead of polling
    /// the build to ACTIVE.
    #[arg(long)]
    no_wait: bool,

    /// Attempts per index before it is marked failed.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Write a JSON failure report to this path after the run.
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// AWS region; defaults to the environment, then us-east-1.
    #[arg(long)]
    region: Option<String>,

    /// Named profile from the shared AWS config files.
    #[arg(long)]
    profile: Option<String>,

    /// DynamoDB endpoint override, e.g. http://localhost:8000.
    #[arg(long)]
    endpoint_url: Option<String>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level).with_context(|| format!("invalid log level: {log_level}"))?
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    if args.check_status {
        return check_status(&args.state_file);
    }

    let plan_path = args
        .plan
        .as_deref()
        .context("--plan <FILE> is required unless --check-status is set")?;
    let plan = Plan::from_file(plan_path)?;
    if plan.is_empty() {
        println!("{}: no indexes listed; nothing to do", plan_path.display());
        return Ok(());
    }

    let mut store = if args.resume {
        StateStore::resume(&args.state_file, &args.script_name)?
    } else {
        StateStore::load_or_create(&args.state_file, &args.script_name)?
    };

    if args.dry_run {
        println!(
            "dry run: {} indexes across {} tables",
            plan.len(),
            plan.by_table().len()
        );
        for line in plan_preview(&plan, &store) {
            println!("  {line}");
        }
        return Ok(());
    }

    store.initialize(plan.indexes())?;
    let state = SharedState::new(store);

    let client = build_client(ClientConfig {
        region: args.region.clone(),
        profile: args.profile.clone(),
        endpoint_url: args.endpoint_url.clone(),
        ..ClientConfig::default()
    })
    .await?;
    let provider: Arc<dyn ControlPlane> = Arc::new(DynamoControlPlane::new(client));

    let provisioner =
        Provisioner::new(provider, state.clone(), RetryPolicy::new(args.max_attempts))
            .with_wait(!args.no_wait)
            .with_validation(args.validate);
    let summary = Orchestrator::new(provisioner, state.clone())
        .run(&plan)
        .await?;

    print_summary(&summary);
    if let Some(path) = &args.report {
        write_report(path, &args.script_name, &summary)?;
    }
    if let Some(archive) = state.cleanup()? {
        println!("all indexes active; state archived to {}", archive.display());
    }

    if !summary.success() {
        std::process::exit(1);
    }
    Ok(())
}

fn check_status(path: &Path) -> Result<()> {
    let store = StateStore::load(path)?;
    let counts = store.counts();
    println!("state file: {}", path.display());
    println!("script:     {}", store.state().script_name);
    println!(
        "{} indexes: {} active, {} pending, {} in progress, {} failed",
        counts.total(),
        counts.active,
        counts.pending,
        counts.in_progress,
        counts.failed
    );
    for (table, index) in store.failed() {
        let error = store
            .get(&table, &index)
            .and_then(|r| r.last_error.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        println!("  failed: {table}/{index}: {error}");
    }
    if counts.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!();
    for (table, counts) in &summary.tables {
        println!(
            "{table}: {} created, {} skipped, {} failed",
            counts.created, counts.skipped, counts.failed
        );
    }
    println!(
        "total: {} created, {} skipped, {} failed",
        summary.created, summary.skipped, summary.failed
    );
    for report in &summary.reports {
        println!("{}", report.summary_line());
        for remediation in &report.remediations {
            println!("  - {remediation}");
        }
    }
}

fn write_report(path: &Path, script_name: &str, summary: &BatchSummary) -> Result<()> {
    let report = RunReport::new(script_name, summary.reports.clone());
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    println!("failure report written to {}", path.display());
    Ok(())
}
