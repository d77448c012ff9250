//! Stellar contract test runner
//!
//! Runs the YAML scenario catalog against a Stellar Burgers backend.
//! Exit code 0 when nothing failed, 1 on scenario failures, 2 on harness errors.

use clap::Parser;
use std::path::PathBuf;
use stellar_common::config::BASE_URL_ENV;
use stellar_common::BackendConfig;
use tracing_subscriber::EnvFilter;

use stellar_e2e::runner::default_specs_dir;
use stellar_e2e::{CleanupConfig, E2eError, RunnerConfig, SuiteRunner};

#[derive(Parser, Debug)]
#[command(name = "stellar-e2e")]
#[command(author, version, about = "Live contract tests for the Stellar Burgers API")]
struct Args {
    /// Backend API root (overrides the config file)
    #[arg(long, env = BASE_URL_ENV)]
    base_url: Option<String>,

    /// TOML file with backend settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to scenario specs directory
    #[arg(short, long)]
    specs: Option<PathBuf>,

    /// Run only scenarios matching this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only a specific scenario by name
    #[arg(short, long)]
    name: Option<String>,

    /// Output directory for results
    #[arg(short, long, default_value = "test-results")]
    output: PathBuf,

    /// Cleanup rounds per account
    #[arg(long, default_value = "3")]
    cleanup_attempts: u32,

    /// Pause between cleanup rounds in milliseconds
    #[arg(long, default_value = "500")]
    cleanup_delay_ms: u64,

    /// Also run scenarios parked as known backend deviations
    #[arg(long)]
    include_known_deviations: bool,

    /// Exit with a harness error instead of skipping when the backend is down
    #[arg(long)]
    require_backend: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> anyhow::Result<bool> {
    let mut backend = match &args.config {
        Some(path) => BackendConfig::load(path)?,
        None => BackendConfig::from_env(),
    };
    if let Some(url) = args.base_url {
        backend = BackendConfig {
            request_timeout_secs: backend.request_timeout_secs,
            ..BackendConfig::new(url)
        };
    }

    let config = RunnerConfig {
        backend,
        cleanup: CleanupConfig {
            attempts: args.cleanup_attempts,
            delay_ms: args.cleanup_delay_ms,
        },
        specs_dir: args.specs.unwrap_or_else(default_specs_dir),
        output_dir: args.output,
        run_known_deviations: args.include_known_deviations,
    };

    let runner = SuiteRunner::new(config)?;

    if args.require_backend && !runner.backend_available().await {
        return Err(E2eError::BackendUnavailable(runner.client().base_url().to_string()).into());
    }

    let results = if let Some(name) = args.name {
        runner.run_named(&name).await?
    } else if let Some(tag) = args.tag {
        runner.run_tagged(&tag).await?
    } else {
        runner.run_all().await?
    };

    runner.write_results(&results)?;

    Ok(results.failed == 0)
}
