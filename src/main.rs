//! txq-harness - transaction test harness CLI
//!
//! Runs multi-step transaction test suites against a remote query
//! service: provisions a pool of compute engines, fans the cases out in
//! parallel, and prints or stores the aggregated result tree.
//!
//! ## Usage
//!
//! ```bash
//! # Run a suite with two pooled engines, four cases at a time
//! txq-harness run --file suite.json --engines 2 --concurrent 4
//!
//! # Provision engines up front and keep them across runs
//! txq-harness pool provision --size 2
//! txq-harness run --file suite.json --engines 2 --keep-engines
//!
//! # Inspect stored reports
//! txq-harness report list
//! txq-harness report show
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};

use txq_harness::cli::{self, Args, SuiteFile};
use txq_harness::client::HttpServiceClient;
use txq_harness::config::HarnessConfig;
use txq_harness::orchestrator::{CaseOptions, TestOrchestrator};
use txq_harness::pool::{self, EnginePool};
use txq_harness::report::ReportStorage;
use txq_harness::runner::TransactionRunner;
use txq_harness::suite::{CaseSpec, SuiteRunner};
use txq_harness::utils::init_logger;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(args.verbose);

    let config = HarnessConfig::from_env();
    let client = Arc::new(
        HttpServiceClient::new(config.service_config())
            .context("failed to build service client")?,
    );

    match args.command {
        cli::Command::Run(run_args) => {
            run_suite(run_args, &config, client).await?;
        }
        cli::Command::Pool(pool_args) => {
            manage_pool(pool_args, &config, client).await?;
        }
        cli::Command::Report(report_args) => {
            show_reports(report_args, &config)?;
        }
    }

    Ok(())
}

async fn run_suite(
    args: cli::RunArgs,
    config: &HarnessConfig,
    client: Arc<HttpServiceClient>,
) -> Result<()> {
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read suite file {}", args.file))?;
    let suite: SuiteFile =
        serde_json::from_str(&raw).with_context(|| format!("invalid suite file {}", args.file))?;

    let description = suite.description.clone().unwrap_or_else(|| args.file.clone());

    let pool = Arc::new(EnginePool::new(client.clone(), config.pool_config()));
    pool.set_name_generator(pool::sequential(&config.engine_base));

    info!("provisioning {} engines", args.engines);
    pool.resize(args.engines, None).await?;
    if pool.is_empty() {
        anyhow::bail!("no engines survived provisioning; aborting the run");
    }

    let runner = Arc::new(TransactionRunner::new(client.clone(), config.runner_config()));
    let orchestrator = Arc::new(TestOrchestrator::new(
        pool.clone(),
        runner,
        client.clone(),
        config.orchestrator_config(),
    ));

    let cases: Vec<CaseSpec> = suite
        .cases
        .into_iter()
        .map(|case| {
            CaseSpec::new(case.name, case.steps).options(CaseOptions {
                engine: case.engine,
                clone_source: case.clone_source,
                broken: case.broken,
            })
        })
        .collect();

    let report = SuiteRunner::new(orchestrator, args.concurrent)
        .run(&description, cases)
        .await;

    println!("{}", report.format_tree(0));

    if args.save {
        let storage = ReportStorage::new(&config.report_dir);
        let path = storage.save(&report)?;
        println!("Report saved to: {}", path.display());
    }

    if args.keep_engines {
        info!("keeping {} engines provisioned", pool.len());
    } else if let Err(e) = pool.destroy_all().await {
        warn!("failed to tear down the engine pool: {e}");
    }

    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}

async fn manage_pool(
    args: cli::PoolArgs,
    config: &HarnessConfig,
    client: Arc<HttpServiceClient>,
) -> Result<()> {
    match args.action {
        cli::PoolAction::Provision { size, base, random } => {
            let base = base.unwrap_or_else(|| config.engine_base.clone());
            let generator = if random {
                pool::random_suffix(&base)
            } else {
                pool::sequential(&base)
            };

            let pool = EnginePool::new(client, config.pool_config());
            pool.resize(size, Some(generator)).await?;

            println!("\nProvisioned engines:");
            for (name, _) in pool.list() {
                println!("  ✓ {name}");
            }
            if pool.len() < size {
                println!("  ⚠ {} of {size} engines failed provisioning", size - pool.len());
            }
        }

        cli::PoolAction::Destroy { size, base } => {
            use txq_harness::client::ProvisioningClient;

            let base = base.unwrap_or_else(|| config.engine_base.clone());
            for i in 1..=size {
                let name = format!("{base}-{i}");
                match client.delete_engine(&name).await {
                    Ok(()) => println!("  ✓ Deleted engine: {name}"),
                    Err(e) => println!("  ✗ Failed to delete {name}: {e}"),
                }
            }
        }
    }

    Ok(())
}

fn show_reports(args: cli::ReportArgs, config: &HarnessConfig) -> Result<()> {
    let storage = ReportStorage::new(&config.report_dir);

    match args.action {
        cli::ReportAction::List => {
            let reports = storage.list()?;
            if reports.is_empty() {
                println!("No stored reports. Run a suite with --save first.");
                return Ok(());
            }

            println!("\nStored reports:");
            for info in reports {
                println!(
                    "  {} {} — {} ({})",
                    if info.passed { "✓" } else { "✗" },
                    info.id,
                    info.description,
                    info.saved_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            println!();
        }

        cli::ReportAction::Show { id } => {
            let report = match id {
                Some(id) => storage.load(&id)?,
                None => storage
                    .latest()?
                    .context("no stored reports to show")?,
            };

            println!(
                "\nReport {} (harness {}, saved {})",
                report.id,
                report.tool_version,
                report.saved_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!("{}", report.root.format_tree(0));
        }

        cli::ReportAction::Delete { id } => {
            storage.delete(&id)?;
            println!("✓ Deleted report: {id}");
        }
    }

    Ok(())
}
