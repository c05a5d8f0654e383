mod activate;
mod cli;
mod config;
mod console;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use autoproxy_core::config::SourceConfig;
use autoproxy_engine::{
    CandidatePool, CandidateSource, PoolActor, Scheduler, TriggerOutcome, TriggerSource,
};
use autoproxy_probe::{FileSource, HttpListSource, TcpProbeRunner};

use crate::activate::FileActivator;
use crate::cli::CliArgs;

/// How long shutdown waits for a running round to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn build_source(config: &SourceConfig) -> Result<Arc<dyn CandidateSource>> {
    if !config.subscription_urls.is_empty() {
        let source = HttpListSource::from_config(config)
            .context("failed to create subscription source")?;
        return Ok(Arc::new(source));
    }
    match &config.list_file {
        Some(path) => Ok(Arc::new(FileSource::new(path.clone()))),
        None => anyhow::bail!(
            "no candidate source configured: pass --source-url or --source-file, \
             or set AUTOPROXY_SUBSCRIPTION_URLS / AUTOPROXY_LIST_FILE"
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    autoproxy_core::config::load_dotenv();
    let args = CliArgs::parse();

    let mut scheduler_config =
        config::load(args.config.as_deref()).context("failed to load configuration")?;
    if args.enable {
        scheduler_config.start_enabled = true;
    }
    if args.once {
        config::apply_once(&mut scheduler_config);
    }

    let mut env_config = autoproxy_core::Config::from_env();
    args.apply_source_overrides(&mut env_config.source);
    env_config.log_summary();

    let source = build_source(&env_config.source)?;
    let runner = Arc::new(TcpProbeRunner::new(env_config.probe.clone()));
    let activator = Arc::new(FileActivator::new(args.active_file.clone()));

    // An empty starting pool is fine, the first round refreshes it.
    let initial = match source.refresh_all().await {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!(error = %e, "initial candidate fetch failed, starting with an empty pool");
            Vec::new()
        }
    };
    let pool = CandidatePool::from_candidates(initial);
    info!(candidates = pool.len(), "candidate pool loaded");
    let (pool, actor) = PoolActor::spawn(pool, scheduler_config.ingest_capacity);

    let cadence = scheduler_config.cadence;
    let scheduler = Arc::new(Scheduler::new(
        scheduler_config,
        pool,
        runner,
        source,
        activator,
    ));
    let notices = tokio::spawn(console::follow_notices(scheduler.subscribe_notices()));

    if args.once {
        let outcome = scheduler.trigger(TriggerSource::Manual).await;
        if let TriggerOutcome::Finished(report) = &outcome {
            info!(
                outcome = ?report.outcome,
                cycles = report.cycles,
                elapsed = ?report.elapsed,
                "round finished"
            );
        }
        println!("{}", console::format_status(&scheduler.status()));
        scheduler.shutdown();
        notices.abort();
        return Ok(());
    }

    console::print_banner(scheduler.is_enabled())?;
    let timer = tokio::spawn(Arc::clone(&scheduler).run_timer(cadence));

    if args.now {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            scheduler.trigger(TriggerSource::Manual).await;
        });
    }

    tokio::select! {
        result = console::run(Arc::clone(&scheduler)) => {
            if let Err(e) = result {
                warn!(error = %e, "console stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received");
        }
    }

    scheduler.shutdown();
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    while scheduler.is_running() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    if scheduler.is_running() {
        warn!("round still running after {:?}, exiting anyway", SHUTDOWN_GRACE);
    }
    timer.await.ok();
    notices.abort();
    drop(scheduler);
    actor.abort();
    info!("autoproxy stopped");
    Ok(())
}
