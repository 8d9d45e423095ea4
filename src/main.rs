//! Synergy Arena - headless host
//!
//! Loads the catalog and configuration, seeds demo participants with random
//! sequences, then runs the tick scheduler and prints each tick summary.

use clap::Parser;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use synergy_arena::catalog::ComponentCatalog;
use synergy_arena::core::config::EngineConfig;
use synergy_arena::core::error::{EngineError, Result};
use synergy_arena::core::types::{ParticipantId, MAX_SEQUENCE_LENGTH};
use synergy_arena::evaluation::{EvaluationService, OutboundMessage, TickSummary};
use synergy_arena::scheduler::{PhaseObserver, SchedulerEvent, TickScheduler};
use synergy_arena::sequence::SlotSpec;

/// Synergy Arena - tick engine with demo participants
#[derive(Parser, Debug)]
#[command(name = "synergy-arena")]
#[command(about = "Run the synergy tick engine headless and print tick summaries")]
struct Args {
    /// Engine configuration (TOML); defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Component catalog file or directory of TOML files
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Number of demo participants
    #[arg(long, default_value_t = 8)]
    participants: u64,

    /// Ticks to run before exiting
    #[arg(long, default_value_t = 3)]
    ticks: u64,

    /// Seed for demo sequences and evaluation rolls
    #[arg(long)]
    seed: Option<u64>,

    /// Print summaries as JSON lines
    #[arg(long)]
    json: bool,

    /// Shrink the phases to a few seconds for demos
    #[arg(long)]
    fast: bool,
}

/// Logs every scheduler event at debug level
struct PhaseLogger;

impl PhaseObserver for PhaseLogger {
    fn name(&self) -> &str {
        "phase-logger"
    }

    fn on_event(&self, event: &SchedulerEvent) -> std::result::Result<(), String> {
        tracing::debug!("Scheduler event: {:?}", event);
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("synergy_arena=info")),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.rng_seed = seed;
    }
    if args.fast {
        config.building_duration_secs = 2.0;
        config.evaluating_duration_secs = 1.0;
        config.results_duration_secs = 0.5;
        config.tick_duration_secs = None;
        config.validate().map_err(EngineError::Config)?;
    }

    let catalog = load_catalog(args.catalog.as_deref())?;
    tracing::info!("Catalog ready: {} components", catalog.len());

    let rt = Runtime::new()?;
    rt.block_on(run(&args, config, catalog))
}

fn load_catalog(path: Option<&Path>) -> Result<ComponentCatalog> {
    let Some(path) = path else {
        return ComponentCatalog::builtin();
    };
    let mut catalog = ComponentCatalog::new();
    if path.is_dir() {
        catalog.load_directory(path)?;
    } else {
        catalog.load_file(path)?;
    }
    Ok(catalog)
}

async fn run(args: &Args, config: EngineConfig, catalog: ComponentCatalog) -> Result<()> {
    let service = Arc::new(EvaluationService::new(Arc::new(catalog), config.clone()));
    seed_participants(&service, args.participants, config.rng_seed);

    let scheduler = Arc::new(TickScheduler::new(Arc::clone(&service)));
    scheduler.subscribe(Arc::new(PhaseLogger));
    let mut messages = scheduler.messages();
    let clock = scheduler.start();

    let mut completed = 0;
    while completed < args.ticks {
        match messages.recv().await {
            Ok(OutboundMessage::TickSummary(summary)) => {
                print_summary(&summary, args.json)?;
                completed += 1;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Message receiver lagged by {}", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    scheduler.stop();
    if let Err(e) = clock.await {
        tracing::warn!("Clock task ended abnormally: {}", e);
    }

    let stats = service.global_stats();
    tracing::info!(
        "Done: {} ticks processed, highest tick damage {:.2}",
        stats.ticks_processed,
        stats.highest_tick_damage
    );
    Ok(())
}

/// Give each demo participant a random 2-5 component sequence
fn seed_participants(service: &EvaluationService, count: u64, seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let ids: Vec<String> = service.catalog().ids().map(str::to_string).collect();

    for n in 1..=count {
        let participant = ParticipantId(n);
        let length = rng.gen_range(2..=MAX_SEQUENCE_LENGTH);
        let slots: Vec<Option<SlotSpec>> = ids
            .choose_multiple(&mut rng, length)
            .map(|id| Some(SlotSpec::new(id.clone()).with_evolution((n % 4) as u32)))
            .collect();

        if let Err(e) = service.submit_configuration(participant, slots, format!("demo-{}", n)) {
            tracing::warn!("Demo {} rejected: {}", participant, e);
        }
    }
}

fn print_summary(summary: &TickSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(summary)?);
        return Ok(());
    }

    println!(
        "Tick {}: {} players, total {:.1}, average {:.1}, top {:.1}{}",
        summary.tick,
        summary.player_count,
        summary.total_damage,
        summary.average_damage,
        summary.top_damage,
        if summary.timed_out { " (timed out)" } else { "" }
    );
    for performer in &summary.top_performers {
        println!(
            "  #{:<2} {:<16} {:>10.1}",
            performer.rank,
            performer.participant_id.to_string(),
            performer.total_damage
        );
    }
    Ok(())
}
