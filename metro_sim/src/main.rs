//! Metro Simulator CLI
//!
//! Run the metro live against the wall clock, or replay deterministic
//! scenarios on the virtual clock.

use clap::Parser;
use metro_core::EventSink;
use metro_env::TickerState;
use metro_sim::scenarios::ScenarioId;
use metro_sim::{EventExport, ScenarioResult, ScenarioRunner, SimConfig, SimWorld, WorldLayout};
use std::time::Duration;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Metro simulation CLI
#[derive(Parser, Debug)]
#[command(name = "metro-sim")]
#[command(about = "Simulate trains patrolling lines and passengers riding them", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// JSON world layout (stations, edges, lines, makes, trains); defaults to the demo network
    #[arg(short, long)]
    layout: Option<String>,

    /// Run against the wall clock instead of replaying scenarios
    #[arg(long)]
    live: bool,

    /// Scenario to run (shuttle, demo, stranded, rush, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Maximum simulation duration in seconds
    #[arg(short, long, default_value = "10")]
    duration: f64,

    /// Ticker period in milliseconds
    #[arg(long, default_value = "20")]
    loop_ms: u64,

    /// Ticker starting state (running, paused)
    #[arg(long, default_value = "running")]
    starting_state: TickerState,

    /// Seconds a train holds at a station
    #[arg(long, default_value = "3")]
    dwell: f64,

    /// Milliseconds between passenger spawn triggers (0 disables spawning)
    #[arg(long, default_value = "2000")]
    spawn_ms: u64,

    /// Passengers seeded at every station before the first tick
    #[arg(long, default_value = "3")]
    initial_passengers: usize,

    /// Silence per-train arrival and departure logs
    #[arg(long)]
    no_train_logs: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the lifecycle event stream to a JSON file
    #[arg(long)]
    export: Option<String>,
}

impl Args {
    fn sim_config(&self, seed: u64) -> SimConfig {
        SimConfig {
            seed,
            loop_duration: Duration::from_millis(self.loop_ms.max(1)),
            loop_starting_state: self.starting_state,
            dwell: Duration::from_secs_f64(self.dwell.max(0.0)),
            spawn_interval: Duration::from_millis(self.spawn_ms),
            initial_passengers_per_station: self.initial_passengers,
            train_logs: !self.no_train_logs,
            ..SimConfig::default()
        }
    }

    fn world_layout(&self) -> WorldLayout {
        match &self.layout {
            Some(path) => WorldLayout::from_path(path).unwrap_or_else(|e| {
                error!("Failed to load layout {}: {}", path, e);
                std::process::exit(1);
            }),
            None => WorldLayout::demo(),
        }
    }
}

async fn run_live(args: &Args, seed: u64) {
    let config = args.sim_config(seed);
    let event_capacity = config.event_capacity;
    let world = SimWorld::new(config, &args.world_layout()).unwrap_or_else(|e| {
        error!("Invalid layout: {}", e);
        std::process::exit(1);
    });

    if args.starting_state == TickerState::Paused {
        warn!("Ticker starts paused: trains will hold position");
    }

    let (sink, mut rx) = EventSink::channel(event_capacity);
    let collector = tokio::spawn(async move {
        let mut export = EventExport::new("live", seed);
        while let Some(event) = rx.recv().await {
            debug!(kind = event.kind(), "event");
            export.record(event);
        }
        export
    });

    let report = world
        .run_live(Duration::from_secs_f64(args.duration.max(0.0)), sink)
        .await;

    let export = match tokio::time::timeout(Duration::from_secs(1), collector).await {
        Ok(Ok(export)) => Some(export),
        Ok(Err(e)) => {
            warn!("event collector failed: {}", e);
            None
        }
        Err(_) => {
            warn!("event collector did not drain in time");
            None
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to encode report: {}", e),
        }
    } else {
        info!(
            "Ran {:.1}s: {} trains, {} missed ticks, {} events dropped",
            report.elapsed_secs, report.trains, report.missed_ticks, report.events_dropped
        );
        info!(
            "Passengers: {} spawned, {} boarded, {} delivered, {} waiting, {} riding, mean sentiment {:.1}",
            report.passengers.spawned,
            report.passengers.boarded,
            report.passengers.delivered,
            report.passengers.waiting,
            report.passengers.riding,
            report.passengers.mean_sentiment
        );
    }

    if let (Some(path), Some(mut export)) = (&args.export, export) {
        export.finalize(report.elapsed_secs, report.events_dropped, None);
        match export.write_to_file(path) {
            Ok(()) => info!("Exported {} events to {}", export.events.len(), path),
            Err(e) => error!("Failed to write export: {:?}", e),
        }
    }
}

fn run_scenarios(args: &Args, base_seed: u64) {
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: shuttle, demo, stranded, rush, all");
            std::process::exit(1);
        })]
    };

    if args.export.is_some() && (scenarios.len() > 1 || args.seeds > 1) {
        eprintln!("Error: --export only supports a single scenario and seed");
        std::process::exit(1);
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        let mut runner = ScenarioRunner::new(seed)
            .with_config(SimConfig {
                train_logs: false,
                ..args.sim_config(seed)
            })
            .with_duration(args.duration);
        if args.layout.is_some() {
            runner = runner.with_layout(args.world_layout());
        }

        for scenario in &scenarios {
            let (result, events) = runner.run_recorded(*scenario);

            if let Some(path) = &args.export {
                let mut export = EventExport::new(scenario.name(), seed);
                export.record_all(events);
                export.finalize(
                    result.final_time_secs,
                    result.metrics.events_dropped,
                    Some(result.passed),
                );
                match export.write_to_file(path) {
                    Ok(()) => info!("Exported {} events to {}", export.events.len(), path),
                    Err(e) => error!("Failed to write export: {:?}", e),
                }
            }

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "failure_reason": r.failure_reason,
                    "metrics": r.metrics,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("All {} scenario runs passed", total);
        } else {
            error!("{}/{} scenario runs failed", failed_count, total);

            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    if failed_count > 0 {
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("Metro Simulator v{}", env!("CARGO_PKG_VERSION"));
    }

    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    if args.live {
        run_live(&args, seed).await;
    } else {
        run_scenarios(&args, seed);
    }
}
