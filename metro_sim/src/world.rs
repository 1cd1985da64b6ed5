//! SimWorld - the live runtime wiring a layout onto the Ticker.

use crate::concourse::{Concourse, ConcourseStats};
use crate::error::SimError;
use crate::layout::{BuiltLayout, WorldLayout};
use crate::spawner::PassengerSpawner;

use metro_core::{EventSink, Train, TrainConfig, TrainSignals};
use metro_env::{MetroContext, Ticker, TickerState, TokioContext};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Ticker period
    pub loop_duration: Duration,

    /// Whether the ticker starts running or paused
    pub loop_starting_state: TickerState,

    /// Hold time at a station after arriving
    pub dwell: Duration,

    /// Period of the passenger spawn trigger
    pub spawn_interval: Duration,

    /// Passengers seeded at every station before the first tick
    pub initial_passengers_per_station: usize,

    /// Period of the passenger sentiment sweep
    pub sentiment_interval: Duration,

    /// Capacity of the lifecycle event queue
    pub event_capacity: usize,

    /// Capacity of the arrival/departure broadcasts
    pub signal_capacity: usize,

    /// Emit a `train_tick` event every N train updates
    pub tick_event_every: u64,

    /// Log train arrivals and departures at info level
    pub train_logs: bool,

    /// Fraction of capacity at which a train counts as crowded
    pub crowding_ratio: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            loop_duration: Duration::from_millis(20),
            loop_starting_state: TickerState::Running,
            dwell: Duration::from_secs(3),
            spawn_interval: Duration::from_secs(2),
            initial_passengers_per_station: 3,
            sentiment_interval: Duration::from_millis(250),
            event_capacity: 1024,
            signal_capacity: 64,
            tick_event_every: 60,
            train_logs: true,
            crowding_ratio: 0.8,
        }
    }
}

impl SimConfig {
    /// Per-train settings derived from this configuration.
    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            dwell: self.dwell,
            tick_event_every: self.tick_event_every,
            train_logs: self.train_logs,
            tick_interval: self.loop_duration,
            crowding_ratio: self.crowding_ratio,
            ..TrainConfig::default()
        }
    }
}

/// Outcome of a live run.
#[derive(Debug, Clone, Serialize)]
pub struct LiveReport {
    pub elapsed_secs: f64,

    /// Ticks fired while not running plus deliveries dropped at full inboxes
    pub missed_ticks: u64,
    pub trains: usize,
    pub events_dropped: u64,
    pub passengers: ConcourseStats,
}

/// The SimWorld - a built layout plus the configuration to run it with.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Validated stations, network, lines and train assignments
    pub layout: BuiltLayout,
}

impl SimWorld {
    /// Validates `layout` and creates a world around it.
    pub fn new(config: SimConfig, layout: &WorldLayout) -> Result<Self, SimError> {
        Ok(Self {
            config,
            layout: layout.build()?,
        })
    }

    pub fn station_count(&self) -> usize {
        self.layout.stations.len()
    }

    pub fn line_count(&self) -> usize {
        self.layout.lines.len()
    }

    pub fn train_count(&self) -> usize {
        self.layout.assignments.len()
    }

    /// Builds the trains and the concourse for `ctx`, without starting them.
    pub fn populate<C: MetroContext>(
        &self,
        ctx: &Arc<C>,
        signals: &TrainSignals,
        events: &EventSink,
    ) -> (Vec<Train<C>>, Concourse<C>) {
        let stations = self.layout.station_list();
        let spawner = PassengerSpawner::new(
            Arc::clone(ctx),
            stations.clone(),
            &self.layout.lines,
            events.clone(),
        );
        let mut concourse = Concourse::new(spawner, &stations, &self.layout.lines);

        let trains: Vec<Train<C>> = self
            .layout
            .assignments
            .iter()
            .map(|assignment| {
                Train::new(Arc::clone(ctx), assignment.clone(), Arc::clone(&self.layout.network))
                    .with_config(self.config.train_config())
                    .with_signals(signals.clone())
                    .with_events(events.clone())
            })
            .collect();

        for train in &trains {
            concourse.register_train(train.handle());
        }
        concourse.seed_initial(self.config.initial_passengers_per_station);

        (trains, concourse)
    }

    /// Runs the world against the tokio clock for `duration`, or until
    /// Ctrl-C.
    ///
    /// One ticker drives every train task; the concourse runs on its own
    /// intervals. On the way out the ticker is stopped, which lets every
    /// train task finish, and the concourse is told to shut down.
    pub async fn run_live(&self, duration: Duration, events: EventSink) -> LiveReport {
        let ctx = TokioContext::shared();
        let signals = TrainSignals::new(self.config.signal_capacity);
        let ticker = Ticker::new(self.config.loop_duration, self.config.loop_starting_state);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let arrivals = signals.subscribe_arrivals();
        let departures = signals.subscribe_departures();
        let (trains, concourse) = self.populate(&ctx, &signals, &events);

        info!(
            "Starting live run: {} stations, {} lines, {} trains, ticker {}",
            self.station_count(),
            self.line_count(),
            trains.len(),
            ticker.state()
        );

        let train_count = trains.len();
        let mut tasks = Vec::with_capacity(train_count);
        for train in trains {
            let inbox = ticker.subscribe();
            let name = train.name().to_string();
            tasks.push(ctx.spawn(&name, train.run(inbox)));
        }

        let (stats_tx, stats_rx) = oneshot::channel();
        let concourse_run = concourse.run(
            arrivals,
            departures,
            shutdown_rx,
            self.config.spawn_interval,
            self.config.sentiment_interval,
        );
        let concourse_task = ctx.spawn("concourse", async move {
            let _ = stats_tx.send(concourse_run.await);
        });

        let started = ctx.now();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        }
        let elapsed = ctx.now() - started;

        ticker.stop();
        for task in tasks {
            if let Err(err) = task.await {
                warn!("train task failed: {}", err);
            }
        }

        let _ = shutdown_tx.send(true);
        if let Err(err) = concourse_task.await {
            warn!("concourse task failed: {}", err);
        }
        let passengers = stats_rx.await.unwrap_or_default();

        LiveReport {
            elapsed_secs: elapsed.as_secs_f64(),
            missed_ticks: ticker.count(),
            trains: train_count,
            events_dropped: events.dropped(),
            passengers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;

    #[test]
    fn test_sim_world_creation() {
        let world = SimWorld::new(SimConfig::default(), &WorldLayout::demo()).unwrap();

        assert_eq!(world.station_count(), 10);
        assert_eq!(world.line_count(), 3);
        assert_eq!(world.train_count(), 5);
    }

    #[test]
    fn test_populate_seeds_passengers() {
        let config = SimConfig {
            initial_passengers_per_station: 2,
            ..Default::default()
        };
        let world = SimWorld::new(config, &WorldLayout::demo()).unwrap();
        let ctx = SimContext::shared(42);

        let (trains, concourse) = world.populate(&ctx, &TrainSignals::new(8), &EventSink::disabled());
        assert_eq!(trains.len(), 5);
        assert_eq!(concourse.stats().spawned, 20);
        assert_eq!(concourse.stats().waiting, 20);
    }

    #[test]
    fn test_train_config_follows_sim_config() {
        let config = SimConfig {
            dwell: Duration::from_secs(1),
            train_logs: false,
            ..Default::default()
        };
        let train = config.train_config();
        assert_eq!(train.dwell, Duration::from_secs(1));
        assert!(!train.train_logs);
        assert_eq!(train.tick_interval, Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_run_shuts_down() {
        let config = SimConfig {
            train_logs: false,
            ..Default::default()
        };
        let world = SimWorld::new(config, &WorldLayout::shuttle()).unwrap();
        let (sink, mut rx) = EventSink::channel(4096);

        let report = world.run_live(Duration::from_secs(10), sink).await;
        assert_eq!(report.trains, 1);
        assert!(report.elapsed_secs >= 10.0);
        // Stats come back from the concourse task
        assert!(report.passengers.spawned >= 6);

        let mut departures = 0;
        while let Ok(event) = rx.try_recv() {
            if event.kind() == "train_departure" {
                departures += 1;
            }
        }
        assert!(departures >= 1);
    }
}
