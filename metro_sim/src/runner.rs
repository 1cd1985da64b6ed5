//! Scenario runner - drives worlds on the virtual clock.
//!
//! Nothing here touches the tokio timer. Each step advances the
//! [`SimContext`] by one loop period, updates every train that is not
//! dwelling, feeds the station broadcast into the concourse and fires the
//! spawn and sentiment triggers whose deadline has passed. Same seed, same
//! run.

use crate::concourse::Concourse;
use crate::context::SimContext;
use crate::error::SimError;
use crate::layout::{EdgeSpec, LineSpec, StationSpec, WorldLayout};
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use metro_core::{EventSink, MetroEvent, StationId, StationSignal, Train, TrainSignals, TrainStep, Vector};
use metro_env::MetroContext;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

impl ScenarioResult {
    fn failed(scenario: ScenarioId, seed: u64, reason: String) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            total_ticks: 0,
            final_time_secs: 0.0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
        }
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioMetrics {
    pub departures: u64,
    pub arrivals: u64,
    pub train_errors: u64,
    pub spawned: u64,
    pub boarded: u64,
    pub delivered: u64,

    /// Boardings refused because the train was full
    pub refused_full: u64,
    pub frustrated: u64,

    /// Lifecycle events lost to a full queue
    pub events_dropped: u64,
    pub mean_sentiment: f64,
}

/// One world being stepped on the virtual clock.
pub struct Session {
    pub ctx: Arc<SimContext>,
    pub trains: Vec<Train<SimContext>>,
    pub concourse: Concourse<SimContext>,

    /// Recorded lifecycle events, in emission order
    pub events: Vec<MetroEvent>,

    config: SimConfig,
    dwell_until: Vec<Duration>,
    arrivals: broadcast::Receiver<StationSignal>,
    departures: broadcast::Receiver<StationSignal>,
    events_rx: mpsc::Receiver<MetroEvent>,
    sink: EventSink,
    next_spawn: Option<Duration>,
    next_sentiment: Option<Duration>,
    ticks: u64,
}

impl Session {
    pub fn new(world: &SimWorld) -> Self {
        let config = world.config.clone();
        let ctx = SimContext::shared(config.seed);
        let signals = TrainSignals::new(config.signal_capacity);
        let (sink, events_rx) = EventSink::channel(config.event_capacity);

        let arrivals = signals.subscribe_arrivals();
        let departures = signals.subscribe_departures();
        let (trains, concourse) = world.populate(&ctx, &signals, &sink);

        let deadline = |interval: Duration| (!interval.is_zero()).then_some(interval);
        let mut session = Self {
            dwell_until: vec![Duration::ZERO; trains.len()],
            next_spawn: deadline(config.spawn_interval),
            next_sentiment: deadline(config.sentiment_interval),
            ctx,
            trains,
            concourse,
            events: Vec::new(),
            config,
            arrivals,
            departures,
            events_rx,
            sink,
            ticks: 0,
        };
        session.collect_events();
        session
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn now(&self) -> Duration {
        self.ctx.now()
    }

    /// Advances the world by one loop period.
    pub fn step(&mut self) -> Vec<TrainStep> {
        self.ctx.advance_time(self.config.loop_duration);
        let now = self.ctx.now();

        let mut steps = Vec::with_capacity(self.trains.len());
        for (train, until) in self.trains.iter_mut().zip(self.dwell_until.iter_mut()) {
            if now < *until {
                continue;
            }
            let step = train.update();
            if let TrainStep::Arrived(_) = step {
                *until = now + self.config.dwell;
            }
            steps.push(step);
        }

        while let Ok(signal) = self.departures.try_recv() {
            self.concourse.on_departure(&signal);
        }
        while let Ok(signal) = self.arrivals.try_recv() {
            self.concourse.on_arrival(&signal);
        }

        while let Some(at) = self.next_spawn.filter(|at| *at <= now) {
            self.concourse.spawn_tick();
            self.next_spawn = at.checked_add(self.config.spawn_interval);
        }
        while let Some(at) = self.next_sentiment.filter(|at| *at <= now) {
            self.concourse.sentiment_tick();
            self.next_sentiment = at.checked_add(self.config.sentiment_interval);
        }

        self.collect_events();
        self.ticks += 1;
        steps
    }

    /// Steps until `until` of virtual time has elapsed.
    pub fn run_for(&mut self, until: Duration) {
        while self.ctx.now() < until {
            self.step();
        }
    }

    fn collect_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.events.push(event);
        }
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.events.iter().filter(|e| e.kind() == kind).count() as u64
    }

    pub fn metrics(&self) -> ScenarioMetrics {
        let stats = self.concourse.stats();
        ScenarioMetrics {
            departures: self.count("train_departure"),
            arrivals: self.count("train_arrival"),
            train_errors: self.count("train_error"),
            spawned: stats.spawned,
            boarded: stats.boarded,
            delivered: stats.delivered,
            refused_full: stats.refused_full,
            frustrated: self.count("passenger_frustration"),
            events_dropped: self.sink.dropped(),
            mean_sentiment: stats.mean_sentiment,
        }
    }
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Base configuration, adjusted per scenario
    config: SimConfig,

    /// Maximum duration in seconds
    max_duration_secs: f64,

    /// Replaces the demo network where a scenario uses it
    layout: Option<WorldLayout>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: SimConfig {
                seed,
                train_logs: false,
                ..SimConfig::default()
            },
            max_duration_secs: 60.0,
            layout: None,
        }
    }

    /// Sets the base configuration. The runner's seed wins.
    pub fn with_config(mut self, config: SimConfig) -> Self {
        self.config = SimConfig {
            seed: self.seed,
            ..config
        };
        self
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Uses `layout` instead of the built-in demo network.
    pub fn with_layout(mut self, layout: WorldLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_recorded(scenario).0
    }

    /// Runs a scenario and also hands back every recorded event.
    pub fn run_recorded(&self, scenario: ScenarioId) -> (ScenarioResult, Vec<MetroEvent>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let duration = self.max_duration_secs.max(scenario.min_duration_secs());
        let outcome = match scenario {
            ScenarioId::Shuttle => self.run_shuttle(duration),
            ScenarioId::Demo => self.run_demo(duration),
            ScenarioId::Stranded => self.run_stranded(duration),
            ScenarioId::Rush => self.run_rush(duration),
        };

        match outcome {
            Ok((session, failure)) => {
                let result = ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: failure.is_none(),
                    total_ticks: session.ticks(),
                    final_time_secs: session.now().as_secs_f64(),
                    failure_reason: failure,
                    metrics: session.metrics(),
                };
                debug!(metrics = ?result.metrics, "scenario finished");
                (result, session.events)
            }
            Err(err) => (ScenarioResult::failed(scenario, self.seed, err.to_string()), Vec::new()),
        }
    }

    fn world(&self, config: SimConfig, layout: &WorldLayout) -> Result<SimWorld, SimError> {
        SimWorld::new(config, layout)
    }

    fn demo_layout(&self) -> WorldLayout {
        self.layout.clone().unwrap_or_else(WorldLayout::demo)
    }

    /// MS-001: first trip of a single train.
    fn run_shuttle(&self, duration: f64) -> Result<(Session, Option<String>), SimError> {
        let config = SimConfig {
            initial_passengers_per_station: 0,
            spawn_interval: Duration::ZERO,
            ..self.config.clone()
        };
        let world = self.world(config, &WorldLayout::shuttle())?;
        let mut session = Session::new(&world);

        let limit = Duration::from_secs_f64(duration.max(1.0));
        let mut arrived = None;
        while arrived.is_none() && session.now() < limit {
            arrived = session.step().into_iter().find_map(|step| match step {
                TrainStep::Arrived(id) => Some(id),
                _ => None,
            });
        }

        let train = &session.trains[0];
        let failure = if arrived != Some(StationId(2)) {
            Some(format!("train never reached S2 within {:.1}s", duration))
        } else if session.count("train_departure") != 1 || session.count("train_arrival") != 1 {
            Some(format!(
                "expected one departure and one arrival, saw {} and {}",
                session.count("train_departure"),
                session.count("train_arrival")
            ))
        } else if train.velocity() != Vector::ZERO || train.next().is_some() {
            Some("train still moving after arrival".to_string())
        } else {
            None
        };
        Ok((session, failure))
    }

    /// MS-002: the demo world end to end.
    fn run_demo(&self, duration: f64) -> Result<(Session, Option<String>), SimError> {
        let world = self.world(self.config.clone(), &self.demo_layout())?;
        let mut session = Session::new(&world);
        session.run_for(Duration::from_secs_f64(duration));

        let metrics = session.metrics();
        let failure = if metrics.train_errors > 0 {
            Some(format!("{} train errors", metrics.train_errors))
        } else if metrics.departures < world.train_count() as u64 {
            Some(format!(
                "only {} departures for {} trains",
                metrics.departures,
                world.train_count()
            ))
        } else if session
            .concourse
            .passengers()
            .any(|p| !(0.0..=100.0).contains(&p.sentiment()))
        {
            Some("sentiment out of range".to_string())
        } else {
            None
        };
        Ok((session, failure))
    }

    /// MS-003: passengers stuck at a line nobody drives.
    fn run_stranded(&self, duration: f64) -> Result<(Session, Option<String>), SimError> {
        let layout = WorldLayout {
            stations: vec![
                StationSpec { id: 1, name: "S1".to_string(), x: 0.0, y: 0.0 },
                StationSpec { id: 2, name: "S2".to_string(), x: 100.0, y: 0.0 },
            ],
            edges: vec![EdgeSpec { from: 1, to: 2, waypoints: Vec::new() }],
            lines: vec![LineSpec { id: 1, name: "Ghost".to_string(), stations: vec![1, 2] }],
            ..WorldLayout::default()
        };
        let config = SimConfig {
            spawn_interval: Duration::ZERO,
            ..self.config.clone()
        };
        let world = self.world(config, &layout)?;
        let mut session = Session::new(&world);
        session.run_for(Duration::from_secs_f64(duration));

        let waited = session.now().as_secs() / 5;
        let expected = (100.0 - 2.0 * waited as f64).max(0.0);

        let mut frustration_per_passenger: BTreeMap<&str, u32> = BTreeMap::new();
        for event in &session.events {
            if let MetroEvent::PassengerFrustration { passenger_id, .. } = event {
                *frustration_per_passenger.entry(passenger_id.as_str()).or_default() += 1;
            }
        }

        let passengers: Vec<_> = session.concourse.passengers().collect();
        let failure = if let Some(p) = passengers.iter().find(|p| p.sentiment() != expected) {
            Some(format!("{} has sentiment {} instead of {}", p.id, p.sentiment(), expected))
        } else if expected < 50.0 && frustration_per_passenger.len() != passengers.len() {
            Some(format!(
                "{} of {} passengers reported frustration",
                frustration_per_passenger.len(),
                passengers.len()
            ))
        } else if frustration_per_passenger.values().any(|n| *n != 1) {
            Some("frustration reported more than once".to_string())
        } else {
            None
        };
        Ok((session, failure))
    }

    /// MS-004: small trains, heavy spawning.
    fn run_rush(&self, duration: f64) -> Result<(Session, Option<String>), SimError> {
        let mut layout = self.demo_layout();
        for make in &mut layout.makes {
            make.capacity = 4;
        }
        let config = SimConfig {
            spawn_interval: Duration::from_millis(250),
            ..self.config.clone()
        };
        let world = self.world(config, &layout)?;
        let mut session = Session::new(&world);
        session.run_for(Duration::from_secs_f64(duration));

        let over = session
            .trains
            .iter()
            .find(|t| session.concourse.riding_on(t.name()) > t.load().capacity());
        let failure = match over {
            Some(train) => Some(format!("{} is over capacity", train.name())),
            None if session.count("train_error") > 0 => Some("train errors during rush".to_string()),
            None => None,
        };
        Ok((session, failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shuttle_scenario_passes() {
        let result = ScenarioRunner::new(42).run(ScenarioId::Shuttle);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.departures, 1);
        assert_eq!(result.metrics.arrivals, 1);
        // 28 ticks of motion at 20ms
        assert_eq!(result.total_ticks, 28);
    }

    #[test]
    fn test_stranded_scenario_passes() {
        let result = ScenarioRunner::new(7).with_duration(180.0).run(ScenarioId::Stranded);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.spawned, 6);
        assert_eq!(result.metrics.frustrated, 6);
        assert_eq!(result.metrics.mean_sentiment, 28.0);
    }

    #[test]
    fn test_demo_scenario_passes() {
        let result = ScenarioRunner::new(42).with_duration(30.0).run(ScenarioId::Demo);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.spawned >= 30);
        assert_eq!(result.metrics.train_errors, 0);
    }

    #[test]
    fn test_rush_respects_capacity() {
        let result = ScenarioRunner::new(3).with_duration(20.0).run(ScenarioId::Rush);
        assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn test_same_seed_same_run() {
        let runner = ScenarioRunner::new(99).with_duration(15.0);
        let (a, events_a) = runner.run_recorded(ScenarioId::Demo);
        let (b, events_b) = runner.run_recorded(ScenarioId::Demo);

        assert_eq!(a.metrics, b.metrics);
        assert_eq!(events_a, events_b);
    }

    #[test]
    fn test_session_dwells_after_arrival() {
        let config = SimConfig {
            train_logs: false,
            initial_passengers_per_station: 0,
            ..SimConfig::default()
        };
        let world = SimWorld::new(config, &WorldLayout::shuttle()).unwrap();
        let mut session = Session::new(&world);

        while !session.step().iter().any(|s| matches!(s, TrainStep::Arrived(_))) {}
        let arrived_at = session.now();

        // No train update at all during the 3s dwell
        let step = Duration::from_millis(20);
        while session.now() + step < arrived_at + Duration::from_secs(3) {
            assert!(session.step().is_empty());
        }
        let steps = session.step();
        assert_eq!(steps.len(), 1);
        assert_eq!(session.count("train_departure"), 2);
    }
}
