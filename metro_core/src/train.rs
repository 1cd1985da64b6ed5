//! Train actor: line patrol state machine plus waypoint-following motion.
//!
//! A train is either idle at `current` (no `next`) or en route with a
//! non-empty waypoint queue. Each [`Train::update`] advances it one tick:
//!
//! 1. **Assign**: with no `next`, walk the line in the current direction,
//!    reversing at either terminus, and load the edge waypoints plus the
//!    next station's own position into the queue.
//! 2. **Steer**: accelerate toward the head waypoint, easing off linearly
//!    inside the last eighth of the approach.
//! 3. **Integrate**: clamp to top speed and move.
//! 4. **Arrive**: within [`TrainConfig::arrival_radius`] of a waypoint the
//!    train stops dead; once the queue drains `current` becomes `next`.
//!
//! Departures and arrivals go out twice: as a [`StationSignal`] on the
//! [`TrainSignals`] broadcast and as a [`MetroEvent`] on the lifecycle sink.

use crate::events::{EventSink, MetroEvent, StationSignal, TrainSignals};
use crate::network::{NetworkError, StationNetwork};
use crate::queue::Queue;
use crate::station::{Line, LineId, Station, StationId};
use crate::vector::{map_range, Vector};
use metro_env::{MetroContext, TickInbox};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Hard replay cap for [`Train::estimate_ticks`], per waypoint.
const MAX_ESTIMATE_TICKS: u64 = 100_000;

/// Multiplier and floor applied to the ideal leg time when bounding a replay.
const ESTIMATE_SLACK: f64 = 4.0;
const ESTIMATE_FLOOR: u64 = 64;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrainError {
    #[error("Line {line} has no station to move to from {station}")]
    NoAssignment { line: String, station: String },

    #[error("Route lookup failed: {0}")]
    Route(#[from] NetworkError),

    #[error("No pending waypoint while en route to {0}")]
    EmptyQueue(String),
}

/// Rolling stock model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Make {
    pub name: String,
    pub description: String,

    /// Acceleration applied per tick
    pub acc_mag: f64,

    /// Speed cap, units per tick
    pub top_speed: f64,

    /// Passenger capacity
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    100
}

impl Make {
    pub fn new(name: impl Into<String>, description: impl Into<String>, acc_mag: f64, top_speed: f64) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            acc_mag,
            top_speed,
            capacity: default_capacity(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// Occupancy counter shared between a train and the passengers aboard.
#[derive(Debug)]
pub struct TrainLoad {
    capacity: usize,
    riders: AtomicUsize,

    /// Fraction of capacity at which the train counts as crowded, as f64 bits
    crowding_ratio: AtomicU64,
}

impl TrainLoad {
    pub fn new(capacity: usize, crowding_ratio: f64) -> Self {
        Self {
            capacity,
            riders: AtomicUsize::new(0),
            crowding_ratio: AtomicU64::new(crowding_ratio.to_bits()),
        }
    }

    pub fn crowding_ratio(&self) -> f64 {
        f64::from_bits(self.crowding_ratio.load(Ordering::Acquire))
    }

    pub fn set_crowding_ratio(&self, ratio: f64) {
        self.crowding_ratio.store(ratio.to_bits(), Ordering::Release);
    }

    /// Takes a seat if one is free.
    pub fn board(&self) -> bool {
        self.riders
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }

    pub fn alight(&self) {
        let _ = self
            .riders
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)));
    }

    pub fn riders(&self) -> usize {
        self.riders.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn has_room(&self) -> bool {
        self.riders() < self.capacity
    }

    pub fn is_crowded(&self) -> bool {
        self.capacity > 0 && self.riders() as f64 >= self.capacity as f64 * self.crowding_ratio()
    }
}

/// Passenger-facing reference to a train. Does not own the train.
#[derive(Debug, Clone)]
pub struct TrainHandle {
    pub name: String,
    pub line_id: LineId,
    pub load: Arc<TrainLoad>,
}

impl TrainHandle {
    pub fn is_crowded(&self) -> bool {
        self.load.is_crowded()
    }
}

/// Tunables for a single train.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Hold time at a station after arriving
    pub dwell: Duration,

    /// Emit a `train_tick` event every N updates (0 disables)
    pub tick_event_every: u64,

    /// Log arrivals and departures at info level
    pub train_logs: bool,

    /// Distance at which a waypoint counts as reached
    pub arrival_radius: f64,

    /// Tick period, used to turn tick estimates into seconds
    pub tick_interval: Duration,

    pub crowding_ratio: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dwell: Duration::from_secs(3),
            tick_event_every: 60,
            train_logs: true,
            arrival_radius: 1.0,
            tick_interval: Duration::from_millis(20),
            crowding_ratio: 0.8,
        }
    }
}

/// Construction inputs for one train.
#[derive(Debug, Clone)]
pub struct TrainAssignment {
    pub name: String,
    pub make: Make,
    pub position: Vector,
    pub station: Arc<Station>,
    pub line: Line,
}

/// Point-in-time copy of a train, carried by station signals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainSnapshot {
    pub name: String,
    pub line_id: LineId,
    pub position: Vector,
    pub velocity: Vector,
    pub current: StationId,
    pub next: Option<StationId>,
    pub forward: bool,
    pub passengers: usize,
    pub capacity: usize,
}

/// Outcome of one [`Train::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainStep {
    /// Still travelling toward the head waypoint
    Moving,

    /// An intermediate waypoint was reached
    WaypointReached,

    /// The queue drained at this station; the driver should dwell
    Arrived(StationId),

    /// The tick was abandoned after an error
    Stalled,
}

pub struct Train<C: MetroContext> {
    name: String,
    make: Make,
    position: Vector,
    velocity: Vector,

    /// Last confirmed station, by value
    current: Station,
    next: Option<Station>,
    forward: bool,
    line: Line,
    pending: Queue<Vector>,

    network: Arc<StationNetwork>,
    signals: TrainSignals,
    events: EventSink,
    load: Arc<TrainLoad>,
    config: TrainConfig,
    ticks: u64,
    ctx: Arc<C>,
}

impl<C: MetroContext> Train<C> {
    pub fn new(ctx: Arc<C>, assignment: TrainAssignment, network: Arc<StationNetwork>) -> Self {
        let config = TrainConfig::default();
        let load = Arc::new(TrainLoad::new(assignment.make.capacity, config.crowding_ratio));

        Self {
            name: assignment.name,
            make: assignment.make,
            position: assignment.position,
            velocity: Vector::ZERO,
            current: (*assignment.station).clone(),
            next: None,
            forward: true,
            line: assignment.line,
            pending: Queue::new(),
            network,
            signals: TrainSignals::default(),
            events: EventSink::disabled(),
            load,
            config,
            ticks: 0,
            ctx,
        }
    }

    pub fn with_config(mut self, config: TrainConfig) -> Self {
        // Handles already taken keep pointing at the same load
        self.load.set_crowding_ratio(config.crowding_ratio);
        self.config = config;
        self
    }

    pub fn with_signals(mut self, signals: TrainSignals) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Vector {
        self.position
    }

    pub fn velocity(&self) -> Vector {
        self.velocity
    }

    pub fn current(&self) -> &Station {
        &self.current
    }

    pub fn next(&self) -> Option<&Station> {
        self.next.as_ref()
    }

    pub fn is_forward(&self) -> bool {
        self.forward
    }

    pub fn line(&self) -> &Line {
        &self.line
    }

    pub fn pending(&self) -> &Queue<Vector> {
        &self.pending
    }

    pub fn load(&self) -> &Arc<TrainLoad> {
        &self.load
    }

    pub fn handle(&self) -> TrainHandle {
        TrainHandle {
            name: self.name.clone(),
            line_id: self.line.id,
            load: Arc::clone(&self.load),
        }
    }

    pub fn snapshot(&self) -> TrainSnapshot {
        TrainSnapshot {
            name: self.name.clone(),
            line_id: self.line.id,
            position: self.position,
            velocity: self.velocity,
            current: self.current.id,
            next: self.next.as_ref().map(|s| s.id),
            forward: self.forward,
            passengers: self.load.riders(),
            capacity: self.load.capacity(),
        }
    }

    /// Moves the train onto another line. Any trip in progress is dropped
    /// and the next assignment starts from `current`.
    pub fn assign_line(&mut self, line: Line) {
        self.line = line;
        self.next = None;
        self.pending.clear();
        self.velocity = Vector::ZERO;
    }

    /// Advances the train one tick.
    ///
    /// Failures are logged, reported as `train_error` and abandon the tick;
    /// the next call starts over.
    pub fn update(&mut self) -> TrainStep {
        match self.step() {
            Ok(step) => step,
            Err(err) => {
                let context = match &err {
                    TrainError::EmptyQueue(_) => "steering",
                    _ => "assigning next station",
                };
                warn!(train = %self.name, station = %self.current.name, "{}", err);
                self.events.emit(MetroEvent::TrainError {
                    timestamp_ms: self.ctx.timestamp_ms(),
                    train_name: self.name.clone(),
                    error: err.to_string(),
                    context: context.to_string(),
                });
                TrainStep::Stalled
            }
        }
    }

    fn step(&mut self) -> Result<TrainStep, TrainError> {
        if self.next.is_none() {
            self.depart()?;
        }

        let target = match self.pending.peek() {
            Some(target) => *target,
            None => {
                let next = self.next.as_ref().map(|s| s.name.clone()).unwrap_or_default();
                return Err(TrainError::EmptyQueue(next));
            }
        };

        let desired = self.steer(&self.position, &self.velocity, &target);
        self.velocity = desired;
        self.position.add(&self.velocity);

        self.ticks += 1;
        if self.config.tick_event_every > 0 && self.ticks % self.config.tick_event_every == 0 {
            self.emit_tick();
        }

        if self.position.dist(&target) > self.config.arrival_radius {
            return Ok(TrainStep::Moving);
        }

        self.pending.pop();
        self.velocity = Vector::ZERO;
        if !self.pending.is_empty() {
            return Ok(TrainStep::WaypointReached);
        }

        Ok(TrainStep::Arrived(self.arrive()))
    }

    /// Velocity after one tick of steering toward `target`.
    fn steer(&self, position: &Vector, velocity: &Vector, target: &Vector) -> Vector {
        let mut desired = target.soft_sub(position);
        let remaining = desired.magnitude();
        let threshold = self.current.position.dist(target) / 8.0;

        if remaining < threshold {
            desired.set_mag(map_range(remaining, 0.0, threshold, 0.0, self.make.acc_mag));
        } else {
            desired.set_mag(self.make.acc_mag);
        }

        let mut next = *velocity;
        next.add(&desired);
        next.limit(self.make.top_speed);
        next
    }

    /// Picks the next station and direction without committing either.
    fn choose_next(&self) -> Result<(Arc<Station>, bool), TrainError> {
        let stations = &self.line.stations;
        let no_assignment = || TrainError::NoAssignment {
            line: self.line.name.clone(),
            station: self.current.name.clone(),
        };

        let Some(index) = self.line.index_of(self.current.id) else {
            // Moved to a line that does not serve the current station
            return self
                .line
                .first()
                .map(|first| (Arc::clone(first), self.forward))
                .ok_or_else(no_assignment);
        };

        if stations.len() < 2 {
            return Err(no_assignment());
        }

        let (index, forward) = match (self.forward, index) {
            (true, i) if i == stations.len() - 1 => (i - 1, false),
            (true, i) => (i + 1, true),
            (false, 0) => (1, true),
            (false, i) => (i - 1, false),
        };
        Ok((Arc::clone(&stations[index]), forward))
    }

    fn depart(&mut self) -> Result<(), TrainError> {
        let (next, forward) = self.choose_next()?;

        let mut path = self.network.waypoints(&self.current.id, &next.id)?.to_vec();
        path.push(next.position);

        let ticks = self.estimate_ticks(&path);
        let eta = self.config.tick_interval.as_secs_f64() * ticks as f64;

        self.pending.clear();
        self.pending.extend(path);
        self.forward = forward;
        self.next = Some((*next).clone());

        if self.config.train_logs {
            info!("{} is going to {}, it will arrive in {:.1} seconds", self.name, next.name, eta);
        } else {
            debug!(train = %self.name, next = %next.name, eta, "departing");
        }

        self.signals.announce_departure(StationSignal {
            station_id: self.current.id,
            train: self.snapshot(),
        });
        self.events.emit(MetroEvent::TrainDeparture {
            timestamp_ms: self.ctx.timestamp_ms(),
            train_name: self.name.clone(),
            line_id: self.line.id,
            station_id: self.current.id,
            station_name: self.current.name.clone(),
            next_station_id: next.id,
            next_station_name: next.name.clone(),
            position: self.position,
            eta_secs: eta,
        });
        Ok(())
    }

    fn arrive(&mut self) -> StationId {
        if let Some(next) = self.next.take() {
            self.current = next;
        }

        if self.config.train_logs {
            info!("{} arrived at: {}", self.name, self.current.name);
        }

        self.signals.announce_arrival(StationSignal {
            station_id: self.current.id,
            train: self.snapshot(),
        });
        self.events.emit(MetroEvent::TrainArrival {
            timestamp_ms: self.ctx.timestamp_ms(),
            train_name: self.name.clone(),
            line_id: self.line.id,
            station_id: self.current.id,
            station_name: self.current.name.clone(),
            position: self.position,
        });
        self.current.id
    }

    fn emit_tick(&self) {
        debug!(train = %self.name, position = %self.position, "tick {}", self.ticks);
        self.events.emit(MetroEvent::TrainTick {
            timestamp_ms: self.ctx.timestamp_ms(),
            train_name: self.name.clone(),
            position: self.position,
            velocity: self.velocity,
            speed: self.velocity.magnitude(),
            current_station_id: self.current.id,
            next_station_id: self.next.as_ref().map(|s| s.id),
        });
    }

    /// Number of ticks the motion model needs to walk `path` from the
    /// current position, stopping at every waypoint.
    pub fn estimate_ticks(&self, path: &[Vector]) -> u64 {
        let mut position = self.position;
        let mut velocity = Vector::ZERO;
        let mut ticks = 0;

        for target in path {
            let budget = self.estimate_budget(position.dist(target));
            let mut spent = 0;
            while position.dist(target) > self.config.arrival_radius {
                if spent >= budget {
                    warn!(train = %self.name, target = %target, "travel estimate gave up after {} ticks", budget);
                    break;
                }
                velocity = self.steer(&position, &velocity, target);
                position.add(&velocity);
                spent += 1;
            }
            ticks += spent;
            velocity = Vector::ZERO;
        }
        ticks
    }

    /// Replay budget for one leg: a multiple of the time to reach top
    /// speed and cover `leg` at it.
    fn estimate_budget(&self, leg: f64) -> u64 {
        let (acc, top) = (self.make.acc_mag, self.make.top_speed);
        if acc <= 0.0 || top <= 0.0 {
            return 0;
        }
        let ideal = leg / top + top / acc;
        if !ideal.is_finite() {
            return MAX_ESTIMATE_TICKS;
        }
        ((ideal * ESTIMATE_SLACK) as u64)
            .saturating_add(ESTIMATE_FLOOR)
            .min(MAX_ESTIMATE_TICKS)
    }

    /// Drives the train from a ticker inbox until the ticker stops.
    pub async fn run(mut self, mut inbox: TickInbox) {
        debug!(train = %self.name, line = %self.line.name, "train task started");

        while inbox.recv().await.is_some() {
            if let TrainStep::Arrived(_) = self.update() {
                // Ticks fired during the dwell are dropped at the inbox
                tokio::select! {
                    _ = self.ctx.sleep(self.config.dwell) => {}
                    _ = inbox.closed() => break,
                }
            }
        }

        debug!(train = %self.name, "train task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;
    use approx::assert_relative_eq;
    use metro_env::{Ticker, TickerState, TokioContext};

    fn station(id: i64, x: f64, y: f64) -> Arc<Station> {
        Arc::new(Station::new(id, format!("S{}", id), Vector::new(x, y)))
    }

    fn quiet() -> TrainConfig {
        TrainConfig {
            train_logs: false,
            ..TrainConfig::default()
        }
    }

    /// S1(0,0) <-> S2(100,0) with a single waypoint at (50,0).
    fn two_stop_world() -> (Arc<StationNetwork>, Line, Arc<Station>, Arc<Station>) {
        let s1 = station(1, 0.0, 0.0);
        let s2 = station(2, 100.0, 0.0);
        let mut net = Network::new(Station::key);
        net.insert_vertices([s1.clone(), s2.clone()]).unwrap();
        net.insert_edge(&s1, &s2, vec![Vector::new(50.0, 0.0)]).unwrap();
        let line = Line::new(1, "Blue", vec![s1.clone(), s2.clone()]);
        (Arc::new(net), line, s1, s2)
    }

    fn train_at(
        station: &Arc<Station>,
        line: Line,
        network: Arc<StationNetwork>,
        acc_mag: f64,
        top_speed: f64,
    ) -> Train<TokioContext> {
        let assignment = TrainAssignment {
            name: "Tren 1".to_string(),
            make: Make::new("Test", "test make", acc_mag, top_speed),
            position: station.position,
            station: Arc::clone(station),
            line,
        };
        Train::new(TokioContext::shared(), assignment, network).with_config(quiet())
    }

    fn drive_until_arrival(train: &mut Train<TokioContext>, limit: usize) -> Option<StationId> {
        for _ in 0..limit {
            if let TrainStep::Arrived(id) = train.update() {
                return Some(id);
            }
        }
        None
    }

    #[tokio::test]
    async fn test_two_station_trip() {
        let (net, line, s1, s2) = two_stop_world();
        let signals = TrainSignals::new(16);
        let mut arrivals = signals.subscribe_arrivals();
        let mut departures = signals.subscribe_departures();
        let (sink, mut events) = EventSink::channel(64);

        let mut train = train_at(&s1, line, net, 1.0, 4.0)
            .with_signals(signals)
            .with_events(sink);

        let arrived = drive_until_arrival(&mut train, 1000);
        assert_eq!(arrived, Some(s2.id));
        assert_eq!(train.current().id, s2.id);
        assert!(train.next().is_none());
        assert!(train.pending().is_empty());
        assert_eq!(train.velocity(), Vector::ZERO);
        assert!(train.position().close_to(100.0, 0.0, 1.0));

        let departure = departures.try_recv().unwrap();
        assert_eq!(departure.station_id, s1.id);
        assert!(departures.try_recv().is_err());

        let arrival = arrivals.try_recv().unwrap();
        assert_eq!(arrival.station_id, s2.id);
        assert_eq!(arrival.train.velocity, Vector::ZERO);
        assert!(arrivals.try_recv().is_err());

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.kind());
        }
        assert_eq!(kinds, vec!["train_departure", "train_arrival"]);
    }

    #[tokio::test]
    async fn test_reverses_at_terminus() {
        let (net, line, s1, s2) = two_stop_world();
        let mut train = train_at(&s1, line, net, 1.0, 4.0);

        assert_eq!(drive_until_arrival(&mut train, 1000), Some(s2.id));
        assert!(train.is_forward());

        // Drained at the last station: the next tick turns around
        train.update();
        assert_eq!(train.next().map(|s| s.id), Some(s1.id));
        assert!(!train.is_forward());

        assert_eq!(drive_until_arrival(&mut train, 1000), Some(s1.id));
        train.update();
        assert_eq!(train.next().map(|s| s.id), Some(s2.id));
        assert!(train.is_forward());
    }

    #[tokio::test]
    async fn test_walks_middle_stations_in_order() {
        let a = station(1, 0.0, 0.0);
        let b = station(2, 20.0, 0.0);
        let c = station(3, 40.0, 0.0);
        let mut net = Network::new(Station::key);
        net.insert_vertices([a.clone(), b.clone(), c.clone()]).unwrap();
        net.insert_edge(&a, &b, vec![]).unwrap();
        net.insert_edge(&b, &c, vec![]).unwrap();
        let line = Line::new(1, "Red", vec![a.clone(), b.clone(), c.clone()]);

        let mut train = train_at(&a, line, Arc::new(net), 0.5, 2.0);
        let visited: Vec<_> = (0..4)
            .map(|_| drive_until_arrival(&mut train, 1000).unwrap())
            .collect();
        assert_eq!(visited, vec![b.id, c.id, b.id, a.id]);
    }

    #[tokio::test]
    async fn test_single_station_line_stalls() {
        let s1 = station(1, 0.0, 0.0);
        let mut net = Network::new(Station::key);
        net.insert_vertex(s1.clone()).unwrap();
        let line = Line::new(1, "Stub", vec![s1.clone()]);
        let (sink, mut events) = EventSink::channel(8);

        let mut train = train_at(&s1, line, Arc::new(net), 1.0, 4.0).with_events(sink);
        assert_eq!(train.update(), TrainStep::Stalled);
        assert!(train.next().is_none());
        assert_eq!(train.position(), s1.position);
        assert_eq!(events.try_recv().unwrap().kind(), "train_error");
    }

    #[tokio::test]
    async fn test_missing_edge_abandons_tick() {
        let s1 = station(1, 0.0, 0.0);
        let s2 = station(2, 10.0, 0.0);
        let mut net = Network::new(Station::key);
        net.insert_vertices([s1.clone(), s2.clone()]).unwrap();
        let line = Line::new(1, "Broken", vec![s1.clone(), s2.clone()]);

        let mut train = train_at(&s1, line, Arc::new(net), 1.0, 4.0);
        assert_eq!(train.update(), TrainStep::Stalled);
        assert!(train.next().is_none());
        assert!(train.is_forward());
        assert!(train.pending().is_empty());
    }

    #[tokio::test]
    async fn test_reassigned_line_targets_first_station() {
        let (net, line, s1, s2) = two_stop_world();
        let mut train = train_at(&s1, line, net, 1.0, 4.0);
        train.update();
        assert_eq!(train.next().map(|s| s.id), Some(s2.id));

        // S1 is not served by the new line, so the train heads to its first stop
        train.assign_line(Line::new(2, "Shuttle", vec![s2.clone()]));
        assert!(train.next().is_none());
        assert_eq!(train.current().id, s1.id);
        train.update();
        assert_eq!(train.next().map(|s| s.id), Some(s2.id));
    }

    #[tokio::test]
    async fn test_estimate_matches_motion() {
        let (net, line, s1, _s2) = two_stop_world();
        let mut train = train_at(&s1, line, net, 1.0, 4.0);
        let path = vec![Vector::new(50.0, 0.0), Vector::new(100.0, 0.0)];
        let estimate = train.estimate_ticks(&path);

        let mut ticks = 0;
        while !matches!(train.update(), TrainStep::Arrived(_)) {
            ticks += 1;
        }
        assert_eq!(estimate, ticks + 1);
    }

    #[tokio::test]
    async fn test_tick_events_are_periodic() {
        let (net, line, s1, _s2) = two_stop_world();
        let (sink, mut events) = EventSink::channel(64);
        let config = TrainConfig {
            tick_event_every: 5,
            ..quiet()
        };
        let mut train = train_at(&s1, line, net, 1.0, 4.0)
            .with_config(config)
            .with_events(sink);

        for _ in 0..10 {
            train.update();
        }
        let ticks: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| e.kind() == "train_tick")
            .collect();
        assert_eq!(ticks.len(), 2);
        if let MetroEvent::TrainTick { speed, velocity, .. } = &ticks[0] {
            assert_relative_eq!(*speed, velocity.magnitude());
        }
    }

    #[tokio::test]
    async fn test_estimate_gives_up_on_unsettled_motion() {
        let s1 = station(1, 0.0, 0.0);
        let s2 = station(2, 10.0, 0.0);
        let mut net = Network::new(Station::key);
        net.insert_vertices([s1.clone(), s2.clone()]).unwrap();
        net.insert_edge(&s1, &s2, vec![]).unwrap();
        let line = Line::new(1, "Jumpy", vec![s1.clone(), s2.clone()]);

        // Overshoots by 5 every tick and never lands within the radius
        let train = train_at(&s1, line, Arc::new(net), 5.0, 10.0);
        let estimate = train.estimate_ticks(&[s2.position]);
        assert!(estimate > 0);
        assert!(estimate <= 76);
    }

    #[tokio::test]
    async fn test_handle_survives_reconfiguration() {
        let (net, line, s1, _s2) = two_stop_world();
        let train = train_at(&s1, line, net, 1.0, 4.0);
        let handle = train.handle();

        let train = train.with_config(TrainConfig {
            crowding_ratio: 0.5,
            ..quiet()
        });
        assert!(Arc::ptr_eq(&handle.load, train.load()));
        assert!(handle.load.board());
        assert_eq!(train.snapshot().passengers, 1);
        assert_relative_eq!(train.load().crowding_ratio(), 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_dwell() {
        let (net, line, s1, s2) = two_stop_world();
        let signals = TrainSignals::new(16);
        let mut arrivals = signals.subscribe_arrivals();
        let config = TrainConfig {
            dwell: Duration::from_secs(60),
            ..quiet()
        };
        let train = train_at(&s1, line, net, 1.0, 4.0)
            .with_config(config)
            .with_signals(signals);

        let ticker = Ticker::new(Duration::from_millis(20), TickerState::Running);
        let task = tokio::spawn(train.run(ticker.subscribe()));

        assert_eq!(arrivals.recv().await.unwrap().station_id, s2.id);
        let stopped_at = tokio::time::Instant::now();
        ticker.stop();

        task.await.unwrap();
        assert!(stopped_at.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_train_load() {
        let load = TrainLoad::new(2, 0.5);
        assert!(!load.is_crowded());
        assert!(load.board());
        assert!(load.is_crowded());
        assert!(load.board());
        assert!(!load.board());
        assert!(!load.has_room());

        load.alight();
        load.alight();
        load.alight();
        assert_eq!(load.riders(), 0);
    }
}
