//! The passenger concourse: owner of every passenger in the world.
//!
//! The concourse reacts to train arrivals (alighting riders at their
//! destination, boarding waiting passengers whose destination the train's
//! line serves), runs the periodic spawn trigger and the sentiment sweep.
//! [`StationBoard`] tracks which trains are standing at which station from
//! the same arrival/departure broadcast.

use crate::spawner::PassengerSpawner;
use metro_core::{
    Line, LineId, Passenger, PassengerError, PassengerState, Station, StationId, StationSignal,
    TrainHandle,
};
use metro_env::MetroContext;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Trains currently standing at each station.
#[derive(Debug, Clone, Default)]
pub struct StationBoard {
    present: BTreeMap<StationId, BTreeSet<String>>,
}

impl StationBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_arrival(&mut self, signal: &StationSignal) {
        self.present
            .entry(signal.station_id)
            .or_default()
            .insert(signal.train.name.clone());
    }

    pub fn record_departure(&mut self, signal: &StationSignal) {
        if let Some(trains) = self.present.get_mut(&signal.station_id) {
            trains.remove(&signal.train.name);
        }
    }

    pub fn trains_at(&self, station: StationId) -> Vec<&str> {
        self.present
            .get(&station)
            .map(|trains| trains.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn occupancy(&self, station: StationId) -> usize {
        self.present.get(&station).map(BTreeSet::len).unwrap_or(0)
    }
}

/// Running totals kept by the concourse.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConcourseStats {
    pub spawned: u64,
    pub boarded: u64,
    pub refused_full: u64,
    pub delivered: u64,
    pub waiting: usize,
    pub riding: usize,

    /// Mean sentiment of passengers still travelling
    pub mean_sentiment: f64,
}

pub struct Concourse<C: MetroContext> {
    spawner: PassengerSpawner<C>,
    lines: BTreeMap<LineId, Line>,
    trains: BTreeMap<String, TrainHandle>,
    stations: BTreeMap<StationId, Arc<Station>>,

    /// Passengers waiting, by station
    waiting: BTreeMap<StationId, Vec<Passenger<C>>>,

    /// Passengers aboard, by train name
    riding: BTreeMap<String, Vec<Passenger<C>>>,

    board: StationBoard,
    boarded: u64,
    refused_full: u64,
    delivered: u64,
}

impl<C: MetroContext> Concourse<C> {
    pub fn new(spawner: PassengerSpawner<C>, stations: &[Arc<Station>], lines: &[Line]) -> Self {
        Self {
            spawner,
            lines: lines.iter().map(|l| (l.id, l.clone())).collect(),
            trains: BTreeMap::new(),
            stations: stations.iter().map(|s| (s.id, Arc::clone(s))).collect(),
            waiting: BTreeMap::new(),
            riding: BTreeMap::new(),
            board: StationBoard::new(),
            boarded: 0,
            refused_full: 0,
            delivered: 0,
        }
    }

    /// Makes a train boardable by name.
    pub fn register_train(&mut self, handle: TrainHandle) {
        self.trains.insert(handle.name.clone(), handle);
    }

    pub fn admit(&mut self, passengers: Vec<Passenger<C>>) {
        for passenger in passengers {
            self.waiting
                .entry(passenger.current_station().id)
                .or_default()
                .push(passenger);
        }
    }

    /// Seeds every station with `per_station` passengers.
    pub fn seed_initial(&mut self, per_station: usize) {
        let passengers = self.spawner.seed_initial(per_station);
        info!("Seeded {} passengers", passengers.len());
        self.admit(passengers);
    }

    pub fn spawn_tick(&mut self) {
        let passengers = self.spawner.spawn_random();
        self.admit(passengers);
    }

    /// Applies at most one sentiment change to every passenger.
    pub fn sentiment_tick(&mut self) {
        for passenger in self.waiting.values_mut().chain(self.riding.values_mut()).flatten() {
            passenger.update_sentiment();
        }
    }

    pub fn on_departure(&mut self, signal: &StationSignal) {
        self.board.record_departure(signal);
    }

    /// Alights riders at their destination, then boards whoever the train
    /// can take toward theirs.
    pub fn on_arrival(&mut self, signal: &StationSignal) {
        self.board.record_arrival(signal);

        let Some(station) = self.stations.get(&signal.station_id).cloned() else {
            warn!(station = %signal.station_id, "arrival at unknown station");
            return;
        };
        let Some(handle) = self.trains.get(&signal.train.name).cloned() else {
            debug!(train = %signal.train.name, "arrival from unregistered train");
            return;
        };

        self.alight(&handle, &station);
        self.embark(&handle, &station);
    }

    fn alight(&mut self, handle: &TrainHandle, station: &Arc<Station>) {
        let Some(riders) = self.riding.get_mut(&handle.name) else {
            return;
        };

        let (leaving, staying): (Vec<_>, Vec<_>) = riders
            .drain(..)
            .partition(|p| p.destination().id == station.id);
        *riders = staying;

        for mut passenger in leaving {
            match passenger.disembark_train(Arc::clone(station)) {
                Ok(PassengerState::Arrived) => self.delivered += 1,
                Ok(_) => self
                    .waiting
                    .entry(station.id)
                    .or_default()
                    .push(passenger),
                Err(err) => warn!(passenger = %passenger.id, "{}", err),
            }
        }
    }

    fn embark(&mut self, handle: &TrainHandle, station: &Arc<Station>) {
        let Some(line) = self.lines.get(&handle.line_id) else {
            return;
        };
        let Some(queue) = self.waiting.get_mut(&station.id) else {
            return;
        };

        let mut remaining = Vec::with_capacity(queue.len());
        let mut aboard = Vec::new();
        for mut passenger in queue.drain(..) {
            if !line.contains(passenger.destination().id) {
                remaining.push(passenger);
                continue;
            }

            match passenger.board_train(handle.clone()) {
                Ok(()) => aboard.push(passenger),
                Err(PassengerError::TrainFull(_)) => {
                    self.refused_full += 1;
                    remaining.push(passenger);
                }
                Err(err) => {
                    warn!(passenger = %passenger.id, "{}", err);
                    remaining.push(passenger);
                }
            }
        }
        *queue = remaining;

        if !aboard.is_empty() {
            debug!(train = %handle.name, station = %station.name, count = aboard.len(), "boarded");
            self.boarded += aboard.len() as u64;
            self.riding.entry(handle.name.clone()).or_default().extend(aboard);
        }
    }

    pub fn board(&self) -> &StationBoard {
        &self.board
    }

    pub fn waiting_at(&self, station: StationId) -> usize {
        self.waiting.get(&station).map(Vec::len).unwrap_or(0)
    }

    pub fn riding_on(&self, train: &str) -> usize {
        self.riding.get(train).map(Vec::len).unwrap_or(0)
    }

    /// Every passenger still in the system.
    pub fn passengers(&self) -> impl Iterator<Item = &Passenger<C>> {
        self.waiting.values().chain(self.riding.values()).flatten()
    }

    pub fn stats(&self) -> ConcourseStats {
        let waiting: usize = self.waiting.values().map(Vec::len).sum();
        let riding: usize = self.riding.values().map(Vec::len).sum();
        let total = waiting + riding;
        let mean_sentiment = if total == 0 {
            100.0
        } else {
            self.passengers().map(|p| p.sentiment()).sum::<f64>() / total as f64
        };

        ConcourseStats {
            spawned: self.spawner.spawned(),
            boarded: self.boarded,
            refused_full: self.refused_full,
            delivered: self.delivered,
            waiting,
            riding,
            mean_sentiment,
        }
    }

    /// Live driver. Exits on shutdown or once the arrivals broadcast closes.
    pub async fn run(
        mut self,
        mut arrivals: broadcast::Receiver<StationSignal>,
        mut departures: broadcast::Receiver<StationSignal>,
        mut shutdown: watch::Receiver<bool>,
        spawn_interval: Duration,
        sentiment_interval: Duration,
    ) -> ConcourseStats {
        // A zero interval disables that trigger
        let spawning = !spawn_interval.is_zero();
        let sweeping = !sentiment_interval.is_zero();
        let floor = Duration::from_millis(1);
        let mut spawn = tokio::time::interval(spawn_interval.max(floor));
        let mut sentiment = tokio::time::interval(sentiment_interval.max(floor));
        // Both fire immediately once; skip that
        spawn.tick().await;
        sentiment.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                signal = arrivals.recv() => match signal {
                    Ok(signal) => self.on_arrival(&signal),
                    Err(RecvError::Lagged(skipped)) => warn!("concourse missed {} arrivals", skipped),
                    Err(RecvError::Closed) => break,
                },
                signal = departures.recv() => match signal {
                    Ok(signal) => self.on_departure(&signal),
                    Err(RecvError::Lagged(skipped)) => debug!("concourse missed {} departures", skipped),
                    Err(RecvError::Closed) => {}
                },
                _ = spawn.tick(), if spawning => self.spawn_tick(),
                _ = sentiment.tick(), if sweeping => self.sentiment_tick(),
            }
        }

        let stats = self.stats();
        debug!(?stats, "concourse stopped");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use metro_core::{EventSink, TrainLoad, TrainSnapshot, Vector};

    fn station(id: i64, x: f64) -> Arc<Station> {
        Arc::new(Station::new(id, format!("S{}", id), Vector::new(x, 0.0)))
    }

    struct Fixture {
        ctx: Arc<SimContext>,
        stations: Vec<Arc<Station>>,
        concourse: Concourse<SimContext>,
        handle: TrainHandle,
    }

    fn fixture(capacity: usize) -> Fixture {
        let ctx = SimContext::shared(11);
        let stations = vec![station(1, 0.0), station(2, 100.0), station(3, 200.0)];
        let lines = vec![Line::new(1, "Blue", vec![stations[0].clone(), stations[1].clone()])];
        let spawner = PassengerSpawner::new(Arc::clone(&ctx), stations.clone(), &lines, EventSink::disabled());
        let mut concourse = Concourse::new(spawner, &stations, &lines);

        let handle = TrainHandle {
            name: "T1".to_string(),
            line_id: LineId(1),
            load: Arc::new(TrainLoad::new(capacity, 0.8)),
        };
        concourse.register_train(handle.clone());

        Fixture {
            ctx,
            stations,
            concourse,
            handle,
        }
    }

    fn signal(station: StationId, train: &str) -> StationSignal {
        StationSignal {
            station_id: station,
            train: TrainSnapshot {
                name: train.to_string(),
                line_id: LineId(1),
                position: Vector::ZERO,
                velocity: Vector::ZERO,
                current: station,
                next: None,
                forward: true,
                passengers: 0,
                capacity: 0,
            },
        }
    }

    fn passenger(f: &Fixture, id: &str, from: usize, to: usize) -> Passenger<SimContext> {
        Passenger::new(
            Arc::clone(&f.ctx),
            id,
            id,
            f.stations[from].clone(),
            f.stations[to].clone(),
            EventSink::disabled(),
        )
    }

    #[test]
    fn test_arrival_boards_and_delivers() {
        let mut f = fixture(10);
        let p = passenger(&f, "P-1", 0, 1);
        f.concourse.admit(vec![p]);
        assert_eq!(f.concourse.waiting_at(StationId(1)), 1);

        f.concourse.on_arrival(&signal(StationId(1), "T1"));
        assert_eq!(f.concourse.waiting_at(StationId(1)), 0);
        assert_eq!(f.concourse.riding_on("T1"), 1);
        assert_eq!(f.handle.load.riders(), 1);

        f.concourse.on_departure(&signal(StationId(1), "T1"));
        f.concourse.on_arrival(&signal(StationId(2), "T1"));
        assert_eq!(f.concourse.riding_on("T1"), 0);
        assert_eq!(f.handle.load.riders(), 0);

        let stats = f.concourse.stats();
        assert_eq!(stats.boarded, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.waiting + stats.riding, 0);
    }

    #[test]
    fn test_only_boards_toward_served_destinations() {
        let mut f = fixture(10);
        // Station 3 is not on the Blue line
        f.concourse.admit(vec![passenger(&f, "P-1", 0, 2)]);

        f.concourse.on_arrival(&signal(StationId(1), "T1"));
        assert_eq!(f.concourse.waiting_at(StationId(1)), 1);
        assert_eq!(f.concourse.riding_on("T1"), 0);
    }

    #[test]
    fn test_capacity_limits_boarding() {
        let mut f = fixture(2);
        let batch = (0..5).map(|i| passenger(&f, &format!("P-{}", i), 0, 1)).collect();
        f.concourse.admit(batch);

        f.concourse.on_arrival(&signal(StationId(1), "T1"));
        assert_eq!(f.concourse.riding_on("T1"), 2);
        assert_eq!(f.concourse.waiting_at(StationId(1)), 3);
        assert_eq!(f.concourse.stats().refused_full, 3);
    }

    #[test]
    fn test_sentiment_tick_reaches_everyone() {
        let mut f = fixture(10);
        f.concourse.admit(vec![passenger(&f, "P-1", 0, 1), passenger(&f, "P-2", 1, 0)]);

        f.ctx.advance_time(Duration::from_secs(5));
        f.concourse.sentiment_tick();
        assert!(f.concourse.passengers().all(|p| p.sentiment() == 98.0));
        assert_eq!(f.concourse.stats().mean_sentiment, 98.0);
    }

    #[test]
    fn test_station_board_tracks_presence() {
        let mut board = StationBoard::new();
        board.record_arrival(&signal(StationId(1), "T1"));
        board.record_arrival(&signal(StationId(1), "T2"));
        assert_eq!(board.occupancy(StationId(1)), 2);

        board.record_departure(&signal(StationId(1), "T1"));
        assert_eq!(board.trains_at(StationId(1)), vec!["T2"]);
        assert_eq!(board.occupancy(StationId(2)), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let f = fixture(10);
        let (arrivals_tx, arrivals) = broadcast::channel(8);
        let (_departures_tx, departures) = broadcast::channel(8);
        let (shutdown_tx, shutdown) = watch::channel(false);

        let task = tokio::spawn(f.concourse.run(
            arrivals,
            departures,
            shutdown,
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));

        arrivals_tx.send(signal(StationId(1), "T1")).unwrap();
        shutdown_tx.send(true).unwrap();
        let stats = task.await.unwrap();
        assert_eq!(stats.delivered, 0);
    }
}
