//! Passenger spawning.
//!
//! Destinations are drawn from a station's reachability set: every other
//! station on any line that serves it. The set is computed once, up front.

use metro_core::{EventSink, Line, Passenger, Station, StationId};
use metro_env::MetroContext;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Builder;

/// RNG stream used for spawning, see [`MetroContext::derive_rng`].
const SPAWN_STREAM: u64 = 0x5350_4157;

/// Station id to the stations reachable from it without leaving a line.
#[derive(Debug, Clone, Default)]
pub struct ReachabilityMap {
    reachable: BTreeMap<StationId, Vec<Arc<Station>>>,
}

impl ReachabilityMap {
    pub fn build(stations: &[Arc<Station>], lines: &[Line]) -> Self {
        let mut reachable = BTreeMap::new();

        for station in stations {
            let mut set: BTreeMap<StationId, Arc<Station>> = BTreeMap::new();
            for line in lines.iter().filter(|l| l.contains(station.id)) {
                for dest in line.stations.iter().filter(|d| d.id != station.id) {
                    set.entry(dest.id).or_insert_with(|| Arc::clone(dest));
                }
            }
            reachable.insert(station.id, set.into_values().collect());
        }

        Self { reachable }
    }

    /// Reachable stations sorted by id. Empty for unknown stations.
    pub fn destinations(&self, station: StationId) -> &[Arc<Station>] {
        self.reachable.get(&station).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Stations nobody can travel from.
    pub fn isolated(&self) -> impl Iterator<Item = StationId> + '_ {
        self.reachable
            .iter()
            .filter(|(_, dests)| dests.is_empty())
            .map(|(id, _)| *id)
    }
}

/// Creates passengers at stations with random reachable destinations.
pub struct PassengerSpawner<C: MetroContext> {
    ctx: Arc<C>,
    stations: Vec<Arc<Station>>,
    reachability: ReachabilityMap,
    rng: ChaCha8Rng,
    events: EventSink,
    spawned: u64,
}

impl<C: MetroContext> PassengerSpawner<C> {
    pub fn new(ctx: Arc<C>, stations: Vec<Arc<Station>>, lines: &[Line], events: EventSink) -> Self {
        let reachability = ReachabilityMap::build(&stations, lines);
        for id in reachability.isolated() {
            warn!(station = %id, "station has no reachable destinations");
        }

        let rng = ctx.derive_rng(SPAWN_STREAM);
        Self {
            ctx,
            stations,
            reachability,
            rng,
            events,
            spawned: 0,
        }
    }

    pub fn reachability(&self) -> &ReachabilityMap {
        &self.reachability
    }

    /// Total passengers created so far.
    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    /// Spawns `count` passengers at `station`. A station with no reachable
    /// destination gets a warning and nobody.
    pub fn spawn_at(&mut self, station: &Arc<Station>, count: usize) -> Vec<Passenger<C>> {
        let destinations = self.reachability.destinations(station.id);
        if destinations.is_empty() {
            warn!("Station {} (ID:{}) has no reachable destinations", station.name, station.id);
            return Vec::new();
        }

        let mut spawned = Vec::with_capacity(count);
        for _ in 0..count {
            let destination = Arc::clone(&destinations[self.rng.gen_range(0..destinations.len())]);
            let id = format!("P-{}", Builder::from_random_bytes(self.rng.gen()).into_uuid());
            let name = format!("Passenger-{}", self.rng.gen_range(0..1000));

            debug!(passenger = %id, from = %station.name, to = %destination.name, "spawned");
            spawned.push(Passenger::new(
                Arc::clone(&self.ctx),
                id,
                name,
                Arc::clone(station),
                destination,
                self.events.clone(),
            ));
        }

        self.spawned += spawned.len() as u64;
        spawned
    }

    /// Seeds every station with `per_station` passengers.
    pub fn seed_initial(&mut self, per_station: usize) -> Vec<Passenger<C>> {
        let stations = self.stations.clone();
        stations
            .iter()
            .flat_map(|station| self.spawn_at(station, per_station))
            .collect()
    }

    /// One periodic trigger: 1-2 passengers at a random station.
    pub fn spawn_random(&mut self) -> Vec<Passenger<C>> {
        if self.stations.is_empty() {
            return Vec::new();
        }

        let station = Arc::clone(&self.stations[self.rng.gen_range(0..self.stations.len())]);
        let count = self.rng.gen_range(1..=2);
        self.spawn_at(&station, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use metro_core::{PassengerState, Vector};
    use proptest::prelude::*;

    fn station(id: i64) -> Arc<Station> {
        Arc::new(Station::new(id, format!("S{}", id), Vector::new(id as f64, 0.0)))
    }

    fn world() -> (Vec<Arc<Station>>, Vec<Line>) {
        let stations: Vec<_> = (1..=5).map(station).collect();
        let lines = vec![
            Line::new(1, "A", vec![stations[0].clone(), stations[1].clone(), stations[2].clone()]),
            Line::new(2, "B", vec![stations[2].clone(), stations[3].clone()]),
        ];
        // Station 5 is on no line
        (stations, lines)
    }

    fn ids(stations: &[Arc<Station>]) -> Vec<i64> {
        stations.iter().map(|s| s.id.0).collect()
    }

    #[test]
    fn test_reachability_unions_lines() {
        let (stations, lines) = world();
        let map = ReachabilityMap::build(&stations, &lines);

        assert_eq!(ids(map.destinations(StationId(1))), vec![2, 3]);
        assert_eq!(ids(map.destinations(StationId(3))), vec![1, 2, 4]);
        assert_eq!(ids(map.destinations(StationId(4))), vec![3]);
        assert!(map.destinations(StationId(5)).is_empty());
        assert_eq!(map.isolated().collect::<Vec<_>>(), vec![StationId(5)]);
    }

    #[test]
    fn test_seed_initial_skips_isolated() {
        let (stations, lines) = world();
        let mut spawner = PassengerSpawner::new(SimContext::shared(1), stations, &lines, EventSink::disabled());

        let passengers = spawner.seed_initial(3);
        assert_eq!(passengers.len(), 12);
        assert_eq!(spawner.spawned(), 12);
        assert!(passengers.iter().all(|p| p.state() == PassengerState::Waiting));
        assert!(passengers.iter().all(|p| p.current_station().id != StationId(5)));
    }

    #[test]
    fn test_spawning_is_deterministic() {
        let (stations, lines) = world();
        let run = |seed: u64| {
            let mut spawner = PassengerSpawner::new(
                SimContext::shared(seed),
                stations.clone(),
                &lines,
                EventSink::disabled(),
            );
            (0..20)
                .flat_map(|_| spawner.spawn_random())
                .map(|p| (p.id.clone(), p.destination().id))
                .collect::<Vec<_>>()
        };

        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }

    #[test]
    fn test_spawn_emits_events() {
        let (stations, lines) = world();
        let (sink, mut rx) = EventSink::channel(16);
        let mut spawner = PassengerSpawner::new(SimContext::shared(3), stations.clone(), &lines, sink);

        let spawned = spawner.spawn_at(&stations[0], 2);
        assert_eq!(spawned.len(), 2);
        assert!(spawned[0].id.starts_with("P-"));
        assert_eq!(rx.try_recv().unwrap().kind(), "passenger_spawn");
        assert_eq!(rx.try_recv().unwrap().kind(), "passenger_spawn");
    }

    proptest! {
        #[test]
        fn prop_random_spawns_are_valid(seed in any::<u64>()) {
            let (stations, lines) = world();
            let mut spawner = PassengerSpawner::new(
                SimContext::shared(seed),
                stations,
                &lines,
                EventSink::disabled(),
            );
            let map = spawner.reachability().clone();

            for _ in 0..10 {
                let batch = spawner.spawn_random();
                prop_assert!(batch.len() <= 2);
                for p in &batch {
                    let from = p.current_station().id;
                    prop_assert_ne!(from, p.destination().id);
                    prop_assert!(map.destinations(from).iter().any(|d| d.id == p.destination().id));
                }
            }
        }
    }
}
