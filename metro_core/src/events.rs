//! Outbound notifications.
//!
//! Two independent streams leave the kernel:
//!
//! 1. **Lifecycle events** ([`MetroEvent`]) for the analytics observer. One
//!    bounded queue shared by every train and passenger, written through an
//!    [`EventSink`] that drops on full.
//! 2. **Station signals** ([`StationSignal`]) over the [`TrainSignals`]
//!    arrival/departure broadcast pair, for consumers that only need live
//!    train positions (station occupancy, UI).

use crate::station::{LineId, StationId};
use crate::train::TrainSnapshot;
use crate::vector::Vector;
use metro_env::{lossy_channel, Delivery, LossySender};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

/// A tagged lifecycle record. Serialized with a `type` field carrying the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetroEvent {
    TrainArrival {
        timestamp_ms: u64,
        train_name: String,
        line_id: LineId,
        station_id: StationId,
        station_name: String,
        position: Vector,
    },

    TrainDeparture {
        timestamp_ms: u64,
        train_name: String,
        line_id: LineId,
        station_id: StationId,
        station_name: String,
        next_station_id: StationId,
        next_station_name: String,
        position: Vector,
        /// Predicted travel time to the next station
        eta_secs: f64,
    },

    TrainTick {
        timestamp_ms: u64,
        train_name: String,
        position: Vector,
        velocity: Vector,
        speed: f64,
        current_station_id: StationId,
        next_station_id: Option<StationId>,
    },

    TrainError {
        timestamp_ms: u64,
        train_name: String,
        error: String,
        /// What the train was doing when it failed
        context: String,
    },

    PassengerSpawn {
        timestamp_ms: u64,
        passenger_id: String,
        passenger_name: String,
        station_id: StationId,
        station_name: String,
        destination_id: StationId,
        destination_name: String,
    },

    PassengerWait {
        timestamp_ms: u64,
        passenger_id: String,
        passenger_name: String,
        station_id: StationId,
        station_name: String,
        sentiment: f64,
    },

    PassengerBoard {
        timestamp_ms: u64,
        passenger_id: String,
        passenger_name: String,
        train_name: String,
        station_id: StationId,
        station_name: String,
        sentiment: f64,
    },

    PassengerDisembark {
        timestamp_ms: u64,
        passenger_id: String,
        passenger_name: String,
        station_id: StationId,
        station_name: String,
        sentiment: f64,
    },

    PassengerArrive {
        timestamp_ms: u64,
        passenger_id: String,
        passenger_name: String,
        station_id: StationId,
        station_name: String,
        sentiment: f64,
        journey_ms: u64,
    },

    PassengerFrustration {
        timestamp_ms: u64,
        passenger_id: String,
        passenger_name: String,
        station_id: StationId,
        station_name: String,
        sentiment: f64,
        wait_ms: u64,
    },
}

impl MetroEvent {
    /// The serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TrainArrival { .. } => "train_arrival",
            Self::TrainDeparture { .. } => "train_departure",
            Self::TrainTick { .. } => "train_tick",
            Self::TrainError { .. } => "train_error",
            Self::PassengerSpawn { .. } => "passenger_spawn",
            Self::PassengerWait { .. } => "passenger_wait",
            Self::PassengerBoard { .. } => "passenger_board",
            Self::PassengerDisembark { .. } => "passenger_disembark",
            Self::PassengerArrive { .. } => "passenger_arrive",
            Self::PassengerFrustration { .. } => "passenger_frustration",
        }
    }

    pub fn timestamp_ms(&self) -> u64 {
        match self {
            Self::TrainArrival { timestamp_ms, .. }
            | Self::TrainDeparture { timestamp_ms, .. }
            | Self::TrainTick { timestamp_ms, .. }
            | Self::TrainError { timestamp_ms, .. }
            | Self::PassengerSpawn { timestamp_ms, .. }
            | Self::PassengerWait { timestamp_ms, .. }
            | Self::PassengerBoard { timestamp_ms, .. }
            | Self::PassengerDisembark { timestamp_ms, .. }
            | Self::PassengerArrive { timestamp_ms, .. }
            | Self::PassengerFrustration { timestamp_ms, .. } => *timestamp_ms,
        }
    }

    /// Train the event is attributed to, if any.
    pub fn train_name(&self) -> Option<&str> {
        match self {
            Self::TrainArrival { train_name, .. }
            | Self::TrainDeparture { train_name, .. }
            | Self::TrainTick { train_name, .. }
            | Self::TrainError { train_name, .. }
            | Self::PassengerBoard { train_name, .. } => Some(train_name),
            _ => None,
        }
    }

    /// Passenger the event is attributed to, if any.
    pub fn passenger_id(&self) -> Option<&str> {
        match self {
            Self::PassengerSpawn { passenger_id, .. }
            | Self::PassengerWait { passenger_id, .. }
            | Self::PassengerBoard { passenger_id, .. }
            | Self::PassengerDisembark { passenger_id, .. }
            | Self::PassengerArrive { passenger_id, .. }
            | Self::PassengerFrustration { passenger_id, .. } => Some(passenger_id),
            _ => None,
        }
    }

    pub fn is_train_event(&self) -> bool {
        self.kind().starts_with("train_")
    }
}

/// Best-effort writer onto the shared lifecycle queue.
///
/// A disabled sink accepts and discards everything, which is what actors
/// built without an observer use.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<LossySender<MetroEvent>>,
}

impl EventSink {
    pub fn new(tx: LossySender<MetroEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Creates a sink together with the receiving end of a fresh queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<MetroEvent>) {
        let (tx, rx) = lossy_channel(capacity);
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: MetroEvent) -> Delivery {
        match &self.tx {
            Some(tx) => tx.offer(event),
            None => Delivery::Closed,
        }
    }

    /// Events discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.tx.as_ref().map(|tx| tx.dropped()).unwrap_or(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }
}

/// Arrival or departure notice for one station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSignal {
    pub station_id: StationId,
    pub train: TrainSnapshot,
}

/// The arrivals/departures broadcast pair trains announce on.
///
/// Sending never blocks; a receiver that falls behind sees `Lagged` and
/// skips ahead.
#[derive(Debug, Clone)]
pub struct TrainSignals {
    arrivals: broadcast::Sender<StationSignal>,
    departures: broadcast::Sender<StationSignal>,
}

impl TrainSignals {
    pub fn new(capacity: usize) -> Self {
        let (arrivals, _) = broadcast::channel(capacity.max(1));
        let (departures, _) = broadcast::channel(capacity.max(1));
        Self { arrivals, departures }
    }

    pub fn subscribe_arrivals(&self) -> broadcast::Receiver<StationSignal> {
        self.arrivals.subscribe()
    }

    pub fn subscribe_departures(&self) -> broadcast::Receiver<StationSignal> {
        self.departures.subscribe()
    }

    /// Returns the number of listeners reached.
    pub fn announce_arrival(&self, signal: StationSignal) -> usize {
        // No listeners is not an error
        self.arrivals.send(signal).unwrap_or(0)
    }

    pub fn announce_departure(&self, signal: StationSignal) -> usize {
        self.departures.send(signal).unwrap_or(0)
    }
}

impl Default for TrainSignals {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_event(id: &str) -> MetroEvent {
        MetroEvent::PassengerWait {
            timestamp_ms: 42,
            passenger_id: id.to_string(),
            passenger_name: "Ana".to_string(),
            station_id: StationId(1),
            station_name: "Central".to_string(),
            sentiment: 100.0,
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(wait_event("P-1")).unwrap();
        assert_eq!(json["type"], "passenger_wait");
        assert_eq!(json["passenger_id"], "P-1");
        assert_eq!(json["station_id"], 1);

        let back: MetroEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), "passenger_wait");
        assert_eq!(back.timestamp_ms(), 42);
    }

    #[test]
    fn test_event_attribution() {
        let event = MetroEvent::TrainError {
            timestamp_ms: 0,
            train_name: "Tren 1".to_string(),
            error: "boom".to_string(),
            context: "update".to_string(),
        };
        assert_eq!(event.train_name(), Some("Tren 1"));
        assert_eq!(event.passenger_id(), None);
        assert!(event.is_train_event());

        let event = wait_event("P-9");
        assert_eq!(event.passenger_id(), Some("P-9"));
        assert!(!event.is_train_event());
    }

    #[test]
    fn test_sink_drops_on_full() {
        let (sink, mut rx) = EventSink::channel(1);
        assert_eq!(sink.emit(wait_event("a")), Delivery::Sent);
        assert_eq!(sink.emit(wait_event("b")), Delivery::Dropped);
        assert_eq!(sink.dropped(), 1);

        assert_eq!(rx.try_recv().unwrap().passenger_id(), Some("a"));
    }

    #[test]
    fn test_disabled_sink_discards() {
        let sink = EventSink::disabled();
        assert!(!sink.is_enabled());
        assert_eq!(sink.emit(wait_event("a")), Delivery::Closed);
        assert_eq!(sink.dropped(), 0);
    }
}
