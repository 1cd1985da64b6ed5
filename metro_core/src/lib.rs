//! Metro Core - the simulation kernel
//!
//! This library holds everything that decides how the metro behaves:
//! 1. **Geometry**: [`Vector`] arithmetic and the FIFO [`Queue`] of waypoints
//! 2. **Routing**: the keyed [`Network`] of stations with polyline edges and
//!    shortest-path search
//! 3. **Actors**: the [`Train`] line-patrol state machine and the
//!    [`Passenger`] journey/sentiment state machine
//!
//! Actors are generic over [`metro_env::MetroContext`], so the same code runs
//! against the tokio clock and inside the deterministic harness. They never
//! block on observers: lifecycle events go through an [`EventSink`] that
//! drops on full, and station signals through a broadcast.

pub mod events;
pub mod network;
pub mod passenger;
pub mod queue;
pub mod station;
pub mod train;
pub mod vector;

// Re-export key types for convenience
pub use events::{EventSink, MetroEvent, StationSignal, TrainSignals};
pub use network::{Located, Network, NetworkError, PathCost, StationNetwork};
pub use passenger::{Passenger, PassengerError, PassengerState, SentimentCategory};
pub use queue::Queue;
pub use station::{Line, LineId, Station, StationId};
pub use train::{
    Make, Train, TrainAssignment, TrainConfig, TrainError, TrainHandle, TrainLoad, TrainSnapshot,
    TrainStep,
};
pub use vector::{map_range, Vector};
