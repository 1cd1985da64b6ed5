//! Metro Simulation Harness
//!
//! Wires the kernel in `metro_core` into something that runs:
//! - **Layout**: JSON world description (stations, edges, lines, makes,
//!   trains) validated into a route network
//! - **Live**: one [`metro_env::Ticker`] driving a task per train, with the
//!   concourse spawning passengers and reacting to station broadcasts
//! - **Scenarios**: the same world stepped on a virtual clock, so a seed
//!   fully determines the run
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      SimWorld                        │
//! │   Ticker ──► Train ──► Train ──► ...                 │
//! │                │ arrivals / departures (broadcast)   │
//! │                ▼                                     │
//! │            Concourse ◄── PassengerSpawner            │
//! │                │                                     │
//! │                ▼                                     │
//! │           EventSink (drop on full) ──► EventExport   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use metro_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::Demo);
//! assert!(result.passed);
//! ```

mod concourse;
mod context;
mod error;
mod exporter;
mod layout;
mod runner;
pub mod scenarios;
mod spawner;
mod world;

pub use concourse::{Concourse, ConcourseStats, StationBoard};
pub use context::SimContext;
pub use error::SimError;
pub use exporter::EventExport;
pub use layout::{BuiltLayout, EdgeSpec, LineSpec, StationSpec, TrainSpec, WorldLayout};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner, Session};
pub use spawner::{PassengerSpawner, ReachabilityMap};
pub use world::{LiveReport, SimConfig, SimWorld};
