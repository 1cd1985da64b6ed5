//! Passenger actor: journey state machine and decaying sentiment.
//!
//! ```text
//! Waiting -> Boarding -> Riding -> Disembarking -> Waiting (transfer)
//!                                               -> Arrived (terminal)
//! ```
//!
//! Sentiment starts at 100 and changes at most once per
//! [`SENTIMENT_THROTTLE`] of context time. All timers read
//! [`MetroContext::now`], so the same passenger behaves identically under
//! the live clock and the virtual one.

use crate::events::{EventSink, MetroEvent};
use crate::station::Station;
use crate::train::TrainHandle;
use crate::vector::Vector;
use metro_env::MetroContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Minimum time between two sentiment changes.
pub const SENTIMENT_THROTTLE: Duration = Duration::from_secs(5);

/// Continuous wait after which waiting starts to hurt.
pub const WAIT_PENALTY_AFTER: Duration = Duration::from_secs(5);

/// Journey time after which riding starts to hurt.
pub const RIDE_PENALTY_AFTER: Duration = Duration::from_secs(15);

const WAIT_PENALTY: f64 = 2.0;
const RIDE_PENALTY: f64 = 0.5;
const CROWDED_PENALTY: f64 = 1.0;
const FRUSTRATION_LEVEL: f64 = 50.0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PassengerError {
    #[error("Passenger {id} cannot {action} while {state}")]
    InvalidTransition {
        id: String,
        action: &'static str,
        state: PassengerState,
    },

    #[error("Train {0} is full")]
    TrainFull(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassengerState {
    Waiting,
    Boarding,
    Riding,
    Disembarking,
    Arrived,
}

impl fmt::Display for PassengerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::Boarding => "boarding",
            Self::Riding => "riding",
            Self::Disembarking => "disembarking",
            Self::Arrived => "arrived",
        };
        f.write_str(name)
    }
}

/// Human-readable sentiment bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SentimentCategory {
    Angry,
    Frustrated,
    Neutral,
    Satisfied,
    Happy,
}

impl SentimentCategory {
    pub fn from_score(sentiment: f64) -> Self {
        match sentiment {
            s if s >= 80.0 => Self::Happy,
            s if s >= 60.0 => Self::Satisfied,
            s if s >= 40.0 => Self::Neutral,
            s if s >= 20.0 => Self::Frustrated,
            _ => Self::Angry,
        }
    }
}

impl fmt::Display for SentimentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct Passenger<C: MetroContext> {
    pub id: String,
    pub name: String,
    pub position: Vector,

    current_station: Arc<Station>,
    destination: Arc<Station>,
    current_train: Option<TrainHandle>,

    /// 0-100, higher is better
    sentiment: f64,
    state: PassengerState,

    wait_start: Option<Duration>,
    journey_start: Option<Duration>,
    last_sentiment_drop: Duration,

    /// The frustration event fires once per passenger
    frustration_reported: bool,

    events: EventSink,
    ctx: Arc<C>,
}

impl<C: MetroContext> Passenger<C> {
    /// Creates a passenger waiting at `station` and emits `passenger_spawn`.
    pub fn new(
        ctx: Arc<C>,
        id: impl Into<String>,
        name: impl Into<String>,
        station: Arc<Station>,
        destination: Arc<Station>,
        events: EventSink,
    ) -> Self {
        let now = ctx.now();
        let passenger = Self {
            id: id.into(),
            name: name.into(),
            position: station.position,
            current_station: station,
            destination,
            current_train: None,
            sentiment: 100.0,
            state: PassengerState::Waiting,
            wait_start: Some(now),
            journey_start: None,
            last_sentiment_drop: now,
            frustration_reported: false,
            events,
            ctx,
        };

        passenger.events.emit(MetroEvent::PassengerSpawn {
            timestamp_ms: passenger.ctx.timestamp_ms(),
            passenger_id: passenger.id.clone(),
            passenger_name: passenger.name.clone(),
            station_id: passenger.current_station.id,
            station_name: passenger.current_station.name.clone(),
            destination_id: passenger.destination.id,
            destination_name: passenger.destination.name.clone(),
        });
        passenger
    }

    pub fn state(&self) -> PassengerState {
        self.state
    }

    pub fn sentiment(&self) -> f64 {
        self.sentiment
    }

    pub fn current_station(&self) -> &Arc<Station> {
        &self.current_station
    }

    pub fn destination(&self) -> &Arc<Station> {
        &self.destination
    }

    pub fn current_train(&self) -> Option<&TrainHandle> {
        self.current_train.as_ref()
    }

    pub fn has_arrived(&self) -> bool {
        self.state == PassengerState::Arrived
    }

    /// Time spent waiting in the current wait, if waiting.
    pub fn waited(&self) -> Option<Duration> {
        self.wait_start.map(|start| self.ctx.now().saturating_sub(start))
    }

    pub fn sentiment_category(&self) -> SentimentCategory {
        SentimentCategory::from_score(self.sentiment)
    }

    /// Applies at most one sentiment change. Returns true if it changed.
    pub fn update_sentiment(&mut self) -> bool {
        let now = self.ctx.now();
        if now.saturating_sub(self.last_sentiment_drop) < SENTIMENT_THROTTLE {
            return false;
        }

        match self.state {
            PassengerState::Waiting => {
                let Some(start) = self.wait_start else {
                    return false;
                };
                if now.saturating_sub(start) < WAIT_PENALTY_AFTER {
                    return false;
                }

                self.drop_sentiment(WAIT_PENALTY, now);
                if self.sentiment < FRUSTRATION_LEVEL && !self.frustration_reported {
                    self.frustration_reported = true;
                    self.events.emit(MetroEvent::PassengerFrustration {
                        timestamp_ms: self.ctx.timestamp_ms(),
                        passenger_id: self.id.clone(),
                        passenger_name: self.name.clone(),
                        station_id: self.current_station.id,
                        station_name: self.current_station.name.clone(),
                        sentiment: self.sentiment,
                        wait_ms: now.saturating_sub(start).as_millis() as u64,
                    });
                }
                true
            }
            PassengerState::Riding => {
                let Some(start) = self.journey_start else {
                    return false;
                };
                if now.saturating_sub(start) <= RIDE_PENALTY_AFTER {
                    return false;
                }

                let crowded = self.current_train.as_ref().is_some_and(|t| t.is_crowded());
                let penalty = if crowded { RIDE_PENALTY + CROWDED_PENALTY } else { RIDE_PENALTY };
                self.drop_sentiment(penalty, now);
                true
            }
            _ => false,
        }
    }

    fn drop_sentiment(&mut self, amount: f64, now: Duration) {
        self.sentiment = (self.sentiment - amount).max(0.0);
        self.last_sentiment_drop = now;
    }

    /// Restarts the wait timer at the current station.
    pub fn start_waiting(&mut self) -> Result<(), PassengerError> {
        if matches!(self.state, PassengerState::Riding | PassengerState::Arrived) {
            return Err(self.invalid("start waiting"));
        }

        let now = self.ctx.now();
        self.state = PassengerState::Waiting;
        self.wait_start = Some(now);
        self.last_sentiment_drop = now;
        self.emit_wait();
        Ok(())
    }

    /// Boards `train` at the current station.
    ///
    /// Takes a seat on the train's load; a full train leaves the passenger
    /// waiting.
    pub fn board_train(&mut self, train: TrainHandle) -> Result<(), PassengerError> {
        if self.state != PassengerState::Waiting {
            return Err(self.invalid("board"));
        }
        if !train.load.board() {
            return Err(PassengerError::TrainFull(train.name));
        }

        let now = self.ctx.now();
        self.state = PassengerState::Boarding;
        debug!(passenger = %self.id, train = %train.name, "boarding");

        self.current_train = Some(train);
        self.state = PassengerState::Riding;
        self.journey_start = Some(now);
        self.wait_start = None;
        self.last_sentiment_drop = now;

        let train_name = self.current_train.as_ref().map(|t| t.name.clone()).unwrap_or_default();
        self.events.emit(MetroEvent::PassengerBoard {
            timestamp_ms: self.ctx.timestamp_ms(),
            passenger_id: self.id.clone(),
            passenger_name: self.name.clone(),
            train_name,
            station_id: self.current_station.id,
            station_name: self.current_station.name.clone(),
            sentiment: self.sentiment,
        });
        Ok(())
    }

    /// Leaves the train at `station`, either arriving or waiting to transfer.
    pub fn disembark_train(&mut self, station: Arc<Station>) -> Result<PassengerState, PassengerError> {
        if self.state != PassengerState::Riding {
            return Err(self.invalid("disembark"));
        }

        let now = self.ctx.now();
        self.state = PassengerState::Disembarking;
        if let Some(train) = self.current_train.take() {
            train.load.alight();
        }
        self.position = station.position;
        self.current_station = station;

        self.events.emit(MetroEvent::PassengerDisembark {
            timestamp_ms: self.ctx.timestamp_ms(),
            passenger_id: self.id.clone(),
            passenger_name: self.name.clone(),
            station_id: self.current_station.id,
            station_name: self.current_station.name.clone(),
            sentiment: self.sentiment,
        });

        let journey = self.journey_start.take().map(|start| now.saturating_sub(start));
        if self.current_station.id == self.destination.id {
            self.state = PassengerState::Arrived;
            self.events.emit(MetroEvent::PassengerArrive {
                timestamp_ms: self.ctx.timestamp_ms(),
                passenger_id: self.id.clone(),
                passenger_name: self.name.clone(),
                station_id: self.current_station.id,
                station_name: self.current_station.name.clone(),
                sentiment: self.sentiment,
                journey_ms: journey.map(|d| d.as_millis() as u64).unwrap_or(0),
            });
        } else {
            self.state = PassengerState::Waiting;
            self.wait_start = Some(now);
            self.last_sentiment_drop = now;
            self.emit_wait();
        }
        Ok(self.state)
    }

    fn emit_wait(&self) {
        self.events.emit(MetroEvent::PassengerWait {
            timestamp_ms: self.ctx.timestamp_ms(),
            passenger_id: self.id.clone(),
            passenger_name: self.name.clone(),
            station_id: self.current_station.id,
            station_name: self.current_station.name.clone(),
            sentiment: self.sentiment,
        });
    }

    fn invalid(&self, action: &'static str) -> PassengerError {
        PassengerError::InvalidTransition {
            id: self.id.clone(),
            action,
            state: self.state,
        }
    }
}

impl<C: MetroContext> fmt::Display for Passenger<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) at {} → {} [{}, {:.0}%]",
            self.name,
            self.id,
            self.current_station.name,
            self.destination.name,
            self.state,
            self.sentiment
        )
    }
}

impl<C: MetroContext> fmt::Debug for Passenger<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Passenger")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("sentiment", &self.sentiment)
            .field("station", &self.current_station.id)
            .field("destination", &self.destination.id)
            .finish()
    }
}
