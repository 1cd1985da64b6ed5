//! Metro Environment Abstraction Layer
//!
//! This crate provides the pieces of the simulation that touch the outside
//! world, so the kernel in `metro_core` can run both live (tokio wall clock)
//! and inside a deterministic harness (virtual clock, seeded RNG).
//!
//! # Core Concept: Ticks In, Events Out
//!
//! Actors never block on each other. They only suspend on:
//! - the next tick from a [`Ticker`] inbox,
//! - the scheduler's own clock,
//! - a bounded dwell sleep through [`MetroContext::sleep`].
//!
//! Everything an actor sends outward goes through a [`LossySender`], which
//! drops on a full channel instead of waiting for a slow consumer.
//!
//! # Example
//!
//! ```ignore
//! use metro_env::{Ticker, TickerState};
//! use std::time::Duration;
//!
//! let ticker = Ticker::new(Duration::from_millis(20), TickerState::Running);
//! let mut inbox = ticker.subscribe();
//! while let Some(tick) = inbox.recv().await {
//!     train.update();
//! }
//! ```

mod channel;
mod context;
mod error;
mod ticker;
mod tokio_impl;
mod types;

pub use channel::{lossy_channel, Delivery, LossySender};
pub use context::MetroContext;
pub use error::EnvError;
pub use ticker::{TickInbox, Ticker};
pub use tokio_impl::TokioContext;
pub use types::{Tick, TickerState};
