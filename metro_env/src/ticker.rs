//! Ticker - a single periodic clock fanned out to many subscribers.
//!
//! The ticker sends one [`Tick`] per interval to every subscribed inbox.
//! It can be paused, resumed and stopped at any time.
//!
//! # Backpressure
//!
//! Each inbox holds exactly one tick. If a subscriber has not consumed the
//! previous tick, the new one is dropped for that subscriber and counted
//! in [`Ticker::count`]. The clock never waits on a subscriber.
//!
//! # State Machine
//!
//! ```text
//!            pause()            stop()
//!  Running ─────────► Paused ─────────► Stopped
//!     ▲                 │                  ▲
//!     └──── resume() ───┘                  │
//!     └────────────────── stop() ──────────┘
//! ```

use crate::channel::{Delivery, LossySender};
use crate::error::EnvError;
use crate::types::{Tick, TickerState};

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// State shared between the control handle, the clock task and every inbox.
struct Shared {
    /// Period between ticks
    interval: Duration,

    /// Current [`TickerState`] as u8
    state: AtomicU8,

    /// Registered inboxes
    subscribers: Mutex<Vec<LossySender<Tick>>>,

    /// Ticks fired while not running plus dropped deliveries
    missed: Arc<AtomicU64>,

    /// Last tick sequence number handed out
    seq: AtomicU64,

    /// Reference point for [`Tick::at`]
    origin: Instant,

    /// Handle to the clock task while one exists
    clock: Mutex<Option<JoinHandle<()>>>,

    /// Woken once when the ticker stops
    stopped: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn state(&self) -> TickerState {
        TickerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TickerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Fans one clock tick out. Returns false once the ticker is stopped.
    fn deliver(&self, fired_at: Instant) -> bool {
        let mut subscribers = lock(&self.subscribers);

        match self.state() {
            TickerState::Stopped => return false,
            TickerState::Paused => {
                self.missed.fetch_add(1, Ordering::Relaxed);
                return true;
            }
            TickerState::Running => {}
        }

        let tick = Tick {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            at: fired_at.saturating_duration_since(self.origin),
        };

        subscribers.retain(|inbox| inbox.offer(tick) != Delivery::Closed);
        true
    }
}

/// Periodic scheduler with pause/resume and drop-on-full fan-out.
///
/// Must be created inside a Tokio runtime when started in the
/// `Running` state. Dropping the ticker stops it.
pub struct Ticker {
    shared: Arc<Shared>,
}

impl Ticker {
    /// Creates a ticker firing every `interval`.
    ///
    /// `initial` selects whether the clock starts immediately (`Running`),
    /// waits for [`Ticker::resume`] (`Paused`), or is born terminal
    /// (`Stopped`).
    pub fn new(interval: Duration, initial: TickerState) -> Self {
        let shared = Arc::new(Shared {
            interval,
            state: AtomicU8::new(initial.as_u8()),
            subscribers: Mutex::new(Vec::new()),
            missed: Arc::new(AtomicU64::new(0)),
            seq: AtomicU64::new(0),
            origin: Instant::now(),
            clock: Mutex::new(None),
            stopped: Notify::new(),
        });

        if initial == TickerState::Running {
            *lock(&shared.clock) = Some(spawn_clock(&shared));
        }

        Self { shared }
    }

    /// Creates and returns a new single-slot inbox.
    ///
    /// An inbox obtained from a stopped ticker is already closed.
    pub fn subscribe(&self) -> TickInbox {
        let (tx, rx) = mpsc::channel(1);

        let mut subscribers = lock(&self.shared.subscribers);
        if self.shared.state() != TickerState::Stopped {
            subscribers.push(LossySender::new(tx, Arc::clone(&self.shared.missed)));
        }

        TickInbox {
            rx,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Halts the clock. Subscriptions are kept.
    pub fn pause(&self) -> Result<(), EnvError> {
        let mut clock = lock(&self.shared.clock);

        match self.shared.state() {
            TickerState::Stopped => Err(EnvError::TickerStopped),
            TickerState::Paused => Ok(()),
            TickerState::Running => {
                self.shared.set_state(TickerState::Paused);
                if let Some(handle) = clock.take() {
                    handle.abort();
                }
                debug!("ticker paused");
                Ok(())
            }
        }
    }

    /// Restarts the clock with the original interval.
    pub fn resume(&self) -> Result<(), EnvError> {
        let mut clock = lock(&self.shared.clock);

        match self.shared.state() {
            TickerState::Stopped => Err(EnvError::TickerStopped),
            TickerState::Running => Ok(()),
            TickerState::Paused => {
                self.shared.set_state(TickerState::Running);
                *clock = Some(spawn_clock(&self.shared));
                debug!("ticker resumed");
                Ok(())
            }
        }
    }

    /// Stops ticking for good and closes every inbox.
    ///
    /// Idempotent. Receivers blocked in [`TickInbox::recv`] wake with `None`.
    pub fn stop(&self) {
        let mut clock = lock(&self.shared.clock);

        if self.shared.state() == TickerState::Stopped && clock.is_none() {
            return;
        }

        self.shared.set_state(TickerState::Stopped);
        if let Some(handle) = clock.take() {
            handle.abort();
        }
        lock(&self.shared.subscribers).clear();
        self.shared.stopped.notify_waiters();
        debug!("ticker stopped");
    }

    /// Ticks processed while not running plus deliveries dropped on full inboxes.
    pub fn count(&self) -> u64 {
        self.shared.missed.load(Ordering::Relaxed)
    }

    /// Returns the current state.
    pub fn state(&self) -> TickerState {
        self.shared.state()
    }

    /// Returns the tick period.
    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Number of inboxes currently registered.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.subscribers).len()
    }

    /// Sequence number of the most recent tick.
    pub fn last_seq(&self) -> u64 {
        self.shared.seq.load(Ordering::Relaxed)
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_clock(shared: &Arc<Shared>) -> JoinHandle<()> {
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let start = Instant::now() + shared.interval;
        let mut clock = tokio::time::interval_at(start, shared.interval);
        clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let fired_at = clock.tick().await;
            if !shared.deliver(fired_at) {
                break;
            }
        }
    })
}

/// Receiving end of a ticker subscription.
pub struct TickInbox {
    rx: mpsc::Receiver<Tick>,
    shared: Arc<Shared>,
}

impl TickInbox {
    /// Waits for the next tick.
    ///
    /// Returns `None` once the ticker is stopped, even if a tick was
    /// still sitting in the slot.
    pub async fn recv(&mut self) -> Option<Tick> {
        let tick = self.rx.recv().await?;
        self.accept(tick)
    }

    /// Takes the pending tick, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<Tick> {
        let tick = self.rx.try_recv().ok()?;
        self.accept(tick)
    }

    /// Resolves once the ticker is stopped, without taking a tick.
    pub async fn closed(&self) {
        let mut notified = std::pin::pin!(self.shared.stopped.notified());
        notified.as_mut().enable();
        if self.shared.state() == TickerState::Stopped {
            return;
        }
        notified.await;
    }

    fn accept(&self, tick: Tick) -> Option<Tick> {
        if self.shared.state() == TickerState::Stopped {
            return None;
        }
        Some(tick)
    }
}
