//! Production implementation of MetroContext using Tokio.

use crate::MetroContext;
use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

/// Production context backed by Tokio and OS entropy.
///
/// Time comes from the system clock, randomness from fresh entropy.
pub struct TokioContext {
    /// Start time for monotonic duration calculations (follows a paused
    /// tokio clock in tests)
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetroContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let span = tracing::debug_span!("task", name = %name);
        tokio::spawn(future.instrument(span))
    }

    fn derive_rng(&self, _seed_extension: u64) -> ChaCha8Rng {
        // Production is not seeded
        ChaCha8Rng::from_entropy()
    }

    fn seed(&self) -> u64 {
        0
    }
}
