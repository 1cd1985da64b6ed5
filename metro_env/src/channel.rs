//! Drop-on-full channel primitive shared by tick fan-out and event emission.
//!
//! A slow or absent consumer must never stall the simulation clock, so
//! every outbound send is a `try_send`: if the bounded queue is full the
//! item is discarded and a counter is bumped for diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Outcome of offering an item to a [`LossySender`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The item was queued.
    Sent,

    /// The queue was full; the item was discarded and counted.
    Dropped,

    /// The receiver is gone.
    Closed,
}

/// Bounded sender that never waits for capacity.
#[derive(Debug)]
pub struct LossySender<T> {
    tx: mpsc::Sender<T>,

    /// Drops observed on this sender (possibly shared with other senders)
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for LossySender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

/// Creates a bounded lossy channel with its own drop counter.
pub fn lossy_channel<T>(capacity: usize) -> (LossySender<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (LossySender::new(tx, Arc::new(AtomicU64::new(0))), rx)
}

impl<T> LossySender<T> {
    /// Wraps an existing sender, reporting drops into `dropped`.
    pub fn new(tx: mpsc::Sender<T>, dropped: Arc<AtomicU64>) -> Self {
        Self { tx, dropped }
    }

    /// Attempts to queue `item` without waiting.
    pub fn offer(&self, item: T) -> Delivery {
        match self.tx.try_send(item) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Number of items discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns true once the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_drops_when_full() {
        let (tx, mut rx) = lossy_channel::<u32>(2);

        assert_eq!(tx.offer(1), Delivery::Sent);
        assert_eq!(tx.offer(2), Delivery::Sent);
        assert_eq!(tx.offer(3), Delivery::Dropped);
        assert_eq!(tx.dropped(), 1);

        // The oldest items survive, the overflow is gone
        assert_eq!(rx.try_recv().unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_offer_reports_closed() {
        let (tx, rx) = lossy_channel::<u32>(1);
        drop(rx);

        assert!(tx.is_closed());
        assert_eq!(tx.offer(1), Delivery::Closed);
        // Closed is not a drop
        assert_eq!(tx.dropped(), 0);
    }

    #[test]
    fn test_clones_share_counter() {
        let (tx, _rx) = lossy_channel::<u32>(1);
        let tx2 = tx.clone();

        tx.offer(1);
        tx2.offer(2);
        tx2.offer(3);

        assert_eq!(tx.dropped(), 2);
    }
}
