//! Notification counters for acquisition and consumption
//!
//! Both signals are monotonically increasing counters carried by a
//! `tokio::sync::watch` channel: subscribers can await `changed()` from async
//! code or compare `borrow()` values from a polling loop.

use std::sync::Arc;
use tokio::sync::watch;

/// Raised by writers each time a reading is committed.
///
/// Clones share the same counter, so a single consumer can wait for new
/// data on any of several sensors.
#[derive(Debug, Clone)]
pub struct DataSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl DataSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Announce one new reading
    pub fn notify(&self) {
        self.tx.send_modify(|count| *count = count.wrapping_add(1));
    }

    /// Number of readings announced so far
    pub fn count(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for DataSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumption progress of one ring: advanced each time a reading is
/// delivered to the primary consumer.
#[derive(Debug)]
pub struct ProgressSignal {
    tx: watch::Sender<u64>,
}

impl ProgressSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Record one delivery and return the new progress value
    pub fn advance(&self) -> u64 {
        let mut value = 0;
        self.tx.send_modify(|count| {
            *count = count.wrapping_add(1);
            value = *count;
        });
        value
    }

    pub fn value(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for ProgressSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_signal_shared_between_clones() {
        let signal = DataSignal::new();
        let other = signal.clone();
        let rx = signal.subscribe();

        signal.notify();
        other.notify();

        assert_eq!(signal.count(), 2);
        assert_eq!(*rx.borrow(), 2);
    }

    #[test]
    fn test_progress_advances() {
        let progress = ProgressSignal::new();
        let mut rx = progress.subscribe();
        assert!(!rx.has_changed().unwrap_or(true));

        assert_eq!(progress.advance(), 1);
        assert_eq!(progress.advance(), 2);
        assert!(rx.has_changed().unwrap_or(false));
        assert_eq!(*rx.borrow_and_update(), 2);
    }
}
