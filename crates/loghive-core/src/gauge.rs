use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counts {
    active: AtomicUsize,
    total: AtomicU64,
}

/// Shared count of live TCP connections
///
/// Cloning yields another handle onto the same counters.
#[derive(Debug, Clone, Default)]
pub struct ConnectionGauge {
    counts: Arc<Counts>,
}

impl ConnectionGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection; it stays counted until the guard is dropped
    pub fn open(&self) -> ConnectionGuard {
        self.counts.active.fetch_add(1, Ordering::Relaxed);
        self.counts.total.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            counts: Arc::clone(&self.counts),
        }
    }

    /// Connections currently open
    pub fn active(&self) -> usize {
        self.counts.active.load(Ordering::Relaxed)
    }

    /// Connections accepted since start
    pub fn total(&self) -> u64 {
        self.counts.total.load(Ordering::Relaxed)
    }
}

/// Decrements the active count on drop
#[derive(Debug)]
pub struct ConnectionGuard {
    counts: Arc<Counts>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counts.active.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_tracks_active_connections() {
        let gauge = ConnectionGauge::new();
        let first = gauge.open();
        let second = gauge.clone().open();
        assert_eq!(gauge.active(), 2);

        drop(first);
        assert_eq!(gauge.active(), 1);
        drop(second);
        assert_eq!(gauge.active(), 0);
        assert_eq!(gauge.total(), 2);
    }
}
