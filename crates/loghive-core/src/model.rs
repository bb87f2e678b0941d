//! Live ingestion metrics shared by every connection and the status server

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use crate::resources::{ResourceSampler, ResourceUsage};

/// Default number of recent payloads kept in the window
pub const DEFAULT_WINDOW_SIZE: usize = 30;

#[derive(Debug)]
struct Counters {
    total: u64,
    window: VecDeque<String>,
}

/// Process-wide record counter and sliding window of recent payloads
pub struct IngestionModel {
    started_at: DateTime<Local>,
    started: Instant,
    capacity: usize,
    counters: Mutex<Counters>,
    resources: ResourceSampler,
}

/// Point-in-time view of the model
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionSnapshot {
    pub started_at: DateTime<Local>,
    pub uptime: Duration,
    pub total: u64,
    /// Records per second since start
    pub rate: f64,
    /// Most recent payload first
    pub window: Vec<String>,
}

impl IngestionModel {
    /// Create a model keeping the last `capacity` payloads (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            started_at: Local::now(),
            started: Instant::now(),
            capacity,
            counters: Mutex::new(Counters {
                total: 0,
                window: VecDeque::with_capacity(capacity),
            }),
            resources: ResourceSampler::new(),
        }
    }

    /// Count a record and push its payload into the window
    pub fn record(&self, payload: impl Into<String>) {
        let payload = payload.into();
        let mut counters = self.lock();
        if counters.window.len() == self.capacity {
            counters.window.pop_front();
        }
        counters.window.push_back(payload);
        counters.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.lock().total
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> IngestionSnapshot {
        let uptime = self.uptime();
        let (total, window) = {
            let counters = self.lock();
            (counters.total, counters.window.iter().rev().cloned().collect())
        };
        IngestionSnapshot {
            started_at: self.started_at,
            uptime,
            total,
            rate: rate(total, uptime),
            window,
        }
    }

    /// Sample CPU, memory and disk usage now
    pub fn resources(&self) -> ResourceUsage {
        self.resources.sample()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        // A poisoned lock still guards consistent counters
        self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for IngestionModel {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

/// Records per second, zero before any time has elapsed
pub fn rate(total: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        total as f64 / secs
    } else {
        0.0
    }
}

/// Render a duration as `H:MM:SS`
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_window_keeps_most_recent_first() {
        let model = IngestionModel::new(DEFAULT_WINDOW_SIZE);
        for i in 0..(DEFAULT_WINDOW_SIZE + 5) {
            model.record(format!("line {}", i));
        }

        let snapshot = model.snapshot();
        assert_eq!(snapshot.total, 35);
        assert_eq!(snapshot.window.len(), 30);
        assert_eq!(snapshot.window[0], "line 34");
        assert_eq!(snapshot.window[29], "line 5");
    }

    #[test]
    fn test_window_below_capacity() {
        let model = IngestionModel::new(3);
        model.record("a");
        model.record("b");
        assert_eq!(model.snapshot().window, vec!["b", "a"]);
        assert_eq!(model.total(), 2);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let model = IngestionModel::new(0);
        model.record("a");
        model.record("b");
        assert_eq!(model.capacity(), 1);
        assert_eq!(model.snapshot().window, vec!["b"]);
    }

    #[test]
    fn test_concurrent_records_are_all_counted() {
        let model = Arc::new(IngestionModel::new(10));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let model = Arc::clone(&model);
                std::thread::spawn(move || {
                    let mut last = 0;
                    for i in 0..500 {
                        model.record(format!("{}-{}", t, i));
                        let total = model.total();
                        assert!(total >= last);
                        last = total;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = model.snapshot();
        assert_eq!(snapshot.total, 4000);
        assert_eq!(snapshot.window.len(), 10);
    }

    #[test]
    fn test_rate() {
        assert_eq!(rate(10, Duration::ZERO), 0.0);
        assert_eq!(rate(10, Duration::from_secs(4)), 2.5);
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_millis(999)), "0:00:00");
        assert_eq!(format_uptime(Duration::from_secs(61)), "0:01:01");
        assert_eq!(format_uptime(Duration::from_secs(3 * 3600 + 25 * 60 + 7)), "3:25:07");
        assert_eq!(format_uptime(Duration::from_secs(30 * 3600)), "30:00:00");
    }
}
