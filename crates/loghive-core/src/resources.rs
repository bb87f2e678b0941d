//! Host resource sampling for the status page
//!
//! Every metric is best-effort: a failed read yields `None` for that metric
//! and never affects the others.

use std::path::Path;
use std::sync::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing::debug;

/// Cumulative time the host's disks spent servicing I/O, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskIoTimes {
    pub read_ms: u64,
    pub write_ms: u64,
}

/// One sample of process and host resource usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    /// Process CPU usage percentage (can exceed 100.0 on multi-core)
    pub cpu_percent: Option<f32>,
    /// Process resident memory in bytes
    pub memory_bytes: Option<u64>,
    pub disk_io: Option<DiskIoTimes>,
}

/// Samples resource usage of the current process on demand
pub struct ResourceSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ResourceSampler {
    pub fn new() -> Self {
        let mut system = System::new_with_specifics(
            RefreshKind::nothing().with_processes(ProcessRefreshKind::everything()),
        );

        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => {
                // CPU usage is computed between two refreshes; prime the first one
                system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                Some(pid)
            }
            Err(e) => {
                debug!(error = %e, "Current process id unavailable");
                None
            }
        };

        Self {
            system: Mutex::new(system),
            pid,
        }
    }

    /// Take a fresh sample
    pub fn sample(&self) -> ResourceUsage {
        let (cpu_percent, memory_bytes) = self.process_usage();
        ResourceUsage {
            cpu_percent,
            memory_bytes,
            disk_io: disk_io_times(),
        }
    }

    fn process_usage(&self) -> (Option<f32>, Option<u64>) {
        let Some(pid) = self.pid else {
            return (None, None);
        };
        let Ok(mut system) = self.system.lock() else {
            return (None, None);
        };

        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match system.process(pid) {
            Some(process) => (Some(process.cpu_usage()), Some(process.memory())),
            None => (None, None),
        }
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Sum read/write service time over whole disks listed in `/proc/diskstats`
fn disk_io_times() -> Option<DiskIoTimes> {
    let stats = std::fs::read_to_string("/proc/diskstats").ok()?;
    let times = parse_diskstats(&stats, |device| {
        Path::new("/sys/block").join(device).exists()
    });
    if times.is_none() {
        debug!("No disk statistics available");
    }
    times
}

/// Parse diskstats content, counting only devices accepted by `is_disk`
///
/// Columns: major minor name reads merged sectors read_ms writes merged sectors write_ms ...
fn parse_diskstats(stats: &str, is_disk: impl Fn(&str) -> bool) -> Option<DiskIoTimes> {
    let mut total: Option<DiskIoTimes> = None;

    for line in stats.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 11 || !is_disk(fields[2]) {
            continue;
        }
        let (Ok(read_ms), Ok(write_ms)) = (fields[6].parse::<u64>(), fields[10].parse::<u64>())
        else {
            continue;
        };
        let acc = total.get_or_insert_with(DiskIoTimes::default);
        acc.read_ms = acc.read_ms.saturating_add(read_ms);
        acc.write_ms = acc.write_ms.saturating_add(write_ms);
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISKSTATS: &str = "\
   8       0 sda 1000 10 20000 150 2000 20 40000 300 0 500 450 0 0 0 0
   8       1 sda1 900 10 18000 140 1900 20 38000 290 0 480 430 0 0 0 0
 259       0 nvme0n1 50 0 400 25 60 0 800 75 0 90 100 0 0 0 0
   7       0 loop0 bogus line
";

    #[test]
    fn test_parse_diskstats_sums_whole_disks() {
        let times = parse_diskstats(DISKSTATS, |d| d == "sda" || d == "nvme0n1").unwrap();
        assert_eq!(times.read_ms, 175);
        assert_eq!(times.write_ms, 375);
    }

    #[test]
    fn test_parse_diskstats_without_disks() {
        assert!(parse_diskstats(DISKSTATS, |_| false).is_none());
        assert!(parse_diskstats("", |_| true).is_none());
    }

    #[test]
    fn test_sample_does_not_panic() {
        let sampler = ResourceSampler::new();
        let usage = sampler.sample();
        if let Some(cpu) = usage.cpu_percent {
            assert!(cpu >= 0.0);
        }
    }
}
