//! Load Monitor Module
//!
//! Counts upstream operations in flight and raises leveled alerts as the
//! count climbs. Purely observational: it never rejects or delays work.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use tracing::{error, info, warn};

// == Load Level ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadLevel {
    Warning,
    High,
    Critical,
}

impl fmt::Display for LoadLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadLevel::Warning => write!(f, "warning"),
            LoadLevel::High => write!(f, "high"),
            LoadLevel::Critical => write!(f, "critical"),
        }
    }
}

// == Thresholds ==
/// Ascending alert thresholds on the in-flight count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadThresholds {
    pub warning: usize,
    pub high: usize,
    pub critical: usize,
}

impl Default for LoadThresholds {
    fn default() -> Self {
        Self {
            warning: 10,
            high: 25,
            critical: 50,
        }
    }
}

impl LoadThresholds {
    /// Level whose threshold is exactly `active`, if any.
    fn crossed_by(&self, active: usize) -> Option<LoadLevel> {
        if active == self.critical {
            Some(LoadLevel::Critical)
        } else if active == self.high {
            Some(LoadLevel::High)
        } else if active == self.warning {
            Some(LoadLevel::Warning)
        } else {
            None
        }
    }
}

// == Monitor Snapshot ==
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub active: usize,
    pub peak: usize,
    pub warning_alerts: u64,
    pub high_alerts: u64,
    pub critical_alerts: u64,
}

// == Load Monitor ==
#[derive(Debug)]
pub struct LoadMonitor {
    thresholds: LoadThresholds,
    active: AtomicUsize,
    peak: AtomicUsize,
    alerts: [AtomicU64; 3],
}

impl LoadMonitor {
    pub fn new(thresholds: LoadThresholds) -> Self {
        Self {
            thresholds,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            alerts: Default::default(),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    // == Increment ==
    /// Records one more in-flight operation.
    ///
    /// Returns the level alerted by this increment. Only the increment that
    /// lands exactly on a threshold alerts, so climbing past a threshold
    /// emits one event and staying above it emits none.
    pub fn increment_active(&self) -> Option<LoadLevel> {
        let active = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(active, Ordering::AcqRel);

        let level = self.thresholds.crossed_by(active)?;
        self.alerts[level as usize].fetch_add(1, Ordering::Relaxed);
        match level {
            LoadLevel::Warning => info!(active, "Upstream load reached warning level"),
            LoadLevel::High => warn!(active, "Upstream load reached high level"),
            LoadLevel::Critical => error!(active, "Upstream load reached critical level"),
        }
        Some(level)
    }

    // == Decrement ==
    pub fn decrement_active(&self) {
        // Saturate at zero so an unbalanced decrement cannot wrap around
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Increments now and decrements when the returned guard drops, covering
    /// every exit path of the tracked operation.
    pub fn track(&self) -> ActiveGuard<'_> {
        self.increment_active();
        ActiveGuard { monitor: self }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            active: self.active(),
            peak: self.peak.load(Ordering::Acquire),
            warning_alerts: self.alerts[LoadLevel::Warning as usize].load(Ordering::Relaxed),
            high_alerts: self.alerts[LoadLevel::High as usize].load(Ordering::Relaxed),
            critical_alerts: self.alerts[LoadLevel::Critical as usize].load(Ordering::Relaxed),
        }
    }
}

impl Default for LoadMonitor {
    fn default() -> Self {
        Self::new(LoadThresholds::default())
    }
}

// == Active Guard ==
#[must_use = "dropping the guard immediately ends the tracked operation"]
pub struct ActiveGuard<'a> {
    monitor: &'a LoadMonitor,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.monitor.decrement_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> LoadMonitor {
        LoadMonitor::new(LoadThresholds {
            warning: 3,
            high: 5,
            critical: 7,
        })
    }

    #[test]
    fn test_warning_emitted_once_on_crossing() {
        let monitor = monitor();

        assert_eq!(monitor.increment_active(), None);
        assert_eq!(monitor.increment_active(), None);
        assert_eq!(monitor.increment_active(), Some(LoadLevel::Warning));
        // Above warning but below high: silent
        assert_eq!(monitor.increment_active(), None);

        assert_eq!(monitor.snapshot().warning_alerts, 1);
    }

    #[test]
    fn test_each_level_fires() {
        let monitor = monitor();
        let levels: Vec<_> = (0..8).filter_map(|_| monitor.increment_active()).collect();

        assert_eq!(
            levels,
            vec![LoadLevel::Warning, LoadLevel::High, LoadLevel::Critical]
        );
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.high_alerts, 1);
        assert_eq!(snapshot.critical_alerts, 1);
        assert_eq!(snapshot.peak, 8);
    }

    #[test]
    fn test_recrossing_alerts_again() {
        let monitor = monitor();
        for _ in 0..3 {
            monitor.increment_active();
        }
        monitor.decrement_active();
        assert_eq!(monitor.increment_active(), Some(LoadLevel::Warning));
        assert_eq!(monitor.snapshot().warning_alerts, 2);
    }

    #[test]
    fn test_decrement_saturates() {
        let monitor = monitor();
        monitor.decrement_active();
        assert_eq!(monitor.active(), 0);
    }

    #[test]
    fn test_guard_decrements_on_drop() {
        let monitor = monitor();
        {
            let _a = monitor.track();
            let _b = monitor.track();
            assert_eq!(monitor.active(), 2);
        }
        assert_eq!(monitor.active(), 0);
        assert_eq!(monitor.snapshot().peak, 2);
    }

    #[test]
    fn test_guard_decrements_on_panic() {
        let monitor = monitor();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = monitor.track();
            panic!("upstream handler blew up");
        }));
        assert!(result.is_err());
        assert_eq!(monitor.active(), 0);
    }
}
