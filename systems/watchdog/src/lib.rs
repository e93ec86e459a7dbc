#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Stall detection for the fuse and collapse phases.
//!
//! The lifecycle reports whether each watched tick made progress. Runs of
//! non-productive ticks escalate from a single warning to an abort, which
//! optionally asks the lifecycle to skip ahead to dissipation.

use collapse_core::{Event, StallKind, WatchdogConfig};
use collapse_system_snapshot::{CounterRecord, WatchdogRecord};
use log::{error, warn};

/// Outcome of a single watchdog observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Escalation {
    /// Nothing noteworthy happened.
    None,
    /// The warning threshold was crossed on this tick.
    Warned,
    /// The abort threshold was reached; the counter restarted.
    Aborted {
        /// Indicates whether the lifecycle should skip to dissipation.
        auto_skip: bool,
    },
}

impl Escalation {
    /// Reports whether the lifecycle was asked to skip to dissipation.
    #[must_use]
    pub const fn requests_skip(self) -> bool {
        matches!(self, Self::Aborted { auto_skip: true })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct StallCounter {
    kind: StallKind,
    enabled: bool,
    warn_ticks: u64,
    abort_ticks: u64,
    auto_skip: bool,
    count: u64,
    warned: bool,
}

impl StallCounter {
    fn observe(&mut self, productive: bool, context: &str, out: &mut Vec<Event>) -> Escalation {
        if !self.enabled {
            return Escalation::None;
        }
        if productive {
            self.reset();
            return Escalation::None;
        }

        self.count = self.count.saturating_add(1);

        if self.count >= self.abort_ticks {
            let ticks = self.count;
            error!(
                "{} stalled for {ticks} ticks ({context}); {}",
                self.kind,
                if self.auto_skip {
                    "skipping to dissipation"
                } else {
                    "auto-skip disabled"
                }
            );
            out.push(Event::StallAbort {
                kind: self.kind,
                ticks,
                auto_skip: self.auto_skip,
            });
            self.reset();
            return Escalation::Aborted {
                auto_skip: self.auto_skip,
            };
        }

        if !self.warned && self.count >= self.warn_ticks {
            self.warned = true;
            warn!(
                "{} has not progressed for {} ticks ({context})",
                self.kind, self.count
            );
            out.push(Event::StallWarning {
                kind: self.kind,
                ticks: self.count,
            });
            return Escalation::Warned;
        }

        Escalation::None
    }

    fn reset(&mut self) {
        self.count = 0;
        self.warned = false;
    }

    fn record(&self) -> CounterRecord {
        CounterRecord {
            count: self.count,
            warned: self.warned,
        }
    }

    fn restore(&mut self, record: CounterRecord) {
        self.count = record.count;
        self.warned = record.warned;
    }
}

/// Stall monitor owning one counter per watched phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchdogMonitor {
    fuse: StallCounter,
    collapse: StallCounter,
}

impl WatchdogMonitor {
    /// Creates a monitor with both counters at zero.
    #[must_use]
    pub fn new(config: &WatchdogConfig) -> Self {
        let fuse_abort = config.fuse.max_extra_ticks.max(1);
        Self {
            fuse: StallCounter {
                kind: StallKind::Fuse,
                enabled: config.fuse.enabled,
                warn_ticks: (fuse_abort / 2).max(1),
                abort_ticks: fuse_abort,
                auto_skip: config.fuse.auto_skip,
                count: 0,
                warned: false,
            },
            collapse: StallCounter {
                kind: StallKind::Collapse,
                enabled: config.collapse.enabled,
                warn_ticks: config.collapse.warn_ticks.max(1),
                abort_ticks: config.collapse.abort_ticks.max(1),
                auto_skip: config.collapse.auto_skip,
                count: 0,
                warned: false,
            },
        }
    }

    /// Restores a monitor from persisted counters.
    #[must_use]
    pub fn from_record(config: &WatchdogConfig, record: &WatchdogRecord) -> Self {
        let mut monitor = Self::new(config);
        monitor.fuse.restore(record.fuse);
        monitor.collapse.restore(record.collapse);
        monitor
    }

    /// Records the outcome of one watched tick.
    pub fn observe(
        &mut self,
        kind: StallKind,
        productive: bool,
        context: &str,
        out: &mut Vec<Event>,
    ) -> Escalation {
        self.counter_mut(kind).observe(productive, context, out)
    }

    /// Consecutive non-productive ticks observed for the counter.
    #[must_use]
    pub fn stalled_ticks(&self, kind: StallKind) -> u64 {
        match kind {
            StallKind::Fuse => self.fuse.count,
            StallKind::Collapse => self.collapse.count,
        }
    }

    /// Clears both counters. Called on every phase transition.
    pub fn reset(&mut self) {
        self.fuse.reset();
        self.collapse.reset();
    }

    /// Captures both counters for persistence.
    #[must_use]
    pub fn record(&self) -> WatchdogRecord {
        WatchdogRecord {
            fuse: self.fuse.record(),
            collapse: self.collapse.record(),
        }
    }

    fn counter_mut(&mut self, kind: StallKind) -> &mut StallCounter {
        match kind {
            StallKind::Fuse => &mut self.fuse,
            StallKind::Collapse => &mut self.collapse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collapse_core::{CollapseWatchdogConfig, FuseWatchdogConfig};

    fn stall(monitor: &mut WatchdogMonitor, kind: StallKind, ticks: u64) -> Vec<Escalation> {
        let mut events = Vec::new();
        (0..ticks)
            .map(|_| monitor.observe(kind, false, "test", &mut events))
            .collect()
    }

    #[test]
    fn collapse_counter_warns_once_then_aborts() {
        let mut monitor = WatchdogMonitor::new(&WatchdogConfig::default());
        let mut events = Vec::new();
        let mut outcomes = Vec::new();
        for _ in 0..400 {
            outcomes.push(monitor.observe(StallKind::Collapse, false, "test", &mut events));
        }

        assert_eq!(outcomes[198], Escalation::None);
        assert_eq!(outcomes[199], Escalation::Warned);
        assert_eq!(outcomes[399], Escalation::Aborted { auto_skip: true });
        assert_eq!(
            outcomes
                .iter()
                .filter(|outcome| **outcome == Escalation::Warned)
                .count(),
            1
        );
        assert_eq!(
            events,
            vec![
                Event::StallWarning {
                    kind: StallKind::Collapse,
                    ticks: 200,
                },
                Event::StallAbort {
                    kind: StallKind::Collapse,
                    ticks: 400,
                    auto_skip: true,
                },
            ]
        );
        assert_eq!(monitor.stalled_ticks(StallKind::Collapse), 0);
    }

    #[test]
    fn progress_resets_the_run() {
        let mut monitor = WatchdogMonitor::new(&WatchdogConfig::default());
        let _ = stall(&mut monitor, StallKind::Collapse, 399);
        let mut events = Vec::new();
        assert_eq!(
            monitor.observe(StallKind::Collapse, true, "test", &mut events),
            Escalation::None
        );
        assert_eq!(monitor.stalled_ticks(StallKind::Collapse), 0);
        assert!(stall(&mut monitor, StallKind::Collapse, 399)
            .iter()
            .all(|outcome| !outcome.requests_skip()));
    }

    #[test]
    fn fuse_thresholds_derive_from_max_extra_ticks() {
        let config = WatchdogConfig {
            fuse: FuseWatchdogConfig {
                enabled: true,
                max_extra_ticks: 10,
                auto_skip: false,
            },
            collapse: CollapseWatchdogConfig::default(),
        };
        let mut monitor = WatchdogMonitor::new(&config);
        let outcomes = stall(&mut monitor, StallKind::Fuse, 10);
        assert_eq!(outcomes[4], Escalation::Warned);
        assert_eq!(outcomes[9], Escalation::Aborted { auto_skip: false });
        assert!(!outcomes[9].requests_skip());
    }

    #[test]
    fn disabled_counter_never_escalates() {
        let mut config = WatchdogConfig::default();
        config.collapse.enabled = false;
        let mut monitor = WatchdogMonitor::new(&config);
        assert!(stall(&mut monitor, StallKind::Collapse, 1_000)
            .iter()
            .all(|outcome| *outcome == Escalation::None));
    }

    #[test]
    fn counters_survive_persistence() {
        let config = WatchdogConfig::default();
        let mut monitor = WatchdogMonitor::new(&config);
        let _ = stall(&mut monitor, StallKind::Collapse, 250);
        let restored = WatchdogMonitor::from_record(&config, &monitor.record());
        assert_eq!(restored, monitor);
        let mut restored = restored;
        let outcomes = stall(&mut restored, StallKind::Collapse, 150);
        assert!(outcomes[..149].iter().all(|o| *o == Escalation::None));
        assert!(outcomes[149].requests_skip());
    }
}
