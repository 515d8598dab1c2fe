//! Live refresh scheduling
//!
//! Decides, on every clock tick, whether the published entitlement snapshot
//! should be recomputed and replaced. Ticks arrive often (1s by default) so a
//! countdown can stay live, but routine republishes are throttled (5s by
//! default) to keep consumers from churning.
//!
//! ## Forced publishes
//!
//! The throttle only applies to routine ticks. A publish always goes out
//! immediately when:
//!
//! - the subscription lookup resolves or an upgrade arrives
//! - the signed-in identity changes
//! - a clock gap is detected (sleep/wake, manual clock change)
//! - the trial expires between two publishes
//!
//! The first two are requested by the session via [`RefreshScheduler::force`];
//! the clock gap is detected here.

pub mod throttle;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;

pub use throttle::{ClockGap, ClockGapDetector, PublishThrottle};

/// Why a publish is going out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishReason {
    /// Routine tick after the throttle interval
    Interval,
    /// Clock discontinuity between ticks
    ClockGap(ClockGap),
    /// Identity or subscription change
    StateChange,
    /// Trial expired before the throttle interval elapsed
    TrialBoundary,
}

/// Outcome of a scheduler check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    Publish(PublishReason),
    Skip,
}

impl RefreshDecision {
    pub fn should_publish(&self) -> bool {
        matches!(self, RefreshDecision::Publish(_))
    }
}

/// Statistics about scheduler operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshStats {
    /// Total ticks observed
    pub ticks: u64,
    /// Snapshots actually replaced
    pub publishes: u64,
    /// Ticks skipped by the throttle
    pub throttled: u64,
    /// Clock gaps detected
    pub clock_gaps: u64,
    /// Publishes that bypassed the throttle
    pub forced: u64,
}

/// Tick-driven republish scheduler
#[derive(Debug)]
pub struct RefreshScheduler {
    throttle: PublishThrottle,
    gap_detector: ClockGapDetector,
    stats: RefreshStats,
}

impl RefreshScheduler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            throttle: PublishThrottle::new(to_chrono(config.publish_interval)),
            gap_detector: ClockGapDetector::new(to_chrono(config.max_tick_gap)),
            stats: RefreshStats::default(),
        }
    }

    /// Check a clock tick at `now`
    pub fn on_tick(&mut self, now: DateTime<Utc>) -> RefreshDecision {
        self.stats.ticks += 1;

        if let Some(gap) = self.gap_detector.observe(now) {
            self.stats.clock_gaps += 1;
            return RefreshDecision::Publish(PublishReason::ClockGap(gap));
        }

        if self.throttle.is_due(now) {
            RefreshDecision::Publish(PublishReason::Interval)
        } else {
            self.stats.throttled += 1;
            RefreshDecision::Skip
        }
    }

    /// Request a publish that bypasses the throttle
    pub fn force(&mut self, reason: PublishReason) -> RefreshDecision {
        self.stats.forced += 1;
        RefreshDecision::Publish(reason)
    }

    /// Record that a snapshot was actually replaced at `now`
    pub fn record_publish(&mut self, now: DateTime<Utc>) {
        self.stats.publishes += 1;
        self.throttle.record(now);
    }

    /// Undo a throttled-skip count when the tick ended up publishing anyway
    pub(crate) fn unthrottle(&mut self) {
        self.stats.throttled = self.stats.throttled.saturating_sub(1);
    }

    pub fn stats(&self) -> &RefreshStats {
        &self.stats
    }

    /// Forget tick history, e.g. on identity change
    pub fn reset(&mut self) {
        self.throttle.reset();
        self.gap_detector.reset();
    }
}

fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
