//! Publish throttling and clock gap detection
//!
//! The refresh loop checks the clock often but republishes rarely:
//!
//! ```text
//! tick(now)
//!     │
//!     ▼
//! ┌──────────────────┐
//! │ ClockGapDetector │ → Backward or large forward jump forces a publish
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  PublishThrottle │ → Routine publish only after `publish_interval`
//! └────────┬─────────┘
//!          │
//!          ▼
//!   RefreshDecision
//! ```
//!
//! Both components work on wall-clock instants. Nothing is extrapolated from
//! previous ticks: after a gap the snapshot is recomputed from `now` and the
//! signup instant.

use chrono::{DateTime, Duration, Utc};

/// Gate for routine (tick-driven) snapshot publishes
#[derive(Debug)]
pub struct PublishThrottle {
    /// Instant of the last applied publish
    last_publish: Option<DateTime<Utc>>,
    /// Minimum spacing between routine publishes
    interval: Duration,
}

impl PublishThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_publish: None,
            interval,
        }
    }

    /// Whether a routine publish is due at `now`
    ///
    /// A `now` earlier than the last publish means the clock went backwards,
    /// so the last publish cannot be trusted and a publish is due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_publish {
            None => true,
            Some(last) if now < last => true,
            Some(last) => now - last >= self.interval,
        }
    }

    /// Record that a snapshot was published at `now`
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.last_publish = Some(now);
    }

    pub fn last_publish(&self) -> Option<DateTime<Utc>> {
        self.last_publish
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn reset(&mut self) {
        self.last_publish = None;
    }
}

/// A discontinuity between two consecutive ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockGap {
    /// Clock moved backwards by this much
    Backward(Duration),
    /// Clock moved forward by more than the allowed tick gap
    Forward(Duration),
}

/// Detects device sleep/wake and clock corrections between ticks
#[derive(Debug)]
pub struct ClockGapDetector {
    /// Instant observed on the previous tick
    last_tick: Option<DateTime<Utc>>,
    /// Largest forward step still considered a normal tick
    max_gap: Duration,
}

impl ClockGapDetector {
    pub fn new(max_gap: Duration) -> Self {
        Self {
            last_tick: None,
            max_gap,
        }
    }

    /// Record a tick at `now` and report a gap relative to the previous one
    pub fn observe(&mut self, now: DateTime<Utc>) -> Option<ClockGap> {
        let previous = self.last_tick.replace(now)?;

        if now < previous {
            let delta = previous - now;
            tracing::warn!("Clock moved backwards by {}ms", delta.num_milliseconds());
            return Some(ClockGap::Backward(delta));
        }

        let delta = now - previous;
        if delta > self.max_gap {
            tracing::warn!(
                "Clock jumped forward by {}s (max tick gap {}s)",
                delta.num_seconds(),
                self.max_gap.num_seconds()
            );
            return Some(ClockGap::Forward(delta));
        }

        None
    }

    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        self.last_tick
    }

    pub fn reset(&mut self) {
        self.last_tick = None;
    }
}
