//! Engine configuration
//!
//! Trial length and refresh cadence. These are product constants, not
//! invariants, but the publish cadence must stay far below the trial length.

use std::time::Duration;

use thiserror::Error;

use crate::entitlements::{TrialWindow, MAX_TRIAL_DAYS};

/// Configuration for an entitlement engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Length of the free trial after signup (default: 7 days)
    pub trial_window: Duration,
    /// How often the clock is checked (default: 1 second)
    pub tick_interval: Duration,
    /// Minimum time between routine snapshot republishes (default: 5 seconds)
    pub publish_interval: Duration,
    /// Tick-to-tick jump treated as a clock gap, e.g. after sleep (default: 30 seconds)
    pub max_tick_gap: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trial_window: Duration::from_secs(7 * 24 * 60 * 60),
            tick_interval: Duration::from_secs(1),
            publish_interval: Duration::from_secs(5),
            max_tick_gap: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Publish on every tick. Useful for a live seconds counter.
    pub fn realtime() -> Self {
        Self {
            publish_interval: Duration::from_secs(1),
            ..Default::default()
        }
    }

    pub fn with_trial_window(mut self, window: Duration) -> Self {
        self.trial_window = window;
        self
    }

    pub fn window(&self) -> Result<TrialWindow, EngineConfigError> {
        TrialWindow::try_from(self.trial_window)
    }

    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if self.trial_window.is_zero() {
            return Err(EngineConfigError::Zero("trial_window"));
        }
        self.window()?;
        if self.tick_interval.is_zero() {
            return Err(EngineConfigError::Zero("tick_interval"));
        }
        if self.publish_interval.is_zero() {
            return Err(EngineConfigError::Zero("publish_interval"));
        }
        if self.tick_interval > self.publish_interval {
            return Err(EngineConfigError::TickSlowerThanPublish {
                tick: self.tick_interval,
                publish: self.publish_interval,
            });
        }
        if self.publish_interval >= self.trial_window {
            return Err(EngineConfigError::PublishNotBelowWindow {
                publish: self.publish_interval,
                window: self.trial_window,
            });
        }
        if self.max_tick_gap < self.tick_interval {
            return Err(EngineConfigError::GapBelowTick {
                gap: self.max_tick_gap,
                tick: self.tick_interval,
            });
        }
        Ok(())
    }
}

impl TryFrom<Duration> for TrialWindow {
    type Error = EngineConfigError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        let max = chrono::Duration::days(MAX_TRIAL_DAYS);
        match chrono::Duration::from_std(value) {
            Ok(length) if length <= max => Ok(TrialWindow::new(length)),
            _ => Err(EngineConfigError::TrialWindowTooLong {
                window: value,
                max_days: MAX_TRIAL_DAYS,
            }),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineConfigError {
    #[error("{0} must be > 0")]
    Zero(&'static str),
    #[error("tick_interval ({tick:?}) must not exceed publish_interval ({publish:?})")]
    TickSlowerThanPublish { tick: Duration, publish: Duration },
    #[error("publish_interval ({publish:?}) must be shorter than trial_window ({window:?})")]
    PublishNotBelowWindow { publish: Duration, window: Duration },
    #[error("max_tick_gap ({gap:?}) must be at least tick_interval ({tick:?})")]
    GapBelowTick { gap: Duration, tick: Duration },
    #[error("trial_window ({window:?}) must not exceed {max_days} days")]
    TrialWindowTooLong { window: Duration, max_days: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window().unwrap().length(), chrono::Duration::days(7));
    }

    #[test]
    fn test_realtime_config() {
        let config = EngineConfig::realtime();
        assert!(config.validate().is_ok());
        assert_eq!(config.publish_interval, config.tick_interval);
    }

    #[test]
    fn test_rejects_zero_values() {
        let config = EngineConfig {
            tick_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(EngineConfigError::Zero("tick_interval"))
        );
    }

    #[test]
    fn test_rejects_publish_cadence_near_window() {
        let config = EngineConfig::default().with_trial_window(Duration::from_secs(5));
        assert!(matches!(
            config.validate(),
            Err(EngineConfigError::PublishNotBelowWindow { .. })
        ));
    }

    #[test]
    fn test_rejects_tick_slower_than_publish() {
        let config = EngineConfig {
            tick_interval: Duration::from_secs(10),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineConfigError::TickSlowerThanPublish { .. })
        ));
    }

    #[test]
    fn test_rejects_gap_below_tick() {
        let config = EngineConfig {
            max_tick_gap: Duration::from_millis(500),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(EngineConfigError::GapBelowTick {
                gap: Duration::from_millis(500),
                tick: Duration::from_secs(1),
            })
        );
    }

    #[test]
    fn test_rejects_trial_window_beyond_cap() {
        let days = |n: u64| Duration::from_secs(n * 24 * 60 * 60);

        let config = EngineConfig::default().with_trial_window(days(100_000_000));
        assert!(matches!(
            config.validate(),
            Err(EngineConfigError::TrialWindowTooLong { .. })
        ));
        assert!(config.window().is_err());

        // Too large for chrono at all: rejected, not replaced with a default
        let config = EngineConfig::default().with_trial_window(Duration::MAX);
        assert!(matches!(
            config.window(),
            Err(EngineConfigError::TrialWindowTooLong { .. })
        ));

        let config = EngineConfig::default().with_trial_window(days(MAX_TRIAL_DAYS as u64));
        assert!(config.validate().is_ok());
    }
}
