//! Trial window evaluation.
//!
//! A trial starts at the account's signup instant and lasts a fixed window
//! (seven days unless configured otherwise). The end instant itself already
//! counts as expired. All arithmetic is floor-only: the countdown may show
//! less time than is really left, never more.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_MINUTE: u64 = 60;
pub const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
pub const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

/// Default trial length.
pub const DEFAULT_TRIAL_DAYS: i64 = 7;

/// Longest trial window a configuration may ask for.
pub const MAX_TRIAL_DAYS: i64 = 3650;

/// Fixed-length trial window anchored at signup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialWindow {
    length: Duration,
}

impl TrialWindow {
    /// Windows shorter than one millisecond are widened to one millisecond.
    pub fn new(length: Duration) -> Self {
        Self {
            length: length.max(Duration::milliseconds(1)),
        }
    }

    pub fn days(days: i64) -> Self {
        Self::new(Duration::days(days))
    }

    pub fn length(&self) -> Duration {
        self.length
    }

    /// End of the window, saturating at the latest representable instant.
    pub fn ends_at(&self, signup: DateTime<Utc>) -> DateTime<Utc> {
        signup
            .checked_add_signed(self.length)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for TrialWindow {
    fn default() -> Self {
        Self::days(DEFAULT_TRIAL_DAYS)
    }
}

/// Remaining trial time, broken down largest unit first.
///
/// `days * 86400 + hours * 3600 + minutes * 60 + seconds == total_seconds`
/// always holds. `total_hours` and `total_minutes` are floors of the same total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRemaining {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub total_hours: u64,
    pub total_minutes: u64,
    pub total_seconds: u64,
}

impl TimeRemaining {
    pub const ZERO: TimeRemaining = TimeRemaining {
        days: 0,
        hours: 0,
        minutes: 0,
        seconds: 0,
        total_hours: 0,
        total_minutes: 0,
        total_seconds: 0,
    };

    pub fn from_total_seconds(total_seconds: u64) -> Self {
        Self {
            days: total_seconds / SECONDS_PER_DAY,
            hours: (total_seconds % SECONDS_PER_DAY) / SECONDS_PER_HOUR,
            minutes: (total_seconds % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE,
            seconds: total_seconds % SECONDS_PER_MINUTE,
            total_hours: total_seconds / SECONDS_PER_HOUR,
            total_minutes: total_seconds / SECONDS_PER_MINUTE,
            total_seconds,
        }
    }

    /// Negative input is clamped to zero; sub-second remainders are dropped.
    pub fn from_millis(remaining_ms: i64) -> Self {
        Self::from_total_seconds(remaining_ms.max(0) as u64 / 1000)
    }

    pub fn is_zero(&self) -> bool {
        self.total_seconds == 0
    }

    /// Whole days left, floored.
    pub fn days_remaining(&self) -> u64 {
        self.days
    }
}

/// Where `now` falls relative to a user's trial window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TrialStatus {
    Active { ends_at: DateTime<Utc> },
    Expired { expired_at: DateTime<Utc> },
    /// `now` is earlier than signup. Treated as a fresh, full window.
    ClockSkew { ends_at: DateTime<Utc> },
}

impl TrialStatus {
    pub fn is_in_trial(&self) -> bool {
        matches!(self, TrialStatus::Active { .. } | TrialStatus::ClockSkew { .. })
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        match self {
            TrialStatus::Active { ends_at } | TrialStatus::ClockSkew { ends_at } => *ends_at,
            TrialStatus::Expired { expired_at } => *expired_at,
        }
    }
}

/// Result of one evaluation of the trial window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialEvaluation {
    pub status: TrialStatus,
    pub remaining: TimeRemaining,
}

impl TrialEvaluation {
    pub fn is_in_trial(&self) -> bool {
        self.status.is_in_trial()
    }
}

/// Evaluate the trial window at `now`.
pub fn evaluate_trial(
    signup: DateTime<Utc>,
    now: DateTime<Utc>,
    window: &TrialWindow,
) -> TrialEvaluation {
    let ends_at = window.ends_at(signup);

    if now < signup {
        tracing::debug!(
            "Clock is {}ms behind signup instant, clamping to full trial window",
            (signup - now).num_milliseconds()
        );
        return TrialEvaluation {
            status: TrialStatus::ClockSkew { ends_at },
            remaining: TimeRemaining::from_millis(window.length().num_milliseconds()),
        };
    }

    if now >= ends_at {
        return TrialEvaluation {
            status: TrialStatus::Expired { expired_at: ends_at },
            remaining: TimeRemaining::ZERO,
        };
    }

    TrialEvaluation {
        status: TrialStatus::Active { ends_at },
        remaining: TimeRemaining::from_millis((ends_at - now).num_milliseconds()),
    }
}

/// Time left in the trial window at `now`.
pub fn compute_time_remaining(
    signup: DateTime<Utc>,
    now: DateTime<Utc>,
    window: &TrialWindow,
) -> TimeRemaining {
    evaluate_trial(signup, now, window).remaining
}

/// Whether `now` is still inside the trial window.
pub fn is_in_trial(signup: DateTime<Utc>, now: DateTime<Utc>, window: &TrialWindow) -> bool {
    evaluate_trial(signup, now, window).is_in_trial()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signup() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn assert_decomposition(r: &TimeRemaining) {
        assert_eq!(
            r.days * SECONDS_PER_DAY
                + r.hours * SECONDS_PER_HOUR
                + r.minutes * SECONDS_PER_MINUTE
                + r.seconds,
            r.total_seconds
        );
        assert!(r.hours < 24);
        assert!(r.minutes < 60);
        assert!(r.seconds < 60);
    }

    #[test]
    fn test_full_window_at_signup() {
        let eval = evaluate_trial(signup(), signup(), &TrialWindow::default());
        assert!(eval.is_in_trial());
        assert_eq!(eval.remaining.days, 7);
        assert_eq!(eval.remaining.hours, 0);
        assert_eq!(eval.remaining.minutes, 0);
        assert_eq!(eval.remaining.seconds, 0);
        assert_eq!(eval.remaining.total_hours, 168);
        assert_eq!(eval.remaining.total_minutes, 168 * 60);
        assert_eq!(eval.remaining.total_seconds, 7 * SECONDS_PER_DAY);
    }

    #[test]
    fn test_expired_exactly_at_window_end() {
        let now = Utc.with_ymd_and_hms(2025, 1, 8, 0, 0, 0).unwrap();
        let eval = evaluate_trial(signup(), now, &TrialWindow::default());
        assert!(!eval.is_in_trial());
        assert_eq!(eval.remaining, TimeRemaining::ZERO);
        assert_eq!(
            eval.status,
            TrialStatus::Expired {
                expired_at: now
            }
        );
    }

    #[test]
    fn test_one_millisecond_before_end_is_still_trial() {
        let now = signup() + Duration::days(7) - Duration::milliseconds(1);
        let eval = evaluate_trial(signup(), now, &TrialWindow::default());
        assert!(eval.is_in_trial());
        // Sub-second remainder is floored away, never rounded up
        assert_eq!(eval.remaining, TimeRemaining::ZERO);
    }

    #[test]
    fn test_clock_skew_clamps_to_full_window() {
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap();
        let eval = evaluate_trial(signup(), now, &TrialWindow::default());
        assert!(eval.is_in_trial());
        assert!(matches!(eval.status, TrialStatus::ClockSkew { .. }));
        assert_eq!(eval.remaining.days, 7);
        assert_eq!(eval.remaining.total_seconds, 7 * SECONDS_PER_DAY);
    }

    #[test]
    fn test_floor_decomposition_mid_window() {
        // 2 days, 3 hours, 4 minutes, 5.999 seconds left
        let left = Duration::days(2)
            + Duration::hours(3)
            + Duration::minutes(4)
            + Duration::milliseconds(5_999);
        let now = signup() + Duration::days(7) - left;
        let r = compute_time_remaining(signup(), now, &TrialWindow::default());
        assert_eq!((r.days, r.hours, r.minutes, r.seconds), (2, 3, 4, 5));
        assert_eq!(r.total_hours, 51);
        assert_eq!(r.total_minutes, 51 * 60 + 4);
        assert_decomposition(&r);
    }

    #[test]
    fn test_decomposition_holds_across_window() {
        let window = TrialWindow::default();
        let mut offset = -3_600_i64;
        while offset < 8 * SECONDS_PER_DAY as i64 {
            let now = signup() + Duration::seconds(offset) + Duration::milliseconds(offset % 997);
            let r = compute_time_remaining(signup(), now, &window);
            assert_decomposition(&r);
            assert!(r.total_seconds <= 7 * SECONDS_PER_DAY);
            offset += 7_919;
        }
    }

    #[test]
    fn test_in_trial_matches_window_bounds() {
        let window = TrialWindow::default();
        let end = window.ends_at(signup());
        for hours in 0..=(8 * 24) {
            let now = signup() + Duration::hours(hours);
            assert_eq!(is_in_trial(signup(), now, &window), now < end);
        }
    }

    #[test]
    fn test_trial_flips_once() {
        let window = TrialWindow::default();
        let mut transitions = 0;
        let mut previous = true;
        for minutes in (0..(10 * 24 * 60)).step_by(37) {
            let current = is_in_trial(signup(), signup() + Duration::minutes(minutes), &window);
            if current != previous {
                assert!(previous && !current);
                transitions += 1;
            }
            previous = current;
        }
        assert_eq!(transitions, 1);
    }

    #[test]
    fn test_custom_window_length() {
        let window = TrialWindow::new(Duration::hours(2));
        let now = signup() + Duration::minutes(30);
        let r = compute_time_remaining(signup(), now, &window);
        assert_eq!((r.days, r.hours, r.minutes), (0, 1, 30));
        assert!(!is_in_trial(signup(), signup() + Duration::hours(2), &window));
    }

    #[test]
    fn test_status_serialization() {
        let status = TrialStatus::Active {
            ends_at: signup() + Duration::days(7),
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn test_oversized_window_saturates_instead_of_overflowing() {
        let window = TrialWindow::new(Duration::days(100_000_000));
        assert_eq!(window.ends_at(signup()), DateTime::<Utc>::MAX_UTC);

        let eval = evaluate_trial(signup(), signup(), &window);
        assert!(eval.is_in_trial());
        assert!(eval.remaining.days > 100_000);
    }
}
