//! Published entitlement snapshots.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capabilities::{Capability, CapabilityMatrix};
use crate::entitlements::TimeRemaining;
use crate::identity::UserId;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    /// No signed-in user
    Unauthenticated,
    /// Signed in, membership lookup in flight
    Resolving,
    /// Unpaid, inside the trial window
    ActiveTrial,
    /// Paying member
    ActivePaid,
    /// Unpaid and trial over, or membership unknown
    ActiveExpired,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Unauthenticated => "unauthenticated",
            SessionPhase::Resolving => "resolving",
            SessionPhase::ActiveTrial => "active_trial",
            SessionPhase::ActivePaid => "active_paid",
            SessionPhase::ActiveExpired => "active_expired",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable, fully resolved view of what the user may do right now.
///
/// Serializes to the flat shape UI callers consume:
/// `isInTrial`, `daysRemaining`, `timeRemaining`, `isPaidUser`, the eight
/// `can*` flags and `loading`, plus `phase` and `userId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSnapshot {
    pub phase: SessionPhase,
    pub user_id: Option<UserId>,
    pub days_remaining: u64,
    pub time_remaining: TimeRemaining,
    #[serde(flatten)]
    pub capabilities: Arc<CapabilityMatrix>,
}

impl EntitlementSnapshot {
    pub fn signed_out() -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            user_id: None,
            days_remaining: 0,
            time_remaining: TimeRemaining::ZERO,
            capabilities: Arc::new(CapabilityMatrix::signed_out()),
        }
    }

    pub fn is_in_trial(&self) -> bool {
        self.capabilities.is_in_trial
    }

    pub fn is_paid_user(&self) -> bool {
        self.capabilities.is_paid_user
    }

    pub fn loading(&self) -> bool {
        self.capabilities.loading
    }

    pub fn has(&self, cap: Capability) -> bool {
        self.capabilities.has(cap)
    }
}

impl Default for EntitlementSnapshot {
    fn default() -> Self {
        Self::signed_out()
    }
}

/// Inputs that determine a capability matrix. Deliberately excludes the
/// countdown so ticks inside one bucket reuse the same matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct MemoKey {
    pub generation: u64,
    pub paid: Option<bool>,
    pub in_trial: bool,
    pub loading: bool,
}

/// Single-entry cache for the current capability matrix
#[derive(Debug, Default)]
pub(crate) struct CapabilityMemo {
    entry: Option<(MemoKey, Arc<CapabilityMatrix>)>,
}

impl CapabilityMemo {
    pub fn get_or_resolve(
        &mut self,
        key: MemoKey,
        resolve: impl FnOnce() -> CapabilityMatrix,
    ) -> Arc<CapabilityMatrix> {
        if let Some((cached_key, matrix)) = &self.entry {
            if *cached_key == key {
                return Arc::clone(matrix);
            }
        }
        let matrix = Arc::new(resolve());
        self.entry = Some((key, Arc::clone(&matrix)));
        matrix
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::resolve_capabilities;

    #[test]
    fn test_snapshot_wire_shape() {
        let snapshot = EntitlementSnapshot {
            phase: SessionPhase::ActiveTrial,
            user_id: Some(UserId::new("ash")),
            days_remaining: 6,
            time_remaining: TimeRemaining::from_total_seconds(6 * 86_400 + 30),
            capabilities: Arc::new(resolve_capabilities(false, true)),
        };
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["phase"], "activeTrial");
        assert_eq!(json["userId"], "ash");
        assert_eq!(json["isInTrial"], true);
        assert_eq!(json["daysRemaining"], 6);
        assert_eq!(json["timeRemaining"]["days"], 6);
        assert_eq!(json["timeRemaining"]["seconds"], 30);
        assert_eq!(json["isPaidUser"], false);
        assert_eq!(json["canViewLeaderboard"], true);
        assert_eq!(json["canAppearOnLeaderboard"], false);
        assert_eq!(json["loading"], false);
    }

    #[test]
    fn test_signed_out_grants_nothing() {
        let snapshot = EntitlementSnapshot::signed_out();
        assert!(!snapshot.loading());
        assert!(!snapshot.is_in_trial());
        assert!(Capability::ALL.iter().all(|cap| !snapshot.has(*cap)));
    }

    #[test]
    fn test_memo_reuses_matrix_for_same_key() {
        let mut memo = CapabilityMemo::default();
        let key = MemoKey {
            generation: 1,
            paid: Some(false),
            in_trial: true,
            loading: false,
        };
        let a = memo.get_or_resolve(key, || resolve_capabilities(false, true));
        let b = memo.get_or_resolve(key, || unreachable!());
        assert!(Arc::ptr_eq(&a, &b));

        let expired = MemoKey {
            in_trial: false,
            ..key
        };
        let c = memo.get_or_resolve(expired, || resolve_capabilities(false, false));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
