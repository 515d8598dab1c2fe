//! Grindcard entitlements - trial and membership gating
//!
//! Decides what a signed-in user may do right now, from who they are, whether
//! they pay, and how long ago they signed up.
//!
//! ## Features
//!
//! - **Trial window**: fixed-length free trial measured from account creation
//! - **Capability table**: one pure function maps (paid, in trial) to every flag
//! - **Throttled countdown**: snapshots republish at most every few seconds,
//!   except on state changes, clock jumps, and trial expiry
//! - **Fail closed**: lookups that fail or arrive late never grant access
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::{Duration, TimeZone, Utc};
//! use grindcard_entitlements::{
//!     EngineConfig, EntitlementEngine, ManualClock, SessionPhase, SubscriptionState, UserIdentity,
//! };
//!
//! let signup = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
//! let clock = ManualClock::new(signup + Duration::days(2));
//! let mut engine = EntitlementEngine::new(&EngineConfig::default(), Arc::new(clock)).unwrap();
//!
//! let ticket = engine
//!     .set_identity(Some(UserIdentity::new("ash", signup)))
//!     .unwrap();
//! engine.apply_subscription(&ticket, Ok(SubscriptionState::UNPAID));
//!
//! let snapshot = engine.snapshot();
//! assert_eq!(snapshot.phase, SessionPhase::ActiveTrial);
//! assert_eq!(snapshot.days_remaining, 5);
//! assert!(snapshot.capabilities.can_view_leaderboard);
//! ```

pub mod capabilities;
pub mod cli;
pub mod clock;
pub mod config;
pub mod entitlements;
pub mod identity;
pub mod refresh;
pub mod session;
pub mod subscription;

// Re-exports
pub use capabilities::{resolve_capabilities, Capability, CapabilityError, CapabilityMatrix};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, EngineConfigError};
pub use entitlements::{
    compute_time_remaining, evaluate_trial, is_in_trial, TimeRemaining, TrialEvaluation,
    TrialStatus, TrialWindow,
};
pub use identity::{UserId, UserIdentity};
pub use refresh::{PublishReason, RefreshStats};
pub use session::{
    EntitlementEngine, EntitlementSession, EntitlementSnapshot, FetchTicket, ListenerId,
    SessionPhase,
};
pub use subscription::{
    ProfileTableFetcher, StaticSubscriptionFetcher, SubscriptionError, SubscriptionFetcher,
    SubscriptionState, SubscriptionStatus,
};
