//! Entitlement sessions
//!
//! An entitlement session turns three inputs (who is signed in, whether they
//! pay, and what time it is) into a single published [`EntitlementSnapshot`]
//! that every UI surface reads.
//!
//! ## Architecture
//!
//! ```text
//!  identity change ──┐
//!  membership lookup ├──► EntitlementEngine ──► Arc<EntitlementSnapshot> ──► listeners
//!  clock tick ───────┘        │
//!                             ├─ evaluate_trial()       (entitlements)
//!                             ├─ resolve_capabilities() (capabilities)
//!                             └─ RefreshScheduler       (refresh)
//! ```
//!
//! [`EntitlementEngine`] is the synchronous core and is fully deterministic
//! under a [`ManualClock`](crate::clock::ManualClock). [`EntitlementSession`]
//! drives it on a Tokio runtime: a tick loop plus cancellable membership
//! lookups.
//!
//! ## Lifecycle
//!
//! ```text
//! Unauthenticated ──sign in──► Resolving ──paid────► ActivePaid
//!                                 │     ──unpaid──► ActiveTrial ──window ends──► ActiveExpired
//!                                 │     ──unpaid, trial over──────────────────► ActiveExpired
//!                                 └─────lookup failed─────────────────────────► ActiveExpired
//! ActiveTrial / ActiveExpired ──upgrade──► ActivePaid
//! ```
//!
//! Expiry is one-way and paid is terminal for the lifetime of an identity.
//! Any uncertainty resolves to the most restrictive snapshot.

pub mod driver;
pub mod snapshot;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::capabilities::{resolve_capabilities, CapabilityMatrix};
use crate::clock::Clock;
use crate::config::{EngineConfig, EngineConfigError};
use crate::entitlements::{evaluate_trial, TimeRemaining, TrialStatus, TrialWindow};
use crate::identity::{UserId, UserIdentity};
use crate::refresh::{PublishReason, RefreshDecision, RefreshScheduler, RefreshStats};
use crate::subscription::{SubscriptionError, SubscriptionState, SubscriptionStatus};

pub use driver::EntitlementSession;
pub use snapshot::{EntitlementSnapshot, SessionPhase};

use snapshot::{CapabilityMemo, MemoKey};

/// Callback invoked with every newly published snapshot
pub type SnapshotListener = Box<dyn Fn(&Arc<EntitlementSnapshot>) + Send + 'static>;

/// Handle returned by [`EntitlementEngine::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Proof of which identity a membership lookup was started for.
///
/// Responses carrying a ticket for anything but the current identity are
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub user_id: UserId,
    generation: u64,
}

/// Synchronous entitlement state machine
pub struct EntitlementEngine {
    window: TrialWindow,
    clock: Arc<dyn Clock>,
    identity: Option<UserIdentity>,
    /// Bumped on every identity change and on dispose
    generation: u64,
    subscription: SubscriptionStatus,
    paid_latched: bool,
    expired_latched: bool,
    /// Set while the clock reads before signup, so skew is reported once
    skew_reported: bool,
    scheduler: RefreshScheduler,
    memo: CapabilityMemo,
    current: Arc<EntitlementSnapshot>,
    listeners: Vec<(ListenerId, SnapshotListener)>,
    next_listener: u64,
    disposed: bool,
}

impl std::fmt::Debug for EntitlementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementEngine")
            .field("identity", &self.identity)
            .field("generation", &self.generation)
            .field("subscription", &self.subscription)
            .field("current", &self.current)
            .field("listeners", &self.listeners.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl EntitlementEngine {
    /// Fails if the configured trial window cannot be represented.
    pub fn new(config: &EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, EngineConfigError> {
        Ok(Self {
            window: config.window()?,
            clock,
            identity: None,
            generation: 0,
            subscription: SubscriptionStatus::Loading,
            paid_latched: false,
            expired_latched: false,
            skew_reported: false,
            scheduler: RefreshScheduler::new(config),
            memo: CapabilityMemo::default(),
            current: Arc::new(EntitlementSnapshot::signed_out()),
            listeners: Vec::new(),
            next_listener: 0,
            disposed: false,
        })
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<EntitlementSnapshot> {
        Arc::clone(&self.current)
    }

    pub fn phase(&self) -> SessionPhase {
        self.current.phase
    }

    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    pub fn subscription(&self) -> &SubscriptionStatus {
        &self.subscription
    }

    pub fn stats(&self) -> &RefreshStats {
        self.scheduler.stats()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Register a listener. It is called right away with the current
    /// snapshot and then once per published change.
    ///
    /// Listeners run while the engine is borrowed and must not call back
    /// into it.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&Arc<EntitlementSnapshot>) + Send + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        listener(&self.current);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Switch to a new signed-in user (or sign out with `None`).
    ///
    /// Returns a ticket for the membership lookup the caller must start, or
    /// `None` when signed out or the identity did not change.
    pub fn set_identity(&mut self, identity: Option<UserIdentity>) -> Option<FetchTicket> {
        if self.disposed || self.identity == identity {
            return None;
        }

        self.generation += 1;
        self.identity = identity;
        self.subscription = SubscriptionStatus::Loading;
        self.paid_latched = false;
        self.expired_latched = false;
        self.skew_reported = false;
        self.memo.clear();
        self.scheduler.reset();

        match &self.identity {
            Some(identity) => tracing::info!("Entitlement session switched to user {}", identity.id),
            None => tracing::info!("Entitlement session signed out"),
        }

        let decision = self.scheduler.force(PublishReason::StateChange);
        self.publish(self.clock.now(), decision);

        self.identity.as_ref().map(|identity| FetchTicket {
            user_id: identity.id.clone(),
            generation: self.generation,
        })
    }

    /// Whether `ticket` still belongs to the current identity
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        !self.disposed
            && ticket.generation == self.generation
            && self
                .identity
                .as_ref()
                .is_some_and(|identity| identity.id == ticket.user_id)
    }

    /// Apply a membership lookup result. Publishes immediately, bypassing
    /// the throttle.
    ///
    /// Returns `false` when the response was stale and discarded.
    pub fn apply_subscription(
        &mut self,
        ticket: &FetchTicket,
        result: Result<SubscriptionState, SubscriptionError>,
    ) -> bool {
        if !self.is_current(ticket) {
            tracing::warn!(
                "Discarding stale membership response for user {}",
                ticket.user_id
            );
            return false;
        }

        if let Err(e) = &result {
            tracing::warn!(
                "Membership lookup for user {} failed, treating as unpaid: {}",
                ticket.user_id,
                e
            );
        }

        let status = SubscriptionStatus::from_result(result);
        if self.paid_latched && status.effective_paid() != Some(true) {
            tracing::debug!("Ignoring non-paid membership response after upgrade");
        } else {
            if status.effective_paid() == Some(true) {
                self.paid_latched = true;
            }
            self.subscription = status;
        }

        let decision = self.scheduler.force(PublishReason::StateChange);
        self.publish(self.clock.now(), decision);
        true
    }

    /// Membership upgrade for the current user. Publishes immediately.
    pub fn mark_paid(&mut self) -> bool {
        if self.disposed || self.identity.is_none() {
            return false;
        }
        self.paid_latched = true;
        self.subscription = SubscriptionStatus::Resolved(SubscriptionState::PAID);

        let decision = self.scheduler.force(PublishReason::StateChange);
        self.publish(self.clock.now(), decision)
    }

    /// Clock tick. Returns `true` if a new snapshot was published.
    pub fn tick(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        let now = self.clock.now();
        let mut decision = self.scheduler.on_tick(now);

        if decision == RefreshDecision::Skip {
            let next = self.evaluate(now);
            if next.phase != self.current.phase || next.capabilities != self.current.capabilities {
                self.scheduler.unthrottle();
                decision = self.scheduler.force(PublishReason::TrialBoundary);
            } else {
                return false;
            }
        }

        self.publish(now, decision)
    }

    /// Recompute from the current instant, ignoring the throttle
    pub fn refresh(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        let decision = self.scheduler.force(PublishReason::StateChange);
        self.publish(self.clock.now(), decision)
    }

    /// Stop publishing. Pending lookups become stale and listeners are
    /// dropped; the last snapshot stays readable.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.generation += 1;
        self.listeners.clear();
        tracing::debug!("Entitlement engine disposed");
    }

    fn publish(&mut self, now: DateTime<Utc>, decision: RefreshDecision) -> bool {
        let RefreshDecision::Publish(reason) = decision else {
            return false;
        };

        let next = self.evaluate(now);
        if *self.current == next {
            return false;
        }

        if next.phase != self.current.phase {
            tracing::info!(
                "Entitlement phase {} -> {} ({:?})",
                self.current.phase,
                next.phase,
                reason
            );
        } else {
            tracing::debug!(
                "Publishing snapshot ({:?}), {}s remaining",
                reason,
                next.time_remaining.total_seconds
            );
        }

        self.current = Arc::new(next);
        self.scheduler.record_publish(now);

        for (_, listener) in &self.listeners {
            listener(&self.current);
        }
        true
    }

    fn evaluate(&mut self, now: DateTime<Utc>) -> EntitlementSnapshot {
        let Some(identity) = &self.identity else {
            return EntitlementSnapshot::signed_out();
        };

        let trial = evaluate_trial(identity.created_at, now, &self.window);
        let skewed = matches!(trial.status, TrialStatus::ClockSkew { .. });
        if skewed && !self.skew_reported {
            tracing::warn!(
                "Clock reads {} before signup of user {}, showing the full trial window",
                now,
                identity.id
            );
        }
        self.skew_reported = skewed;
        if !trial.is_in_trial() && !self.expired_latched {
            self.expired_latched = true;
            tracing::info!("Trial window for user {} has ended", identity.id);
        }
        let in_trial = trial.is_in_trial() && !self.expired_latched;
        let remaining = if in_trial {
            trial.remaining
        } else {
            TimeRemaining::ZERO
        };

        let generation = self.generation;
        let user_id = Some(identity.id.clone());

        let (phase, key, time_remaining) = match &self.subscription {
            SubscriptionStatus::Loading => (
                SessionPhase::Resolving,
                MemoKey {
                    generation,
                    paid: None,
                    in_trial: false,
                    loading: true,
                },
                TimeRemaining::ZERO,
            ),
            SubscriptionStatus::Failed(_) => (
                SessionPhase::ActiveExpired,
                MemoKey {
                    generation,
                    paid: Some(false),
                    in_trial: false,
                    loading: false,
                },
                TimeRemaining::ZERO,
            ),
            SubscriptionStatus::Resolved(state) => {
                let paid = state.is_paid || self.paid_latched;
                let phase = if paid {
                    SessionPhase::ActivePaid
                } else if in_trial {
                    SessionPhase::ActiveTrial
                } else {
                    SessionPhase::ActiveExpired
                };
                (
                    phase,
                    MemoKey {
                        generation,
                        paid: Some(paid),
                        in_trial,
                        loading: false,
                    },
                    remaining,
                )
            }
        };

        let capabilities = self.memo.get_or_resolve(key, || match key.paid {
            None => CapabilityMatrix::resolving(),
            Some(paid) => resolve_capabilities(paid, key.in_trial),
        });

        EntitlementSnapshot {
            phase,
            user_id,
            days_remaining: time_remaining.days_remaining(),
            time_remaining,
            capabilities,
        }
    }
}
