//! Tokio driver for an entitlement engine
//!
//! Runs the refresh tick loop and membership lookups for an
//! [`EntitlementEngine`]. All state lives in the engine; this type only
//! schedules work and cancels it:
//!
//! - one tick loop per session, stopped by the session's root token
//! - at most one lookup in flight, cancelled through a child token whenever
//!   the identity changes
//!
//! Cancellation is best effort. A lookup that completes anyway still carries
//! a [`FetchTicket`](super::FetchTicket) for the old identity and is dropped
//! by the engine.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{EntitlementEngine, EntitlementSnapshot, ListenerId};
use crate::clock::Clock;
use crate::config::{EngineConfig, EngineConfigError};
use crate::identity::UserIdentity;
use crate::refresh::RefreshStats;
use crate::subscription::SubscriptionFetcher;

/// Live entitlement session for one signed-in surface
pub struct EntitlementSession {
    engine: Arc<Mutex<EntitlementEngine>>,
    fetcher: Arc<dyn SubscriptionFetcher>,
    tick_interval: Duration,
    root: CancellationToken,
    fetch_token: Mutex<Option<CancellationToken>>,
    tick_task: Mutex<Option<JoinHandle<()>>>,
    updates: watch::Receiver<Arc<EntitlementSnapshot>>,
}

impl EntitlementSession {
    /// Create a session. Nothing runs until [`start`](Self::start) or
    /// [`set_identity`](Self::set_identity) is called.
    pub fn new(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        fetcher: Arc<dyn SubscriptionFetcher>,
    ) -> Result<Self, EngineConfigError> {
        config.validate()?;

        let mut engine = EntitlementEngine::new(&config, clock)?;
        let (tx, updates) = watch::channel(engine.snapshot());
        engine.subscribe(move |snapshot| {
            tx.send_replace(Arc::clone(snapshot));
        });

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            fetcher,
            tick_interval: config.tick_interval,
            root: CancellationToken::new(),
            fetch_token: Mutex::new(None),
            tick_task: Mutex::new(None),
            updates,
        })
    }

    /// Start the refresh tick loop. Calling it again is a no-op.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut slot = self.tick_task.lock();
        if slot.is_some() || self.root.is_cancelled() {
            return;
        }

        let engine = Arc::clone(&self.engine);
        let token = self.root.clone();
        let period = self.tick_interval;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        engine.lock().tick();
                    }
                }
            }
            tracing::debug!("Entitlement refresh loop stopped");
        }));
        tracing::debug!("Entitlement refresh loop started ({:?} ticks)", period);
    }

    /// Switch the signed-in user and start their membership lookup.
    ///
    /// Any lookup still running for the previous identity is cancelled.
    /// Must be called from within a Tokio runtime.
    pub fn set_identity(&self, identity: Option<UserIdentity>) {
        let ticket = {
            let mut engine = self.engine.lock();
            if engine.is_disposed() || engine.identity() == identity.as_ref() {
                return;
            }
            if let Some(previous) = self.fetch_token.lock().take() {
                previous.cancel();
            }
            engine.set_identity(identity.clone())
        };

        let (Some(ticket), Some(identity)) = (ticket, identity) else {
            return;
        };

        let token = self.root.child_token();
        *self.fetch_token.lock() = Some(token.clone());

        let engine = Arc::clone(&self.engine);
        let fetcher = Arc::clone(&self.fetcher);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("Membership lookup for user {} cancelled", ticket.user_id);
                }
                result = fetcher.fetch(&identity) => {
                    engine.lock().apply_subscription(&ticket, result);
                }
            }
        });
    }

    /// Membership upgrade for the current user
    pub fn upgrade(&self) -> bool {
        self.engine.lock().mark_paid()
    }

    /// Recompute now, e.g. when the app returns to the foreground
    pub fn refresh(&self) -> bool {
        self.engine.lock().refresh()
    }

    pub fn snapshot(&self) -> Arc<EntitlementSnapshot> {
        self.engine.lock().snapshot()
    }

    /// Receiver that always holds the latest published snapshot
    pub fn watch(&self) -> watch::Receiver<Arc<EntitlementSnapshot>> {
        self.updates.clone()
    }

    /// See [`EntitlementEngine::subscribe`]. Listeners must not call back
    /// into the session.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Arc<EntitlementSnapshot>) + Send + 'static,
    {
        self.engine.lock().subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.engine.lock().unsubscribe(id)
    }

    pub fn stats(&self) -> RefreshStats {
        self.engine.lock().stats().clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.engine.lock().is_disposed()
    }

    /// Cancel the tick loop and any lookup in flight, then stop publishing.
    pub fn dispose(&self) {
        self.root.cancel();
        self.fetch_token.lock().take();
        self.tick_task.lock().take();
        self.engine.lock().dispose();
    }
}

impl Drop for EntitlementSession {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Capability;
    use crate::clock::ManualClock;
    use crate::session::SessionPhase;
    use crate::subscription::{SubscriptionError, SubscriptionState, StaticSubscriptionFetcher};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    fn signup() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn session_with(fetcher: impl SubscriptionFetcher + 'static) -> (EntitlementSession, ManualClock) {
        let clock = ManualClock::new(signup());
        let session = EntitlementSession::new(
            EngineConfig::default(),
            Arc::new(clock.clone()),
            Arc::new(fetcher),
        )
        .unwrap();
        (session, clock)
    }

    async fn wait_for_phase(
        rx: &mut watch::Receiver<Arc<EntitlementSnapshot>>,
        phase: SessionPhase,
    ) -> Arc<EntitlementSnapshot> {
        tokio::time::timeout(Duration::from_secs(60), async {
            loop {
                let current = Arc::clone(&rx.borrow_and_update());
                if current.phase == phase {
                    return current;
                }
                rx.changed().await.expect("session dropped");
            }
        })
        .await
        .expect("timed out waiting for phase")
    }

    /// Slow answer for "ash", fast answer for everyone else
    struct PerUserFetcher;

    #[async_trait]
    impl SubscriptionFetcher for PerUserFetcher {
        async fn fetch(
            &self,
            user: &UserIdentity,
        ) -> Result<SubscriptionState, SubscriptionError> {
            if user.id.as_str() == "ash" {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(SubscriptionState::PAID)
            } else {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(SubscriptionState::UNPAID)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_resolves_to_paid() {
        let (session, _) = session_with(
            StaticSubscriptionFetcher::paid().with_latency(Duration::from_secs(2)),
        );
        let mut rx = session.watch();
        session.start();
        session.set_identity(Some(UserIdentity::new("ash", signup())));

        let resolving = wait_for_phase(&mut rx, SessionPhase::Resolving).await;
        assert!(resolving.loading());

        let paid = wait_for_phase(&mut rx, SessionPhase::ActivePaid).await;
        assert!(!paid.loading());
        assert!(Capability::ALL.iter().all(|cap| paid.has(*cap)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_lookup_fails_closed() {
        let (session, _) = session_with(StaticSubscriptionFetcher::failing("503"));
        let mut rx = session.watch();
        session.set_identity(Some(UserIdentity::new("ash", signup())));

        let snapshot = wait_for_phase(&mut rx, SessionPhase::ActiveExpired).await;
        assert!(!snapshot.is_paid_user());
        assert_eq!(snapshot.capabilities.enabled(), vec![Capability::ViewLeaderboard]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_for_previous_user_is_dropped() {
        let (session, _) = session_with(PerUserFetcher);
        session.start();
        session.set_identity(Some(UserIdentity::new("ash", signup())));
        session.set_identity(Some(UserIdentity::new("misty", signup())));

        tokio::time::sleep(Duration::from_secs(30)).await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.user_id.as_ref().map(|id| id.as_str()), Some("misty"));
        assert_eq!(snapshot.phase, SessionPhase::ActiveTrial);
        assert!(!snapshot.is_paid_user());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upgrade_publishes_immediately() {
        let (session, _) = session_with(StaticSubscriptionFetcher::unpaid());
        let mut rx = session.watch();
        session.start();
        session.set_identity(Some(UserIdentity::new("ash", signup())));
        wait_for_phase(&mut rx, SessionPhase::ActiveTrial).await;

        assert!(session.upgrade());
        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot.phase, SessionPhase::ActivePaid);
        assert!(snapshot.has(Capability::AppearOnLeaderboard));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_loop_publishes_countdown() {
        let (session, clock) = session_with(StaticSubscriptionFetcher::unpaid());
        let mut rx = session.watch();
        session.start();
        session.set_identity(Some(UserIdentity::new("ash", signup())));
        let first = wait_for_phase(&mut rx, SessionPhase::ActiveTrial).await;

        // Move the wall clock in step with the tick loop
        for _ in 0..6 {
            clock.advance(chrono::Duration::seconds(1));
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        let later = session.snapshot();
        assert!(later.time_remaining.total_seconds < first.time_remaining.total_seconds);
        assert!(session.stats().ticks > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_everything() {
        let (session, _) = session_with(
            StaticSubscriptionFetcher::paid().with_latency(Duration::from_secs(5)),
        );
        session.start();
        session.set_identity(Some(UserIdentity::new("ash", signup())));
        session.dispose();

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(session.is_disposed());
        assert_eq!(session.snapshot().phase, SessionPhase::Resolving);
        let ticks = session.stats().ticks;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(session.stats().ticks, ticks);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig {
            publish_interval: Duration::ZERO,
            ..Default::default()
        };
        let result = EntitlementSession::new(
            config,
            Arc::new(ManualClock::new(signup())),
            Arc::new(StaticSubscriptionFetcher::unpaid()),
        );
        assert!(matches!(result, Err(EngineConfigError::Zero("publish_interval"))));
    }
}
