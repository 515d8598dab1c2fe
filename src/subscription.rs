//! Membership lookups against the profile store.
//!
//! The engine only ever asks one question: is this user a paying member?
//! Failures are never retried here and always read as "not paid".

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{UserId, UserIdentity};

/// Membership flag as stored on the user's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionState {
    pub is_paid: bool,
}

impl SubscriptionState {
    pub const PAID: SubscriptionState = SubscriptionState { is_paid: true };
    pub const UNPAID: SubscriptionState = SubscriptionState { is_paid: false };
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("No profile found for user {0}")]
    NotFound(UserId),
    #[error("Profile store unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed profile record: {0}")]
    Malformed(String),
}

/// Progress of a membership lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Loading,
    Resolved(SubscriptionState),
    Failed(String),
}

impl SubscriptionStatus {
    pub fn from_result(result: Result<SubscriptionState, SubscriptionError>) -> Self {
        match result {
            Ok(state) => SubscriptionStatus::Resolved(state),
            Err(e) => SubscriptionStatus::Failed(e.to_string()),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SubscriptionStatus::Loading)
    }

    /// `None` while loading. A failed lookup counts as unpaid.
    pub fn effective_paid(&self) -> Option<bool> {
        match self {
            SubscriptionStatus::Loading => None,
            SubscriptionStatus::Resolved(state) => Some(state.is_paid),
            SubscriptionStatus::Failed(_) => Some(false),
        }
    }
}

/// Async lookup of a user's membership.
#[async_trait]
pub trait SubscriptionFetcher: Send + Sync {
    async fn fetch(&self, user: &UserIdentity) -> Result<SubscriptionState, SubscriptionError>;
}

/// Answers every lookup the same way, optionally after a delay.
#[derive(Debug, Clone)]
pub struct StaticSubscriptionFetcher {
    answer: Result<SubscriptionState, SubscriptionError>,
    latency: Duration,
}

impl StaticSubscriptionFetcher {
    pub fn paid() -> Self {
        Self::answering(Ok(SubscriptionState::PAID))
    }

    pub fn unpaid() -> Self {
        Self::answering(Ok(SubscriptionState::UNPAID))
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self::answering(Err(SubscriptionError::Unavailable(reason.into())))
    }

    pub fn answering(answer: Result<SubscriptionState, SubscriptionError>) -> Self {
        Self {
            answer,
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl SubscriptionFetcher for StaticSubscriptionFetcher {
    async fn fetch(&self, _user: &UserIdentity) -> Result<SubscriptionState, SubscriptionError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.answer.clone()
    }
}

/// In-memory profile table keyed by user id.
///
/// Loadable from a JSON object such as `{"trainer-42": {"isPaid": true}}`.
#[derive(Debug, Clone, Default)]
pub struct ProfileTableFetcher {
    profiles: HashMap<UserId, SubscriptionState>,
}

impl ProfileTableFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user: impl Into<UserId>, state: SubscriptionState) {
        self.profiles.insert(user.into(), state);
    }

    pub fn from_json(content: &str) -> Result<Self, SubscriptionError> {
        let profiles: HashMap<UserId, SubscriptionState> =
            serde_json::from_str(content).map_err(|e| SubscriptionError::Malformed(e.to_string()))?;
        Ok(Self { profiles })
    }

    pub fn load(path: &Path) -> Result<Self, SubscriptionError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SubscriptionError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let table = Self::from_json(&content)?;
        tracing::debug!("Loaded {} profiles from {:?}", table.len(), path);
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl SubscriptionFetcher for ProfileTableFetcher {
    async fn fetch(&self, user: &UserIdentity) -> Result<SubscriptionState, SubscriptionError> {
        self.profiles
            .get(&user.id)
            .copied()
            .ok_or_else(|| SubscriptionError::NotFound(user.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(id: &str) -> UserIdentity {
        UserIdentity::new(id, Utc::now())
    }

    #[test]
    fn test_failed_lookup_reads_as_unpaid() {
        let status = SubscriptionStatus::from_result(Err(SubscriptionError::Unavailable(
            "timeout".into(),
        )));
        assert_eq!(status.effective_paid(), Some(false));
        assert!(!status.is_loading());
    }

    #[test]
    fn test_loading_has_no_answer() {
        assert_eq!(SubscriptionStatus::Loading.effective_paid(), None);
        assert!(SubscriptionStatus::Loading.is_loading());
    }

    #[tokio::test]
    async fn test_static_fetcher() {
        let fetcher = StaticSubscriptionFetcher::paid();
        assert_eq!(fetcher.fetch(&user("a")).await, Ok(SubscriptionState::PAID));

        let fetcher = StaticSubscriptionFetcher::failing("down");
        assert!(matches!(
            fetcher.fetch(&user("a")).await,
            Err(SubscriptionError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_profile_table_from_json() {
        let table =
            ProfileTableFetcher::from_json(r#"{"ash": {"isPaid": true}, "misty": {"isPaid": false}}"#)
                .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.fetch(&user("ash")).await, Ok(SubscriptionState::PAID));
        assert_eq!(table.fetch(&user("misty")).await, Ok(SubscriptionState::UNPAID));
        assert_eq!(
            table.fetch(&user("brock")).await,
            Err(SubscriptionError::NotFound(UserId::new("brock")))
        );
    }

    #[test]
    fn test_profile_table_rejects_garbage() {
        assert!(matches!(
            ProfileTableFetcher::from_json("[1, 2, 3]"),
            Err(SubscriptionError::Malformed(_))
        ));
    }

    #[test]
    fn test_profile_table_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, r#"{"ash": {"isPaid": true}}"#).unwrap();
        let table = ProfileTableFetcher::load(&path).unwrap();
        assert_eq!(table.len(), 1);

        let missing = ProfileTableFetcher::load(&dir.path().join("nope.json"));
        assert!(matches!(missing, Err(SubscriptionError::Unavailable(_))));
    }
}
