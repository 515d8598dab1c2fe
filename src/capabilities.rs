//! Capability model for trial and membership gating.
//!
//! This module is the single source of truth for what a user may do. The
//! policy table lives in [`resolve_capabilities`]; everything else reads the
//! resulting [`CapabilityMatrix`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    // Self-service stat cards
    GenerateAllTimeCard,
    ShareGrindCard,
    ViewWeeklyMonthlyCards,

    // Leaderboard
    AppearOnLeaderboard, // Listed publicly, members only
    ViewLeaderboard,     // Funnel feature, everyone signed in

    // Social
    ClickIntoProfiles,
    ShowTrainerCode,
    ShowSocialLinks,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::GenerateAllTimeCard,
        Capability::ShareGrindCard,
        Capability::ViewWeeklyMonthlyCards,
        Capability::AppearOnLeaderboard,
        Capability::ViewLeaderboard,
        Capability::ClickIntoProfiles,
        Capability::ShowTrainerCode,
        Capability::ShowSocialLinks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::GenerateAllTimeCard => "generate_all_time_card",
            Capability::ShareGrindCard => "share_grind_card",
            Capability::ViewWeeklyMonthlyCards => "view_weekly_monthly_cards",
            Capability::AppearOnLeaderboard => "appear_on_leaderboard",
            Capability::ViewLeaderboard => "view_leaderboard",
            Capability::ClickIntoProfiles => "click_into_profiles",
            Capability::ShowTrainerCode => "show_trainer_code",
            Capability::ShowSocialLinks => "show_social_links",
        }
    }

    pub fn from_feature(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect();
        let normalized = normalized.strip_prefix("can").unwrap_or(&normalized);
        match normalized {
            "generatealltimecard" => Some(Capability::GenerateAllTimeCard),
            "sharegrindcard" => Some(Capability::ShareGrindCard),
            "viewweeklymonthlycards" => Some(Capability::ViewWeeklyMonthlyCards),
            "appearonleaderboard" => Some(Capability::AppearOnLeaderboard),
            "viewleaderboard" => Some(Capability::ViewLeaderboard),
            "clickintoprofiles" | "clickintootherprofiles" => Some(Capability::ClickIntoProfiles),
            "showtrainercode" => Some(Capability::ShowTrainerCode),
            "showsociallinks" => Some(Capability::ShowSocialLinks),
            _ => None,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved feature flags plus the state they were derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityMatrix {
    pub is_in_trial: bool,
    pub is_paid_user: bool,
    pub loading: bool,
    pub can_generate_all_time_card: bool,
    pub can_share_grind_card: bool,
    pub can_view_weekly_monthly_cards: bool,
    pub can_appear_on_leaderboard: bool,
    pub can_view_leaderboard: bool,
    pub can_click_into_profiles: bool,
    pub can_show_trainer_code: bool,
    pub can_show_social_links: bool,
}

impl CapabilityMatrix {
    /// Subscription state not known yet. Nothing is granted.
    pub fn resolving() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    /// No signed-in user. Nothing is granted.
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn has(&self, cap: Capability) -> bool {
        match cap {
            Capability::GenerateAllTimeCard => self.can_generate_all_time_card,
            Capability::ShareGrindCard => self.can_share_grind_card,
            Capability::ViewWeeklyMonthlyCards => self.can_view_weekly_monthly_cards,
            Capability::AppearOnLeaderboard => self.can_appear_on_leaderboard,
            Capability::ViewLeaderboard => self.can_view_leaderboard,
            Capability::ClickIntoProfiles => self.can_click_into_profiles,
            Capability::ShowTrainerCode => self.can_show_trainer_code,
            Capability::ShowSocialLinks => self.can_show_social_links,
        }
    }

    pub fn require(&self, cap: Capability) -> Result<(), CapabilityError> {
        if self.loading {
            return Err(CapabilityError::Pending(cap));
        }
        if self.has(cap) {
            Ok(())
        } else {
            Err(CapabilityError::Missing(cap))
        }
    }

    pub fn enabled(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|cap| self.has(*cap))
            .collect()
    }
}

/// The access policy.
///
/// Members get everything. Unpaid users inside the trial window keep the
/// self-service card features and can browse the leaderboard, but are never
/// listed on it and get none of the social surfaces. Once the trial is over
/// only leaderboard browsing is left.
pub fn resolve_capabilities(is_paid_user: bool, is_in_trial: bool) -> CapabilityMatrix {
    if is_paid_user {
        return CapabilityMatrix {
            is_in_trial,
            is_paid_user: true,
            loading: false,
            can_generate_all_time_card: true,
            can_share_grind_card: true,
            can_view_weekly_monthly_cards: true,
            can_appear_on_leaderboard: true,
            can_view_leaderboard: true,
            can_click_into_profiles: true,
            can_show_trainer_code: true,
            can_show_social_links: true,
        };
    }

    CapabilityMatrix {
        is_in_trial,
        is_paid_user: false,
        loading: false,
        can_generate_all_time_card: is_in_trial,
        can_share_grind_card: is_in_trial,
        can_view_weekly_monthly_cards: is_in_trial,
        can_appear_on_leaderboard: false,
        can_view_leaderboard: true,
        can_click_into_profiles: false,
        can_show_trainer_code: false,
        can_show_social_links: false,
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Missing capability: {0}")]
    Missing(Capability),
    #[error("Capability {0} is not resolved yet")]
    Pending(Capability),
}
