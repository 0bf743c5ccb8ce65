//! Common types used across GrantScout

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::GrantScoutError;

// =============================================================================
// Enums
// =============================================================================

/// Subscription tier for billing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Starter,
    Enterprise,
}

impl SubscriptionTier {
    /// Feature and limit bundle for this tier
    pub fn features(&self) -> TierFeatures {
        TierFeatures::for_tier(*self)
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starter => write!(f, "starter"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl std::str::FromStr for SubscriptionTier {
    type Err = GrantScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "starter" => Ok(Self::Starter),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(GrantScoutError::Validation(format!(
                "Invalid subscription tier: {}",
                s
            ))),
        }
    }
}

/// Numeric limits and feature flags bundled with a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierFeatures {
    /// Document uploads per calendar day
    pub documents_daily: i64,
    /// Document uploads per billing cycle
    pub documents_monthly: i64,
    /// Chat tokens per calendar day
    pub tokens_daily: i64,
    pub grant_recommendations: bool,
    pub priority_support: bool,
}

impl TierFeatures {
    /// Get features for a tier
    pub fn for_tier(tier: SubscriptionTier) -> Self {
        match tier {
            SubscriptionTier::Starter => Self {
                documents_daily: 10,
                documents_monthly: 100,
                tokens_daily: 50_000,
                grant_recommendations: true,
                priority_support: false,
            },
            SubscriptionTier::Enterprise => Self {
                documents_daily: 100,
                documents_monthly: 2_000,
                tokens_daily: 500_000,
                grant_recommendations: true,
                priority_support: true,
            },
        }
    }
}

/// Subscription status as stored on the user row and reported by Stripe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    Canceled,
    PastDue,
    Incomplete,
}

impl SubscriptionStatus {
    /// Parse the nullable `subscription_status` column.
    /// NULL, `none` and unrecognized values all mean "no status".
    pub fn from_column(value: Option<&str>) -> Option<Self> {
        value.and_then(|v| v.parse().ok())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::Canceled => "canceled",
            Self::PastDue => "past_due",
            Self::Incomplete => "incomplete",
        }
    }

    /// Active and trialing subscriptions grant access to metered features
    pub fn grants_access(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = GrantScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "trialing" => Ok(Self::Trialing),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "past_due" => Ok(Self::PastDue),
            "incomplete" => Ok(Self::Incomplete),
            _ => Err(GrantScoutError::Validation(format!(
                "Invalid subscription status: {}",
                s
            ))),
        }
    }
}

/// Metered resource tracked by the usage ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Documents,
    Tokens,
}

impl std::fmt::Display for UsageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Documents => write!(f, "documents"),
            Self::Tokens => write!(f, "tokens"),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// User model: identity, plan linkage and embedded usage counters
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub subscription_status: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_ends_at: Option<OffsetDateTime>,
    pub documents_used_today: i64,
    pub documents_used_month: i64,
    pub tokens_used_today: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_usage_reset: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn status(&self) -> Option<SubscriptionStatus> {
        SubscriptionStatus::from_column(self.subscription_status.as_deref())
    }

    /// Whether the trial window is still open at `now`
    pub fn trial_active_at(&self, now: OffsetDateTime) -> bool {
        self.trial_ends_at.is_some_and(|end| end > now)
    }
}

/// Funding-seeker profile, one per user
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: Option<String>,
    pub mission: Option<String>,
    #[sqlx(default)]
    pub focus_areas: Vec<String>,
    pub budget_bracket: Option<String>,
    pub staff_size: Option<String>,
    pub service_area: Option<String>,
    pub fiscal_year: Option<String>,
}

/// Funding opportunity record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub id: String,
    pub title: String,
    pub agency: Option<String>,
    pub synopsis: Option<String>,
    pub eligibility: Option<String>,
    /// None means the opportunity has no deadline
    pub close_date: Option<Date>,
    #[sqlx(default)]
    pub tags: Vec<String>,
}
