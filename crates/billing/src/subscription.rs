//! Subscription resolution
//!
//! Answers "what plan is this user on right now, and is it usable?" by combining
//! the stored user row with live state from the billing provider.
//!
//! Provider failures never fail the request. They degrade to the last-known
//! database values, and [`SubscriptionLookup::Degraded`] records why so callers
//! that care can tell stale data from live data.

use std::sync::Arc;

use grantscout_shared::{SubscriptionStatus, SubscriptionTier, TierFeatures, User};
use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::{LiveSubscription, PriceTable, SubscriptionSource};
use crate::error::BillingResult;

/// Resolved plan and trial state for a user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionAccess {
    pub status: Option<SubscriptionStatus>,
    pub tier: Option<SubscriptionTier>,
    pub price_id: Option<String>,
    pub features: Option<TierFeatures>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
    pub is_trial_active: bool,
}

impl SubscriptionAccess {
    /// All-null record returned for unknown users
    pub fn no_access() -> Self {
        Self {
            status: None,
            tier: None,
            price_id: None,
            features: None,
            current_period_end: None,
            cancel_at_period_end: false,
            is_trial_active: false,
        }
    }

    /// Active or trialing subscription, or an open trial window
    pub fn has_access(&self) -> bool {
        self.status.is_some_and(|s| s.grants_access()) || self.is_trial_active
    }
}

/// Why live billing state could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedReason {
    /// No billing provider client is configured
    ProviderNotConfigured,
    /// The provider lookup failed (deleted subscription, network error, ...)
    ProviderError(String),
}

impl std::fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProviderNotConfigured => write!(f, "billing provider not configured"),
            Self::ProviderError(e) => write!(f, "billing provider lookup failed: {}", e),
        }
    }
}

/// Outcome of a subscription lookup, keeping track of where the data came from
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionLookup {
    NoUser,
    /// User has no provider subscription; only trial dates apply
    TrialOnly(SubscriptionAccess),
    /// Fresh state from the billing provider
    Live(SubscriptionAccess),
    /// Provider lookup failed; stored values were used instead
    Degraded {
        access: SubscriptionAccess,
        reason: DegradedReason,
    },
}

impl SubscriptionLookup {
    pub fn access(&self) -> SubscriptionAccess {
        match self {
            Self::NoUser => SubscriptionAccess::no_access(),
            Self::TrialOnly(access) | Self::Live(access) => access.clone(),
            Self::Degraded { access, .. } => access.clone(),
        }
    }

    pub fn into_access(self) -> SubscriptionAccess {
        match self {
            Self::NoUser => SubscriptionAccess::no_access(),
            Self::TrialOnly(access) | Self::Live(access) => access,
            Self::Degraded { access, .. } => access,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Pure function: combine the stored user row with the provider result.
///
/// `live` is `None` when the user has no provider subscription id.
pub fn resolve_from_parts(
    user: Option<&User>,
    live: Option<Result<LiveSubscription, DegradedReason>>,
    prices: &PriceTable,
    now: OffsetDateTime,
) -> SubscriptionLookup {
    let Some(user) = user else {
        return SubscriptionLookup::NoUser;
    };

    let tier_of = |price_id: Option<&str>| price_id.and_then(|p| prices.tier_for_price_id(p));
    let trial_active = user.trial_active_at(now);

    match live {
        None => {
            let tier = tier_of(user.stripe_price_id.as_deref());
            SubscriptionLookup::TrialOnly(SubscriptionAccess {
                status: trial_active.then_some(SubscriptionStatus::Trialing),
                tier,
                price_id: user.stripe_price_id.clone(),
                features: tier.map(TierFeatures::for_tier),
                current_period_end: None,
                cancel_at_period_end: false,
                is_trial_active: trial_active,
            })
        }
        Some(Ok(sub)) => {
            let price_id = sub.price_id.or_else(|| user.stripe_price_id.clone());
            let tier = tier_of(price_id.as_deref());
            SubscriptionLookup::Live(SubscriptionAccess {
                status: Some(sub.status),
                tier,
                price_id,
                features: tier.map(TierFeatures::for_tier),
                current_period_end: sub.current_period_end,
                cancel_at_period_end: sub.cancel_at_period_end,
                is_trial_active: sub.status == SubscriptionStatus::Trialing || trial_active,
            })
        }
        Some(Err(reason)) => {
            let tier = tier_of(user.stripe_price_id.as_deref());
            SubscriptionLookup::Degraded {
                access: SubscriptionAccess {
                    status: user.status(),
                    tier,
                    price_id: user.stripe_price_id.clone(),
                    features: tier.map(TierFeatures::for_tier),
                    current_period_end: None,
                    cancel_at_period_end: false,
                    is_trial_active: trial_active,
                },
                reason,
            }
        }
    }
}

/// Loads a user's plan state, reconciling with the billing provider
#[derive(Clone)]
pub struct SubscriptionResolver {
    pool: PgPool,
    source: Option<Arc<dyn SubscriptionSource>>,
    prices: PriceTable,
}

impl SubscriptionResolver {
    pub fn new(
        pool: PgPool,
        source: Option<Arc<dyn SubscriptionSource>>,
        prices: PriceTable,
    ) -> Self {
        Self {
            pool,
            source,
            prices,
        }
    }

    /// Resolve the user's access record
    pub async fn resolve(&self, user_id: Uuid) -> BillingResult<SubscriptionAccess> {
        Ok(self.resolve_detailed(user_id).await?.into_access())
    }

    /// Resolve the user's access record, keeping track of degraded lookups
    pub async fn resolve_detailed(&self, user_id: Uuid) -> BillingResult<SubscriptionLookup> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(self.resolve_user(user.as_ref(), OffsetDateTime::now_utc()).await)
    }

    /// Resolve an already-loaded user row
    pub async fn resolve_user(&self, user: Option<&User>, now: OffsetDateTime) -> SubscriptionLookup {
        let live = match user.and_then(|u| u.stripe_subscription_id.as_deref()) {
            None => None,
            Some(subscription_id) => Some(self.fetch_live(subscription_id).await),
        };

        let lookup = resolve_from_parts(user, live, &self.prices, now);

        if let (SubscriptionLookup::Degraded { reason, .. }, Some(user)) = (&lookup, user) {
            tracing::warn!(
                user_id = %user.id,
                reason = %reason,
                "Falling back to stored subscription state"
            );
        }

        lookup
    }

    async fn fetch_live(&self, subscription_id: &str) -> Result<LiveSubscription, DegradedReason> {
        let source = self
            .source
            .as_ref()
            .ok_or(DegradedReason::ProviderNotConfigured)?;

        source
            .fetch_subscription(subscription_id)
            .await
            .map_err(|e| DegradedReason::ProviderError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BillingError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::datetime;
    use time::Duration;

    const NOW: OffsetDateTime = datetime!(2025-01-01 12:00 UTC);

    fn prices() -> PriceTable {
        PriceTable {
            starter: "price_starter".to_string(),
            enterprise: "price_enterprise".to_string(),
            starter_annual: None,
            enterprise_annual: None,
        }
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "director@example.org".to_string(),
            stripe_customer_id: Some("cus_123".to_string()),
            stripe_subscription_id: None,
            stripe_price_id: Some("price_starter".to_string()),
            subscription_status: None,
            trial_started_at: None,
            trial_ends_at: None,
            documents_used_today: 0,
            documents_used_month: 0,
            tokens_used_today: 0,
            last_usage_reset: NOW,
            created_at: NOW,
            updated_at: NOW,
        }
    }

    fn live(status: SubscriptionStatus) -> LiveSubscription {
        LiveSubscription {
            status,
            price_id: Some("price_enterprise".to_string()),
            current_period_end: Some(NOW + Duration::days(30)),
            cancel_at_period_end: true,
        }
    }

    struct FakeSource {
        result: Result<LiveSubscription, String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SubscriptionSource for FakeSource {
        async fn fetch_subscription(&self, _id: &str) -> BillingResult<LiveSubscription> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .clone()
                .map_err(BillingError::SubscriptionNotFound)
        }
    }

    fn resolver(source: Option<Arc<dyn SubscriptionSource>>) -> SubscriptionResolver {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        SubscriptionResolver::new(pool, source, prices())
    }

    #[test]
    fn test_missing_user_has_no_access() {
        let lookup = resolve_from_parts(None, None, &prices(), NOW);
        assert_eq!(lookup, SubscriptionLookup::NoUser);
        let access = lookup.into_access();
        assert_eq!(access, SubscriptionAccess::no_access());
        assert!(!access.has_access());
    }

    #[test]
    fn test_trial_only_active_trial() {
        let mut u = user();
        u.trial_ends_at = Some(NOW + Duration::days(7));

        let access = resolve_from_parts(Some(&u), None, &prices(), NOW).into_access();
        assert_eq!(access.status, Some(SubscriptionStatus::Trialing));
        assert!(access.is_trial_active);
        assert_eq!(access.tier, Some(SubscriptionTier::Starter));
        assert_eq!(access.features.map(|f| f.documents_daily), Some(10));
        assert!(access.has_access());
    }

    #[test]
    fn test_trial_only_expired_trial() {
        let mut u = user();
        u.trial_ends_at = Some(NOW - Duration::days(1));

        let access = resolve_from_parts(Some(&u), None, &prices(), NOW).into_access();
        assert_eq!(access.status, None);
        assert!(!access.is_trial_active);
        assert!(!access.has_access());
    }

    #[test]
    fn test_live_subscription_uses_provider_state() {
        let mut u = user();
        u.stripe_subscription_id = Some("sub_123".to_string());

        let lookup = resolve_from_parts(
            Some(&u),
            Some(Ok(live(SubscriptionStatus::Active))),
            &prices(),
            NOW,
        );
        assert!(matches!(lookup, SubscriptionLookup::Live(_)));
        let access = lookup.into_access();
        assert_eq!(access.status, Some(SubscriptionStatus::Active));
        assert_eq!(access.tier, Some(SubscriptionTier::Enterprise));
        assert_eq!(access.current_period_end, Some(NOW + Duration::days(30)));
        assert!(access.cancel_at_period_end);
        assert!(!access.is_trial_active);
    }

    #[test]
    fn test_live_trialing_status_counts_as_trial() {
        let mut u = user();
        u.stripe_subscription_id = Some("sub_123".to_string());

        let access = resolve_from_parts(
            Some(&u),
            Some(Ok(live(SubscriptionStatus::Trialing))),
            &prices(),
            NOW,
        )
        .into_access();
        assert!(access.is_trial_active);
    }

    #[test]
    fn test_unknown_price_maps_to_no_tier() {
        let mut u = user();
        u.stripe_subscription_id = Some("sub_123".to_string());
        let mut sub = live(SubscriptionStatus::Active);
        sub.price_id = Some("price_retired".to_string());

        let access = resolve_from_parts(Some(&u), Some(Ok(sub)), &prices(), NOW).into_access();
        assert_eq!(access.tier, None);
        assert_eq!(access.features, None);
        assert_eq!(access.price_id.as_deref(), Some("price_retired"));
    }

    #[test]
    fn test_degraded_uses_stored_values() {
        let mut u = user();
        u.stripe_subscription_id = Some("sub_deleted".to_string());
        u.subscription_status = Some("active".to_string());
        u.trial_ends_at = Some(NOW + Duration::days(2));

        let lookup = resolve_from_parts(
            Some(&u),
            Some(Err(DegradedReason::ProviderError("No such subscription".to_string()))),
            &prices(),
            NOW,
        );
        assert!(lookup.is_degraded());
        let access = lookup.into_access();
        assert_eq!(access.status, Some(SubscriptionStatus::Active));
        assert_eq!(access.current_period_end, None);
        assert!(!access.cancel_at_period_end);
        assert!(access.is_trial_active);
        assert_eq!(access.tier, Some(SubscriptionTier::Starter));
    }

    #[tokio::test]
    async fn test_resolver_swallows_provider_errors() {
        let source = Arc::new(FakeSource {
            result: Err("sub_gone".to_string()),
            calls: AtomicUsize::new(0),
        });
        let resolver = resolver(Some(source.clone()));
        let mut u = user();
        u.stripe_subscription_id = Some("sub_gone".to_string());

        let lookup = resolver.resolve_user(Some(&u), NOW).await;
        assert!(matches!(
            lookup,
            SubscriptionLookup::Degraded {
                reason: DegradedReason::ProviderError(_),
                ..
            }
        ));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolver_without_provider_is_degraded() {
        let resolver = resolver(None);
        let mut u = user();
        u.stripe_subscription_id = Some("sub_123".to_string());

        let lookup = resolver.resolve_user(Some(&u), NOW).await;
        assert!(matches!(
            lookup,
            SubscriptionLookup::Degraded {
                reason: DegradedReason::ProviderNotConfigured,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_resolver_skips_provider_without_subscription_id() {
        let source = Arc::new(FakeSource {
            result: Ok(live(SubscriptionStatus::Active)),
            calls: AtomicUsize::new(0),
        });
        let resolver = resolver(Some(source.clone()));

        let lookup = resolver.resolve_user(Some(&user()), NOW).await;
        assert!(matches!(lookup, SubscriptionLookup::TrialOnly(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
