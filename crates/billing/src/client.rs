//! Stripe client configuration and live subscription lookups

use async_trait::async_trait;
use grantscout_shared::{SubscriptionStatus, SubscriptionTier};
use stripe::{Client, SubscriptionId};
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};

/// Stripe price IDs for each subscription tier
/// Tier hierarchy: Starter → Enterprise
#[derive(Debug, Clone)]
pub struct PriceTable {
    // Subscription tiers (monthly)
    pub starter: String,
    pub enterprise: String,

    // Annual subscription tiers
    pub starter_annual: Option<String>,
    pub enterprise_annual: Option<String>,
}

impl PriceTable {
    /// Load price IDs from environment variables
    pub fn from_env() -> Self {
        Self {
            starter: std::env::var("STRIPE_PRICE_STARTER")
                .unwrap_or_else(|_| "price_starter".to_string()),
            enterprise: std::env::var("STRIPE_PRICE_ENTERPRISE")
                .unwrap_or_else(|_| "price_enterprise".to_string()),
            starter_annual: std::env::var("STRIPE_PRICE_STARTER_ANNUAL").ok(),
            enterprise_annual: std::env::var("STRIPE_PRICE_ENTERPRISE_ANNUAL").ok(),
        }
    }

    /// Get tier from price ID (handles both monthly and annual prices)
    pub fn tier_for_price_id(&self, price_id: &str) -> Option<SubscriptionTier> {
        if price_id == self.starter || self.starter_annual.as_deref() == Some(price_id) {
            Some(SubscriptionTier::Starter)
        } else if price_id == self.enterprise || self.enterprise_annual.as_deref() == Some(price_id)
        {
            Some(SubscriptionTier::Enterprise)
        } else {
            None
        }
    }
}

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Price IDs for each subscription tier
    pub price_table: PriceTable,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            price_table: PriceTable::from_env(),
        })
    }
}

/// Subscription state as reported live by the billing provider
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSubscription {
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
}

/// Source of live subscription state.
///
/// Implemented by [`StripeClient`]; tests substitute an in-memory fake.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn fetch_subscription(&self, subscription_id: &str) -> BillingResult<LiveSubscription>;
}

/// Map Stripe's status onto the statuses tracked locally
pub fn map_stripe_status(status: stripe::SubscriptionStatus) -> SubscriptionStatus {
    match status {
        stripe::SubscriptionStatus::Active => SubscriptionStatus::Active,
        stripe::SubscriptionStatus::Trialing => SubscriptionStatus::Trialing,
        stripe::SubscriptionStatus::PastDue | stripe::SubscriptionStatus::Unpaid => {
            SubscriptionStatus::PastDue
        }
        stripe::SubscriptionStatus::Incomplete | stripe::SubscriptionStatus::IncompleteExpired => {
            SubscriptionStatus::Incomplete
        }
        _ => SubscriptionStatus::Canceled,
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[async_trait]
impl SubscriptionSource for StripeClient {
    async fn fetch_subscription(&self, subscription_id: &str) -> BillingResult<LiveSubscription> {
        let sub_id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|e| BillingError::InvalidInput(format!("Invalid subscription ID: {}", e)))?;

        let sub = stripe::Subscription::retrieve(&self.client, &sub_id, &[]).await?;

        let price_id = sub
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.to_string());

        Ok(LiveSubscription {
            status: map_stripe_status(sub.status),
            price_id,
            current_period_end: OffsetDateTime::from_unix_timestamp(sub.current_period_end).ok(),
            cancel_at_period_end: sub.cancel_at_period_end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PriceTable {
        PriceTable {
            starter: "price_starter_m".to_string(),
            enterprise: "price_enterprise_m".to_string(),
            starter_annual: Some("price_starter_y".to_string()),
            enterprise_annual: None,
        }
    }

    #[test]
    fn test_tier_for_price_id() {
        let table = table();
        assert_eq!(table.tier_for_price_id("price_starter_m"), Some(SubscriptionTier::Starter));
        assert_eq!(table.tier_for_price_id("price_starter_y"), Some(SubscriptionTier::Starter));
        assert_eq!(
            table.tier_for_price_id("price_enterprise_m"),
            Some(SubscriptionTier::Enterprise)
        );
    }

    #[test]
    fn test_unknown_price_has_no_tier() {
        assert_eq!(table().tier_for_price_id("price_legacy_pro"), None);
        assert_eq!(table().tier_for_price_id(""), None);
    }

    #[test]
    #[serial_test::serial]
    fn test_price_table_from_env() {
        std::env::set_var("STRIPE_PRICE_STARTER", "price_env_starter");
        std::env::remove_var("STRIPE_PRICE_ENTERPRISE");
        std::env::set_var("STRIPE_PRICE_ENTERPRISE_ANNUAL", "price_env_enterprise_y");

        let table = PriceTable::from_env();
        assert_eq!(table.starter, "price_env_starter");
        assert_eq!(table.enterprise, "price_enterprise");
        assert_eq!(
            table.tier_for_price_id("price_env_enterprise_y"),
            Some(SubscriptionTier::Enterprise)
        );

        std::env::remove_var("STRIPE_PRICE_STARTER");
        std::env::remove_var("STRIPE_PRICE_ENTERPRISE_ANNUAL");
    }

    #[test]
    #[serial_test::serial]
    fn test_stripe_config_requires_secret() {
        std::env::remove_var("STRIPE_SECRET_KEY");
        assert!(matches!(StripeConfig::from_env(), Err(BillingError::Config(_))));
    }

    #[test]
    fn test_map_stripe_status() {
        use stripe::SubscriptionStatus as S;
        assert_eq!(map_stripe_status(S::Active), SubscriptionStatus::Active);
        assert_eq!(map_stripe_status(S::Trialing), SubscriptionStatus::Trialing);
        assert_eq!(map_stripe_status(S::Unpaid), SubscriptionStatus::PastDue);
        assert_eq!(map_stripe_status(S::IncompleteExpired), SubscriptionStatus::Incomplete);
        assert_eq!(map_stripe_status(S::Canceled), SubscriptionStatus::Canceled);
    }
}
