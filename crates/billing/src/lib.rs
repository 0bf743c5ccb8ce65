//! GrantScout Billing
//!
//! Subscription resolution, per-user usage metering and limit enforcement.

pub mod client;
pub mod error;
pub mod events;
pub mod limits;
pub mod subscription;
pub mod usage;

pub use client::{LiveSubscription, PriceTable, StripeClient, StripeConfig, SubscriptionSource};
pub use error::{BillingError, BillingResult};
pub use events::{BillingEvent, BillingEventIngestor, IngestOutcome};
pub use limits::{DocumentLimitCheck, LimitChecker, TokenLimitCheck};
pub use subscription::{
    DegradedReason, SubscriptionAccess, SubscriptionLookup, SubscriptionResolver,
};
pub use usage::{UsageLedger, UsageSnapshot};

use std::sync::Arc;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub subscriptions: SubscriptionResolver,
    pub usage: UsageLedger,
    pub limits: LimitChecker,
    pub events: BillingEventIngestor,
}

impl BillingService {
    /// Wire the billing components around one pool.
    ///
    /// `source` is `None` when Stripe is not configured; subscription lookups
    /// for users with a provider subscription then degrade to stored values.
    pub fn new(
        pool: PgPool,
        source: Option<Arc<dyn SubscriptionSource>>,
        prices: PriceTable,
    ) -> Self {
        let subscriptions = SubscriptionResolver::new(pool.clone(), source, prices);
        let usage = UsageLedger::new(pool.clone());
        let limits = LimitChecker::new(subscriptions.clone(), usage.clone());
        let events = BillingEventIngestor::new(pool, usage.clone());

        Self {
            subscriptions,
            usage,
            limits,
            events,
        }
    }
}
