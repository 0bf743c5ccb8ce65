//! Billing event ingestion
//!
//! Applies billing-provider lifecycle events to the user row:
//! - successful invoice payment (billing-cycle renewal) resets the monthly counter
//! - subscription updates store the new status and plan linkage
//! - subscription deletion marks the user canceled
//!
//! Signature verification of the raw webhook happens upstream of this module.

use grantscout_shared::SubscriptionStatus;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;
use crate::usage::UsageLedger;

/// Lifecycle event relevant to usage and plan state
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    /// A renewal invoice was paid
    InvoicePaid { customer_id: String },
    SubscriptionUpdated {
        customer_id: String,
        subscription_id: String,
        status: SubscriptionStatus,
        price_id: Option<String>,
    },
    SubscriptionDeleted { customer_id: String },
}

impl BillingEvent {
    pub fn customer_id(&self) -> &str {
        match self {
            Self::InvoicePaid { customer_id }
            | Self::SubscriptionUpdated { customer_id, .. }
            | Self::SubscriptionDeleted { customer_id } => customer_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvoicePaid { .. } => "invoice_paid",
            Self::SubscriptionUpdated { .. } => "subscription_updated",
            Self::SubscriptionDeleted { .. } => "subscription_deleted",
        }
    }
}

/// What applying an event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Applied { user_id: Uuid },
    /// No user is linked to the event's customer
    UnknownCustomer,
}

/// Applies billing events to user rows
#[derive(Clone)]
pub struct BillingEventIngestor {
    pool: PgPool,
    ledger: UsageLedger,
}

impl BillingEventIngestor {
    pub fn new(pool: PgPool, ledger: UsageLedger) -> Self {
        Self { pool, ledger }
    }

    pub async fn apply(&self, event: BillingEvent) -> BillingResult<IngestOutcome> {
        let user_id: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE stripe_customer_id = $1")
                .bind(event.customer_id())
                .fetch_optional(&self.pool)
                .await?;

        let Some((user_id,)) = user_id else {
            tracing::warn!(
                customer_id = event.customer_id(),
                event = event.kind(),
                "Billing event for unknown customer ignored"
            );
            return Ok(IngestOutcome::UnknownCustomer);
        };

        match &event {
            BillingEvent::InvoicePaid { .. } => {
                self.ledger.reset_monthly(user_id).await?;
            }
            BillingEvent::SubscriptionUpdated {
                subscription_id,
                status,
                price_id,
                ..
            } => {
                sqlx::query(
                    r#"
                    UPDATE users
                    SET stripe_subscription_id = $2,
                        subscription_status = $3,
                        stripe_price_id = COALESCE($4, stripe_price_id),
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(user_id)
                .bind(subscription_id)
                .bind(status.as_str())
                .bind(price_id.as_deref())
                .execute(&self.pool)
                .await?;
            }
            BillingEvent::SubscriptionDeleted { .. } => {
                sqlx::query(
                    r#"
                    UPDATE users
                    SET stripe_subscription_id = NULL,
                        subscription_status = $2,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(user_id)
                .bind(SubscriptionStatus::Canceled.as_str())
                .execute(&self.pool)
                .await?;
            }
        }

        tracing::info!(user_id = %user_id, event = event.kind(), "Billing event applied");
        Ok(IngestOutcome::Applied { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_invoice_paid() {
        let event: BillingEvent =
            serde_json::from_value(json!({"type": "invoice_paid", "customer_id": "cus_1"}))
                .unwrap();
        assert_eq!(
            event,
            BillingEvent::InvoicePaid {
                customer_id: "cus_1".to_string()
            }
        );
        assert_eq!(event.kind(), "invoice_paid");
    }

    #[test]
    fn test_deserialize_subscription_updated() {
        let event: BillingEvent = serde_json::from_value(json!({
            "type": "subscription_updated",
            "customer_id": "cus_2",
            "subscription_id": "sub_9",
            "status": "past_due",
            "price_id": null
        }))
        .unwrap();
        assert_eq!(event.customer_id(), "cus_2");
        match event {
            BillingEvent::SubscriptionUpdated { status, price_id, .. } => {
                assert_eq!(status, SubscriptionStatus::PastDue);
                assert_eq!(price_id, None);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_type_rejected() {
        let result: Result<BillingEvent, _> =
            serde_json::from_value(json!({"type": "charge_refunded", "customer_id": "cus_1"}));
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_invoice_paid_resets_monthly_counter() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = grantscout_shared::create_pool(&url, 2).await.unwrap();
        grantscout_shared::run_migrations(&pool).await.unwrap();

        let user_id = Uuid::new_v4();
        let customer_id = format!("cus_{}", user_id.simple());
        sqlx::query(
            "INSERT INTO users (id, email, stripe_customer_id, documents_used_month, documents_used_today) VALUES ($1, $2, $3, 42, 3)",
        )
        .bind(user_id)
        .bind(format!("events-{}@example.org", user_id))
        .bind(&customer_id)
        .execute(&pool)
        .await
        .unwrap();

        let ledger = UsageLedger::new(pool.clone());
        let ingestor = BillingEventIngestor::new(pool.clone(), ledger.clone());

        let outcome = ingestor
            .apply(BillingEvent::InvoicePaid { customer_id })
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Applied { user_id });

        let snapshot = ledger.get_usage(user_id).await.unwrap().unwrap();
        assert_eq!(snapshot.documents_month, 0);
        assert_eq!(snapshot.documents_today, 3);

        let outcome = ingestor
            .apply(BillingEvent::SubscriptionDeleted {
                customer_id: "cus_nobody".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::UnknownCustomer);

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&pool)
            .await
            .ok();
    }
}
