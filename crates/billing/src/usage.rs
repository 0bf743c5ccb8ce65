//! Usage ledger
//!
//! Per-user document and token counters embedded on the `users` row.
//! Daily counters roll over at UTC midnight; the monthly document counter is
//! only reset by a billing-cycle renewal (see `events`).

use grantscout_shared::UsageKind;
use serde::Serialize;
use sqlx::PgPool;
use time::{OffsetDateTime, Time, UtcOffset};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Current counter values for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UsageSnapshot {
    #[sqlx(rename = "documents_used_today")]
    pub documents_today: i64,
    #[sqlx(rename = "documents_used_month")]
    pub documents_month: i64,
    #[sqlx(rename = "tokens_used_today")]
    pub tokens_today: i64,
}

/// Midnight (UTC) of the day containing `at`
pub fn start_of_day(at: OffsetDateTime) -> OffsetDateTime {
    at.to_offset(UtcOffset::UTC).replace_time(Time::MIDNIGHT)
}

/// Whether counters last reset at `last_reset` belong to an earlier day than `now`
pub fn needs_daily_reset(last_reset: OffsetDateTime, now: OffsetDateTime) -> bool {
    start_of_day(last_reset) < start_of_day(now)
}

/// Usage ledger backed by the users table
#[derive(Clone)]
pub struct UsageLedger {
    pool: PgPool,
}

impl UsageLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Read the raw counters. Returns `None` when the user does not exist.
    ///
    /// Callers making a limit decision must go through [`Self::get_fresh_usage`].
    pub async fn get_usage(&self, user_id: Uuid) -> BillingResult<Option<UsageSnapshot>> {
        let snapshot: Option<UsageSnapshot> = sqlx::query_as(
            r#"
            SELECT documents_used_today, documents_used_month, tokens_used_today
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(snapshot)
    }

    /// Roll daily counters over if the last reset happened before today, then read
    pub async fn get_fresh_usage(&self, user_id: Uuid) -> BillingResult<Option<UsageSnapshot>> {
        self.reset_if_new_day(user_id).await?;
        self.get_usage(user_id).await
    }

    /// Zero the daily counters when `last_usage_reset` predates today.
    ///
    /// The date comparison happens inside the UPDATE, so repeated calls on the
    /// same day are no-ops. Returns whether a reset happened.
    pub async fn reset_if_new_day(&self, user_id: Uuid) -> BillingResult<bool> {
        let now = OffsetDateTime::now_utc();

        let result = sqlx::query(
            r#"
            UPDATE users
            SET documents_used_today = 0,
                tokens_used_today = 0,
                last_usage_reset = $3,
                updated_at = NOW()
            WHERE id = $1
              AND last_usage_reset < $2
            "#,
        )
        .bind(user_id)
        .bind(start_of_day(now))
        .bind(now)
        .execute(&self.pool)
        .await?;

        let reset = result.rows_affected() > 0;
        if reset {
            tracing::debug!(user_id = %user_id, "Daily usage counters reset");
        }

        Ok(reset)
    }

    /// Add `amount` to the counters for `kind` in a single atomic UPDATE.
    ///
    /// Documents count against both the daily and monthly counters; tokens
    /// only against the daily one. No upper bound is enforced here.
    pub async fn increment(
        &self,
        user_id: Uuid,
        kind: UsageKind,
        amount: i64,
    ) -> BillingResult<UsageSnapshot> {
        if amount < 0 {
            return Err(BillingError::InvalidInput(format!(
                "Usage increment must not be negative (got {})",
                amount
            )));
        }

        let sql = match kind {
            UsageKind::Documents => {
                r#"
                UPDATE users
                SET documents_used_today = documents_used_today + $2,
                    documents_used_month = documents_used_month + $2,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING documents_used_today, documents_used_month, tokens_used_today
                "#
            }
            UsageKind::Tokens => {
                r#"
                UPDATE users
                SET tokens_used_today = tokens_used_today + $2,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING documents_used_today, documents_used_month, tokens_used_today
                "#
            }
        };

        let snapshot: Option<UsageSnapshot> = sqlx::query_as(sql)
            .bind(user_id)
            .bind(amount)
            .fetch_optional(&self.pool)
            .await?;

        let snapshot =
            snapshot.ok_or_else(|| BillingError::NotFound(format!("User {} not found", user_id)))?;

        tracing::debug!(
            user_id = %user_id,
            kind = %kind,
            amount,
            documents_today = snapshot.documents_today,
            tokens_today = snapshot.tokens_today,
            "Usage recorded"
        );

        Ok(snapshot)
    }

    /// Zero the monthly document counter after a successful billing-cycle renewal
    pub async fn reset_monthly(&self, user_id: Uuid) -> BillingResult<()> {
        let result = sqlx::query(
            "UPDATE users SET documents_used_month = 0, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::NotFound(format!("User {} not found", user_id)));
        }

        tracing::info!(user_id = %user_id, "Monthly document counter reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    #[test]
    fn test_same_day_does_not_reset() {
        let last = datetime!(2025-01-01 00:00:01 UTC);
        let now = datetime!(2025-01-01 23:59:59 UTC);
        assert!(!needs_daily_reset(last, now));
    }

    #[test]
    fn test_previous_day_resets() {
        let last = datetime!(2024-12-31 23:59:59 UTC);
        let now = datetime!(2025-01-01 00:00:00 UTC);
        assert!(needs_daily_reset(last, now));
    }

    #[test]
    fn test_reset_is_idempotent_within_day() {
        // After a reset the stamp is "now"; a second check later the same day is a no-op
        let first_check = datetime!(2025-01-02 08:00 UTC);
        assert!(needs_daily_reset(datetime!(2025-01-01 18:00 UTC), first_check));
        assert!(!needs_daily_reset(first_check, datetime!(2025-01-02 20:00 UTC)));
    }

    #[test]
    fn test_day_boundary_uses_utc() {
        // 2025-01-01 20:00 at -05:00 is already 2025-01-02 in UTC
        let last = datetime!(2025-01-01 20:00 -5);
        let now = datetime!(2025-01-02 02:00 UTC);
        assert!(!needs_daily_reset(last, now));
        assert_eq!(
            start_of_day(datetime!(2025-01-01 20:00).assume_offset(offset!(-5))),
            datetime!(2025-01-02 00:00 UTC)
        );
    }

    // =========================================================================
    // Database-backed tests
    // =========================================================================

    async fn setup() -> (UsageLedger, PgPool, Uuid) {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = grantscout_shared::create_pool(&url, 2).await.expect("pool");
        grantscout_shared::run_migrations(&pool).await.expect("migrations");

        let user_id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, email) VALUES ($1, $2)")
            .bind(user_id)
            .bind(format!("ledger-{}@example.org", user_id))
            .execute(&pool)
            .await
            .expect("insert user");

        (UsageLedger::new(pool.clone()), pool, user_id)
    }

    async fn cleanup(pool: &PgPool, user_id: Uuid) {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(pool)
            .await
            .ok();
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_increment_documents_counts_day_and_month() {
        let (ledger, pool, user_id) = setup().await;

        ledger.increment(user_id, UsageKind::Documents, 1).await.unwrap();
        let snapshot = ledger.increment(user_id, UsageKind::Documents, 2).await.unwrap();
        assert_eq!(snapshot.documents_today, 3);
        assert_eq!(snapshot.documents_month, 3);
        assert_eq!(snapshot.tokens_today, 0);

        let snapshot = ledger.increment(user_id, UsageKind::Tokens, 500).await.unwrap();
        assert_eq!(snapshot.tokens_today, 500);
        assert_eq!(snapshot.documents_month, 3);

        cleanup(&pool, user_id).await;
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_reset_if_new_day_keeps_monthly_and_is_idempotent() {
        let (ledger, pool, user_id) = setup().await;

        ledger.increment(user_id, UsageKind::Documents, 4).await.unwrap();
        ledger.increment(user_id, UsageKind::Tokens, 900).await.unwrap();
        sqlx::query("UPDATE users SET last_usage_reset = NOW() - INTERVAL '2 days' WHERE id = $1")
            .bind(user_id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(ledger.reset_if_new_day(user_id).await.unwrap());
        ledger.increment(user_id, UsageKind::Documents, 1).await.unwrap();
        assert!(!ledger.reset_if_new_day(user_id).await.unwrap());

        let snapshot = ledger.get_usage(user_id).await.unwrap().unwrap();
        assert_eq!(snapshot.documents_today, 1);
        assert_eq!(snapshot.tokens_today, 0);
        assert_eq!(snapshot.documents_month, 5);

        cleanup(&pool, user_id).await;
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_reset_monthly_only_touches_month() {
        let (ledger, pool, user_id) = setup().await;

        ledger.increment(user_id, UsageKind::Documents, 3).await.unwrap();
        ledger.reset_monthly(user_id).await.unwrap();

        let snapshot = ledger.get_usage(user_id).await.unwrap().unwrap();
        assert_eq!(snapshot.documents_month, 0);
        assert_eq!(snapshot.documents_today, 3);

        cleanup(&pool, user_id).await;
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_missing_user() {
        let (ledger, pool, user_id) = setup().await;

        let ghost = Uuid::new_v4();
        assert!(ledger.get_usage(ghost).await.unwrap().is_none());
        assert!(matches!(
            ledger.increment(ghost, UsageKind::Tokens, 1).await,
            Err(BillingError::NotFound(_))
        ));

        cleanup(&pool, user_id).await;
    }
}
