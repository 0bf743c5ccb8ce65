//! Usage limit checks
//!
//! Compares ledger counters against the limits of the user's resolved tier.
//! Denials are ordinary values (`allowed: false` plus a reason), never errors.
//!
//! ## Policy
//!
//! Fail closed: no subscription, no user row or no recognizable tier all
//! resolve to "deny". A check and the increment that follows it are separate
//! statements, so two concurrent requests from one user may both pass and
//! overrun a limit by one unit.

use grantscout_shared::TierFeatures;
use serde::Serialize;
use uuid::Uuid;

use crate::error::BillingResult;
use crate::subscription::{SubscriptionAccess, SubscriptionResolver};
use crate::usage::{UsageLedger, UsageSnapshot};

pub const REASON_NO_ACCESS: &str = "No active subscription or trial";
pub const REASON_USER_NOT_FOUND: &str = "User not found";
pub const REASON_DAILY_DOCUMENTS: &str = "Daily document limit reached";
pub const REASON_MONTHLY_DOCUMENTS: &str = "Monthly document limit reached";
pub const REASON_DAILY_TOKENS: &str = "Daily token limit reached";

/// Result of a document upload check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLimitCheck {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub documents_used_today: i64,
    pub documents_used_month: i64,
    pub daily_limit: i64,
    pub monthly_limit: i64,
}

impl DocumentLimitCheck {
    fn denied(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.to_string()),
            documents_used_today: 0,
            documents_used_month: 0,
            daily_limit: 0,
            monthly_limit: 0,
        }
    }
}

/// Result of a token consumption check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenLimitCheck {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub tokens_used_today: i64,
    pub daily_limit: i64,
    pub tokens_remaining: i64,
}

impl TokenLimitCheck {
    fn denied(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.to_string()),
            tokens_used_today: 0,
            daily_limit: 0,
            tokens_remaining: 0,
        }
    }
}

/// Numeric limits derived from a tier; a missing tier yields all zeros
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageLimits {
    pub documents_daily: i64,
    pub documents_monthly: i64,
    pub tokens_daily: i64,
}

impl From<Option<TierFeatures>> for UsageLimits {
    fn from(features: Option<TierFeatures>) -> Self {
        features
            .map(|f| Self {
                documents_daily: f.documents_daily,
                documents_monthly: f.documents_monthly,
                tokens_daily: f.tokens_daily,
            })
            .unwrap_or_default()
    }
}

/// Pure decision for a document upload.
///
/// `usage` is `None` when the user row is missing. The daily limit is checked
/// before the monthly one and only the first triggered reason is reported.
pub fn evaluate_document_limit(
    access: &SubscriptionAccess,
    usage: Option<UsageSnapshot>,
) -> DocumentLimitCheck {
    if !access.has_access() {
        return DocumentLimitCheck::denied(REASON_NO_ACCESS);
    }
    let Some(usage) = usage else {
        return DocumentLimitCheck::denied(REASON_USER_NOT_FOUND);
    };

    let limits = UsageLimits::from(access.features);
    let reason = if usage.documents_today >= limits.documents_daily {
        Some(REASON_DAILY_DOCUMENTS.to_string())
    } else if usage.documents_month >= limits.documents_monthly {
        Some(REASON_MONTHLY_DOCUMENTS.to_string())
    } else {
        None
    };

    DocumentLimitCheck {
        allowed: reason.is_none(),
        reason,
        documents_used_today: usage.documents_today,
        documents_used_month: usage.documents_month,
        daily_limit: limits.documents_daily,
        monthly_limit: limits.documents_monthly,
    }
}

/// Pure decision for consuming `requested_tokens`.
///
/// A request that exactly fills the remaining quota is allowed. On success the
/// reported `tokens_remaining` already accounts for the requested amount.
pub fn evaluate_token_limit(
    access: &SubscriptionAccess,
    usage: Option<UsageSnapshot>,
    requested_tokens: i64,
) -> TokenLimitCheck {
    if !access.has_access() {
        return TokenLimitCheck::denied(REASON_NO_ACCESS);
    }
    let Some(usage) = usage else {
        return TokenLimitCheck::denied(REASON_USER_NOT_FOUND);
    };

    let daily_limit = UsageLimits::from(access.features).tokens_daily;
    let tokens_remaining = daily_limit.saturating_sub(usage.tokens_today);

    // Without a tier even a zero-token request must not pass; an overflowing
    // request can never fit
    let exceeds = usage
        .tokens_today
        .checked_add(requested_tokens)
        .map_or(true, |total| total > daily_limit);
    if access.features.is_none() || exceeds {
        return TokenLimitCheck {
            allowed: false,
            reason: Some(REASON_DAILY_TOKENS.to_string()),
            tokens_used_today: usage.tokens_today,
            daily_limit,
            tokens_remaining,
        };
    }

    TokenLimitCheck {
        allowed: true,
        reason: None,
        tokens_used_today: usage.tokens_today,
        daily_limit,
        tokens_remaining: tokens_remaining - requested_tokens,
    }
}

/// Gate for metered actions
#[derive(Clone)]
pub struct LimitChecker {
    resolver: SubscriptionResolver,
    ledger: UsageLedger,
}

impl LimitChecker {
    pub fn new(resolver: SubscriptionResolver, ledger: UsageLedger) -> Self {
        Self { resolver, ledger }
    }

    /// Whether the user may upload another document
    pub async fn check_document_limit(&self, user_id: Uuid) -> BillingResult<DocumentLimitCheck> {
        let access = self.resolver.resolve(user_id).await?;
        if !access.has_access() {
            return Ok(evaluate_document_limit(&access, None));
        }

        let usage = self.ledger.get_fresh_usage(user_id).await?;
        let check = evaluate_document_limit(&access, usage);

        if !check.allowed {
            tracing::info!(
                user_id = %user_id,
                reason = check.reason.as_deref().unwrap_or_default(),
                documents_today = check.documents_used_today,
                daily_limit = check.daily_limit,
                "Document limit check denied"
            );
        }

        Ok(check)
    }

    /// Whether the user may consume `requested_tokens` more chat tokens today
    pub async fn check_token_limit(
        &self,
        user_id: Uuid,
        requested_tokens: i64,
    ) -> BillingResult<TokenLimitCheck> {
        let access = self.resolver.resolve(user_id).await?;
        if !access.has_access() {
            return Ok(evaluate_token_limit(&access, None, requested_tokens));
        }

        let usage = self.ledger.get_fresh_usage(user_id).await?;
        let check = evaluate_token_limit(&access, usage, requested_tokens);

        if !check.allowed {
            tracing::info!(
                user_id = %user_id,
                reason = check.reason.as_deref().unwrap_or_default(),
                tokens_today = check.tokens_used_today,
                requested_tokens,
                daily_limit = check.daily_limit,
                "Token limit check denied"
            );
        }

        Ok(check)
    }
}
