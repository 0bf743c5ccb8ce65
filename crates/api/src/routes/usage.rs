//! Usage metering and limit check routes

use axum::{
    extract::{Extension, State},
    Json,
};
use grantscout_billing::{DocumentLimitCheck, TokenLimitCheck, UsageSnapshot};
use grantscout_shared::UsageKind;
use serde::{Deserialize, Serialize};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Current counters for the caller
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub documents_used_today: i64,
    pub documents_used_month: i64,
    pub tokens_used_today: i64,
}

impl From<UsageSnapshot> for UsageResponse {
    fn from(usage: UsageSnapshot) -> Self {
        Self {
            documents_used_today: usage.documents_today,
            documents_used_month: usage.documents_month,
            tokens_used_today: usage.tokens_today,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCheckRequest {
    pub requested_tokens: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTokensRequest {
    pub tokens: i64,
}

fn non_negative(value: i64, field: &str) -> Result<i64, ApiError> {
    if value < 0 {
        return Err(ApiError::Validation(format!("{} must not be negative", field)));
    }
    Ok(value)
}

/// Get today's usage counters
pub async fn get_usage(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<UsageResponse>> {
    let usage = state
        .billing
        .usage
        .get_fresh_usage(auth_user.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(usage.into()))
}

/// Whether the caller may upload another document
pub async fn check_documents(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<DocumentLimitCheck>> {
    let check = state
        .billing
        .limits
        .check_document_limit(auth_user.user_id)
        .await?;
    Ok(Json(check))
}

/// Record one document upload, refusing it when over quota
pub async fn record_document(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<UsageResponse>> {
    let user_id = auth_user.user_id;

    let check = state.billing.limits.check_document_limit(user_id).await?;
    if !check.allowed {
        return Err(ApiError::QuotaExceeded(
            check.reason.unwrap_or_else(|| "Document limit reached".to_string()),
        ));
    }

    let usage = state
        .billing
        .usage
        .increment(user_id, UsageKind::Documents, 1)
        .await?;

    tracing::info!(
        user_id = %user_id,
        documents_today = usage.documents_today,
        documents_month = usage.documents_month,
        "Recorded document upload"
    );

    Ok(Json(usage.into()))
}

/// Whether the caller may spend `requestedTokens` more chat tokens today
pub async fn check_tokens(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<TokenCheckRequest>,
) -> ApiResult<Json<TokenLimitCheck>> {
    let requested = non_negative(req.requested_tokens, "requestedTokens")?;
    let check = state
        .billing
        .limits
        .check_token_limit(auth_user.user_id, requested)
        .await?;
    Ok(Json(check))
}

/// Record tokens consumed by a chat turn
pub async fn record_tokens(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<RecordTokensRequest>,
) -> ApiResult<Json<UsageResponse>> {
    let tokens = non_negative(req.tokens, "tokens")?;
    let usage = state
        .billing
        .usage
        .increment(auth_user.user_id, UsageKind::Tokens, tokens)
        .await?;

    tracing::debug!(
        user_id = %auth_user.user_id,
        tokens,
        tokens_today = usage.tokens_today,
        "Recorded token usage"
    );

    Ok(Json(usage.into()))
}
