//! Grant recommendation routes

use axum::{
    extract::{Extension, State},
    Json,
};
use grantscout_billing::{limits::REASON_NO_ACCESS, SubscriptionAccess};
use serde::Deserialize;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    grants::{RecommendationOutcome, Urgency},
    state::AppState,
};

const REASON_NOT_IN_PLAN: &str = "Grant recommendations are not included in your plan";

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub urgency: Urgency,
    pub context: Option<String>,
}

/// Recommendations call a paid model, so they need an active plan or trial
/// whose tier includes them. A missing tier fails closed.
fn ensure_recommendations_allowed(access: &SubscriptionAccess) -> ApiResult<()> {
    if !access.has_access() {
        return Err(ApiError::QuotaExceeded(REASON_NO_ACCESS.to_string()));
    }
    if !access.features.is_some_and(|f| f.grant_recommendations) {
        return Err(ApiError::QuotaExceeded(REASON_NOT_IN_PLAN.to_string()));
    }
    Ok(())
}

/// Rank open grants for the caller's organization
pub async fn recommend(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<RecommendationRequest>,
) -> ApiResult<Json<RecommendationOutcome>> {
    let access = state
        .billing
        .subscriptions
        .resolve(auth_user.user_id)
        .await?;
    if let Err(e) = ensure_recommendations_allowed(&access) {
        tracing::info!(user_id = %auth_user.user_id, error = %e, "Recommendations denied");
        return Err(e);
    }

    let outcome = state
        .matcher
        .recommend_for_chat(auth_user.user_id, req.urgency, req.context.as_deref())
        .await?;

    tracing::info!(
        user_id = %auth_user.user_id,
        status = ?outcome.status,
        count = outcome.recommendations.len(),
        "Recommendations served"
    );

    Ok(Json(outcome))
}
