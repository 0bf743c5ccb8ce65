//! Subscription and billing event routes

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use grantscout_billing::{BillingEvent, IngestOutcome, SubscriptionAccess};
use serde::Serialize;

use crate::{
    auth::AuthUser,
    error::ApiResult,
    state::AppState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    #[serde(flatten)]
    pub access: SubscriptionAccess,
    pub has_access: bool,
    /// True when live provider state was unavailable and stored values were used
    pub degraded: bool,
}

/// Get the caller's resolved subscription
pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<SubscriptionResponse>> {
    let lookup = state
        .billing
        .subscriptions
        .resolve_detailed(auth_user.user_id)
        .await?;

    let degraded = lookup.is_degraded();
    let access = lookup.into_access();

    Ok(Json(SubscriptionResponse {
        has_access: access.has_access(),
        degraded,
        access,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingEventResponse {
    pub applied: bool,
}

/// Apply a billing lifecycle event sent by the billing backend.
///
/// Mounted under `/internal` behind the service secret, not the user session.
pub async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<BillingEvent>,
) -> ApiResult<(StatusCode, Json<BillingEventResponse>)> {
    match state.billing.events.apply(event).await? {
        IngestOutcome::Applied { .. } => {
            Ok((StatusCode::OK, Json(BillingEventResponse { applied: true })))
        }
        // Acknowledged so the sender does not keep retrying
        IngestOutcome::UnknownCustomer => {
            Ok((StatusCode::ACCEPTED, Json(BillingEventResponse { applied: false })))
        }
    }
}
