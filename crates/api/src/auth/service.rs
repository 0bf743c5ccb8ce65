//! Shared-secret authentication for internal service routes
//!
//! Billing lifecycle events come from the billing backend, not from signed-in
//! users, so they are checked against a dedicated secret instead of a session
//! token.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::error::ApiError;

/// Header carrying the service secret
pub const SERVICE_SECRET_HEADER: &str = "x-service-secret";

/// State for [`require_service_secret`]
#[derive(Clone)]
pub struct ServiceAuthState {
    /// `None` rejects every request
    pub secret: Option<Arc<str>>,
}

/// Constant-time comparison that does not leak the secret's length
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        let dummy = vec![0u8; a.len()];
        let _ = a.as_bytes().ct_eq(&dummy);
        return false;
    }

    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Reject requests that do not present the configured service secret
pub async fn require_service_secret(
    State(service_auth): State<ServiceAuthState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = service_auth.secret.as_deref() else {
        tracing::warn!("Internal route called but BILLING_EVENTS_SECRET is not set");
        return Err(ApiError::Unauthorized);
    };

    let presented = request
        .headers()
        .get(SERVICE_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if !constant_time_compare(presented, expected) {
        tracing::warn!("Rejected internal request with a wrong service secret");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
