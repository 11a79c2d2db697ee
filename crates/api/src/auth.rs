//! Admin bearer-token authentication

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::{error::ApiError, state::AppState};

/// Constant-time comparison that does not leak the expected length
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        let dummy = vec![0u8; a.len()];
        let _ = a.as_bytes().ct_eq(&dummy);
        return false;
    }

    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Reject requests without `Authorization: Bearer <ADMIN_API_TOKEN>`
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized = bearer_token(&request)
        .map(|token| constant_time_compare(token, &state.config.admin_api_token));

    match authorized {
        Some(true) => Ok(next.run(request).await),
        Some(false) => {
            tracing::warn!(path = %request.uri().path(), "Rejected admin token");
            Err(ApiError::Unauthorized)
        }
        None => Err(ApiError::Unauthorized),
    }
}
