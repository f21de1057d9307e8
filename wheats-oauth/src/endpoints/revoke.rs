//! Revocation endpoint (RFC 7009)
//!
//! Authenticated clients revoke their own tokens. Unknown token values
//! still return 200 so revocation cannot be used to probe the token
//! store.

use super::OAuthState;
use super::token::engine_error_response;
use crate::models::{OAuthErrorBody, RevokeRequest};
use axum::{Form, Json, extract::State, http::StatusCode};

/// `POST /oauth/revoke`.
pub async fn revoke_endpoint(
    State(state): State<OAuthState>,
    Form(request): Form<RevokeRequest>,
) -> Result<StatusCode, (StatusCode, Json<OAuthErrorBody>)> {
    state
        .engine
        .revoke(&request)
        .await
        .map(|()| StatusCode::OK)
        .map_err(engine_error_response)
}
