//! Token endpoint
//!
//! `POST /oauth/token` - form-encoded, dispatched on `grant_type` by the
//! issuance engine. Rejections use the RFC 6749 error taxonomy: 400 with
//! an `error` field, except transient storage failures which surface as
//! a bare 500.

use super::OAuthState;
use crate::engine::EngineError;
use crate::models::{OAuthErrorBody, TokenRequest, TokenResponse};
use axum::{Form, Json, extract::State, http::StatusCode};

pub(super) fn engine_error_response(error: EngineError) -> (StatusCode, Json<OAuthErrorBody>) {
    let status = match error {
        EngineError::Server => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(error.body()))
}

/// `POST /oauth/token` - exchange an authorization code or refresh token
/// for a token pair.
pub async fn token_endpoint(
    State(state): State<OAuthState>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, (StatusCode, Json<OAuthErrorBody>)> {
    state
        .engine
        .exchange(&request)
        .await
        .map(Json)
        .map_err(engine_error_response)
}
