//! Protected demo resource endpoints
//!
//! The resource-server half of the bearer contract: a middleware layer
//! validates the access token (401 on failure), each handler then
//! enforces its statically declared scope (403 on failure). The handlers
//! themselves return canned demo payloads; real business endpoints live
//! elsewhere and consume the same middleware.

use super::OAuthState;
use crate::bearer::{AuthContext, bearer_error_response, require_scope, validate_bearer_token};
use axum::{
    Extension, Json, Router,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;

/// Bearer-validation middleware. Attaches [`AuthContext`] to the request
/// extensions on success.
pub async fn bearer_auth(
    State(state): State<OAuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let now = Utc::now();
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match validate_bearer_token(state.storage.as_ref(), header, now).await {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(error) => bearer_error_response(error),
    }
}

/// Router for the protected demo endpoints, with bearer validation
/// layered on every route.
pub fn resource_router(state: &OAuthState) -> Router<OAuthState> {
    Router::new()
        .route("/api/me", get(me))
        .route("/api/customer/orders", get(customer_orders))
        .route("/api/store/dashboard", get(store_dashboard))
        .route_layer(middleware::from_fn_with_state(state.clone(), bearer_auth))
}

/// `GET /api/me` - requires scope `profile`.
async fn me(
    State(state): State<OAuthState>,
    Extension(context): Extension<AuthContext>,
) -> Response {
    if let Err(error) = require_scope(&context, "profile") {
        return bearer_error_response(error);
    }

    let (username, role) = state
        .users
        .get(&context.user_id)
        .map(|u| (u.username.clone(), u.role.clone()))
        .unwrap_or_default();

    Json(serde_json::json!({
        "user_id": context.user_id,
        "username": username,
        "role": role,
        "client_id": context.client_id,
        "scope": context.scope.to_string(),
    }))
    .into_response()
}

/// `GET /api/customer/orders` - requires scope `customer`.
async fn customer_orders(Extension(context): Extension<AuthContext>) -> Response {
    if let Err(error) = require_scope(&context, "customer") {
        return bearer_error_response(error);
    }

    Json(serde_json::json!({
        "user_id": context.user_id,
        "orders": [
            { "order_id": "ord-1001", "store": "Wheats Pizza", "status": "DELIVERED" },
            { "order_id": "ord-1002", "store": "Noodle Cart", "status": "PREPARING" },
        ],
    }))
    .into_response()
}

/// `GET /api/store/dashboard` - requires scope `store`.
async fn store_dashboard(Extension(context): Extension<AuthContext>) -> Response {
    if let Err(error) = require_scope(&context, "store") {
        return bearer_error_response(error);
    }

    Json(serde_json::json!({
        "user_id": context.user_id,
        "open_orders": 4,
        "todays_revenue": 58200,
    }))
    .into_response()
}
