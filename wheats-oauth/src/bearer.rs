//! Bearer token validation (RFC 6750)
//!
//! The check every protected resource endpoint runs: parse the
//! `Authorization` header, look the token up, reject missing / unknown /
//! revoked / expired credentials with 401, and leave scope enforcement
//! as a separate step that rejects with 403. Resource endpoints must keep
//! that 401-vs-403 split intact - it tells clients whether to
//! re-authenticate or to stop asking.

use crate::models::TokenKind;
use crate::scope::ScopeSet;
use crate::store::{AuthStorage, StoreError};
use axum::{
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

/// Bearer validation failures, per RFC 6750 Section 3.1.
#[derive(Debug, Clone)]
pub enum BearerError {
    /// No `Authorization` header.
    MissingToken,
    /// Malformed header, unknown token, revoked token, or wrong kind.
    InvalidToken(String),
    /// Token past its expiry.
    ExpiredToken,
    /// Token valid but lacks the endpoint's required scope.
    InsufficientScope(String),
    /// Storage failure that survived the retry; no detail leaves.
    Server,
}

impl BearerError {
    /// RFC 6750 error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            BearerError::MissingToken => "invalid_request",
            BearerError::InvalidToken(_) => "invalid_token",
            BearerError::ExpiredToken => "invalid_token",
            BearerError::InsufficientScope(_) => "insufficient_scope",
            BearerError::Server => "server_error",
        }
    }

    /// Human-readable description for the error body.
    pub fn error_description(&self) -> String {
        match self {
            BearerError::MissingToken => "No access token provided".to_string(),
            BearerError::InvalidToken(msg) => msg.clone(),
            BearerError::ExpiredToken => "Access token has expired".to_string(),
            BearerError::InsufficientScope(scope) => {
                format!("Insufficient scope, required: {scope}")
            }
            BearerError::Server => "Internal error".to_string(),
        }
    }

    /// 401 for credential problems, 403 for scope, 500 for storage.
    pub fn status(&self) -> StatusCode {
        match self {
            BearerError::InsufficientScope(_) => StatusCode::FORBIDDEN,
            BearerError::Server => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Identity and grant attached to a validated access token.
///
/// `scope` is the token's immutable granted scope; handlers check their
/// own required scope against it via [`require_scope`].
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Resource owner the token acts for.
    pub user_id: String,
    /// Client the token was issued to.
    pub client_id: String,
    /// Granted scope, fixed at issuance.
    pub scope: ScopeSet,
}

/// Validate the `Authorization` header against the token store.
///
/// `now` is the caller's single wall-clock capture for the request.
pub async fn validate_bearer_token(
    storage: &dyn AuthStorage,
    header_value: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AuthContext, BearerError> {
    let header_value = header_value.ok_or(BearerError::MissingToken)?;

    let token_value = header_value
        .strip_prefix("Bearer ")
        .or_else(|| header_value.strip_prefix("bearer "))
        .ok_or_else(|| {
            BearerError::InvalidToken("Invalid authorization header format".into())
        })?;

    let token = match storage.get_token(token_value).await {
        Err(ref e) if e.is_transient() => storage.get_token(token_value).await,
        other => other,
    }
    .map_err(|e| match e {
        StoreError::TokenNotFound => BearerError::InvalidToken("Unknown access token".into()),
        StoreError::Unavailable(detail) => {
            tracing::error!(detail, "token lookup unavailable after retry");
            BearerError::Server
        }
        other => BearerError::InvalidToken(other.to_string()),
    })?;

    if token.kind != TokenKind::Access {
        return Err(BearerError::InvalidToken(
            "Not an access token".to_string(),
        ));
    }
    if token.revoked {
        return Err(BearerError::InvalidToken("Token has been revoked".into()));
    }
    if token.is_expired(now) {
        return Err(BearerError::ExpiredToken);
    }

    Ok(AuthContext {
        user_id: token.user_id,
        client_id: token.client_id,
        scope: token.granted_scope,
    })
}

/// Enforce an endpoint's statically declared scope. Distinct from token
/// validity: failure here is 403, not 401.
pub fn require_scope(context: &AuthContext, required: &str) -> Result<(), BearerError> {
    if context.scope.contains(required) {
        Ok(())
    } else {
        Err(BearerError::InsufficientScope(required.to_string()))
    }
}

/// `WWW-Authenticate` header builder per RFC 6750 Section 3.
pub struct WwwAuthenticate {
    realm: String,
    error: Option<BearerError>,
}

impl WwwAuthenticate {
    /// Start a challenge for the given realm.
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            error: None,
        }
    }

    /// Attach error information.
    pub fn with_error(mut self, error: BearerError) -> Self {
        self.error = Some(error);
        self
    }

    /// Build the header value.
    pub fn to_header_value(&self) -> HeaderValue {
        let mut parts = vec![format!("Bearer realm=\"{}\"", self.realm)];

        if let Some(ref error) = self.error {
            parts.push(format!("error=\"{}\"", error.error_code()));
            parts.push(format!(
                "error_description=\"{}\"",
                error.error_description()
            ));
        }

        HeaderValue::from_str(&parts.join(", "))
            .unwrap_or_else(|_| HeaderValue::from_static("Bearer realm=\"wheats\""))
    }
}

/// Build the error response for a failed bearer check: 401s carry the
/// `WWW-Authenticate` challenge, 403/500 just the JSON body.
pub fn bearer_error_response(error: BearerError) -> Response {
    let status = error.status();
    let body = serde_json::json!({
        "error": error.error_code(),
        "error_description": error.error_description(),
    })
    .to_string();

    let mut headers = HeaderMap::new();
    if status == StatusCode::UNAUTHORIZED {
        headers.insert(
            header::WWW_AUTHENTICATE,
            WwwAuthenticate::new("wheats").with_error(error).to_header_value(),
        );
    }
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    (status, headers, body).into_response()
}
