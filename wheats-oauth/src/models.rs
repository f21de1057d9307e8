//! OAuth data models
//!
//! Records held by the authorization server (clients, codes, tokens) and
//! the wire-level request/response/error shapes of the token endpoint.

use crate::pkce::CodeChallengeMethod;
use crate::scope::ScopeSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authorization code issued by the consent flow, exchangeable at most
/// once at the token endpoint.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    /// The opaque code value.
    pub code: String,
    /// Client the code was issued to.
    pub client_id: String,
    /// Resource owner who approved the grant.
    pub user_id: String,
    /// Scope the resource owner approved; becomes the granted scope of
    /// every token minted from this code.
    pub scope: ScopeSet,
    /// Redirect URI used at issuance; must match at exchange.
    pub redirect_uri: String,
    /// PKCE challenge, when the client supplied one.
    pub code_challenge: Option<String>,
    /// PKCE challenge method.
    pub code_challenge_method: CodeChallengeMethod,
    /// Issuance time.
    pub issued_at: DateTime<Utc>,
    /// Expiry; codes live for minutes at most.
    pub expires_at: DateTime<Utc>,
    /// Set on first successful exchange. A consumed code is dead; a
    /// second exchange attempt additionally revokes the tokens the first
    /// one produced.
    pub consumed: bool,
}

impl AuthorizationCode {
    /// Boundary-inclusive expiry check.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Access or refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    /// Short-lived bearer credential for resource endpoints.
    Access,
    /// Long-lived credential for the `refresh_token` grant.
    Refresh,
}

/// An issued token record.
///
/// `granted_scope` is fixed at issuance and immutable for the life of the
/// token; refresh exchanges may narrow it for successor tokens but never
/// widen it.
#[derive(Debug, Clone)]
pub struct Token {
    /// The opaque token value presented by clients.
    pub value: String,
    /// Access or refresh.
    pub kind: TokenKind,
    /// Client the token was issued to.
    pub client_id: String,
    /// Resource owner the token acts for.
    pub user_id: String,
    /// Scope bound to this token at issuance.
    pub granted_scope: ScopeSet,
    /// Issuance time.
    pub issued_at: DateTime<Utc>,
    /// Expiry; access tokens live minutes, refresh tokens days.
    pub expires_at: DateTime<Utc>,
    /// For access tokens: the refresh token they were issued under.
    /// For rotated refresh tokens: their predecessor.
    pub parent_refresh_token: Option<String>,
    /// Authorization code this token descends from, for replay defense.
    pub source_code: Option<String>,
    /// Set by explicit revocation or refresh rotation.
    pub revoked: bool,
}

impl Token {
    /// Boundary-inclusive expiry check: a token is rejected at
    /// `now == expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Seconds until expiry, zero if already expired.
    pub fn expires_in(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// Token endpoint request parameters (form-encoded).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// `authorization_code` or `refresh_token`.
    pub grant_type: String,
    /// Authorization code (authorization_code grant).
    pub code: Option<String>,
    /// Redirect URI used at authorization (authorization_code grant).
    pub redirect_uri: Option<String>,
    /// PKCE code verifier (authorization_code grant).
    pub code_verifier: Option<String>,
    /// Refresh token value (refresh_token grant).
    pub refresh_token: Option<String>,
    /// Requested scope (refresh_token grant, optional). Must be a subset
    /// of the refresh token's granted scope.
    pub scope: Option<String>,
    /// Client identifier.
    pub client_id: String,
    /// Client secret; absent for public (PKCE-only) clients.
    pub client_secret: Option<String>,
}

/// Token endpoint success response (RFC 6749 Section 5.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The opaque access token.
    pub access_token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    /// The (rotated) refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Space-delimited granted scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Revocation endpoint request parameters (RFC 7009).
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeRequest {
    /// The token to revoke (access or refresh).
    pub token: String,
    /// Client identifier.
    pub client_id: String,
    /// Client secret; absent for public clients.
    pub client_secret: Option<String>,
}

/// Error response (RFC 6749 Section 5.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthErrorBody {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable detail. Never contains secrets or token values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuthErrorBody {
    /// Build an error body from a code and description.
    pub fn new(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: Some(description.into()),
        }
    }

    /// `invalid_request`: malformed or missing parameters.
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new("invalid_request", description)
    }

    /// `invalid_client`: unknown client or bad secret.
    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new("invalid_client", description)
    }

    /// `invalid_grant`: bad, expired, or consumed code or token.
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new("invalid_grant", description)
    }

    /// `invalid_scope`: requested scope not a subset of allowed/granted.
    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::new("invalid_scope", description)
    }

    /// `unsupported_grant_type`.
    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self::new("unsupported_grant_type", description)
    }

    /// `server_error`: transient internal failure, no detail leaked.
    pub fn server_error() -> Self {
        Self {
            error: "server_error".to_string(),
            error_description: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token_expiring_at(expires_at: DateTime<Utc>) -> Token {
        Token {
            value: "tok".into(),
            kind: TokenKind::Access,
            client_id: "client".into(),
            user_id: "user".into(),
            granted_scope: ScopeSet::parse("customer"),
            issued_at: expires_at - Duration::hours(1),
            expires_at,
            parent_refresh_token: None,
            source_code: None,
            revoked: false,
        }
    }

    #[test]
    fn token_expiry_is_boundary_inclusive() {
        let now = Utc::now();
        let token = token_expiring_at(now);
        assert!(token.is_expired(now));
        assert!(token.is_expired(now + Duration::seconds(1)));
        assert!(!token.is_expired(now - Duration::seconds(1)));
    }

    #[test]
    fn expires_in_clamps_at_zero() {
        let now = Utc::now();
        let token = token_expiring_at(now + Duration::seconds(120));
        assert_eq!(token.expires_in(now), 120);
        assert_eq!(token.expires_in(now + Duration::seconds(300)), 0);
    }

    #[test]
    fn error_body_serialization_omits_empty_description() {
        let body = OAuthErrorBody::server_error();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"error": "server_error"}));

        let body = OAuthErrorBody::invalid_scope("scope exceeds grant");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "invalid_scope");
        assert_eq!(json["error_description"], "scope exceeds grant");
    }
}
