//! Token issuance engine
//!
//! The grant state machine behind `POST /oauth/token`: client
//! authentication, authorization-code exchange with PKCE, and refresh
//! rotation with scope pinning. Every request either reaches `Issued`
//! with a token response or is rejected with one of the RFC 6749 error
//! codes.
//!
//! The invariant this engine exists to enforce: the granted scope of any
//! token minted by a refresh exchange is a subset of the granted scope of
//! the refresh token being exchanged. A refresh request can narrow scope,
//! never widen it.

use crate::config::TokenConfig;
use crate::crypto::{generate_authorization_code, generate_token_value, token_preview};
use crate::models::{
    AuthorizationCode, OAuthErrorBody, RevokeRequest, Token, TokenKind, TokenRequest,
    TokenResponse,
};
use crate::pkce::{CodeChallengeMethod, validate_code_verifier};
use crate::registry::ClientRegistry;
use crate::scope::ScopeSet;
use crate::store::{AuthStorage, ConsumeCodeRequest, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Engine-level failures, one variant per OAuth error code.
///
/// All variants except `Server` are deterministic rejections and are
/// never retried. `Server` covers transient storage failures that
/// survived the single internal retry; it carries no detail outward.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing request parameters.
    #[error("{0}")]
    InvalidRequest(String),

    /// Unknown client or failed client authentication.
    #[error("{0}")]
    InvalidClient(String),

    /// Bad, expired, consumed, or revoked code/token.
    #[error("{0}")]
    InvalidGrant(String),

    /// Requested scope is not a subset of the allowed/granted scope.
    #[error("{0}")]
    InvalidScope(String),

    /// grant_type other than authorization_code / refresh_token.
    #[error("{0}")]
    UnsupportedGrantType(String),

    /// Transient storage failure; surfaced with no internal detail.
    #[error("internal error")]
    Server,
}

impl EngineError {
    /// RFC 6749 error code for the wire body.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::InvalidClient(_) => "invalid_client",
            EngineError::InvalidGrant(_) => "invalid_grant",
            EngineError::InvalidScope(_) => "invalid_scope",
            EngineError::UnsupportedGrantType(_) => "unsupported_grant_type",
            EngineError::Server => "server_error",
        }
    }

    /// Wire-format error body. `Server` deliberately has no description.
    pub fn body(&self) -> OAuthErrorBody {
        match self {
            EngineError::Server => OAuthErrorBody::server_error(),
            other => OAuthErrorBody::new(other.error_code(), other.to_string()),
        }
    }
}

/// Retry a storage call once when the failure is transient; every other
/// outcome is final.
macro_rules! retry_transient {
    ($call:expr) => {{
        match $call {
            Err(ref e) if StoreError::is_transient(e) => $call,
            other => other,
        }
    }};
}

fn grant_error(err: StoreError) -> EngineError {
    match err {
        StoreError::Unavailable(detail) => {
            tracing::error!(detail, "storage unavailable after retry");
            EngineError::Server
        }
        other => EngineError::InvalidGrant(other.to_string()),
    }
}

/// The token issuance engine.
///
/// Explicit state passed to each handler; there is no process-wide
/// singleton. Cheap to clone via the inner `Arc`s.
pub struct TokenEngine {
    registry: Arc<ClientRegistry>,
    storage: Arc<dyn AuthStorage>,
    config: TokenConfig,
}

impl TokenEngine {
    /// Build an engine over a registry and storage backend.
    pub fn new(
        registry: Arc<ClientRegistry>,
        storage: Arc<dyn AuthStorage>,
        config: TokenConfig,
    ) -> Self {
        Self {
            registry,
            storage,
            config,
        }
    }

    /// The storage backend, shared with the bearer validator.
    pub fn storage(&self) -> Arc<dyn AuthStorage> {
        Arc::clone(&self.storage)
    }

    /// Issue an authorization code on behalf of the consent flow.
    ///
    /// The scope must already be what the resource owner approved; the
    /// engine re-checks it against the client's allowance.
    pub async fn issue_code(
        &self,
        client_id: &str,
        user_id: &str,
        scope: ScopeSet,
        redirect_uri: &str,
        code_challenge: Option<String>,
        code_challenge_method: CodeChallengeMethod,
    ) -> Result<String, EngineError> {
        let now = Utc::now();

        let Some(client) = self.registry.get(client_id) else {
            return Err(EngineError::InvalidClient("unknown client".into()));
        };
        if !self.registry.redirect_uri_allowed(client_id, redirect_uri) {
            return Err(EngineError::InvalidRequest(
                "redirect_uri is not registered for this client".into(),
            ));
        }
        if !self.registry.scope_allowed(client_id, &scope) {
            return Err(EngineError::InvalidScope(
                "requested scope exceeds client allowance".into(),
            ));
        }
        // Public clients have no secret; a code without a challenge would
        // be exchangeable by anyone who intercepts it.
        if client.is_public() && code_challenge.is_none() {
            return Err(EngineError::InvalidRequest(
                "code_challenge is required for public clients".into(),
            ));
        }

        let code = generate_authorization_code();
        let record = AuthorizationCode {
            code: code.clone(),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scope,
            redirect_uri: redirect_uri.to_string(),
            code_challenge,
            code_challenge_method,
            issued_at: now,
            expires_at: now + self.config.code_ttl(),
            consumed: false,
        };

        retry_transient!(self.storage.put_code(record.clone()).await).map_err(|e| {
            tracing::error!(error = %e, "failed to persist authorization code");
            EngineError::Server
        })?;

        tracing::info!(
            client_id,
            user_id,
            code_prefix = token_preview(&code),
            "authorization code issued"
        );
        Ok(code)
    }

    /// `POST /oauth/token` entry point: dispatch on grant_type.
    pub async fn exchange(&self, request: &TokenRequest) -> Result<TokenResponse, EngineError> {
        // One wall-clock capture per request; every expiry comparison
        // below uses it.
        let now = Utc::now();

        match request.grant_type.as_str() {
            "authorization_code" => self.authorization_code_grant(request, now).await,
            "refresh_token" => self.refresh_token_grant(request, now).await,
            other => Err(EngineError::UnsupportedGrantType(format!(
                "grant_type '{other}' not supported"
            ))),
        }
    }

    async fn authorization_code_grant(
        &self,
        request: &TokenRequest,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, EngineError> {
        self.authenticate_client(request)?;

        let code = request
            .code
            .as_deref()
            .ok_or_else(|| EngineError::InvalidRequest("code is required".into()))?;
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| EngineError::InvalidRequest("redirect_uri is required".into()))?;

        if let Some(verifier) = request.code_verifier.as_deref() {
            if !validate_code_verifier(verifier) {
                return Err(EngineError::InvalidRequest(
                    "code_verifier does not meet RFC 7636 format requirements".into(),
                ));
            }
        }

        let consume = ConsumeCodeRequest {
            code,
            client_id: &request.client_id,
            redirect_uri,
            code_verifier: request.code_verifier.as_deref(),
        };
        let auth_code = retry_transient!(self.storage.consume_code(consume, now).await)
            .map_err(grant_error)?;

        let (access, refresh) = self.mint_pair(
            &auth_code.client_id,
            &auth_code.user_id,
            auth_code.scope.clone(),
            Some(auth_code.code.clone()),
            None,
            now,
        );

        retry_transient!(self.storage.put_token(refresh.clone()).await)
            .map_err(|_| EngineError::Server)?;
        retry_transient!(self.storage.put_token(access.clone()).await)
            .map_err(|_| EngineError::Server)?;

        tracing::info!(
            client_id = request.client_id,
            user_id = auth_code.user_id,
            scope = %access.granted_scope,
            access_prefix = token_preview(&access.value),
            "token pair issued from authorization code"
        );

        Ok(self.token_response(access, refresh, now))
    }

    async fn refresh_token_grant(
        &self,
        request: &TokenRequest,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, EngineError> {
        self.authenticate_client(request)?;

        let refresh_value = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| EngineError::InvalidRequest("refresh_token is required".into()))?;

        let old = retry_transient!(self.storage.get_token(refresh_value).await)
            .map_err(grant_error)?;

        if old.kind != TokenKind::Refresh {
            return Err(EngineError::InvalidGrant("not a refresh token".into()));
        }
        if old.client_id != request.client_id {
            return Err(EngineError::InvalidGrant(
                "token issued to a different client".into(),
            ));
        }
        if old.revoked {
            return Err(EngineError::InvalidGrant("token revoked".into()));
        }
        if old.is_expired(now) {
            return Err(EngineError::InvalidGrant("token expired".into()));
        }

        // Scope pinning. A refresh may keep or narrow the original
        // grant; anything outside it is invalid_scope, and no token is
        // issued.
        let effective_scope = match request.scope.as_deref() {
            None | Some("") => old.granted_scope.clone(),
            Some(raw) => {
                let requested = ScopeSet::parse(raw);
                if !requested.is_subset_of(&old.granted_scope) {
                    tracing::warn!(
                        client_id = request.client_id,
                        user_id = old.user_id,
                        granted = %old.granted_scope,
                        requested = %requested,
                        "refresh requested scope outside original grant"
                    );
                    return Err(EngineError::InvalidScope(
                        "requested scope exceeds the originally granted scope".into(),
                    ));
                }
                requested
            }
        };

        let (access, refresh) = self.mint_pair(
            &old.client_id,
            &old.user_id,
            effective_scope,
            old.source_code.clone(),
            Some(old.value.clone()),
            now,
        );

        retry_transient!(
            self.storage
                .rotate_refresh(
                    refresh_value,
                    &request.client_id,
                    access.clone(),
                    refresh.clone(),
                    now,
                )
                .await
        )
        .map_err(grant_error)?;

        tracing::info!(
            client_id = request.client_id,
            user_id = access.user_id,
            scope = %access.granted_scope,
            access_prefix = token_preview(&access.value),
            "refresh token rotated"
        );

        Ok(self.token_response(access, refresh, now))
    }

    /// `POST /oauth/revoke` (RFC 7009). Unknown or foreign token values
    /// succeed silently; revocation must not be a lookup oracle.
    pub async fn revoke(&self, request: &RevokeRequest) -> Result<(), EngineError> {
        if !self
            .registry
            .verify_secret(&request.client_id, request.client_secret.as_deref())
        {
            return Err(EngineError::InvalidClient(
                "client authentication failed".into(),
            ));
        }

        let token = match retry_transient!(self.storage.get_token(&request.token).await) {
            Ok(token) => token,
            Err(StoreError::TokenNotFound) => return Ok(()),
            Err(StoreError::Unavailable(_)) => return Err(EngineError::Server),
            Err(_) => return Ok(()),
        };

        if token.client_id != request.client_id {
            return Ok(());
        }

        match retry_transient!(self.storage.revoke_token(&request.token).await) {
            Ok(()) | Err(StoreError::TokenNotFound) => Ok(()),
            Err(StoreError::Unavailable(_)) => Err(EngineError::Server),
            Err(_) => Ok(()),
        }
    }

    fn authenticate_client(&self, request: &TokenRequest) -> Result<(), EngineError> {
        if self.registry.get(&request.client_id).is_none() {
            return Err(EngineError::InvalidClient("unknown client".into()));
        }
        if !self
            .registry
            .verify_secret(&request.client_id, request.client_secret.as_deref())
        {
            return Err(EngineError::InvalidClient(
                "client authentication failed".into(),
            ));
        }
        Ok(())
    }

    /// Mint an access/refresh pair with the scope fixed at creation.
    /// The access token hangs off the new refresh token so cascade
    /// revocation can find it.
    fn mint_pair(
        &self,
        client_id: &str,
        user_id: &str,
        scope: ScopeSet,
        source_code: Option<String>,
        parent_refresh: Option<String>,
        now: DateTime<Utc>,
    ) -> (Token, Token) {
        let refresh = Token {
            value: generate_token_value(),
            kind: TokenKind::Refresh,
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            granted_scope: scope.clone(),
            issued_at: now,
            expires_at: now + self.config.refresh_ttl(),
            parent_refresh_token: parent_refresh,
            source_code: source_code.clone(),
            revoked: false,
        };
        let access = Token {
            value: generate_token_value(),
            kind: TokenKind::Access,
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            granted_scope: scope,
            issued_at: now,
            expires_at: now + self.config.access_ttl(),
            parent_refresh_token: Some(refresh.value.clone()),
            source_code,
            revoked: false,
        };
        (access, refresh)
    }

    fn token_response(&self, access: Token, refresh: Token, now: DateTime<Utc>) -> TokenResponse {
        TokenResponse {
            expires_in: access.expires_in(now),
            scope: Some(access.granted_scope.to_string()),
            access_token: access.value,
            token_type: "Bearer".to_string(),
            refresh_token: Some(refresh.value),
        }
    }
}
