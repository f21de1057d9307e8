//! Storage backends for codes and tokens
//!
//! The engine talks to storage through [`AuthStorage`] so the atomicity
//! guarantees (single-use codes, rotate-as-one-transaction) can be met by
//! an in-memory backend in tests and a persistent one in production.
//! Failures are typed - callers map them to the OAuth taxonomy rather
//! than sniffing error payloads.

use crate::models::{AuthorizationCode, Token};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod memory;

pub use memory::MemoryAuthStorage;

/// Storage-level failures.
///
/// Everything except `Unavailable` is a deterministic rejection and must
/// not be retried; `Unavailable` is transient and the engine retries it
/// once.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No such authorization code.
    #[error("authorization code not found")]
    CodeNotFound,

    /// Code past its expiry.
    #[error("authorization code expired")]
    CodeExpired,

    /// Code was already exchanged once. The store revokes tokens issued
    /// from it before returning this.
    #[error("authorization code already consumed")]
    CodeConsumed,

    /// Code belongs to a different client.
    #[error("authorization code issued to a different client")]
    CodeClientMismatch,

    /// redirect_uri differs from the one bound at issuance.
    #[error("redirect_uri does not match authorization request")]
    RedirectUriMismatch,

    /// Code carries a PKCE challenge but no verifier was presented.
    #[error("code_verifier is required")]
    PkceRequired,

    /// PKCE verifier does not match the stored challenge.
    #[error("PKCE verification failed")]
    PkceMismatch,

    /// No such token.
    #[error("token not found")]
    TokenNotFound,

    /// Token past its expiry.
    #[error("token expired")]
    TokenExpired,

    /// Token was revoked, explicitly or by rotation.
    #[error("token revoked")]
    TokenRevoked,

    /// A refresh operation was attempted with a non-refresh token.
    #[error("not a refresh token")]
    NotRefreshToken,

    /// Token belongs to a different client.
    #[error("token issued to a different client")]
    TokenClientMismatch,

    /// Transient backend failure (timeout, lost connection).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Transient failures may be retried once; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Parameters for the atomic code exchange.
#[derive(Debug, Clone, Copy)]
pub struct ConsumeCodeRequest<'a> {
    /// The authorization code value.
    pub code: &'a str,
    /// Client attempting the exchange.
    pub client_id: &'a str,
    /// redirect_uri presented at exchange; must equal the bound one.
    pub redirect_uri: &'a str,
    /// PKCE verifier, when the code carries a challenge.
    pub code_verifier: Option<&'a str>,
}

/// Storage backend for authorization codes and tokens.
///
/// Implementations must make `consume_code` and `rotate_refresh` atomic
/// check-and-set operations: two racing exchanges of the same code (or
/// refreshes of the same token) must produce exactly one winner.
#[async_trait]
pub trait AuthStorage: Send + Sync {
    /// Persist a freshly issued authorization code.
    async fn put_code(&self, code: AuthorizationCode) -> Result<(), StoreError>;

    /// Atomically validate and consume an authorization code.
    ///
    /// Checks, in order: existence, expiry (against the caller's `now`),
    /// prior consumption, client binding, redirect binding, PKCE. On
    /// success the code is marked consumed in the same critical section
    /// and the bound record is returned. A consume attempt on an
    /// already-consumed code revokes every token descended from it
    /// before failing with [`StoreError::CodeConsumed`].
    async fn consume_code(
        &self,
        req: ConsumeCodeRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationCode, StoreError>;

    /// Persist an issued token.
    async fn put_token(&self, token: Token) -> Result<(), StoreError>;

    /// Look up a token by value. Expiry and revocation are left to the
    /// caller, which evaluates them against its own request-scoped `now`.
    async fn get_token(&self, value: &str) -> Result<Token, StoreError>;

    /// Mark a token revoked. Revoking a refresh token cascades to all
    /// access tokens issued under it.
    async fn revoke_token(&self, value: &str) -> Result<(), StoreError>;

    /// Atomically retire `old_value` and persist its successor pair.
    ///
    /// Re-validates the old refresh token inside the critical section so
    /// a concurrent refresh cannot double-spend it: the loser observes
    /// [`StoreError::TokenRevoked`].
    async fn rotate_refresh(
        &self,
        old_value: &str,
        client_id: &str,
        new_access: Token,
        new_refresh: Token,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Drop expired codes and tokens.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<(), StoreError>;
}
