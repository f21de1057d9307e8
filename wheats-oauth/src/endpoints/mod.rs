//! HTTP surface of the authorization server
//!
//! axum handlers for the authorization, token, and revocation endpoints,
//! plus the protected demo resource endpoints that exercise the bearer
//! contract. All shared state travels in [`OAuthState`] via
//! `axum::extract::State`; there is no process-wide singleton.

pub mod authorize;
pub mod resource;
pub mod revoke;
pub mod token;

pub use authorize::{authorize_get, authorize_post};
pub use resource::resource_router;
pub use revoke::revoke_endpoint;
pub use token::token_endpoint;

use crate::config::TokenConfig;
use crate::engine::TokenEngine;
use crate::registry::ClientRegistry;
use crate::store::{AuthStorage, MemoryAuthStorage};
use crate::users::UserDirectory;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

/// Shared state for all OAuth and resource handlers.
#[derive(Clone)]
pub struct OAuthState {
    /// The token issuance engine.
    pub engine: Arc<TokenEngine>,
    /// Registered clients.
    pub registry: Arc<ClientRegistry>,
    /// Resource owners for the consent flow.
    pub users: Arc<UserDirectory>,
    /// Token/code storage, shared with the bearer validator.
    pub storage: Arc<dyn AuthStorage>,
}

impl OAuthState {
    /// Assemble state over an arbitrary storage backend.
    pub fn new(
        registry: Arc<ClientRegistry>,
        users: Arc<UserDirectory>,
        storage: Arc<dyn AuthStorage>,
        config: TokenConfig,
    ) -> Self {
        let engine = Arc::new(TokenEngine::new(
            Arc::clone(&registry),
            Arc::clone(&storage),
            config,
        ));
        Self {
            engine,
            registry,
            users,
            storage,
        }
    }

    /// State backed by in-memory storage, for tests and single-process
    /// deployments.
    pub fn in_memory(
        registry: Arc<ClientRegistry>,
        users: Arc<UserDirectory>,
        config: TokenConfig,
    ) -> Self {
        Self::new(registry, users, Arc::new(MemoryAuthStorage::new()), config)
    }
}

/// OAuth endpoint router: authorization, token, revocation.
pub fn oauth_router() -> Router<OAuthState> {
    Router::new()
        .route("/oauth/authorize", get(authorize_get).post(authorize_post))
        .route("/oauth/token", post(token_endpoint))
        .route("/oauth/revoke", post(revoke_endpoint))
}
