//! # Wheats OAuth 2.0 Authorization Server
//!
//! Token lifecycle core for the Wheats food-delivery demo: authorization
//! codes with PKCE, opaque access/refresh token issuance, refresh
//! rotation with scope pinning, and bearer validation for resource
//! endpoints.
//!
//! The engine's central invariant: a refresh exchange can never widen
//! scope. Tokens derived from a refresh token are bound to a subset of
//! its granted scope, and a request for anything more fails with
//! `invalid_scope`.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wheats_oauth::{OAuthState, TokenConfig, config, oauth_router, resource_router};
//!
//! let registry = Arc::new(config::build_registry(client_seeds));
//! let users = Arc::new(config::build_users(user_seeds));
//! let state = OAuthState::in_memory(registry, users, TokenConfig::default());
//!
//! let app = oauth_router()
//!     .merge(resource_router(&state))
//!     .with_state(state);
//! ```

pub mod bearer;
pub mod config;
pub mod crypto;
pub mod endpoints;
pub mod engine;
pub mod models;
pub mod pkce;
pub mod registry;
pub mod scope;
pub mod store;
pub mod users;

pub use bearer::{AuthContext, BearerError, require_scope, validate_bearer_token};
pub use config::{ClientSeed, TokenConfig, UserSeed};
pub use endpoints::{OAuthState, oauth_router, resource_router};
pub use engine::{EngineError, TokenEngine};
pub use models::{
    AuthorizationCode, OAuthErrorBody, RevokeRequest, Token, TokenKind, TokenRequest,
    TokenResponse,
};
pub use pkce::CodeChallengeMethod;
pub use registry::{Client, ClientRegistry};
pub use scope::ScopeSet;
pub use store::{AuthStorage, MemoryAuthStorage, StoreError};
pub use users::{User, UserDirectory};
