//! Authorization server configuration
//!
//! TTL policy plus the seeded client/user tables, deserializable from
//! TOML. Plaintext seed secrets are hashed on load and never kept.

use crate::crypto::SecretHash;
use crate::registry::{Client, ClientRegistry};
use crate::scope::ScopeSet;
use crate::users::{User, UserDirectory};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Token lifetime and rotation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Authorization code TTL in seconds.
    pub code_ttl_secs: u64,
    /// Access token TTL in seconds.
    pub access_ttl_secs: u64,
    /// Refresh token TTL in days.
    pub refresh_ttl_days: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: 300,
            access_ttl_secs: 3600,
            refresh_ttl_days: 30,
        }
    }
}

impl TokenConfig {
    /// Code TTL as a chrono duration.
    pub fn code_ttl(&self) -> Duration {
        Duration::seconds(self.code_ttl_secs as i64)
    }

    /// Access token TTL as a chrono duration.
    pub fn access_ttl(&self) -> Duration {
        Duration::seconds(self.access_ttl_secs as i64)
    }

    /// Refresh token TTL as a chrono duration.
    pub fn refresh_ttl(&self) -> Duration {
        Duration::days(self.refresh_ttl_days as i64)
    }
}

/// Seed entry for a registered client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSeed {
    /// Unique client identifier.
    pub client_id: String,
    /// Display name for the consent form.
    #[serde(default)]
    pub client_name: String,
    /// Plaintext secret; omit for public (PKCE-only) clients.
    pub client_secret: Option<String>,
    /// Exact-match redirect URIs.
    pub redirect_uris: Vec<String>,
    /// Space-delimited allowed scopes.
    pub allowed_scopes: String,
}

/// Seed entry for a resource owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSeed {
    /// Stable user id; generated when omitted.
    pub user_id: Option<String>,
    /// Login name.
    pub username: String,
    /// Plaintext password, hashed on load.
    pub password: String,
    /// Coarse role label.
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "customer".to_string()
}

/// Build the immutable client registry from seeds.
pub fn build_registry(seeds: impl IntoIterator<Item = ClientSeed>) -> ClientRegistry {
    ClientRegistry::new(seeds.into_iter().map(|seed| Client {
        client_name: if seed.client_name.is_empty() {
            seed.client_id.clone()
        } else {
            seed.client_name
        },
        client_id: seed.client_id,
        secret: seed.client_secret.as_deref().map(SecretHash::new),
        redirect_uris: seed.redirect_uris,
        allowed_scopes: ScopeSet::parse(&seed.allowed_scopes),
    }))
}

/// Build the user directory from seeds.
pub fn build_users(seeds: impl IntoIterator<Item = UserSeed>) -> UserDirectory {
    UserDirectory::new(seeds.into_iter().map(|seed| User {
        user_id: seed
            .user_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        username: seed.username,
        password: SecretHash::new(&seed.password),
        role: seed.role,
    }))
}
