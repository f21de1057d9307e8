//! Client registry
//!
//! Static table of registered OAuth clients, loaded at process start and
//! immutable afterwards. Redirect URIs are matched exactly - no prefix or
//! wildcard matching, which would open a redirect hole.

use crate::crypto::SecretHash;
use crate::scope::ScopeSet;
use std::collections::HashMap;

/// A registered OAuth client.
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique client identifier.
    pub client_id: String,
    /// Display name shown on the consent form.
    pub client_name: String,
    /// Salted hash of the client secret; `None` for public clients,
    /// which must use PKCE instead.
    pub secret: Option<SecretHash>,
    /// Exact-match redirect URIs.
    pub redirect_uris: Vec<String>,
    /// Scopes this client may ever be granted.
    pub allowed_scopes: ScopeSet,
}

impl Client {
    /// Public clients carry no secret and authenticate via PKCE only.
    pub fn is_public(&self) -> bool {
        self.secret.is_none()
    }
}

/// Immutable lookup table of registered clients.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Client>,
}

impl ClientRegistry {
    /// Build a registry from the configured client set.
    pub fn new(clients: impl IntoIterator<Item = Client>) -> Self {
        Self {
            clients: clients
                .into_iter()
                .map(|c| (c.client_id.clone(), c))
                .collect(),
        }
    }

    /// Look up a client by id.
    pub fn get(&self, client_id: &str) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Verify client credentials. Confidential clients must present
    /// their secret (constant-time compare); public clients must present
    /// none.
    pub fn verify_secret(&self, client_id: &str, secret: Option<&str>) -> bool {
        let Some(client) = self.get(client_id) else {
            return false;
        };
        match (&client.secret, secret) {
            (Some(hash), Some(candidate)) => hash.verify(candidate),
            (None, None) => true,
            // Secret for a public client, or missing secret for a
            // confidential one.
            _ => false,
        }
    }

    /// Exact-match redirect URI check.
    pub fn redirect_uri_allowed(&self, client_id: &str, uri: &str) -> bool {
        self.get(client_id)
            .map(|c| c.redirect_uris.iter().any(|r| r == uri))
            .unwrap_or(false)
    }

    /// Whether the requested scope set is within the client's allowance.
    pub fn scope_allowed(&self, client_id: &str, scope: &ScopeSet) -> bool {
        self.get(client_id)
            .map(|c| scope.is_subset_of(&c.allowed_scopes))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> ClientRegistry {
        ClientRegistry::new([
            Client {
                client_id: "android_app".into(),
                client_name: "Wheats Android".into(),
                secret: Some(SecretHash::new("secret123")),
                redirect_uris: vec!["https://app.example.com/callback".into()],
                allowed_scopes: ScopeSet::parse("profile customer store"),
            },
            Client {
                client_id: "kiosk".into(),
                client_name: "Store Kiosk".into(),
                secret: None,
                redirect_uris: vec!["http://localhost:9210/cb".into()],
                allowed_scopes: ScopeSet::parse("store"),
            },
        ])
    }

    #[test]
    fn lookup() {
        let registry = test_registry();
        assert!(registry.get("android_app").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn secret_verification() {
        let registry = test_registry();
        assert!(registry.verify_secret("android_app", Some("secret123")));
        assert!(!registry.verify_secret("android_app", Some("wrong")));
        assert!(!registry.verify_secret("android_app", None));
        assert!(!registry.verify_secret("unknown", Some("secret123")));
    }

    #[test]
    fn public_client_takes_no_secret() {
        let registry = test_registry();
        assert!(registry.verify_secret("kiosk", None));
        assert!(!registry.verify_secret("kiosk", Some("anything")));
    }

    #[test]
    fn redirect_uri_is_exact_match_only() {
        let registry = test_registry();
        assert!(registry.redirect_uri_allowed("android_app", "https://app.example.com/callback"));
        // No prefix matching
        assert!(
            !registry.redirect_uri_allowed("android_app", "https://app.example.com/callback/evil")
        );
        assert!(!registry.redirect_uri_allowed("android_app", "https://app.example.com/"));
        assert!(!registry.redirect_uri_allowed("unknown", "https://app.example.com/callback"));
    }

    #[test]
    fn scope_allowance() {
        let registry = test_registry();
        assert!(registry.scope_allowed("android_app", &ScopeSet::parse("customer profile")));
        assert!(!registry.scope_allowed("android_app", &ScopeSet::parse("admin")));
        assert!(!registry.scope_allowed("kiosk", &ScopeSet::parse("customer")));
    }
}
