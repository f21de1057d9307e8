//! Resource-owner directory
//!
//! Backs the consent flow's login check. Like the client registry this is
//! seeded at startup; user management itself is somebody else's problem.

use crate::crypto::SecretHash;
use std::collections::HashMap;

/// A resource owner who can approve authorization requests.
#[derive(Debug, Clone)]
pub struct User {
    /// Stable identifier bound into codes and tokens.
    pub user_id: String,
    /// Login name.
    pub username: String,
    /// Salted password hash.
    pub password: SecretHash,
    /// Coarse role (`customer`, `store`, `admin`); informational only,
    /// access control runs on token scope.
    pub role: String,
}

/// Username-indexed user table.
#[derive(Debug, Default)]
pub struct UserDirectory {
    by_username: HashMap<String, User>,
}

impl UserDirectory {
    /// Build a directory from seeded users.
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            by_username: users
                .into_iter()
                .map(|u| (u.username.clone(), u))
                .collect(),
        }
    }

    /// Verify a username/password pair; returns the user on success.
    ///
    /// Unknown usernames still burn a hash verification so the timing of
    /// a miss matches a wrong password.
    pub fn authenticate(&self, username: &str, password: &str) -> Option<&User> {
        match self.by_username.get(username) {
            Some(user) if user.password.verify(password) => Some(user),
            Some(_) => None,
            None => {
                let _ = SecretHash::new("missing-user").verify(password);
                None
            }
        }
    }

    /// Look up a user by id.
    pub fn get(&self, user_id: &str) -> Option<&User> {
        self.by_username.values().find(|u| u.user_id == user_id)
    }
}
