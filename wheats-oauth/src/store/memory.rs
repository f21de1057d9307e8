//! In-memory storage backend
//!
//! Thread-safe maps behind `tokio::sync::RwLock`. The write lock is the
//! critical section: consume and rotate do their check-and-set without
//! releasing it, which is what makes single-use codes and single-spend
//! refresh tokens hold under concurrent requests.

use super::{AuthStorage, ConsumeCodeRequest, StoreError};
use crate::crypto::token_preview;
use crate::models::{AuthorizationCode, Token, TokenKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory [`AuthStorage`] implementation.
///
/// The backend for tests and single-process deployments; production
/// swaps in a persistent store behind the same trait.
#[derive(Default)]
pub struct MemoryAuthStorage {
    codes: RwLock<HashMap<String, AuthorizationCode>>,
    tokens: RwLock<HashMap<String, Token>>,
}

impl MemoryAuthStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStorage for MemoryAuthStorage {
    async fn put_code(&self, code: AuthorizationCode) -> Result<(), StoreError> {
        let mut codes = self.codes.write().await;
        codes.insert(code.code.clone(), code);
        Ok(())
    }

    async fn consume_code(
        &self,
        req: ConsumeCodeRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationCode, StoreError> {
        // Lock order: codes, then tokens. Replay revocation below takes
        // both.
        let mut codes = self.codes.write().await;
        let code = codes.get_mut(req.code).ok_or(StoreError::CodeNotFound)?;

        if code.is_expired(now) {
            return Err(StoreError::CodeExpired);
        }

        if code.consumed {
            // Replay: someone is exchanging a code that already produced
            // tokens. Kill the whole lineage.
            let mut tokens = self.tokens.write().await;
            let mut revoked = 0u32;
            for token in tokens.values_mut() {
                if token.source_code.as_deref() == Some(req.code) && !token.revoked {
                    token.revoked = true;
                    revoked += 1;
                }
            }
            tracing::warn!(
                code_prefix = token_preview(req.code),
                client_id = req.client_id,
                revoked_tokens = revoked,
                "authorization code replay detected"
            );
            return Err(StoreError::CodeConsumed);
        }

        if code.client_id != req.client_id {
            return Err(StoreError::CodeClientMismatch);
        }

        if code.redirect_uri != req.redirect_uri {
            return Err(StoreError::RedirectUriMismatch);
        }

        if let Some(challenge) = &code.code_challenge {
            let verifier = req.code_verifier.ok_or(StoreError::PkceRequired)?;
            if !code.code_challenge_method.verify(verifier, challenge) {
                return Err(StoreError::PkceMismatch);
            }
        }

        code.consumed = true;
        Ok(code.clone())
    }

    async fn put_token(&self, token: Token) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(token.value.clone(), token);
        Ok(())
    }

    async fn get_token(&self, value: &str) -> Result<Token, StoreError> {
        let tokens = self.tokens.read().await;
        tokens.get(value).cloned().ok_or(StoreError::TokenNotFound)
    }

    async fn revoke_token(&self, value: &str) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().await;
        let token = tokens.get_mut(value).ok_or(StoreError::TokenNotFound)?;
        token.revoked = true;
        let kind = token.kind;

        if kind == TokenKind::Refresh {
            // Bound the blast radius of a leaked refresh token: access
            // tokens issued under it die with it.
            let mut cascaded = 0u32;
            for child in tokens.values_mut() {
                if child.kind == TokenKind::Access
                    && child.parent_refresh_token.as_deref() == Some(value)
                    && !child.revoked
                {
                    child.revoked = true;
                    cascaded += 1;
                }
            }
            tracing::info!(
                token_prefix = token_preview(value),
                cascaded_access_tokens = cascaded,
                "refresh token revoked"
            );
        }

        Ok(())
    }

    async fn rotate_refresh(
        &self,
        old_value: &str,
        client_id: &str,
        new_access: Token,
        new_refresh: Token,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().await;

        // Re-validate under the write lock; the engine's earlier lookup
        // ran outside it and may have raced another refresh.
        let old = tokens.get_mut(old_value).ok_or(StoreError::TokenNotFound)?;
        if old.kind != TokenKind::Refresh {
            return Err(StoreError::NotRefreshToken);
        }
        if old.client_id != client_id {
            return Err(StoreError::TokenClientMismatch);
        }
        if old.revoked {
            return Err(StoreError::TokenRevoked);
        }
        if old.is_expired(now) {
            return Err(StoreError::TokenExpired);
        }

        old.revoked = true;
        tokens.insert(new_access.value.clone(), new_access);
        tokens.insert(new_refresh.value.clone(), new_refresh);
        Ok(())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        {
            let mut codes = self.codes.write().await;
            codes.retain(|_, code| !code.is_expired(now));
        }
        {
            let mut tokens = self.tokens.write().await;
            tokens.retain(|_, token| !token.is_expired(now));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkce::CodeChallengeMethod;
    use crate::scope::ScopeSet;
    use chrono::Duration;
    use std::sync::Arc;

    fn test_code(code: &str, now: DateTime<Utc>) -> AuthorizationCode {
        AuthorizationCode {
            code: code.to_string(),
            client_id: "android_app".into(),
            user_id: "u-1".into(),
            scope: ScopeSet::parse("customer"),
            redirect_uri: "https://app.example.com/callback".into(),
            code_challenge: None,
            code_challenge_method: CodeChallengeMethod::S256,
            issued_at: now,
            expires_at: now + Duration::minutes(5),
            consumed: false,
        }
    }

    fn test_token(value: &str, kind: TokenKind, now: DateTime<Utc>) -> Token {
        Token {
            value: value.to_string(),
            kind,
            client_id: "android_app".into(),
            user_id: "u-1".into(),
            granted_scope: ScopeSet::parse("customer"),
            issued_at: now,
            expires_at: now + Duration::hours(1),
            parent_refresh_token: None,
            source_code: None,
            revoked: false,
        }
    }

    fn consume_req(code: &str) -> ConsumeCodeRequest<'_> {
        ConsumeCodeRequest {
            code,
            client_id: "android_app",
            redirect_uri: "https://app.example.com/callback",
            code_verifier: None,
        }
    }

    #[tokio::test]
    async fn consume_succeeds_exactly_once() {
        let store = MemoryAuthStorage::new();
        let now = Utc::now();
        store.put_code(test_code("code-1", now)).await.unwrap();

        let consumed = store.consume_code(consume_req("code-1"), now).await.unwrap();
        assert_eq!(consumed.user_id, "u-1");

        let second = store.consume_code(consume_req("code-1"), now).await;
        assert!(matches!(second, Err(StoreError::CodeConsumed)));
    }

    #[tokio::test]
    async fn concurrent_consume_has_one_winner() {
        let store = Arc::new(MemoryAuthStorage::new());
        let now = Utc::now();
        store.put_code(test_code("code-race", now)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.consume_code(consume_req("code-race"), now).await
            }));
        }

        let mut winners = 0;
        let mut losers = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(StoreError::CodeConsumed) => losers += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(losers, 15);
    }

    #[tokio::test]
    async fn consume_checks_bindings() {
        let store = MemoryAuthStorage::new();
        let now = Utc::now();
        store.put_code(test_code("code-2", now)).await.unwrap();

        let wrong_client = ConsumeCodeRequest {
            client_id: "other_client",
            ..consume_req("code-2")
        };
        assert!(matches!(
            store.consume_code(wrong_client, now).await,
            Err(StoreError::CodeClientMismatch)
        ));

        let wrong_redirect = ConsumeCodeRequest {
            redirect_uri: "https://evil.example.com/callback",
            ..consume_req("code-2")
        };
        assert!(matches!(
            store.consume_code(wrong_redirect, now).await,
            Err(StoreError::RedirectUriMismatch)
        ));

        // Bindings failed, so the code is still live.
        assert!(store.consume_code(consume_req("code-2"), now).await.is_ok());
    }

    #[tokio::test]
    async fn consume_rejects_expired_code_inclusively() {
        let store = MemoryAuthStorage::new();
        let now = Utc::now();
        let code = test_code("code-3", now);
        let at_expiry = code.expires_at;
        store.put_code(code).await.unwrap();

        assert!(matches!(
            store.consume_code(consume_req("code-3"), at_expiry).await,
            Err(StoreError::CodeExpired)
        ));
    }

    #[tokio::test]
    async fn pkce_enforced_when_challenge_present() {
        let store = MemoryAuthStorage::new();
        let now = Utc::now();
        let mut code = test_code("code-4", now);
        // RFC 7636 Appendix B vector
        code.code_challenge = Some("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".into());
        store.put_code(code).await.unwrap();

        let missing = store.consume_code(consume_req("code-4"), now).await;
        assert!(matches!(missing, Err(StoreError::PkceRequired)));

        let bad = ConsumeCodeRequest {
            code_verifier: Some("wrong_verifier_123456789012345678901234567890"),
            ..consume_req("code-4")
        };
        assert!(matches!(
            store.consume_code(bad, now).await,
            Err(StoreError::PkceMismatch)
        ));

        let good = ConsumeCodeRequest {
            code_verifier: Some("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            ..consume_req("code-4")
        };
        assert!(store.consume_code(good, now).await.is_ok());
    }

    #[tokio::test]
    async fn replay_revokes_descended_tokens() {
        let store = MemoryAuthStorage::new();
        let now = Utc::now();
        store.put_code(test_code("code-5", now)).await.unwrap();
        store.consume_code(consume_req("code-5"), now).await.unwrap();

        let mut access = test_token("at-1", TokenKind::Access, now);
        access.source_code = Some("code-5".into());
        let mut refresh = test_token("rt-1", TokenKind::Refresh, now);
        refresh.source_code = Some("code-5".into());
        store.put_token(access).await.unwrap();
        store.put_token(refresh).await.unwrap();

        let replay = store.consume_code(consume_req("code-5"), now).await;
        assert!(matches!(replay, Err(StoreError::CodeConsumed)));

        assert!(store.get_token("at-1").await.unwrap().revoked);
        assert!(store.get_token("rt-1").await.unwrap().revoked);
    }

    #[tokio::test]
    async fn revoking_refresh_cascades_to_its_access_tokens() {
        let store = MemoryAuthStorage::new();
        let now = Utc::now();

        let refresh = test_token("rt-2", TokenKind::Refresh, now);
        let mut access = test_token("at-2", TokenKind::Access, now);
        access.parent_refresh_token = Some("rt-2".into());
        let unrelated = test_token("at-other", TokenKind::Access, now);
        store.put_token(refresh).await.unwrap();
        store.put_token(access).await.unwrap();
        store.put_token(unrelated).await.unwrap();

        store.revoke_token("rt-2").await.unwrap();

        assert!(store.get_token("rt-2").await.unwrap().revoked);
        assert!(store.get_token("at-2").await.unwrap().revoked);
        assert!(!store.get_token("at-other").await.unwrap().revoked);
    }

    #[tokio::test]
    async fn rotate_retires_old_and_stores_pair() {
        let store = MemoryAuthStorage::new();
        let now = Utc::now();
        let mut old = test_token("rt-3", TokenKind::Refresh, now);
        old.expires_at = now + Duration::days(30);
        store.put_token(old).await.unwrap();

        let new_access = test_token("at-3", TokenKind::Access, now);
        let new_refresh = test_token("rt-4", TokenKind::Refresh, now);
        store
            .rotate_refresh("rt-3", "android_app", new_access, new_refresh, now)
            .await
            .unwrap();

        assert!(store.get_token("rt-3").await.unwrap().revoked);
        assert!(!store.get_token("rt-4").await.unwrap().revoked);

        // Double-spend: the same old token cannot rotate again.
        let again = store
            .rotate_refresh(
                "rt-3",
                "android_app",
                test_token("at-5", TokenKind::Access, now),
                test_token("rt-5", TokenKind::Refresh, now),
                now,
            )
            .await;
        assert!(matches!(again, Err(StoreError::TokenRevoked)));
    }

    #[tokio::test]
    async fn rotate_rejects_access_token_and_wrong_client() {
        let store = MemoryAuthStorage::new();
        let now = Utc::now();
        store
            .put_token(test_token("at-6", TokenKind::Access, now))
            .await
            .unwrap();
        let mut refresh = test_token("rt-6", TokenKind::Refresh, now);
        refresh.expires_at = now + Duration::days(30);
        store.put_token(refresh).await.unwrap();

        let err = store
            .rotate_refresh(
                "at-6",
                "android_app",
                test_token("x1", TokenKind::Access, now),
                test_token("x2", TokenKind::Refresh, now),
                now,
            )
            .await;
        assert!(matches!(err, Err(StoreError::NotRefreshToken)));

        let err = store
            .rotate_refresh(
                "rt-6",
                "other_client",
                test_token("x3", TokenKind::Access, now),
                test_token("x4", TokenKind::Refresh, now),
                now,
            )
            .await;
        assert!(matches!(err, Err(StoreError::TokenClientMismatch)));
    }

    #[tokio::test]
    async fn cleanup_drops_only_expired_entries() {
        let store = MemoryAuthStorage::new();
        let now = Utc::now();

        let mut stale = test_code("code-stale", now - Duration::hours(1));
        stale.expires_at = now - Duration::minutes(30);
        store.put_code(stale).await.unwrap();
        store.put_code(test_code("code-live", now)).await.unwrap();

        let mut dead_token = test_token("at-dead", TokenKind::Access, now);
        dead_token.expires_at = now - Duration::minutes(1);
        store.put_token(dead_token).await.unwrap();
        store
            .put_token(test_token("at-live", TokenKind::Access, now))
            .await
            .unwrap();

        store.cleanup_expired(now).await.unwrap();

        assert!(matches!(
            store.consume_code(consume_req("code-stale"), now).await,
            Err(StoreError::CodeNotFound)
        ));
        assert!(store.consume_code(consume_req("code-live"), now).await.is_ok());
        assert!(matches!(
            store.get_token("at-dead").await,
            Err(StoreError::TokenNotFound)
        ));
        assert!(store.get_token("at-live").await.is_ok());
    }
}
