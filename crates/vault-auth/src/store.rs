//! Token persistence seam
//!
//! The API client never owns tokens. It reads and writes them through
//! `TokenStore`, so the same client works against an in-memory session, the
//! JSON file store, or an application keychain.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use common::Secret;
use tokio::sync::Mutex;
use tracing::debug;

use crate::constants::REFRESH_WINDOW_SECS;
use crate::error::{Error, Result};
use crate::token::{DecodedAccessToken, decode_access_token};

/// Token storage consumed by the API client.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn TokenStore>`).
pub trait TokenStore: Send + Sync {
    /// Current access token, if any.
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>>;

    /// Current refresh token, if any.
    fn refresh_token(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>>;

    /// Whether the access token is absent, unreadable, or about to expire.
    fn needs_refresh(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;

    /// Claims of the current access token.
    fn decode_access_token(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<DecodedAccessToken>> + Send + '_>>;

    /// Replace both tokens.
    fn set_tokens(
        &self,
        access: String,
        refresh: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Forget the two-factor remember token stored for `identity` (the login e-mail).
    fn clear_two_factor_token<'a>(
        &'a self,
        identity: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Tokens held for one session.
#[derive(Debug, Default, Clone)]
pub struct TokenState {
    pub access: Option<Secret<String>>,
    pub refresh: Option<Secret<String>>,
    /// Two-factor remember tokens keyed by lowercase e-mail
    pub two_factor: HashMap<String, Secret<String>>,
}

impl TokenState {
    pub(crate) fn needs_refresh(&self) -> bool {
        let Some(access) = self.access.as_ref() else {
            return true;
        };
        match decode_access_token(access.expose()) {
            Ok(claims) => claims.expires_within(now_secs(), REFRESH_WINDOW_SECS),
            Err(_) => true,
        }
    }

    pub(crate) fn decode(&self) -> Result<DecodedAccessToken> {
        let access = self
            .access
            .as_ref()
            .ok_or_else(|| Error::TokenDecode("no access token stored".into()))?;
        decode_access_token(access.expose())
    }
}

pub(crate) fn identity_key(identity: &str) -> String {
    identity.trim().to_lowercase()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// In-process token store. Tokens are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    state: Mutex<TokenState>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with tokens already in place.
    pub fn with_tokens(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(TokenState {
                access: Some(Secret::new(access.into())),
                refresh: Some(Secret::new(refresh.into())),
                two_factor: HashMap::new(),
            }),
        }
    }

    pub async fn set_two_factor_token(&self, identity: &str, token: String) {
        self.state
            .lock()
            .await
            .two_factor
            .insert(identity_key(identity), Secret::new(token));
    }

    pub async fn two_factor_token(&self, identity: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .two_factor
            .get(&identity_key(identity))
            .map(|t| t.expose().clone())
    }

    /// Drop both tokens (session logout).
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.access = None;
        state.refresh = None;
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state.access.as_ref().map(|t| t.expose().clone())
        })
    }

    fn refresh_token(&self) -> Pin<Box<dyn Future<Output = Option<String>> + Send + '_>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state.refresh.as_ref().map(|t| t.expose().clone())
        })
    }

    fn needs_refresh(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move { self.state.lock().await.needs_refresh() })
    }

    fn decode_access_token(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<DecodedAccessToken>> + Send + '_>> {
        Box::pin(async move { self.state.lock().await.decode() })
    }

    fn set_tokens(
        &self,
        access: String,
        refresh: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.access = Some(Secret::new(access));
            state.refresh = Some(Secret::new(refresh));
            debug!("stored new token pair in memory");
            Ok(())
        })
    }

    fn clear_two_factor_token<'a>(
        &'a self,
        identity: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.state
                .lock()
                .await
                .two_factor
                .remove(&identity_key(identity));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tests::fake_jwt;

    fn jwt_expiring_in(secs: i64) -> String {
        let exp = now_secs() as i64 + secs;
        fake_jwt(serde_json::json!({ "client_id": "web", "exp": exp }))
    }

    #[tokio::test]
    async fn empty_store_needs_refresh() {
        let store = MemoryTokenStore::new();
        assert!(store.access_token().await.is_none());
        assert!(store.refresh_token().await.is_none());
        assert!(store.needs_refresh().await);
        assert!(store.decode_access_token().await.is_err());
    }

    #[tokio::test]
    async fn fresh_token_does_not_need_refresh() {
        let store = MemoryTokenStore::with_tokens(jwt_expiring_in(3600), "rt");
        assert!(!store.needs_refresh().await);
        assert_eq!(store.decode_access_token().await.unwrap().client_id, "web");
    }

    #[tokio::test]
    async fn token_inside_window_needs_refresh() {
        let store = MemoryTokenStore::with_tokens(jwt_expiring_in(60), "rt");
        assert!(store.needs_refresh().await);

        let expired = MemoryTokenStore::with_tokens(jwt_expiring_in(-60), "rt");
        assert!(expired.needs_refresh().await);
    }

    #[tokio::test]
    async fn undecodable_token_needs_refresh() {
        let store = MemoryTokenStore::with_tokens("opaque", "rt");
        assert!(store.needs_refresh().await);
    }

    #[tokio::test]
    async fn set_tokens_replaces_both() {
        let store = MemoryTokenStore::with_tokens("old_at", "old_rt");
        store
            .set_tokens("new_at".into(), "new_rt".into())
            .await
            .unwrap();
        assert_eq!(store.access_token().await.as_deref(), Some("new_at"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("new_rt"));

        store.clear().await;
        assert!(store.access_token().await.is_none());
    }

    #[tokio::test]
    async fn two_factor_tokens_are_keyed_case_insensitively() {
        let store = MemoryTokenStore::new();
        store
            .set_two_factor_token("User@Example.com", "remember".into())
            .await;
        assert_eq!(
            store.two_factor_token("user@example.com").await.as_deref(),
            Some("remember")
        );

        store
            .clear_two_factor_token("USER@example.com")
            .await
            .unwrap();
        assert!(store.two_factor_token("user@example.com").await.is_none());
    }
}
