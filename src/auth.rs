//! Credential lifecycle: OAuth2 token exchange, expiry detection with skew,
//! and single-flighted silent renewal.

use crate::{
    config::AuthConfig,
    error::AuthError,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::future::BoxFuture;
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

/// Default safety margin subtracted from token expiry, so a token is never
/// presented when it could expire mid-flight.
pub const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// An issued bearer credential.
///
/// `expires_at` is derived once at issuance and never mutated; a refresh
/// produces a new `Credential` that atomically replaces the old one in the
/// store.
#[derive(Clone, PartialEq)]
pub struct Credential {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
    scope: String,
}

impl Credential {
    pub fn new(
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
        scope: &str,
    ) -> Self {
        Self {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at,
            scope: scope.to_string(),
        }
    }

    fn from_response(response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: issued_at + ChronoDuration::seconds(response.expires_in),
            scope: response.scope.unwrap_or_default(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// True iff `now >= expires_at - skew`. Holds at the exact boundary.
    pub fn is_expired(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        let skew = ChronoDuration::from_std(skew).unwrap_or_else(|_| ChronoDuration::zero());
        now >= self.expires_at - skew
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field(
                "access_token",
                &format!("{}...", self.access_token.chars().take(6).collect::<String>()),
            )
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Body of `POST /oauth/token` responses
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: String,
    expires_in: i64,
    refresh_token: String,
    scope: Option<String>,
}

/// Exchanges a refresh token for a fresh credential. Behind a trait so the
/// session's renewal path can be exercised without a live OAuth server.
pub trait TokenRefresher: Send + Sync {
    fn refresh(&self, refresh_token: &str) -> BoxFuture<'_, Result<Credential, AuthError>>;
}

/// OAuth client for the brokerage token endpoints
pub struct AuthClient {
    config: AuthConfig,
    base_url: String,
    http: reqwest::Client,
}

impl AuthClient {
    pub fn new(config: AuthConfig) -> Self {
        let base_url = config.environment.rest_base().to_string();
        Self {
            config,
            base_url,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL the user visits to grant access
    pub fn authorize_url(&self) -> Result<Url, AuthError> {
        let mut url = Url::parse(&format!("{}/oauth/authorize", self.base_url))
            .map_err(|e| AuthError::Fatal(format!("invalid base URL: {}", e)))?;
        let redirect_uri = self
            .config
            .redirect_uri
            .clone()
            .unwrap_or_else(|| format!("{}/oauth/callback", self.base_url));
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", "trading account market_data");
        Ok(url)
    }

    /// Exchange an authorization code for the initial credential
    pub async fn exchange_code(&self, code: &str) -> Result<Credential, AuthError> {
        let mut body = serde_json::json!({
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
            "code": code,
            "grant_type": "authorization_code",
        });
        if let Some(redirect_uri) = &self.config.redirect_uri {
            body["redirect_uri"] = serde_json::json!(redirect_uri);
        }
        self.token_request(body).await
    }

    async fn token_request(&self, body: serde_json::Value) -> Result<Credential, AuthError> {
        let response = self
            .http
            .post(format!("{}/oauth/token", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Transient(format!("token request failed: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            // The server rejected the grant itself; retrying cannot help.
            let detail = response.text().await.unwrap_or_default();
            return Err(AuthError::Fatal(format!(
                "token request rejected ({}): {}",
                status, detail
            )));
        }
        if !status.is_success() {
            return Err(AuthError::Transient(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let issued_at = Utc::now();
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Transient(format!("invalid token response: {}", e)))?;
        Ok(Credential::from_response(token, issued_at))
    }
}

impl TokenRefresher for AuthClient {
    fn refresh(&self, refresh_token: &str) -> BoxFuture<'_, Result<Credential, AuthError>> {
        let body = serde_json::json!({
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
            "refresh_token": refresh_token,
            "grant_type": "refresh_token",
        });
        Box::pin(async move { self.token_request(body).await })
    }
}

/// Holds the current credential and performs renewal.
///
/// Reads always go through [`bearer_token`](Self::bearer_token), which
/// refreshes first when the credential is within the expiry skew. Refresh is
/// single-flighted: concurrent callers that hit an expired credential await
/// one in-flight exchange instead of issuing duplicates.
pub struct CredentialStore {
    current: RwLock<Option<Credential>>,
    refresh_gate: tokio::sync::Mutex<()>,
    refresher: Arc<dyn TokenRefresher>,
    skew: Duration,
}

impl CredentialStore {
    pub fn new(refresher: Arc<dyn TokenRefresher>, skew: Duration) -> Self {
        Self {
            current: RwLock::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
            refresher,
            skew,
        }
    }

    /// Install a credential obtained from the initial token exchange
    pub fn set_credential(&self, credential: Credential) {
        *self.current.write().unwrap() = Some(credential);
    }

    pub fn credential(&self) -> Option<Credential> {
        self.current.read().unwrap().clone()
    }

    pub fn has_credential(&self) -> bool {
        self.current.read().unwrap().is_some()
    }

    /// Clear the stored credential (logout)
    pub fn clear(&self) {
        *self.current.write().unwrap() = None;
    }

    /// Current access token, refreshed first if expired.
    ///
    /// `Transient` failures leave the old credential in place for the caller
    /// to retry; a `Fatal` rejection clears it.
    pub async fn bearer_token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.valid_token() {
            return Ok(token);
        }

        let _flight = self.refresh_gate.lock().await;

        // A concurrent caller may have completed the refresh while this one
        // waited on the gate.
        if let Some(token) = self.valid_token() {
            return Ok(token);
        }

        let refresh_token = {
            let guard = self.current.read().unwrap();
            match guard.as_ref() {
                Some(credential) => credential.refresh_token().to_string(),
                None => {
                    return Err(AuthError::Fatal(
                        "no credential available, authenticate first".to_string(),
                    ))
                }
            }
        };

        tracing::info!("access token expired, refreshing");
        match self.refresher.refresh(&refresh_token).await {
            Ok(fresh) => {
                let token = fresh.access_token().to_string();
                *self.current.write().unwrap() = Some(fresh);
                Ok(token)
            }
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!("refresh token rejected, clearing credential");
                    self.clear();
                } else {
                    tracing::warn!("transient refresh failure: {}", e);
                }
                Err(e)
            }
        }
    }

    fn valid_token(&self) -> Option<String> {
        let guard = self.current.read().unwrap();
        guard.as_ref().and_then(|credential| {
            if credential.is_expired(Utc::now(), self.skew) {
                None
            } else {
                Some(credential.access_token().to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn credential_expiring_at(expires_at: DateTime<Utc>) -> Credential {
        Credential::new("access-1", "refresh-1", expires_at, "trading")
    }

    #[test]
    fn expiry_boundary_honors_skew() {
        let now = Utc::now();
        let skew = Duration::from_secs(30);
        let cred = credential_expiring_at(now + ChronoDuration::seconds(30));

        // Exactly at the boundary: expires_at - skew == now
        assert!(cred.is_expired(now, skew));
        // Just before the boundary
        assert!(!cred.is_expired(now - ChronoDuration::milliseconds(1), skew));
        // Just after
        assert!(cred.is_expired(now + ChronoDuration::milliseconds(1), skew));
    }

    #[test]
    fn zero_skew_uses_raw_expiry() {
        let now = Utc::now();
        let cred = credential_expiring_at(now);
        assert!(cred.is_expired(now, Duration::ZERO));
        assert!(!cred.is_expired(now - ChronoDuration::seconds(1), Duration::ZERO));
    }

    #[test]
    fn debug_redacts_tokens() {
        let cred = credential_expiring_at(Utc::now());
        let debug = format!("{:?}", cred);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("refresh-1"));
        assert!(!debug.contains("access-1"));
    }

    struct CountingRefresher {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl TokenRefresher for CountingRefresher {
        fn refresh(&self, _refresh_token: &str) -> BoxFuture<'_, Result<Credential, AuthError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(Credential::new(
                    "access-2",
                    "refresh-2",
                    Utc::now() + ChronoDuration::hours(1),
                    "trading",
                ))
            })
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(20),
        });
        let store = Arc::new(CredentialStore::new(
            refresher.clone(),
            DEFAULT_EXPIRY_SKEW,
        ));
        store.set_credential(credential_expiring_at(Utc::now() - ChronoDuration::seconds(1)));

        let a = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.bearer_token().await }
        });
        let b = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.bearer_token().await }
        });

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(a, "access-2");
        assert_eq!(b, "access-2");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    struct RejectingRefresher;

    impl TokenRefresher for RejectingRefresher {
        fn refresh(&self, _refresh_token: &str) -> BoxFuture<'_, Result<Credential, AuthError>> {
            Box::pin(async { Err(AuthError::Fatal("invalid_grant".to_string())) })
        }
    }

    #[tokio::test]
    async fn fatal_refresh_clears_credential() {
        let store = CredentialStore::new(Arc::new(RejectingRefresher), DEFAULT_EXPIRY_SKEW);
        store.set_credential(credential_expiring_at(Utc::now() - ChronoDuration::seconds(1)));

        let err = store.bearer_token().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!store.has_credential());
    }

    #[tokio::test]
    async fn missing_credential_is_fatal() {
        let store = CredentialStore::new(Arc::new(RejectingRefresher), DEFAULT_EXPIRY_SKEW);
        assert!(store.bearer_token().await.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn valid_token_skips_refresh() {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let store = CredentialStore::new(refresher.clone(), DEFAULT_EXPIRY_SKEW);
        store.set_credential(credential_expiring_at(Utc::now() + ChronoDuration::hours(1)));

        assert_eq!(store.bearer_token().await.unwrap(), "access-1");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }
}
