//! Credential sources for the coordinator.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::GatewayError;
use crate::gateway::parse_response;

/// Supplies a bearer credential before every network call.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// A credential valid for at least the next request, or `None` when the
    /// user is signed out. `None` makes the coordinator abandon the operation.
    async fn fresh_credential(&self) -> Option<String>;

    /// Drop any cached credential after the server rejected it.
    async fn invalidate(&self) {}
}

/// A fixed credential (or none). Used by tests and one-off tools.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential {
    token: Option<String>,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// A signed-out identity.
    pub fn none() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl IdentityProvider for StaticCredential {
    async fn fresh_credential(&self) -> Option<String> {
        self.token.clone()
    }
}

// ---------------------------------------------------------------------------
// PasswordSession
// ---------------------------------------------------------------------------

/// Default margin before expiry at which the session logs in again.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Response body of `POST /auth/login` (only the fields the session needs).
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Username/password login against `POST /auth/login`.
///
/// The access token is cached and replaced once it is within
/// `refresh_margin` of expiry, so every credential handed out has at least
/// that much lifetime left.
pub struct PasswordSession {
    client: reqwest::Client,
    api_url: String,
    username: String,
    password: String,
    refresh_margin: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl PasswordSession {
    pub fn new(
        api_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            cached: Mutex::new(None),
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Log in unconditionally and cache the new token.
    pub async fn login(&self) -> Result<String, GatewayError> {
        let mut cached = self.cached.lock().await;
        let token = self.request_token().await?;
        let issued = token.access_token.clone();
        *cached = Some(self.cache_entry(token));
        Ok(issued)
    }

    async fn request_token(&self) -> Result<LoginResponse, GatewayError> {
        let response = self
            .client
            .post(format!("{}/auth/login", self.api_url))
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await?;

        let token: LoginResponse = parse_response(response).await?;
        tracing::debug!(
            username = %self.username,
            expires_in = token.expires_in,
            "Obtained access token"
        );
        Ok(token)
    }

    fn cache_entry(&self, token: LoginResponse) -> CachedToken {
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(self.refresh_margin);
        CachedToken {
            token: token.access_token,
            refresh_at: Instant::now() + lifetime,
        }
    }
}

#[async_trait]
impl IdentityProvider for PasswordSession {
    async fn fresh_credential(&self) -> Option<String> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if Instant::now() < entry.refresh_at {
                return Some(entry.token.clone());
            }
        }

        match self.request_token().await {
            Ok(token) => {
                let entry = self.cache_entry(token);
                let issued = entry.token.clone();
                *cached = Some(entry);
                Some(issued)
            }
            Err(e) => {
                tracing::warn!(username = %self.username, error = %e, "Login failed");
                *cached = None;
                None
            }
        }
    }

    async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_credential_hands_out_its_token() {
        assert_eq!(
            StaticCredential::new("abc").fresh_credential().await.as_deref(),
            Some("abc")
        );
        assert_eq!(StaticCredential::none().fresh_credential().await, None);
    }

    #[test]
    fn refresh_happens_margin_before_expiry() {
        let session = PasswordSession::new("http://localhost:3000/api", "u", "p")
            .with_refresh_margin(Duration::from_secs(600));
        let before = Instant::now();
        let entry = session.cache_entry(LoginResponse {
            access_token: "t".into(),
            expires_in: 3600,
        });
        let lifetime = entry.refresh_at - before;
        assert!(lifetime <= Duration::from_secs(3000));
        assert!(lifetime > Duration::from_secs(2990));
    }

    #[test]
    fn short_lived_tokens_refresh_immediately() {
        let session = PasswordSession::new("http://localhost:3000/api", "u", "p");
        let entry = session.cache_entry(LoginResponse {
            access_token: "t".into(),
            expires_in: 60,
        });
        assert!(entry.refresh_at <= Instant::now());
    }
}
