//! Bearer token acquisition for the Graph API.
//!
//! The drive client only sees the [`TokenProvider`] capability. The
//! production provider signs in through the OAuth2 device-code flow and
//! keeps tokens in a local cache file.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    ClientId, DeviceAuthorizationUrl, EndpointNotSet, EndpointSet, RefreshToken, Scope,
    StandardDeviceAuthorizationResponse, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use campusdrive_common::{Error, Result};

use crate::config::AuthConfig;

/// Tokens are treated as expired this long before their actual expiry.
const EXPIRY_MARGIN_MINUTES: i64 = 5;

/// Client with the device authorization and token endpoints configured.
type DeviceClient =
    BasicClient<EndpointNotSet, EndpointSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// A bearer credential handed to the drive client.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Bearer token value.
    pub access_token: String,
    /// Seconds until the token expires.
    pub expires_in: u64,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Source of bearer tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Get a bearer token.
    ///
    /// With `force_reauth` the provider must not hand back the token it
    /// currently holds; it has to obtain a new one.
    ///
    /// # Errors
    /// - `Error::Authentication` if no token can be obtained
    async fn get_token(&self, force_reauth: bool) -> Result<AccessToken>;
}

/// OAuth2 tokens with expiration tracking.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Tokens {
    /// Access token for API requests.
    pub access_token: String,
    /// Refresh token, when the authority issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token expires.
    #[zeroize(skip)]
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    fn from_response(response: &BasicTokenResponse, previous_refresh: Option<&str>) -> Self {
        let expires_in = response
            .expires_in()
            .unwrap_or_else(|| std::time::Duration::from_secs(3600));

        Self {
            access_token: response.access_token().secret().clone(),
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().clone())
                .or_else(|| previous_refresh.map(String::from)),
            expires_at: Utc::now()
                + Duration::from_std(expires_in).unwrap_or_else(|_| Duration::hours(1)),
        }
    }

    /// Check if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now() + Duration::minutes(EXPIRY_MARGIN_MINUTES)
    }

    /// Seconds left before the access token expires.
    pub fn expires_in(&self) -> u64 {
        (self.expires_at - Utc::now()).num_seconds().max(0) as u64
    }

    fn to_access_token(&self) -> AccessToken {
        AccessToken {
            access_token: self.access_token.clone(),
            expires_in: self.expires_in(),
        }
    }
}

impl fmt::Debug for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokens")
            .field("access_token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn load_cache(path: &Path) -> Option<Tokens> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(tokens) => Some(tokens),
        Err(e) => {
            warn!("Ignoring unreadable token cache {}: {}", path.display(), e);
            None
        }
    }
}

async fn save_cache(path: &Path, tokens: &Tokens) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_vec(tokens)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Token provider backed by the OAuth2 device-code flow.
///
/// Tokens are reused while valid, renewed with the refresh token when
/// possible, and otherwise obtained by asking the user to sign in on
/// another device.
pub struct DeviceCodeTokenProvider {
    config: AuthConfig,
    http: oauth2::reqwest::Client,
    tokens: RwLock<Option<Tokens>>,
}

impl DeviceCodeTokenProvider {
    /// Create a provider, loading any cached tokens.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;

        let cached = load_cache(&config.token_cache);
        if cached.is_some() {
            debug!("Loaded cached tokens from {}", config.token_cache.display());
        }

        Ok(Self {
            config,
            http,
            tokens: RwLock::new(cached),
        })
    }

    /// Get the current configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn oauth_client(&self) -> Result<DeviceClient> {
        let base = self.config.endpoint_base();
        let device_url = DeviceAuthorizationUrl::new(format!("{}/devicecode", base))
            .map_err(|e| Error::InvalidInput(format!("Invalid device authorization URL: {}", e)))?;
        let token_url = TokenUrl::new(format!("{}/token", base))
            .map_err(|e| Error::InvalidInput(format!("Invalid token URL: {}", e)))?;

        Ok(BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_device_authorization_url(device_url)
            .set_token_uri(token_url))
    }

    fn scopes(&self) -> impl Iterator<Item = Scope> + '_ {
        self.config.scopes.iter().cloned().map(Scope::new)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Tokens> {
        let client = self.oauth_client()?;
        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .add_scopes(self.scopes())
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token refresh failed: {}", e)))?;

        Ok(Tokens::from_response(&response, Some(refresh_token)))
    }

    async fn device_flow(&self) -> Result<Tokens> {
        let client = self.oauth_client()?;
        let details: StandardDeviceAuthorizationResponse = client
            .exchange_device_code()
            .add_scopes(self.scopes())
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Failed to start sign-in: {}", e)))?;

        let verification_uri = details.verification_uri().to_string();
        info!(
            "To sign in, open {} and enter the code {}",
            verification_uri,
            details.user_code().secret()
        );
        if let Err(e) = open::that(&verification_uri) {
            debug!("Could not open browser: {}", e);
        }

        let response = client
            .exchange_device_access_token(&details)
            .request_async(&self.http, tokio::time::sleep, None)
            .await
            .map_err(|e| Error::Authentication(format!("Sign-in did not complete: {}", e)))?;

        info!("Sign-in completed");
        Ok(Tokens::from_response(&response, None))
    }

    async fn store(&self, slot: &mut Option<Tokens>, tokens: Tokens) -> AccessToken {
        if let Err(e) = save_cache(&self.config.token_cache, &tokens).await {
            warn!("Failed to write token cache: {}", e);
        }
        let access = tokens.to_access_token();
        *slot = Some(tokens);
        access
    }
}

#[async_trait]
impl TokenProvider for DeviceCodeTokenProvider {
    async fn get_token(&self, force_reauth: bool) -> Result<AccessToken> {
        if !force_reauth {
            let tokens = self.tokens.read().await;
            if let Some(tokens) = tokens.as_ref().filter(|t| !t.is_expired()) {
                return Ok(tokens.to_access_token());
            }
        }

        let mut slot = self.tokens.write().await;

        // Double-check after acquiring write lock
        if !force_reauth {
            if let Some(tokens) = slot.as_ref().filter(|t| !t.is_expired()) {
                return Ok(tokens.to_access_token());
            }
        }

        let refresh_token = slot.as_ref().and_then(|t| t.refresh_token.clone());
        if let Some(refresh_token) = refresh_token {
            info!("Refreshing access token");
            match self.refresh(&refresh_token).await {
                Ok(tokens) => return Ok(self.store(&mut slot, tokens).await),
                Err(e) => warn!("Silent refresh failed, falling back to sign-in: {}", e),
            }
        }

        let tokens = self.device_flow().await?;
        Ok(self.store(&mut slot, tokens).await)
    }
}

/// Token provider returning a fixed token.
///
/// Forced re-authentication is counted and can be made to fail, which lets
/// tests observe the client's retry behavior.
pub struct StaticTokenProvider {
    token: String,
    fail_reauth: bool,
    reauth_count: AtomicUsize,
}

impl StaticTokenProvider {
    /// Create a provider handing out `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            fail_reauth: false,
            reauth_count: AtomicUsize::new(0),
        }
    }

    /// Make every forced re-authentication fail.
    pub fn failing_reauth(mut self) -> Self {
        self.fail_reauth = true;
        self
    }

    /// Number of forced re-authentications so far.
    pub fn reauth_count(&self) -> usize {
        self.reauth_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self, force_reauth: bool) -> Result<AccessToken> {
        if force_reauth {
            let count = self.reauth_count.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_reauth {
                return Err(Error::Authentication("re-authentication declined".to_string()));
            }
            return Ok(AccessToken {
                access_token: format!("{}-{}", self.token, count),
                expires_in: 3600,
            });
        }

        Ok(AccessToken {
            access_token: self.token.clone(),
            expires_in: 3600,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    fn tokens(expires_at: DateTime<Utc>) -> Tokens {
        Tokens {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at,
        }
    }

    #[test]
    fn test_tokens_expiration() {
        assert!(tokens(Utc::now() - Duration::hours(1)).is_expired());
        assert!(!tokens(Utc::now() + Duration::hours(1)).is_expired());
    }

    #[test]
    fn test_tokens_near_expiration() {
        // Token expiring in 4 minutes should be considered expired (5 min buffer)
        assert!(tokens(Utc::now() + Duration::minutes(4)).is_expired());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", tokens(Utc::now()));
        assert!(!debug.contains("access\""));
        assert!(debug.contains("REDACTED"));
    }

    #[tokio::test]
    async fn test_save_and_load_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tokens.json");
        let original = tokens(Utc::now() + Duration::hours(1));

        save_cache(&path, &original).await.unwrap();
        let loaded = load_cache(&path).unwrap();

        assert_eq!(loaded.access_token, "access");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh"));
    }

    #[test]
    fn test_corrupt_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_cache(&path).is_none());
    }

    #[tokio::test]
    async fn test_device_provider_serves_valid_cached_token() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AuthConfig::new("tenant", "client");
        config.token_cache = dir.path().join("tokens.json");
        save_cache(&config.token_cache, &tokens(Utc::now() + Duration::hours(2)))
            .await
            .unwrap();

        let provider = DeviceCodeTokenProvider::new(config).unwrap();
        let token = provider.get_token(false).await.unwrap();

        assert_eq!(token.access_token, "access");
        assert!(token.expires_in > 3600);
    }

    #[tokio::test]
    async fn test_static_provider_counts_reauth() {
        let provider = StaticTokenProvider::new("tok");
        assert_eq!(provider.get_token(false).await.unwrap().access_token, "tok");
        assert_eq!(provider.get_token(true).await.unwrap().access_token, "tok-1");
        assert_eq!(provider.reauth_count(), 1);

        let failing = StaticTokenProvider::new("tok").failing_reauth();
        assert!(matches!(
            failing.get_token(true).await,
            Err(Error::Authentication(_))
        ));
    }
}
