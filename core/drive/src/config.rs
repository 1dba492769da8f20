//! Drive and authentication configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use campusdrive_common::{Error, Result};

/// Microsoft Graph API base URL.
pub const DEFAULT_GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
/// Microsoft identity platform authority.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
/// Name of the shared folder the navigator starts from.
pub const DEFAULT_SHARED_FOLDER: &str = "datacampus";
/// Token cache file name.
const TOKEN_CACHE_FILENAME: &str = "token_cache.json";

/// OAuth2 scopes requested during sign-in.
const DEFAULT_SCOPES: &[&str] = &[
    "https://graph.microsoft.com/Files.ReadWrite.All",
    "https://graph.microsoft.com/Sites.ReadWrite.All",
    "https://graph.microsoft.com/User.Read",
    "offline_access",
];

fn default_graph_base() -> String {
    DEFAULT_GRAPH_BASE.to_string()
}

fn default_authority() -> String {
    DEFAULT_AUTHORITY.to_string()
}

fn default_shared_folder() -> String {
    DEFAULT_SHARED_FOLDER.to_string()
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

/// Default location of the token cache, under the user cache directory.
pub fn default_token_cache() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("campusdrive").join(TOKEN_CACHE_FILENAME))
        .unwrap_or_else(|| PathBuf::from(TOKEN_CACHE_FILENAME))
}

/// Configuration for the device-code sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Directory (tenant) ID.
    pub tenant_id: String,
    /// Application (client) ID of the public client registration.
    pub client_id: String,
    /// Identity platform authority URL, without the tenant.
    #[serde(default = "default_authority")]
    pub authority: String,
    /// Scopes requested for the access token.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Where tokens are cached between runs.
    #[serde(default = "default_token_cache")]
    pub token_cache: PathBuf,
}

impl AuthConfig {
    /// Create a configuration with default authority, scopes and cache path.
    pub fn new(tenant_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            authority: default_authority(),
            scopes: default_scopes(),
            token_cache: default_token_cache(),
        }
    }

    /// Base URL of the tenant's OAuth2 v2 endpoints.
    pub fn endpoint_base(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

/// Top-level configuration for talking to the remote drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Graph API base URL.
    #[serde(default = "default_graph_base")]
    pub graph_base: String,
    /// Name of the shared folder used as the navigation root.
    #[serde(default = "default_shared_folder")]
    pub shared_folder: String,
    /// Sign-in configuration.
    pub auth: AuthConfig,
}

impl DriveConfig {
    /// Create a configuration with defaults for everything but the sign-in.
    pub fn new(auth: AuthConfig) -> Self {
        Self {
            graph_base: default_graph_base(),
            shared_folder: default_shared_folder(),
            auth,
        }
    }

    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first, if present.
    ///
    /// # Errors
    /// - `TENANT_ID` or `CLIENT_ID` is not set
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from a variable lookup.
    ///
    /// Required: `TENANT_ID`, `CLIENT_ID`. Optional: `CAMPUSDRIVE_FOLDER`,
    /// `CAMPUSDRIVE_GRAPH_URL`, `CAMPUSDRIVE_TOKEN_CACHE`.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::InvalidInput(format!("{} is not set", key)))
        };

        let mut auth = AuthConfig::new(required("TENANT_ID")?, required("CLIENT_ID")?);
        if let Some(cache) = lookup("CAMPUSDRIVE_TOKEN_CACHE") {
            auth.token_cache = PathBuf::from(cache);
        }

        let mut config = Self::new(auth);
        if let Some(folder) = lookup("CAMPUSDRIVE_FOLDER") {
            config.shared_folder = folder;
        }
        if let Some(url) = lookup("CAMPUSDRIVE_GRAPH_URL") {
            config.graph_base = url;
        }
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            Error::InvalidInput(format!("Invalid config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.graph_base)
            .map_err(|e| Error::InvalidInput(format!("Invalid graph URL: {}", e)))?;
        if self.shared_folder.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Shared folder name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
