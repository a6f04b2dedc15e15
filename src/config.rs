//! Configuration parsed from environment variables.
//!
//! Two independent groups: [`CognitoConfig`] describes the hosted identity
//! provider, [`SiteConfig`] the blog deployment this front end talks to.

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000/api";
pub const DEFAULT_SITE_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_STATE_DIR: &str = ".blogfront";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_AUTH_POLL_SECS: u64 = 5;

/// Path the hosted login page redirects back to.
pub const CALLBACK_PATH: &str = "/admin/callback";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("config parse failed: {0}")]
    Parse(String),
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

// =============================================================================
// SHARED
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

impl HttpTimeouts {
    /// Build a `reqwest` client honoring these timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.request_secs))
            .connect_timeout(Duration::from_secs(self.connect_secs))
            .build()
            .map_err(|e| ConfigError::HttpClientBuild(e.to_string()))
    }
}

/// Where the session lives; one per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStrategy {
    /// Self-managed token triple in local storage.
    #[default]
    Local,
    /// Delegate to the identity provider's own token cache.
    Provider,
}

impl FromStr for SessionStrategy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "provider" => Ok(Self::Provider),
            other => Err(format!("unknown session strategy '{other}' (expected 'local' or 'provider')")),
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .into_iter()
        .map(|v| v.trim().to_owned())
        .find(|v| !v.is_empty())
}

fn env_parse_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env_opt(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::Parse(format!("{key} must be a whole number, got '{raw}'"))),
    }
}

// =============================================================================
// COGNITO
// =============================================================================

/// Hosted identity provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CognitoConfig {
    pub client_id: String,
    pub user_pool_id: Option<String>,
    /// Hosted-UI domain prefix (`<domain>.auth.<region>.amazoncognito.com`).
    pub domain: Option<String>,
    pub region: String,
    /// Overrides the regional API endpoint (local emulators, tests).
    pub endpoint_override: Option<String>,
}

impl CognitoConfig {
    /// Build from environment variables.
    ///
    /// Required:
    /// - `COGNITO_CLIENT_ID`
    ///
    /// Optional:
    /// - `COGNITO_USER_POOL_ID`: region is derived from its prefix when `AWS_REGION` is unset
    /// - `COGNITO_DOMAIN`: hosted-UI domain prefix, needed for login/logout URLs
    /// - `AWS_REGION`: default `us-east-1`
    /// - `COGNITO_ENDPOINT`: API endpoint override
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when the client id is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_id = env_opt("COGNITO_CLIENT_ID").ok_or(ConfigError::Missing("COGNITO_CLIENT_ID"))?;
        let user_pool_id = env_opt("COGNITO_USER_POOL_ID");
        let region = env_opt("AWS_REGION")
            .or_else(|| user_pool_id.as_deref().and_then(region_from_pool_id))
            .unwrap_or_else(|| DEFAULT_REGION.to_owned());
        Ok(Self {
            client_id,
            user_pool_id,
            domain: env_opt("COGNITO_DOMAIN"),
            region,
            endpoint_override: env_opt("COGNITO_ENDPOINT"),
        })
    }

    /// Regional user-pool API endpoint.
    #[must_use]
    pub fn endpoint(&self) -> String {
        match &self.endpoint_override {
            Some(url) => url.clone(),
            None => format!("https://cognito-idp.{}.amazonaws.com/", self.region),
        }
    }

    fn hosted_ui_url(&self, path: &str) -> Result<Url, ConfigError> {
        let domain = self.domain.as_deref().ok_or(ConfigError::Missing("COGNITO_DOMAIN"))?;
        Url::parse(&format!("https://{domain}.auth.{}.amazoncognito.com{path}", self.region))
            .map_err(|e| ConfigError::Parse(format!("invalid hosted UI domain '{domain}': {e}")))
    }

    /// Hosted login page that redirects to `<origin>/admin/callback` with
    /// tokens in the fragment.
    ///
    /// # Errors
    ///
    /// Returns an error when no hosted-UI domain is configured or the
    /// domain does not form a valid URL.
    pub fn hosted_login_url(&self, origin: &str) -> Result<Url, ConfigError> {
        let mut url = self.hosted_ui_url("/login")?;
        let redirect_uri = format!("{}{CALLBACK_PATH}", origin.trim_end_matches('/'));
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "token")
            .append_pair("redirect_uri", &redirect_uri);
        Ok(url)
    }

    /// Hosted logout page that returns to `origin`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::hosted_login_url`].
    pub fn hosted_logout_url(&self, origin: &str) -> Result<Url, ConfigError> {
        let mut url = self.hosted_ui_url("/logout")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("logout_uri", origin);
        Ok(url)
    }
}

/// `us-east-1_AbCdEf` -> `us-east-1`.
fn region_from_pool_id(pool_id: &str) -> Option<String> {
    let (region, rest) = pool_id.split_once('_')?;
    if region.is_empty() || rest.is_empty() {
        return None;
    }
    Some(region.to_owned())
}

// =============================================================================
// SITE
// =============================================================================

/// Blog deployment settings for the admin front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub api_url: String,
    pub origin: String,
    pub strategy: SessionStrategy,
    pub state_dir: PathBuf,
    pub timeouts: HttpTimeouts,
    pub poll_interval: Duration,
}

impl SiteConfig {
    /// Build from environment variables, all optional:
    ///
    /// - `BLOG_API_URL`: default `http://127.0.0.1:3000/api`
    /// - `BLOG_SITE_ORIGIN`: default `http://localhost:5173`
    /// - `BLOG_SESSION_STRATEGY`: `local` (default) or `provider`
    /// - `BLOG_STATE_DIR`: default `.blogfront`
    /// - `BLOG_REQUEST_TIMEOUT_SECS`: default 30
    /// - `BLOG_CONNECT_TIMEOUT_SECS`: default 10
    /// - `BLOG_AUTH_POLL_SECS`: default 5
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown strategy or a non-numeric duration.
    pub fn from_env() -> Result<Self, ConfigError> {
        let strategy = match env_opt("BLOG_SESSION_STRATEGY") {
            Some(raw) => raw.parse().map_err(ConfigError::Parse)?,
            None => SessionStrategy::default(),
        };
        let poll_secs = env_parse_u64("BLOG_AUTH_POLL_SECS", DEFAULT_AUTH_POLL_SECS)?;
        if poll_secs == 0 {
            return Err(ConfigError::Parse("BLOG_AUTH_POLL_SECS must be at least 1".into()));
        }
        Ok(Self {
            api_url: env_opt("BLOG_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_owned())
                .trim_end_matches('/')
                .to_owned(),
            origin: env_opt("BLOG_SITE_ORIGIN")
                .unwrap_or_else(|| DEFAULT_SITE_ORIGIN.to_owned())
                .trim_end_matches('/')
                .to_owned(),
            strategy,
            state_dir: env_opt("BLOG_STATE_DIR").map_or_else(|| PathBuf::from(DEFAULT_STATE_DIR), PathBuf::from),
            timeouts: HttpTimeouts {
                request_secs: env_parse_u64("BLOG_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
                connect_secs: env_parse_u64("BLOG_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
            },
            poll_interval: Duration::from_secs(poll_secs),
        })
    }
}
