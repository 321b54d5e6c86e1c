//! Base URL resolution
//!
//! A self-hosted server is usually configured with a single base URL and
//! serves the API and identity applications under `/api` and `/identity`.
//! Split deployments name both hosts explicitly. With neither, the client
//! talks to the production hosts.

use serde::Deserialize;
use vault_auth::{PRODUCTION_API_URL, PRODUCTION_IDENTITY_URL, TOKEN_PATH};

/// Environment descriptor as supplied by the user or config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnvironmentUrls {
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub identity: Option<String>,
}

impl EnvironmentUrls {
    /// Single self-hosted base URL.
    pub fn base(url: impl Into<String>) -> Self {
        Self {
            base: Some(url.into()),
            ..Self::default()
        }
    }

    /// Separate API and identity hosts.
    pub fn split(api: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            base: None,
            api: Some(api.into()),
            identity: Some(identity.into()),
        }
    }
}

/// Resolved base URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub api_base_url: String,
    pub identity_base_url: String,
    /// True when both URLs were derived from one custom base
    pub uses_single_base: bool,
}

impl EndpointConfig {
    pub fn from_urls(urls: &EnvironmentUrls) -> Self {
        if let Some(base) = present(&urls.base) {
            let base = base.trim_end_matches('/');
            return Self {
                api_base_url: format!("{base}/api"),
                identity_base_url: format!("{base}/identity"),
                uses_single_base: true,
            };
        }

        if let (Some(api), Some(identity)) = (present(&urls.api), present(&urls.identity)) {
            return Self {
                api_base_url: api.to_string(),
                identity_base_url: identity.to_string(),
                uses_single_base: false,
            };
        }

        Self::production()
    }

    pub fn production() -> Self {
        Self {
            api_base_url: PRODUCTION_API_URL.to_string(),
            identity_base_url: PRODUCTION_IDENTITY_URL.to_string(),
            uses_single_base: false,
        }
    }

    /// Absolute URL for a resource API path such as `/accounts/profile`.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    /// Absolute URL of the identity token endpoint.
    pub fn token_url(&self) -> String {
        format!("{}{}", self.identity_base_url, TOKEN_PATH)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
