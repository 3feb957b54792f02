//! Gateway configuration
//!
//! Read once at startup; there is no hot reload.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::GatewayError;
use crate::GatewayResult;

/// Default per-request timeout for row and RPC calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the hosted row API
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Project URL (e.g. `https://xyz.supabase.co`), without the `/rest/v1` suffix
    pub base_url: String,
    /// API key sent as both `apikey` and bearer token
    pub api_key: SecretString,
    /// Per-request timeout
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Create a config for a specific project
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key.into()),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - SUPABASE_URL (required)
    /// - SUPABASE_SERVICE_ROLE_KEY, falling back to SUPABASE_ANON_KEY (required)
    /// - LEGALFLOW_HTTP_TIMEOUT_SECS (optional, default: 30)
    pub fn from_env() -> GatewayResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`GatewayConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> GatewayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset, so `KEY=` in a .env file still falls back.
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let base_url = non_empty("SUPABASE_URL")
            .ok_or_else(|| GatewayError::Config("SUPABASE_URL not set".to_string()))?;
        let api_key = non_empty("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|| non_empty("SUPABASE_ANON_KEY"))
            .ok_or_else(|| {
                GatewayError::Config(
                    "SUPABASE_SERVICE_ROLE_KEY or SUPABASE_ANON_KEY not set".to_string(),
                )
            })?;

        let mut config = Self::new(base_url, api_key);
        if let Some(raw) = lookup("LEGALFLOW_HTTP_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                GatewayError::Config(format!("LEGALFLOW_HTTP_TIMEOUT_SECS is not a number: {raw}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Root of the row API.
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.base_url)
    }

    pub(crate) fn key(&self) -> &str {
        self.api_key.expose_secret()
    }
}
