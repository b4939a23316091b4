//! Client configuration: credentials, transport timeout and the policy for
//! failed write operations.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ApiError;

pub const ENV_BASE_URL: &str = "DIRECTORY_BASE_URL";
pub const ENV_CLIENT_ID: &str = "DIRECTORY_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "DIRECTORY_CLIENT_SECRET";
pub const ENV_TIMEOUT_SECS: &str = "DIRECTORY_TIMEOUT_SECS";
pub const ENV_FAILURE_POLICY: &str = "DIRECTORY_FAILURE_POLICY";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// OAuth2 client credentials plus the service root they authenticate against.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(base_url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// What `create_user`, `update_user` and `delete_user` hand back when the
/// request fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Return the server's response unmodified; propagate transport errors.
    #[default]
    Passthrough,
    /// Replace the failure with a synthetic 200 response whose body is the
    /// failure message. Kept for callers written against that contract.
    Synthesize,
}

impl FromStr for FailurePolicy {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" => Ok(FailurePolicy::Passthrough),
            "synthesize" => Ok(FailurePolicy::Synthesize),
            other => Err(ApiError::Config(format!("unknown failure policy: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credentials: Credentials,
    /// Per-request timeout applied by the transport.
    pub timeout: Duration,
    pub failure_policy: FailurePolicy,
    /// Subtracted from a token's `expires_in` so it is refreshed early.
    pub token_expiry_skew: Duration,
}

impl ClientConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            timeout: DEFAULT_TIMEOUT,
            failure_policy: FailurePolicy::default(),
            token_expiry_skew: DEFAULT_EXPIRY_SKEW,
        }
    }

    /// Load configuration from the process environment, reading a `.env`
    /// file first if one is present.
    pub fn from_env() -> Result<Self, ApiError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ApiError::Config(format!("{key} is not set")))
        };

        let credentials = Credentials::new(
            &required(ENV_BASE_URL)?,
            &required(ENV_CLIENT_ID)?,
            &required(ENV_CLIENT_SECRET)?,
        );
        let mut config = Self::new(credentials);

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ApiError::Config(format!("{ENV_TIMEOUT_SECS} must be an integer, got {raw:?}")))?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup(ENV_FAILURE_POLICY) {
            config.failure_policy = raw.parse()?;
        }
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_token_expiry_skew(mut self, skew: Duration) -> Self {
        self.token_expiry_skew = skew;
        self
    }
}
