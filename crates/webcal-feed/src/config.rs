//! Feed fetcher configuration.

use std::time::Duration;

/// The configuration key gating the SSRF policy in the embedding system.
///
/// The value is read by the embedder and injected into
/// [`FetcherConfig::allow_local_access`]; the fetcher itself never
/// consults global configuration.
pub const ALLOW_LOCAL_ACCESS_KEY: &str = "webcalAllowLocalAccess";

/// Configuration for the feed fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Whether requests to non-public addresses are allowed.
    pub allow_local_access: bool,

    /// Request timeout (connect plus read).
    pub timeout: Duration,

    /// Maximum number of redirects to follow.
    pub max_redirects: u32,

    /// User agent string.
    pub user_agent: String,
}

impl FetcherConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default redirect cap.
    pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

    /// Creates a configuration with defaults: local access denied,
    /// 30 second timeout, at most 10 redirects.
    pub fn new() -> Self {
        Self {
            allow_local_access: false,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            max_redirects: Self::DEFAULT_MAX_REDIRECTS,
            user_agent: format!("webcal-feed/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Allows requests to local/non-public addresses.
    pub fn with_allow_local_access(mut self, allow: bool) -> Self {
        self.allow_local_access = allow;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the redirect cap.
    pub fn with_max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    /// Sets the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deny_local_access() {
        let config = FetcherConfig::new();
        assert!(!config.allow_local_access);
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn builder_methods() {
        let config = FetcherConfig::new()
            .with_allow_local_access(true)
            .with_timeout(Duration::from_secs(5))
            .with_max_redirects(3)
            .with_user_agent("test-agent/1.0");

        assert!(config.allow_local_access);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_redirects, 3);
        assert_eq!(config.user_agent, "test-agent/1.0");
    }
}
