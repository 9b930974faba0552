//! HTTP feed fetcher.
//!
//! Performs the outbound GET for one subscription source. Redirects are
//! followed manually so the [`AccessPolicy`] is enforced on every hop,
//! not just the initial URL.

use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{Client, redirect};
use tracing::{debug, trace};
use url::Url;

use crate::config::FetcherConfig;
use crate::error::{FetchError, FetchResult};
use crate::normalize::FeedFormat;
use crate::policy::AccessPolicy;

/// The default content type assumed when the server sends none.
pub const DEFAULT_CONTENT_TYPE: &str = "text/calendar";

const ACCEPT_HEADER: &str =
    "text/calendar, application/calendar+json, application/calendar+xml";

/// A successfully fetched feed body plus its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFeed {
    /// The response body.
    pub body: String,
    /// The `Content-Type` header value, defaulted to `text/calendar`.
    pub content_type: String,
}

impl FetchedFeed {
    /// Returns the wire format selected by the content type.
    pub fn format(&self) -> FeedFormat {
        FeedFormat::from_content_type(&self.content_type)
    }
}

/// Fetches remote calendar feeds over HTTP.
pub struct FeedFetcher {
    client: Client,
    policy: AccessPolicy,
    config: FetcherConfig,
}

impl FeedFetcher {
    /// Creates a fetcher from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: FetcherConfig) -> FetchResult<Self> {
        // Redirects are handled by the fetch loop so that policy checks
        // apply per hop.
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| {
                FetchError::network("failed to build HTTP client").with_source(e)
            })?;

        Ok(Self {
            client,
            policy: AccessPolicy::new(config.allow_local_access),
            config,
        })
    }

    /// Returns the access policy in force.
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Fetches the feed at `source`.
    ///
    /// A malformed URL fails immediately without any network call.
    /// Redirects are followed up to the configured cap, re-applying the
    /// access policy on each hop.
    ///
    /// # Errors
    ///
    /// See [`FetchErrorKind`](crate::FetchErrorKind) for the failure
    /// classification.
    pub async fn fetch(&self, source: &str) -> FetchResult<FetchedFeed> {
        let mut url = Url::parse(source)
            .map_err(|e| FetchError::invalid_url(format!("{:?}: {}", source, e)))?;

        for hop in 0..=self.config.max_redirects {
            match url.scheme() {
                "http" | "https" => {}
                other => {
                    return Err(FetchError::unsupported_scheme(format!(
                        "scheme {:?} is not fetchable",
                        other
                    )));
                }
            }

            self.policy.check(&url).await?;

            trace!(url = %url, hop = hop, "Requesting feed");

            let response = self
                .client
                .get(url.clone())
                .header(ACCEPT, ACCEPT_HEADER)
                .send()
                .await
                .map_err(|e| {
                    FetchError::network(format!("request to {} failed", url)).with_source(e)
                })?;

            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        FetchError::http(format!("redirect from {} without Location", url))
                    })?;

                let next = url.join(location).map_err(|e| {
                    FetchError::invalid_url(format!("bad redirect target {:?}: {}", location, e))
                })?;

                debug!(from = %url, to = %next, hop = hop, "Following redirect");
                url = next;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::http(format!(
                    "unexpected status {} from {}",
                    status, url
                )));
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string();

            let body = response.text().await.map_err(|e| {
                FetchError::network(format!("failed to read body from {}", url)).with_source(e)
            })?;

            debug!(
                url = %url,
                content_type = %content_type,
                bytes = body.len(),
                "Fetched feed"
            );

            return Ok(FetchedFeed { body, content_type });
        }

        Err(FetchError::too_many_redirects(format!(
            "more than {} redirects from {:?}",
            self.config.max_redirects, source
        )))
    }
}
