//! Error types for feed fetching and normalization.

use std::fmt;
use thiserror::Error;

use crate::ical::IcalParseError;

/// The category of a fetch error.
///
/// The reconciler treats every kind as a per-subscription skip; the
/// classification exists for logging and for the batch report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// The source URL did not parse. No network call was made.
    InvalidUrl,
    /// The source URL uses a scheme other than http/https.
    UnsupportedScheme,
    /// The target resolves to a loopback, private, link-local or otherwise
    /// non-public address and local access is not allowed.
    LocalAddress,
    /// Connection, DNS or timeout failure.
    Network,
    /// The server answered with a non-success status.
    Http,
    /// The redirect chain exceeded the configured cap.
    TooManyRedirects,
}

impl FetchErrorKind {
    /// Returns a short machine-readable name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::LocalAddress => "local_address",
            Self::Network => "network",
            Self::Http => "http",
            Self::TooManyRedirects => "too_many_redirects",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error that occurred while fetching a remote feed.
#[derive(Debug, Error)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FetchError {
    /// Creates a new fetch error with the given kind and message.
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid-URL error.
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::InvalidUrl, message)
    }

    /// Creates an unsupported-scheme error.
    pub fn unsupported_scheme(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::UnsupportedScheme, message)
    }

    /// Creates a local-address (SSRF policy) error.
    pub fn local_address(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::LocalAddress, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, message)
    }

    /// Creates an HTTP status error.
    pub fn http(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Http, message)
    }

    /// Creates a too-many-redirects error.
    pub fn too_many_redirects(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::TooManyRedirects, message)
    }

    /// Sets the source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if this error is the SSRF policy refusal.
    pub fn is_policy_refusal(&self) -> bool {
        self.kind == FetchErrorKind::LocalAddress
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A specialized Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// An error that occurred while normalizing a fetched payload.
///
/// The normalizer never falls back across formats: a malformed body for
/// the declared format is surfaced as-is and the caller skips the
/// subscription without touching the cache.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Malformed iCalendar text.
    #[error("invalid iCalendar payload: {0}")]
    Ical(#[from] IcalParseError),

    /// The jCal body is not valid JSON.
    #[error("invalid jCal payload: {0}")]
    JcalJson(#[from] serde_json::Error),

    /// The jCal body is valid JSON but not a valid jCal structure.
    #[error("invalid jCal structure: {0}")]
    JcalStructure(String),

    /// The xCal body is not well-formed XML.
    #[error("invalid xCal payload: {0}")]
    XcalXml(#[from] quick_xml::Error),

    /// The xCal body is well-formed XML but not a valid xCal document.
    #[error("invalid xCal structure: {0}")]
    XcalStructure(String),
}
