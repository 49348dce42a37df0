// Error types shared across the librarian
//
// RecommendationError classifies every way a recommendation round-trip can
// fail. Only the credential kinds route the session back to authentication;
// everything else ends in the Error state with a generic message.

use thiserror::Error;

/// Message shown to the user for every non-credential failure.
pub const GENERIC_FAILURE_MESSAGE: &str = "Unable to retrieve book recommendations at this time.";

/// Message shown when the search was bounced back to key selection.
pub const CREDENTIAL_FAILURE_MESSAGE: &str =
    "An API key is required to search the library. Please select a key and try again.";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecommendationError {
    /// No API key configured; detected before any call is made
    #[error("no API key configured")]
    MissingCredential,
    /// Provider refused the configured key
    #[error("API key rejected by provider (HTTP {0})")]
    CredentialRejected(u16),
    /// No payload, or nothing usable left after catalog filtering
    #[error("no data returned from the library system")]
    EmptyResponse,
    /// Payload failed structural or schema validation
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("request timed out")]
    Timeout,
    /// Network or provider-side failure
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),
}

impl RecommendationError {
    /// True for failures that can only be fixed by re-entering key selection.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            RecommendationError::MissingCredential | RecommendationError::CredentialRejected(_)
        )
    }

    /// Short message safe to show to the user. Never includes parse details.
    pub fn user_message(&self) -> &'static str {
        if self.is_credential_failure() {
            CREDENTIAL_FAILURE_MESSAGE
        } else {
            GENERIC_FAILURE_MESSAGE
        }
    }
}

impl From<reqwest::Error> for RecommendationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RecommendationError::Timeout
        } else {
            RecommendationError::UpstreamFailure(e.to_string())
        }
    }
}

/// Reasons a submission is refused without touching the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("query is empty")]
    EmptyQuery,
    #[error("a search is already in progress")]
    Busy,
    #[error("there is no failed search to retry")]
    NothingToRetry,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog is empty")]
    Empty,
    #[error("catalog has {count} entries, more than the {limit} that can be embedded in a prompt")]
    TooLarge { count: usize, limit: usize },
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("API key cannot be empty")]
    EmptyKey,
    #[error("key store error: {0}")]
    Store(String),
}

impl From<keyring::Error> for CredentialError {
    fn from(e: keyring::Error) -> Self {
        CredentialError::Store(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Failures that stop the service from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}
