//! Registry adapter error types.

use homewatch_domain::error::HomeWatchError;

/// Errors specific to the registry adapter.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The request could not be sent, timed out, or the body was unreadable.
    #[error("registry request failed")]
    Http(#[from] reqwest::Error),

    /// The registry answered with a non-2xx status.
    #[error("registry answered {status} on {endpoint}: {body}")]
    UnexpectedStatus {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    /// The body did not have the expected shape.
    #[error("invalid registry response on {endpoint}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl RegistryError {
    /// Convert into a [`HomeWatchError::RegistryUnavailable`] for propagation
    /// across port boundaries.
    pub fn into_domain(self) -> HomeWatchError {
        HomeWatchError::RegistryUnavailable(Box::new(self))
    }
}

impl From<RegistryError> for HomeWatchError {
    fn from(err: RegistryError) -> Self {
        err.into_domain()
    }
}
