use thiserror::Error;

/// Result alias for rating-service calls.
pub type RatingApiResult<T> = Result<T, RatingApiError>;

/// Failures talking to the external rating service.
#[derive(Debug, Error)]
pub enum RatingApiError {
    #[error("rating service credentials are not configured")]
    MissingCredentials,
    #[error("failed to build rating service client")]
    ClientConstruction(#[source] reqwest::Error),
    #[error("request to {endpoint} failed")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: &'static str },
    /// The service answered with a non-success status.
    #[error("{endpoint} rejected the request ({status}): {message}")]
    Rejected {
        endpoint: &'static str,
        status: u16,
        message: String,
    },
    #[error("unexpected response from {endpoint}: {message}")]
    Decode {
        endpoint: &'static str,
        message: String,
    },
}

impl RatingApiError {
    /// Status code of a rejected request.
    pub fn status(&self) -> Option<u16> {
        match self {
            RatingApiError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
