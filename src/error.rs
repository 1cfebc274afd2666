use std::time::Duration;

/// Normalized upstream model failure.
///
/// Every heterogeneous provider error (transport failure, HTTP status, vendor
/// body code) collapses into one of these classes before it leaves the
/// gateway. `Retryable` and `RateLimited` are eligible for another attempt;
/// `NonRetryable` and `Cancelled` are terminal.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ModelError {
    #[error("retryable upstream failure: {0}")]
    Retryable(String),

    #[error("rate limited: {reason}")]
    RateLimited {
        reason: String,
        /// Server-provided delay hint, honored over the computed backoff.
        retry_after: Option<Duration>,
    },

    #[error("non-retryable upstream failure: {0}")]
    NonRetryable(String),

    #[error("cancelled by caller")]
    Cancelled,
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::Retryable(_) | ModelError::RateLimited { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ModelError::Retryable(_) => "retryable",
            ModelError::RateLimited { .. } => "rate_limited",
            ModelError::NonRetryable(_) => "non_retryable",
            ModelError::Cancelled => "cancelled",
        }
    }

    /// Classifies a reqwest transport-level failure.
    pub fn from_transport(capability: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ModelError::Retryable(format!("{capability}: {err}"))
        } else {
            ModelError::NonRetryable(format!("{capability}: {err}"))
        }
    }

    /// Classifies an HTTP response status.
    ///
    /// 429 maps to `RateLimited` (with any Retry-After hint the caller pulled
    /// off the response), 5xx to `Retryable`, everything else to
    /// `NonRetryable`.
    pub fn from_http(
        capability: &str,
        status: reqwest::StatusCode,
        retry_after: Option<Duration>,
        body: &str,
    ) -> Self {
        let reason = format!("{capability} returned status {status}: {body}");
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ModelError::RateLimited { reason, retry_after }
        } else if status.is_server_error() {
            ModelError::Retryable(reason)
        } else {
            ModelError::NonRetryable(reason)
        }
    }
}

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("weather unavailable: {0}")]
    WeatherUnavailable(String),

    #[error("tag extraction failed: {0}")]
    TagExtractionFailed(String),

    #[error("try-on synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("try-on rejected: {0}")]
    Overloaded(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable kind, independent of the human-readable reason.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::WeatherUnavailable(_) => "weather_unavailable",
            AppError::TagExtractionFailed(_) => "tag_extraction_failed",
            AppError::SynthesisFailed(_) => "synthesis_failed",
            AppError::Overloaded(_) => "overloaded",
            AppError::Model(e) => e.kind(),
            AppError::NotFound(_) => "not_found",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Store(_) => "store_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_classification() {
        let err = ModelError::from_http(
            "weather_provider",
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            None,
            "boom",
        );
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "retryable");

        let err = ModelError::from_http(
            "weather_provider",
            reqwest::StatusCode::UNAUTHORIZED,
            None,
            "bad key",
        );
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "non_retryable");
    }

    #[test]
    fn test_rate_limit_carries_hint() {
        let err = ModelError::from_http(
            "image_synthesizer",
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(7)),
            "slow down",
        );
        assert!(err.is_retryable());
        match err {
            ModelError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_is_terminal() {
        assert!(!ModelError::Cancelled.is_retryable());
        assert_eq!(ModelError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn test_app_error_kind_passes_model_kind_through() {
        let err = AppError::Model(ModelError::Retryable("x".to_string()));
        assert_eq!(err.kind(), "retryable");
        assert_eq!(
            AppError::Overloaded("queue full".to_string()).kind(),
            "overloaded"
        );
    }
}
