/// Upstream model capability abstractions
///
/// The three external models are reached through one network-client pattern
/// but modeled as separate capabilities, so the pipelines depend on these
/// interfaces and a vendor (or a test double) can be swapped without touching
/// pipeline logic. Implementations return raw `ModelError`s; the gateway owns
/// retries and timeouts on top.
use bytes::Bytes;

use crate::{
    error::ModelError,
    models::{ImageBlob, Location, WeatherSnapshot},
};

pub mod dashscope;
pub mod gemini;
pub mod qweather;

/// Fails non-2xx responses with a normalized error, reading the body for the
/// reason and any Retry-After hint for the gateway.
pub(crate) async fn check_status(
    capability: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ModelError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let retry_after = retry_after_hint(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(ModelError::from_http(capability, status, retry_after, &body))
}

pub(crate) fn retry_after_hint(
    headers: &reqwest::header::HeaderMap,
) -> Option<std::time::Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(std::time::Duration::from_secs)
}

/// Live weather observation capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Resolves the location and fetches the current observation.
    async fn observe(&self, location: &Location) -> Result<WeatherSnapshot, ModelError>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Vision-language tagging capability.
///
/// Returns the model's raw completion text; the tag pipeline owns parsing
/// and validation.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TagExtractor: Send + Sync {
    async fn extract(&self, image: &ImageBlob) -> Result<String, ModelError>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Image-synthesis ("try-on") capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ImageSynthesizer: Send + Sync {
    /// Renders the outfit onto the portrait, returning the result image bytes.
    async fn synthesize(&self, portrait: &ImageBlob, outfit: &ImageBlob)
        -> Result<Bytes, ModelError>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
