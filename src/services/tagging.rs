use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    error::{AppError, AppResult, ModelError},
    models::{ImageBlob, TagCategory, TagSet},
    services::{gateway::ModelGateway, providers::TagExtractor},
};

/// Turns one outfit image into a validated, normalized TagSet.
///
/// The extractor's output is semi-structured text; this pipeline strips
/// markdown fences, parses defensively, fills missing required categories
/// with the `unknown` sentinel, and re-invokes the model once when the
/// response has no recognizable shape. It never caches: the model is not
/// deterministic and two calls over one image may legitimately disagree.
pub struct TagPipeline {
    gateway: Arc<ModelGateway>,
    extractor: Arc<dyn TagExtractor>,
    timeout: Duration,
}

impl TagPipeline {
    pub fn new(
        gateway: Arc<ModelGateway>,
        extractor: Arc<dyn TagExtractor>,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            extractor,
            timeout,
        }
    }

    /// Extracts a complete TagSet from the image, or fails without partial
    /// output. Persistence is the caller's job.
    pub async fn tag(&self, image: &ImageBlob, cancel: &CancellationToken) -> AppResult<TagSet> {
        if image.is_empty() {
            return Err(AppError::InvalidInput("image payload is empty".to_string()));
        }

        let extractor = &*self.extractor;
        let mut last_reason = String::new();

        // One re-invocation on shape failure; gateway errors are not retried
        // here (the gateway already spent its attempt budget).
        for round in 0..2 {
            let raw = match self
                .gateway
                .invoke("tag_extractor", self.timeout, cancel, || {
                    extractor.extract(image)
                })
                .await
            {
                Ok(raw) => raw,
                Err(ModelError::Cancelled) => return Err(ModelError::Cancelled.into()),
                Err(err) => {
                    return Err(AppError::TagExtractionFailed(format!(
                        "tag extractor failed: {err}"
                    )))
                }
            };

            match parse_tag_response(&raw) {
                Ok(mut tags) => {
                    tags.fill_missing_required();
                    tracing::info!(
                        tags = tags.len(),
                        round,
                        provider = extractor.name(),
                        "tag extraction completed"
                    );
                    return Ok(tags);
                }
                Err(reason) => {
                    tracing::warn!(round, reason = %reason, "tag response failed shape validation");
                    last_reason = reason;
                }
            }
        }

        Err(AppError::TagExtractionFailed(format!(
            "unparseable model output after retry: {last_reason}"
        )))
    }
}

/// Strips a markdown code fence (``` or ```json) wrapping the payload.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}

/// Parses the model response into a TagSet.
///
/// Accepts a JSON object whose keys normalize to known categories; values may
/// be strings or arrays of strings. Unknown keys and non-string values are
/// ignored. A response with no recognizable pair at all is a shape failure.
fn parse_tag_response(raw: &str) -> Result<TagSet, String> {
    let payload = strip_code_fence(raw);
    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| format!("invalid JSON: {e}"))?;
    let object = value.as_object().ok_or("response is not a JSON object")?;

    let mut tags = TagSet::new();
    for (key, entry) in object {
        let Some(category) = TagCategory::from_key(key) else {
            continue;
        };
        collect_values(&mut tags, category, entry);
    }

    if tags.is_empty() {
        return Err("no recognizable category/value pairs".to_string());
    }
    Ok(tags)
}

fn collect_values(tags: &mut TagSet, category: TagCategory, entry: &serde_json::Value) {
    match entry {
        serde_json::Value::String(s) => tags.push(category, s),
        serde_json::Value::Array(items) => {
            for item in items {
                if let Some(s) = item.as_str() {
                    tags.push(category, s);
                }
            }
        }
        _ => {}
    }
}
