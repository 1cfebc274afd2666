/// Gemini tag extractor
///
/// Sends the outfit image inline (base64) together with a structured-output
/// prompt to the generateContent endpoint and returns the raw completion
/// text. Parsing and validation of that text belong to the tag pipeline, not
/// the provider.
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::ModelError,
    models::ImageBlob,
    services::providers::{check_status, TagExtractor},
};

const CAPABILITY: &str = "gemini";

/// The model is instructed to answer with one flat JSON object; values may be
/// a string or an array of strings per category.
const TAGGING_PROMPT: &str = "\
You are a fashion image annotator. Label the outfit in the given photo.

Answer with a single valid JSON object and nothing else, using exactly these \
keys:

{
  \"style\": \"overall style, e.g. casual / street / business / vintage / sporty\",
  \"season\": [\"suitable seasons: spring / summer / autumn / winter\"],
  \"scene\": [\"suitable occasions, e.g. commute / date / campus / travel / home / outdoor / sports\"],
  \"color\": [\"3-6 dominant colors\"],
  \"pattern\": \"solid / print / stripes / plaid / graphic\",
  \"general\": [\"free-form fashion keywords\"]
}

Rules:
1. Output JSON only, no explanations and no markdown fences.
2. The JSON must be parseable.
3. Use empty strings or empty arrays for attributes you cannot determine; \
never omit a key.";

#[derive(Clone)]
pub struct GeminiTagExtractor {
    http_client: HttpClient,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiTagExtractor {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait::async_trait]
impl TagExtractor for GeminiTagExtractor {
    async fn extract(&self, image: &ImageBlob) -> Result<String, ModelError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let payload = json!({
            "contents": [{
                "parts": [
                    {"text": TAGGING_PROMPT},
                    {"inline_data": {
                        "mime_type": image.mime_or_default(),
                        "data": BASE64.encode(&image.bytes),
                    }},
                ]
            }],
            "generationConfig": {"temperature": 0.2},
        });

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ModelError::from_transport(CAPABILITY, &e))?;
        let response = check_status(CAPABILITY, response).await?;

        let completion: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ModelError::NonRetryable(format!("{CAPABILITY}: unparseable body: {e}")))?;

        let text: String = completion
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();

        if text.trim().is_empty() {
            // An empty completion is a model hiccup, not a request defect.
            return Err(ModelError::Retryable(format!(
                "{CAPABILITY}: empty completion"
            )));
        }

        tracing::debug!(
            completion_chars = text.len(),
            model = %self.model,
            provider = CAPABILITY,
            "tag completion received"
        );

        Ok(text)
    }

    fn name(&self) -> &'static str {
        CAPABILITY
    }
}
