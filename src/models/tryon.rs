use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Binary image payload crossing the core boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlob {
    pub bytes: Bytes,
    pub mime: Option<String>,
}

impl ImageBlob {
    pub fn new(bytes: impl Into<Bytes>, mime: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// MIME type to report upstream, defaulting to JPEG.
    pub fn mime_or_default(&self) -> &str {
        self.mime.as_deref().unwrap_or("image/jpeg")
    }
}

/// Outcome of one successful try-on synthesis.
///
/// Created once, never mutated. Garbage collection of the referenced assets
/// by age/quota is the caller's policy, not the core's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryOnResult {
    pub request_id: Uuid,
    /// Durable reference to the portrait input as committed to the asset store
    pub portrait_ref: String,
    /// Durable reference to the outfit input as committed to the asset store
    pub outfit_ref: String,
    /// Base64-encoded result image for inline transport
    pub inline_payload: String,
    /// Durable reference to the result image
    pub result_ref: String,
    pub created_at: DateTime<Utc>,
}
