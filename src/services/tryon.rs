use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ModelError},
    models::{ImageBlob, TryOnResult},
    services::{gateway::ModelGateway, providers::ImageSynthesizer},
    store::AssetStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Syntheses allowed to run concurrently.
    pub max_in_flight: usize,
    /// Requests allowed to wait for a slot; beyond this, `Overloaded`.
    pub queue_depth: usize,
}

/// Virtual try-on pipeline.
///
/// Bounded admission protects the upstream quota and keeps buffered images
/// from growing without limit: `max_in_flight` requests run, up to
/// `queue_depth` more wait, the rest are rejected before any upstream work.
/// Asset writes happen only after a successful synthesis, so a failed request
/// leaves nothing behind.
pub struct TryOnPipeline {
    gateway: Arc<ModelGateway>,
    synthesizer: Arc<dyn ImageSynthesizer>,
    assets: Arc<dyn AssetStore>,
    timeout: Duration,
    running: Arc<Semaphore>,
    waiting: Arc<Semaphore>,
}

impl TryOnPipeline {
    pub fn new(
        gateway: Arc<ModelGateway>,
        synthesizer: Arc<dyn ImageSynthesizer>,
        assets: Arc<dyn AssetStore>,
        timeout: Duration,
        admission: AdmissionConfig,
    ) -> Self {
        Self {
            gateway,
            synthesizer,
            assets,
            timeout,
            running: Arc::new(Semaphore::new(admission.max_in_flight.max(1))),
            waiting: Arc::new(Semaphore::new(admission.queue_depth)),
        }
    }

    /// Renders the outfit onto the portrait and commits the result.
    ///
    /// Returns both the inline base64 payload and the durable references, so
    /// callers may choose either. Admission permits are RAII: every exit path
    /// releases its slot, including cancellation while queued.
    pub async fn synthesize(
        &self,
        portrait: &ImageBlob,
        outfit: &ImageBlob,
        cancel: &CancellationToken,
    ) -> AppResult<TryOnResult> {
        if portrait.is_empty() {
            return Err(AppError::InvalidInput("portrait image is empty".to_string()));
        }
        if outfit.is_empty() {
            return Err(AppError::InvalidInput("outfit image is empty".to_string()));
        }

        // A free running slot admits the request directly; otherwise it holds
        // a queue slot while waiting for one, and a full queue rejects it.
        let _running = match self.running.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let queued = match self.waiting.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("try-on admission queue full, rejecting request");
                        return Err(AppError::Overloaded(
                            "synthesis queue is full, try again later".to_string(),
                        ));
                    }
                };
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ModelError::Cancelled.into()),
                    permit = self.running.clone().acquire_owned() => {
                        permit.map_err(|e| AppError::Internal(format!("admission semaphore closed: {e}")))?
                    }
                };
                drop(queued);
                permit
            }
        };

        let request_id = Uuid::new_v4();
        let synthesizer = &*self.synthesizer;
        let rendered = self
            .gateway
            .invoke("image_synthesizer", self.timeout, cancel, || {
                synthesizer.synthesize(portrait, outfit)
            })
            .await;

        let rendered = match rendered {
            Ok(bytes) => bytes,
            Err(ModelError::Cancelled) => return Err(ModelError::Cancelled.into()),
            Err(err) => {
                return Err(AppError::SynthesisFailed(format!(
                    "image synthesizer failed: {err}"
                )))
            }
        };

        // Commit inputs and result; nothing was written before this point.
        let portrait_ref = self
            .assets
            .put_blob(&portrait.bytes, portrait.mime_or_default())
            .await?;
        let outfit_ref = self
            .assets
            .put_blob(&outfit.bytes, outfit.mime_or_default())
            .await?;
        let result_ref = self.assets.put_blob(&rendered, "image/png").await?;

        tracing::info!(
            request_id = %request_id,
            result_bytes = rendered.len(),
            result_ref = %result_ref,
            provider = synthesizer.name(),
            "try-on synthesis completed"
        );

        Ok(TryOnResult {
            request_id,
            portrait_ref,
            outfit_ref,
            inline_payload: BASE64.encode(&rendered),
            result_ref,
            created_at: Utc::now(),
        })
    }
}
