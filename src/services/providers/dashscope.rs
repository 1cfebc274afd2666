/// DashScope OutfitAnyone synthesizer
///
/// The try-on service is asynchronous on the vendor side: both images are
/// uploaded to OSS under a short-lived upload policy, a synthesis task is
/// created against the uploaded objects, the task is polled to a terminal
/// state, and the result image is downloaded. The gateway's per-attempt
/// timeout bounds the whole sequence, including the polling loop.
use std::time::Duration;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::ModelError,
    models::ImageBlob,
    services::providers::{check_status, ImageSynthesizer},
};

const CAPABILITY: &str = "dashscope";
const DEFAULT_MODEL: &str = "aitryon";
const SUPPORTED_MODELS: [&str; 2] = ["aitryon", "aitryon-plus"];
const POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Clone)]
pub struct DashscopeSynthesizer {
    http_client: HttpClient,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct UploadPolicyResponse {
    data: Option<UploadPolicy>,
}

#[derive(Debug, Deserialize)]
struct UploadPolicy {
    policy: String,
    signature: String,
    upload_dir: String,
    upload_host: String,
    oss_access_key_id: String,
    x_oss_object_acl: String,
    x_oss_forbid_overwrite: String,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    output: Option<TaskOutput>,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    task_id: Option<String>,
    task_status: Option<String>,
    image_url: Option<String>,
}

impl DashscopeSynthesizer {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        let model = model.trim().to_string();
        let model = if SUPPORTED_MODELS.contains(&model.as_str()) {
            model
        } else {
            tracing::warn!(
                requested = %model,
                fallback = DEFAULT_MODEL,
                "unsupported try-on model, falling back"
            );
            DEFAULT_MODEL.to_string()
        };
        Self {
            http_client: HttpClient::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    async fn fetch_upload_policy(&self) -> Result<UploadPolicy, ModelError> {
        let url = format!("{}/api/v1/uploads", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("action", "getPolicy"), ("model", self.model.as_str())])
            .send()
            .await
            .map_err(|e| ModelError::from_transport(CAPABILITY, &e))?;
        let response = check_status(CAPABILITY, response).await?;

        let parsed: UploadPolicyResponse = response
            .json()
            .await
            .map_err(|e| ModelError::NonRetryable(format!("{CAPABILITY}: unparseable policy: {e}")))?;
        parsed
            .data
            .ok_or_else(|| ModelError::NonRetryable(format!("{CAPABILITY}: empty upload policy")))
    }

    /// Uploads one image under the policy; returns the oss:// object URL the
    /// synthesis endpoint resolves.
    async fn upload_to_oss(
        &self,
        policy: &UploadPolicy,
        file_name: &str,
        image: &ImageBlob,
    ) -> Result<String, ModelError> {
        let key = format!("{}/{}", policy.upload_dir, file_name);
        let part = Part::bytes(image.bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(image.mime_or_default())
            .map_err(|e| ModelError::NonRetryable(format!("{CAPABILITY}: bad mime type: {e}")))?;
        let form = Form::new()
            .text("OSSAccessKeyId", policy.oss_access_key_id.clone())
            .text("Signature", policy.signature.clone())
            .text("policy", policy.policy.clone())
            .text("x-oss-object-acl", policy.x_oss_object_acl.clone())
            .text("x-oss-forbid-overwrite", policy.x_oss_forbid_overwrite.clone())
            .text("key", key.clone())
            .text("success_action_status", "200")
            .part("file", part);

        let response = self
            .http_client
            .post(&policy.upload_host)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ModelError::from_transport(CAPABILITY, &e))?;
        check_status(CAPABILITY, response).await?;

        Ok(format!("oss://{key}"))
    }

    async fn create_task(
        &self,
        person_url: &str,
        garment_url: &str,
    ) -> Result<String, ModelError> {
        let url = format!(
            "{}/api/v1/services/aigc/image2image/image-synthesis",
            self.base_url
        );
        let payload = json!({
            "model": self.model,
            "input": {
                "person_image_url": person_url,
                "top_garment_url": garment_url,
            },
            "parameters": {
                "resolution": -1,
                "restore_face": true,
            },
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-DashScope-Async", "enable")
            .header("X-DashScope-OssResourceResolve", "enable")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ModelError::from_transport(CAPABILITY, &e))?;
        let response = check_status(CAPABILITY, response).await?;

        let parsed: TaskResponse = response
            .json()
            .await
            .map_err(|e| ModelError::NonRetryable(format!("{CAPABILITY}: unparseable body: {e}")))?;
        let output = parsed.output.unwrap_or(TaskOutput {
            task_id: None,
            task_status: None,
            image_url: None,
        });
        let task_id = output
            .task_id
            .ok_or_else(|| ModelError::NonRetryable(format!("{CAPABILITY}: no task_id returned")))?;

        tracing::info!(
            task_id = %task_id,
            status = output.task_status.as_deref().unwrap_or("unknown"),
            provider = CAPABILITY,
            "try-on task created"
        );
        Ok(task_id)
    }

    /// Polls the task until it reaches a terminal state. The caller's timeout
    /// bounds the loop.
    async fn poll_task(&self, task_id: &str) -> Result<String, ModelError> {
        let url = format!("{}/api/v1/tasks/{}", self.base_url, task_id);
        loop {
            let response = self
                .http_client
                .get(&url)
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(|e| ModelError::from_transport(CAPABILITY, &e))?;
            let response = check_status(CAPABILITY, response).await?;

            let parsed: TaskResponse = response.json().await.map_err(|e| {
                ModelError::NonRetryable(format!("{CAPABILITY}: unparseable body: {e}"))
            })?;
            let output = parsed.output.unwrap_or(TaskOutput {
                task_id: None,
                task_status: None,
                image_url: None,
            });

            match output.task_status.as_deref() {
                Some("SUCCEEDED") => {
                    return output.image_url.ok_or_else(|| {
                        ModelError::NonRetryable(format!(
                            "{CAPABILITY}: task {task_id} succeeded without image_url"
                        ))
                    });
                }
                Some(status @ ("FAILED" | "UNKNOWN" | "CANCELED")) => {
                    return Err(ModelError::NonRetryable(format!(
                        "{CAPABILITY}: task {task_id} ended as {status}"
                    )));
                }
                _ => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Bytes, ModelError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ModelError::from_transport(CAPABILITY, &e))?;
        let response = check_status(CAPABILITY, response).await?;
        response
            .bytes()
            .await
            .map_err(|e| ModelError::Retryable(format!("{CAPABILITY}: result download failed: {e}")))
    }
}

#[async_trait::async_trait]
impl ImageSynthesizer for DashscopeSynthesizer {
    async fn synthesize(
        &self,
        portrait: &ImageBlob,
        outfit: &ImageBlob,
    ) -> Result<Bytes, ModelError> {
        let policy = self.fetch_upload_policy().await?;
        let person_url = self.upload_to_oss(&policy, "person.jpg", portrait).await?;
        let garment_url = self.upload_to_oss(&policy, "garment.jpg", outfit).await?;

        let task_id = self.create_task(&person_url, &garment_url).await?;
        let image_url = self.poll_task(&task_id).await?;
        let bytes = self.download(&image_url).await?;

        tracing::info!(
            task_id = %task_id,
            result_bytes = bytes.len(),
            model = %self.model,
            provider = CAPABILITY,
            "try-on result downloaded"
        );
        Ok(bytes)
    }

    fn name(&self) -> &'static str {
        CAPABILITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_model_falls_back() {
        let provider = DashscopeSynthesizer::new(
            "key".to_string(),
            "https://dashscope.aliyuncs.com".to_string(),
            "aitryon-turbo-ultra".to_string(),
        );
        assert_eq!(provider.model, DEFAULT_MODEL);

        let provider = DashscopeSynthesizer::new(
            "key".to_string(),
            "https://dashscope.aliyuncs.com".to_string(),
            "aitryon-plus".to_string(),
        );
        assert_eq!(provider.model, "aitryon-plus");
    }

    #[test]
    fn test_task_response_deserialization() {
        let json = r#"{"output": {"task_id": "abc-123", "task_status": "PENDING"}}"#;
        let parsed: TaskResponse = serde_json::from_str(json).unwrap();
        let output = parsed.output.unwrap();
        assert_eq!(output.task_id.as_deref(), Some("abc-123"));
        assert_eq!(output.task_status.as_deref(), Some("PENDING"));
        assert_eq!(output.image_url, None);
    }

    #[test]
    fn test_upload_policy_deserialization() {
        let json = r#"{"data": {
            "policy": "cG9saWN5",
            "signature": "c2ln",
            "upload_dir": "dashscope/2025",
            "upload_host": "https://oss.example.com",
            "oss_access_key_id": "AKID",
            "x_oss_object_acl": "public-read",
            "x_oss_forbid_overwrite": "true"
        }}"#;
        let parsed: UploadPolicyResponse = serde_json::from_str(json).unwrap();
        let policy = parsed.data.unwrap();
        assert_eq!(policy.upload_dir, "dashscope/2025");
        assert_eq!(policy.upload_host, "https://oss.example.com");
    }
}
