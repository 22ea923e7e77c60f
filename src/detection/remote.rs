//! RemoteAnalyzer - HTTP inference service adapter
//!
//! `POST {base_url}/v1/detect` (multipart)
//!
//! | field       | content                        |
//! |-------------|--------------------------------|
//! | image       | JPEG frame                     |
//! | device_id   | source device                  |
//! | kind        | requested event type           |
//! | captured_at | RFC 3339 capture time          |
//!
//! Response: `{"detections": [{"confidence": 0.9, "bbox": {...}}]}`

use super::{BoundingBox, Detection, Frame, FrameAnalyzer};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<RemoteDetection>,
}

#[derive(Debug, Deserialize)]
struct RemoteDetection {
    #[serde(default, alias = "type")]
    event_type: Option<String>,
    confidence: f64,
    bbox: BoundingBox,
}

/// One detection kind served by a remote inference endpoint
pub struct RemoteAnalyzer {
    client: reqwest::Client,
    base_url: String,
    kind: String,
    name: String,
}

impl RemoteAnalyzer {
    pub fn new(base_url: &str, kind: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            kind: kind.to_string(),
            name: format!("remote_{}", kind),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl FrameAnalyzer for RemoteAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn model_type(&self) -> &str {
        "remote_http"
    }

    async fn analyze(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let url = format!("{}/v1/detect", self.base_url);

        let form = Form::new()
            .part(
                "image",
                Part::bytes(frame.jpeg.clone())
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")?,
            )
            .text("device_id", frame.device_id.clone())
            .text("kind", self.kind.clone())
            .text("captured_at", frame.captured_at.to_rfc3339());

        let resp = self.client.post(&url).multipart(form).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "Inference request failed: {} - {}",
                status, body
            )));
        }

        let parsed: DetectResponse = resp.json().await?;
        Ok(parsed
            .detections
            .into_iter()
            .map(|d| Detection {
                event_type: d.event_type.unwrap_or_else(|| self.kind.clone()),
                confidence: d.confidence,
                bbox: d.bbox,
                crop: None,
            })
            .collect())
    }
}
