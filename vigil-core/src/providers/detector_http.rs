//! Object detector provider over HTTP
//!
//! `POST /detect` with the binary image; the response carries
//! `{detections: [{class, confidence, bbox}, …]}` where `bbox` is either
//! the object form `{x, y, width, height}` or the corner array
//! `[x1, y1, x2, y2]`.

use super::{DetectionProvider, RawDetection};
use crate::config::Settings;
use crate::models::BoundingBox;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// HTTP client for the object-detector service
pub struct HttpDetectionProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    read_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<WireDetection>,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    class: String,
    confidence: f64,
    bbox: Option<Value>,
}

/// Accept both bbox wire forms
fn parse_bbox(value: &Value) -> Option<BoundingBox> {
    if let Some(object) = value.as_object() {
        Some(BoundingBox {
            x: object.get("x")?.as_f64()?,
            y: object.get("y")?.as_f64()?,
            width: object.get("width")?.as_f64()?,
            height: object.get("height")?.as_f64()?,
        })
    } else if let Some(corners) = value.as_array() {
        if corners.len() != 4 {
            return None;
        }
        let coords: Vec<f64> = corners.iter().filter_map(Value::as_f64).collect();
        if coords.len() != 4 {
            return None;
        }
        Some(BoundingBox::from_corners(
            coords[0], coords[1], coords[2], coords[3],
        ))
    } else {
        None
    }
}

/// Map a reqwest failure onto the detector error taxonomy
fn map_detector_error(e: &reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::DetectorUnavailable(e.to_string())
    } else {
        Error::DetectorUnavailable(format!("detector request failed: {e}"))
    }
}

impl HttpDetectionProvider {
    /// Build a provider from settings
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.ai_connect_timeout())
            .build()
            .map_err(|e| {
                Error::DetectorUnavailable(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            base_url: settings.detector_url.trim_end_matches('/').to_string(),
            api_key: settings.detector_api_key.clone(),
            read_timeout: settings.detector_read_timeout(),
        })
    }
}

#[async_trait]
impl DetectionProvider for HttpDetectionProvider {
    async fn detect(&self, image: Vec<u8>, file_name: &str) -> Result<Vec<RawDetection>> {
        let mut builder = self
            .client
            .post(format!("{}/detect", self.base_url))
            .timeout(self.read_timeout)
            .header("Content-Type", "application/octet-stream")
            .header("X-File-Name", file_name)
            .body(image);
        if let Some(key) = &self.api_key {
            builder = builder.header("X-API-Key", key);
        }

        let response = builder.send().await.map_err(|e| map_detector_error(&e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Error::DetectorUnavailable(format!(
                "detector returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(Error::InvalidInput(format!("detector rejected image: {status}")));
        }

        let body: DetectResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("detector body: {e}")))?;

        Ok(body
            .detections
            .into_iter()
            .map(|d| RawDetection {
                class: d.class,
                confidence: d.confidence,
                bbox: d.bbox.as_ref().and_then(parse_bbox),
            })
            .collect())
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!("detector health check failed: {e}");
                false
            }
        }
    }
}
