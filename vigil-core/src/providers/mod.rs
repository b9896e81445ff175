//! AI service provider traits
//!
//! The detector and the LLM are external HTTP services. The analyzer and
//! detector client talk to them through these traits so tests can swap in
//! mock providers; production implementations live in
//! [`nemotron`](crate::providers::nemotron) and
//! [`detector_http`](crate::providers::detector_http).

pub mod detector_http;
pub mod nemotron;

use crate::models::BoundingBox;
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub use detector_http::HttpDetectionProvider;
pub use nemotron::NemotronProvider;

/// Completion request sent to the LLM service
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: usize,
    pub stop: Vec<String>,
}

impl CompletionRequest {
    /// Standard risk-analysis request shape for a prompt
    ///
    /// Nemotron uses ChatML framing, so generation stops at the message
    /// delimiter tokens.
    pub fn risk_analysis(prompt: String, max_tokens: usize) -> Self {
        Self {
            prompt,
            temperature: 0.7,
            top_p: 0.95,
            max_tokens,
            stop: vec!["<|im_end|>".to_string(), "<|im_start|>".to_string()],
        }
    }
}

/// Stream of content chunks from a streaming completion
pub type CompletionStream = BoxStream<'static, Result<String>>;

/// LLM completion service
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run a completion and return the full content
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Run a completion, yielding content chunks as they arrive
    async fn complete_streaming(&self, request: &CompletionRequest) -> Result<CompletionStream>;

    /// True iff the service health endpoint returns 200
    async fn health_check(&self) -> bool;
}

/// One raw detection as reported by the detector service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDetection {
    /// Object class label, e.g. "person"
    pub class: String,
    pub confidence: f64,
    pub bbox: Option<BoundingBox>,
}

/// Object detector service
#[async_trait]
pub trait DetectionProvider: Send + Sync {
    /// Run detection over an image
    async fn detect(&self, image: Vec<u8>, file_name: &str) -> Result<Vec<RawDetection>>;

    /// True iff the service health endpoint returns 200
    async fn health_check(&self) -> bool;
}
