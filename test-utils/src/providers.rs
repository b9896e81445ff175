//! Mock AI providers
//!
//! Scriptable stand-ins for the LLM and detector services. Replies are
//! queued ahead of time; each call consumes one. An empty script falls
//! back to the default reply.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use vigil_core::providers::{
    CompletionProvider, CompletionRequest, CompletionStream, DetectionProvider, RawDetection,
};
use vigil_core::{Error, Result};

/// Failure modes a mock can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    Connection,
    Server,
    Unavailable,
}

impl MockFailure {
    fn to_llm_error(self) -> Error {
        match self {
            MockFailure::Timeout => Error::LlmTimeout("mock timeout".to_string()),
            MockFailure::Connection => Error::LlmConnection("mock connection refused".to_string()),
            MockFailure::Server => Error::LlmServer("mock 500".to_string()),
            MockFailure::Unavailable => Error::LlmConnection("mock unavailable".to_string()),
        }
    }

    fn to_detector_error(self) -> Error {
        Error::DetectorUnavailable("mock detector down".to_string())
    }
}

enum CompletionReply {
    Content(String),
    Chunks(Vec<String>),
    Fail(MockFailure),
    /// Chunks, then a stream error
    ChunksThenFail(Vec<String>, MockFailure),
}

/// Scriptable LLM provider
pub struct MockCompletionProvider {
    replies: Mutex<VecDeque<CompletionReply>>,
    default_content: Option<String>,
    pub calls: AtomicUsize,
    healthy: AtomicBool,
    /// Artificial latency per call, for concurrency assertions
    latency: Option<Duration>,
}

impl Default for MockCompletionProvider {
    fn default() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_content: None,
            calls: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
            latency: None,
        }
    }
}

impl MockCompletionProvider {
    /// Provider answering every call with the same content
    pub fn with_content(content: &str) -> Self {
        Self {
            default_content: Some(content.to_string()),
            ..Default::default()
        }
    }

    /// Provider failing every call the same way
    pub fn failing(failure: MockFailure) -> Self {
        let provider = Self::default();
        // A long script of failures stands in for "always fails"
        let mut replies = provider.replies.lock();
        for _ in 0..64 {
            replies.push_back(CompletionReply::Fail(failure));
        }
        drop(replies);
        provider
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn push_content(&self, content: &str) {
        self.replies
            .lock()
            .push_back(CompletionReply::Content(content.to_string()));
    }

    pub fn push_chunks(&self, chunks: &[&str]) {
        self.replies.lock().push_back(CompletionReply::Chunks(
            chunks.iter().map(|c| (*c).to_string()).collect(),
        ));
    }

    pub fn push_failure(&self, failure: MockFailure) {
        self.replies.lock().push_back(CompletionReply::Fail(failure));
    }

    pub fn push_chunks_then_failure(&self, chunks: &[&str], failure: MockFailure) {
        self.replies.lock().push_back(CompletionReply::ChunksThenFail(
            chunks.iter().map(|c| (*c).to_string()).collect(),
            failure,
        ));
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn next_reply(&self) -> Option<CompletionReply> {
        self.replies.lock().pop_front()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.next_reply() {
            Some(CompletionReply::Content(content)) => Ok(content),
            Some(CompletionReply::Chunks(chunks)) => Ok(chunks.concat()),
            Some(CompletionReply::Fail(failure))
            | Some(CompletionReply::ChunksThenFail(_, failure)) => Err(failure.to_llm_error()),
            None => self
                .default_content
                .clone()
                .ok_or_else(|| Error::LlmServer("mock has no reply scripted".to_string())),
        }
    }

    async fn complete_streaming(&self, _request: &CompletionRequest) -> Result<CompletionStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let reply = self.next_reply();
        match reply {
            Some(CompletionReply::Content(content)) => {
                Ok(futures::stream::iter(vec![Ok(content)]).boxed())
            }
            Some(CompletionReply::Chunks(chunks)) => {
                Ok(futures::stream::iter(chunks.into_iter().map(Ok).collect::<Vec<_>>()).boxed())
            }
            Some(CompletionReply::ChunksThenFail(chunks, failure)) => {
                let mut items: Vec<Result<String>> = chunks.into_iter().map(Ok).collect();
                items.push(Err(failure.to_llm_error()));
                Ok(futures::stream::iter(items).boxed())
            }
            Some(CompletionReply::Fail(failure)) => Err(failure.to_llm_error()),
            None => match &self.default_content {
                Some(content) => Ok(futures::stream::iter(vec![Ok(content.clone())]).boxed()),
                None => Err(Error::LlmServer("mock has no reply scripted".to_string())),
            },
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

enum DetectionReply {
    Detections(Vec<RawDetection>),
    Fail(MockFailure),
}

/// Scriptable detector provider
pub struct MockDetectionProvider {
    replies: Mutex<VecDeque<DetectionReply>>,
    default_detections: Vec<RawDetection>,
    pub calls: AtomicUsize,
    healthy: AtomicBool,
}

impl Default for MockDetectionProvider {
    fn default() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_detections: Vec::new(),
            calls: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
        }
    }
}

impl MockDetectionProvider {
    /// Provider answering every call with the same detections
    pub fn with_detections(detections: Vec<RawDetection>) -> Self {
        Self {
            default_detections: detections,
            ..Default::default()
        }
    }

    pub fn push_detections(&self, detections: Vec<RawDetection>) {
        self.replies
            .lock()
            .push_back(DetectionReply::Detections(detections));
    }

    pub fn push_failure(&self, failure: MockFailure) {
        self.replies.lock().push_back(DetectionReply::Fail(failure));
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl DetectionProvider for MockDetectionProvider {
    async fn detect(&self, _image: Vec<u8>, _file_name: &str) -> Result<Vec<RawDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.lock().pop_front() {
            Some(DetectionReply::Detections(detections)) => Ok(detections),
            Some(DetectionReply::Fail(failure)) => Err(failure.to_detector_error()),
            None => Ok(self.default_detections.clone()),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}
