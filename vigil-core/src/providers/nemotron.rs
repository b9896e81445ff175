//! Nemotron LLM provider over HTTP
//!
//! Talks to a llama.cpp-style server: `POST /completion` returning
//! `{content}` (or an SSE stream of `data: {content}` lines when
//! `stream: true`), and `GET /health`.

use super::{CompletionProvider, CompletionRequest, CompletionStream};
use crate::config::Settings;
use crate::{Error, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// SSE terminator sent by the server when the stream is complete
const STREAM_DONE: &str = "[DONE]";

/// HTTP client for the Nemotron completion service
pub struct NemotronProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    read_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    content: String,
}

/// Map a reqwest failure onto the LLM error taxonomy
fn map_llm_error(e: &reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::LlmTimeout(e.to_string())
    } else if e.is_connect() {
        Error::LlmConnection(e.to_string())
    } else {
        Error::LlmServer(e.to_string())
    }
}

impl NemotronProvider {
    /// Build a provider from settings
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.ai_connect_timeout())
            .build()
            .map_err(|e| Error::LlmConnection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.nemotron_url.trim_end_matches('/').to_string(),
            api_key: settings.nemotron_api_key.clone(),
            read_timeout: settings.nemotron_read_timeout(),
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(format!("{}{path}", self.base_url));
        if let Some(key) = &self.api_key {
            builder = builder.header("X-API-Key", key);
        }
        builder
    }

    fn payload(request: &CompletionRequest, stream: bool) -> Value {
        serde_json::json!({
            "prompt": request.prompt,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "max_tokens": request.max_tokens,
            "stop": request.stop,
            "stream": stream,
        })
    }
}

#[async_trait]
impl CompletionProvider for NemotronProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let response = self
            .request("/completion")
            .timeout(self.read_timeout)
            .json(&Self::payload(request, false))
            .send()
            .await
            .map_err(|e| map_llm_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::LlmServer(format!("completion returned {status}")));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::LlmServer(format!("completion body: {e}")))?;
        if body.content.is_empty() {
            return Err(Error::Parse("empty completion from LLM".to_string()));
        }
        Ok(body.content)
    }

    async fn complete_streaming(&self, request: &CompletionRequest) -> Result<CompletionStream> {
        let response = self
            .request("/completion")
            .timeout(self.read_timeout)
            .json(&Self::payload(request, true))
            .send()
            .await
            .map_err(|e| map_llm_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::LlmServer(format!("completion returned {status}")));
        }

        let event_stream = response.bytes_stream().eventsource();
        let stream = async_stream::stream! {
            futures::pin_mut!(event_stream);
            while let Some(event) = event_stream.next().await {
                match event {
                    Ok(event) => {
                        if event.data == STREAM_DONE {
                            break;
                        }
                        match serde_json::from_str::<Value>(&event.data) {
                            Ok(data) => {
                                if let Some(content) = data.get("content").and_then(Value::as_str)
                                {
                                    if !content.is_empty() {
                                        yield Ok(content.to_string());
                                    }
                                }
                            }
                            Err(_) => {
                                // Malformed SSE lines are logged and skipped
                                let preview: String = event.data.chars().take(100).collect();
                                warn!("malformed SSE data: {preview}");
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(Error::LlmServer(format!("SSE stream error: {e}")));
                        break;
                    }
                }
            }
        };
        Ok(stream.boxed())
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
                debug!("LLM health check failed: {e}");
                false
            }
        }
    }
}
