//! Streaming analysis
//!
//! Delivers incremental LLM progress to a single subscriber while still
//! performing the full persist/broadcast flow exactly once. The stream
//! terminates with exactly one `complete` or `error` event; consumer
//! cancellation drops the inner HTTP stream and the inference permit, and
//! nothing is persisted.

use super::NemotronAnalyzer;
use crate::analyzer::validate::RiskAssessment;
use crate::analyzer::{extract_risk_object, validate_risk_data};
use crate::models::{Event, NewEvent};
use crate::providers::CompletionRequest;
use crate::{Error, Result};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Error codes surfaced on the streaming protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamingErrorCode {
    LlmTimeout,
    LlmConnectionError,
    LlmServerError,
    BatchNotFound,
    NoDetections,
    Cancelled,
    InternalError,
}

/// Typed events emitted by [`NemotronAnalyzer::analyze_batch_streaming`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum StreamingEvent {
    /// A content chunk arrived from the LLM
    Progress {
        content: String,
        accumulated_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress_percent: Option<f64>,
    },
    /// Terminal: the event was persisted (or already existed)
    Complete {
        event_id: i64,
        risk_score: u8,
        risk_level: String,
        summary: String,
        reasoning: String,
    },
    /// Terminal: the analysis failed
    Error {
        error_code: StreamingErrorCode,
        error_message: String,
        recoverable: bool,
    },
}

impl StreamingEvent {
    fn complete_from(event: &Event) -> Self {
        StreamingEvent::Complete {
            event_id: event.id,
            risk_score: event.risk_score,
            risk_level: event.risk_level.as_str().to_string(),
            summary: event.summary.clone(),
            reasoning: event.reasoning.clone(),
        }
    }

    fn from_error(e: &Error) -> Self {
        let (error_code, recoverable) = match e {
            Error::LlmTimeout(_) => (StreamingErrorCode::LlmTimeout, true),
            Error::LlmConnection(_) => (StreamingErrorCode::LlmConnectionError, true),
            Error::LlmServer(_) => (StreamingErrorCode::LlmServerError, true),
            Error::BatchNotFound(_) => (StreamingErrorCode::BatchNotFound, false),
            Error::NoDetections(_) => (StreamingErrorCode::NoDetections, false),
            Error::KeyValue(_) | Error::Storage(_) | Error::Queue(_) => {
                (StreamingErrorCode::InternalError, true)
            }
            _ => (StreamingErrorCode::InternalError, false),
        };
        StreamingEvent::Error {
            error_code,
            error_message: super::sanitize::sanitize_log_value(&e.to_string()),
            recoverable,
        }
    }
}

impl NemotronAnalyzer {
    /// Analyze a batch, yielding progress chunks, then one terminal event
    ///
    /// When an event already exists for the batch id, a single `complete`
    /// is emitted without calling the LLM.
    pub fn analyze_batch_streaming<'a>(
        &'a self,
        batch_id: &'a str,
        camera_id: Option<&'a str>,
        detection_ids: Option<Vec<i64>>,
    ) -> impl Stream<Item = StreamingEvent> + 'a {
        async_stream::stream! {
            match self.check_idempotency(batch_id).await {
                Ok(Some(existing)) => {
                    info!(batch_id, event_id = existing.id, "streaming: event already exists");
                    yield StreamingEvent::complete_from(&existing);
                    return;
                }
                Ok(None) => {}
                Err(e) => {
                    yield StreamingEvent::from_error(&e);
                    return;
                }
            }

            let (camera_id, detection_ids) =
                match self.resolve_batch(batch_id, camera_id, detection_ids).await {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        yield StreamingEvent::from_error(&e);
                        return;
                    }
                };

            info!(batch_id, camera_id, "streaming analysis started");

            let context = match self
                .load_batch_context(batch_id, &camera_id, &detection_ids)
                .await
            {
                Ok(context) => context,
                Err(e) => {
                    yield StreamingEvent::from_error(&e);
                    return;
                }
            };

            let (enriched, enrichment) = self.gather_enrichment(batch_id, &context).await;
            let (prompt, _template) =
                self.build_batch_prompt(&context, enriched.as_ref(), enrichment.as_ref());
            let request =
                CompletionRequest::risk_analysis(prompt.clone(), self.max_output_tokens());

            let mut accumulated = String::new();
            {
                // The permit guards the whole LLM stream; dropping the
                // generator on consumer cancellation releases it promptly
                let _permit = self.acquire_permit().await;

                let mut chunks = match self.completion_stream(&request).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        yield StreamingEvent::from_error(&e);
                        return;
                    }
                };

                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(content) => {
                            accumulated.push_str(&content);
                            yield StreamingEvent::Progress {
                                content,
                                accumulated_text: accumulated.clone(),
                                progress_percent: None,
                            };
                        }
                        Err(e) => {
                            error!(batch_id, "streaming LLM error: {e}");
                            yield StreamingEvent::from_error(&e);
                            return;
                        }
                    }
                }
            }

            let assessment = match extract_risk_object(&accumulated) {
                Ok(raw) => validate_risk_data(&raw, self.thresholds()),
                Err(e) => {
                    warn!(batch_id, "streaming completion did not parse: {e}");
                    RiskAssessment::parse_failure_fallback()
                }
            };

            let new_event = NewEvent {
                batch_id: batch_id.to_string(),
                camera_id: context.camera_id.clone(),
                started_at: context.started_at,
                ended_at: context.ended_at,
                risk_score: assessment.risk_score,
                risk_level: assessment.risk_level,
                summary: assessment.summary,
                reasoning: assessment.reasoning,
                is_fast_path: false,
                llm_prompt: Some(prompt),
                detection_ids: context.detection_ids.clone(),
            };

            match self.persist_and_broadcast(new_event, enrichment.as_ref()).await {
                Ok(event) => yield StreamingEvent::complete_from(&event),
                Err(e) => yield StreamingEvent::from_error(&e),
            }
        }
    }

    pub(crate) fn max_output_tokens(&self) -> usize {
        self.max_output_tokens
    }

    pub(crate) async fn acquire_permit(&self) -> crate::semaphore::InferencePermit {
        self.semaphore.acquire().await
    }

    pub(crate) async fn completion_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<crate::providers::CompletionStream> {
        self.llm.complete_streaming(request).await
    }
}

/// Render a streaming event as an SSE `data:` line
///
/// Route handlers forward these verbatim; the terminal event is followed
/// by `data: [DONE]`.
pub fn to_sse_line(event: &StreamingEvent) -> Result<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// The `[DONE]` terminator line
pub fn sse_done_line() -> &'static str {
    "data: [DONE]\n\n"
}
