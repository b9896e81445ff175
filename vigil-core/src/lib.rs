#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::float_cmp)]

//! # Vigil Core
//!
//! The detection-to-event pipeline of the Vigil home-security video
//! analysis backend.
//!
//! ## Dataflow
//!
//! 1. [`detector::DetectorClient`] turns an image file into persisted
//!    detections, gated by the [`semaphore::InferenceSemaphore`].
//! 2. [`aggregator::BatchAggregator`] groups detections per camera into
//!    time-bounded batches in the shared key-value store, diverting
//!    high-confidence critical detections onto the fast path.
//! 3. [`workers::AnalysisQueueWorker`] consumes closed batches and hands
//!    them to the [`analyzer::NemotronAnalyzer`], which calls the LLM,
//!    validates the result, persists the [`models::Event`], and broadcasts
//!    it on `security_events`.
//! 4. [`gpu::GpuMonitor`] publishes the memory-pressure level that
//!    throttles the semaphore and drives backpressure.
//!
//! ## Module Organization
//!
//! - [`models`]: camera / detection / event domain types and risk scoring
//! - [`aggregator`]: time-window batching with fast-path promotion
//! - [`analyzer`]: LLM risk analysis, parsing, validation, streaming
//! - [`detector`]: detector service client
//! - [`semaphore`] / [`gpu`]: AI concurrency gate and pressure signal
//! - [`storage`]: key-value and relational store traits
//! - [`workers`]: background loops with lifecycle management
//! - [`pipeline`]: assembly of the whole core
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vigil_core::config::Settings;
//! use vigil_core::pipeline::Pipeline;
//! use vigil_core::providers::{HttpDetectionProvider, NemotronProvider};
//!
//! # async fn example(
//! #     kv: Arc<dyn vigil_core::storage::KeyValueStore>,
//! #     store: Arc<dyn vigil_core::storage::RelationalStore>,
//! # ) -> vigil_core::Result<()> {
//! let settings = Settings::from_env();
//! let llm = Arc::new(NemotronProvider::new(&settings)?);
//! let detector = Arc::new(HttpDetectionProvider::new(&settings)?);
//!
//! let pipeline = Pipeline::new(kv, store, llm, detector, None, settings);
//! pipeline.start();
//!
//! // ... run until shutdown ...
//! pipeline.shutdown(Duration::from_secs(30)).await;
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod analyzer;
pub mod broadcast;
pub mod config;
pub mod context;
pub mod detector;
pub mod enrichment;
mod error;
pub mod gpu;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod queue;
pub mod retry;
pub mod semaphore;
pub mod storage;
pub mod workers;

pub use error::{Error, Result};

pub use aggregator::{BatchAggregator, BatchSummary};
pub use analyzer::streaming::{StreamingErrorCode, StreamingEvent};
pub use analyzer::NemotronAnalyzer;
pub use config::Settings;
pub use context::{ContextEnricher, EnrichedContext};
pub use detector::DetectorClient;
pub use enrichment::{EnrichmentData, EnrichmentPipeline, EnrichmentResult};
pub use gpu::{GpuMonitor, MemoryPressureLevel};
pub use models::{Camera, Detection, Event, NewDetection, NewEvent, RiskLevel, SeverityThresholds};
pub use pipeline::Pipeline;
pub use queue::{AnalysisQueueItem, OverflowPolicy, QueuePushResult};
pub use semaphore::{InferencePermit, InferenceSemaphore};
pub use storage::{KeyValueStore, RelationalStore};
