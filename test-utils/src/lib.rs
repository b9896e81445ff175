//! # Test Utilities
//!
//! Shared test utilities for the Vigil pipeline:
//!
//! - [`MemoryKv`]: in-memory key-value store with queues and pub-sub
//! - [`MemoryStore`]: in-memory relational store
//! - [`MockCompletionProvider`] / [`MockDetectionProvider`]: scriptable AI
//!   providers
//! - fixture builders for cameras, detections, and events

mod fixtures;
mod kv;
mod providers;
mod relational;

pub use fixtures::{
    create_detection_series, create_test_camera, create_test_detection, create_test_detection_at,
    create_test_event, llm_completion,
};
pub use kv::MemoryKv;
pub use providers::{MockCompletionProvider, MockDetectionProvider, MockFailure};
pub use relational::MemoryStore;
