//! Enrichment data model and pipeline contract

pub mod data;
pub mod pipeline;

pub use data::{
    EnrichmentData, FaceItem, ImageQuality, LicensePlateItem, PetClassification,
    VehicleClassification, ViolenceDetection,
};
pub use pipeline::{
    EnrichmentPipeline, EnrichmentResult, EnvironmentContext, ModelZooSignals,
    NoopEnrichmentPipeline, ReidMatch, VisionExtraction,
};
