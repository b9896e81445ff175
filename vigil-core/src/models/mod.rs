//! Domain types for the camera / detection / event hierarchy

pub mod camera;
pub mod detection;
pub mod event;
pub mod risk;

pub use camera::Camera;
pub use detection::{BoundingBox, Detection, MediaType, NewDetection};
pub use event::{fast_path_batch_id, Event, EventDetection, NewEvent, FAST_PATH_PREFIX};
pub use risk::{clamp_risk_score, RiskLevel, SeverityThresholds};
