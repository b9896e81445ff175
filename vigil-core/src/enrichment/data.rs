//! Enrichment map validation
//!
//! The enrichment pipeline produces a structured JSON map per detection.
//! Parsing is lenient: numeric confidences are clamped to their valid
//! range, non-numeric confidences become `None`, legacy singular forms
//! (`license_plate`, `face`, `vehicle`, `pet`) are normalized to their
//! list/map forms, and unknown keys are preserved for forward
//! compatibility.

use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A recognized license plate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LicensePlateItem {
    pub bbox: Option<Vec<f64>>,
    pub text: Option<String>,
    pub confidence: Option<f64>,
    pub ocr_confidence: Option<f64>,
    pub source_detection_id: Option<i64>,
    pub extra: Map<String, Value>,
}

/// A detected face
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceItem {
    pub bbox: Option<Vec<f64>>,
    pub confidence: Option<f64>,
    pub source_detection_id: Option<i64>,
    pub extra: Map<String, Value>,
}

/// Vehicle classification keyed by source detection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleClassification {
    pub vehicle_type: Option<String>,
    pub confidence: Option<f64>,
    pub extra: Map<String, Value>,
}

/// Pet classification keyed by source detection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PetClassification {
    pub animal_type: Option<String>,
    pub confidence: Option<f64>,
    pub extra: Map<String, Value>,
}

/// Violence detection verdict for the frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViolenceDetection {
    pub is_violent: bool,
    pub confidence: Option<f64>,
    pub predicted_class: Option<String>,
    pub extra: Map<String, Value>,
}

/// Image quality assessment; `quality_score` is clamped to [0, 100]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageQuality {
    pub quality_score: Option<f64>,
    pub extra: Map<String, Value>,
}

/// Structured enrichment map attached to a detection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentData {
    pub license_plates: Option<Vec<LicensePlateItem>>,
    pub faces: Option<Vec<FaceItem>>,
    pub vehicle_classifications: Option<BTreeMap<String, VehicleClassification>>,
    pub pet_classifications: Option<BTreeMap<String, PetClassification>>,
    pub violence: Option<ViolenceDetection>,
    pub image_quality: Option<ImageQuality>,
    pub processing_time_ms: Option<f64>,
    /// Unknown keys, preserved verbatim
    pub extra: Map<String, Value>,
}

/// Key under which legacy singular maps land in the normalized form
const LEGACY_KEY: &str = "legacy";

fn coerce_unit_confidence(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).map(|c| c.clamp(0.0, 1.0))
}

fn coerce_quality_score(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).map(|c| c.clamp(0.0, 100.0))
}

fn coerce_bbox(value: Option<&Value>) -> Option<Vec<f64>> {
    let list = value?.as_array()?;
    let coords: Vec<f64> = list.iter().filter_map(Value::as_f64).collect();
    if coords.len() == list.len() {
        Some(coords)
    } else {
        None
    }
}

fn take_extra(object: &Map<String, Value>, known: &[&str]) -> Map<String, Value> {
    object
        .iter()
        .filter(|(k, _)| !known.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl LicensePlateItem {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            bbox: coerce_bbox(object.get("bbox")),
            text: object
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string),
            confidence: coerce_unit_confidence(object.get("confidence")),
            ocr_confidence: coerce_unit_confidence(object.get("ocr_confidence")),
            source_detection_id: object.get("source_detection_id").and_then(Value::as_i64),
            extra: take_extra(
                object,
                &[
                    "bbox",
                    "text",
                    "confidence",
                    "ocr_confidence",
                    "source_detection_id",
                ],
            ),
        })
    }

    fn to_value(&self) -> Value {
        let mut object = self.extra.clone();
        if let Some(bbox) = &self.bbox {
            object.insert("bbox".into(), serde_json::json!(bbox));
        }
        if let Some(text) = &self.text {
            object.insert("text".into(), Value::String(text.clone()));
        }
        if let Some(c) = self.confidence {
            object.insert("confidence".into(), serde_json::json!(c));
        }
        if let Some(c) = self.ocr_confidence {
            object.insert("ocr_confidence".into(), serde_json::json!(c));
        }
        if let Some(id) = self.source_detection_id {
            object.insert("source_detection_id".into(), serde_json::json!(id));
        }
        Value::Object(object)
    }
}

impl FaceItem {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            bbox: coerce_bbox(object.get("bbox")),
            confidence: coerce_unit_confidence(object.get("confidence")),
            source_detection_id: object.get("source_detection_id").and_then(Value::as_i64),
            extra: take_extra(object, &["bbox", "confidence", "source_detection_id"]),
        })
    }

    fn to_value(&self) -> Value {
        let mut object = self.extra.clone();
        if let Some(bbox) = &self.bbox {
            object.insert("bbox".into(), serde_json::json!(bbox));
        }
        if let Some(c) = self.confidence {
            object.insert("confidence".into(), serde_json::json!(c));
        }
        if let Some(id) = self.source_detection_id {
            object.insert("source_detection_id".into(), serde_json::json!(id));
        }
        Value::Object(object)
    }
}

impl VehicleClassification {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        // Legacy form spells the type field "type"
        let vehicle_type = object
            .get("vehicle_type")
            .or_else(|| object.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            vehicle_type,
            confidence: coerce_unit_confidence(object.get("confidence")),
            extra: take_extra(object, &["vehicle_type", "type", "confidence"]),
        })
    }

    fn to_value(&self) -> Value {
        let mut object = self.extra.clone();
        if let Some(t) = &self.vehicle_type {
            object.insert("vehicle_type".into(), Value::String(t.clone()));
        }
        if let Some(c) = self.confidence {
            object.insert("confidence".into(), serde_json::json!(c));
        }
        Value::Object(object)
    }
}

impl PetClassification {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let animal_type = object
            .get("animal_type")
            .or_else(|| object.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            animal_type,
            confidence: coerce_unit_confidence(object.get("confidence")),
            extra: take_extra(object, &["animal_type", "type", "confidence"]),
        })
    }

    fn to_value(&self) -> Value {
        let mut object = self.extra.clone();
        if let Some(t) = &self.animal_type {
            object.insert("animal_type".into(), Value::String(t.clone()));
        }
        if let Some(c) = self.confidence {
            object.insert("confidence".into(), serde_json::json!(c));
        }
        Value::Object(object)
    }
}

impl ViolenceDetection {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            is_violent: object
                .get("is_violent")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            confidence: coerce_unit_confidence(object.get("confidence")),
            predicted_class: object
                .get("predicted_class")
                .and_then(Value::as_str)
                .map(str::to_string),
            extra: take_extra(object, &["is_violent", "confidence", "predicted_class"]),
        })
    }

    fn to_value(&self) -> Value {
        let mut object = self.extra.clone();
        object.insert("is_violent".into(), Value::Bool(self.is_violent));
        if let Some(c) = self.confidence {
            object.insert("confidence".into(), serde_json::json!(c));
        }
        if let Some(p) = &self.predicted_class {
            object.insert("predicted_class".into(), Value::String(p.clone()));
        }
        Value::Object(object)
    }
}

impl ImageQuality {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            quality_score: coerce_quality_score(object.get("quality_score")),
            extra: take_extra(object, &["quality_score"]),
        })
    }

    fn to_value(&self) -> Value {
        let mut object = self.extra.clone();
        if let Some(q) = self.quality_score {
            object.insert("quality_score".into(), serde_json::json!(q));
        }
        Value::Object(object)
    }
}

fn classification_map<T, F>(value: &Value, build: F) -> Option<BTreeMap<String, T>>
where
    F: Fn(&Value) -> Option<T>,
{
    let object = value.as_object()?;
    Some(
        object
            .iter()
            .filter_map(|(k, v)| build(v).map(|item| (k.clone(), item)))
            .collect(),
    )
}

const KNOWN_KEYS: &[&str] = &[
    "license_plates",
    "license_plate",
    "faces",
    "face",
    "vehicle_classifications",
    "vehicle",
    "pet_classifications",
    "pet",
    "violence",
    "image_quality",
    "processing_time_ms",
];

impl EnrichmentData {
    /// Parse an enrichment map from raw JSON
    ///
    /// Returns a validation error only when the value is not a JSON object;
    /// field-level problems are coerced or dropped per the lenient rules.
    pub fn from_value(value: &Value) -> crate::Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            crate::Error::Validation("enrichment data must be a JSON object".to_string())
        })?;

        let license_plates = match object.get("license_plates") {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(LicensePlateItem::from_value)
                    .collect(),
            ),
            // Legacy singular form becomes a one-element list
            _ => object
                .get("license_plate")
                .and_then(LicensePlateItem::from_value)
                .map(|item| vec![item]),
        };

        let faces = match object.get("faces") {
            Some(Value::Array(items)) => {
                Some(items.iter().filter_map(FaceItem::from_value).collect())
            }
            _ => object
                .get("face")
                .and_then(FaceItem::from_value)
                .map(|item| vec![item]),
        };

        let vehicle_classifications = match object.get("vehicle_classifications") {
            Some(v) => classification_map(v, VehicleClassification::from_value),
            None => object
                .get("vehicle")
                .and_then(VehicleClassification::from_value)
                .map(|item| BTreeMap::from([(LEGACY_KEY.to_string(), item)])),
        };

        let pet_classifications = match object.get("pet_classifications") {
            Some(v) => classification_map(v, PetClassification::from_value),
            None => object
                .get("pet")
                .and_then(PetClassification::from_value)
                .map(|item| BTreeMap::from([(LEGACY_KEY.to_string(), item)])),
        };

        Ok(Self {
            license_plates,
            faces,
            vehicle_classifications,
            pet_classifications,
            violence: object.get("violence").and_then(ViolenceDetection::from_value),
            image_quality: object.get("image_quality").and_then(ImageQuality::from_value),
            processing_time_ms: object.get("processing_time_ms").and_then(Value::as_f64),
            extra: take_extra(object, KNOWN_KEYS),
        })
    }

    /// Serialize back to the canonical (normalized) JSON form
    pub fn to_value(&self) -> Value {
        let mut object = self.extra.clone();
        if let Some(plates) = &self.license_plates {
            object.insert(
                "license_plates".into(),
                Value::Array(plates.iter().map(LicensePlateItem::to_value).collect()),
            );
        }
        if let Some(faces) = &self.faces {
            object.insert(
                "faces".into(),
                Value::Array(faces.iter().map(FaceItem::to_value).collect()),
            );
        }
        if let Some(vehicles) = &self.vehicle_classifications {
            object.insert(
                "vehicle_classifications".into(),
                Value::Object(
                    vehicles
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_value()))
                        .collect(),
                ),
            );
        }
        if let Some(pets) = &self.pet_classifications {
            object.insert(
                "pet_classifications".into(),
                Value::Object(pets.iter().map(|(k, v)| (k.clone(), v.to_value())).collect()),
            );
        }
        if let Some(violence) = &self.violence {
            object.insert("violence".into(), violence.to_value());
        }
        if let Some(quality) = &self.image_quality {
            object.insert("image_quality".into(), quality.to_value());
        }
        if let Some(ms) = self.processing_time_ms {
            object.insert("processing_time_ms".into(), serde_json::json!(ms));
        }
        Value::Object(object)
    }

    /// Whether the map carries no recognized or unknown signals
    pub fn is_empty(&self) -> bool {
        self.license_plates.is_none()
            && self.faces.is_none()
            && self.vehicle_classifications.is_none()
            && self.pet_classifications.is_none()
            && self.violence.is_none()
            && self.image_quality.is_none()
            && self.processing_time_ms.is_none()
            && self.extra.is_empty()
    }
}

impl Serialize for EnrichmentData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EnrichmentData {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        EnrichmentData::from_value(&value).map_err(serde::de::Error::custom)
    }
}
