//! Database schema definitions for Turso storage
//!
//! Timestamps are stored as INTEGER milliseconds since epoch so soft-delete
//! window comparisons keep sub-second precision. JSON payloads (enrichment
//! maps, legacy detection id lists, labels) are TEXT holding JSON.

/// SQL to create the cameras table
pub const CREATE_CAMERAS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS cameras (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    folder_path TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    created_at INTEGER NOT NULL,
    deleted_at INTEGER
)
"#;

/// folder_path is unique among live rows only; tombstoned cameras may keep
/// theirs so a re-registered camera can reuse the path
pub const CREATE_CAMERAS_FOLDER_PATH_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_cameras_folder_path_live
ON cameras(folder_path) WHERE deleted_at IS NULL
"#;

/// SQL to create the detections table
pub const CREATE_DETECTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS detections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    camera_id TEXT NOT NULL REFERENCES cameras(id) ON DELETE CASCADE,
    file_path TEXT NOT NULL,
    file_type TEXT,
    detected_at INTEGER NOT NULL,
    object_type TEXT,
    confidence REAL,
    bbox_x REAL,
    bbox_y REAL,
    bbox_width REAL,
    bbox_height REAL,
    thumbnail_path TEXT,
    media_type TEXT,
    duration REAL,
    video_codec TEXT,
    video_width INTEGER,
    video_height INTEGER,
    track_id INTEGER,
    track_confidence REAL,
    enrichment_data TEXT,
    labels TEXT,
    deleted_at INTEGER,
    CHECK (confidence IS NULL OR (confidence >= 0.0 AND confidence <= 1.0)),
    CHECK (track_confidence IS NULL OR (track_confidence >= 0.0 AND track_confidence <= 1.0)),
    CHECK (media_type IS NULL OR media_type IN ('image', 'video'))
)
"#;

pub const CREATE_DETECTIONS_CAMERA_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_detections_camera_id
ON detections(camera_id)
"#;

pub const CREATE_DETECTIONS_TIME_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_detections_detected_at
ON detections(detected_at)
"#;

pub const CREATE_DETECTIONS_CAMERA_TIME_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_detections_camera_time
ON detections(camera_id, detected_at)
"#;

pub const CREATE_DETECTIONS_OBJECT_TIME_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_detections_object_time
ON detections(object_type, detected_at)
"#;

pub const CREATE_DETECTIONS_TRACK_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_detections_track_id
ON detections(track_id)
"#;

/// SQL to create the events table
///
/// `detection_ids` is the legacy denormalized list; the event_detections
/// junction is authoritative.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id TEXT NOT NULL,
    camera_id TEXT NOT NULL REFERENCES cameras(id) ON DELETE CASCADE,
    started_at INTEGER NOT NULL,
    ended_at INTEGER NOT NULL,
    risk_score INTEGER NOT NULL DEFAULT 50,
    risk_level TEXT NOT NULL DEFAULT 'medium',
    summary TEXT NOT NULL DEFAULT '',
    reasoning TEXT NOT NULL DEFAULT '',
    reviewed INTEGER NOT NULL DEFAULT 0,
    is_fast_path INTEGER NOT NULL DEFAULT 0,
    llm_prompt TEXT,
    detection_ids TEXT NOT NULL DEFAULT '[]',
    deleted_at INTEGER,
    CHECK (risk_score >= 0 AND risk_score <= 100),
    CHECK (risk_level IN ('low', 'medium', 'high', 'critical'))
)
"#;

/// batch_id uniquely identifies a live event; this is the idempotency key
pub const CREATE_EVENTS_BATCH_ID_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_events_batch_id_live
ON events(batch_id) WHERE deleted_at IS NULL
"#;

pub const CREATE_EVENTS_CAMERA_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_events_camera_id
ON events(camera_id)
"#;

pub const CREATE_EVENTS_STARTED_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_events_started_at
ON events(started_at DESC)
"#;

/// SQL to create the event-detection junction table
pub const CREATE_EVENT_DETECTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS event_detections (
    event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    detection_id INTEGER NOT NULL REFERENCES detections(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (event_id, detection_id)
)
"#;

pub const CREATE_EVENT_DETECTIONS_DETECTION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_event_detections_detection_id
ON event_detections(detection_id)
"#;

/// SQL to create the zones table
pub const CREATE_ZONES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS zones (
    id TEXT PRIMARY KEY NOT NULL,
    camera_id TEXT NOT NULL REFERENCES cameras(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    zone_type TEXT NOT NULL DEFAULT 'other',
    CHECK (zone_type IN ('entry_point', 'driveway', 'sidewalk', 'yard', 'other'))
)
"#;

/// SQL to create the activity baselines table
pub const CREATE_ACTIVITY_BASELINES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS activity_baselines (
    camera_id TEXT NOT NULL REFERENCES cameras(id) ON DELETE CASCADE,
    hour_of_day INTEGER NOT NULL,
    object_type TEXT NOT NULL,
    expected_count REAL NOT NULL DEFAULT 0.0,
    PRIMARY KEY (camera_id, hour_of_day, object_type),
    CHECK (hour_of_day >= 0 AND hour_of_day <= 23)
)
"#;

/// SQL to create the pose results table (enrichment child, 1:1)
pub const CREATE_POSE_RESULTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pose_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    detection_id INTEGER NOT NULL UNIQUE REFERENCES detections(id) ON DELETE CASCADE,
    keypoints TEXT,
    pose_class TEXT,
    confidence REAL,
    is_suspicious INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    CHECK (confidence IS NULL OR (confidence >= 0.0 AND confidence <= 1.0)),
    CHECK (pose_class IS NULL OR pose_class IN
        ('standing', 'crouching', 'bending_over', 'arms_raised', 'sitting', 'lying_down', 'unknown'))
)
"#;

/// SQL to create the threat detections table (enrichment child, 1:N)
pub const CREATE_THREAT_DETECTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS threat_detections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    detection_id INTEGER NOT NULL REFERENCES detections(id) ON DELETE CASCADE,
    threat_type TEXT NOT NULL,
    confidence REAL NOT NULL,
    severity TEXT NOT NULL,
    bbox TEXT,
    created_at INTEGER NOT NULL,
    CHECK (confidence >= 0.0 AND confidence <= 1.0),
    CHECK (severity IN ('critical', 'high', 'medium', 'low')),
    CHECK (threat_type IN ('gun', 'knife', 'grenade', 'explosive', 'weapon', 'other'))
)
"#;

/// SQL to create the demographics results table (enrichment child, 1:N)
pub const CREATE_DEMOGRAPHICS_RESULTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS demographics_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    detection_id INTEGER NOT NULL REFERENCES detections(id) ON DELETE CASCADE,
    age_group TEXT,
    gender TEXT,
    confidence REAL,
    created_at INTEGER NOT NULL,
    CHECK (confidence IS NULL OR (confidence >= 0.0 AND confidence <= 1.0)),
    CHECK (age_group IS NULL OR age_group IN ('child', 'teen', 'adult', 'senior', 'unknown'))
)
"#;

/// SQL to create the re-id embeddings table (enrichment child, 1:N)
pub const CREATE_REID_EMBEDDINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS reid_embeddings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    detection_id INTEGER NOT NULL REFERENCES detections(id) ON DELETE CASCADE,
    entity_kind TEXT NOT NULL,
    embedding TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    CHECK (entity_kind IN ('person', 'vehicle'))
)
"#;

/// SQL to create the action results table (enrichment child, 1:N)
pub const CREATE_ACTION_RESULTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS action_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    detection_id INTEGER NOT NULL REFERENCES detections(id) ON DELETE CASCADE,
    action_class TEXT NOT NULL,
    confidence REAL,
    created_at INTEGER NOT NULL,
    CHECK (confidence IS NULL OR (confidence >= 0.0 AND confidence <= 1.0))
)
"#;

/// Every statement run by schema initialization, in dependency order
pub const ALL_STATEMENTS: &[&str] = &[
    CREATE_CAMERAS_TABLE,
    CREATE_CAMERAS_FOLDER_PATH_INDEX,
    CREATE_DETECTIONS_TABLE,
    CREATE_DETECTIONS_CAMERA_INDEX,
    CREATE_DETECTIONS_TIME_INDEX,
    CREATE_DETECTIONS_CAMERA_TIME_INDEX,
    CREATE_DETECTIONS_OBJECT_TIME_INDEX,
    CREATE_DETECTIONS_TRACK_INDEX,
    CREATE_EVENTS_TABLE,
    CREATE_EVENTS_BATCH_ID_INDEX,
    CREATE_EVENTS_CAMERA_INDEX,
    CREATE_EVENTS_STARTED_INDEX,
    CREATE_EVENT_DETECTIONS_TABLE,
    CREATE_EVENT_DETECTIONS_DETECTION_INDEX,
    CREATE_ZONES_TABLE,
    CREATE_ACTIVITY_BASELINES_TABLE,
    CREATE_POSE_RESULTS_TABLE,
    CREATE_THREAT_DETECTIONS_TABLE,
    CREATE_DEMOGRAPHICS_RESULTS_TABLE,
    CREATE_REID_EMBEDDINGS_TABLE,
    CREATE_ACTION_RESULTS_TABLE,
];
