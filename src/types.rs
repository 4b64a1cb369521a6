// src/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const UNKNOWN_IDENTITY: &str = "unknown";

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recognition: RecognitionConfig,
    pub monitoring: MonitoringConfig,
    pub posture: PostureConfig,
    pub smoothing: SmoothingConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
    pub source: SourceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub tolerance: f32,
    pub min_face_area_ratio: f32,
    pub gallery_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub groups: Vec<String>,
    pub identities: Vec<String>,
    pub grace_seconds: f64,
    /// When set, a face dropped by the area filter keeps an active grace window alive
    pub filtered_face_refreshes_grace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostureConfig {
    pub nose_drop: f32,
    pub neck_angle: f32,
    pub shoulder_tilt: Option<f32>,
    pub torso_lean: Option<f32>,
    pub min_visibility: f32,
    pub calibrated: bool,
    /// Refuse to start a session until calibration has run
    pub require_calibration: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub window_size: usize,
    pub open_ratio: f32,
    /// `None` closes at the same ratio the alert opened at
    pub clear_ratio: Option<f32>,
    pub min_duration_seconds: f64,
    pub max_sample_gap_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub enabled: bool,
    pub interval_seconds: f64,
    pub bypass: Vec<CaptureCategory>,
    pub groups: Vec<String>,
    pub identities: Vec<String>,
    pub root: PathBuf,
    pub date_folder_format: String,
    pub time_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub events_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub replay_path: PathBuf,
    /// 0 disables pacing
    pub target_fps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

/// Why an image is being persisted; some categories may skip the rate limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureCategory {
    /// Ordinary sighting of a recognized person
    Routine,
    /// Sighting of an unrecognized face
    Unknown,
    /// Bad posture sample while a sustained alert is open
    AlertPosture,
}

impl CaptureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::Unknown => "unknown",
            Self::AlertPosture => "alert_posture",
        }
    }
}

// ============================================================================
// FRAME INPUT
// ============================================================================

/// Pose keypoints the posture rules know about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keypoint {
    Nose,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftHip,
    RightHip,
}

/// Normalized image coordinates (0..1, y grows downward)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub visibility: Option<f32>,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            visibility: None,
        }
    }

    pub fn midpoint(a: &LandmarkPoint, b: &LandmarkPoint) -> LandmarkPoint {
        LandmarkPoint::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Landmarks {
    pub points: BTreeMap<Keypoint, LandmarkPoint>,
}

impl Landmarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, keypoint: Keypoint, x: f32, y: f32) -> Self {
        self.points.insert(keypoint, LandmarkPoint::new(x, y));
        self
    }

    /// Returns the keypoint only if it is present and visible enough to trust
    pub fn get(&self, keypoint: Keypoint, min_visibility: f32) -> Option<LandmarkPoint> {
        let point = self.points.get(&keypoint)?;
        match point.visibility {
            Some(v) if v < min_visibility => None,
            _ if !point.x.is_finite() || !point.y.is_finite() => None,
            _ => Some(*point),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Face bounding box in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub embedding: Vec<f32>,
    pub bbox: BoundingBox,
}

/// Decoded RGB8 frame pixels
#[derive(Debug, Clone)]
pub struct FrameImage {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

/// One frame as delivered by the ingestion + inference boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramePacket {
    pub frame_id: u64,
    pub timestamp: DateTime<Utc>,
    pub frame_width: u32,
    pub frame_height: u32,
    #[serde(default)]
    pub face: Option<FaceDetection>,
    #[serde(default)]
    pub landmarks: Option<Landmarks>,
    #[serde(default)]
    pub image_path: Option<PathBuf>,
    #[serde(skip)]
    pub image: Option<FrameImage>,
}

// ============================================================================
// IDENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub identity: String,
    pub group_tag: String,
    /// Lower is a more confident match
    pub face_distance: Option<f32>,
}

impl ResolvedIdentity {
    pub fn unknown(face_distance: Option<f32>) -> Self {
        Self {
            identity: UNKNOWN_IDENTITY.to_string(),
            group_tag: UNKNOWN_IDENTITY.to_string(),
            face_distance,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.identity == UNKNOWN_IDENTITY
    }
}

/// Splits `"<group>/<name>"` into its group; anything else maps to itself
pub fn group_of(identity: &str) -> &str {
    match identity.split_once('/') {
        Some((group, _)) if !group.is_empty() => group,
        _ if identity.is_empty() => UNKNOWN_IDENTITY,
        _ => identity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_of_label() {
        assert_eq!(group_of("child/alice"), "child");
        assert_eq!(group_of("parent/bob/extra"), "parent");
        assert_eq!(group_of("unknown"), "unknown");
        assert_eq!(group_of(""), "unknown");
    }

    #[test]
    fn test_low_visibility_keypoint_is_missing() {
        let mut landmarks = Landmarks::new().with(Keypoint::Nose, 0.5, 0.4);
        landmarks.points.insert(
            Keypoint::LeftShoulder,
            LandmarkPoint {
                x: 0.4,
                y: 0.6,
                visibility: Some(0.2),
            },
        );

        assert!(landmarks.get(Keypoint::Nose, 0.5).is_some());
        assert!(landmarks.get(Keypoint::LeftShoulder, 0.5).is_none());
        assert!(landmarks.get(Keypoint::LeftShoulder, 0.1).is_some());
        assert!(landmarks.get(Keypoint::RightHip, 0.0).is_none());
    }

    #[test]
    fn test_frame_packet_parses_without_optional_fields() {
        let line = r#"{"frame_id":3,"timestamp":"2024-05-01T08:00:00Z","frame_width":640,"frame_height":480}"#;
        let packet: FramePacket = serde_json::from_str(line).unwrap();
        assert_eq!(packet.frame_id, 3);
        assert!(packet.face.is_none());
        assert!(packet.landmarks.is_none());
    }

    #[test]
    fn test_landmarks_parse_from_named_map() {
        let json = r#"{"nose":{"x":0.5,"y":0.3},"left_shoulder":{"x":0.4,"y":0.5,"visibility":0.9}}"#;
        let landmarks: Landmarks = serde_json::from_str(json).unwrap();
        assert_eq!(landmarks.points.len(), 2);
        assert_eq!(landmarks.get(Keypoint::Nose, 0.5).unwrap().y, 0.3);
    }
}
