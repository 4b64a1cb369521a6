// src/posture/rules.rs

use crate::types::{Keypoint, LandmarkPoint, Landmarks, PostureConfig};

// ============================================================================
// METRIC NAMES
// ============================================================================
pub const METRIC_NOSE_DROP: &str = "nose_drop";
pub const METRIC_NECK_ANGLE: &str = "neck_angle";
pub const METRIC_SHOULDER_TILT: &str = "shoulder_tilt";
pub const METRIC_TORSO_LEAN: &str = "torso_lean";

/// Result of one rule on one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleOutcome {
    pub metric: &'static str,
    pub value: f32,
    pub fired: bool,
}

/// A named posture check. `None` from `evaluate` means the keypoints it
/// needs were missing; the rule is skipped, not fired.
#[derive(Clone, Copy)]
pub struct PostureRule {
    pub id: &'static str,
    pub evaluate: fn(&Landmarks, &PostureConfig) -> Option<RuleOutcome>,
}

impl std::fmt::Debug for PostureRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostureRule").field("id", &self.id).finish()
    }
}

/// Evaluation order is reporting order for reasons
pub fn default_rules() -> Vec<PostureRule> {
    vec![
        PostureRule {
            id: "head_lowered",
            evaluate: head_drop,
        },
        PostureRule {
            id: "neck_extended",
            evaluate: neck_angle,
        },
        PostureRule {
            id: "shoulders_uneven",
            evaluate: shoulder_tilt,
        },
        PostureRule {
            id: "torso_leaning",
            evaluate: torso_lean,
        },
    ]
}

/// nose.y − mean(shoulder.y); positive when the head sinks toward the shoulders
pub fn head_drop(landmarks: &Landmarks, config: &PostureConfig) -> Option<RuleOutcome> {
    let nose = landmarks.get(Keypoint::Nose, config.min_visibility)?;
    let shoulders = shoulder_mid(landmarks, config)?;
    let value = nose.y - shoulders.y;
    Some(RuleOutcome {
        metric: METRIC_NOSE_DROP,
        value,
        fired: value > config.nose_drop,
    })
}

/// Angle between shoulder-mid→nose and the torso's upward axis, degrees.
/// Falls back to image vertical when hips are not visible.
pub fn neck_angle(landmarks: &Landmarks, config: &PostureConfig) -> Option<RuleOutcome> {
    let nose = landmarks.get(Keypoint::Nose, config.min_visibility)?;
    let shoulders = shoulder_mid(landmarks, config)?;
    let neck = (nose.x - shoulders.x, nose.y - shoulders.y);
    let up = match hip_mid(landmarks, config) {
        Some(hips) => (shoulders.x - hips.x, shoulders.y - hips.y),
        None => (0.0, -1.0),
    };
    let value = angle_between(neck, up)?;
    Some(RuleOutcome {
        metric: METRIC_NECK_ANGLE,
        value,
        fired: value > config.neck_angle,
    })
}

/// Shoulder line vs horizontal, degrees
pub fn shoulder_tilt(landmarks: &Landmarks, config: &PostureConfig) -> Option<RuleOutcome> {
    let left = landmarks.get(Keypoint::LeftShoulder, config.min_visibility)?;
    let right = landmarks.get(Keypoint::RightShoulder, config.min_visibility)?;
    let dx = (left.x - right.x).abs();
    let dy = (left.y - right.y).abs();
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    let value = dy.atan2(dx).to_degrees();
    Some(RuleOutcome {
        metric: METRIC_SHOULDER_TILT,
        value,
        fired: config.shoulder_tilt.is_some_and(|t| value > t),
    })
}

/// Hip-mid→shoulder-mid vs image vertical, degrees
pub fn torso_lean(landmarks: &Landmarks, config: &PostureConfig) -> Option<RuleOutcome> {
    let shoulders = shoulder_mid(landmarks, config)?;
    let hips = hip_mid(landmarks, config)?;
    let value = angle_between((shoulders.x - hips.x, shoulders.y - hips.y), (0.0, -1.0))?;
    Some(RuleOutcome {
        metric: METRIC_TORSO_LEAN,
        value,
        fired: config.torso_lean.is_some_and(|t| value > t),
    })
}

fn shoulder_mid(landmarks: &Landmarks, config: &PostureConfig) -> Option<LandmarkPoint> {
    let left = landmarks.get(Keypoint::LeftShoulder, config.min_visibility)?;
    let right = landmarks.get(Keypoint::RightShoulder, config.min_visibility)?;
    Some(LandmarkPoint::midpoint(&left, &right))
}

fn hip_mid(landmarks: &Landmarks, config: &PostureConfig) -> Option<LandmarkPoint> {
    let left = landmarks.get(Keypoint::LeftHip, config.min_visibility)?;
    let right = landmarks.get(Keypoint::RightHip, config.min_visibility)?;
    Some(LandmarkPoint::midpoint(&left, &right))
}

fn angle_between(a: (f32, f32), b: (f32, f32)) -> Option<f32> {
    let denom = (a.0.hypot(a.1)) * (b.0.hypot(b.1));
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    let cos = ((a.0 * b.0 + a.1 * b.1) / denom).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upright() -> Landmarks {
        Landmarks::new()
            .with(Keypoint::Nose, 0.50, 0.30)
            .with(Keypoint::LeftShoulder, 0.60, 0.50)
            .with(Keypoint::RightShoulder, 0.40, 0.50)
            .with(Keypoint::LeftHip, 0.58, 0.90)
            .with(Keypoint::RightHip, 0.42, 0.90)
    }

    #[test]
    fn test_head_drop_metric() {
        let config = PostureConfig::default();
        let outcome = head_drop(&upright(), &config).unwrap();
        assert!((outcome.value + 0.20).abs() < 1e-6);
        assert!(!outcome.fired);

        let slumped = upright().with(Keypoint::Nose, 0.50, 0.65);
        let outcome = head_drop(&slumped, &config).unwrap();
        assert!((outcome.value - 0.15).abs() < 1e-6);
        assert!(outcome.fired);
    }

    #[test]
    fn test_neck_angle_upright_is_small() {
        let outcome = neck_angle(&upright(), &PostureConfig::default()).unwrap();
        assert!(outcome.value < 1.0);
        assert!(!outcome.fired);
    }

    #[test]
    fn test_neck_angle_forward_head_fires() {
        // Nose level with the shoulders, far to the side: 90°
        let forward = upright().with(Keypoint::Nose, 0.80, 0.50);
        let outcome = neck_angle(&forward, &PostureConfig::default()).unwrap();
        assert!((outcome.value - 90.0).abs() < 0.5);
        assert!(outcome.fired);
    }

    #[test]
    fn test_neck_angle_without_hips_uses_vertical() {
        let mut landmarks = upright().with(Keypoint::Nose, 0.70, 0.30);
        landmarks.points.remove(&Keypoint::LeftHip);
        let outcome = neck_angle(&landmarks, &PostureConfig::default()).unwrap();
        // atan(0.2 / 0.2) = 45°
        assert!((outcome.value - 45.0).abs() < 0.5);
    }

    #[test]
    fn test_missing_keypoints_skip_rule() {
        let config = PostureConfig::default();
        let no_nose = Landmarks::new()
            .with(Keypoint::LeftShoulder, 0.6, 0.5)
            .with(Keypoint::RightShoulder, 0.4, 0.5);
        assert!(head_drop(&no_nose, &config).is_none());
        assert!(neck_angle(&no_nose, &config).is_none());
        assert!(torso_lean(&no_nose, &config).is_none());
        assert!(shoulder_tilt(&no_nose, &config).is_some());
    }

    #[test]
    fn test_optional_rules_need_threshold_to_fire() {
        let tilted = upright().with(Keypoint::LeftShoulder, 0.60, 0.70);
        let outcome = shoulder_tilt(&tilted, &PostureConfig::default()).unwrap();
        assert!(outcome.value > 40.0);
        assert!(!outcome.fired);

        let config = PostureConfig {
            shoulder_tilt: Some(15.0),
            ..PostureConfig::default()
        };
        assert!(shoulder_tilt(&tilted, &config).unwrap().fired);
    }

    #[test]
    fn test_torso_lean_angle() {
        let leaning = upright()
            .with(Keypoint::LeftShoulder, 0.90, 0.50)
            .with(Keypoint::RightShoulder, 0.70, 0.50);
        let config = PostureConfig {
            torso_lean: Some(20.0),
            ..PostureConfig::default()
        };
        // shoulder-mid (0.8, 0.5), hip-mid (0.5, 0.9): atan(0.3/0.4) ≈ 36.9°
        let outcome = torso_lean(&leaning, &config).unwrap();
        assert!((outcome.value - 36.87).abs() < 0.1);
        assert!(outcome.fired);
    }
}
