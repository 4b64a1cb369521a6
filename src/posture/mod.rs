// src/posture/mod.rs
//
// Landmarks → PostureVerdict.
//
//   Landmarks ─→ [head_lowered, neck_extended, shoulders_uneven, torso_leaning] ─→ OR ─→ PostureVerdict
//
// Each rule is a pure function over landmarks + thresholds; the classifier
// runs the registered list in order.

pub mod calibration;
pub mod classifier;
pub mod rules;

pub use calibration::{CalibrationResult, PostureCalibrator};
pub use classifier::{PostureClassifier, PostureVerdict};
pub use rules::{default_rules, PostureRule, RuleOutcome};
