// src/posture/calibration.rs
//
// Derives per-child thresholds from a short session of "good" posture:
// threshold = mean(metric) + margin.

use super::classifier::PostureVerdict;
use super::rules::{METRIC_NECK_ANGLE, METRIC_NOSE_DROP};
use crate::types::PostureConfig;
use anyhow::{bail, Result};
use serde::Serialize;
use tracing::info;

pub const DEFAULT_TARGET_SAMPLES: usize = 30;
pub const DEFAULT_NOSE_MARGIN: f32 = 0.03;
pub const DEFAULT_ANGLE_MARGIN: f32 = 5.0;

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationResult {
    pub samples: usize,
    pub avg_nose_drop: f32,
    pub avg_neck_angle: f32,
    pub nose_drop: f32,
    pub neck_angle: f32,
}

impl CalibrationResult {
    pub fn apply(&self, config: &mut PostureConfig) {
        config.nose_drop = self.nose_drop;
        config.neck_angle = self.neck_angle;
        config.calibrated = true;
    }
}

pub struct PostureCalibrator {
    target_samples: usize,
    nose_margin: f32,
    angle_margin: f32,
    drops: Vec<f32>,
    angles: Vec<f32>,
}

impl PostureCalibrator {
    pub fn new(target_samples: usize, nose_margin: f32, angle_margin: f32) -> Self {
        Self {
            target_samples: target_samples.max(1),
            nose_margin,
            angle_margin,
            drops: Vec::with_capacity(target_samples),
            angles: Vec::with_capacity(target_samples),
        }
    }

    /// Records a verdict if it carries both metrics. Returns true once enough
    /// samples are in.
    pub fn add(&mut self, verdict: &PostureVerdict) -> bool {
        if let (Some(drop), Some(angle)) = (
            verdict.metric(METRIC_NOSE_DROP),
            verdict.metric(METRIC_NECK_ANGLE),
        ) {
            if !self.is_complete() {
                self.drops.push(drop);
                self.angles.push(angle);
                info!(
                    "Sample #{} nose_drop={:.3} neck_angle={:.1}",
                    self.drops.len(),
                    drop,
                    angle
                );
            }
        }
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.drops.len() >= self.target_samples
    }

    pub fn sample_count(&self) -> usize {
        self.drops.len()
    }

    pub fn finish(&self) -> Result<CalibrationResult> {
        if self.drops.is_empty() {
            bail!("No valid posture samples collected; ensure subject is in frame with shoulders visible");
        }
        let avg_nose_drop = mean(&self.drops);
        let avg_neck_angle = mean(&self.angles);
        Ok(CalibrationResult {
            samples: self.drops.len(),
            avg_nose_drop,
            avg_neck_angle,
            nose_drop: avg_nose_drop + self.nose_margin,
            neck_angle: avg_neck_angle + self.angle_margin,
        })
    }
}

impl Default for PostureCalibrator {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_SAMPLES, DEFAULT_NOSE_MARGIN, DEFAULT_ANGLE_MARGIN)
    }
}

fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len() as f32
}
