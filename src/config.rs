// src/config.rs

use crate::types::{
    CaptureCategory, CaptureConfig, Config, LoggingConfig, MonitoringConfig, PostureConfig,
    RecognitionConfig, SmoothingConfig, SourceConfig, StorageConfig,
};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Missing configuration at {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = serde_yaml::to_string(self)?;
        fs::write(path, contents)
            .with_context(|| format!("Unable to write configuration to {}", path.display()))?;
        Ok(())
    }

    /// Rejects snapshots the monitoring core cannot run with.
    /// Called once at session start; processing never begins on error.
    pub fn validate(&self) -> Result<()> {
        let r = &self.recognition;
        if !(r.tolerance > 0.0 && r.tolerance <= 2.0) {
            bail!("recognition.tolerance must be in (0, 2], got {}", r.tolerance);
        }
        if !(r.min_face_area_ratio >= 0.0 && r.min_face_area_ratio < 1.0) {
            bail!(
                "recognition.min_face_area_ratio must be in [0, 1), got {}",
                r.min_face_area_ratio
            );
        }

        let m = &self.monitoring;
        if !(m.grace_seconds >= 0.0 && m.grace_seconds.is_finite()) {
            bail!("monitoring.grace_seconds must be >= 0, got {}", m.grace_seconds);
        }

        let p = &self.posture;
        if !p.nose_drop.is_finite() {
            bail!("posture.nose_drop must be finite");
        }
        if !(p.neck_angle > 0.0 && p.neck_angle <= 180.0) {
            bail!("posture.neck_angle must be in (0, 180], got {}", p.neck_angle);
        }
        for (name, value) in [("shoulder_tilt", p.shoulder_tilt), ("torso_lean", p.torso_lean)] {
            if let Some(v) = value {
                if !(v > 0.0 && v <= 90.0) {
                    bail!("posture.{} must be in (0, 90], got {}", name, v);
                }
            }
        }
        if !(0.0..=1.0).contains(&p.min_visibility) {
            bail!("posture.min_visibility must be in [0, 1], got {}", p.min_visibility);
        }

        let s = &self.smoothing;
        if s.window_size == 0 {
            bail!("smoothing.window_size must be at least 1");
        }
        if !(s.open_ratio > 0.0 && s.open_ratio <= 1.0) {
            bail!("smoothing.open_ratio must be in (0, 1], got {}", s.open_ratio);
        }
        if let Some(clear) = s.clear_ratio {
            if !(clear > 0.0 && clear <= s.open_ratio) {
                bail!(
                    "smoothing.clear_ratio must be in (0, open_ratio={}], got {}",
                    s.open_ratio,
                    clear
                );
            }
        }
        if !(s.min_duration_seconds >= 0.0 && s.min_duration_seconds.is_finite()) {
            bail!(
                "smoothing.min_duration_seconds must be >= 0, got {}",
                s.min_duration_seconds
            );
        }
        if !(s.max_sample_gap_seconds > 0.0) {
            bail!(
                "smoothing.max_sample_gap_seconds must be > 0, got {}",
                s.max_sample_gap_seconds
            );
        }

        let c = &self.capture;
        if !(c.interval_seconds >= 0.0 && c.interval_seconds.is_finite()) {
            bail!("capture.interval_seconds must be >= 0, got {}", c.interval_seconds);
        }

        if self.source.target_fps < 0.0 {
            bail!("source.target_fps must be >= 0, got {}", self.source.target_fps);
        }

        Ok(())
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.55,
            min_face_area_ratio: 0.01,
            gallery_dir: "data/known".into(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            groups: vec!["child".to_string()],
            identities: Vec::new(),
            grace_seconds: 5.0,
            filtered_face_refreshes_grace: false,
        }
    }
}

impl Default for PostureConfig {
    fn default() -> Self {
        Self {
            nose_drop: 0.12,
            neck_angle: 45.0,
            shoulder_tilt: None,
            torso_lean: None,
            min_visibility: 0.5,
            calibrated: false,
            require_calibration: false,
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            open_ratio: 0.8,
            clear_ratio: None,
            min_duration_seconds: 10.0,
            max_sample_gap_seconds: 5.0,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 30.0,
            bypass: vec![CaptureCategory::Unknown],
            groups: Vec::new(),
            identities: Vec::new(),
            root: "data/captures".into(),
            date_folder_format: "%m%d".to_string(),
            time_format: "%H%M%S".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            events_path: "data/events.jsonl".into(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            replay_path: "data/frames.jsonl".into(),
            target_fps: 0.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "study_guardian=info".to_string(),
        }
    }
}
