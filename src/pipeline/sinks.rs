// src/pipeline/sinks.rs
//
// Collaborator boundary. The core hands finished records, alert transitions
// and approved images across these traits and never retries; durability is
// the sink's contract.

use crate::types::{CaptureCategory, CaptureConfig, FrameImage};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceSightingRecord {
    pub id: Uuid,
    pub frame_id: u64,
    pub identity: String,
    pub group_tag: String,
    pub face_distance: Option<f32>,
    pub frame_path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostureRecord {
    pub id: Uuid,
    pub frame_id: u64,
    pub identity: String,
    pub is_bad: bool,
    pub metrics: BTreeMap<String, f32>,
    /// Fired rule ids joined with ", "
    pub reasons: String,
    pub face_distance: Option<f32>,
    pub frame_path: Option<String>,
    pub face_sighting_id: Option<Uuid>,
    pub alert_active: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersistedEvent {
    FaceSighting(FaceSightingRecord),
    Posture(PostureRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Opened,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertNotification {
    pub kind: AlertKind,
    pub identity: String,
    pub reasons: Vec<String>,
    pub elapsed_seconds: f64,
    pub bad_ratio: f32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub identity: String,
    pub category: CaptureCategory,
    pub frame_id: u64,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// TRAITS
// ============================================================================

pub trait StorageSink: Send {
    fn write(&mut self, event: &PersistedEvent) -> Result<()>;
}

pub trait AlertSink: Send {
    fn notify(&mut self, alert: &AlertNotification) -> Result<()>;
}

pub trait ImageWriter: Send {
    /// Persists the frame and returns a reference (path) to it
    fn write(&mut self, image: &FrameImage, request: &CaptureRequest) -> Result<String>;
}

// ============================================================================
// IMPLEMENTATIONS
// ============================================================================

/// Appends one JSON object per event to a file
pub struct JsonlStorage {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Unable to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Unable to open event log {}", path.display()))?;
        info!("🗄️  Writing events to {}", path.display());
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageSink for JsonlStorage {
    fn write(&mut self, event: &PersistedEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Surfaces alert transitions in the log; sound/push notifiers implement
/// the same trait.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&mut self, alert: &AlertNotification) -> Result<()> {
        match alert.kind {
            AlertKind::Opened => warn!(
                "🔔 ALERT {}: bad posture for {:.0}s ({})",
                alert.identity,
                alert.elapsed_seconds,
                alert.reasons.join(", ")
            ),
            AlertKind::Closed => info!(
                "🔕 Alert cleared for {} after {:.0}s",
                alert.identity, alert.elapsed_seconds
            ),
        }
        Ok(())
    }
}

/// Writes JPEGs under `<root>/<category>/<date>/<identity>_<time>.jpg`
pub struct JpegImageWriter {
    root: PathBuf,
    date_folder_format: String,
    time_format: String,
    quality: u8,
}

impl JpegImageWriter {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            root: config.root.clone(),
            date_folder_format: config.date_folder_format.clone(),
            time_format: config.time_format.clone(),
            quality: 85,
        }
    }

    pub fn target_path(&self, request: &CaptureRequest) -> PathBuf {
        let date = request.timestamp.format(&self.date_folder_format).to_string();
        let time = request.timestamp.format(&self.time_format).to_string();
        let filename = format!(
            "{}_{}_{}.jpg",
            safe_identity(&request.identity),
            time,
            request.frame_id
        );
        self.root
            .join(request.category.as_str())
            .join(date)
            .join(filename)
    }
}

impl ImageWriter for JpegImageWriter {
    fn write(&mut self, image: &FrameImage, request: &CaptureRequest) -> Result<String> {
        let jpeg = encode_rgb_to_jpeg(image, self.quality)?;
        let path = self.target_path(request);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Unable to create {}", parent.display()))?;
        }
        fs::write(&path, jpeg)
            .with_context(|| format!("Unable to save snapshot at {}", path.display()))?;
        info!("📸 Saved snapshot for {} to {}", request.identity, path.display());
        Ok(path.to_string_lossy().into_owned())
    }
}

/// `child/alice` → `child_alice`; anything outside [A-Za-z0-9_-] becomes `_`
pub fn safe_identity(identity: &str) -> String {
    let cleaned: String = identity
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

fn encode_rgb_to_jpeg(image: &FrameImage, quality: u8) -> Result<Vec<u8>> {
    use image::codecs::jpeg::JpegEncoder;
    use image::ColorType;

    let expected_len = image.width * image.height * 3;
    if image.width == 0 || image.height == 0 || image.data.len() < expected_len {
        bail!(
            "Frame buffer too small: {} bytes for {}x{} RGB",
            image.data.len(),
            image.width,
            image.height
        );
    }

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode(
        &image.data[..expected_len],
        image.width as u32,
        image.height as u32,
        ColorType::Rgb8,
    )?;
    Ok(buf)
}
