// src/pipeline/metrics.rs
//
// Per-session counters. Cloned handles share the same atomics so the
// runner can report while the session owns the original.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub faces_resolved: Arc<AtomicU64>,
    pub unknown_faces: Arc<AtomicU64>,
    pub faces_filtered: Arc<AtomicU64>,
    pub monitored_frames: Arc<AtomicU64>,
    pub grace_frames: Arc<AtomicU64>,
    pub posture_samples: Arc<AtomicU64>,
    pub bad_samples: Arc<AtomicU64>,
    pub alerts_opened: Arc<AtomicU64>,
    pub alerts_closed: Arc<AtomicU64>,
    pub captures: Arc<AtomicU64>,
    pub sink_failures: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            faces_resolved: Arc::new(AtomicU64::new(0)),
            unknown_faces: Arc::new(AtomicU64::new(0)),
            faces_filtered: Arc::new(AtomicU64::new(0)),
            monitored_frames: Arc::new(AtomicU64::new(0)),
            grace_frames: Arc::new(AtomicU64::new(0)),
            posture_samples: Arc::new(AtomicU64::new(0)),
            bad_samples: Arc::new(AtomicU64::new(0)),
            alerts_opened: Arc::new(AtomicU64::new(0)),
            alerts_closed: Arc::new(AtomicU64::new(0)),
            captures: Arc::new(AtomicU64::new(0)),
            sink_failures: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.get(&self.total_frames),
            fps: self.fps(),
            faces_resolved: self.get(&self.faces_resolved),
            unknown_faces: self.get(&self.unknown_faces),
            faces_filtered: self.get(&self.faces_filtered),
            monitored_frames: self.get(&self.monitored_frames),
            grace_frames: self.get(&self.grace_frames),
            posture_samples: self.get(&self.posture_samples),
            bad_samples: self.get(&self.bad_samples),
            alerts_opened: self.get(&self.alerts_opened),
            alerts_closed: self.get(&self.alerts_closed),
            captures: self.get(&self.captures),
            sink_failures: self.get(&self.sink_failures),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub faces_resolved: u64,
    pub unknown_faces: u64,
    pub faces_filtered: u64,
    pub monitored_frames: u64,
    pub grace_frames: u64,
    pub posture_samples: u64,
    pub bad_samples: u64,
    pub alerts_opened: u64,
    pub alerts_closed: u64,
    pub captures: u64,
    pub sink_failures: u64,
    pub elapsed_secs: f64,
}
