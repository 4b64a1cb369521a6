// src/pipeline/runner.rs
//
// Drives a session from a FrameSource until the stream ends or a stop is
// requested. The stop flag is only checked between frames, so a frame in
// flight always finishes and its records are emitted.

use super::metrics::MetricsSummary;
use super::session::MonitoringSession;
use super::source::FrameSource;
use crate::posture::{CalibrationResult, PostureCalibrator, PostureClassifier};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, serde::Serialize)]
pub struct RunReport {
    pub frames: u64,
    pub stopped_early: bool,
    pub deadline_misses: u64,
    pub worst_frame_ms: f64,
    pub metrics: MetricsSummary,
}

pub struct SessionRunner {
    session: MonitoringSession,
    source: Box<dyn FrameSource>,
    /// None processes frames as fast as the source yields them
    frame_budget: Option<Duration>,
    deadline_misses: u64,
    worst_case: Duration,
    frames: u64,
}

impl SessionRunner {
    pub fn new(session: MonitoringSession, source: Box<dyn FrameSource>, target_fps: f64) -> Self {
        let frame_budget = (target_fps > 0.0).then(|| Duration::from_secs_f64(1.0 / target_fps));
        Self {
            session,
            source,
            frame_budget,
            deadline_misses: 0,
            worst_case: Duration::ZERO,
            frames: 0,
        }
    }

    pub fn run(&mut self, stop: &AtomicBool) -> Result<RunReport> {
        info!("▶️  Monitoring started");
        let mut stopped_early = false;

        loop {
            if stop.load(Ordering::Relaxed) {
                info!("⏹️  Stop requested, finishing session");
                stopped_early = true;
                break;
            }

            let cycle_start = Instant::now();
            let Some(packet) = self.source.next_frame()? else {
                break;
            };

            let outcome = self.session.process_frame(packet);
            self.frames += 1;
            debug!(
                "Frame {} done (monitored={}, alert={})",
                outcome.context.frame_id,
                outcome.context.is_monitored(),
                outcome.context.alert_active
            );

            let elapsed = cycle_start.elapsed();
            if elapsed > self.worst_case {
                self.worst_case = elapsed;
            }
            if let Some(budget) = self.frame_budget {
                if elapsed > budget {
                    self.deadline_misses += 1;
                } else {
                    std::thread::sleep(budget - elapsed);
                }
            }

            if self.frames % 300 == 0 {
                let metrics = self.session.metrics();
                info!(
                    "Progress: {} frames | {:.1} FPS | {} alerts",
                    self.frames,
                    metrics.fps(),
                    metrics.get(&metrics.alerts_opened)
                );
            }
        }

        let report = self.report(stopped_early);
        info!("╔════════════════════════════════════════════════╗");
        info!("║ Session Summary                                ║");
        info!("╠════════════════════════════════════════════════╣");
        info!("║ Frames processed:  {:>6}", report.frames);
        info!("║ Posture samples:   {:>6}", report.metrics.posture_samples);
        info!("║ Bad samples:       {:>6}", report.metrics.bad_samples);
        info!("║ Alerts opened:     {:>6}", report.metrics.alerts_opened);
        info!("║ Captures:          {:>6}", report.metrics.captures);
        info!("║ Sink failures:     {:>6}", report.metrics.sink_failures);
        info!("╚════════════════════════════════════════════════╝");
        if report.deadline_misses > 0 {
            warn!(
                "⚠️  {} frames exceeded the frame budget (worst {:.1}ms)",
                report.deadline_misses, report.worst_frame_ms
            );
        }
        if let Ok(json) = serde_json::to_string(&report.metrics) {
            debug!("Metrics: {}", json);
        }
        Ok(report)
    }

    fn report(&self, stopped_early: bool) -> RunReport {
        RunReport {
            frames: self.frames,
            stopped_early,
            deadline_misses: self.deadline_misses,
            worst_frame_ms: self.worst_case.as_secs_f64() * 1000.0,
            metrics: self.session.metrics().summary(),
        }
    }

    pub fn session(&self) -> &MonitoringSession {
        &self.session
    }
}

/// Feeds landmark frames through the classifier until the calibrator has
/// enough samples, the stream ends, or a stop is requested.
pub fn run_calibration(
    source: &mut dyn FrameSource,
    classifier: &PostureClassifier,
    calibrator: &mut PostureCalibrator,
    stop: &AtomicBool,
) -> Result<CalibrationResult> {
    info!("📏 Calibrating: sit upright and look at the screen");
    while !stop.load(Ordering::Relaxed) && !calibrator.is_complete() {
        let Some(packet) = source.next_frame()? else {
            warn!(
                "Replay ended after {} calibration samples",
                calibrator.sample_count()
            );
            break;
        };
        match packet.landmarks.as_ref() {
            Some(landmarks) => {
                calibrator.add(&classifier.classify(landmarks));
            }
            None => debug!("Frame {} has no pose, skipping", packet.frame_id),
        }
    }
    calibrator.finish()
}
