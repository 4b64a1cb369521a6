// src/pipeline/session.rs
//
// One camera session. Owns its MonitoringState exclusively; frames are
// processed one at a time, in arrival order:
//
//   face → identity → grace gating → (monitored + landmarks) classify
//        → smoother → emitter (storage / images / alerts)

use super::emitter::{EmittedRecords, EventEmitter};
use super::frame_context::FrameContext;
use super::metrics::PipelineMetrics;
use crate::capture_limiter::CaptureLimiter;
use crate::grace_window::{GraceWindowTracker, MonitorDecision};
use crate::posture::PostureClassifier;
use crate::recognition::{FaceOutcome, Gallery, IdentityResolver};
use crate::smoother::{AlertSmoother, AlertTransition};
use crate::types::{Config, FramePacket};
use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

/// Mutable per-session state. Never shared across sessions.
#[derive(Debug, Clone)]
pub struct MonitoringState {
    pub grace: GraceWindowTracker,
    pub smoother: AlertSmoother,
    pub limiter: CaptureLimiter,
    /// De-duplicated rule ids of the current bad run, first-seen order
    pub run_reasons: Vec<String>,
}

impl MonitoringState {
    pub fn new(config: &Config) -> Self {
        Self {
            grace: GraceWindowTracker::new(&config.monitoring),
            smoother: AlertSmoother::new(&config.smoothing),
            limiter: CaptureLimiter::new(&config.capture),
            run_reasons: Vec::new(),
        }
    }

    pub fn current_alert_active(&self) -> bool {
        self.smoother.is_alert_active()
    }
}

pub struct MonitoringSession {
    config: Config,
    resolver: IdentityResolver,
    classifier: PostureClassifier,
    state: MonitoringState,
    emitter: EventEmitter,
    metrics: PipelineMetrics,
}

#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub context: FrameContext,
    pub records: EmittedRecords,
}

impl MonitoringSession {
    /// Refuses to start on an invalid configuration snapshot
    pub fn new(
        config: Config,
        gallery: Gallery,
        emitter: EventEmitter,
        metrics: PipelineMetrics,
    ) -> Result<Self> {
        config
            .validate()
            .context("Refusing to start monitoring session")?;

        if !config.posture.calibrated {
            if config.posture.require_calibration {
                bail!("Posture calibration required; run `study-guardian calibrate` first");
            }
            warn!("⚠️  Posture thresholds were never calibrated; using configured defaults");
        }
        info!(
            "Session ready: {} gallery entries, tolerance={:.2}, nose_drop={:.3}, neck_angle={:.1}°, window={} @ {:.0}%",
            gallery.len(),
            config.recognition.tolerance,
            config.posture.nose_drop,
            config.posture.neck_angle,
            config.smoothing.window_size,
            config.smoothing.open_ratio * 100.0
        );

        Ok(Self {
            resolver: IdentityResolver::new(gallery, &config.recognition),
            classifier: PostureClassifier::new(config.posture.clone()),
            state: MonitoringState::new(&config),
            emitter,
            metrics,
            config,
        })
    }

    /// Swap the gallery between frames
    pub fn reload_gallery(&mut self, gallery: Gallery) {
        info!("🔄 Gallery reloaded: {} entries", gallery.len());
        self.resolver.replace_gallery(gallery);
    }

    pub fn process_frame(&mut self, packet: FramePacket) -> FrameOutcome {
        self.metrics.inc(&self.metrics.total_frames);
        let now = packet.timestamp;
        let mut ctx = FrameContext::new(packet.frame_id, now, packet.image);

        ctx.face = self.resolver.observe(
            packet.face.as_ref(),
            packet.frame_width,
            packet.frame_height,
        );
        self.log_face(&ctx.face);

        ctx.decision = self.state.grace.evaluate(&ctx.face, now);
        if let MonitorDecision::Monitored { via_grace, .. } = &ctx.decision {
            self.metrics.inc(&self.metrics.monitored_frames);
            if *via_grace {
                self.metrics.inc(&self.metrics.grace_frames);
            }
        }

        match (&ctx.decision, packet.landmarks.as_ref()) {
            (MonitorDecision::Monitored { identity, .. }, Some(landmarks)) => {
                let verdict = self.classifier.classify(landmarks);
                self.metrics.inc(&self.metrics.posture_samples);
                if verdict.is_bad {
                    self.metrics.inc(&self.metrics.bad_samples);
                    warn!(
                        "Bad posture ({:.3} drop / {:.1}°) detected for {}: {}",
                        verdict.metric("nose_drop").unwrap_or(f32::NAN),
                        verdict.metric("neck_angle").unwrap_or(f32::NAN),
                        identity,
                        verdict.reasons_text()
                    );
                    for reason in &verdict.reasons {
                        if !self.state.run_reasons.contains(reason) {
                            self.state.run_reasons.push(reason.clone());
                        }
                    }
                } else {
                    debug!(
                        "Posture looks good ({:.3} drop / {:.1}°) for {}",
                        verdict.metric("nose_drop").unwrap_or(f32::NAN),
                        verdict.metric("neck_angle").unwrap_or(f32::NAN),
                        identity
                    );
                }

                ctx.alert_transition = self.state.smoother.update(verdict.is_bad, now);
                match ctx.alert_transition {
                    Some(AlertTransition::Opened { .. }) => {
                        self.metrics.inc(&self.metrics.alerts_opened)
                    }
                    Some(AlertTransition::Closed { .. }) => {
                        self.metrics.inc(&self.metrics.alerts_closed)
                    }
                    None => {}
                }
                ctx.verdict = Some(verdict);
            }
            (MonitorDecision::Monitored { identity, .. }, None) => {
                debug!("Posture not available for {}", identity);
            }
            (MonitorDecision::NotMonitored, _) => {}
        }

        ctx.alert_active = self.state.smoother.is_alert_active();
        ctx.alert_reasons = self.state.run_reasons.clone();
        if !ctx.alert_active && self.state.smoother.run_started_at().is_none() {
            self.state.run_reasons.clear();
        }

        let records = self.emitter.emit(&ctx, &mut self.state.limiter);
        FrameOutcome {
            context: ctx,
            records,
        }
    }

    fn log_face(&self, face: &FaceOutcome) {
        match face {
            FaceOutcome::NoFace => debug!("No faces detected in current frame"),
            FaceOutcome::Filtered { area_ratio } => {
                self.metrics.inc(&self.metrics.faces_filtered);
                debug!("Ignoring distant face (area ratio {:.4})", area_ratio);
            }
            FaceOutcome::Resolved(id) => {
                self.metrics.inc(&self.metrics.faces_resolved);
                let distance = id.face_distance.unwrap_or(f32::NAN);
                if id.is_unknown() {
                    self.metrics.inc(&self.metrics.unknown_faces);
                    info!("Unknown person detected (dist {:.2})", distance);
                } else {
                    debug!("Recognized {} (dist {:.2})", id.identity, distance);
                }
            }
        }
    }

    pub fn state(&self) -> &MonitoringState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }
}
