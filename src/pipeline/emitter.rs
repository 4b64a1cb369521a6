// src/pipeline/emitter.rs
//
// Turns a finished FrameContext into persisted records and alert
// notifications. Every sink call is best-effort: failures are logged and
// counted, never propagated into the frame loop.

use super::frame_context::FrameContext;
use super::metrics::PipelineMetrics;
use super::sinks::{
    AlertKind, AlertNotification, AlertSink, CaptureRequest, FaceSightingRecord, ImageWriter,
    PersistedEvent, PostureRecord, StorageSink,
};
use crate::capture_limiter::CaptureLimiter;
use crate::smoother::AlertTransition;
use crate::types::CaptureCategory;
use tracing::warn;
use uuid::Uuid;

/// What was handed to storage for one frame
#[derive(Debug, Clone, Default)]
pub struct EmittedRecords {
    pub face_sighting: Option<FaceSightingRecord>,
    pub posture: Option<PostureRecord>,
    pub alert: Option<AlertNotification>,
}

pub struct EventEmitter {
    storage: Box<dyn StorageSink>,
    alerts: Box<dyn AlertSink>,
    images: Box<dyn ImageWriter>,
    metrics: PipelineMetrics,
}

impl EventEmitter {
    pub fn new(
        storage: Box<dyn StorageSink>,
        alerts: Box<dyn AlertSink>,
        images: Box<dyn ImageWriter>,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            storage,
            alerts,
            images,
            metrics,
        }
    }

    pub fn emit(&mut self, ctx: &FrameContext, limiter: &mut CaptureLimiter) -> EmittedRecords {
        let face_sighting = self.emit_face_sighting(ctx, limiter);
        let posture = self.emit_posture(ctx, face_sighting.as_ref(), limiter);
        let alert = self.emit_alert(ctx);
        EmittedRecords {
            face_sighting,
            posture,
            alert,
        }
    }

    fn emit_face_sighting(
        &mut self,
        ctx: &FrameContext,
        limiter: &mut CaptureLimiter,
    ) -> Option<FaceSightingRecord> {
        let identity = ctx.identity()?;
        let category = if identity.is_unknown() {
            CaptureCategory::Unknown
        } else {
            CaptureCategory::Routine
        };
        let frame_path = self.capture(ctx, &identity.identity, category, limiter);

        let record = FaceSightingRecord {
            id: Uuid::new_v4(),
            frame_id: ctx.frame_id,
            identity: identity.identity.clone(),
            group_tag: identity.group_tag.clone(),
            face_distance: identity.face_distance,
            frame_path,
            timestamp: ctx.timestamp,
        };
        self.store(PersistedEvent::FaceSighting(record.clone()));
        Some(record)
    }

    fn emit_posture(
        &mut self,
        ctx: &FrameContext,
        sighting: Option<&FaceSightingRecord>,
        limiter: &mut CaptureLimiter,
    ) -> Option<PostureRecord> {
        let verdict = ctx.verdict.as_ref()?;
        let identity = ctx.posture_identity()?.to_string();

        // Reuse the sighting's image; otherwise only bad samples under an
        // open alert earn their own capture.
        let frame_path = match sighting.and_then(|s| s.frame_path.clone()) {
            Some(path) => Some(path),
            None if verdict.is_bad && ctx.alert_active => {
                self.capture(ctx, &identity, CaptureCategory::AlertPosture, limiter)
            }
            None => None,
        };

        let record = PostureRecord {
            id: Uuid::new_v4(),
            frame_id: ctx.frame_id,
            identity,
            is_bad: verdict.is_bad,
            metrics: verdict.metrics.clone(),
            reasons: verdict.reasons_text(),
            face_distance: ctx.identity().and_then(|id| id.face_distance),
            frame_path,
            face_sighting_id: sighting.map(|s| s.id),
            alert_active: ctx.alert_active,
            timestamp: ctx.timestamp,
        };
        self.store(PersistedEvent::Posture(record.clone()));
        Some(record)
    }

    fn emit_alert(&mut self, ctx: &FrameContext) -> Option<AlertNotification> {
        let transition = ctx.alert_transition?;
        let identity = ctx
            .posture_identity()
            .unwrap_or(crate::types::UNKNOWN_IDENTITY)
            .to_string();

        let (kind, elapsed, bad_ratio, timestamp) = match transition {
            AlertTransition::Opened {
                at, elapsed, ratio, ..
            } => (AlertKind::Opened, elapsed, ratio, at),
            AlertTransition::Closed {
                at, elapsed, ratio, ..
            } => (AlertKind::Closed, elapsed, ratio, at),
        };

        let notification = AlertNotification {
            kind,
            identity,
            reasons: ctx.alert_reasons.clone(),
            elapsed_seconds: elapsed.num_milliseconds() as f64 / 1000.0,
            bad_ratio,
            timestamp,
        };
        if let Err(e) = self.alerts.notify(&notification) {
            warn!("Alert delivery failed: {:#}", e);
            self.metrics.inc(&self.metrics.sink_failures);
        }
        Some(notification)
    }

    fn capture(
        &mut self,
        ctx: &FrameContext,
        identity: &str,
        category: CaptureCategory,
        limiter: &mut CaptureLimiter,
    ) -> Option<String> {
        let image = ctx.image.as_ref()?;
        if !limiter.approve(identity, category, ctx.timestamp) {
            return None;
        }

        let request = CaptureRequest {
            identity: identity.to_string(),
            category,
            frame_id: ctx.frame_id,
            timestamp: ctx.timestamp,
        };
        match self.images.write(image, &request) {
            Ok(path) => {
                limiter.record(identity, ctx.timestamp);
                self.metrics.inc(&self.metrics.captures);
                Some(path)
            }
            // Nothing recorded, so the next frame may try again
            Err(e) => {
                warn!("Unable to save snapshot for {}: {:#}", identity, e);
                self.metrics.inc(&self.metrics.sink_failures);
                None
            }
        }
    }

    fn store(&mut self, event: PersistedEvent) {
        if let Err(e) = self.storage.write(&event) {
            warn!("Event storage failed: {:#}", e);
            self.metrics.inc(&self.metrics.sink_failures);
        }
    }
}
