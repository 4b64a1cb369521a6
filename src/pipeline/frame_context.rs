// src/pipeline/frame_context.rs
//
// Single source of truth for everything decided about one frame. Built by
// the session, read by the emitter, then dropped.

use crate::grace_window::MonitorDecision;
use crate::posture::PostureVerdict;
use crate::recognition::FaceOutcome;
use crate::smoother::AlertTransition;
use crate::types::{FrameImage, ResolvedIdentity};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct FrameContext {
    pub frame_id: u64,
    pub timestamp: DateTime<Utc>,
    pub image: Option<FrameImage>,

    // Identity
    pub face: FaceOutcome,
    pub decision: MonitorDecision,

    // Posture
    pub verdict: Option<PostureVerdict>,
    pub alert_active: bool,
    pub alert_transition: Option<AlertTransition>,
    /// Rule ids seen during the current bad run
    pub alert_reasons: Vec<String>,
}

impl FrameContext {
    pub fn new(frame_id: u64, timestamp: DateTime<Utc>, image: Option<FrameImage>) -> Self {
        Self {
            frame_id,
            timestamp,
            image,
            face: FaceOutcome::NoFace,
            decision: MonitorDecision::NotMonitored,
            verdict: None,
            alert_active: false,
            alert_transition: None,
            alert_reasons: Vec::new(),
        }
    }

    pub fn identity(&self) -> Option<&ResolvedIdentity> {
        self.face.identity()
    }

    /// Identity posture is attributed to (may come from the grace window)
    pub fn posture_identity(&self) -> Option<&str> {
        self.decision.identity()
    }

    pub fn is_monitored(&self) -> bool {
        self.decision.is_monitored()
    }

    pub fn is_bad_posture(&self) -> bool {
        self.verdict.as_ref().is_some_and(|v| v.is_bad)
    }
}
