// src/grace_window.rs
//
// Decides per frame whether posture analysis runs. A monitored sighting
// opens a grace window; unknown or missing faces inside that window keep
// monitoring alive and are attributed to the last monitored identity.

use crate::recognition::FaceOutcome;
use crate::types::MonitoringConfig;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorDecision {
    Monitored {
        /// Identity posture samples are attributed to
        identity: String,
        /// True when monitoring was extended by the grace window
        via_grace: bool,
    },
    NotMonitored,
}

impl MonitorDecision {
    pub fn is_monitored(&self) -> bool {
        matches!(self, Self::Monitored { .. })
    }

    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Monitored { identity, .. } => Some(identity),
            Self::NotMonitored => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraceWindowTracker {
    groups: HashSet<String>,
    identities: HashSet<String>,
    grace: Duration,
    filtered_face_refreshes: bool,
    last_monitored_identity: Option<String>,
    last_monitored_at: Option<DateTime<Utc>>,
}

impl GraceWindowTracker {
    pub fn new(config: &MonitoringConfig) -> Self {
        Self {
            groups: config.groups.iter().cloned().collect(),
            identities: config.identities.iter().cloned().collect(),
            grace: Duration::milliseconds((config.grace_seconds * 1000.0).round() as i64),
            filtered_face_refreshes: config.filtered_face_refreshes_grace,
            last_monitored_identity: None,
            last_monitored_at: None,
        }
    }

    /// Empty filters monitor everyone, including unknown faces
    pub fn monitors_everyone(&self) -> bool {
        self.groups.is_empty() && self.identities.is_empty()
    }

    pub fn is_monitored_identity(&self, identity: &str, group: &str) -> bool {
        self.monitors_everyone() || self.identities.contains(identity) || self.groups.contains(group)
    }

    pub fn evaluate(&mut self, face: &FaceOutcome, now: DateTime<Utc>) -> MonitorDecision {
        match face {
            FaceOutcome::Resolved(resolved)
                if self.is_monitored_identity(&resolved.identity, &resolved.group_tag) =>
            {
                self.last_monitored_identity = Some(resolved.identity.clone());
                self.last_monitored_at = Some(now);
                MonitorDecision::Monitored {
                    identity: resolved.identity.clone(),
                    via_grace: false,
                }
            }
            FaceOutcome::Resolved(resolved) if !resolved.is_unknown() => {
                // Known but unmonitored person: no grace extension
                debug!(
                    "Skipping posture analysis for {}; not in monitored list",
                    resolved.identity
                );
                MonitorDecision::NotMonitored
            }
            FaceOutcome::Filtered { .. } => {
                let decision = self.within_grace(now);
                if self.filtered_face_refreshes && decision.is_monitored() {
                    self.last_monitored_at = Some(now);
                }
                decision
            }
            _ => self.within_grace(now),
        }
    }

    fn within_grace(&self, now: DateTime<Utc>) -> MonitorDecision {
        match (&self.last_monitored_identity, self.last_monitored_at) {
            (Some(identity), Some(at)) if now - at <= self.grace && now >= at => {
                debug!(
                    "⏳ Grace window keeps {} monitored ({:.1}s since sighting)",
                    identity,
                    (now - at).num_milliseconds() as f64 / 1000.0
                );
                MonitorDecision::Monitored {
                    identity: identity.clone(),
                    via_grace: true,
                }
            }
            _ => MonitorDecision::NotMonitored,
        }
    }

    pub fn last_monitored_identity(&self) -> Option<&str> {
        self.last_monitored_identity.as_deref()
    }

    pub fn last_monitored_at(&self) -> Option<DateTime<Utc>> {
        self.last_monitored_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResolvedIdentity;

    fn at(secs: f64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000 + (secs * 1000.0) as i64).unwrap()
    }

    fn known(label: &str) -> FaceOutcome {
        let group = crate::types::group_of(label).to_string();
        FaceOutcome::Resolved(ResolvedIdentity {
            identity: label.to_string(),
            group_tag: group,
            face_distance: Some(0.3),
        })
    }

    fn unknown() -> FaceOutcome {
        FaceOutcome::Resolved(ResolvedIdentity::unknown(Some(0.8)))
    }

    #[test]
    fn test_flicker_within_grace_stays_monitored() {
        let mut tracker = GraceWindowTracker::new(&MonitoringConfig::default());

        assert!(tracker.evaluate(&known("child/alice"), at(0.0)).is_monitored());
        let decision = tracker.evaluate(&unknown(), at(1.5));
        assert_eq!(
            decision,
            MonitorDecision::Monitored {
                identity: "child/alice".to_string(),
                via_grace: true
            }
        );
        assert!(tracker.evaluate(&known("child/alice"), at(3.0)).is_monitored());
    }

    #[test]
    fn test_gap_beyond_grace_stops_monitoring() {
        let mut tracker = GraceWindowTracker::new(&MonitoringConfig::default());

        tracker.evaluate(&known("child/alice"), at(0.0));
        assert!(tracker.evaluate(&unknown(), at(2.0)).is_monitored());
        assert!(tracker.evaluate(&FaceOutcome::NoFace, at(5.0)).is_monitored());
        assert!(!tracker.evaluate(&unknown(), at(6.0)).is_monitored());
        // Unknown sightings never refresh the window
        assert!(!tracker.evaluate(&FaceOutcome::NoFace, at(6.5)).is_monitored());
    }

    #[test]
    fn test_unmonitored_group_is_skipped() {
        let mut tracker = GraceWindowTracker::new(&MonitoringConfig::default());
        assert!(!tracker.evaluate(&known("parent/bob"), at(0.0)).is_monitored());
        assert!(!tracker.evaluate(&unknown(), at(1.0)).is_monitored());

        tracker.evaluate(&known("child/alice"), at(2.0));
        // A parent in front of the camera does not inherit the child's window
        assert!(!tracker.evaluate(&known("parent/bob"), at(3.0)).is_monitored());
    }

    #[test]
    fn test_explicit_identity_is_monitored() {
        let config = MonitoringConfig {
            identities: vec!["parent/bob".to_string()],
            ..MonitoringConfig::default()
        };
        let mut tracker = GraceWindowTracker::new(&config);
        assert!(tracker.evaluate(&known("parent/bob"), at(0.0)).is_monitored());
        assert!(!tracker.evaluate(&known("parent/carol"), at(1.0)).is_monitored());
    }

    #[test]
    fn test_empty_filters_monitor_unknown() {
        let config = MonitoringConfig {
            groups: Vec::new(),
            ..MonitoringConfig::default()
        };
        let mut tracker = GraceWindowTracker::new(&config);
        assert_eq!(
            tracker.evaluate(&unknown(), at(0.0)),
            MonitorDecision::Monitored {
                identity: "unknown".to_string(),
                via_grace: false
            }
        );
        assert!(tracker.evaluate(&known("parent/bob"), at(1.0)).is_monitored());
    }

    #[test]
    fn test_filtered_face_does_not_refresh_by_default() {
        let mut tracker = GraceWindowTracker::new(&MonitoringConfig::default());
        tracker.evaluate(&known("child/alice"), at(0.0));

        let filtered = FaceOutcome::Filtered { area_ratio: 0.001 };
        assert!(tracker.evaluate(&filtered, at(4.0)).is_monitored());
        assert_eq!(tracker.last_monitored_at(), Some(at(0.0)));
        assert!(!tracker.evaluate(&filtered, at(6.0)).is_monitored());
    }

    #[test]
    fn test_filtered_face_refreshes_when_enabled() {
        let config = MonitoringConfig {
            filtered_face_refreshes_grace: true,
            ..MonitoringConfig::default()
        };
        let mut tracker = GraceWindowTracker::new(&config);
        tracker.evaluate(&known("child/alice"), at(0.0));

        let filtered = FaceOutcome::Filtered { area_ratio: 0.001 };
        assert!(tracker.evaluate(&filtered, at(4.0)).is_monitored());
        assert!(tracker.evaluate(&filtered, at(8.0)).is_monitored());
        assert_eq!(tracker.last_monitored_at(), Some(at(8.0)));
    }
}
