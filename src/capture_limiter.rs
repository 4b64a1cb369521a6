// src/capture_limiter.rs
//
// Bounds how often frame images are persisted. At most one capture per
// identity per interval; bypass categories are always approved. `approve`
// only decides; the emitter calls `record` after the ImageWriter succeeds.

use crate::types::{group_of, CaptureCategory, CaptureConfig};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CaptureLimiter {
    enabled: bool,
    interval: Duration,
    bypass: HashSet<CaptureCategory>,
    groups: HashSet<String>,
    identities: HashSet<String>,
    last_capture_at: HashMap<String, DateTime<Utc>>,
}

impl CaptureLimiter {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            enabled: config.enabled,
            interval: Duration::milliseconds((config.interval_seconds * 1000.0).round() as i64),
            bypass: config.bypass.iter().copied().collect(),
            groups: config.groups.iter().cloned().collect(),
            identities: config.identities.iter().cloned().collect(),
            last_capture_at: HashMap::new(),
        }
    }

    /// Capture whitelist; empty lists allow everyone
    pub fn is_eligible(&self, identity: &str) -> bool {
        if self.groups.is_empty() && self.identities.is_empty() {
            return true;
        }
        self.identities.contains(identity) || self.groups.contains(group_of(identity))
    }

    /// Pure decision; nothing is recorded until `record` is called
    pub fn approve(&self, identity: &str, category: CaptureCategory, now: DateTime<Utc>) -> bool {
        if !self.enabled || !self.is_eligible(identity) {
            return false;
        }
        if self.bypass.contains(&category) {
            return true;
        }

        match self.last_capture_at.get(identity) {
            Some(last) if now - *last < self.interval => {
                debug!(
                    "Capture for {} throttled ({}s since last, interval {}s)",
                    identity,
                    (now - *last).num_seconds(),
                    self.interval.num_seconds()
                );
                false
            }
            _ => true,
        }
    }

    /// Marks a capture as taken. Only call once the image was actually written.
    pub fn record(&mut self, identity: &str, now: DateTime<Utc>) {
        self.last_capture_at.insert(identity.to_string(), now);
    }

    pub fn last_capture_at(&self, identity: &str) -> Option<DateTime<Utc>> {
        self.last_capture_at.get(identity).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: f64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000 + (secs * 1000.0) as i64).unwrap()
    }

    /// Approve and, when approved, record as the emitter does on a successful write
    fn take(
        limiter: &mut CaptureLimiter,
        identity: &str,
        category: CaptureCategory,
        now: DateTime<Utc>,
    ) -> bool {
        let approved = limiter.approve(identity, category, now);
        if approved {
            limiter.record(identity, now);
        }
        approved
    }

    fn limiter(bypass: Vec<CaptureCategory>) -> CaptureLimiter {
        CaptureLimiter::new(&CaptureConfig {
            bypass,
            ..CaptureConfig::default()
        })
    }

    #[test]
    fn test_interval_per_identity() {
        let mut limiter = limiter(Vec::new());
        assert!(take(&mut limiter, "child/alice", CaptureCategory::Routine, at(0.0)));
        assert!(!take(&mut limiter, "child/alice", CaptureCategory::Routine, at(10.0)));
        // Denials don't move the clock
        assert_eq!(limiter.last_capture_at("child/alice"), Some(at(0.0)));
        assert!(take(&mut limiter, "child/alice", CaptureCategory::Routine, at(31.0)));

        // Independent identity
        assert!(take(&mut limiter, "child/carl", CaptureCategory::Routine, at(10.0)));
    }

    #[test]
    fn test_approvals_never_closer_than_interval() {
        let mut limiter = limiter(Vec::new());
        let mut approved = Vec::new();
        for i in 0..200 {
            let t = i as f64 * 1.7;
            if take(&mut limiter, "child/alice", CaptureCategory::Routine, at(t)) {
                approved.push(t);
            }
        }
        assert!(approved.len() > 1);
        for pair in approved.windows(2) {
            assert!(pair[1] - pair[0] >= 30.0);
        }
    }

    #[test]
    fn test_bypass_category_ignores_interval() {
        let mut limiter = limiter(vec![CaptureCategory::Unknown]);
        assert!(take(&mut limiter, "unknown", CaptureCategory::Unknown, at(0.0)));
        assert!(take(&mut limiter, "unknown", CaptureCategory::Unknown, at(1.0)));
        // A routine request after a bypass capture is still throttled
        assert!(!take(&mut limiter, "unknown", CaptureCategory::Routine, at(2.0)));
    }

    #[test]
    fn test_whitelist_and_disabled() {
        let mut limiter = CaptureLimiter::new(&CaptureConfig {
            groups: vec!["child".to_string()],
            ..CaptureConfig::default()
        });
        assert!(take(&mut limiter, "child/alice", CaptureCategory::Routine, at(0.0)));
        assert!(!take(&mut limiter, "parent/bob", CaptureCategory::Routine, at(0.0)));

        let mut disabled = CaptureLimiter::new(&CaptureConfig {
            enabled: false,
            ..CaptureConfig::default()
        });
        assert!(!take(&mut disabled, "child/alice", CaptureCategory::Routine, at(0.0)));
    }

    #[test]
    fn test_unrecorded_approval_does_not_throttle() {
        let mut limiter = limiter(Vec::new());
        // Approved but the write failed, so nothing was recorded
        assert!(limiter.approve("child/alice", CaptureCategory::Routine, at(0.0)));
        assert!(limiter.last_capture_at("child/alice").is_none());
        assert!(limiter.approve("child/alice", CaptureCategory::Routine, at(10.0)));

        limiter.record("child/alice", at(10.0));
        assert!(!limiter.approve("child/alice", CaptureCategory::Routine, at(20.0)));
    }
}
