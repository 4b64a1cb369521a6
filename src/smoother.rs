// src/smoother.rs
//
// Temporal smoother for posture verdicts.
//
// A fixed-capacity ring of recent is_bad samples feeds a two-state alert
// machine:
//
//   CLEAR ──(bad ratio ≥ open_ratio AND bad run sustained ≥ min_duration)──→ OPEN
//   OPEN  ──(bad ratio < clear_ratio)───────────────────────────────────────→ CLEAR
//
// The ring is count-based; the run duration is tracked separately on wall
// clock. A bad run is anchored at the last sample seen before its first bad
// sample, so N bad samples at 1 fps after a good one cover N seconds.

use crate::types::SmoothingConfig;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

const RATIO_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostureSample {
    pub is_bad: bool,
    pub at: DateTime<Utc>,
}

/// Ring buffer with a running bad-sample count. O(1) push and ratio.
#[derive(Debug, Clone)]
pub struct PostureWindow {
    slots: Vec<Option<PostureSample>>,
    /// Index of the next write
    head: usize,
    len: usize,
    bad_count: usize,
}

impl PostureWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![None; capacity],
            head: 0,
            len: 0,
            bad_count: 0,
        }
    }

    /// Inserts a sample, returning the one evicted when the ring was full
    pub fn push(&mut self, sample: PostureSample) -> Option<PostureSample> {
        let evicted = self.slots[self.head].replace(sample);
        match evicted {
            Some(old) if old.is_bad => self.bad_count -= 1,
            Some(_) => {}
            None => self.len += 1,
        }
        if sample.is_bad {
            self.bad_count += 1;
        }
        self.head = (self.head + 1) % self.slots.len();
        evicted
    }

    /// Fraction of bad samples among the current contents; 0 when empty
    pub fn ratio(&self) -> f32 {
        if self.len == 0 {
            return 0.0;
        }
        self.bad_count as f32 / self.len as f32
    }

    pub fn bad_count(&self) -> usize {
        self.bad_count
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &PostureSample> {
        let cap = self.slots.len();
        let start = (self.head + cap - self.len) % cap;
        (0..self.len).filter_map(move |i| self.slots[(start + i) % cap].as_ref())
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.head = 0;
        self.len = 0;
        self.bad_count = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertState {
    Clear,
    Open {
        /// First bad sample of the run that opened the alert
        started_at: DateTime<Utc>,
        opened_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertTransition {
    Opened {
        started_at: DateTime<Utc>,
        at: DateTime<Utc>,
        /// Sustained bad time that satisfied the debounce
        elapsed: Duration,
        ratio: f32,
    },
    Closed {
        started_at: DateTime<Utc>,
        at: DateTime<Utc>,
        /// How long the alert was open for, measured from the run start
        elapsed: Duration,
        ratio: f32,
    },
}

#[derive(Debug, Clone, Copy)]
struct BadRun {
    anchor_at: DateTime<Utc>,
    first_bad_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AlertSmoother {
    window: PostureWindow,
    open_ratio: f32,
    clear_ratio: f32,
    min_duration: Duration,
    max_sample_gap: Duration,
    state: AlertState,
    run: Option<BadRun>,
    last_sample_at: Option<DateTime<Utc>>,
}

impl AlertSmoother {
    pub fn new(config: &SmoothingConfig) -> Self {
        Self {
            window: PostureWindow::new(config.window_size),
            open_ratio: config.open_ratio,
            clear_ratio: config.clear_ratio.unwrap_or(config.open_ratio),
            min_duration: seconds(config.min_duration_seconds),
            max_sample_gap: seconds(config.max_sample_gap_seconds),
            state: AlertState::Clear,
            run: None,
            last_sample_at: None,
        }
    }

    pub fn update(&mut self, is_bad: bool, at: DateTime<Utc>) -> Option<AlertTransition> {
        let previous_at = match self.last_sample_at {
            Some(prev) if at - prev > self.max_sample_gap => {
                if self.run.take().is_some() {
                    debug!("Bad run broken by a {}s sample gap", (at - prev).num_seconds());
                }
                None
            }
            prev => prev,
        };

        self.window.push(PostureSample { is_bad, at });
        self.last_sample_at = Some(at);
        let ratio = self.window.ratio();

        if is_bad && self.run.is_none() {
            self.run = Some(BadRun {
                anchor_at: previous_at.unwrap_or(at),
                first_bad_at: at,
            });
        }

        match self.state {
            AlertState::Clear => {
                if !is_bad && ratio + RATIO_EPSILON < self.open_ratio {
                    self.run = None;
                }
                let run = self.run?;
                let elapsed = at - run.anchor_at;
                if ratio + RATIO_EPSILON >= self.open_ratio && elapsed >= self.min_duration {
                    self.state = AlertState::Open {
                        started_at: run.first_bad_at,
                        opened_at: at,
                    };
                    info!(
                        "🚨 Sustained bad posture: {:.0}% of last {} samples over {:.1}s",
                        ratio * 100.0,
                        self.window.len(),
                        elapsed.num_milliseconds() as f64 / 1000.0
                    );
                    return Some(AlertTransition::Opened {
                        started_at: run.first_bad_at,
                        at,
                        elapsed,
                        ratio,
                    });
                }
                None
            }
            AlertState::Open { started_at, .. } => {
                if ratio + RATIO_EPSILON < self.clear_ratio {
                    self.state = AlertState::Clear;
                    self.run = None;
                    info!("✅ Posture recovered ({:.0}% bad)", ratio * 100.0);
                    return Some(AlertTransition::Closed {
                        started_at,
                        at,
                        elapsed: at - started_at,
                        ratio,
                    });
                }
                None
            }
        }
    }

    pub fn is_alert_active(&self) -> bool {
        matches!(self.state, AlertState::Open { .. })
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn alert_started_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            AlertState::Open { started_at, .. } => Some(started_at),
            AlertState::Clear => None,
        }
    }

    /// First bad sample of the current run, open or not
    pub fn run_started_at(&self) -> Option<DateTime<Utc>> {
        self.run.map(|r| r.first_bad_at)
    }

    pub fn ratio(&self) -> f32 {
        self.window.ratio()
    }

    pub fn window(&self) -> &PostureWindow {
        &self.window
    }
}

fn seconds(secs: f64) -> Duration {
    Duration::milliseconds((secs * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: f64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000 + (secs * 1000.0) as i64).unwrap()
    }

    fn config(window_size: usize, ratio: f32, min_secs: f64) -> SmoothingConfig {
        SmoothingConfig {
            window_size,
            open_ratio: ratio,
            clear_ratio: None,
            min_duration_seconds: min_secs,
            max_sample_gap_seconds: 5.0,
        }
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = PostureWindow::new(3);
        for (i, bad) in [true, true, false].iter().enumerate() {
            assert!(window.push(PostureSample { is_bad: *bad, at: at(i as f64) }).is_none());
        }
        let evicted = window.push(PostureSample { is_bad: false, at: at(3.0) }).unwrap();
        assert!(evicted.is_bad);
        assert_eq!(evicted.at, at(0.0));
        assert_eq!(window.len(), 3);
        assert_eq!(window.bad_count(), 1);

        let order: Vec<_> = window.iter().map(|s| s.at).collect();
        assert_eq!(order, vec![at(1.0), at(2.0), at(3.0)]);
    }

    #[test]
    fn test_window_ratio_matches_contents() {
        let mut window = PostureWindow::new(7);
        let pattern = [true, false, true, true, false, false, true, true, true, false, true];
        for (i, bad) in pattern.iter().enumerate() {
            window.push(PostureSample { is_bad: *bad, at: at(i as f64) });
            let bad_in_window = window.iter().filter(|s| s.is_bad).count();
            let expected = bad_in_window as f32 / window.len() as f32;
            assert!((window.ratio() - expected).abs() < 1e-6);
            assert_eq!(window.bad_count(), bad_in_window);
        }
    }

    #[test]
    fn test_debounced_open_on_eighth_bad_sample() {
        let mut smoother = AlertSmoother::new(&config(10, 0.8, 8.0));
        let bad = [false, false, true, true, true, true, true, true, true, true];

        let mut opened_at = None;
        for (i, is_bad) in bad.iter().enumerate() {
            if let Some(AlertTransition::Opened { elapsed, ratio, started_at, .. }) =
                smoother.update(*is_bad, at(i as f64))
            {
                assert_eq!(elapsed, Duration::seconds(8));
                assert!((ratio - 0.8).abs() < 1e-6);
                assert_eq!(started_at, at(2.0));
                opened_at = Some(i);
            }
        }
        assert_eq!(opened_at, Some(9));
        assert!(smoother.is_alert_active());
        assert_eq!(smoother.alert_started_at(), Some(at(2.0)));
    }

    #[test]
    fn test_ratio_alone_never_opens() {
        let mut smoother = AlertSmoother::new(&config(5, 0.8, 10.0));
        for i in 0..10 {
            assert!(smoother.update(true, at(i as f64)).is_none());
            assert!((smoother.ratio() - 1.0).abs() < 1e-6);
        }
        assert!(!smoother.is_alert_active());
        assert!(smoother.update(true, at(10.0)).is_some());
    }

    #[test]
    fn test_duration_alone_never_opens() {
        let mut smoother = AlertSmoother::new(&config(10, 0.8, 2.0));
        // Alternating samples keep the ratio at ~50% for a long time
        for i in 0..40 {
            let transition = smoother.update(i % 2 == 0, at(i as f64 * 0.5));
            assert!(transition.is_none());
        }
        assert!(!smoother.is_alert_active());
    }

    #[test]
    fn test_closes_when_ratio_drops() {
        let mut smoother = AlertSmoother::new(&config(5, 0.8, 3.0));
        let mut t = 0.0;
        while !smoother.is_alert_active() {
            smoother.update(true, at(t));
            t += 1.0;
        }

        // 4/4 → 4/5 stays open
        assert!(smoother.update(false, at(t)).is_none());
        t += 1.0;
        // 3/5 < 0.8 closes
        match smoother.update(false, at(t)) {
            Some(AlertTransition::Closed { started_at, .. }) => assert_eq!(started_at, at(0.0)),
            other => panic!("expected close, got {:?}", other),
        }
        assert!(!smoother.is_alert_active());
        assert!(smoother.run_started_at().is_none());
    }

    #[test]
    fn test_hysteresis_keeps_alert_open() {
        let mut cfg = config(5, 0.8, 0.0);
        cfg.clear_ratio = Some(0.4);
        let mut smoother = AlertSmoother::new(&cfg);
        assert!(matches!(
            smoother.update(true, at(0.0)),
            Some(AlertTransition::Opened { .. })
        ));
        for i in 1..5 {
            smoother.update(true, at(i as f64));
        }
        // 4/5, 3/5 and 2/5 are still ≥ 0.4
        assert!(smoother.update(false, at(5.0)).is_none());
        assert!(smoother.update(false, at(6.0)).is_none());
        assert!(smoother.update(false, at(7.0)).is_none());
        // 1/5 < 0.4
        assert!(matches!(
            smoother.update(false, at(8.0)),
            Some(AlertTransition::Closed { .. })
        ));
    }

    #[test]
    fn test_sample_gap_restarts_run() {
        let mut smoother = AlertSmoother::new(&config(10, 0.8, 4.0));
        smoother.update(true, at(0.0));
        smoother.update(true, at(1.0));
        // 10s without samples: the run restarts at t=11
        assert!(smoother.update(true, at(11.0)).is_none());
        assert_eq!(smoother.run_started_at(), Some(at(11.0)));
        assert!(smoother.update(true, at(12.0)).is_none());
        assert!(smoother.update(true, at(15.0)).is_some());
    }

    #[test]
    fn test_good_sample_breaks_run_while_clear() {
        let mut smoother = AlertSmoother::new(&config(4, 0.8, 1.0));
        smoother.update(false, at(0.0));
        smoother.update(true, at(1.0));
        assert_eq!(smoother.run_started_at(), Some(at(1.0)));
        smoother.update(false, at(2.0));
        assert!(smoother.run_started_at().is_none());
    }
}
