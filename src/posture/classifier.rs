// src/posture/classifier.rs

use super::rules::{default_rules, PostureRule};
use crate::types::{Landmarks, PostureConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureVerdict {
    pub is_bad: bool,
    /// Every metric that could be computed, fired or not
    pub metrics: BTreeMap<String, f32>,
    /// Rule ids that fired, in evaluation order. Non-empty iff `is_bad`.
    pub reasons: Vec<String>,
}

impl PostureVerdict {
    pub fn metric(&self, name: &str) -> Option<f32> {
        self.metrics.get(name).copied()
    }

    pub fn reasons_text(&self) -> String {
        self.reasons.join(", ")
    }
}

/// OR over a fixed list of rules. Pure: same landmarks + thresholds give
/// the same verdict.
#[derive(Debug, Clone)]
pub struct PostureClassifier {
    rules: Vec<PostureRule>,
    config: PostureConfig,
}

impl PostureClassifier {
    pub fn new(config: PostureConfig) -> Self {
        Self::with_rules(config, default_rules())
    }

    pub fn with_rules(config: PostureConfig, rules: Vec<PostureRule>) -> Self {
        Self { rules, config }
    }

    pub fn config(&self) -> &PostureConfig {
        &self.config
    }

    pub fn classify(&self, landmarks: &Landmarks) -> PostureVerdict {
        let mut metrics = BTreeMap::new();
        let mut reasons = Vec::new();

        for rule in &self.rules {
            let Some(outcome) = (rule.evaluate)(landmarks, &self.config) else {
                continue;
            };
            metrics.insert(outcome.metric.to_string(), outcome.value);
            if outcome.fired {
                reasons.push(rule.id.to_string());
            }
        }

        PostureVerdict {
            is_bad: !reasons.is_empty(),
            metrics,
            reasons,
        }
    }
}
