//! Classifier boundary
//!
//! The trained model is an external collaborator consumed through the
//! [`Classifier`] trait: a stateless binary `predict` plus an outlier/noise
//! `filter` applied before classification. [`GuardedModel`] wraps any
//! implementation with latency accounting, error containment and a circuit
//! breaker, so a slow or failing model degrades into skipped evaluations
//! instead of stalling or killing the consumer thread.

pub mod linear;

pub use linear::LinearModel;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::features::FeatureRow;

/// Calls after which the latency accounting window resets
const LATENCY_WINDOW_CALLS: u64 = 300;

/// Binary classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Vpn,
    Normal,
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Vpn => write!(f, "vpn"),
            Label::Normal => write!(f, "normal"),
        }
    }
}

impl std::str::FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "vpn" => Ok(Label::Vpn),
            "normal" => Ok(Label::Normal),
            other => Err(format!("unknown label: {other}")),
        }
    }
}

/// External classifier contract
pub trait Classifier: Send {
    /// Classify one complete feature row
    fn predict(&self, row: &FeatureRow) -> Result<Label>;

    /// Pre-classification noise filter; `true` rejects the sample
    fn filter(&self, row: &FeatureRow) -> Result<bool>;
}

/// Worker-facing outcome of one guarded evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Vpn,
    Normal,
    /// The noise filter rejected the sample; the flow should be evicted
    Rejected,
    /// Model failure or open breaker; nothing changes this cycle
    Skipped,
}

/// Circuit-breaker settings for the model boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Per-call latency budget in milliseconds
    pub latency_budget_ms: u64,
    /// Consecutive over-budget calls before the breaker opens
    pub trip_after: u32,
    /// Seconds the breaker stays open
    pub cooldown_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            latency_budget_ms: 250,
            trip_after: 3,
            cooldown_secs: 5,
        }
    }
}

/// Latency-accounted, error-contained wrapper around a classifier
pub struct GuardedModel {
    inner: Box<dyn Classifier>,
    config: GuardConfig,
    time_spent: f64,
    calls: u64,
    slow_streak: u32,
    open_until: Option<Instant>,
}

impl GuardedModel {
    pub fn new(inner: Box<dyn Classifier>, config: GuardConfig) -> Self {
        Self {
            inner,
            config,
            time_spent: 0.0,
            calls: 0,
            slow_streak: 0,
            open_until: None,
        }
    }

    /// Run filter then predict on one row, absorbing collaborator failures
    pub fn evaluate(&mut self, row: &FeatureRow) -> Verdict {
        if let Some(until) = self.open_until {
            if Instant::now() < until {
                return Verdict::Skipped;
            }
            self.open_until = None;
            self.slow_streak = 0;
        }

        let start = Instant::now();
        let verdict = match self.inner.filter(row) {
            Ok(true) => Verdict::Rejected,
            Ok(false) => match self.inner.predict(row) {
                Ok(Label::Vpn) => Verdict::Vpn,
                Ok(Label::Normal) => Verdict::Normal,
                Err(e) => {
                    warn!("model predict failed, skipping evaluation: {e}");
                    Verdict::Skipped
                }
            },
            Err(e) => {
                warn!("model filter failed, skipping evaluation: {e}");
                Verdict::Skipped
            }
        };
        self.account(start.elapsed());

        verdict
    }

    /// Average call latency over the current accounting window, seconds
    pub fn average_latency(&self) -> f64 {
        self.time_spent / self.calls.max(1) as f64
    }

    fn account(&mut self, elapsed: Duration) {
        if self.calls > LATENCY_WINDOW_CALLS {
            self.time_spent = 0.0;
            self.calls = 0;
        }
        self.time_spent += elapsed.as_secs_f64();
        self.calls += 1;

        if elapsed > Duration::from_millis(self.config.latency_budget_ms) {
            self.slow_streak += 1;
            if self.slow_streak >= self.config.trip_after {
                let cooldown = Duration::from_secs(self.config.cooldown_secs);
                warn!(
                    streak = self.slow_streak,
                    cooldown_secs = self.config.cooldown_secs,
                    "model breaker open: repeated over-budget calls"
                );
                self.open_until = Some(Instant::now() + cooldown);
            }
        } else {
            self.slow_streak = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VpnmonError;

    struct FixedClassifier {
        label: Label,
        reject: bool,
    }

    impl Classifier for FixedClassifier {
        fn predict(&self, _row: &FeatureRow) -> Result<Label> {
            Ok(self.label)
        }

        fn filter(&self, _row: &FeatureRow) -> Result<bool> {
            Ok(self.reject)
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn predict(&self, _row: &FeatureRow) -> Result<Label> {
            Err(VpnmonError::Model("weights went missing".into()))
        }

        fn filter(&self, _row: &FeatureRow) -> Result<bool> {
            Ok(false)
        }
    }

    struct SlowClassifier;

    impl Classifier for SlowClassifier {
        fn predict(&self, _row: &FeatureRow) -> Result<Label> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(Label::Normal)
        }

        fn filter(&self, _row: &FeatureRow) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_label_round_trip() {
        assert_eq!("vpn".parse::<Label>(), Ok(Label::Vpn));
        assert_eq!("normal".parse::<Label>(), Ok(Label::Normal));
        assert!("tunnel".parse::<Label>().is_err());
        assert_eq!(Label::Vpn.to_string(), "vpn");
    }

    #[test]
    fn test_verdicts_pass_through() {
        let row = FeatureRow::new();

        let mut vpn = GuardedModel::new(
            Box::new(FixedClassifier {
                label: Label::Vpn,
                reject: false,
            }),
            GuardConfig::default(),
        );
        assert_eq!(vpn.evaluate(&row), Verdict::Vpn);

        let mut rejecting = GuardedModel::new(
            Box::new(FixedClassifier {
                label: Label::Vpn,
                reject: true,
            }),
            GuardConfig::default(),
        );
        assert_eq!(rejecting.evaluate(&row), Verdict::Rejected);
    }

    #[test]
    fn test_model_failure_becomes_skip() {
        let mut model = GuardedModel::new(Box::new(FailingClassifier), GuardConfig::default());
        let row = FeatureRow::new();

        for _ in 0..3 {
            assert_eq!(model.evaluate(&row), Verdict::Skipped);
        }
        // The failure was still accounted as a call.
        assert!(model.average_latency() >= 0.0);
        assert_eq!(model.calls, 3);
    }

    #[test]
    fn test_breaker_opens_on_slow_calls() {
        let config = GuardConfig {
            latency_budget_ms: 1,
            trip_after: 2,
            cooldown_secs: 60,
        };
        let mut model = GuardedModel::new(Box::new(SlowClassifier), config);
        let row = FeatureRow::new();

        assert_eq!(model.evaluate(&row), Verdict::Normal);
        assert_eq!(model.evaluate(&row), Verdict::Normal);
        // Breaker is now open; evaluations short-circuit.
        assert_eq!(model.evaluate(&row), Verdict::Skipped);
        assert!(model.open_until.is_some());
    }

    #[test]
    fn test_latency_window_resets() {
        let mut model = GuardedModel::new(
            Box::new(FixedClassifier {
                label: Label::Normal,
                reject: false,
            }),
            GuardConfig::default(),
        );
        let row = FeatureRow::new();

        for _ in 0..(LATENCY_WINDOW_CALLS + 10) {
            model.evaluate(&row);
        }
        assert!(model.calls <= LATENCY_WINDOW_CALLS + 1);
    }
}
