//! Built-in linear scorer
//!
//! The narrow, file-configured classifier implementation: a weighted sum over
//! named features against a decision threshold, with optional per-feature
//! bounds acting as the outlier filter. The weights come from offline
//! training; this module only loads and applies them.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, VpnmonError};
use crate::features::FeatureRow;

use super::{Classifier, Label};

/// On-disk model description (JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModelConfig {
    /// Feature name -> weight
    pub weights: HashMap<String, f64>,
    #[serde(default)]
    pub bias: f64,
    /// Scores at or above this classify as vpn
    pub threshold: f64,
    /// Feature name -> [lower, upper]; values outside reject the sample
    #[serde(default)]
    pub filter_bounds: HashMap<String, (f64, f64)>,
}

pub struct LinearModel {
    config: LinearModelConfig,
}

impl LinearModel {
    pub fn new(config: LinearModelConfig) -> Self {
        Self { config }
    }

    /// Load the model description from a JSON file. An unreadable or invalid
    /// file is a fatal initialization error.
    pub fn from_config<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VpnmonError::ModelConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: LinearModelConfig = serde_json::from_str(&content).map_err(|e| {
            VpnmonError::ModelConfig(format!("cannot parse {}: {e}", path.display()))
        })?;

        if config.weights.is_empty() {
            return Err(VpnmonError::ModelConfig(format!(
                "{} carries no feature weights",
                path.display()
            )));
        }

        info!(
            path = %path.display(),
            features = config.weights.len(),
            "loaded linear model"
        );
        Ok(Self::new(config))
    }

    fn feature(&self, row: &FeatureRow, name: &str) -> Result<f64> {
        row.get(name)
            .ok_or_else(|| VpnmonError::Model(format!("feature {name} missing from row")))
    }
}

impl Classifier for LinearModel {
    fn predict(&self, row: &FeatureRow) -> Result<Label> {
        let mut score = self.config.bias;
        for (name, weight) in &self.config.weights {
            score += weight * self.feature(row, name)?;
        }

        if score >= self.config.threshold {
            Ok(Label::Vpn)
        } else {
            Ok(Label::Normal)
        }
    }

    fn filter(&self, row: &FeatureRow) -> Result<bool> {
        for (name, (lower, upper)) in &self.config.filter_bounds {
            let value = self.feature(row, name)?;
            if value < *lower || value > *upper {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn row(pairs: &[(&str, f64)]) -> FeatureRow {
        let mut row = FeatureRow::new();
        for (name, value) in pairs {
            row.push(*name, Some(*value));
        }
        row
    }

    fn model(weights: &[(&str, f64)], bias: f64, threshold: f64) -> LinearModel {
        LinearModel::new(LinearModelConfig {
            weights: weights.iter().map(|(n, w)| (n.to_string(), *w)).collect(),
            bias,
            threshold,
            filter_bounds: HashMap::new(),
        })
    }

    #[test]
    fn test_predict_against_threshold() {
        let model = model(&[("avg_packet_length", 0.01)], 0.0, 5.0);

        let vpn = row(&[("avg_packet_length", 600.0)]);
        assert_eq!(model.predict(&vpn).unwrap(), Label::Vpn);

        let normal = row(&[("avg_packet_length", 100.0)]);
        assert_eq!(model.predict(&normal).unwrap(), Label::Normal);
    }

    #[test]
    fn test_predict_fails_on_missing_feature() {
        let model = model(&[("avg_packet_length", 1.0)], 0.0, 0.0);
        let empty = FeatureRow::new();
        assert!(model.predict(&empty).is_err());
    }

    #[test]
    fn test_filter_bounds_reject_outliers() {
        let mut config = LinearModelConfig {
            weights: [("x".to_string(), 1.0)].into_iter().collect(),
            bias: 0.0,
            threshold: 0.0,
            filter_bounds: HashMap::new(),
        };
        config
            .filter_bounds
            .insert("x".to_string(), (0.0, 10.0));
        let model = LinearModel::new(config);

        assert!(!model.filter(&row(&[("x", 5.0)])).unwrap());
        assert!(model.filter(&row(&[("x", 50.0)])).unwrap());
        assert!(model.filter(&row(&[("x", -1.0)])).unwrap());
    }

    #[test]
    fn test_from_config_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"weights": {{"avg_packet_length": 0.5}}, "bias": -1.0, "threshold": 2.0}}"#
        )
        .unwrap();

        let model = LinearModel::from_config(file.path()).unwrap();
        assert_eq!(model.config.weights.len(), 1);
        assert_eq!(model.config.bias, -1.0);

        let label = model.predict(&row(&[("avg_packet_length", 10.0)])).unwrap();
        assert_eq!(label, Label::Vpn);
    }

    #[test]
    fn test_from_config_rejects_bad_input() {
        assert!(LinearModel::from_config("/nonexistent/model.json").is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(LinearModel::from_config(file.path()).is_err());

        let mut empty = tempfile::NamedTempFile::new().unwrap();
        write!(empty, r#"{{"weights": {{}}, "threshold": 0.0}}"#).unwrap();
        assert!(LinearModel::from_config(empty.path()).is_err());
    }
}
