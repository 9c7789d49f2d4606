use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::Feature;

/// Features found under a single image root by one detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerScan {
    pub root: PathBuf,
    pub detector: String,
    pub features: Vec<Feature>,
    /// Set when the detector failed for this root; `features` is then empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LayerScan {
    pub fn new(root: PathBuf, detector: impl Into<String>, features: Vec<Feature>) -> Self {
        Self {
            root,
            detector: detector.into(),
            features,
            error: None,
        }
    }

    pub fn failed(root: PathBuf, detector: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            root,
            detector: detector.into(),
            features: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub scan_time: DateTime<Utc>,
    pub layers: Vec<LayerScan>,
}

impl ScanResult {
    pub fn new(layers: Vec<LayerScan>) -> Self {
        Self {
            scan_time: Utc::now(),
            layers,
        }
    }

    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(|l| l.features.len()).sum()
    }

    pub fn has_errors(&self) -> bool {
        self.layers.iter().any(|l| l.error.is_some())
    }

    /// Keeps only the features for which `keep` returns true.
    pub fn retain_features(&mut self, mut keep: impl FnMut(&Feature) -> bool) {
        for layer in &mut self.layers {
            layer.features.retain(&mut keep);
        }
    }
}
