use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One row of installed-software inventory.
///
/// Ordering and equality cover every field, so a [`FeatureSet`] collapses
/// identical records and iterates in a stable order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Feature {
    /// Binary package name as recorded by the package manager.
    pub name: String,
    /// Canonical `[epoch:]version-release`.
    pub version: String,
    pub source_name: String,
    pub source_version: String,
    /// Format detector that produced this record; selects version
    /// comparison semantics downstream.
    pub detector_name: String,
}

impl Feature {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        source_name: impl Into<String>,
        source_version: impl Into<String>,
        detector_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            source_name: source_name.into(),
            source_version: source_version.into(),
            detector_name: detector_name.into(),
        }
    }

    /// Returns true when the package is its own source package.
    pub fn is_self_sourced(&self) -> bool {
        self.name == self.source_name && self.version == self.source_version
    }
}

/// Deduplicated, order-independent result of one extraction run.
pub type FeatureSet = BTreeSet<Feature>;
