use serde::{Deserialize, Serialize};

/// Architectures that mark a database row as a source package.
pub const SOURCE_ARCHITECTURES: &[&str] = &["src", "nosrc"];

/// A decoded package-database row.
///
/// All fields are plain strings as the database stores them. `epoch`,
/// `architecture` and `source_rpm` are empty when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    pub version: String,
    pub release: String,
    #[serde(default)]
    pub epoch: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub source_rpm: String,
}

impl PackageEntry {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        release: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            release: release.into(),
            ..Self::default()
        }
    }

    pub fn with_epoch(mut self, epoch: impl Into<String>) -> Self {
        self.epoch = epoch.into();
        self
    }

    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = architecture.into();
        self
    }

    pub fn with_source_rpm(mut self, source_rpm: impl Into<String>) -> Self {
        self.source_rpm = source_rpm.into();
        self
    }

    /// Returns true for `src`/`nosrc` rows, which are not installed software.
    pub fn is_source_package(&self) -> bool {
        SOURCE_ARCHITECTURES.contains(&self.architecture.as_str())
    }
}
