use super::Detector;
use crate::model::{FeatureSet, Format};
use crate::rpm::{RpmLister, RpmQuery};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

#[derive(Default)]
pub struct RpmDetector {
    query: RpmQuery,
}

impl RpmDetector {
    pub fn new(rpm_command: &str) -> Self {
        Self {
            query: RpmQuery::new(rpm_command),
        }
    }
}

#[async_trait]
impl Detector for RpmDetector {
    fn name(&self) -> &'static str {
        "RPM Package Database"
    }

    fn format(&self) -> Format {
        Format::Rpm
    }

    fn database_paths(&self) -> &[&'static str] {
        &[
            "var/lib/rpm/Packages",
            "var/lib/rpm/rpmdb.sqlite",
            "usr/lib/sysimage/rpm/rpmdb.sqlite",
        ]
    }

    async fn detect(&self, root: &Path) -> Result<FeatureSet> {
        let Some(database) = self.find_database(root) else {
            debug!(root = %root.display(), "no rpm database found");
            return Ok(FeatureSet::new());
        };
        let db_dir = database.parent().unwrap_or(root);

        let entries = self
            .query
            .entries(db_dir)
            .await
            .with_context(|| format!("Failed to read rpm database {}", database.display()))?;

        let features = RpmLister.list(&entries)?;
        info!(
            root = %root.display(),
            entries = entries.len(),
            features = features.len(),
            "detected rpm packages"
        );
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detect_without_database_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let features = RpmDetector::default().detect(root.path()).await.unwrap();

        assert!(features.is_empty());
    }

    #[tokio::test]
    async fn test_detect_reports_missing_rpm_binary() {
        let root = tempfile::tempdir().unwrap();
        let db_dir = root.path().join("var/lib/rpm");
        std::fs::create_dir_all(&db_dir).unwrap();
        std::fs::write(db_dir.join("Packages"), b"").unwrap();

        let err = RpmDetector::new("rpmscan-no-such-binary")
            .detect(root.path())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Failed to read rpm database"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_detect_does_not_read_database_outside_root() {
        let host = tempfile::tempdir().unwrap();
        std::fs::write(host.path().join("Packages"), b"").unwrap();

        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("var/lib")).unwrap();
        std::os::unix::fs::symlink(host.path(), root.path().join("var/lib/rpm")).unwrap();

        let features = RpmDetector::new("rpmscan-no-such-binary")
            .detect(root.path())
            .await
            .unwrap();

        assert!(features.is_empty());
    }
}
