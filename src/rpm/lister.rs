use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use super::source::{resolve_source_package, ParseError};
use super::DETECTOR_NAME;
use crate::model::{Feature, FeatureSet, PackageEntry};
use crate::version;

/// Pseudo-package rpm uses to store imported signing keys.
const GPG_PUBKEY: &str = "gpg-pubkey";

/// A database entry whose source-RPM field could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEntry {
    pub name: String,
    pub source_rpm: String,
    pub error: ParseError,
}

impl fmt::Display for MalformedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (source RPM '{}'): {}",
            self.name, self.source_rpm, self.error
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    /// One or more source-RPM fields failed to parse, which points to a
    /// corrupted database. No partial result is returned.
    #[error("malformed entries in package database ({}): {}", .entries.len(), join(.entries))]
    MalformedEntry { entries: Vec<MalformedEntry> },
}

fn join(entries: &[MalformedEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Turns decoded rpm database entries into features.
///
/// The lister holds no state; one value can serve any number of concurrent
/// callers.
///
/// # Example
///
/// ```
/// use rpmscan::rpm::RpmLister;
/// use rpmscan::PackageEntry;
///
/// let entries = vec![
///     PackageEntry::new("openssl-libs", "1.1.0h", "3.fc28")
///         .with_epoch("1")
///         .with_architecture("x86_64")
///         .with_source_rpm("openssl-1.1.0h-3.fc28.src.rpm"),
///     PackageEntry::new("fedora-release", "28", "2").with_architecture("noarch"),
/// ];
///
/// let features = RpmLister.list(&entries).unwrap();
/// let openssl = features.iter().find(|f| f.name == "openssl-libs").unwrap();
/// assert_eq!(openssl.version, "1:1.1.0h-3.fc28");
/// assert_eq!(openssl.source_name, "openssl");
/// assert_eq!(openssl.source_version, "1.1.0h-3.fc28");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RpmLister;

impl RpmLister {
    /// Lists the installed binary packages in `entries`.
    ///
    /// # Errors
    ///
    /// Returns [`ListError::MalformedEntry`] listing every entry whose source
    /// RPM could not be resolved.
    pub fn list(&self, entries: &[PackageEntry]) -> Result<FeatureSet, ListError> {
        let mut features = FeatureSet::new();
        let mut malformed = Vec::new();

        for entry in entries {
            match feature_for(entry) {
                Ok(Some(feature)) => {
                    features.insert(feature);
                }
                Ok(None) => {}
                Err(error) => malformed.push(MalformedEntry {
                    name: entry.name.clone(),
                    source_rpm: entry.source_rpm.clone(),
                    error,
                }),
            }
        }

        if !malformed.is_empty() {
            return Err(ListError::MalformedEntry { entries: malformed });
        }

        debug!(
            entries = entries.len(),
            features = features.len(),
            "listed rpm features"
        );
        Ok(features)
    }
}

/// Builds the feature for one entry, or `None` when the entry is not an
/// installed binary package.
fn feature_for(entry: &PackageEntry) -> Result<Option<Feature>, ParseError> {
    if entry.is_source_package() {
        debug!(package = %entry.name, arch = %entry.architecture, "skipping source package");
        return Ok(None);
    }
    if entry.name == GPG_PUBKEY {
        return Ok(None);
    }

    let version = version::format_version(&entry.epoch, &entry.version, &entry.release);
    if let Err(e) = version::validate(&version) {
        warn!(package = %entry.name, %version, error = %e, "could not parse package version, skipping");
        return Ok(None);
    }

    let (source_name, source_version) = if entry.source_rpm.is_empty() {
        (entry.name.clone(), version.clone())
    } else {
        let source = resolve_source_package(&entry.source_rpm)?;
        (source.name, source.version)
    };

    Ok(Some(Feature {
        name: entry.name.clone(),
        version,
        source_name,
        source_version,
        detector_name: DETECTOR_NAME.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, version: &str, release: &str, source_rpm: &str) -> PackageEntry {
        PackageEntry::new(name, version, release)
            .with_architecture("x86_64")
            .with_source_rpm(source_rpm)
    }

    fn fedora_entries() -> Vec<PackageEntry> {
        vec![
            entry("glibc-common", "2.27", "32.fc28", "glibc-2.27-32.fc28.src.rpm"),
            entry("bash", "4.4.23", "1.fc28", "bash-4.4.23-1.fc28.src.rpm"),
            entry("dbus-libs", "1.12.10", "1.fc28", "dbus-1.12.10-1.fc28.src.rpm").with_epoch("1"),
            entry("libcom_err", "1.44.2", "0.fc28", "e2fsprogs-1.44.2-0.fc28.src.rpm"),
            entry(
                "device-mapper-libs",
                "1.02.146",
                "5.fc28",
                "lvm2-2.02.177-5.fc28.src.rpm",
            ),
            entry("fedora-gpg-keys", "28", "5", "fedora-repos-28-5.src.rpm")
                .with_architecture("noarch"),
            entry("libpcap", "1.9.0", "1.fc28", "libpcap-1.9.0-1.fc28.src.rpm").with_epoch("14"),
        ]
    }

    fn find<'a>(features: &'a FeatureSet, name: &str) -> &'a Feature {
        features.iter().find(|f| f.name == name).unwrap()
    }

    #[test]
    fn test_list_fedora_entries() {
        let features = RpmLister.list(&fedora_entries()).unwrap();

        assert_eq!(features.len(), 7);
        assert!(features.contains(&Feature::new(
            "glibc-common",
            "2.27-32.fc28",
            "glibc",
            "2.27-32.fc28",
            DETECTOR_NAME
        )));
        assert!(features.contains(&Feature::new(
            "dbus-libs",
            "1:1.12.10-1.fc28",
            "dbus",
            "1.12.10-1.fc28",
            DETECTOR_NAME
        )));
        assert!(features.contains(&Feature::new(
            "device-mapper-libs",
            "1.02.146-5.fc28",
            "lvm2",
            "2.02.177-5.fc28",
            DETECTOR_NAME
        )));
        assert!(features.contains(&Feature::new(
            "libpcap",
            "14:1.9.0-1.fc28",
            "libpcap",
            "1.9.0-1.fc28",
            DETECTOR_NAME
        )));
        assert!(features.contains(&Feature::new(
            "fedora-gpg-keys",
            "28-5",
            "fedora-repos",
            "28-5",
            DETECTOR_NAME
        )));
    }

    #[test]
    fn test_epoch_formatting() {
        let entries = vec![entry("openssl", "1.0h", "3.fc28", "").with_epoch("1")];
        let features = RpmLister.list(&entries).unwrap();

        assert_eq!(find(&features, "openssl").version, "1:1.0h-3.fc28");
    }

    #[test]
    fn test_zero_epoch_omitted() {
        let entries = vec![entry("sed", "4.5", "1.fc28", "").with_epoch("0")];
        let features = RpmLister.list(&entries).unwrap();

        assert_eq!(find(&features, "sed").version, "4.5-1.fc28");
    }

    #[test]
    fn test_empty_source_rpm_defaults_to_self() {
        let entries = vec![
            entry("centos-release", "7", "1.1503.el7.centos.2.8", ""),
            entry("tar", "1.30", "3.fc28", "").with_epoch("2"),
            entry("fedora-release", "28", "", ""),
        ];

        let features = RpmLister.list(&entries).unwrap();

        for feature in &features {
            assert_eq!(feature.source_name, feature.name);
            assert_eq!(feature.source_version, feature.version);
        }
        assert_eq!(find(&features, "tar").source_version, "2:1.30-3.fc28");
        assert_eq!(find(&features, "fedora-release").version, "28");
    }

    #[test]
    fn test_source_architectures_skipped() {
        let entries = vec![
            entry("bash", "4.4.23", "1.fc28", "").with_architecture("src"),
            entry("firmware", "1.0", "1", "").with_architecture("nosrc"),
            entry("sed", "4.5", "1.fc28", ""),
        ];

        let features = RpmLister.list(&entries).unwrap();

        assert_eq!(features.len(), 1);
        assert_eq!(features.iter().next().unwrap().name, "sed");
    }

    #[test]
    fn test_gpg_pubkey_skipped() {
        let entries = vec![
            PackageEntry::new("gpg-pubkey", "9db62fb1", "59920156"),
            entry("sed", "4.5", "1.fc28", ""),
        ];

        let features = RpmLister.list(&entries).unwrap();

        assert_eq!(features.len(), 1);
    }

    #[test]
    fn test_invalid_binary_version_skipped() {
        let entries = vec![
            entry("broken", "", "1.fc28", ""),
            entry("weird", "1.0", "1", "").with_epoch("none"),
            entry("sed", "4.5", "1.fc28", ""),
        ];

        let features = RpmLister.list(&entries).unwrap();

        assert_eq!(features.len(), 1);
        assert_eq!(features.iter().next().unwrap().name, "sed");
    }

    #[test]
    fn test_malformed_source_rpm_fails_run() {
        let entries = vec![
            entry("bash", "4.4.23", "1.fc28", "bash-4.4.23-1.fc28.src.rpm"),
            entry(
                "crypto-policies",
                "20180425",
                "5.git6ad4018.fc28",
                "crypto-policies-20180425-5.git6ad4018.fc28.src.dpkg",
            ),
        ];

        let err = RpmLister.list(&entries).unwrap_err();
        let ListError::MalformedEntry { entries } = err;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "crypto-policies");
        assert_eq!(
            entries[0].error.reason,
            "unexpected package type, expect: 'rpm', got: 'dpkg'"
        );
    }

    #[test]
    fn test_malformed_entries_are_aggregated() {
        let entries = vec![
            entry("a", "1", "1", "fc28.src.rpm"),
            entry("b", "1", "1", "..."),
            entry("c", "1", "1", "c-1-1.src.rpm"),
        ];

        let err = RpmLister.list(&entries).unwrap_err();
        let message = err.to_string();
        let ListError::MalformedEntry { entries } = err;

        assert_eq!(entries.len(), 2);
        assert!(message.starts_with("malformed entries in package database (2): "));
        assert!(message.contains("unexpected termination while parsing 'Release Token'"));
    }

    #[test]
    fn test_hyphenated_release_kept() {
        let entries = vec![entry("lua", "5.3.4", "10.fc-28", "lua-5.3.4-10.fc-28.src.rpm")];
        let features = RpmLister.list(&entries).unwrap();
        let lua = find(&features, "lua");

        assert_eq!(lua.source_name, "lua-5.3.4");
        assert_eq!(lua.source_version, "10.fc-28");
    }

    #[test]
    fn test_duplicates_collapse() {
        let mut entries = fedora_entries();
        entries.extend(fedora_entries());

        let features = RpmLister.list(&entries).unwrap();

        assert_eq!(features.len(), 7);
    }

    #[test]
    fn test_idempotent_and_order_independent() {
        let entries = fedora_entries();
        let mut reversed = entries.clone();
        reversed.reverse();

        let first = RpmLister.list(&entries).unwrap();
        let second = RpmLister.list(&entries).unwrap();
        let third = RpmLister.list(&reversed).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn test_every_feature_tagged_with_detector() {
        let features = RpmLister.list(&fedora_entries()).unwrap();
        assert!(features.iter().all(|f| f.detector_name == DETECTOR_NAME));
    }

    #[test]
    fn test_empty_input() {
        assert!(RpmLister.list(&[]).unwrap().is_empty());
    }
}
