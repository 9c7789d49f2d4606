//! Package-format detectors.
//!
//! A [`Detector`] recognises one package-database format inside an extracted
//! image root and lists the installed packages it records.
//!
//! # Available Detectors
//!
//! | Detector | Format | Database paths |
//! |----------|--------|----------------|
//! | [`RpmDetector`] | `rpm` | `var/lib/rpm/Packages`, `var/lib/rpm/rpmdb.sqlite`, `usr/lib/sysimage/rpm/rpmdb.sqlite` |
//!
//! # Example
//!
//! ```no_run
//! use rpmscan::{detector::all_detectors, Config};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let root = Path::new("/tmp/rootfs");
//!     for detector in all_detectors(&Config::default()) {
//!         if detector.is_present(root) {
//!             let features = detector.detect(root).await?;
//!             println!("{}: {} packages", detector.name(), features.len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod rpm;

pub use rpm::RpmDetector;

use crate::config::Config;
use crate::model::{FeatureSet, Format};
use anyhow::Result;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Symlinks followed before a lookup is abandoned, matching Linux `ELOOP`.
const MAX_SYMLINK_HOPS: usize = 40;

/// Extracts installed-package inventory for one package-database format.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Returns the human-readable name of this detector.
    fn name(&self) -> &'static str;

    /// Returns the format this detector handles.
    fn format(&self) -> Format;

    /// Database locations, relative to an image root, in lookup order.
    fn database_paths(&self) -> &[&'static str];

    /// Returns the first database file that exists under `root`.
    ///
    /// Directory symlinks are resolved with `root` as `/`. The database file
    /// itself must be a regular file, not a symlink.
    fn find_database(&self, root: &Path) -> Option<PathBuf> {
        self.database_paths().iter().find_map(|relative| {
            let relative = Path::new(relative);
            let dir = resolve_in_root(root, relative.parent()?)?;
            let path = dir.join(relative.file_name()?);
            let metadata = std::fs::symlink_metadata(&path).ok()?;
            metadata.is_file().then_some(path)
        })
    }

    /// Returns true if `root` contains a database this detector can read.
    fn is_present(&self, root: &Path) -> bool {
        self.find_database(root).is_some()
    }

    /// Lists the installed packages recorded under `root`.
    ///
    /// A root without a database yields an empty set.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be decoded or holds malformed
    /// entries.
    async fn detect(&self, root: &Path) -> Result<FeatureSet>;
}

/// Returns every registered detector.
///
/// # Example
///
/// ```
/// use rpmscan::{detector::all_detectors, Config};
///
/// let detectors = all_detectors(&Config::default());
/// assert_eq!(detectors.len(), 1);
/// ```
pub fn all_detectors(config: &Config) -> Vec<Box<dyn Detector>> {
    Format::ALL
        .iter()
        .map(|format| get_detector(*format, config))
        .collect()
}

/// Returns the detector for a specific format.
///
/// # Example
///
/// ```
/// use rpmscan::{detector::get_detector, Config, Format};
///
/// let detector = get_detector(Format::Rpm, &Config::default());
/// assert_eq!(detector.name(), "RPM Package Database");
/// ```
pub fn get_detector(format: Format, config: &Config) -> Box<dyn Detector> {
    match format {
        Format::Rpm => Box::new(RpmDetector::new(&config.rpm_command)),
    }
}

enum Step {
    Parent,
    Name(OsString),
}

fn push_steps(pending: &mut Vec<Step>, path: &Path) {
    let steps: Vec<Step> = path
        .components()
        .filter_map(|component| match component {
            Component::ParentDir => Some(Step::Parent),
            Component::Normal(name) => Some(Step::Name(name.to_os_string())),
            Component::Prefix(_) | Component::RootDir | Component::CurDir => None,
        })
        .collect();
    pending.extend(steps.into_iter().rev());
}

/// Resolves `relative` inside `root` as if `root` were `/`.
///
/// Absolute symlink targets restart at `root` and `..` never climbs above
/// it, so the result always lies under `root`. Returns `None` when a
/// component is missing or the symlink chain is too long.
pub fn resolve_in_root(root: &Path, relative: &Path) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;
    let mut hops = 0usize;
    let mut pending = Vec::new();
    push_steps(&mut pending, relative);

    while let Some(step) = pending.pop() {
        let name = match step {
            Step::Parent => {
                if depth > 0 {
                    resolved.pop();
                    depth -= 1;
                }
                continue;
            }
            Step::Name(name) => name,
        };

        let candidate = resolved.join(&name);
        let metadata = std::fs::symlink_metadata(&candidate).ok()?;
        if metadata.file_type().is_symlink() {
            hops += 1;
            if hops > MAX_SYMLINK_HOPS {
                return None;
            }
            let target = std::fs::read_link(&candidate).ok()?;
            if target.is_absolute() {
                resolved = root.to_path_buf();
                depth = 0;
            }
            push_steps(&mut pending, &target);
        } else {
            resolved = candidate;
            depth += 1;
        }
    }

    Some(resolved)
}
