//! Core data types for inventoried packages and scan results.
//!
//! - [`Feature`] - One installed binary package with its source identity
//! - [`FeatureSet`] - The deduplicated output of one extraction run
//! - [`PackageEntry`] - A decoded package-database row
//! - [`Format`] - Package-database format handled by a detector
//! - [`ScanResult`] - Features found across one or more image roots
//!
//! # Example
//!
//! ```
//! use rpmscan::{Feature, FeatureSet};
//!
//! let mut features = FeatureSet::new();
//! features.insert(Feature::new("glibc-common", "2.27-32.fc28", "glibc", "2.27-32.fc28", "rpm"));
//! features.insert(Feature::new("glibc-common", "2.27-32.fc28", "glibc", "2.27-32.fc28", "rpm"));
//!
//! assert_eq!(features.len(), 1);
//! ```

mod entry;
mod feature;
mod format;
mod result;

pub use entry::*;
pub use feature::*;
pub use format::*;
pub use result::*;
