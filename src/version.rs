//! RPM version strings.
//!
//! Versions are displayed in the canonical `[epoch:]version[-release]` form.
//! The epoch segment only appears when it is set to something other than
//! zero, and the release segment only when the release is non-empty.
//!
//! # Example
//!
//! ```
//! use rpmscan::version::{format_version, RpmVersion};
//!
//! assert_eq!(format_version("1", "1.0h", "3.fc28"), "1:1.0h-3.fc28");
//! assert_eq!(format_version("", "3.8", "2.fc28"), "3.8-2.fc28");
//!
//! let parsed = RpmVersion::parse("2:8.1.328-1.fc28").unwrap();
//! assert_eq!(parsed.epoch, 2);
//! assert_eq!(parsed.to_string(), "2:8.1.328-1.fc28");
//! ```

use std::fmt;
use thiserror::Error;

/// Characters allowed in the version and release segments besides
/// alphanumerics.
const ALLOWED_SYMBOLS: &[char] = &['.', '-', '+', '~', ':', '_'];

/// Errors produced when a version string does not follow RPM conventions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("version string is empty")]
    Empty,
    #[error("epoch in version is not a number")]
    InvalidEpoch,
    #[error("no version")]
    MissingVersion,
    #[error("invalid character in version")]
    InvalidVersionChar,
    #[error("invalid character in release")]
    InvalidReleaseChar,
}

/// A parsed `[epoch:]version[-release]` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RpmVersion {
    pub epoch: u64,
    pub version: String,
    pub release: Option<String>,
}

impl RpmVersion {
    /// Parses and validates an RPM version string.
    ///
    /// The epoch is everything before the first `:`, the release everything
    /// after the last `-`.
    ///
    /// # Errors
    ///
    /// Returns a [`VersionError`] naming the first rule the string breaks.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError::Empty);
        }

        let (epoch, rest) = match s.split_once(':') {
            Some((epoch, rest)) => {
                let epoch = epoch
                    .parse::<u64>()
                    .map_err(|_| VersionError::InvalidEpoch)?;
                (epoch, rest)
            }
            None => (0, s),
        };

        let (version, release) = match rest.rsplit_once('-') {
            Some((version, release)) => (version, Some(release)),
            None => (rest, None),
        };

        if version.is_empty() {
            return Err(VersionError::MissingVersion);
        }
        if !version.chars().all(is_allowed) {
            return Err(VersionError::InvalidVersionChar);
        }
        if let Some(release) = release {
            if !release.chars().all(is_allowed) {
                return Err(VersionError::InvalidReleaseChar);
            }
        }

        Ok(Self {
            epoch,
            version: version.to_string(),
            release: release.map(str::to_string),
        })
    }
}

impl fmt::Display for RpmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(release) = &self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || ALLOWED_SYMBOLS.contains(&c)
}

/// Returns true when `epoch` is unset or numerically zero.
fn is_zero_epoch(epoch: &str) -> bool {
    epoch.is_empty() || epoch.chars().all(|c| c == '0')
}

/// Builds the canonical display version from decoded database fields.
///
/// No validation happens here; pass the result through
/// [`validate`] when the fields come from untrusted input.
pub fn format_version(epoch: &str, version: &str, release: &str) -> String {
    let mut v = String::new();
    if !is_zero_epoch(epoch) {
        v.push_str(epoch);
        v.push(':');
    }
    v.push_str(version);
    if !release.is_empty() {
        v.push('-');
        v.push_str(release);
    }
    v
}

/// Checks that `version` is a well-formed RPM version string.
pub fn validate(version: &str) -> Result<(), VersionError> {
    RpmVersion::parse(version).map(|_| ())
}
