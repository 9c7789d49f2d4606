//! Source package identity from source-RPM filenames.
//!
//! A binary RPM records the file it was built from, e.g.
//! `crypto-policies-20180425-5.git6ad4018.fc28.src.rpm`. The name segment may
//! itself contain hyphens, so the filename is scanned from the right through
//! a fixed sequence of states:
//!
//! ```text
//! <name>-<version>-<release>.<arch>.rpm
//!        ^ version  ^ release  ^ arch ^ package type
//! ```
//!
//! Version and release are assumed to be hyphen-free. When a release does
//! contain a hyphen (`lua-5.3.4-10.fc-28.src.rpm`) the split still happens at
//! the last two hyphens and the result is wrong but well-formed. Callers rely
//! on that output shape, so the scanner does not try to detect it.

use std::fmt;
use thiserror::Error;

use crate::version;

/// Reason a source-RPM filename could not be resolved.
///
/// The display form is exactly the reason string, which is stable and safe
/// to match on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Name and version of the source package a binary package was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePackage {
    pub name: String,
    /// `Version-Release`, without an epoch.
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    PackageType,
    Architecture,
    Release,
    Version,
    Terminate,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::PackageType => "Package Type",
            State::Architecture => "Architecture",
            State::Release => "Release Token",
            State::Version => "Version Token",
            State::Terminate => "Terminate",
        };
        f.write_str(name)
    }
}

/// Resolves a source-RPM filename into the source package's name and
/// `Version-Release`.
///
/// # Errors
///
/// Returns a [`ParseError`] when the package type is not `rpm`, the
/// architecture is not `src`/`nosrc`, the filename ends before a name,
/// version and release were all found, or one of them is empty.
///
/// # Example
///
/// ```
/// use rpmscan::rpm::resolve_source_package;
///
/// let source = resolve_source_package("publicsuffix-list-20180514-1.fc28.src.rpm").unwrap();
/// assert_eq!(source.name, "publicsuffix-list");
/// assert_eq!(source.version, "20180514-1.fc28");
///
/// let err = resolve_source_package("fc28.src.rpm").unwrap_err();
/// assert_eq!(err.reason, "unexpected termination while parsing 'Release Token'");
/// ```
pub fn resolve_source_package(filename: &str) -> Result<SourcePackage, ParseError> {
    let mut state = State::PackageType;
    // Byte offset of the last delimiter consumed; all delimiters are ASCII so
    // slicing on them is always at a char boundary.
    let mut checkpoint = filename.len();
    let mut release = "";
    let mut version = "";

    for (i, c) in filename.char_indices().rev() {
        match (state, c) {
            (State::PackageType, '.') => {
                let package_type = &filename[i + 1..checkpoint];
                if package_type != "rpm" {
                    return Err(ParseError::new(format!(
                        "unexpected package type, expect: 'rpm', got: '{}'",
                        package_type
                    )));
                }
                checkpoint = i;
                state = State::Architecture;
            }
            (State::Architecture, '.') => {
                let architecture = &filename[i + 1..checkpoint];
                if architecture != "src" && architecture != "nosrc" {
                    return Err(ParseError::new(format!(
                        "unexpected package architecture, expect: 'src' or 'nosrc', got: '{}'",
                        architecture
                    )));
                }
                checkpoint = i;
                state = State::Release;
            }
            (State::Release, '-') => {
                release = &filename[i + 1..checkpoint];
                if release.is_empty() {
                    return Err(ParseError::new(
                        "unexpected package release, expect: not empty",
                    ));
                }
                checkpoint = i;
                state = State::Version;
            }
            (State::Version, '-') => {
                version = &filename[i + 1..checkpoint];
                if version.is_empty() {
                    return Err(ParseError::new(
                        "unexpected package version, expect: not empty",
                    ));
                }
                checkpoint = i;
                state = State::Terminate;
                break;
            }
            _ => {}
        }
    }

    if state != State::Terminate {
        return Err(ParseError::new(format!(
            "unexpected termination while parsing '{}'",
            state
        )));
    }

    let source_version = format!("{}-{}", version, release);
    version::validate(&source_version).map_err(|e| ParseError::new(e.to_string()))?;

    let name = &filename[..checkpoint];
    if name.is_empty() {
        return Err(ParseError::new("unexpected package name, expect: not empty"));
    }

    Ok(SourcePackage {
        name: name.to_string(),
        version: source_version,
    })
}
