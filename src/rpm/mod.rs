//! RPM package inventory.
//!
//! - [`source`] resolves source-RPM filenames into a source name and version
//! - [`RpmLister`] turns decoded database entries into a [`FeatureSet`]
//! - [`RpmQuery`] decodes a package database with the `rpm` tool
//!
//! [`FeatureSet`]: crate::model::FeatureSet

mod lister;
mod query;
pub mod source;

pub use lister::{ListError, MalformedEntry, RpmLister};
pub use query::{parse_query_line, parse_query_output, QueryError, RpmQuery, QUERY_FORMAT};
pub use source::{resolve_source_package, ParseError, SourcePackage};

/// Detector identifier carried by every feature this module produces.
pub const DETECTOR_NAME: &str = "rpm";
