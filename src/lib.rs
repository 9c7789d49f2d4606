pub mod config;
pub mod detector;
pub mod model;
pub mod output;
pub mod rpm;
pub mod version;

pub use config::Config;
pub use detector::Detector;
pub use model::{Feature, FeatureSet, Format, LayerScan, PackageEntry, ScanResult};
