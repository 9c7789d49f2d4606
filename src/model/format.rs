use serde::{Deserialize, Serialize};

use crate::rpm::DETECTOR_NAME as RPM_DETECTOR_NAME;

/// Package-database format a detector understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Rpm,
}

impl Format {
    pub const ALL: &'static [Format] = &[Format::Rpm];

    /// Identifier stamped on every feature the format's detector produces.
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Rpm => RPM_DETECTOR_NAME,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Format::Rpm => "RPM",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::ALL
            .iter()
            .copied()
            .find(|format| format.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown format: {}. Use: rpm", s))
    }
}
