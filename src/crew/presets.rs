//! Crews shipped with the binary.

use crate::crew::CrewConfig;
use crate::error::ApiError;

const PRESETS: &[(&str, &str)] = &[
    ("nextvuln", include_str!("../../crews/nextvuln.toml")),
    ("vuln-triage", include_str!("../../crews/vuln-triage.toml")),
    ("market-research", include_str!("../../crews/market-research.toml")),
];

pub fn names() -> Vec<&'static str> {
    PRESETS.iter().map(|(name, _)| *name).collect()
}

/// Raw TOML of a preset.
pub fn source(name: &str) -> Option<&'static str> {
    PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, toml)| *toml)
}

/// Parsed preset, or `None` when no preset has that name.
pub fn load(name: &str) -> Option<Result<CrewConfig, ApiError>> {
    source(name).map(CrewConfig::from_toml_str)
}

/// Every preset, parsed.
pub fn all() -> Result<Vec<CrewConfig>, ApiError> {
    PRESETS
        .iter()
        .map(|(_, toml)| CrewConfig::from_toml_str(toml))
        .collect()
}
