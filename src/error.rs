// ================================
// src/error.rs - typed errors for lane loading
// ================================
use std::fmt;

/// Errors raised while turning lane descriptions into a usable lane.
#[derive(Debug, Clone, PartialEq)]
pub enum LaneError {
    /// The path grammar could not be parsed. `position` is the token index.
    MalformedPath { position: usize, reason: String },
    /// Fewer than two cross-sections survived, so no segment can be built.
    DegenerateLane { usable_sections: usize },
    /// The centerline is too short to place the vehicle and the goal on it.
    CenterTooShort { length: f64, required: f64 },
    /// No scenario with this name is configured.
    UnknownScenario(String),
}

impl LaneError {
    pub(crate) fn malformed(position: usize, reason: impl Into<String>) -> Self {
        LaneError::MalformedPath {
            position,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for LaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneError::MalformedPath { position, reason } => {
                write!(f, "Malformed path at token {position}: {reason}")
            }
            LaneError::DegenerateLane { usable_sections } => write!(
                f,
                "Degenerate lane: only {usable_sections} usable cross-section(s), need at least 2"
            ),
            LaneError::CenterTooShort { length, required } => write!(
                f,
                "Centerline too short: {length:.3} units, need more than {required:.3}"
            ),
            LaneError::UnknownScenario(name) => write!(f, "Unknown scenario: {name}"),
        }
    }
}

impl std::error::Error for LaneError {}

pub type Result<T> = std::result::Result<T, LaneError>;
