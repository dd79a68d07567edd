use std::fmt;

use anchor_reloc_fiducial::FiducialCategory;
use serde::{Deserialize, Serialize};

/// Search phase, ordered by how close the user is expected to be.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionPhase {
    #[default]
    Idle,
    LongRange,
    Approaching,
    Precision,
}

impl DetectionPhase {
    /// Fiducial categories registered while in this phase.
    pub fn categories(self) -> &'static [FiducialCategory] {
        match self {
            DetectionPhase::Idle => &[],
            DetectionPhase::LongRange => &[FiducialCategory::Wall],
            DetectionPhase::Approaching => &[FiducialCategory::FloorMid],
            DetectionPhase::Precision => &[FiducialCategory::FloorNear, FiducialCategory::FloorMid],
        }
    }

    /// Next phase; `Precision` is the last.
    pub fn next(self) -> Self {
        match self {
            DetectionPhase::Idle => DetectionPhase::LongRange,
            DetectionPhase::LongRange => DetectionPhase::Approaching,
            DetectionPhase::Approaching | DetectionPhase::Precision => DetectionPhase::Precision,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionPhase::Idle => "idle",
            DetectionPhase::LongRange => "long range",
            DetectionPhase::Approaching => "approaching",
            DetectionPhase::Precision => "precision",
        }
    }
}

impl fmt::Display for DetectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
