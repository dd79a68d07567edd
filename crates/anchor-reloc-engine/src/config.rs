//! Engine tunables and their JSON form.

use std::fs;
use std::path::Path;

use anchor_reloc_core::MIN_FLOOR_FLATNESS;
use anchor_reloc_fiducial::CatalogParams;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::phase::DetectionPhase;

/// Parameters of one relocalization session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelocalizationConfig {
    /// Delay between readiness polls while tracking is not ready (seconds).
    pub readiness_retry_s: f64,
    /// Minimum area of a horizontal plane for the search to start in precision (m²).
    pub ready_plane_area_m2: f32,
    /// Time without a placement before the active set is widened (seconds).
    pub escalation_s: f64,
    /// Overall time limit measured from `start` (seconds).
    pub timeout_s: f64,
    /// Camera positions kept for the stability check.
    pub stability_window: usize,
    /// Maximum spread of the window for the camera to count as stable (meters).
    pub stability_tolerance_m: f32,
    pub max_tracked_long_range: usize,
    pub max_tracked_near: usize,
    /// Floor markers detected less flat than this take the fallback path.
    pub min_floor_marker_up_dot: f32,
    /// Reported confidence of a floor-calibrated placement.
    pub precision_confidence: f32,
    /// Reported confidence of a ground-projected placement.
    pub fallback_confidence: f32,
    pub catalog: CatalogParams,
}

impl Default for RelocalizationConfig {
    fn default() -> Self {
        Self {
            readiness_retry_s: 0.5,
            ready_plane_area_m2: 0.5,
            escalation_s: 2.0,
            timeout_s: 15.0,
            stability_window: 10,
            stability_tolerance_m: 0.05,
            max_tracked_long_range: 1,
            max_tracked_near: 2,
            min_floor_marker_up_dot: MIN_FLOOR_FLATNESS,
            precision_confidence: 1.0,
            fallback_confidence: 0.6,
            catalog: CatalogParams::default(),
        }
    }
}

impl RelocalizationConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Simultaneously tracked images allowed in `phase`.
    pub fn max_tracked(&self, phase: DetectionPhase) -> usize {
        match phase {
            DetectionPhase::Idle => 0,
            DetectionPhase::LongRange => self.max_tracked_long_range,
            DetectionPhase::Approaching | DetectionPhase::Precision => self.max_tracked_near,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_and_partial_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reloc.json");
        let cfg = RelocalizationConfig {
            timeout_s: 30.0,
            ..RelocalizationConfig::default()
        };
        cfg.write_json(&path).expect("write");
        assert_eq!(RelocalizationConfig::load_json(&path).expect("load"), cfg);

        let partial: RelocalizationConfig =
            serde_json::from_str(r#"{ "escalation_s": 4.0, "catalog": { "max_images": 2 } }"#).expect("parse");
        assert_eq!(partial.escalation_s, 4.0);
        assert_eq!(partial.catalog.max_images, 2);
        assert_eq!(partial.timeout_s, 15.0);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RelocalizationConfig::load_json("/nonexistent/reloc.json").expect_err("missing");
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn tracked_cap_per_phase() {
        let cfg = RelocalizationConfig::default();
        assert_eq!(cfg.max_tracked(DetectionPhase::LongRange), 1);
        assert_eq!(cfg.max_tracked(DetectionPhase::Approaching), 2);
        assert_eq!(cfg.max_tracked(DetectionPhase::Precision), 2);
    }
}
