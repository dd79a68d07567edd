//! Whole-map snapshots and the patch index used to pick one.

use std::time::SystemTime;

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored spatial-map snapshot of a prior tracking session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldMapSnapshot {
    /// File name or key the snapshot was loaded from.
    pub source: String,
    pub feature_points: Vec<Point3<f32>>,
    pub anchor_ids: Vec<Uuid>,
}

impl WorldMapSnapshot {
    #[inline]
    pub fn feature_count(&self) -> usize {
        self.feature_points.len()
    }

    #[inline]
    pub fn anchor_count(&self) -> usize {
        self.anchor_ids.len()
    }
}

fn default_radius_m() -> f32 {
    15.0
}

fn default_version() -> u32 {
    1
}

/// Metadata for one stored map patch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldMapPatchMeta {
    pub id: Uuid,
    pub name: String,
    pub captured_at: SystemTime,
    pub feature_count: usize,
    pub byte_size: usize,
    /// Patch center in map coordinates.
    pub center_2d: Point2<f32>,
    #[serde(default = "default_radius_m")]
    pub radius_m: f32,
    #[serde(default = "default_version")]
    pub version: u32,
}

impl WorldMapPatchMeta {
    pub fn new(name: impl Into<String>, feature_count: usize, byte_size: usize, center_2d: Point2<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            captured_at: SystemTime::now(),
            feature_count,
            byte_size,
            center_2d,
            radius_m: default_radius_m(),
            version: default_version(),
        }
    }
}

/// All patches recorded for a location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldMapPatchIndex {
    pub location_id: String,
    #[serde(default)]
    pub patches: Vec<WorldMapPatchMeta>,
}

impl WorldMapPatchIndex {
    pub fn new(location_id: impl Into<String>) -> Self {
        Self {
            location_id: location_id.into(),
            patches: Vec::new(),
        }
    }

    /// Patch whose center is closest to `point` (map coordinates).
    pub fn nearest_patch(&self, point: Point2<f32>) -> Option<&WorldMapPatchMeta> {
        self.patches.iter().min_by(|a, b| {
            let da = (a.center_2d - point).norm_squared();
            let db = (b.center_2d - point).norm_squared();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}
