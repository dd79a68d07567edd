//! Spatial evidence accumulation and the capture-quality score.

use std::collections::BTreeMap;

use anchor_reloc_core::{FeatureCloud, PlaneDescriptor, SpatialData, TrackingState};
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Parameters for [`QualityAccumulator`] and the quality score.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityParams {
    /// Minimum spacing between accumulated points (meters).
    pub dedup_distance_m: f32,
    /// Only points within this distance of the capture center are kept.
    pub radius_m: f32,
    /// Point count at which the point term saturates.
    pub point_target: usize,
    /// Maximum contribution of the point term.
    pub point_weight: f32,
    /// Contribution per distinct plane.
    pub per_plane_weight: f32,
    /// Maximum contribution of the plane term.
    pub plane_weight: f32,
    /// Accumulation cadence (seconds).
    pub tick_interval_s: f64,
}

impl Default for QualityParams {
    fn default() -> Self {
        Self {
            dedup_distance_m: 0.05,
            radius_m: 5.0,
            point_target: 200,
            point_weight: 40.0,
            per_plane_weight: 10.0,
            plane_weight: 30.0,
            tick_interval_s: 0.5,
        }
    }
}

/// Score contribution of the tracking state (0..=30).
pub fn tracking_bonus(state: TrackingState) -> f32 {
    match state {
        TrackingState::Normal => 30.0,
        TrackingState::Limited => 15.0,
        TrackingState::Initializing => 5.0,
        TrackingState::NotAvailable => 0.0,
    }
}

impl QualityParams {
    /// `min(40, points/200*40) + min(30, planes*10) + bonus`, in `0..=100`.
    pub fn score(&self, points: usize, planes: usize, tracking: TrackingState) -> u8 {
        let target = self.point_target.max(1) as f32;
        let point_term = (points as f32 / target * self.point_weight).min(self.point_weight);
        let plane_term = (planes as f32 * self.per_plane_weight).min(self.plane_weight);
        let total = point_term + plane_term + tracking_bonus(tracking);
        total.floor().clamp(0.0, 100.0) as u8
    }
}

/// Capture quality with the default weights.
pub fn quality_score(points: usize, planes: usize, tracking: TrackingState) -> u8 {
    QualityParams::default().score(points, planes, tracking)
}

/// User-facing hint for a score.
pub fn instruction_text(score: u8) -> &'static str {
    match score {
        0..=40 => "Move device slowly to detect surfaces",
        41..=70 => "Good! Keep moving to capture more detail",
        _ => "Excellent anchor data captured!",
    }
}

/// Deduplicated feature points and planes around a capture center.
pub struct QualityAccumulator {
    params: QualityParams,
    center: Point3<f32>,
    points: Vec<Point3<f32>>,
    tree: KdTree<f32, 3>,
    planes: BTreeMap<Uuid, PlaneDescriptor>,
}

impl QualityAccumulator {
    pub fn new(center: Point3<f32>, params: QualityParams) -> Self {
        Self {
            params,
            center,
            points: Vec::new(),
            tree: KdTree::new(),
            planes: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn center(&self) -> Point3<f32> {
        self.center
    }

    #[inline]
    pub fn params(&self) -> &QualityParams {
        &self.params
    }

    /// Add one frame worth of observations. Returns the number of new points kept.
    ///
    /// Points outside the capture radius, or closer than the dedup distance to
    /// an already accumulated point (including earlier points of the same
    /// batch), are dropped. Planes replace earlier observations with the same id.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip(self, points, planes), fields(points = points.len(), planes = planes.len()))
    )]
    pub fn ingest(&mut self, points: &[Point3<f32>], planes: &[PlaneDescriptor]) -> usize {
        let radius_sq = self.params.radius_m * self.params.radius_m;
        let dedup_sq = self.params.dedup_distance_m * self.params.dedup_distance_m;
        let mut added = 0;

        for p in points {
            if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
                continue;
            }
            if (p - self.center).norm_squared() > radius_sq {
                continue;
            }
            let query = [p.x, p.y, p.z];
            if !self.points.is_empty() {
                let nearest = self.tree.nearest_one::<SquaredEuclidean>(&query);
                if nearest.distance <= dedup_sq {
                    continue;
                }
            }
            self.tree.add(&query, self.points.len() as u64);
            self.points.push(*p);
            added += 1;
        }

        for plane in planes {
            self.planes.insert(plane.id, plane.clone());
        }

        added
    }

    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub fn points(&self) -> &[Point3<f32>] {
        &self.points
    }

    pub fn planes(&self) -> impl Iterator<Item = &PlaneDescriptor> {
        self.planes.values()
    }

    pub fn score(&self, tracking: TrackingState) -> u8 {
        self.params
            .score(self.point_count(), self.plane_count(), tracking)
    }

    /// Freeze the accumulated evidence.
    pub fn into_spatial_data(self) -> SpatialData {
        SpatialData {
            feature_cloud: FeatureCloud {
                points: self.points,
                center: self.center,
                radius_m: self.params.radius_m,
            },
            planes: self.planes.into_values().collect(),
        }
    }
}
