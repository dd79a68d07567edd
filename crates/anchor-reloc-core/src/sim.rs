//! Deterministic in-memory tracking session.
//!
//! Used by the test suites and by the replay tool to drive capture and
//! relocalization without a device.

use std::collections::VecDeque;

use nalgebra::Point3;

use crate::geometry::{PlaneDescriptor, Pose};
use crate::tracking::{CapturedImage, DetectableImage, RaycastQuery, TrackingSession, TrackingState};
use crate::world_map::WorldMapSnapshot;

#[derive(Clone, Debug, Default)]
pub struct SimulatedTracking {
    pub state: TrackingState,
    pub camera: Option<Pose>,
    pub planes: Vec<PlaneDescriptor>,
    pub feature_points: Vec<Point3<f32>>,
    /// When false every raycast misses.
    pub raycast_enabled: bool,
    /// Images handed out by `capture_image`, front first.
    pub frames: VecDeque<CapturedImage>,
    configured: Vec<DetectableImage>,
    max_tracked: usize,
    configure_calls: usize,
    world_map_runs: Vec<String>,
}

impl SimulatedTracking {
    pub fn new() -> Self {
        Self {
            raycast_enabled: true,
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: TrackingState) -> Self {
        self.state = state;
        self
    }

    pub fn with_camera(mut self, pose: Pose) -> Self {
        self.camera = Some(pose);
        self
    }

    pub fn with_plane(mut self, plane: PlaneDescriptor) -> Self {
        self.planes.push(plane);
        self
    }

    /// Add or replace a plane by id.
    pub fn upsert_plane(&mut self, plane: PlaneDescriptor) {
        match self.planes.iter_mut().find(|p| p.id == plane.id) {
            Some(existing) => *existing = plane,
            None => self.planes.push(plane),
        }
    }

    pub fn push_frame(&mut self, image: CapturedImage) {
        self.frames.push_back(image);
    }

    /// Names of the images currently configured for detection.
    pub fn configured_names(&self) -> Vec<&str> {
        self.configured.iter().map(|img| img.name.as_str()).collect()
    }

    pub fn configured_images(&self) -> &[DetectableImage] {
        &self.configured
    }

    #[inline]
    pub fn max_tracked(&self) -> usize {
        self.max_tracked
    }

    #[inline]
    pub fn configure_calls(&self) -> usize {
        self.configure_calls
    }

    pub fn world_map_runs(&self) -> &[String] {
        &self.world_map_runs
    }
}

impl TrackingSession for SimulatedTracking {
    fn tracking_state(&self) -> TrackingState {
        self.state
    }

    fn camera_pose(&self) -> Option<Pose> {
        self.camera
    }

    fn planes(&self) -> Vec<PlaneDescriptor> {
        self.planes.clone()
    }

    fn raw_feature_points(&self) -> Vec<Point3<f32>> {
        self.feature_points.clone()
    }

    /// Only straight-down rays are resolved: the highest matching plane below
    /// the origin whose footprint contains it.
    fn raycast(&self, query: &RaycastQuery) -> Option<Point3<f32>> {
        if !self.raycast_enabled || query.direction.y >= 0.0 {
            return None;
        }
        self.planes
            .iter()
            .filter(|p| p.alignment == query.alignment)
            .filter(|p| p.height() <= query.origin.y && p.contains_xz(query.origin))
            .map(|p| p.height())
            .fold(None, |best: Option<f32>, h| Some(best.map_or(h, |b| b.max(h))))
            .map(|h| Point3::new(query.origin.x, h, query.origin.z))
    }

    fn configure_detection(&mut self, images: &[DetectableImage], max_tracked: usize) {
        self.configured = images.to_vec();
        self.max_tracked = max_tracked;
        self.configure_calls += 1;
    }

    fn capture_image(&mut self) -> Option<CapturedImage> {
        self.frames.pop_front()
    }

    fn run_with_world_map(&mut self, snapshot: &WorldMapSnapshot) {
        self.world_map_runs.push(snapshot.source.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn downward_raycast_hits_highest_plane_below() {
        let sim = SimulatedTracking::new()
            .with_plane(PlaneDescriptor::horizontal(Uuid::new_v4(), Point3::new(0.0, -1.5, 0.0), 4.0, 4.0))
            .with_plane(PlaneDescriptor::horizontal(Uuid::new_v4(), Point3::new(0.0, -0.7, 0.0), 1.0, 1.0));

        let hit = sim
            .raycast(&RaycastQuery::downward(Point3::new(0.2, 0.0, 0.1)))
            .expect("hit");
        assert_eq!(hit, Point3::new(0.2, -0.7, 0.1));

        // Outside the small table: falls through to the floor.
        let hit = sim
            .raycast(&RaycastQuery::downward(Point3::new(1.5, 0.0, 0.0)))
            .expect("hit");
        assert_eq!(hit.y, -1.5);
    }

    #[test]
    fn disabled_raycast_misses() {
        let mut sim = SimulatedTracking::new()
            .with_plane(PlaneDescriptor::horizontal(Uuid::new_v4(), Point3::new(0.0, -1.0, 0.0), 4.0, 4.0));
        sim.raycast_enabled = false;
        assert!(sim.raycast(&RaycastQuery::downward(Point3::origin())).is_none());
    }
}
