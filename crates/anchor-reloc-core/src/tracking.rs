//! Interface to the external tracking subsystem.
//!
//! The engine never owns a global session: a handle implementing
//! [`TrackingSession`] is passed in by the caller and queried on every
//! callback.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::geometry::{PhysicalSize, PlaneAlignment, PlaneDescriptor, Pose};
use crate::world_map::WorldMapSnapshot;

/// Camera tracking quality reported by the subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    #[default]
    NotAvailable,
    Initializing,
    Limited,
    Normal,
}

impl TrackingState {
    #[inline]
    pub fn is_nominal(self) -> bool {
        self == TrackingState::Normal
    }
}

/// World-space ray restricted to planes of one alignment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RaycastQuery {
    pub origin: Point3<f32>,
    pub direction: Vector3<f32>,
    pub alignment: PlaneAlignment,
}

impl RaycastQuery {
    /// Straight-down ray against horizontal planes.
    pub fn downward(origin: Point3<f32>) -> Self {
        Self {
            origin,
            direction: -Vector3::y(),
            alignment: PlaneAlignment::Horizontal,
        }
    }
}

/// Camera frame grabbed for a reference photo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapturedImage {
    pub data: Vec<u8>,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

/// An image registered with the subsystem for pose-accurate detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectableImage {
    /// Encoded fiducial name, echoed back in detection events.
    pub name: String,
    pub data: Vec<u8>,
    pub physical_size: PhysicalSize,
}

/// Narrow view of the tracking subsystem consumed by capture and relocalization.
pub trait TrackingSession {
    fn tracking_state(&self) -> TrackingState;

    fn camera_pose(&self) -> Option<Pose>;

    /// Currently tracked planes.
    fn planes(&self) -> Vec<PlaneDescriptor>;

    /// Raw 3D feature points of the current frame.
    fn raw_feature_points(&self) -> Vec<Point3<f32>>;

    fn raycast(&self, query: &RaycastQuery) -> Option<Point3<f32>>;

    /// Replace the set of images the subsystem is looking for.
    ///
    /// `max_tracked` bounds how many of them are tracked simultaneously.
    fn configure_detection(&mut self, images: &[DetectableImage], max_tracked: usize);

    /// Grab the current camera image, if one is available.
    fn capture_image(&mut self) -> Option<CapturedImage>;

    /// Restart tracking seeded with a stored map snapshot.
    fn run_with_world_map(&mut self, snapshot: &WorldMapSnapshot);

    /// Horizontal planes currently tracked.
    fn horizontal_planes(&self) -> Vec<PlaneDescriptor> {
        self.planes().into_iter().filter(|p| p.is_horizontal()).collect()
    }
}
