//! Core types for fiducial-based anchor relocalization.
//!
//! This crate holds the persisted data model, pose/plane geometry helpers and
//! the narrow [`TrackingSession`] interface through which the rest of the
//! workspace talks to the external tracking subsystem. It does *not* perform
//! any detection itself.

mod geometry;
mod logger;
mod package;
mod sim;
mod store;
mod tracking;
mod world_map;

pub use geometry::{
    flatness, local_to_world, marker_offset, nearest_plane_by_height, offset_translation,
    pose_forward, pose_from_position, pose_position, pose_right, pose_up, pose_with_position,
    precise_floor_point, project_to_nearest_plane, world_to_local, PhysicalSize, PlaneAlignment,
    PlaneDescriptor, PlaneExtent, Pose, MIN_FLOOR_FLATNESS, WORLD_UP,
};
pub use package::{
    AnchorPackage, CaptureType, FeatureCloud, FloorMarkerCapture, PackageError, ReferenceImage,
    SpatialData, UnknownCaptureType,
};
pub use sim::SimulatedTracking;
pub use store::{AnchorStore, JsonFileStore, MemoryStore, StoreError};
pub use tracking::{CapturedImage, DetectableImage, RaycastQuery, TrackingSession, TrackingState};
pub use world_map::{WorldMapPatchIndex, WorldMapPatchMeta, WorldMapSnapshot};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_for_verbosity};

pub use uuid::Uuid;
