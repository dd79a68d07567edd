//! Transform recovery: detected fiducial pose -> anchor position.

use anchor_reloc_core::{
    flatness, local_to_world, nearest_plane_by_height, offset_translation, pose_position,
    precise_floor_point, project_to_nearest_plane, AnchorPackage, PhysicalSize, Pose,
    RaycastQuery, TrackingSession,
};
use anchor_reloc_fiducial::FiducialKind;
use log::{debug, warn};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("no ground plane to project onto")]
    NoGroundPlane,
}

/// Which recovery path produced a position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPath {
    /// Floor-marker calibration offset.
    Precision,
    /// Straight-down ground projection.
    Fallback,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecoveredAnchor {
    pub position: Point3<f32>,
    pub path: RecoveryPath,
}

/// Everything recovery needs about one detection.
#[derive(Clone, Copy, Debug)]
pub struct RecoveryInput<'a> {
    pub package: &'a AnchorPackage,
    pub kind: FiducialKind,
    pub detected_pose: &'a Pose,
    pub physical_size: PhysicalSize,
}

/// Recover the anchor position for a detection.
///
/// The precision path is taken when the detection is the package's floor
/// marker, the package carries an offset transform and the marker was
/// detected lying flat (`flatness >= min_flatness`). Everything else goes
/// through the fallback path. The result depends only on the inputs and the
/// tracking session's planes/raycast answers.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(input, tracking), fields(package = %input.package.id))
)]
pub fn recover_anchor<T: TrackingSession + ?Sized>(
    input: &RecoveryInput<'_>,
    tracking: &T,
    min_flatness: f32,
) -> Result<RecoveredAnchor, RecoveryError> {
    if input.kind.is_floor_marker() {
        if let Some((marker, offset)) = input.package.precision_calibration() {
            let f = flatness(input.detected_pose);
            if f >= min_flatness {
                let position = precision_position(
                    input.detected_pose,
                    marker.marker_coordinates,
                    input.physical_size,
                    offset,
                    &tracking.horizontal_planes(),
                );
                return Ok(RecoveredAnchor {
                    position,
                    path: RecoveryPath::Precision,
                });
            }
            warn!(
                "floor marker of package {} detected tilted (flatness {f:.3}), using ground projection",
                input.package.id
            );
        } else {
            debug!(
                "package {} has no floor calibration, using ground projection",
                input.package.id
            );
        }
    }

    fallback_position(input.detected_pose, tracking).map(|position| RecoveredAnchor {
        position,
        path: RecoveryPath::Fallback,
    })
}

fn precision_position(
    pose: &Pose,
    normalized: nalgebra::Point2<f32>,
    size: PhysicalSize,
    offset: &Pose,
    planes: &[anchor_reloc_core::PlaneDescriptor],
) -> Point3<f32> {
    let precise = precise_floor_point(pose, normalized, size);
    let candidate = precise + local_to_world(pose, offset_translation(offset));
    match project_to_nearest_plane(planes, candidate) {
        Some(projected) => projected,
        None => {
            debug!("no ground plane for precision candidate, keeping it unprojected");
            candidate
        }
    }
}

fn fallback_position<T: TrackingSession + ?Sized>(
    pose: &Pose,
    tracking: &T,
) -> Result<Point3<f32>, RecoveryError> {
    let origin = pose_position(pose);
    if let Some(hit) = tracking.raycast(&RaycastQuery::downward(origin)) {
        return Ok(hit);
    }
    debug!("downward raycast missed, using nearest plane height");
    let planes = tracking.horizontal_planes();
    nearest_plane_by_height(&planes, origin.y)
        .map(|plane| Point3::new(origin.x, plane.height(), origin.z))
        .ok_or(RecoveryError::NoGroundPlane)
}
