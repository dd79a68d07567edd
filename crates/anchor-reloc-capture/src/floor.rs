//! Precision floor calibration: ties a floor-marker photo to the anchor.

use anchor_reloc_core::{
    flatness, pose_from_position, precise_floor_point, world_to_local, AnchorPackage,
    FloorMarkerCapture, PhysicalSize, Pose, MIN_FLOOR_FLATNESS,
};
use log::{info, warn};
use nalgebra::Point2;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("detected floor marker pose is not finite")]
    NonFinitePose,
    #[error("floor marker physical size must be positive, got {width_m}x{height_m} m")]
    InvalidSize { width_m: f32, height_m: f32 },
    #[error("floor marker is not lying flat (normal . up = {flatness:.3})")]
    MarkerNotFlat { flatness: f32 },
}

/// Floor-marker photo plus where the tracking subsystem detected it.
///
/// Both must come from the session in which the package's anchor position
/// is valid.
#[derive(Clone, Debug, PartialEq)]
pub struct FloorCalibrationDraft {
    pub image_data: Vec<u8>,
    /// Pixel dimensions `[width, height]`.
    pub image_size: [u32; 2],
    pub detected_pose: Pose,
}

/// Attach a floor marker and its offset transform to `package`.
///
/// `normalized` is the user-marked image coordinate (top-left origin, clamped
/// into `[0,1]²`). The stored transform's translation is the anchor position
/// relative to the precise floor point, expressed in the marker's local axes
/// so it can be re-applied under whatever yaw the marker is detected with
/// later. `size` is stored with the marker so recovery measures the same
/// offset. Returns the stored transform.
pub fn attach_floor_calibration(
    package: &mut AnchorPackage,
    draft: FloorCalibrationDraft,
    normalized: Point2<f32>,
    size: PhysicalSize,
) -> Result<Pose, CalibrationError> {
    if draft.detected_pose.iter().any(|v| !v.is_finite()) {
        return Err(CalibrationError::NonFinitePose);
    }
    if !(size.width_m > 0.0 && size.height_m > 0.0) {
        return Err(CalibrationError::InvalidSize {
            width_m: size.width_m,
            height_m: size.height_m,
        });
    }
    let f = flatness(&draft.detected_pose);
    if f < MIN_FLOOR_FLATNESS {
        warn!("refusing floor calibration for package {}: flatness {f:.3}", package.id);
        return Err(CalibrationError::MarkerNotFlat { flatness: f });
    }

    let capture = FloorMarkerCapture::new(draft.image_data, normalized, draft.image_size).with_physical_size(size);
    let precise = precise_floor_point(&draft.detected_pose, capture.marker_coordinates, size);
    let local = world_to_local(&draft.detected_pose, package.anchor_position - precise);
    let offset = pose_from_position(local.into());

    info!(
        "floor calibration attached to package {}: offset ({:.3}, {:.3}, {:.3})",
        package.id, local.x, local.y, local.z
    );
    package.floor_marker = Some(capture);
    package.floor_marker_to_anchor = Some(offset);
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_reloc_core::offset_translation;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Rotation3, Vector3};
    use uuid::Uuid;

    fn package_at(anchor: Point3<f32>) -> AnchorPackage {
        AnchorPackage::new(Uuid::new_v4(), Point2::origin(), anchor, Pose::identity())
    }

    fn marker_pose(position: Point3<f32>, yaw: f32) -> Pose {
        let mut pose = Rotation3::from_axis_angle(&Vector3::y_axis(), yaw).to_homogeneous();
        pose[(0, 3)] = position.x;
        pose[(1, 3)] = position.y;
        pose[(2, 3)] = position.z;
        pose
    }

    #[test]
    fn marker_on_anchor_gives_zero_offset() {
        let anchor = Point3::new(1.0, -1.2, 2.0);
        let mut p = package_at(anchor);
        let draft = FloorCalibrationDraft {
            image_data: vec![1],
            image_size: [100, 100],
            detected_pose: marker_pose(anchor, 0.4),
        };
        let size = PhysicalSize::from_width_and_pixels(0.3, 100, 100);
        let offset = attach_floor_calibration(&mut p, draft, Point2::new(0.5, 0.5), size).expect("calibrate");
        assert_relative_eq!(offset_translation(&offset), Vector3::zeros(), epsilon = 1e-6);
        assert!(p.validate().is_ok());
        assert!(p.precision_calibration().is_some());
    }

    #[test]
    fn offset_is_expressed_in_marker_axes() {
        let anchor = Point3::new(0.0, -1.0, 0.0);
        let mut p = package_at(anchor);
        // Marker center 1 m east of the anchor, rotated a quarter turn.
        let draft = FloorCalibrationDraft {
            image_data: vec![],
            image_size: [10, 10],
            detected_pose: marker_pose(Point3::new(1.0, -1.0, 0.0), std::f32::consts::FRAC_PI_2),
        };
        let size = PhysicalSize {
            width_m: 0.2,
            height_m: 0.2,
        };
        let offset = attach_floor_calibration(&mut p, draft, Point2::new(0.5, 0.5), size).expect("calibrate");
        // After +90° yaw the marker's forward axis points to world +x.
        assert_relative_eq!(offset_translation(&offset), Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
    }

    #[test]
    fn tilted_marker_is_rejected() {
        let mut p = package_at(Point3::origin());
        let tilted = Rotation3::from_axis_angle(&Vector3::x_axis(), 1.0).to_homogeneous();
        let draft = FloorCalibrationDraft {
            image_data: vec![],
            image_size: [10, 10],
            detected_pose: tilted,
        };
        let err = attach_floor_calibration(
            &mut p,
            draft,
            Point2::new(0.5, 0.5),
            PhysicalSize {
                width_m: 0.2,
                height_m: 0.2,
            },
        )
        .expect_err("tilted");
        assert!(matches!(err, CalibrationError::MarkerNotFlat { .. }));
        assert!(p.floor_marker.is_none());
    }
}
