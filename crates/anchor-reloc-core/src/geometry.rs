//! Pose and plane helpers.
//!
//! Poses are column-major `Matrix4<f32>` world transforms as delivered by the
//! tracking subsystem: column 0 is the local right axis, column 1 the local
//! up axis (the surface normal for detected images and planes), column 2 the
//! local forward axis and column 3 the translation. World +Y points up.

use nalgebra::{Matrix4, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// World up direction.
pub const WORLD_UP: Vector3<f32> = Vector3::new(0.0, 1.0, 0.0);

/// Minimum [`flatness`] for a floor marker to be treated as lying flat.
pub const MIN_FLOOR_FLATNESS: f32 = 0.9;

/// World-space rigid transform.
pub type Pose = Matrix4<f32>;

/// Translation column of a pose.
#[inline]
pub fn pose_position(pose: &Pose) -> Point3<f32> {
    Point3::new(pose[(0, 3)], pose[(1, 3)], pose[(2, 3)])
}

#[inline]
fn pose_axis(pose: &Pose, col: usize) -> Vector3<f32> {
    let v = Vector3::new(pose[(0, col)], pose[(1, col)], pose[(2, col)]);
    v.try_normalize(1e-9).unwrap_or(v)
}

/// Local +X axis (image right) in world space.
#[inline]
pub fn pose_right(pose: &Pose) -> Vector3<f32> {
    pose_axis(pose, 0)
}

/// Local +Y axis (surface normal) in world space.
#[inline]
pub fn pose_up(pose: &Pose) -> Vector3<f32> {
    pose_axis(pose, 1)
}

/// Local +Z axis (towards the image bottom edge) in world space.
#[inline]
pub fn pose_forward(pose: &Pose) -> Vector3<f32> {
    pose_axis(pose, 2)
}

/// Pure translation pose.
pub fn pose_from_position(p: Point3<f32>) -> Pose {
    Matrix4::new_translation(&p.coords)
}

/// Copy of `pose` with its translation replaced by `p`.
pub fn pose_with_position(pose: &Pose, p: Point3<f32>) -> Pose {
    let mut out = *pose;
    out[(0, 3)] = p.x;
    out[(1, 3)] = p.y;
    out[(2, 3)] = p.z;
    out
}

/// Physical extent of a flat fiducial, in meters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicalSize {
    pub width_m: f32,
    pub height_m: f32,
}

impl PhysicalSize {
    /// Size of an image printed `width_m` wide, keeping the pixel aspect ratio.
    ///
    /// Degenerate pixel dimensions fall back to a square.
    pub fn from_width_and_pixels(width_m: f32, pixel_width: u32, pixel_height: u32) -> Self {
        let height_m = if pixel_width > 0 && pixel_height > 0 {
            width_m * pixel_height as f32 / pixel_width as f32
        } else {
            width_m
        };
        Self { width_m, height_m }
    }
}

/// Physical offset (right, forward) from the image center for a normalized
/// image coordinate with top-left origin.
#[inline]
pub fn marker_offset(normalized: Point2<f32>, size: PhysicalSize) -> (f32, f32) {
    (
        (normalized.x - 0.5) * size.width_m,
        (normalized.y - 0.5) * size.height_m,
    )
}

/// World point under a normalized image coordinate of a detected fiducial.
///
/// `offset = right * dx + forward * dy`, added to the fiducial center.
pub fn precise_floor_point(pose: &Pose, normalized: Point2<f32>, size: PhysicalSize) -> Point3<f32> {
    let (dx, dy) = marker_offset(normalized, size);
    pose_position(pose) + pose_right(pose) * dx + pose_forward(pose) * dy
}

/// Express a world-space vector in the local axes of `pose` (right, up, forward).
pub fn world_to_local(pose: &Pose, v: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(
        pose_right(pose).dot(&v),
        pose_up(pose).dot(&v),
        pose_forward(pose).dot(&v),
    )
}

/// Inverse of [`world_to_local`].
pub fn local_to_world(pose: &Pose, v: Vector3<f32>) -> Vector3<f32> {
    pose_right(pose) * v.x + pose_up(pose) * v.y + pose_forward(pose) * v.z
}

/// Translation column of an offset transform, as a vector.
#[inline]
pub fn offset_translation(offset: &Pose) -> Vector3<f32> {
    Vector3::new(offset[(0, 3)], offset[(1, 3)], offset[(2, 3)])
}

/// Cosine between the fiducial normal and world up (1.0 for a flat floor image).
#[inline]
pub fn flatness(pose: &Pose) -> f32 {
    pose_up(pose).dot(&WORLD_UP)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaneAlignment {
    Horizontal,
    Vertical,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneExtent {
    pub width: f32,
    pub height: f32,
}

/// A tracked plane as reported by the tracking subsystem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneDescriptor {
    pub id: Uuid,
    pub transform: Pose,
    pub extent: PlaneExtent,
    pub alignment: PlaneAlignment,
}

impl PlaneDescriptor {
    /// Horizontal plane centered at `center`.
    pub fn horizontal(id: Uuid, center: Point3<f32>, width: f32, depth: f32) -> Self {
        Self {
            id,
            transform: pose_from_position(center),
            extent: PlaneExtent {
                width,
                height: depth,
            },
            alignment: PlaneAlignment::Horizontal,
        }
    }

    #[inline]
    pub fn center(&self) -> Point3<f32> {
        pose_position(&self.transform)
    }

    /// World height of the plane origin.
    #[inline]
    pub fn height(&self) -> f32 {
        self.transform[(1, 3)]
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.extent.width.max(0.0) * self.extent.height.max(0.0)
    }

    #[inline]
    pub fn is_horizontal(&self) -> bool {
        self.alignment == PlaneAlignment::Horizontal
    }

    /// True if `p` projects inside the plane extent (axis-aligned footprint).
    pub fn contains_xz(&self, p: Point3<f32>) -> bool {
        let c = self.center();
        (p.x - c.x).abs() <= 0.5 * self.extent.width && (p.z - c.z).abs() <= 0.5 * self.extent.height
    }
}

/// Horizontal plane whose height is closest to `y`.
pub fn nearest_plane_by_height(planes: &[PlaneDescriptor], y: f32) -> Option<&PlaneDescriptor> {
    planes
        .iter()
        .filter(|p| p.is_horizontal())
        .min_by(|a, b| {
            (a.height() - y)
                .abs()
                .partial_cmp(&(b.height() - y).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Replace the vertical coordinate of `p` with the height of the nearest
/// horizontal plane, if any.
pub fn project_to_nearest_plane(planes: &[PlaneDescriptor], p: Point3<f32>) -> Option<Point3<f32>> {
    nearest_plane_by_height(planes, p.y).map(|plane| Point3::new(p.x, plane.height(), p.z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Vector3};

    fn plane_at(y: f32) -> PlaneDescriptor {
        PlaneDescriptor::horizontal(Uuid::new_v4(), Point3::new(0.0, y, 0.0), 2.0, 2.0)
    }

    #[test]
    fn center_coordinate_has_no_offset() {
        let pose = pose_from_position(Point3::new(1.0, 0.2, -3.0));
        let size = PhysicalSize {
            width_m: 0.3,
            height_m: 0.2,
        };
        let p = precise_floor_point(&pose, Point2::new(0.5, 0.5), size);
        assert_relative_eq!(p, Point3::new(1.0, 0.2, -3.0), epsilon = 1e-6);
    }

    #[test]
    fn top_left_corner_moves_left_and_back() {
        let pose = pose_from_position(Point3::origin());
        let size = PhysicalSize {
            width_m: 0.4,
            height_m: 0.2,
        };
        let p = precise_floor_point(&pose, Point2::new(0.0, 0.0), size);
        assert_relative_eq!(p, Point3::new(-0.2, 0.0, -0.1), epsilon = 1e-6);
    }

    #[test]
    fn offset_follows_marker_yaw() {
        let rot = Rotation3::from_axis_angle(&Vector3::y_axis(), std::f32::consts::FRAC_PI_2);
        let pose = rot.to_homogeneous();
        let size = PhysicalSize {
            width_m: 1.0,
            height_m: 1.0,
        };
        // +x in marker space is -z in world after a +90° yaw.
        let p = precise_floor_point(&pose, Point2::new(1.0, 0.5), size);
        assert_relative_eq!(p, Point3::new(0.0, 0.0, -0.5), epsilon = 1e-6);
    }

    #[test]
    fn physical_size_keeps_aspect() {
        let s = PhysicalSize::from_width_and_pixels(0.5, 1000, 500);
        assert_relative_eq!(s.height_m, 0.25);
        let sq = PhysicalSize::from_width_and_pixels(0.5, 0, 0);
        assert_relative_eq!(sq.height_m, 0.5);
    }

    #[test]
    fn nearest_plane_ignores_vertical() {
        let mut wall = plane_at(0.1);
        wall.alignment = PlaneAlignment::Vertical;
        let planes = vec![wall, plane_at(-1.4), plane_at(0.7)];
        let nearest = nearest_plane_by_height(&planes, 0.0).expect("plane");
        assert_relative_eq!(nearest.height(), 0.7);
        let projected = project_to_nearest_plane(&planes, Point3::new(3.0, -1.0, 2.0)).expect("hit");
        assert_relative_eq!(projected, Point3::new(3.0, -1.4, 2.0));
    }

    #[test]
    fn local_offsets_round_trip_through_yaw() {
        let rot = Rotation3::from_axis_angle(&Vector3::y_axis(), 0.7);
        let pose = rot.to_homogeneous();
        let world = Vector3::new(0.3, -0.1, 1.2);
        let local = world_to_local(&pose, world);
        assert_relative_eq!(local_to_world(&pose, local), world, epsilon = 1e-5);
    }

    #[test]
    fn flatness_of_tilted_marker() {
        let tilt = Rotation3::from_axis_angle(&Vector3::x_axis(), std::f32::consts::FRAC_PI_3);
        assert_relative_eq!(flatness(&Pose::identity()), 1.0);
        assert_relative_eq!(flatness(&tilt.to_homogeneous()), 0.5, epsilon = 1e-6);
    }
}
