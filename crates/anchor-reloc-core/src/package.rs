//! Persisted anchor packages and the spatial evidence attached to them.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{PhysicalSize, PlaneDescriptor, Pose};

/// Direction a reference photo was taken in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureType {
    FloorFar,
    FloorClose,
    WallNorth,
    WallSouth,
    WallEast,
    WallWest,
    Signature,
}

impl CaptureType {
    pub const ALL: [CaptureType; 7] = [
        CaptureType::FloorFar,
        CaptureType::FloorClose,
        CaptureType::WallNorth,
        CaptureType::WallSouth,
        CaptureType::WallEast,
        CaptureType::WallWest,
        CaptureType::Signature,
    ];

    pub const WALLS: [CaptureType; 4] = [
        CaptureType::WallNorth,
        CaptureType::WallSouth,
        CaptureType::WallEast,
        CaptureType::WallWest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CaptureType::FloorFar => "floor_far",
            CaptureType::FloorClose => "floor_close",
            CaptureType::WallNorth => "wall_north",
            CaptureType::WallSouth => "wall_south",
            CaptureType::WallEast => "wall_east",
            CaptureType::WallWest => "wall_west",
            CaptureType::Signature => "signature",
        }
    }

    #[inline]
    pub fn is_wall(self) -> bool {
        Self::WALLS.contains(&self)
    }
}

impl fmt::Display for CaptureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown capture type `{0}`")]
pub struct UnknownCaptureType(pub String);

impl FromStr for CaptureType {
    type Err = UnknownCaptureType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CaptureType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownCaptureType(s.to_owned()))
    }
}

/// Reference photo stored with a package (encoded image bytes).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceImage {
    pub id: Uuid,
    pub capture_type: CaptureType,
    pub image_data: Vec<u8>,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub captured_at: SystemTime,
}

impl ReferenceImage {
    pub fn new(capture_type: CaptureType, image_data: Vec<u8>, pixel_width: u32, pixel_height: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            capture_type,
            image_data,
            pixel_width,
            pixel_height,
            captured_at: SystemTime::now(),
        }
    }
}

/// Raw feature points gathered around the anchor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureCloud {
    pub points: Vec<Point3<f32>>,
    pub center: Point3<f32>,
    pub radius_m: f32,
}

impl FeatureCloud {
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

/// Immutable capture-time snapshot; diagnostics only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpatialData {
    pub feature_cloud: FeatureCloud,
    pub planes: Vec<PlaneDescriptor>,
}

impl SpatialData {
    pub fn empty(center: Point3<f32>) -> Self {
        Self {
            feature_cloud: FeatureCloud {
                points: Vec::new(),
                center,
                radius_m: 0.0,
            },
            planes: Vec::new(),
        }
    }

    /// Approximate in-memory payload size in bytes.
    pub fn total_data_size(&self) -> usize {
        self.feature_cloud.points.len() * std::mem::size_of::<Point3<f32>>()
            + self.planes.len() * std::mem::size_of::<PlaneDescriptor>()
    }
}

/// Downward photo with a user-marked pixel for the true anchor projection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FloorMarkerCapture {
    pub image_data: Vec<u8>,
    /// Normalized `[0,1]²` coordinate, top-left origin.
    pub marker_coordinates: Point2<f32>,
    /// Original pixel dimensions `[width, height]`.
    pub image_size: [u32; 2],
    /// Printed size the calibration offset was computed with.
    #[serde(default)]
    pub physical_size: Option<PhysicalSize>,
    pub captured_at: SystemTime,
}

impl FloorMarkerCapture {
    /// Build a capture from user input, clamping the coordinate into `[0,1]²`.
    pub fn new(image_data: Vec<u8>, marker_coordinates: Point2<f32>, image_size: [u32; 2]) -> Self {
        Self {
            image_data,
            marker_coordinates: Point2::new(
                clamp_unit(marker_coordinates.x),
                clamp_unit(marker_coordinates.y),
            ),
            image_size,
            physical_size: None,
            captured_at: SystemTime::now(),
        }
    }

    pub fn with_physical_size(mut self, size: PhysicalSize) -> Self {
        self.physical_size = Some(size);
        self
    }

    pub fn has_normalized_coordinates(&self) -> bool {
        let c = self.marker_coordinates;
        (0.0..=1.0).contains(&c.x) && (0.0..=1.0).contains(&c.y)
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.5
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PackageError {
    #[error("package {0} has a floor-marker offset transform but no floor marker capture")]
    OffsetWithoutFloorMarker(Uuid),
    #[error("package {id} floor marker coordinates ({x}, {y}) are outside [0,1]")]
    MarkerCoordinatesOutOfRange { id: Uuid, x: f32, y: f32 },
}

/// Everything persisted for one physical map point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnchorPackage {
    pub id: Uuid,
    pub map_point_id: Uuid,
    /// 2D map coordinate the anchor stands for.
    pub map_coordinates: Point2<f32>,
    /// Anchor position in the (stale) capture session.
    pub anchor_position: Point3<f32>,
    /// Camera transform at capture time (stale).
    pub capture_transform: Pose,
    pub captured_at: SystemTime,
    pub spatial_data: SpatialData,
    #[serde(default)]
    pub reference_images: Vec<ReferenceImage>,
    #[serde(default)]
    pub visual_description: Option<String>,
    #[serde(default)]
    pub floor_marker: Option<FloorMarkerCapture>,
    /// Marker-local offset from the precise floor point to the anchor.
    #[serde(default)]
    pub floor_marker_to_anchor: Option<Pose>,
}

impl AnchorPackage {
    pub fn new(
        map_point_id: Uuid,
        map_coordinates: Point2<f32>,
        anchor_position: Point3<f32>,
        capture_transform: Pose,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            map_point_id,
            map_coordinates,
            anchor_position,
            capture_transform,
            captured_at: SystemTime::now(),
            spatial_data: SpatialData::empty(anchor_position),
            reference_images: Vec::new(),
            visual_description: None,
            floor_marker: None,
            floor_marker_to_anchor: None,
        }
    }

    /// Check the persisted invariants.
    pub fn validate(&self) -> Result<(), PackageError> {
        if self.floor_marker_to_anchor.is_some() && self.floor_marker.is_none() {
            return Err(PackageError::OffsetWithoutFloorMarker(self.id));
        }
        if let Some(marker) = &self.floor_marker {
            if !marker.has_normalized_coordinates() {
                return Err(PackageError::MarkerCoordinatesOutOfRange {
                    id: self.id,
                    x: marker.marker_coordinates.x,
                    y: marker.marker_coordinates.y,
                });
            }
        }
        Ok(())
    }

    /// Floor marker and offset, when both are present.
    pub fn precision_calibration(&self) -> Option<(&FloorMarkerCapture, &Pose)> {
        Some((self.floor_marker.as_ref()?, self.floor_marker_to_anchor.as_ref()?))
    }

    pub fn reference_image(&self, capture_type: CaptureType) -> Option<&ReferenceImage> {
        self.reference_images
            .iter()
            .find(|img| img.capture_type == capture_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package() -> AnchorPackage {
        AnchorPackage::new(
            Uuid::new_v4(),
            Point2::new(120.0, 48.0),
            Point3::new(0.0, -1.2, 0.5),
            Pose::identity(),
        )
    }

    #[test]
    fn capture_type_names_round_trip() {
        for t in CaptureType::ALL {
            assert_eq!(t.as_str().parse::<CaptureType>(), Ok(t));
        }
        assert!("ceiling".parse::<CaptureType>().is_err());
    }

    #[test]
    fn offset_requires_floor_marker() {
        let mut p = package();
        assert!(p.validate().is_ok());
        p.floor_marker_to_anchor = Some(Pose::identity());
        assert_eq!(p.validate(), Err(PackageError::OffsetWithoutFloorMarker(p.id)));

        p.floor_marker = Some(FloorMarkerCapture::new(vec![1, 2, 3], Point2::new(0.4, 0.6), [640, 480]));
        assert!(p.validate().is_ok());
        assert!(p.precision_calibration().is_some());
    }

    #[test]
    fn floor_marker_without_offset_is_valid() {
        let mut p = package();
        p.floor_marker = Some(FloorMarkerCapture::new(vec![], Point2::new(0.5, 0.5), [10, 10]));
        assert!(p.validate().is_ok());
        assert!(p.precision_calibration().is_none());
    }

    #[test]
    fn marker_coordinates_are_clamped() {
        let m = FloorMarkerCapture::new(vec![], Point2::new(-0.3, 1.7), [10, 10]);
        assert_eq!(m.marker_coordinates, Point2::new(0.0, 1.0));
        let nan = FloorMarkerCapture::new(vec![], Point2::new(f32::NAN, 0.2), [10, 10]);
        assert_eq!(nan.marker_coordinates, Point2::new(0.5, 0.2));
    }

    #[test]
    fn package_survives_json() {
        let mut p = package();
        p.reference_images
            .push(ReferenceImage::new(CaptureType::WallEast, vec![9; 4], 4, 3));
        let json = serde_json::to_string(&p).expect("serialize");
        let back: AnchorPackage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, p);
        assert!(back.reference_image(CaptureType::WallEast).is_some());
    }
}
