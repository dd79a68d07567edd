//! Interactive anchor capture: quality monitoring, auto-capture and finalize.

use anchor_reloc_core::{
    pose_position, AnchorPackage, CaptureType, FloorMarkerCapture, RaycastQuery, ReferenceImage,
    TrackingSession,
};
use log::{debug, info, warn};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::quality::{instruction_text, QualityAccumulator, QualityParams};
use crate::schedule::{AutoCaptureSchedule, AutoCaptureThresholds};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("a signature image is required before finalizing")]
    MissingSignature,
    #[error("no camera pose available")]
    NoCameraPose,
    #[error("no ground surface below the camera")]
    NoGroundHit,
    #[error("camera image unavailable for {0}")]
    NoCameraImage(CaptureType),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub quality: QualityParams,
    pub thresholds: AutoCaptureThresholds,
}

/// Result of one accumulation tick.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QualityUpdate {
    pub score: u8,
    pub instruction: &'static str,
    /// Reference photos taken automatically on this tick.
    pub captured: Vec<CaptureType>,
}

/// What a map point is being captured for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureTarget {
    pub map_point_id: Uuid,
    pub map_coordinates: Point2<f32>,
}

/// One in-progress capture around a candidate anchor position.
pub struct CaptureSession {
    target: CaptureTarget,
    accumulator: QualityAccumulator,
    schedule: AutoCaptureSchedule,
    tick_interval_s: f64,
    last_tick_s: Option<f64>,
    score: u8,
    reference_images: Vec<ReferenceImage>,
    floor_marker: Option<FloorMarkerCapture>,
}

impl CaptureSession {
    /// Begin capturing at a known world position.
    pub fn start(target: CaptureTarget, center: Point3<f32>, config: CaptureConfig) -> Self {
        info!(
            "capture started for map point {} at ({:.2}, {:.2}, {:.2})",
            target.map_point_id, center.x, center.y, center.z
        );
        Self {
            target,
            tick_interval_s: config.quality.tick_interval_s,
            accumulator: QualityAccumulator::new(center, config.quality),
            schedule: AutoCaptureSchedule::new(config.thresholds),
            last_tick_s: None,
            score: 0,
            reference_images: Vec::new(),
            floor_marker: None,
        }
    }

    /// Begin capturing at the ground point straight below the camera.
    pub fn start_below_camera<T: TrackingSession + ?Sized>(
        tracking: &T,
        target: CaptureTarget,
        config: CaptureConfig,
    ) -> Result<Self, CaptureError> {
        let camera = tracking.camera_pose().ok_or(CaptureError::NoCameraPose)?;
        let hit = tracking
            .raycast(&RaycastQuery::downward(pose_position(&camera)))
            .ok_or(CaptureError::NoGroundHit)?;
        Ok(Self::start(target, hit, config))
    }

    #[inline]
    pub fn center(&self) -> Point3<f32> {
        self.accumulator.center()
    }

    #[inline]
    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn accumulator(&self) -> &QualityAccumulator {
        &self.accumulator
    }

    pub fn reference_images(&self) -> &[ReferenceImage] {
        &self.reference_images
    }

    pub fn has_signature(&self) -> bool {
        self.reference_images
            .iter()
            .any(|img| img.capture_type == CaptureType::Signature)
    }

    /// Accumulate the current frame if the tick interval has elapsed.
    ///
    /// Returns `None` when called before the next tick is due.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, tracking)))]
    pub fn tick<T: TrackingSession + ?Sized>(&mut self, tracking: &mut T, now_s: f64) -> Option<QualityUpdate> {
        if let Some(last) = self.last_tick_s {
            if now_s - last < self.tick_interval_s {
                return None;
            }
        }
        self.last_tick_s = Some(now_s);

        let points = tracking.raw_feature_points();
        let planes = tracking.planes();
        let added = self.accumulator.ingest(&points, &planes);
        let score = self.accumulator.score(tracking.tracking_state());
        debug!(
            "capture tick: +{added} points ({} total), {} planes, score {score}",
            self.accumulator.point_count(),
            self.accumulator.plane_count()
        );
        self.score = score;

        let mut captured = Vec::new();
        for trigger in self.schedule.due(score) {
            for &capture_type in trigger.capture_types() {
                match self.capture_reference(tracking, capture_type) {
                    Ok(()) => captured.push(capture_type),
                    Err(e) => warn!("auto-capture skipped: {e}"),
                }
            }
        }

        Some(QualityUpdate {
            score,
            instruction: instruction_text(score),
            captured,
        })
    }

    fn capture_reference<T: TrackingSession + ?Sized>(
        &mut self,
        tracking: &mut T,
        capture_type: CaptureType,
    ) -> Result<(), CaptureError> {
        let image = tracking
            .capture_image()
            .ok_or(CaptureError::NoCameraImage(capture_type))?;
        self.reference_images.retain(|img| img.capture_type != capture_type);
        self.reference_images.push(ReferenceImage::new(
            capture_type,
            image.data,
            image.pixel_width,
            image.pixel_height,
        ));
        debug!("captured {capture_type} reference image");
        Ok(())
    }

    /// Take the user-triggered signature photo. Replaces an earlier one.
    pub fn capture_signature<T: TrackingSession + ?Sized>(&mut self, tracking: &mut T) -> Result<(), CaptureError> {
        self.capture_reference(tracking, CaptureType::Signature)
    }

    /// Take the downward floor-marker photo with its user-marked coordinate.
    ///
    /// The offset transform is attached separately by
    /// [`attach_floor_calibration`](crate::attach_floor_calibration).
    pub fn capture_floor_marker<T: TrackingSession + ?Sized>(
        &mut self,
        tracking: &mut T,
        normalized: Point2<f32>,
    ) -> Result<(), CaptureError> {
        let image = tracking
            .capture_image()
            .ok_or(CaptureError::NoCameraImage(CaptureType::FloorClose))?;
        self.floor_marker = Some(FloorMarkerCapture::new(
            image.data,
            normalized,
            [image.pixel_width, image.pixel_height],
        ));
        Ok(())
    }

    /// Freeze everything into a package.
    ///
    /// Fails without touching the session when no signature photo exists or
    /// the camera pose is unknown. After success the session is empty.
    pub fn finalize<T: TrackingSession + ?Sized>(&mut self, tracking: &T) -> Result<AnchorPackage, CaptureError> {
        if !self.has_signature() {
            return Err(CaptureError::MissingSignature);
        }
        let camera = tracking.camera_pose().ok_or(CaptureError::NoCameraPose)?;

        let center = self.accumulator.center();
        let params = self.accumulator.params().clone();
        let accumulator = std::mem::replace(&mut self.accumulator, QualityAccumulator::new(center, params));
        let mut package = AnchorPackage::new(
            self.target.map_point_id,
            self.target.map_coordinates,
            center,
            camera,
        );
        package.spatial_data = accumulator.into_spatial_data();
        package.reference_images = std::mem::take(&mut self.reference_images);
        package.floor_marker = self.floor_marker.take();

        info!(
            "capture finalized: package {} with {} points, {} planes, {} images, score {}",
            package.id,
            package.spatial_data.feature_cloud.point_count(),
            package.spatial_data.planes.len(),
            package.reference_images.len(),
            self.score
        );
        Ok(package)
    }

    /// Drop all accumulated state.
    pub fn discard(self) {
        info!(
            "capture for map point {} discarded ({} points)",
            self.target.map_point_id,
            self.accumulator.point_count()
        );
    }
}
