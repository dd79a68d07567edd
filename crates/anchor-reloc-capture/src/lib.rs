//! Capture-time pipeline for anchor packages.
//!
//! A [`CaptureSession`] accumulates feature points and planes around a
//! candidate anchor on a fixed tick, scores the evidence and fires automatic
//! reference photos as the score crosses fixed thresholds. A finalized
//! package can later be upgraded with a precision floor calibration via
//! [`attach_floor_calibration`].

mod floor;
mod quality;
mod schedule;
mod session;

pub use floor::{attach_floor_calibration, CalibrationError, FloorCalibrationDraft};
pub use quality::{
    instruction_text, quality_score, tracking_bonus, QualityAccumulator, QualityParams,
};
pub use schedule::{AutoCaptureSchedule, AutoCaptureThresholds, AutoCaptureTrigger};
pub use session::{CaptureConfig, CaptureError, CaptureSession, CaptureTarget, QualityUpdate};
