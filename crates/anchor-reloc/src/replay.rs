//! Deterministic replay of a recorded relocalization session.
//!
//! A [`ReplayScenario`] is a timeline of tracking changes and fiducial
//! detections. [`ReplayScenario::run`] feeds it through a
//! [`RelocalizationEngine`] driven by [`SimulatedTracking`] and returns a
//! serializable [`ReplayReport`].

use std::fs;
use std::path::Path;

use anchor_reloc_core::{AnchorPackage, PlaneDescriptor, Pose, SimulatedTracking, TrackingState};
use anchor_reloc_engine::{
    DetectionOutcome, DetectionPhase, EngineEvent, PlacedAnchor, RelocalizationConfig,
    RelocalizationEngine, RelocalizationState,
};
use log::{debug, info};
use nalgebra::{Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("replay tick interval must be positive, got {0}")]
    InvalidTick(f64),
}

/// Position plus yaw/tilt in degrees; enough to describe any detected image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseSpec {
    pub position: Point3<f32>,
    /// Rotation about world +Y.
    #[serde(default)]
    pub yaw_deg: f32,
    /// Rotation about the image's right axis, applied before yaw.
    #[serde(default)]
    pub tilt_deg: f32,
}

impl PoseSpec {
    pub fn at(position: Point3<f32>) -> Self {
        Self {
            position,
            yaw_deg: 0.0,
            tilt_deg: 0.0,
        }
    }

    pub fn to_pose(&self) -> Pose {
        let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), self.yaw_deg.to_radians())
            * Rotation3::from_axis_angle(&Vector3::x_axis(), self.tilt_deg.to_radians());
        let mut pose = rotation.to_homogeneous();
        pose[(0, 3)] = self.position.x;
        pose[(1, 3)] = self.position.y;
        pose[(2, 3)] = self.position.z;
        pose
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayStep {
    Tracking { state: TrackingState },
    Camera { position: Point3<f32> },
    /// Add or replace a plane; triggers a planes-updated callback.
    Plane { plane: PlaneDescriptor },
    Detection { name: String, pose: PoseSpec },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayEvent {
    pub at_s: f64,
    #[serde(flatten)]
    pub step: ReplayStep,
}

fn default_tick_s() -> f64 {
    0.1
}

fn default_duration_s() -> f64 {
    20.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayScenario {
    #[serde(default)]
    pub config: RelocalizationConfig,
    #[serde(default)]
    pub packages: Vec<AnchorPackage>,
    #[serde(default)]
    pub initial_state: TrackingState,
    #[serde(default)]
    pub initial_camera: Option<Point3<f32>>,
    #[serde(default)]
    pub initial_planes: Vec<PlaneDescriptor>,
    #[serde(default)]
    pub events: Vec<ReplayEvent>,
    #[serde(default = "default_tick_s")]
    pub tick_s: f64,
    #[serde(default = "default_duration_s")]
    pub duration_s: f64,
}

impl Default for ReplayScenario {
    fn default() -> Self {
        Self {
            config: RelocalizationConfig::default(),
            packages: Vec::new(),
            initial_state: TrackingState::default(),
            initial_camera: None,
            initial_planes: Vec::new(),
            events: Vec::new(),
            tick_s: default_tick_s(),
            duration_s: default_duration_s(),
        }
    }
}

/// How one replayed detection was handled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub at_s: f64,
    pub name: String,
    pub outcome: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReplayReport {
    pub fiducials: usize,
    pub final_state: RelocalizationState,
    pub final_phase: DetectionPhase,
    pub status: String,
    pub placed: Vec<PlacedAnchor>,
    pub detections: Vec<DetectionRecord>,
    pub events: Vec<EngineEvent>,
    pub ended_at_s: f64,
}

impl ReplayScenario {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReplayError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Replay with the scenario's own packages.
    pub fn run(&self) -> Result<ReplayReport, ReplayError> {
        self.run_with_packages(self.packages.clone())
    }

    /// Replay against `packages` instead of the embedded ones.
    ///
    /// The engine is ticked every `tick_s` until `duration_s`, or until the
    /// session fails. Events scheduled at or before a tick are applied, in
    /// timeline order, before that tick.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, packages), fields(events = self.events.len())))]
    pub fn run_with_packages(&self, packages: Vec<AnchorPackage>) -> Result<ReplayReport, ReplayError> {
        if !(self.tick_s > 0.0) {
            return Err(ReplayError::InvalidTick(self.tick_s));
        }

        let mut tracking = SimulatedTracking::new().with_state(self.initial_state);
        tracking.camera = self.initial_camera.map(|p| Pose::new_translation(&p.coords));
        tracking.planes = self.initial_planes.clone();

        let mut timeline = self.events.clone();
        timeline.sort_by(|a, b| a.at_s.total_cmp(&b.at_s));

        let mut engine = RelocalizationEngine::new(tracking, self.config.clone());
        let fiducials = engine.start(packages, 0.0);
        let mut events = engine.take_events();
        let mut detections = Vec::new();

        let mut next = 0;
        let mut step = 1u64;
        let mut now = 0.0;
        while now < self.duration_s {
            now = (step as f64 * self.tick_s).min(self.duration_s);
            step += 1;

            while next < timeline.len() && timeline[next].at_s <= now {
                let event = &timeline[next];
                next += 1;
                if let Some(record) = apply(&mut engine, event) {
                    detections.push(record);
                }
            }
            engine.tick(now);
            events.extend(engine.take_events());

            if engine.state() == RelocalizationState::Failed {
                debug!("replay stopped at {now:.2} s: session failed");
                break;
            }
        }

        info!(
            "replay finished at {now:.2} s in state {} with {} anchor(s)",
            engine.state(),
            engine.placed_anchors().len()
        );
        Ok(ReplayReport {
            fiducials,
            final_state: engine.state(),
            final_phase: engine.current_phase(),
            status: engine.status_text().to_owned(),
            placed: engine.placed_anchors().to_vec(),
            detections,
            events,
            ended_at_s: now,
        })
    }
}

fn apply(engine: &mut RelocalizationEngine<SimulatedTracking>, event: &ReplayEvent) -> Option<DetectionRecord> {
    match &event.step {
        ReplayStep::Tracking { state } => {
            engine.tracking_mut().state = *state;
            None
        }
        ReplayStep::Camera { position } => {
            engine.tracking_mut().camera = Some(Pose::new_translation(&position.coords));
            None
        }
        ReplayStep::Plane { plane } => {
            engine.tracking_mut().upsert_plane(plane.clone());
            engine.on_planes_updated(event.at_s);
            None
        }
        ReplayStep::Detection { name, pose } => {
            let outcome = match engine.on_image_detected(name, pose.to_pose(), event.at_s) {
                DetectionOutcome::Placed(_) => "placed".to_owned(),
                DetectionOutcome::Deferred => "deferred".to_owned(),
                DetectionOutcome::Duplicate => "duplicate".to_owned(),
                DetectionOutcome::Ignored(e) => format!("ignored: {e}"),
            };
            Some(DetectionRecord {
                at_s: event.at_s,
                name: name.clone(),
                outcome,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pose_spec_applies_tilt_then_yaw() {
        let spec = PoseSpec {
            position: Point3::new(1.0, 2.0, 3.0),
            yaw_deg: 90.0,
            tilt_deg: 0.0,
        };
        let pose = spec.to_pose();
        assert_relative_eq!(pose[(0, 3)], 1.0);
        // right axis (col 0) rotated from +x to -z.
        assert_relative_eq!(pose[(2, 0)], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn scenario_defaults_fill_missing_fields() {
        let s: ReplayScenario = serde_json::from_str("{}").expect("parse");
        assert_eq!(s.tick_s, 0.1);
        assert_eq!(s.duration_s, 20.0);
        assert!(s.events.is_empty());
    }

    #[test]
    fn event_json_is_flat() {
        let raw = r#"{"at_s": 1.5, "type": "camera", "position": [0.0, 1.4, 0.0]}"#;
        let e: ReplayEvent = serde_json::from_str(raw).expect("parse");
        assert_eq!(e.step, ReplayStep::Camera { position: Point3::new(0.0, 1.4, 0.0) });
    }

    #[test]
    fn empty_scenario_times_out() {
        let report = ReplayScenario::default().run().expect("replay");
        assert_eq!(report.fiducials, 0);
        assert_eq!(report.final_state, RelocalizationState::Failed);
        assert_relative_eq!(report.ended_at_s, 15.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_tick_is_rejected() {
        let s = ReplayScenario {
            tick_s: 0.0,
            ..ReplayScenario::default()
        };
        assert!(matches!(s.run(), Err(ReplayError::InvalidTick(_))));
    }
}
