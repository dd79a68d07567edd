use anchor_reloc::core::{
    AnchorPackage, CaptureType, PlaneDescriptor, Pose, ReferenceImage, TrackingState,
};
use anchor_reloc::engine::{DetectionPhase, EngineEvent, RecoveryPath, RelocalizationState};
use anchor_reloc::fiducial::FiducialName;
use anchor_reloc::replay::{PoseSpec, ReplayEvent, ReplayScenario, ReplayStep};
use approx::assert_relative_eq;
use nalgebra::{Point2, Point3};
use uuid::Uuid;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn wall_package() -> AnchorPackage {
    let mut p = AnchorPackage::new(Uuid::new_v4(), Point2::new(7.0, 1.0), Point3::origin(), Pose::identity());
    p.reference_images = [CaptureType::WallEast, CaptureType::FloorFar]
        .into_iter()
        .map(|t| ReferenceImage::new(t, vec![5; 8], 400, 400))
        .collect();
    p
}

#[test]
fn wall_detection_waits_for_ground_then_places() {
    init_logs();
    let package = wall_package();
    let wall = FiducialName::reference(package.id, CaptureType::WallEast).to_string();
    let scenario = ReplayScenario {
        packages: vec![package],
        initial_state: TrackingState::Normal,
        initial_camera: Some(Point3::new(0.0, 0.4, 0.0)),
        events: vec![
            ReplayEvent {
                at_s: 1.0,
                step: ReplayStep::Detection {
                    name: wall.clone(),
                    pose: PoseSpec {
                        position: Point3::new(2.0, 0.5, -3.0),
                        yaw_deg: 0.0,
                        tilt_deg: 90.0,
                    },
                },
            },
            ReplayEvent {
                at_s: 4.0,
                step: ReplayStep::Plane {
                    plane: PlaneDescriptor::horizontal(Uuid::new_v4(), Point3::new(0.0, -1.2, 0.0), 10.0, 10.0),
                },
            },
        ],
        duration_s: 6.0,
        ..ReplayScenario::default()
    };

    let report = scenario.run().expect("replay");
    assert_eq!(report.fiducials, 2);
    assert_eq!(report.detections[0].outcome, "deferred");
    assert_eq!(report.final_state, RelocalizationState::Success);
    assert_eq!(report.placed.len(), 1);
    assert_eq!(report.placed[0].path, RecoveryPath::Fallback);
    assert_relative_eq!(report.placed[0].position, Point3::new(2.0, -1.2, -3.0), epsilon = 1e-6);
    assert!(report
        .events
        .iter()
        .any(|e| matches!(e, EngineEvent::DetectionDeferred { .. })));
    // Phases only move forward.
    let mut last = DetectionPhase::Idle;
    for e in &report.events {
        if let EngineEvent::PhaseChanged { from, to } = e {
            assert_eq!(*from, last);
            assert!(to > from);
            last = *to;
        }
    }
}

#[test]
fn scenario_round_trips_through_json() {
    init_logs();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("s.json");
    let scenario = ReplayScenario {
        packages: vec![wall_package()],
        duration_s: 2.0,
        ..ReplayScenario::default()
    };
    scenario.write_json(&path).expect("write");
    let loaded = ReplayScenario::load_json(&path).expect("load");
    assert_eq!(loaded, scenario);
}
