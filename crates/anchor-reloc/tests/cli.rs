use std::fs;

use anchor_reloc::core::{
    AnchorPackage, AnchorStore, CaptureType, FloorMarkerCapture, JsonFileStore, PlaneDescriptor,
    Pose, ReferenceImage, TrackingState,
};
use anchor_reloc::fiducial::FiducialName;
use anchor_reloc::replay::{PoseSpec, ReplayEvent, ReplayScenario, ReplayStep};
use assert_cmd::Command;
use nalgebra::{Point2, Point3};
use predicates::prelude::*;
use uuid::Uuid;

fn calibrated_package() -> AnchorPackage {
    let mut p = AnchorPackage::new(Uuid::new_v4(), Point2::new(3.0, 4.0), Point3::origin(), Pose::identity());
    p.reference_images
        .push(ReferenceImage::new(CaptureType::FloorFar, vec![1, 2], 640, 480));
    p.floor_marker = Some(FloorMarkerCapture::new(vec![3, 4], Point2::new(0.5, 0.5), [100, 100]));
    p.floor_marker_to_anchor = Some(Pose::identity());
    p
}

fn scenario(package: &AnchorPackage) -> ReplayScenario {
    ReplayScenario {
        packages: vec![package.clone()],
        initial_state: TrackingState::Normal,
        initial_camera: Some(Point3::new(0.0, 0.4, 0.0)),
        events: vec![
            ReplayEvent {
                at_s: 0.4,
                step: ReplayStep::Plane {
                    plane: PlaneDescriptor::horizontal(Uuid::new_v4(), Point3::new(0.0, -1.0, 0.0), 6.0, 6.0),
                },
            },
            ReplayEvent {
                at_s: 1.2,
                step: ReplayStep::Detection {
                    name: FiducialName::floor_marker(package.id).to_string(),
                    pose: PoseSpec::at(Point3::new(0.8, -0.97, 1.1)),
                },
            },
        ],
        duration_s: 3.0,
        ..ReplayScenario::default()
    }
}

#[test]
fn default_config_is_printed() {
    Command::cargo_bin("anchor-reloc")
        .expect("binary")
        .arg("default-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"timeout_s\": 15.0"));
}

#[test]
fn replay_writes_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    let package = calibrated_package();
    let scenario_path = dir.path().join("scenario.json");
    scenario(&package).write_json(&scenario_path).expect("write scenario");
    let report_path = dir.path().join("report.json");

    Command::cargo_bin("anchor-reloc")
        .expect("binary")
        .arg("replay")
        .arg(&scenario_path)
        .arg("-o")
        .arg(&report_path)
        .assert()
        .success();

    let raw = fs::read_to_string(&report_path).expect("report");
    let report: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(report["final_state"], "success");
    assert_eq!(report["placed"][0]["path"], "precision");
    assert_eq!(report["detections"][0]["outcome"], "placed");
}

#[test]
fn replay_can_load_packages_from_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let package = calibrated_package();
    let mut store = JsonFileStore::open(dir.path().join("store")).expect("store");
    store.save_package(&package).expect("save");

    let mut s = scenario(&package);
    s.packages.clear();
    let scenario_path = dir.path().join("scenario.json");
    s.write_json(&scenario_path).expect("write scenario");

    Command::cargo_bin("anchor-reloc")
        .expect("binary")
        .arg("replay")
        .arg(&scenario_path)
        .arg("--store")
        .arg(dir.path().join("store"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"final_state\": \"success\""));
}

#[test]
fn catalog_lists_floor_marker_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let package = calibrated_package();
    let mut store = JsonFileStore::open(dir.path()).expect("store");
    store.save_package(&package).expect("save");

    let marker = FiducialName::floor_marker(package.id).to_string();
    let output = Command::cargo_bin("anchor-reloc")
        .expect("binary")
        .arg("catalog")
        .arg(dir.path())
        .output()
        .expect("run");
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["packages"], 1);
    assert_eq!(report["fiducials"][0]["name"], marker.as_str());
    assert_eq!(report["fiducials"][1]["category"], "FloorMid");
}

#[test]
fn missing_scenario_fails() {
    Command::cargo_bin("anchor-reloc")
        .expect("binary")
        .args(["replay", "/definitely/not/here.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[cfg(feature = "tracing")]
#[test]
fn tracing_logs_stay_off_stdout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let package = calibrated_package();
    let mut store = JsonFileStore::open(dir.path()).expect("store");
    store.save_package(&package).expect("save");

    for json_logs in [false, true] {
        let mut cmd = Command::cargo_bin("anchor-reloc").expect("binary");
        cmd.env("RUST_LOG", "info").arg("catalog").arg(dir.path());
        if json_logs {
            cmd.arg("--json-logs");
        }
        let output = cmd.output().expect("run");
        assert!(output.status.success());
        let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout is pure json");
        assert_eq!(report["packages"], 1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("loaded 1 package(s)"), "stderr: {stderr}");
    }
}

#[cfg(not(feature = "tracing"))]
#[test]
fn json_logs_need_tracing_feature() {
    Command::cargo_bin("anchor-reloc")
        .expect("binary")
        .arg("--json-logs")
        .arg("default-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("tracing"));
}
