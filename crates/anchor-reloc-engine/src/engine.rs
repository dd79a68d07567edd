//! The fiducial relocalization engine.
//!
//! Single-threaded and callback driven: the caller forwards timer ticks,
//! plane updates and image detections together with the current time in
//! seconds. All observable changes are queued as [`EngineEvent`]s.

use std::collections::{HashMap, VecDeque};

use anchor_reloc_core::{pose_position, AnchorPackage, Pose, TrackingSession, TrackingState};
use anchor_reloc_fiducial::{FiducialCatalog, FiducialName};
use log::{debug, info, warn};
use nalgebra::{Point2, Point3};
use serde::Serialize;
use uuid::Uuid;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::RelocalizationConfig;
use crate::error::RelocalizationError;
use crate::phase::DetectionPhase;
use crate::recovery::{recover_anchor, RecoveredAnchor, RecoveryInput, RecoveryPath};
use crate::router::{DetectionRouter, RouteDecision};
use crate::search::ProgressiveSearchController;
use crate::state::{RelocalizationState, SessionState};

/// An anchor placed in the current session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlacedAnchor {
    pub package_id: Uuid,
    pub map_point_id: Uuid,
    pub map_coordinates: Point2<f32>,
    pub position: Point3<f32>,
    pub path: RecoveryPath,
    pub confidence: f32,
    pub fiducial: FiducialName,
    pub placed_at_s: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    StateChanged {
        from: RelocalizationState,
        to: RelocalizationState,
    },
    PhaseChanged {
        from: DetectionPhase,
        to: DetectionPhase,
    },
    AnchorPlaced(PlacedAnchor),
    DetectionDeferred {
        package_id: Uuid,
    },
}

/// Result of handing one detection to the engine.
#[derive(Debug)]
pub enum DetectionOutcome {
    Placed(PlacedAnchor),
    /// Waiting for a ground plane.
    Deferred,
    /// The package is already placed.
    Duplicate,
    Ignored(RelocalizationError),
}

enum Attempt {
    Recovered(RecoveredAnchor, Uuid, Point2<f32>),
    NoGround,
    Rejected(RelocalizationError),
}

#[derive(Clone, Copy, Debug)]
struct ReadinessRetry {
    attempts: u32,
    next_poll_s: f64,
}

pub struct RelocalizationEngine<T: TrackingSession> {
    tracking: T,
    config: RelocalizationConfig,
    catalog: FiducialCatalog,
    packages: HashMap<Uuid, AnchorPackage>,
    search: ProgressiveSearchController,
    router: DetectionRouter,
    session: SessionState,
    placed: Vec<PlacedAnchor>,
    events: VecDeque<EngineEvent>,
    readiness: Option<ReadinessRetry>,
}

impl<T: TrackingSession> RelocalizationEngine<T> {
    pub fn new(tracking: T, config: RelocalizationConfig) -> Self {
        Self {
            tracking,
            search: ProgressiveSearchController::new(config.stability_window),
            config,
            catalog: FiducialCatalog::default(),
            packages: HashMap::new(),
            router: DetectionRouter::new(),
            session: SessionState::default(),
            placed: Vec::new(),
            events: VecDeque::new(),
            readiness: None,
        }
    }

    pub fn tracking(&self) -> &T {
        &self.tracking
    }

    pub fn tracking_mut(&mut self) -> &mut T {
        &mut self.tracking
    }

    pub fn into_tracking(self) -> T {
        self.tracking
    }

    pub fn config(&self) -> &RelocalizationConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> RelocalizationState {
        self.session.state()
    }

    pub fn status_text(&self) -> &str {
        self.session.status()
    }

    #[inline]
    pub fn current_phase(&self) -> DetectionPhase {
        self.search.phase()
    }

    pub fn placed_anchors(&self) -> &[PlacedAnchor] {
        &self.placed
    }

    pub fn catalog(&self) -> &FiducialCatalog {
        &self.catalog
    }

    pub fn pending_count(&self) -> usize {
        self.router.pending_len()
    }

    pub fn detection_count(&self, package_id: &Uuid) -> u32 {
        self.router.detection_count(package_id)
    }

    /// True while activation is postponed until tracking is ready.
    pub fn is_waiting_for_tracking(&self) -> bool {
        self.readiness.is_some()
    }

    /// Drain queued events, oldest first.
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    /// Start a relocalization session over `packages`.
    ///
    /// Any running session is discarded first. Invalid packages are skipped.
    /// Returns the number of registered fiducials; zero is not an error, the
    /// session then idles in `ImageTracking` until it times out.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, packages), fields(packages = packages.len())))]
    pub fn start(&mut self, packages: Vec<AnchorPackage>, now_s: f64) -> usize {
        self.clear_session();

        let mut valid = Vec::with_capacity(packages.len());
        for package in packages {
            match package.validate() {
                Ok(()) => valid.push(package),
                Err(e) => warn!("skipping package: {e}"),
            }
        }
        self.catalog = FiducialCatalog::build(&valid, &self.config.catalog);
        self.packages = valid.into_iter().map(|p| (p.id, p)).collect();

        if let Some(from) = self
            .session
            .begin(now_s, RelocalizationState::Searching, "Preparing reference images...")
        {
            self.push_state_event(from);
        }
        info!(
            "relocalization started: {} packages, {} fiducials",
            self.packages.len(),
            self.catalog.len()
        );

        if self.catalog.is_empty() {
            warn!("{}", RelocalizationError::NoFiducialsAvailable);
            self.tracking.configure_detection(&[], 0);
            self.transition(
                RelocalizationState::ImageTracking,
                "No reference images available for this area",
            );
            return 0;
        }

        if self.tracking_ready() {
            self.activate(now_s);
        } else {
            debug!("tracking not ready, deferring fiducial activation");
            self.readiness = Some(ReadinessRetry {
                attempts: 0,
                next_poll_s: now_s + self.config.readiness_retry_s,
            });
            self.transition(
                RelocalizationState::Searching,
                "Waiting for tracking to stabilize...",
            );
        }
        self.catalog.len()
    }

    /// End the session: forget all transient state and unregister images.
    ///
    /// Stored packages are never touched.
    pub fn stop(&mut self) {
        info!("relocalization stopped in state {}", self.session.state());
        self.clear_session();
        if let Some(from) = self.session.reset() {
            self.push_state_event(from);
        }
    }

    fn clear_session(&mut self) {
        let phase = self.search.phase();
        if phase != DetectionPhase::Idle {
            self.events.push_back(EngineEvent::PhaseChanged {
                from: phase,
                to: DetectionPhase::Idle,
            });
        }
        self.search.reset();
        self.router.clear();
        self.placed.clear();
        self.packages.clear();
        self.catalog = FiducialCatalog::default();
        self.readiness = None;
        self.tracking.configure_detection(&[], 0);
    }

    /// Periodic timer callback.
    pub fn tick(&mut self, now_s: f64) {
        if !self.session.state().accepts_detections() {
            return;
        }
        if self.placed.is_empty() && self.session.timed_out(now_s, self.config.timeout_s) {
            self.fail();
            return;
        }

        if let Some(mut retry) = self.readiness {
            if now_s < retry.next_poll_s {
                return;
            }
            if self.tracking_ready() {
                debug!("tracking ready after {} poll(s)", retry.attempts + 1);
                self.activate(now_s);
            } else {
                retry.attempts += 1;
                retry.next_poll_s = now_s + self.config.readiness_retry_s;
                self.readiness = Some(retry);
            }
            return;
        }

        if self.search.phase() == DetectionPhase::Idle {
            return;
        }

        if let Some(camera) = self.tracking.camera_pose() {
            self.search.observe(pose_position(&camera));
        }
        if self.search.phase() < DetectionPhase::Precision
            && self.ground_available()
            && self.search.is_stable(self.config.stability_tolerance_m)
        {
            debug!("camera stable over ground, moving to precision search");
            self.change_phase(DetectionPhase::Precision, now_s);
        }

        if self
            .search
            .escalation_due(now_s, self.config.escalation_s, !self.placed.is_empty())
        {
            let from = self.search.phase();
            self.search.widen(now_s);
            let to = self.search.phase();
            if to != from {
                self.events.push_back(EngineEvent::PhaseChanged { from, to });
            }
            self.reconfigure();
            if !self.session.state().is_terminal() {
                self.transition(
                    RelocalizationState::ImageTracking,
                    "Still searching: looking for all reference images",
                );
            }
        }
    }

    /// Plane set changed. Drains deferred detections once ground exists.
    pub fn on_planes_updated(&mut self, now_s: f64) {
        if !self.session.state().accepts_detections() || !self.ground_available() {
            return;
        }
        if self.readiness.is_some() && self.tracking_ready() {
            self.activate(now_s);
        }

        let pending = self.router.take_pending();
        if pending.is_empty() {
            return;
        }
        info!("ground plane available, recovering {} deferred detection(s)", pending.len());
        for (package_id, detection) in pending {
            let name = FiducialName {
                package_id,
                kind: detection.kind,
            };
            self.recover_and_place(name, detection.pose, now_s);
        }
    }

    /// A tracked image was detected at `pose`.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, pose)))]
    pub fn on_image_detected(&mut self, name: &str, pose: Pose, now_s: f64) -> DetectionOutcome {
        if !self.session.state().accepts_detections() {
            return DetectionOutcome::Ignored(RelocalizationError::NotRunning);
        }
        let parsed: FiducialName = match name.parse() {
            Ok(n) => n,
            Err(e) => {
                warn!("ignoring detection: {e}");
                return DetectionOutcome::Ignored(RelocalizationError::UnknownFiducial(name.to_owned()));
            }
        };
        if self.catalog.get(&parsed).is_none() {
            warn!("ignoring detection of unregistered fiducial {name}");
            return DetectionOutcome::Ignored(RelocalizationError::UnknownFiducial(name.to_owned()));
        }

        let ground = self.ground_available();
        match self.router.route(&parsed, pose, ground) {
            RouteDecision::Duplicate => DetectionOutcome::Duplicate,
            RouteDecision::Deferred => {
                self.events.push_back(EngineEvent::DetectionDeferred {
                    package_id: parsed.package_id,
                });
                if !self.session.state().is_terminal() {
                    self.transition(
                        RelocalizationState::ImageTracking,
                        "Image found; scan the floor to detect a ground plane",
                    );
                }
                DetectionOutcome::Deferred
            }
            RouteDecision::Recover => self.recover_and_place(parsed, pose, now_s),
        }
    }

    fn recover_and_place(&mut self, name: FiducialName, pose: Pose, now_s: f64) -> DetectionOutcome {
        if !self.session.state().is_terminal() {
            self.transition(RelocalizationState::Validating, "Validating detected image...");
        }

        let attempt = {
            let package = self.packages.get(&name.package_id);
            let fiducial = self.catalog.get(&name);
            match (package, fiducial) {
                (Some(package), Some(fiducial)) => {
                    let input = RecoveryInput {
                        package,
                        kind: name.kind,
                        detected_pose: &pose,
                        physical_size: fiducial.physical_size(),
                    };
                    match recover_anchor(&input, &self.tracking, self.config.min_floor_marker_up_dot) {
                        Ok(r) => Attempt::Recovered(r, package.map_point_id, package.map_coordinates),
                        Err(e) => {
                            debug!("recovery for package {} deferred: {e}", package.id);
                            Attempt::NoGround
                        }
                    }
                }
                (None, _) => Attempt::Rejected(RelocalizationError::UnknownPackage(name.package_id)),
                (_, None) => Attempt::Rejected(RelocalizationError::UnknownFiducial(name.to_string())),
            }
        };

        match attempt {
            Attempt::Recovered(anchor, map_point_id, map_coordinates) => {
                self.place(name, anchor, map_point_id, map_coordinates, now_s)
            }
            Attempt::NoGround => {
                self.router.defer(name.package_id, pose, name.kind);
                self.events.push_back(EngineEvent::DetectionDeferred {
                    package_id: name.package_id,
                });
                if !self.session.state().is_terminal() {
                    self.transition(
                        RelocalizationState::ImageTracking,
                        "Image found; scan the floor to detect a ground plane",
                    );
                }
                DetectionOutcome::Deferred
            }
            Attempt::Rejected(e) => {
                warn!("cannot recover {name}: {e}");
                if !self.session.state().is_terminal() {
                    self.transition(RelocalizationState::ImageTracking, self.searching_status());
                }
                DetectionOutcome::Ignored(e)
            }
        }
    }

    fn place(
        &mut self,
        name: FiducialName,
        anchor: RecoveredAnchor,
        map_point_id: Uuid,
        map_coordinates: Point2<f32>,
        now_s: f64,
    ) -> DetectionOutcome {
        if !self.router.mark_placed(name.package_id) {
            return DetectionOutcome::Duplicate;
        }
        let confidence = match anchor.path {
            RecoveryPath::Precision => self.config.precision_confidence,
            RecoveryPath::Fallback => self.config.fallback_confidence,
        };
        let placed = PlacedAnchor {
            package_id: name.package_id,
            map_point_id,
            map_coordinates,
            position: anchor.position,
            path: anchor.path,
            confidence,
            fiducial: name,
            placed_at_s: now_s,
        };
        info!(
            "anchor for map point {} placed at ({:.3}, {:.3}, {:.3}) via {:?}",
            map_point_id, anchor.position.x, anchor.position.y, anchor.position.z, anchor.path
        );
        self.placed.push(placed.clone());
        self.events.push_back(EngineEvent::AnchorPlaced(placed.clone()));
        let status = format!("Anchor placed for {} map point(s)", self.placed.len());
        self.transition(RelocalizationState::Success, status);
        self.reconfigure();
        DetectionOutcome::Placed(placed)
    }

    fn fail(&mut self) {
        let err = RelocalizationError::Timeout(self.config.timeout_s);
        warn!("{err}");
        self.readiness = None;
        self.tracking.configure_detection(&[], 0);
        self.transition(
            RelocalizationState::Failed,
            format!("Relocalization timed out after {:.0} s. Retry or start fresh.", self.config.timeout_s),
        );
    }

    /// Pick the first phase and register its images.
    fn activate(&mut self, now_s: f64) {
        self.readiness = None;
        let phase = if self.ground_ready() {
            DetectionPhase::Precision
        } else {
            DetectionPhase::LongRange
        };
        self.change_phase(phase, now_s);
        if !self.session.state().is_terminal() {
            self.transition(RelocalizationState::ImageTracking, self.searching_status());
        }
    }

    fn change_phase(&mut self, phase: DetectionPhase, now_s: f64) {
        let from = self.search.phase();
        if self.search.advance_to(phase, now_s) {
            self.events.push_back(EngineEvent::PhaseChanged { from, to: phase });
            self.reconfigure();
        }
    }

    /// Register the active categories' images, minus already placed packages.
    fn reconfigure(&mut self) {
        let active = self.search.active_categories();
        let images: Vec<_> = self
            .catalog
            .iter()
            .filter(|f| active.contains(&f.category) && !self.router.is_placed(&f.name.package_id))
            .map(|f| f.image.clone())
            .collect();
        let max_tracked = self.config.max_tracked(self.search.phase());
        debug!(
            "registering {} image(s) for phase {}, max tracked {}",
            images.len(),
            self.search.phase(),
            max_tracked
        );
        self.tracking.configure_detection(&images, max_tracked);
    }

    fn searching_status(&self) -> String {
        format!("Searching for reference images ({})", self.search.phase())
    }

    fn tracking_ready(&self) -> bool {
        self.tracking.tracking_state() == TrackingState::Normal
    }

    /// A horizontal plane large enough to start with floor images.
    fn ground_ready(&self) -> bool {
        self.tracking
            .horizontal_planes()
            .iter()
            .any(|p| p.area() > self.config.ready_plane_area_m2)
    }

    fn ground_available(&self) -> bool {
        !self.tracking.horizontal_planes().is_empty()
    }

    fn transition(&mut self, state: RelocalizationState, status: impl Into<String>) {
        if let Some(from) = self.session.set(state, status) {
            self.push_state_event(from);
        }
    }

    fn push_state_event(&mut self, from: RelocalizationState) {
        self.events.push_back(EngineEvent::StateChanged {
            from,
            to: self.session.state(),
        });
    }
}
