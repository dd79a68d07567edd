//! Per-package routing of fiducial detections.

use std::collections::{BTreeMap, HashMap, HashSet};

use anchor_reloc_core::Pose;
use anchor_reloc_fiducial::{FiducialKind, FiducialName};
use log::debug;
use uuid::Uuid;

/// A detection waiting for a ground reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PendingDetection {
    pub pose: Pose,
    pub kind: FiducialKind,
}

/// What to do with one detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteDecision {
    /// The package already has a placement this session.
    Duplicate,
    /// No ground plane yet; queued until one appears.
    Deferred,
    /// Run transform recovery now.
    Recover,
}

/// Placed set, pending queue and detection counters of one session.
#[derive(Clone, Debug, Default)]
pub struct DetectionRouter {
    placed: HashSet<Uuid>,
    pending: BTreeMap<Uuid, PendingDetection>,
    counts: HashMap<Uuid, u32>,
}

impl DetectionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a detection of `name` at `pose`.
    ///
    /// Deferred detections overwrite any earlier pending entry of the same
    /// package, so the queue always holds the freshest pose.
    pub fn route(&mut self, name: &FiducialName, pose: Pose, ground_available: bool) -> RouteDecision {
        let id = name.package_id;
        *self.counts.entry(id).or_insert(0) += 1;

        if self.placed.contains(&id) {
            debug!("duplicate detection of placed package {id} ignored");
            return RouteDecision::Duplicate;
        }
        if !ground_available {
            self.defer(id, pose, name.kind);
            return RouteDecision::Deferred;
        }
        RouteDecision::Recover
    }

    /// Queue (or re-queue) a detection for later recovery.
    pub fn defer(&mut self, package_id: Uuid, pose: Pose, kind: FiducialKind) {
        debug!("deferring detection of package {package_id} until a ground plane exists");
        self.pending.insert(package_id, PendingDetection { pose, kind });
    }

    /// Record a placement. Returns false if the package was already placed.
    pub fn mark_placed(&mut self, package_id: Uuid) -> bool {
        self.pending.remove(&package_id);
        self.placed.insert(package_id)
    }

    #[inline]
    pub fn is_placed(&self, package_id: &Uuid) -> bool {
        self.placed.contains(package_id)
    }

    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }

    /// Remove and return every pending detection, ordered by package id.
    pub fn take_pending(&mut self) -> Vec<(Uuid, PendingDetection)> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Detections seen for `package_id` this session, duplicates included.
    pub fn detection_count(&self, package_id: &Uuid) -> u32 {
        self.counts.get(package_id).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.placed.clear();
        self.pending.clear();
        self.counts.clear();
    }
}
