//! Progressive fiducial search: which images are registered, and when that changes.

use std::collections::VecDeque;

use anchor_reloc_fiducial::FiducialCategory;
use log::{debug, info};
use nalgebra::{Point3, Vector3};

use crate::phase::DetectionPhase;

/// Phase state machine plus the camera stability window.
///
/// The phase only ever moves forward. Every transition clears the stability
/// window and restarts the phase clock.
#[derive(Clone, Debug)]
pub struct ProgressiveSearchController {
    phase: DetectionPhase,
    phase_started_s: f64,
    window: VecDeque<Point3<f32>>,
    window_len: usize,
    widened: bool,
    active: Vec<FiducialCategory>,
}

impl ProgressiveSearchController {
    pub fn new(window_len: usize) -> Self {
        Self {
            phase: DetectionPhase::Idle,
            phase_started_s: 0.0,
            window: VecDeque::with_capacity(window_len),
            window_len: window_len.max(1),
            widened: false,
            active: Vec::new(),
        }
    }

    #[inline]
    pub fn phase(&self) -> DetectionPhase {
        self.phase
    }

    #[inline]
    pub fn phase_started_s(&self) -> f64 {
        self.phase_started_s
    }

    /// Categories whose images should currently be registered.
    pub fn active_categories(&self) -> &[FiducialCategory] {
        &self.active
    }

    #[inline]
    pub fn is_widened(&self) -> bool {
        self.widened
    }

    /// Back to `Idle`, forgetting everything.
    pub fn reset(&mut self) {
        self.phase = DetectionPhase::Idle;
        self.phase_started_s = 0.0;
        self.window.clear();
        self.widened = false;
        self.active.clear();
    }

    /// Move to `phase` if it is later than the current one.
    ///
    /// Returns false (and changes nothing) for a regression or a no-op.
    pub fn advance_to(&mut self, phase: DetectionPhase, now_s: f64) -> bool {
        if phase <= self.phase {
            debug!("ignoring phase change {} -> {}", self.phase, phase);
            return false;
        }
        info!("search phase {} -> {}", self.phase, phase);
        self.phase = phase;
        self.phase_started_s = now_s;
        self.window.clear();
        if !self.widened {
            self.active = phase.categories().to_vec();
        }
        true
    }

    /// Record a camera position for the stability check.
    pub fn observe(&mut self, position: Point3<f32>) {
        if self.window.len() == self.window_len {
            self.window.pop_front();
        }
        self.window.push_back(position);
    }

    /// Full window whose positions all lie within `tolerance_m` of their mean.
    pub fn is_stable(&self, tolerance_m: f32) -> bool {
        if self.window.len() < self.window_len {
            return false;
        }
        let n = self.window.len() as f32;
        let mean = self
            .window
            .iter()
            .fold(Vector3::zeros(), |acc: Vector3<f32>, p| acc + p.coords)
            / n;
        self.window
            .iter()
            .all(|p| (p.coords - mean).norm() <= tolerance_m)
    }

    /// True when the one-time widening should happen now.
    pub fn escalation_due(&self, now_s: f64, escalation_s: f64, anything_placed: bool) -> bool {
        !self.widened
            && !anything_placed
            && self.phase != DetectionPhase::Idle
            && now_s - self.phase_started_s >= escalation_s
    }

    /// Widen the active set to every category and step the phase forward once.
    ///
    /// Happens at most once per session; returns false if already widened.
    pub fn widen(&mut self, now_s: f64) -> bool {
        if self.widened {
            return false;
        }
        self.widened = true;
        self.active = FiducialCategory::ALL.to_vec();
        let next = self.phase.next();
        if !self.advance_to(next, now_s) {
            self.window.clear();
            self.phase_started_s = now_s;
        }
        info!("search widened to all categories in phase {}", self.phase);
        true
    }
}
