//! Relocalization strategies and the registry that selects between them.

use std::time::SystemTime;

use anchor_reloc_core::{AnchorStore, TrackingSession, WorldMapSnapshot};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RelocalizationConfig;
use crate::engine::RelocalizationEngine;
use crate::error::RelocalizationError;
use crate::state::{RelocalizationState, SessionState};

/// Outcome of one strategy attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelocalizationResult {
    pub success: bool,
    /// Always within `[0, 1]`.
    pub confidence: f32,
    pub notes: String,
    pub strategy_id: String,
    pub attempted_at: SystemTime,
    /// Source of the world map snapshot, if one was used.
    pub used_world_map: Option<String>,
}

impl RelocalizationResult {
    pub fn new(strategy_id: impl Into<String>, success: bool, confidence: f32, notes: impl Into<String>) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            success,
            confidence,
            notes: notes.into(),
            strategy_id: strategy_id.into(),
            attempted_at: SystemTime::now(),
            used_world_map: None,
        }
    }

    pub fn failed(strategy_id: impl Into<String>, notes: impl Into<String>) -> Self {
        Self::new(strategy_id, false, 0.0, notes)
    }

    pub fn with_world_map(mut self, source: impl Into<String>) -> Self {
        self.used_world_map = Some(source.into());
        self
    }
}

/// Confidence of a whole-map relocalization.
///
/// `0.7 * min(1, features / 5000) + 0.3 * min(1, anchors / 10)`.
pub fn world_map_confidence(feature_count: usize, anchor_count: usize) -> f32 {
    let features = (feature_count as f32 / 5000.0).min(1.0);
    let anchors = (anchor_count as f32 / 10.0).min(1.0);
    0.7 * features + 0.3 * anchors
}

/// Places anchors by detecting reference fiducials.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FiducialStrategy;

impl FiducialStrategy {
    pub const ID: &'static str = "fiducial";
    pub const DISPLAY_NAME: &'static str = "Reference Images";
}

/// Restarts tracking from a stored whole-map snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldMapStrategy {
    /// Results at or below this confidence count as failures.
    pub success_threshold: f32,
}

impl Default for WorldMapStrategy {
    fn default() -> Self {
        Self {
            success_threshold: 0.3,
        }
    }
}

impl WorldMapStrategy {
    pub const ID: &'static str = "worldmap";
    pub const DISPLAY_NAME: &'static str = "ARWorldMap";

    /// Run tracking with `snapshot` and score the result.
    pub fn attempt<T: TrackingSession + ?Sized>(
        &self,
        tracking: &mut T,
        snapshot: Option<&WorldMapSnapshot>,
    ) -> RelocalizationResult {
        let Some(snapshot) = snapshot else {
            return RelocalizationResult::failed(Self::ID, "No world map snapshot available");
        };
        tracking.run_with_world_map(snapshot);
        let confidence = world_map_confidence(snapshot.feature_count(), snapshot.anchor_count());
        let success = confidence > self.success_threshold;
        info!(
            "world map {} loaded: {} features, {} anchors, confidence {confidence:.2}",
            snapshot.source,
            snapshot.feature_count(),
            snapshot.anchor_count()
        );
        RelocalizationResult::new(
            Self::ID,
            success,
            confidence,
            format!(
                "{} features, {} anchors",
                snapshot.feature_count(),
                snapshot.anchor_count()
            ),
        )
        .with_world_map(snapshot.source.clone())
    }
}

/// The known relocalization strategies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Strategy {
    Fiducial(FiducialStrategy),
    WorldMap(WorldMapStrategy),
}

impl Strategy {
    pub fn id(&self) -> &'static str {
        match self {
            Strategy::Fiducial(_) => FiducialStrategy::ID,
            Strategy::WorldMap(_) => WorldMapStrategy::ID,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Strategy::Fiducial(_) => FiducialStrategy::DISPLAY_NAME,
            Strategy::WorldMap(_) => WorldMapStrategy::DISPLAY_NAME,
        }
    }
}

/// Strategies keyed by id, with one selected.
#[derive(Clone, Debug, Default)]
pub struct StrategyRegistry {
    strategies: Vec<Strategy>,
    selected: Option<usize>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both strategies, fiducial selected.
    pub fn with_defaults() -> Self {
        let mut r = Self::new();
        r.register(Strategy::Fiducial(FiducialStrategy));
        r.register(Strategy::WorldMap(WorldMapStrategy::default()));
        r
    }

    /// Add or replace a strategy. The first one registered becomes selected.
    pub fn register(&mut self, strategy: Strategy) {
        match self.strategies.iter_mut().find(|s| s.id() == strategy.id()) {
            Some(existing) => *existing = strategy,
            None => self.strategies.push(strategy),
        }
        if self.selected.is_none() {
            self.selected = Some(0);
        }
    }

    pub fn select(&mut self, id: &str) -> Result<(), RelocalizationError> {
        let idx = self
            .strategies
            .iter()
            .position(|s| s.id() == id)
            .ok_or_else(|| RelocalizationError::StrategyNotFound(id.to_owned()))?;
        self.selected = Some(idx);
        Ok(())
    }

    pub fn selected(&self) -> Option<&Strategy> {
        self.selected.and_then(|i| self.strategies.get(i))
    }

    pub fn get(&self, id: &str) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.id() == id)
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.strategies.iter().map(Strategy::id).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Registry plus the fiducial engine: the entry point for a relocalization attempt.
pub struct Relocalizer<T: TrackingSession> {
    engine: RelocalizationEngine<T>,
    registry: StrategyRegistry,
    world_map_session: SessionState,
    active: Option<&'static str>,
}

impl<T: TrackingSession> Relocalizer<T> {
    pub fn new(tracking: T, config: RelocalizationConfig) -> Self {
        Self {
            engine: RelocalizationEngine::new(tracking, config),
            registry: StrategyRegistry::with_defaults(),
            world_map_session: SessionState::default(),
            active: None,
        }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut StrategyRegistry {
        &mut self.registry
    }

    pub fn engine(&self) -> &RelocalizationEngine<T> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RelocalizationEngine<T> {
        &mut self.engine
    }

    /// Id of the strategy that ran last.
    pub fn active_strategy(&self) -> Option<&'static str> {
        self.active
    }

    pub fn state(&self) -> RelocalizationState {
        match self.active {
            Some(WorldMapStrategy::ID) => self.world_map_session.state(),
            _ => self.engine.state(),
        }
    }

    pub fn status_text(&self) -> &str {
        match self.active {
            Some(WorldMapStrategy::ID) => self.world_map_session.status(),
            _ => self.engine.status_text(),
        }
    }

    /// Run the selected strategy.
    pub fn attempt(&mut self, store: &dyn AnchorStore, patch: Option<Uuid>, now_s: f64) -> RelocalizationResult {
        match self.registry.selected().map(Strategy::id) {
            Some(id) => self.attempt_with(id, store, patch, now_s),
            None => RelocalizationResult::failed("", "No relocalization strategy registered"),
        }
    }

    /// Run the strategy registered under `id`.
    ///
    /// The fiducial strategy only starts the search; its result reports how
    /// many fiducials are being looked for. Use [`Relocalizer::fiducial_result`]
    /// for the outcome.
    pub fn attempt_with(
        &mut self,
        id: &str,
        store: &dyn AnchorStore,
        patch: Option<Uuid>,
        now_s: f64,
    ) -> RelocalizationResult {
        let Some(strategy) = self.registry.get(id).copied() else {
            let err = RelocalizationError::StrategyNotFound(id.to_owned());
            warn!("{err}");
            return RelocalizationResult::failed(id, err.to_string());
        };
        self.stop();
        self.active = Some(strategy.id());

        match strategy {
            Strategy::Fiducial(_) => {
                let loaded = match patch {
                    Some(p) => store.packages_for_patch(p),
                    None => store.load_packages(),
                };
                let packages = match loaded {
                    Ok(p) => p,
                    Err(e) => {
                        let err = RelocalizationError::from(e);
                        warn!("cannot load packages: {err}");
                        return RelocalizationResult::failed(FiducialStrategy::ID, err.to_string());
                    }
                };
                let count = self.engine.start(packages, now_s);
                if count == 0 {
                    RelocalizationResult::failed(
                        FiducialStrategy::ID,
                        RelocalizationError::NoFiducialsAvailable.to_string(),
                    )
                } else {
                    RelocalizationResult::new(
                        FiducialStrategy::ID,
                        false,
                        0.0,
                        format!("Searching for {count} reference image(s)"),
                    )
                }
            }
            Strategy::WorldMap(world_map) => {
                self.world_map_session.begin(
                    now_s,
                    RelocalizationState::FeatureMatching,
                    "Matching stored world map...",
                );
                let snapshot = match patch.map(|p| store.load_world_map(p)).transpose() {
                    Ok(s) => s.flatten(),
                    Err(e) => {
                        warn!("cannot load world map: {e}");
                        None
                    }
                };
                let result = world_map.attempt(self.engine.tracking_mut(), snapshot.as_ref());
                let (state, status) = if result.success {
                    (RelocalizationState::Success, "World map relocalized")
                } else {
                    (RelocalizationState::Failed, "World map relocalization failed")
                };
                self.world_map_session.set(state, status);
                result
            }
        }
    }

    /// Outcome of the fiducial search so far.
    pub fn fiducial_result(&self) -> RelocalizationResult {
        let placed = self.engine.placed_anchors();
        match placed
            .iter()
            .map(|a| a.confidence)
            .fold(None, |best: Option<f32>, c| Some(best.map_or(c, |b| b.max(c))))
        {
            Some(confidence) => RelocalizationResult::new(
                FiducialStrategy::ID,
                true,
                confidence,
                format!("{} anchor(s) placed", placed.len()),
            ),
            None => RelocalizationResult::failed(FiducialStrategy::ID, self.engine.status_text()),
        }
    }

    pub fn stop(&mut self) {
        if self.engine.state() != RelocalizationState::Idle {
            self.engine.stop();
        }
        self.world_map_session.reset();
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_reloc_core::{MemoryStore, SimulatedTracking};
    use approx::assert_relative_eq;

    fn snapshot(features: usize, anchors: usize) -> WorldMapSnapshot {
        WorldMapSnapshot {
            source: "patch.worldmap".to_owned(),
            feature_points: (0..features)
                .map(|i| nalgebra::Point3::new(i as f32, 0.0, 0.0))
                .collect(),
            anchor_ids: (0..anchors).map(|_| Uuid::new_v4()).collect(),
        }
    }

    #[test]
    fn confidence_saturates() {
        assert_relative_eq!(world_map_confidence(5000, 10), 1.0);
        assert_relative_eq!(world_map_confidence(50_000, 100), 1.0);
        assert_relative_eq!(world_map_confidence(2500, 0), 0.35);
        assert_relative_eq!(world_map_confidence(0, 5), 0.15);
    }

    #[test]
    fn world_map_success_needs_confidence_above_threshold() {
        let strategy = WorldMapStrategy::default();
        let mut sim = SimulatedTracking::new();
        // 0.7 * 0.2 + 0.3 * 0.5 = 0.29
        let low = strategy.attempt(&mut sim, Some(&snapshot(1000, 5)));
        assert!(!low.success);
        let high = strategy.attempt(&mut sim, Some(&snapshot(3000, 2)));
        assert!(high.success);
        assert_eq!(high.used_world_map.as_deref(), Some("patch.worldmap"));
        assert_eq!(sim.world_map_runs().len(), 2);

        let none = strategy.attempt(&mut sim, None);
        assert!(!none.success);
        assert_eq!(none.confidence, 0.0);
    }

    #[test]
    fn result_confidence_is_clamped() {
        assert_eq!(RelocalizationResult::new("x", true, 1.7, "").confidence, 1.0);
        assert_eq!(RelocalizationResult::new("x", false, -0.2, "").confidence, 0.0);
        assert_eq!(RelocalizationResult::new("x", false, f32::NAN, "").confidence, 0.0);
    }

    #[test]
    fn registry_selects_first_and_rejects_unknown_ids() {
        let mut r = StrategyRegistry::with_defaults();
        assert_eq!(r.ids(), vec!["fiducial", "worldmap"]);
        assert_eq!(r.selected().map(Strategy::id), Some("fiducial"));
        r.select("worldmap").expect("registered");
        assert_eq!(r.selected().map(Strategy::display_name), Some("ARWorldMap"));

        let err = r.select("lidar").expect_err("unknown");
        assert_eq!(err.to_string(), "Strategy 'lidar' not found");
        assert_eq!(r.selected().map(Strategy::id), Some("worldmap"));

        r.register(Strategy::WorldMap(WorldMapStrategy { success_threshold: 0.5 }));
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn unknown_strategy_attempt_fails_without_side_effects() {
        let mut reloc = Relocalizer::new(SimulatedTracking::new(), RelocalizationConfig::default());
        let store = MemoryStore::new();
        let result = reloc.attempt_with("lidar", &store, None, 0.0);
        assert!(!result.success);
        assert_eq!(result.notes, "Strategy 'lidar' not found");
        assert_eq!(reloc.state(), RelocalizationState::Idle);
    }

    #[test]
    fn world_map_attempt_drives_its_own_state() {
        let mut reloc = Relocalizer::new(SimulatedTracking::new(), RelocalizationConfig::default());
        let mut store = MemoryStore::new();
        let patch = Uuid::new_v4();
        store
            .save_world_map(patch, &snapshot(5000, 10))
            .expect("saved");
        reloc.registry_mut().select("worldmap").expect("registered");

        let result = reloc.attempt(&store, Some(patch), 1.0);
        assert!(result.success);
        assert_relative_eq!(result.confidence, 1.0);
        assert_eq!(reloc.state(), RelocalizationState::Success);

        let missing = reloc.attempt(&store, Some(Uuid::new_v4()), 2.0);
        assert!(!missing.success);
        assert_eq!(reloc.state(), RelocalizationState::Failed);
    }

    #[test]
    fn fiducial_attempt_with_empty_store_reports_no_fiducials() {
        let mut reloc = Relocalizer::new(SimulatedTracking::new(), RelocalizationConfig::default());
        let store = MemoryStore::new();
        let result = reloc.attempt(&store, None, 0.0);
        assert!(!result.success);
        assert_eq!(result.notes, "no reference fiducials available");
        assert_eq!(reloc.state(), RelocalizationState::ImageTracking);
        assert!(!reloc.fiducial_result().success);
    }
}
