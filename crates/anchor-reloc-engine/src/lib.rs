//! Fiducial-driven anchor relocalization.
//!
//! The [`RelocalizationEngine`] registers reference fiducials with the
//! tracking subsystem in progressively closer phases, routes each detection
//! to transform recovery (or defers it until a ground plane exists), and
//! places at most one anchor per package. [`Relocalizer`] wraps it together
//! with the whole-map strategy behind a [`StrategyRegistry`].
//!
//! ## Quickstart
//!
//! ```
//! use anchor_reloc_core::SimulatedTracking;
//! use anchor_reloc_engine::{RelocalizationConfig, RelocalizationEngine, RelocalizationState};
//!
//! let mut engine = RelocalizationEngine::new(SimulatedTracking::new(), RelocalizationConfig::default());
//! let registered = engine.start(Vec::new(), 0.0);
//! assert_eq!(registered, 0);
//! engine.tick(15.0);
//! assert_eq!(engine.state(), RelocalizationState::Failed);
//! ```

mod config;
mod engine;
mod error;
mod phase;
mod recovery;
mod router;
mod search;
mod state;
mod strategy;

pub use config::RelocalizationConfig;
pub use engine::{DetectionOutcome, EngineEvent, PlacedAnchor, RelocalizationEngine};
pub use error::{ConfigError, RelocalizationError};
pub use phase::DetectionPhase;
pub use recovery::{recover_anchor, RecoveredAnchor, RecoveryError, RecoveryInput, RecoveryPath};
pub use router::{DetectionRouter, PendingDetection, RouteDecision};
pub use search::ProgressiveSearchController;
pub use state::{RelocalizationState, SessionState};
pub use strategy::{
    world_map_confidence, FiducialStrategy, RelocalizationResult, Relocalizer, Strategy,
    StrategyRegistry, WorldMapStrategy,
};
