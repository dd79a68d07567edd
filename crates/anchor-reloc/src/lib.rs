//! High-level facade crate for the `anchor-reloc-*` workspace.
//!
//! This crate provides:
//! - stable, convenient re-exports of the underlying crates
//! - a deterministic [`replay`] harness that runs recorded sessions through
//!   the relocalization engine
//! - (feature `cli`) the `anchor-reloc` command-line tool
//!
//! ## Quickstart
//!
//! ```
//! use anchor_reloc::core::{SimulatedTracking, TrackingState};
//! use anchor_reloc::engine::{RelocalizationConfig, RelocalizationEngine, RelocalizationState};
//!
//! let tracking = SimulatedTracking::new().with_state(TrackingState::Normal);
//! let mut engine = RelocalizationEngine::new(tracking, RelocalizationConfig::default());
//! engine.start(Vec::new(), 0.0);
//! assert_eq!(engine.state(), RelocalizationState::ImageTracking);
//! ```
//!
//! ## API map
//! - `anchor_reloc::core`: data model, geometry, tracking-session interface, stores.
//! - `anchor_reloc::fiducial`: fiducial names and the per-session catalog.
//! - `anchor_reloc::capture`: quality accumulation, auto-capture, floor calibration.
//! - `anchor_reloc::engine`: progressive search, routing, recovery, strategies.
//! - `anchor_reloc::replay`: scenario replay on a simulated tracking session.

pub use anchor_reloc_capture as capture;
pub use anchor_reloc_core as core;
pub use anchor_reloc_engine as engine;
pub use anchor_reloc_fiducial as fiducial;

pub use anchor_reloc_capture::{CaptureSession, QualityAccumulator};
pub use anchor_reloc_core::{AnchorPackage, AnchorStore, JsonFileStore, TrackingSession};
pub use anchor_reloc_engine::{RelocalizationConfig, RelocalizationEngine, Relocalizer};
pub use anchor_reloc_fiducial::FiducialCatalog;

pub mod replay;
