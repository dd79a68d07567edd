//! Reference fiducials for anchor relocalization.
//!
//! - [`FiducialName`] is the reversible name every registered image carries,
//!   so a detection can be mapped back to its package.
//! - [`FiducialCatalog`] groups the images of a set of packages by detection
//!   range and bounds how many are registered at once.

mod catalog;
mod name;

pub use catalog::{CatalogParams, FiducialCatalog, FiducialCategory, ReferenceFiducial};
pub use name::{FiducialKind, FiducialName, ParseFiducialNameError, FLOOR_MARKER_PREFIX};
