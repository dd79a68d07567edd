//! Categorized reference fiducials built from anchor packages.

use std::collections::HashMap;

use anchor_reloc_core::{AnchorPackage, CaptureType, DetectableImage, PhysicalSize};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::name::{FiducialKind, FiducialName};

/// Detection-range bucket of a fiducial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiducialCategory {
    /// Large wall shots, detectable from far away.
    Wall,
    /// Wider floor views.
    FloorMid,
    /// Close floor shots and floor markers.
    FloorNear,
}

impl FiducialCategory {
    pub const ALL: [FiducialCategory; 3] = [
        FiducialCategory::Wall,
        FiducialCategory::FloorMid,
        FiducialCategory::FloorNear,
    ];

    pub fn for_kind(kind: FiducialKind) -> Self {
        match kind {
            FiducialKind::FloorMarker => FiducialCategory::FloorNear,
            FiducialKind::Reference(t) => match t {
                CaptureType::WallNorth
                | CaptureType::WallSouth
                | CaptureType::WallEast
                | CaptureType::WallWest => FiducialCategory::Wall,
                CaptureType::FloorFar | CaptureType::Signature => FiducialCategory::FloorMid,
                CaptureType::FloorClose => FiducialCategory::FloorNear,
            },
        }
    }
}

/// Parameters for [`FiducialCatalog::build`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogParams {
    /// Maximum number of fiducials registered at once.
    pub max_images: usize,
    /// Printed width assumed for wall shots (meters).
    pub wall_width_m: f32,
    pub floor_mid_width_m: f32,
    pub floor_near_width_m: f32,
    /// Floor-marker footprint width for markers stored without a size (meters).
    pub floor_marker_width_m: f32,
}

impl Default for CatalogParams {
    fn default() -> Self {
        Self {
            max_images: 6,
            wall_width_m: 1.0,
            floor_mid_width_m: 0.5,
            floor_near_width_m: 0.25,
            floor_marker_width_m: 0.25,
        }
    }
}

impl CatalogParams {
    fn width_for(&self, kind: FiducialKind) -> f32 {
        match (kind, FiducialCategory::for_kind(kind)) {
            (FiducialKind::FloorMarker, _) => self.floor_marker_width_m,
            (_, FiducialCategory::Wall) => self.wall_width_m,
            (_, FiducialCategory::FloorMid) => self.floor_mid_width_m,
            (_, FiducialCategory::FloorNear) => self.floor_near_width_m,
        }
    }
}

/// One registered image and where it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceFiducial {
    pub name: FiducialName,
    pub category: FiducialCategory,
    pub image: DetectableImage,
}

impl ReferenceFiducial {
    #[inline]
    pub fn physical_size(&self) -> PhysicalSize {
        self.image.physical_size
    }
}

/// Fiducials available to one relocalization session.
#[derive(Clone, Debug, Default)]
pub struct FiducialCatalog {
    fiducials: Vec<ReferenceFiducial>,
    by_name: HashMap<FiducialName, usize>,
    skipped: usize,
}

impl FiducialCatalog {
    /// Build the catalog for `packages`.
    ///
    /// Packages are visited in order; each contributes its floor marker (if
    /// any) followed by its reference images. Once `params.max_images` entries
    /// are registered, every remaining candidate is skipped.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(packages, params), fields(packages = packages.len()))
    )]
    pub fn build(packages: &[AnchorPackage], params: &CatalogParams) -> Self {
        let mut catalog = Self::default();

        for package in packages {
            let mut candidates = Vec::with_capacity(package.reference_images.len() + 1);
            if let Some(marker) = &package.floor_marker {
                candidates.push((
                    FiducialName::floor_marker(package.id),
                    marker.image_data.as_slice(),
                    marker.image_size[0],
                    marker.image_size[1],
                    marker.physical_size,
                ));
            }
            for img in &package.reference_images {
                candidates.push((
                    FiducialName::reference(package.id, img.capture_type),
                    img.image_data.as_slice(),
                    img.pixel_width,
                    img.pixel_height,
                    None,
                ));
            }

            for (name, data, px_w, px_h, stored_size) in candidates {
                if catalog.by_name.contains_key(&name) {
                    debug!("duplicate fiducial {name} ignored");
                    continue;
                }
                if catalog.fiducials.len() >= params.max_images {
                    catalog.skipped += 1;
                    continue;
                }
                let physical_size = stored_size.unwrap_or_else(|| {
                    PhysicalSize::from_width_and_pixels(params.width_for(name.kind), px_w, px_h)
                });
                catalog.by_name.insert(name, catalog.fiducials.len());
                catalog.fiducials.push(ReferenceFiducial {
                    name,
                    category: FiducialCategory::for_kind(name.kind),
                    image: DetectableImage {
                        name: name.to_string(),
                        data: data.to_vec(),
                        physical_size,
                    },
                });
            }
        }

        if catalog.skipped > 0 {
            warn!(
                "fiducial cap of {} reached, skipped {} candidate(s)",
                params.max_images, catalog.skipped
            );
        }
        debug!(
            "catalog: {} wall, {} floor-mid, {} floor-near",
            catalog.count(FiducialCategory::Wall),
            catalog.count(FiducialCategory::FloorMid),
            catalog.count(FiducialCategory::FloorNear)
        );
        catalog
    }

    pub fn get(&self, name: &FiducialName) -> Option<&ReferenceFiducial> {
        self.by_name.get(name).map(|&i| &self.fiducials[i])
    }

    /// Images of the given categories, in catalog order.
    pub fn images_for(&self, categories: &[FiducialCategory]) -> Vec<DetectableImage> {
        self.fiducials
            .iter()
            .filter(|f| categories.contains(&f.category))
            .map(|f| f.image.clone())
            .collect()
    }

    pub fn count(&self, category: FiducialCategory) -> usize {
        self.fiducials.iter().filter(|f| f.category == category).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceFiducial> {
        self.fiducials.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fiducials.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fiducials.is_empty()
    }

    /// Candidates dropped by the global cap.
    #[inline]
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
