//! Anchor package persistence.
//!
//! Relocalization only reads from the store; capture writes one package per
//! finalized session.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::package::AnchorPackage;
use crate::world_map::WorldMapSnapshot;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("anchor package {0} not found")]
    NotFound(Uuid),
}

/// Key-value store of anchor packages, scoped by map patch.
pub trait AnchorStore {
    fn load_packages(&self) -> Result<Vec<AnchorPackage>, StoreError>;

    fn load_package(&self, id: Uuid) -> Result<AnchorPackage, StoreError>;

    fn save_package(&mut self, package: &AnchorPackage) -> Result<(), StoreError>;

    fn delete_package(&mut self, id: Uuid) -> Result<(), StoreError>;

    /// Record that `package_id` belongs to `patch_id`.
    fn assign_to_patch(&mut self, patch_id: Uuid, package_id: Uuid) -> Result<(), StoreError>;

    fn packages_for_patch(&self, patch_id: Uuid) -> Result<Vec<AnchorPackage>, StoreError>;

    fn load_world_map(&self, patch_id: Uuid) -> Result<Option<WorldMapSnapshot>, StoreError>;

    fn save_world_map(&mut self, patch_id: Uuid, snapshot: &WorldMapSnapshot) -> Result<(), StoreError>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    packages: BTreeMap<Uuid, AnchorPackage>,
    patches: HashMap<Uuid, Vec<Uuid>>,
    world_maps: HashMap<Uuid, WorldMapSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnchorStore for MemoryStore {
    fn load_packages(&self) -> Result<Vec<AnchorPackage>, StoreError> {
        Ok(self.packages.values().cloned().collect())
    }

    fn load_package(&self, id: Uuid) -> Result<AnchorPackage, StoreError> {
        self.packages.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    fn save_package(&mut self, package: &AnchorPackage) -> Result<(), StoreError> {
        self.packages.insert(package.id, package.clone());
        Ok(())
    }

    fn delete_package(&mut self, id: Uuid) -> Result<(), StoreError> {
        self.packages.remove(&id).ok_or(StoreError::NotFound(id))?;
        for members in self.patches.values_mut() {
            members.retain(|m| *m != id);
        }
        Ok(())
    }

    fn assign_to_patch(&mut self, patch_id: Uuid, package_id: Uuid) -> Result<(), StoreError> {
        let members = self.patches.entry(patch_id).or_default();
        if !members.contains(&package_id) {
            members.push(package_id);
        }
        Ok(())
    }

    fn packages_for_patch(&self, patch_id: Uuid) -> Result<Vec<AnchorPackage>, StoreError> {
        Ok(self
            .patches
            .get(&patch_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.packages.get(id).cloned())
            .collect())
    }

    fn load_world_map(&self, patch_id: Uuid) -> Result<Option<WorldMapSnapshot>, StoreError> {
        Ok(self.world_maps.get(&patch_id).cloned())
    }

    fn save_world_map(&mut self, patch_id: Uuid, snapshot: &WorldMapSnapshot) -> Result<(), StoreError> {
        self.world_maps.insert(patch_id, snapshot.clone());
        Ok(())
    }
}

/// Directory-backed store: one pretty-printed JSON file per package.
///
/// Layout:
/// - `packages/<id>.json`
/// - `patches.json` (patch id -> package ids)
/// - `world_maps/<patch id>.json`
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("packages"))?;
        fs::create_dir_all(root.join("world_maps"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_path(&self, id: Uuid) -> PathBuf {
        self.root.join("packages").join(format!("{id}.json"))
    }

    fn patches_path(&self) -> PathBuf {
        self.root.join("patches.json")
    }

    fn world_map_path(&self, patch_id: Uuid) -> PathBuf {
        self.root.join("world_maps").join(format!("{patch_id}.json"))
    }

    fn load_patches(&self) -> Result<BTreeMap<Uuid, Vec<Uuid>>, StoreError> {
        let path = self.patches_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        read_json(&path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

impl AnchorStore for JsonFileStore {
    fn load_packages(&self) -> Result<Vec<AnchorPackage>, StoreError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(self.root.join("packages"))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        paths.iter().map(|p| read_json(p)).collect()
    }

    fn load_package(&self, id: Uuid) -> Result<AnchorPackage, StoreError> {
        let path = self.package_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id));
        }
        read_json(&path)
    }

    fn save_package(&mut self, package: &AnchorPackage) -> Result<(), StoreError> {
        write_json(&self.package_path(package.id), package)?;
        log::debug!("saved anchor package {}", package.id);
        Ok(())
    }

    fn delete_package(&mut self, id: Uuid) -> Result<(), StoreError> {
        let path = self.package_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id));
        }
        fs::remove_file(path)?;
        let mut patches = self.load_patches()?;
        for members in patches.values_mut() {
            members.retain(|m| *m != id);
        }
        write_json(&self.patches_path(), &patches)
    }

    fn assign_to_patch(&mut self, patch_id: Uuid, package_id: Uuid) -> Result<(), StoreError> {
        let mut patches = self.load_patches()?;
        let members = patches.entry(patch_id).or_default();
        if !members.contains(&package_id) {
            members.push(package_id);
        }
        write_json(&self.patches_path(), &patches)
    }

    fn packages_for_patch(&self, patch_id: Uuid) -> Result<Vec<AnchorPackage>, StoreError> {
        let patches = self.load_patches()?;
        let mut out = Vec::new();
        for id in patches.get(&patch_id).into_iter().flatten() {
            match self.load_package(*id) {
                Ok(p) => out.push(p),
                Err(StoreError::NotFound(missing)) => {
                    log::warn!("patch {patch_id} references missing package {missing}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    fn load_world_map(&self, patch_id: Uuid) -> Result<Option<WorldMapSnapshot>, StoreError> {
        let path = self.world_map_path(patch_id);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn save_world_map(&mut self, patch_id: Uuid, snapshot: &WorldMapSnapshot) -> Result<(), StoreError> {
        write_json(&self.world_map_path(patch_id), snapshot)
    }
}
