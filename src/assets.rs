//! Selectable overlay images: a validated manifest plus per-asset load state.

use anyhow::{Context, Result};
use framefit_vision::OverlayAsset;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub id: u32,
    pub name: String,
    pub path: PathBuf,
}

/// TOML list of `[[asset]]` tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "asset", default)]
    pub assets: Vec<AssetDescriptor>,
}

impl Manifest {
    /// Read a manifest; relative asset paths resolve against its directory
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        let mut manifest: Manifest =
            toml::from_str(&raw).with_context(|| format!("parsing manifest {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for asset in &mut manifest.assets {
            if asset.path.is_relative() {
                asset.path = base.join(&asset.path);
            }
        }
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.assets.is_empty() {
            anyhow::bail!("manifest lists no assets");
        }
        let mut ids = HashSet::new();
        let mut paths = HashSet::new();
        for a in &self.assets {
            if !ids.insert(a.id) {
                anyhow::bail!("duplicate asset id {}", a.id);
            }
            if !paths.insert(&a.path) {
                anyhow::bail!("asset {} repeats image {}", a.id, a.path.display());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum LoadState {
    Pending,
    Ready(OverlayAsset),
    Failed(String),
}

#[derive(Debug, Clone)]
struct Entry {
    descriptor: AssetDescriptor,
    state: LoadState,
}

#[derive(Debug, Clone, Default)]
pub struct AssetStore {
    entries: Vec<Entry>,
}

impl AssetStore {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut store = Self::default();
        for d in &manifest.assets {
            store.insert(d.clone());
        }
        store
    }

    /// Register an asset as pending; replaces any entry with the same id
    pub fn insert(&mut self, descriptor: AssetDescriptor) {
        self.entries.retain(|e| e.descriptor.id != descriptor.id);
        self.entries.push(Entry {
            descriptor,
            state: LoadState::Pending,
        });
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &AssetDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entry(id).is_some()
    }

    pub fn state(&self, id: u32) -> Option<&LoadState> {
        self.entry(id).map(|e| &e.state)
    }

    /// The asset if it finished loading
    pub fn ready(&self, id: u32) -> Option<&OverlayAsset> {
        match self.state(id)? {
            LoadState::Ready(asset) => Some(asset),
            _ => None,
        }
    }

    pub fn complete(&mut self, id: u32, asset: OverlayAsset) -> bool {
        self.set_state(id, LoadState::Ready(asset))
    }

    pub fn fail(&mut self, id: u32, reason: impl Into<String>) -> bool {
        self.set_state(id, LoadState::Failed(reason.into()))
    }

    pub fn pending(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.state, LoadState::Pending))
            .count()
    }

    /// Decode every pending asset in parallel and wait for all of them.
    /// Returns how many are ready afterwards.
    pub fn load_all(&mut self) -> usize {
        let results: Vec<(u32, Result<OverlayAsset>)> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .entries
                .iter()
                .filter(|e| matches!(e.state, LoadState::Pending))
                .map(|e| {
                    let d = &e.descriptor;
                    (d.id, scope.spawn(move || load_one(d)))
                })
                .collect();
            handles
                .into_iter()
                .map(|(id, h)| {
                    let res = h
                        .join()
                        .unwrap_or_else(|_| Err(anyhow::anyhow!("loader thread panicked")));
                    (id, res)
                })
                .collect()
        });

        for (id, res) in results {
            match res {
                Ok(asset) => {
                    info!("Loaded overlay {} ({}x{})", id, asset.width(), asset.height());
                    self.complete(id, asset);
                }
                Err(e) => {
                    warn!("Overlay {} failed to load: {:#}", id, e);
                    self.fail(id, format!("{:#}", e));
                }
            }
        }
        self.entries
            .iter()
            .filter(|e| matches!(e.state, LoadState::Ready(_)))
            .count()
    }

    fn entry(&self, id: u32) -> Option<&Entry> {
        self.entries.iter().find(|e| e.descriptor.id == id)
    }

    fn set_state(&mut self, id: u32, state: LoadState) -> bool {
        match self.entries.iter_mut().find(|e| e.descriptor.id == id) {
            Some(e) => {
                e.state = state;
                true
            }
            None => false,
        }
    }
}

fn load_one(d: &AssetDescriptor) -> Result<OverlayAsset> {
    let asset = OverlayAsset::open(&d.path)
        .with_context(|| format!("decoding {}", d.path.display()))?;
    if asset.aspect_ratio().is_none() {
        anyhow::bail!("{} has zero size", d.path.display());
    }
    Ok(asset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn descriptor(id: u32, path: &str) -> AssetDescriptor {
        AssetDescriptor {
            id,
            name: format!("frame {}", id),
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn test_manifest_rejects_duplicates() {
        let dup_id = Manifest {
            assets: vec![descriptor(0, "a.png"), descriptor(0, "b.png")],
        };
        assert!(dup_id.validate().is_err());

        let dup_path = Manifest {
            assets: vec![descriptor(0, "a.png"), descriptor(1, "a.png")],
        };
        assert!(dup_path.validate().is_err());

        assert!(Manifest { assets: vec![] }.validate().is_err());
    }

    #[test]
    fn test_manifest_parses_tables() {
        let m: Manifest = toml::from_str(
            r#"
            [[asset]]
            id = 0
            name = "round"
            path = "round.png"

            [[asset]]
            id = 4
            name = "aviator"
            path = "aviator.png"
            "#,
        )
        .unwrap();
        assert_eq!(m.assets.len(), 2);
        assert_eq!(m.assets[1].id, 4);
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_pending_is_not_ready() {
        let mut store = AssetStore::default();
        store.insert(descriptor(3, "x.png"));
        assert!(store.contains(3));
        assert!(store.ready(3).is_none());
        assert_eq!(store.pending(), 1);

        store.complete(3, OverlayAsset::new(RgbaImage::new(4, 2)));
        assert!(store.ready(3).is_some());
        assert!(!store.complete(9, OverlayAsset::new(RgbaImage::new(1, 1))));
    }

    #[test]
    fn test_load_all_waits_for_every_asset() {
        let dir = std::env::temp_dir().join(format!("framefit-assets-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        RgbaImage::from_pixel(8, 4, Rgba([1, 2, 3, 255]))
            .save(dir.join("a.png"))
            .unwrap();
        RgbaImage::from_pixel(6, 6, Rgba([1, 2, 3, 255]))
            .save(dir.join("b.png"))
            .unwrap();

        let mut store = AssetStore::default();
        store.insert(AssetDescriptor {
            id: 0,
            name: "a".into(),
            path: dir.join("a.png"),
        });
        store.insert(AssetDescriptor {
            id: 1,
            name: "b".into(),
            path: dir.join("b.png"),
        });
        store.insert(AssetDescriptor {
            id: 2,
            name: "missing".into(),
            path: dir.join("missing.png"),
        });

        assert_eq!(store.load_all(), 2);
        assert_eq!(store.pending(), 0);
        assert_eq!(store.ready(0).unwrap().aspect_ratio(), Some(2.0));
        assert!(matches!(store.state(2), Some(LoadState::Failed(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
