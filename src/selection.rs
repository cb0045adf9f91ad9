use crate::config::DATA_DIR;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Persisted id of the overlay the user picked last.
#[derive(Debug, Clone)]
pub struct SelectionStore {
    path: PathBuf,
}

impl SelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        DATA_DIR.join("selection.bin")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last saved id; 0 when nothing was saved or the file is unreadable
    pub fn get(&self) -> u32 {
        let data = match std::fs::read(&self.path) {
            Ok(d) => d,
            Err(_) => return 0,
        };
        match postcard::from_bytes::<u32>(&data) {
            Ok(id) => id,
            Err(e) => {
                log::warn!(
                    "ignoring corrupt selection file {}: {}",
                    self.path.display(),
                    e
                );
                0
            }
        }
    }

    pub fn set(&self, id: u32) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = postcard::to_allocvec(&id)?;
        std::fs::write(&self.path, data)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

impl Default for SelectionStore {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> SelectionStore {
        SelectionStore::new(
            std::env::temp_dir()
                .join(format!("framefit-sel-{}", uuid::Uuid::new_v4()))
                .join("selection.bin"),
        )
    }

    #[test]
    fn test_absent_defaults_to_zero() {
        assert_eq!(temp_store().get(), 0);
    }

    #[test]
    fn test_persists_across_instances() {
        let store = temp_store();
        store.set(5).unwrap();
        assert_eq!(SelectionStore::new(store.path()).get(), 5);
        std::fs::remove_dir_all(store.path().parent().unwrap()).unwrap();
    }

    #[test]
    fn test_corrupt_defaults_to_zero() {
        let store = temp_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), [0xffu8]).unwrap();
        assert_eq!(store.get(), 0);
        std::fs::write(store.path(), b"").unwrap();
        assert_eq!(store.get(), 0);
        std::fs::remove_dir_all(store.path().parent().unwrap()).unwrap();
    }
}
