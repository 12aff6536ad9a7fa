//! JSON load/save for [`LinkStore`].
use std::io::Write;
use std::path::Path;
use thiserror::Error;

use super::LinkStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access store file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid store file: {0}")]
    Json(#[from] serde_json::Error),
}

impl LinkStore {
    /// Loads a store from `path`. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = match std::fs::read(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No store file found, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let store: LinkStore = serde_json::from_slice(&content)?;
        tracing::info!(path = %path.display(), links = store.len(), "Loaded link store");
        Ok(store)
    }

    /// Writes the store to `path` atomically.
    ///
    /// The JSON goes to a uniquely named sibling first, is synced, then
    /// renamed over `path`, so a crash leaves either the old or the new
    /// file, never a torn one.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(self)?;

        use std::time::{SystemTime, UNIX_EPOCH};
        let random_suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

        let result = (|| {
            let mut temp_file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true) // Fails if the name is taken (no symlink race)
                .open(&temp_path)?;
            temp_file.write_all(&json)?;
            temp_file.sync_all()?;
            std::fs::rename(&temp_path, path)
        })();

        if let Err(e) = result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(StoreError::Io(e));
        }

        tracing::info!(path = %path.display(), links = self.len(), "Saved link store");
        Ok(())
    }
}
