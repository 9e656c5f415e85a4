use fundpool_core::CachedUpload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("upload cache IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CacheData {
    entries: BTreeMap<String, CachedUpload>,
}

/// File-backed copy of the content ids obtained for not-yet-submitted assets.
///
/// Written after every submission attempt so a retry after a restart does not upload
/// the same bytes again.
#[derive(Debug)]
pub struct PersistedUploadCache {
    path: PathBuf,
    data: CacheData,
}

impl PersistedUploadCache {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let data = if path.exists() {
            let bytes = fs::read(&path)?;
            if bytes.is_empty() {
                CacheData::default()
            } else {
                serde_json::from_slice(&bytes)?
            }
        } else {
            CacheData::default()
        };

        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> Vec<CachedUpload> {
        let mut values: Vec<CachedUpload> = self.data.entries.values().cloned().collect();
        values.sort_by_key(|entry| entry.uploaded_at);
        values
    }

    /// Replace the stored entries with `entries` and persist.
    pub fn replace(
        &mut self,
        entries: impl IntoIterator<Item = CachedUpload>,
    ) -> Result<(), CacheError> {
        self.data.entries = entries
            .into_iter()
            .map(|entry| (format!("{}:{}", entry.digest, entry.mime_type), entry))
            .collect();
        self.persist()
    }

    fn persist(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = serde_json::to_vec_pretty(&self.data)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, bytes)?;
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}
