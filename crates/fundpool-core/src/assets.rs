use crate::connectors::ContentStore;
use crate::error::FundPoolError;
use crate::types::{AssetReference, AssetRole, LocalAsset};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Content id obtained for a given asset body, kept so a retried submission does not
/// upload the same bytes twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedUpload {
    pub digest: String,
    pub mime_type: String,
    pub content_id: String,
    pub uploaded_at: DateTime<Utc>,
}

impl CachedUpload {
    fn key(&self) -> String {
        cache_key(&self.digest, &self.mime_type)
    }
}

/// Turns local assets into content identifiers through a [`ContentStore`].
///
/// Uploads are never retried here; a failure is returned to the caller as-is.
pub struct AssetUploadCoordinator {
    store: Arc<dyn ContentStore>,
    reuse_uploads: bool,
    cache: RwLock<BTreeMap<String, CachedUpload>>,
}

impl AssetUploadCoordinator {
    pub fn new(store: Arc<dyn ContentStore>, reuse_uploads: bool) -> Self {
        Self {
            store,
            reuse_uploads,
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn provider_id(&self) -> &'static str {
        self.store.provider_id()
    }

    /// Upload the asset in `role`'s slot, or produce an empty reference when the slot is empty.
    pub async fn upload_slot(
        &self,
        role: AssetRole,
        asset: Option<&LocalAsset>,
    ) -> Result<AssetReference, FundPoolError> {
        match asset {
            Some(asset) => self.upload(role, asset).await,
            None => Ok(AssetReference::empty(role)),
        }
    }

    pub async fn upload(
        &self,
        role: AssetRole,
        asset: &LocalAsset,
    ) -> Result<AssetReference, FundPoolError> {
        let bytes = asset.read_bytes().await?;
        let digest = blake3::hash(&bytes).to_hex().to_string();
        let key = cache_key(&digest, &asset.mime_type);

        if self.reuse_uploads {
            if let Some(cached) = self.cache.read().await.get(&key) {
                debug!(
                    role = role.name(),
                    content_id = %cached.content_id,
                    "Reusing previously uploaded asset"
                );
                return Ok(AssetReference {
                    role,
                    content_id: cached.content_id.clone(),
                });
            }
        }

        let content_id = match self
            .store
            .upload(&asset.file_name, &bytes, &asset.mime_type)
            .await
        {
            Ok(content_id) if !content_id.trim().is_empty() => content_id,
            Ok(_) => {
                return Err(FundPoolError::storage(
                    self.store.provider_id(),
                    "provider returned an empty content id",
                ))
            }
            Err(err) => {
                warn!(
                    role = role.name(),
                    provider = self.store.provider_id(),
                    error = %err,
                    "Asset upload failed"
                );
                return Err(err);
            }
        };

        info!(
            role = role.name(),
            provider = self.store.provider_id(),
            size_bytes = bytes.len(),
            content_id = %content_id,
            "Asset uploaded"
        );

        if self.reuse_uploads {
            self.cache.write().await.insert(
                key,
                CachedUpload {
                    digest,
                    mime_type: asset.mime_type.clone(),
                    content_id: content_id.clone(),
                    uploaded_at: Utc::now(),
                },
            );
        }

        Ok(AssetReference { role, content_id })
    }

    pub async fn seed_cache(&self, entries: impl IntoIterator<Item = CachedUpload>) {
        let mut cache = self.cache.write().await;
        for entry in entries {
            cache.insert(entry.key(), entry);
        }
    }

    pub async fn cached_uploads(&self) -> Vec<CachedUpload> {
        self.cache.read().await.values().cloned().collect()
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }
}

fn cache_key(digest: &str, mime_type: &str) -> String {
    format!("{}:{}", digest, mime_type.to_ascii_lowercase())
}
