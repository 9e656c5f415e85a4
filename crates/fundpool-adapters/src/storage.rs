use async_trait::async_trait;
use fundpool_core::connectors::ContentStore;
use fundpool_core::error::FundPoolError;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Object held by [`InMemoryContentStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Content-addressed store kept in process memory. Ids are `bafk` + BLAKE3 hex digest.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    uploads: AtomicUsize,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, content_id: &str) -> Option<StoredObject> {
        self.objects.read().await.get(content_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Number of `upload` calls received, including ones for bytes already stored.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    fn provider_id(&self) -> &'static str {
        "memory"
    }

    async fn upload(
        &self,
        file_name: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<String, FundPoolError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let content_id = format!("bafk{}", blake3::hash(bytes).to_hex());
        self.objects.write().await.insert(
            content_id.clone(),
            StoredObject {
                file_name: file_name.to_string(),
                mime_type: mime_type.to_string(),
                bytes: bytes.to_vec(),
            },
        );
        debug!(content_id = %content_id, size_bytes = bytes.len(), "Object stored");
        Ok(content_id)
    }
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Pinning-service client: multipart `POST {base}/pinning/pinFileToIPFS` with a bearer JWT.
#[derive(Debug, Clone)]
pub struct PinningServiceStore {
    client: reqwest::Client,
    base_url: String,
    jwt: String,
}

impl PinningServiceStore {
    pub fn new(base_url: impl Into<String>, jwt: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, jwt)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        jwt: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            jwt: jwt.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/pinning/pinFileToIPFS", self.base_url)
    }
}

#[async_trait]
impl ContentStore for PinningServiceStore {
    fn provider_id(&self) -> &'static str {
        "pinning"
    }

    async fn upload(
        &self,
        file_name: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<String, FundPoolError> {
        let part = Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| FundPoolError::storage(self.provider_id(), e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.jwt)
            .multipart(form)
            .send()
            .await
            .map_err(|e| FundPoolError::storage(self.provider_id(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, file_name, "Pinning request failed");
            return Err(FundPoolError::storage(
                self.provider_id(),
                format!("HTTP {}: {}", status, body.trim()),
            ));
        }

        let pinned: PinResponse = response
            .json()
            .await
            .map_err(|e| FundPoolError::storage(self.provider_id(), e.to_string()))?;
        debug!(file_name, content_id = %pinned.ipfs_hash, "File pinned");
        Ok(pinned.ipfs_hash)
    }
}

/// Store that refuses every upload; for fault testing.
#[derive(Debug, Clone)]
pub struct FailingContentStore {
    reason: String,
}

impl FailingContentStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ContentStore for FailingContentStore {
    fn provider_id(&self) -> &'static str {
        "failing"
    }

    async fn upload(
        &self,
        _file_name: &str,
        _bytes: &[u8],
        _mime_type: &str,
    ) -> Result<String, FundPoolError> {
        Err(FundPoolError::storage(self.provider_id(), self.reason.clone()))
    }
}
