//! Storage for rendered IIIF Manifest documents
//!
//! A Manifest whose assets are still being processed is written under a
//! staging key; once processing completes it is published under the final
//! key and the staged copy is removed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::PresentationError;

/// Key of the published document
pub fn published_key(customer_id: i32, manifest_id: &str) -> String {
    format!("{}/manifests/{}", customer_id, manifest_id)
}

/// Key of the document written while assets are still ingesting
pub fn staging_key(customer_id: i32, manifest_id: &str) -> String {
    format!("staging/{}", published_key(customer_id, manifest_id))
}

/// Key-value store of JSON documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(&self, key: &str, document: &Value) -> Result<(), PresentationError>;

    async fn get(&self, key: &str) -> Result<Option<Value>, PresentationError>;

    /// Remove a document; returns false if it did not exist
    async fn delete(&self, key: &str) -> Result<bool, PresentationError>;
}

// ============================================================================
// Filesystem
// ============================================================================

/// Documents stored as JSON files, sharded by key hash
pub struct FsDocumentStore {
    root_dir: PathBuf,
}

impl FsDocumentStore {
    pub async fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self, PresentationError> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir).await?;

        info!(path = %root_dir.display(), "Initialized document store");

        Ok(Self { root_dir })
    }

    fn key_hash(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Path for a document: first 4 hex chars of the key hash as subdirectory
    fn document_path(&self, key: &str) -> PathBuf {
        let hash = Self::key_hash(key);
        self.root_dir
            .join(&hash[..4])
            .join(format!("{}.json", hash))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn put(&self, key: &str, document: &Value) -> Result<(), PresentationError> {
        let path = self.document_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write then rename so readers never see a partial document
        let bytes = serde_json::to_vec_pretty(document)?;
        let tmp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, &path).await?;

        debug!(key, size = bytes.len(), "Stored document");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, PresentationError> {
        match fs::read(self.document_path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, PresentationError> {
        match fs::remove_file(self.document_path(key)).await {
            Ok(()) => {
                debug!(key, "Deleted document");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<String, Value>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.documents.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put(&self, key: &str, document: &Value) -> Result<(), PresentationError> {
        self.documents
            .write()
            .await
            .insert(key.to_string(), document.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, PresentationError> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, PresentationError> {
        Ok(self.documents.write().await.remove(key).is_some())
    }
}
