//! Service layer for iiif-presentation
//!
//! Services sit between callers (the CLI, an HTTP layer) and the stores:
//!
//! ```text
//! Caller
//!     ↓
//! ManifestService (etag checks, reconciliation, events)
//!     ↓
//! db/*.rs + DocumentStore
//! ```

pub mod events;
pub mod manifest_service;

pub use events::{spawn_logging_listener, EventBus, EventListener, ManifestEvent};
pub use manifest_service::{
    fingerprint, CompleteIngestRequest, ManifestSaved, ManifestService, ManifestView,
    UpsertManifestRequest,
};

use std::sync::Arc;

use crate::config::Config;
use crate::db::PresentationDb;
use crate::document_store::{DocumentStore, FsDocumentStore};
use crate::error::PresentationError;

/// Service container
pub struct Services {
    pub manifests: Arc<ManifestService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create services over existing stores
    pub fn new(config: &Config, db: Arc<PresentationDb>, documents: Arc<dyn DocumentStore>) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            manifests: Arc::new(ManifestService::new(config, db, documents, events.clone())),
            events,
        }
    }

    /// Open the database and document store under `config.storage_dir`
    pub async fn open(config: &Config) -> Result<Self, PresentationError> {
        let db = Arc::new(PresentationDb::open(&config.storage_dir)?);
        let documents: Arc<dyn DocumentStore> =
            Arc::new(FsDocumentStore::new(config.documents_dir()).await?);
        Ok(Self::new(config, db, documents))
    }
}
