//! IIIF Presentation - canvas painting reconciliation and Manifest storage
//!
//! A Manifest's canvases are stored twice: as ordered `canvas_paintings`
//! rows in SQLite, and as the full IIIF JSON document in a document store.
//! Saving a Manifest reconciles three descriptions of what is painted where:
//!
//! - rows already stored for the Manifest
//! - the submitted `items` and `paintedResources`
//! - asset metadata reported once processing completes
//!
//! ## Architecture
//!
//! - **painting**: the pure reconciliation core (ordering model, identity
//!   reconciliation, implicit ordering, validators, merger, diff, document
//!   shaping)
//! - **db**: diesel/SQLite persistence, scoped per customer
//! - **document_store**: staged and published Manifest documents
//! - **services**: `ManifestService` tying the above together
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/iiif-presentation/
//! ├── presentation.db        # manifests + canvas_paintings
//! ├── documents/             # JSON documents, sharded by key hash
//! │   └── 3f2a/3f2a...json
//! └── config.toml            # Configuration
//! ```

pub mod config;
pub mod db;
pub mod document_store;
pub mod error;
pub mod ids;
pub mod painting;
pub mod paths;
pub mod services;

// Re-exports
pub use config::Config;
pub use db::{CustomerContext, PresentationDb};
pub use document_store::{DocumentStore, FsDocumentStore, MemoryDocumentStore};
pub use error::{ErrorCategory, PresentationError, ReconcileError};
pub use ids::{IdAllocator, SequentialIdAllocator, UuidIdAllocator};
pub use paths::{ConfigPathGenerator, PathGenerator};
pub use services::{
    CompleteIngestRequest, EventBus, ManifestEvent, ManifestSaved, ManifestService, ManifestView,
    Services, UpsertManifestRequest,
};
