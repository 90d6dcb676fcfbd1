//! Canvas painting reconciliation
//!
//! Combines three descriptions of what is painted on which canvas of a
//! Manifest into one consistent, persistable set of rows:
//!
//! - **prior**: rows already stored for the Manifest
//! - **desired**: `items` and `paintedResources` from a save request
//! - **ingest**: authoritative metadata once asset processing completes
//!
//! ## Pipeline
//!
//! ```text
//! sources::parse_*          -> InterimCanvasPainting (provenance tagged)
//! implicit_order            -> every row has a canvasOrder
//! validators                -> descriptor conflicts rejected
//! merger::merge             -> final rows (prior row ids carried over)
//! merger::allocate_canvas_ids
//! diff::diff                -> insert / update / delete
//! document::build_canvases  -> IIIF canvases for the stored document
//! ```
//!
//! Nothing in this module performs I/O.

pub mod diff;
pub mod document;
pub mod identity;
pub mod implicit_order;
pub mod ingest;
pub mod interim;
pub mod merger;
pub mod model;
pub mod sources;
pub mod validators;

pub use diff::{diff, CanvasPaintingChangeset};
pub use document::{apply_to_manifest, build_canvases, stored_body, CanvasEntry, DocumentContext};
pub use identity::AssetIdentifier;
pub use implicit_order::assign_implicit_order;
pub use ingest::{IngestResult, IngestedAsset};
pub use interim::{InterimCanvasPainting, Provenance};
pub use merger::{merge, MergeInput, MergedCanvasPaintings, MergedRow};
pub use model::{AssetId, CanvasPainting, LanguageMap, OrderKey, Ordered};
pub use sources::{CanvasPaintingDescriptor, PaintedResource, SourceContext};
pub use validators::{validate_descriptors, validate_ordering};
