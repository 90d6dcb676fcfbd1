//! Manifest service - saves Manifests and folds in ingest results
//!
//! Wraps the reconciliation core with the I/O around it: loading prior
//! rows, optimistic concurrency checks, the database write and the
//! staged/published documents.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{canvas_paintings, manifests, CustomerContext, ManifestRecord, PresentationDb};
use crate::document_store::{published_key, staging_key, DocumentStore};
use crate::error::{PresentationError, ReconcileError};
use crate::ids::{IdAllocator, UuidIdAllocator};
use crate::painting::sources::{parse_items, parse_painted_resources};
use crate::painting::{
    apply_to_manifest, assign_implicit_order, build_canvases, diff, merge, stored_body,
    validate_descriptors, AssetIdentifier, CanvasPainting, CanvasPaintingChangeset,
    DocumentContext, IngestResult, InterimCanvasPainting, LanguageMap, MergeInput,
    MergedCanvasPaintings, PaintedResource, SourceContext,
};
use crate::paths::{ConfigPathGenerator, PathGenerator};

use super::events::{EventBus, ManifestEvent};

const PRESENTATION_CONTEXT: &str = "http://iiif.io/api/presentation/3/context.json";

// ============================================================================
// Request / Response Types
// ============================================================================

/// Create or replace a Manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertManifestRequest {
    pub customer_id: i32,
    /// Allocated when absent
    #[serde(default)]
    pub manifest_id: Option<String>,
    /// Submitted IIIF Manifest; its `label` and `items` are read
    #[serde(default)]
    pub manifest: Value,
    #[serde(default)]
    pub painted_resources: Vec<PaintedResource>,
    /// Space for `items` assets that do not name one
    #[serde(default)]
    pub space: Option<i32>,
    /// Entity tag the client last saw. Must be absent on create.
    #[serde(default)]
    pub etag: Option<String>,
}

/// Asset processing finished for a Manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteIngestRequest {
    pub customer_id: i32,
    pub manifest_id: String,
    /// Entity tag when processing was requested
    #[serde(default)]
    pub observed_etag: Option<String>,
    pub ingest: IngestResult,
}

/// Outcome of a write
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSaved {
    pub manifest_id: String,
    pub created: bool,
    pub etag: String,
    /// Some assets are still being processed; the document is staged
    pub ingesting: bool,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub canvas_paintings: Vec<CanvasPainting>,
    pub document: Value,
}

/// A Manifest as currently stored
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestView {
    pub manifest: ManifestRecord,
    pub etag: String,
    pub ingesting: bool,
    pub canvas_paintings: Vec<CanvasPainting>,
    /// Staged document while ingesting, published document otherwise
    pub document: Option<Value>,
}

/// Entity tag: SHA-256 over the Manifest record and its rows
pub fn fingerprint(record: &ManifestRecord, rows: &[CanvasPainting]) -> Result<String, PresentationError> {
    let state = json!({ "manifest": record, "canvasPaintings": rows });
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&state)?);
    Ok(hex::encode(hasher.finalize()))
}

// ============================================================================
// Service
// ============================================================================

pub struct ManifestService {
    db: Arc<PresentationDb>,
    documents: Arc<dyn DocumentStore>,
    ids: Arc<dyn IdAllocator>,
    paths: Arc<dyn PathGenerator>,
    identifier: AssetIdentifier,
    default_space: Option<i32>,
    max_ingest_attempts: u32,
    events: Arc<EventBus>,
}

impl ManifestService {
    pub fn new(
        config: &Config,
        db: Arc<PresentationDb>,
        documents: Arc<dyn DocumentStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            db,
            documents,
            ids: Arc::new(UuidIdAllocator),
            paths: Arc::new(ConfigPathGenerator::new(config.presentation_base_url.clone())),
            identifier: AssetIdentifier::new(config.asset_host.clone()),
            default_space: config.default_space,
            max_ingest_attempts: config.max_ingest_attempts.max(1),
            events,
        }
    }

    /// Replace the id allocator (deterministic ids in tests)
    pub fn with_id_allocator(mut self, ids: Arc<dyn IdAllocator>) -> Self {
        self.ids = ids;
        self
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get a Manifest with its rows and current document
    pub async fn get(&self, customer_id: i32, manifest_id: &str) -> Result<ManifestView, PresentationError> {
        let ctx = CustomerContext::new(customer_id);
        let (record, rows) = self
            .load_state(&ctx, manifest_id)?
            .ok_or_else(|| not_found(&ctx, manifest_id))?;

        let etag = fingerprint(&record, &rows)?;
        let ingesting = rows.iter().any(|row| row.ingesting);
        let key = if ingesting {
            staging_key(customer_id, manifest_id)
        } else {
            published_key(customer_id, manifest_id)
        };
        let document = self.documents.get(&key).await?;

        Ok(ManifestView {
            manifest: record,
            etag,
            ingesting,
            canvas_paintings: rows,
            document,
        })
    }

    /// Ids of a customer's Manifests
    pub async fn list(&self, customer_id: i32) -> Result<Vec<String>, PresentationError> {
        let ctx = CustomerContext::new(customer_id);
        self.db.with_conn(|conn| manifests::list_ids(conn, &ctx))
    }

    fn load_state(
        &self,
        ctx: &CustomerContext,
        manifest_id: &str,
    ) -> Result<Option<(ManifestRecord, Vec<CanvasPainting>)>, PresentationError> {
        self.db.with_conn(|conn| {
            let Some(record) = manifests::get(conn, ctx, manifest_id)? else {
                return Ok(None);
            };
            let rows = canvas_paintings::list_for_manifest(conn, ctx, manifest_id)?;
            Ok(Some((record, rows)))
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create or update a Manifest from its `items` and painted resources
    pub async fn upsert(&self, request: UpsertManifestRequest) -> Result<ManifestSaved, PresentationError> {
        let ctx = CustomerContext::new(request.customer_id);
        let manifest_id = match &request.manifest_id {
            Some(id) if id.trim().is_empty() => {
                return Err(PresentationError::InvalidInput("Manifest id cannot be empty".to_string()))
            }
            Some(id) => id.clone(),
            None => self.allocate_manifest_id(&ctx)?,
        };

        // Stale tags are rejected before any reconciliation work
        let existing = self.load_state(&ctx, &manifest_id)?;
        let observed = existing
            .as_ref()
            .map(|(record, rows)| fingerprint(record, rows))
            .transpose()?;
        check_etag(request.etag.as_deref(), observed.as_deref(), &manifest_id)?;
        let prior = existing.map(|(_, rows)| rows).unwrap_or_default();

        let items: Vec<Value> = request
            .manifest
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let source_ctx = SourceContext {
            customer_id: ctx.customer_id,
            manifest_id: &manifest_id,
            paths: self.paths.as_ref(),
            identifier: &self.identifier,
        };

        let mut item_rows = parse_items(&items, &source_ctx)?;
        let default_space = request.space.or(self.default_space);
        for row in &mut item_rows {
            row.confirm_asset(default_space)?;
        }

        let mut painted_rows = parse_painted_resources(&request.painted_resources, &source_ctx)?;
        assign_implicit_order(&mut painted_rows);
        let failures = validate_descriptors(&painted_rows);
        if !failures.is_empty() {
            debug!(manifest_id = %manifest_id, failures = failures.len(), "Painted resources rejected");
            return Err(ReconcileError::Validation(failures).into());
        }

        let mut merged = merge(MergeInput {
            prior: &prior,
            items: item_rows,
            painted_resources: painted_rows,
            ingest: None,
        })?;
        merged.allocate_canvas_ids(ctx.customer_id, self.ids.as_ref())?;
        let changes = diff(&prior, &merged.paintings());

        // Painted resources carry no bodies; processed assets keep the ones
        // already written for them
        if let Some(current) = self.current_document(&ctx, &manifest_id, &prior).await? {
            let mut recovered = 0;
            for row in merged
                .rows
                .iter_mut()
                .filter(|row| row.body.is_none() && row.painting.asset_id.is_some())
            {
                row.body = stored_body(
                    &current,
                    &row.painting,
                    ctx.customer_id,
                    self.paths.as_ref(),
                    &self.identifier,
                );
                recovered += usize::from(row.body.is_some());
            }
            debug!(manifest_id = %manifest_id, recovered, "Recovered bodies from current document");
        }

        let label: Option<LanguageMap> = request
            .manifest
            .get("label")
            .and_then(|label| serde_json::from_value(label.clone()).ok());

        let (created, stored, etag) = self.db.transaction(|conn| {
            if current_etag(conn, &ctx, &manifest_id)? != observed {
                return Err(PresentationError::PreconditionFailed(format!(
                    "Manifest {} changed while it was being saved",
                    manifest_id
                )));
            }
            let created = manifests::upsert(conn, &ctx, &manifest_id, label.as_ref(), request.space)?;
            let stored = canvas_paintings::apply_changeset(conn, &ctx, &manifest_id, &changes)?;
            let etag = require_etag(conn, &ctx, &manifest_id)?;
            Ok((created, stored, etag))
        })?;

        let ingesting = merged.any_ingesting();
        let document = self.render_document(&ctx, &manifest_id, &request.manifest, &merged, None, &items)?;
        self.write_document(&ctx, &manifest_id, &document, ingesting).await?;

        self.events.emit(if created {
            ManifestEvent::ManifestCreated {
                customer_id: ctx.customer_id,
                manifest_id: manifest_id.clone(),
            }
        } else {
            ManifestEvent::ManifestUpdated {
                customer_id: ctx.customer_id,
                manifest_id: manifest_id.clone(),
            }
        });
        self.emit_reconciled(&ctx, &manifest_id, &changes, ingesting);

        info!(
            customer_id = ctx.customer_id,
            manifest_id = %manifest_id,
            created,
            ingesting,
            rows = stored.len(),
            "Saved manifest"
        );

        Ok(ManifestSaved {
            manifest_id,
            created,
            etag,
            ingesting,
            inserted: changes.insert.len(),
            updated: changes.update.len(),
            deleted: changes.delete.len(),
            canvas_paintings: stored,
            document,
        })
    }

    /// Fold authoritative ingest data into a staged Manifest and publish it.
    ///
    /// Prior state is re-read on every attempt; if the Manifest changes between
    /// the read and the write the attempt is discarded and retried.
    pub async fn complete_ingest(
        &self,
        request: CompleteIngestRequest,
    ) -> Result<ManifestSaved, PresentationError> {
        let ctx = CustomerContext::new(request.customer_id);
        let manifest_id = request.manifest_id.as_str();
        let mut observed = request.observed_etag.clone();

        for attempt in 1..=self.max_ingest_attempts {
            let (record, prior) = self
                .load_state(&ctx, manifest_id)?
                .ok_or_else(|| not_found(&ctx, manifest_id))?;
            let etag = fingerprint(&record, &prior)?;
            if observed.as_deref().is_some_and(|seen| seen != etag) {
                debug!(manifest_id, attempt, "Manifest changed since last observed, using fresh state");
            }
            observed = Some(etag.clone());

            let staged = self
                .documents
                .get(&staging_key(ctx.customer_id, manifest_id))
                .await?
                .ok_or_else(|| {
                    PresentationError::PreconditionFailed(format!(
                        "Manifest {} has no staged document awaiting ingest",
                        manifest_id
                    ))
                })?;

            let rows: Vec<InterimCanvasPainting> = prior
                .iter()
                .map(|painting| {
                    let mut row = InterimCanvasPainting::from_persisted(painting);
                    row.body = stored_body(
                        &staged,
                        painting,
                        ctx.customer_id,
                        self.paths.as_ref(),
                        &self.identifier,
                    );
                    row
                })
                .collect();

            let mut merged = merge(MergeInput {
                prior: &prior,
                items: Vec::new(),
                painted_resources: rows,
                ingest: Some(&request.ingest),
            })?;
            merged.allocate_canvas_ids(ctx.customer_id, self.ids.as_ref())?;
            let changes = diff(&prior, &merged.paintings());
            let ingesting = merged.any_ingesting();

            let saved = self.db.transaction(|conn| {
                if current_etag(conn, &ctx, manifest_id)?.as_deref() != Some(etag.as_str()) {
                    return Ok(None);
                }
                let stored = canvas_paintings::apply_changeset(conn, &ctx, manifest_id, &changes)?;
                if !ingesting {
                    manifests::mark_processed(conn, &ctx, manifest_id)?;
                }
                let etag = require_etag(conn, &ctx, manifest_id)?;
                Ok(Some((stored, etag)))
            })?;

            let Some((stored, new_etag)) = saved else {
                warn!(manifest_id, attempt, "Manifest changed during ingest completion, retrying");
                continue;
            };

            let existing_items: Vec<Value> = staged
                .get("items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let document = self.render_document(
                &ctx,
                manifest_id,
                &staged,
                &merged,
                Some(&request.ingest),
                &existing_items,
            )?;
            self.write_document(&ctx, manifest_id, &document, ingesting).await?;

            self.emit_reconciled(&ctx, manifest_id, &changes, ingesting);
            if !ingesting {
                self.events.emit(ManifestEvent::IngestCompleted {
                    customer_id: ctx.customer_id,
                    manifest_id: manifest_id.to_string(),
                    attempts: attempt,
                });
            }

            info!(
                customer_id = ctx.customer_id,
                manifest_id,
                attempt,
                ingesting,
                "Completed manifest ingest"
            );

            return Ok(ManifestSaved {
                manifest_id: manifest_id.to_string(),
                created: false,
                etag: new_etag,
                ingesting,
                inserted: changes.insert.len(),
                updated: changes.update.len(),
                deleted: changes.delete.len(),
                canvas_paintings: stored,
                document,
            });
        }

        Err(PresentationError::PreconditionFailed(format!(
            "Manifest {} kept changing during ingest completion ({} attempts)",
            manifest_id, self.max_ingest_attempts
        )))
    }

    /// Delete a Manifest, its rows and both stored documents
    pub async fn delete(&self, customer_id: i32, manifest_id: &str) -> Result<(), PresentationError> {
        let ctx = CustomerContext::new(customer_id);
        let deleted = self.db.with_conn(|conn| manifests::delete(conn, &ctx, manifest_id))?;
        if !deleted {
            return Err(not_found(&ctx, manifest_id));
        }

        self.documents.delete(&published_key(customer_id, manifest_id)).await?;
        self.documents.delete(&staging_key(customer_id, manifest_id)).await?;

        self.events.emit(ManifestEvent::ManifestDeleted {
            customer_id,
            manifest_id: manifest_id.to_string(),
        });
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn allocate_manifest_id(&self, ctx: &CustomerContext) -> Result<String, PresentationError> {
        self.ids
            .allocate(ctx.customer_id, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| PresentationError::Internal("Id allocator returned no manifest id".to_string()))
    }

    /// Document last written for a Manifest: staged while its rows are
    /// ingesting, published otherwise
    async fn current_document(
        &self,
        ctx: &CustomerContext,
        manifest_id: &str,
        prior: &[CanvasPainting],
    ) -> Result<Option<Value>, PresentationError> {
        if prior.is_empty() {
            return Ok(None);
        }
        let staged = staging_key(ctx.customer_id, manifest_id);
        let published = published_key(ctx.customer_id, manifest_id);
        let (first, second) = if prior.iter().any(|row| row.ingesting) {
            (staged, published)
        } else {
            (published, staged)
        };

        match self.documents.get(&first).await? {
            Some(document) => Ok(Some(document)),
            None => self.documents.get(&second).await,
        }
    }

    fn render_document(
        &self,
        ctx: &CustomerContext,
        manifest_id: &str,
        base: &Value,
        merged: &MergedCanvasPaintings,
        ingest: Option<&IngestResult>,
        existing_items: &[Value],
    ) -> Result<Value, PresentationError> {
        let mut document = match base {
            Value::Object(_) => base.clone(),
            _ => json!({}),
        };
        if let Value::Object(map) = &mut document {
            map.insert("@context".to_string(), json!(PRESENTATION_CONTEXT));
            map.insert(
                "id".to_string(),
                json!(self.paths.manifest_id(ctx.customer_id, manifest_id)),
            );
            map.insert("type".to_string(), json!("Manifest"));
        }

        let canvases = build_canvases(
            &merged.rows,
            &DocumentContext {
                customer_id: ctx.customer_id,
                paths: self.paths.as_ref(),
                ingest,
                existing_items,
            },
        );
        apply_to_manifest(&mut document, &canvases)?;
        Ok(document)
    }

    /// Stage while anything is ingesting, otherwise publish and drop the staged copy
    async fn write_document(
        &self,
        ctx: &CustomerContext,
        manifest_id: &str,
        document: &Value,
        ingesting: bool,
    ) -> Result<(), PresentationError> {
        if ingesting {
            self.documents
                .put(&staging_key(ctx.customer_id, manifest_id), document)
                .await
        } else {
            self.documents
                .put(&published_key(ctx.customer_id, manifest_id), document)
                .await?;
            self.documents
                .delete(&staging_key(ctx.customer_id, manifest_id))
                .await?;
            Ok(())
        }
    }

    fn emit_reconciled(
        &self,
        ctx: &CustomerContext,
        manifest_id: &str,
        changes: &CanvasPaintingChangeset,
        ingesting: bool,
    ) {
        self.events.emit(ManifestEvent::CanvasPaintingsReconciled {
            customer_id: ctx.customer_id,
            manifest_id: manifest_id.to_string(),
            inserted: changes.insert.len(),
            updated: changes.update.len(),
            deleted: changes.delete.len(),
            ingesting,
        });
    }
}

fn not_found(ctx: &CustomerContext, manifest_id: &str) -> PresentationError {
    PresentationError::NotFound(format!("Manifest {} for {}", manifest_id, ctx))
}

fn check_etag(requested: Option<&str>, current: Option<&str>, manifest_id: &str) -> Result<(), PresentationError> {
    match (requested, current) {
        (Some(_), None) => Err(PresentationError::PreconditionFailed(format!(
            "Manifest {} does not exist, an ETag cannot be supplied when creating it",
            manifest_id
        ))),
        (Some(requested), Some(current)) if requested != current => Err(
            PresentationError::PreconditionFailed(format!("ETag for Manifest {} is stale", manifest_id)),
        ),
        _ => Ok(()),
    }
}

fn current_etag(
    conn: &mut diesel::SqliteConnection,
    ctx: &CustomerContext,
    manifest_id: &str,
) -> Result<Option<String>, PresentationError> {
    let Some(record) = manifests::get(conn, ctx, manifest_id)? else {
        return Ok(None);
    };
    let rows = canvas_paintings::list_for_manifest(conn, ctx, manifest_id)?;
    fingerprint(&record, &rows).map(Some)
}

fn require_etag(
    conn: &mut diesel::SqliteConnection,
    ctx: &CustomerContext,
    manifest_id: &str,
) -> Result<String, PresentationError> {
    current_etag(conn, ctx, manifest_id)?.ok_or_else(|| {
        PresentationError::Internal(format!("Manifest {} vanished mid-transaction", manifest_id))
    })
}
