//! Canvas painting merger
//!
//! Folds prior rows, client-submitted rows and (optionally) ingest results
//! into the final ordered set for a Manifest:
//!
//! 1. Join `items` rows with painted-resource rows naming the same canvas
//! 2. Align the result with prior rows (row ids carry over on a match)
//! 3. Overlay authoritative ingest data
//! 4. Default canvas labels
//! 5. Re-validate ordering
//!
//! The merger holds no state and performs no I/O. Canvas id allocation and
//! the persistence diff run on its output.

use std::collections::{BTreeMap, VecDeque};

use serde_json::Value;
use tracing::{debug, error, warn};

use super::identity;
use super::ingest::IngestResult;
use super::interim::{InterimCanvasPainting, Provenance};
use super::model::{sort_by_order, CanvasPainting, CanvasPlacement, Ordered};
use super::validators::validate_ordering;
use crate::error::{CanvasPaintingMergerError, PresentationError, ReconcileError};
use crate::ids::IdAllocator;

/// Inputs for one merge
pub struct MergeInput<'a> {
    pub prior: &'a [CanvasPainting],
    /// Rows parsed from Manifest `items`, asset identity already confirmed
    pub items: Vec<InterimCanvasPainting>,
    /// Rows parsed from `paintedResources`, implicit order already assigned
    pub painted_resources: Vec<InterimCanvasPainting>,
    pub ingest: Option<&'a IngestResult>,
}

/// A final row plus the body it should paint, if known
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub painting: CanvasPainting,
    pub body: Option<Value>,
    pub provenance: Provenance,
}

impl Ordered for MergedRow {
    fn canvas_order(&self) -> i32 {
        self.painting.canvas_order
    }

    fn choice_order(&self) -> Option<i32> {
        self.painting.choice_order
    }
}

impl CanvasPlacement for MergedRow {
    fn canvas_identity(&self) -> Option<&str> {
        self.painting.canvas_identity()
    }
}

/// Merge result, in presentation order
#[derive(Debug, Clone, Default)]
pub struct MergedCanvasPaintings {
    pub rows: Vec<MergedRow>,
}

impl MergedCanvasPaintings {
    pub fn paintings(&self) -> Vec<CanvasPainting> {
        self.rows.iter().map(|row| row.painting.clone()).collect()
    }

    pub fn any_ingesting(&self) -> bool {
        self.rows.iter().any(|row| row.painting.ingesting)
    }

    /// Give every canvas a platform id.
    ///
    /// Rows on one `canvas_order` share an id, as do adjacent rows with the
    /// same `canvas_original_id`. A canvas id that comes back after another
    /// canvas starts a new canvas with its own id. Existing ids are kept.
    pub fn allocate_canvas_ids(
        &mut self,
        customer_id: i32,
        ids: &dyn IdAllocator,
    ) -> Result<usize, PresentationError> {
        let mut groups: Vec<(CanvasGroupKey, Vec<usize>)> = Vec::new();
        // Whether the previous row also needed an id
        let mut contiguous = false;
        for (index, row) in self.rows.iter().enumerate() {
            if row.painting.canvas_id.is_some() {
                contiguous = false;
                continue;
            }
            let key = match &row.painting.canvas_original_id {
                Some(original) => CanvasGroupKey::Original(original.clone()),
                None => CanvasGroupKey::Order(row.painting.canvas_order),
            };
            match groups.last_mut() {
                Some((last_key, members)) if contiguous && *last_key == key => members.push(index),
                _ => {
                    if let CanvasGroupKey::Original(original) = &key {
                        if groups.iter().any(|(k, _)| *k == key) {
                            warn!(
                                canvas = %original,
                                "Canvas repeats after another canvas, allocating a separate id"
                            );
                        }
                    }
                    groups.push((key, vec![index]));
                }
            }
            contiguous = true;
        }

        if groups.is_empty() {
            return Ok(0);
        }

        let allocated = ids.allocate(customer_id, groups.len())?;
        if allocated.len() != groups.len() {
            return Err(PresentationError::Internal(format!(
                "Requested {} canvas ids but received {}",
                groups.len(),
                allocated.len()
            )));
        }

        for ((_, members), canvas_id) in groups.iter().zip(allocated) {
            for &index in members {
                self.rows[index].painting.canvas_id = Some(canvas_id.clone());
            }
        }

        debug!(customer_id, allocated = groups.len(), "Allocated canvas ids");
        Ok(groups.len())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum CanvasGroupKey {
    Original(String),
    Order(i32),
}

/// Run the full merge
pub fn merge(input: MergeInput<'_>) -> Result<MergedCanvasPaintings, ReconcileError> {
    let mut rows = combine_sources(input.items, input.painted_resources)?;

    align_with_prior(&mut rows, input.prior);

    if let Some(ingest) = input.ingest {
        overlay_ingest(&mut rows, ingest)?;
    }

    sort_by_order(&mut rows);
    default_canvas_labels(&mut rows);

    let failures = validate_ordering(&rows);
    if !failures.is_empty() {
        debug!(failures = failures.len(), "Merged canvas paintings failed validation");
        return Err(ReconcileError::Validation(failures));
    }

    Ok(MergedCanvasPaintings {
        rows: rows
            .into_iter()
            .map(|row| MergedRow {
                painting: row.painting,
                body: row.body,
                provenance: row.provenance,
            })
            .collect(),
    })
}

// ============================================================================
// Source Combination
// ============================================================================

fn same_canvas_identity(a: &CanvasPainting, b: &CanvasPainting) -> bool {
    let platform = a.canvas_id.is_some() && a.canvas_id == b.canvas_id;
    let external = a.canvas_original_id.is_some() && a.canvas_original_id == b.canvas_original_id;
    platform || external
}

fn is_placeholder(row: &InterimCanvasPainting) -> bool {
    row.body.is_none() && row.painting.asset_id.is_none() && row.suspected_asset_id.is_none()
}

/// Join painted resources onto the `items` rows they describe, then fit the
/// remaining `items` canvases around the painted resources' orders.
fn combine_sources(
    items: Vec<InterimCanvasPainting>,
    painted: Vec<InterimCanvasPainting>,
) -> Result<Vec<InterimCanvasPainting>, CanvasPaintingMergerError> {
    if painted.is_empty() {
        return Ok(items);
    }
    if items.is_empty() {
        return Ok(painted);
    }

    let mut consumed = vec![false; items.len()];
    let mut combined = Vec::with_capacity(items.len() + painted.len());

    for resource in painted {
        if !resource.painting.has_canvas_identity() {
            combined.push(resource);
            continue;
        }

        let matched = items
            .iter()
            .enumerate()
            .position(|(i, item)| {
                !consumed[i]
                    && same_canvas_identity(&item.painting, &resource.painting)
                    && item.painting.choice_order == resource.painting.choice_order
            })
            .or_else(|| {
                items.iter().position(|item| {
                    is_placeholder(item) && same_canvas_identity(&item.painting, &resource.painting)
                })
            });

        match matched {
            Some(index) => {
                consumed[index] = true;
                combined.push(join_rows(&items[index], resource)?);
            }
            None => combined.push(resource),
        }
    }

    // Remaining items canvases fill the gaps between painted orders
    let mut remaining: BTreeMap<i32, Vec<InterimCanvasPainting>> = BTreeMap::new();
    for (item, used) in items.into_iter().zip(consumed) {
        if !used {
            remaining.entry(item.painting.canvas_order).or_default().push(item);
        }
    }
    let mut remaining: VecDeque<Vec<InterimCanvasPainting>> = remaining.into_values().collect();

    let mut taken: Vec<i32> = combined.iter().map(|row| row.painting.canvas_order).collect();
    taken.sort_unstable();
    taken.dedup();

    let mut next = 0;
    let mut placed = Vec::new();
    for order in taken {
        while next < order {
            let Some(group) = remaining.pop_front() else {
                break;
            };
            place_group(group, next, &mut placed);
            next += 1;
        }
        next = order + 1;
    }
    while let Some(group) = remaining.pop_front() {
        place_group(group, next, &mut placed);
        next += 1;
    }

    combined.extend(placed);
    Ok(combined)
}

fn place_group(group: Vec<InterimCanvasPainting>, canvas_order: i32, out: &mut Vec<InterimCanvasPainting>) {
    for mut row in group {
        row.painting.canvas_order = canvas_order;
        out.push(row);
    }
}

/// Join an `items` row with the painted resource describing the same canvas
fn join_rows(
    item: &InterimCanvasPainting,
    resource: InterimCanvasPainting,
) -> Result<InterimCanvasPainting, CanvasPaintingMergerError> {
    let canvas = item
        .painting
        .canvas_original_id
        .clone()
        .or_else(|| item.painting.canvas_id.clone())
        .unwrap_or_default();

    let mismatch = |what: &str, expected: String, actual: String| {
        let err = CanvasPaintingMergerError {
            expected,
            actual,
            canvas_original_id: canvas.clone(),
            message: format!("Canvas painting {} mismatch between items and painted resources", what),
        };
        error!(
            canvas = %err.canvas_original_id,
            expected = %err.expected,
            actual = %err.actual,
            "{}",
            err.message
        );
        err
    };

    let mut joined = resource;
    let target = &mut joined.painting;
    let source = &item.painting;

    for (what, ours, theirs) in [
        ("canvasId", &mut target.canvas_id, &source.canvas_id),
        ("canvasOriginalId", &mut target.canvas_original_id, &source.canvas_original_id),
        ("target", &mut target.target, &source.target),
    ] {
        if let (Some(a), Some(b)) = (ours.as_ref(), theirs) {
            if a != b {
                return Err(mismatch(what, b.clone(), a.clone()));
            }
        }
        if ours.is_none() {
            *ours = theirs.clone();
        }
    }

    for (what, ours, theirs) in [
        ("label", &mut target.label, &source.label),
        ("canvasLabel", &mut target.canvas_label, &source.canvas_label),
    ] {
        if let (Some(a), Some(b)) = (ours.as_ref(), theirs) {
            if a != b {
                return Err(mismatch(what, format!("{:?}", b), format!("{:?}", a)));
            }
        }
        if ours.is_none() {
            *ours = theirs.clone();
        }
    }

    if target.asset_id.is_none() {
        target.external_asset_id = target
            .external_asset_id
            .take()
            .or_else(|| source.external_asset_id.clone());
        if source.asset_id.is_some() {
            target.asset_id = source.asset_id.clone();
        }
    }

    if joined.body.is_none() {
        joined.body = item.body.clone();
    }
    joined.provenance = Provenance::Mixed;
    Ok(joined)
}

// ============================================================================
// Prior Alignment
// ============================================================================

/// Match each row to a prior row: by canvas identity and choice order, else
/// (for rows without a canvas identity) by asset. Matched rows keep the
/// prior row id and canvas id.
fn align_with_prior(rows: &mut [InterimCanvasPainting], prior: &[CanvasPainting]) {
    let mut used = vec![false; prior.len()];

    for row in rows.iter_mut() {
        let by_canvas = prior.iter().enumerate().position(|(i, p)| {
            !used[i]
                && same_canvas_identity(p, &row.painting)
                && p.choice_order == row.painting.choice_order
        });

        let by_asset = || {
            if row.painting.has_canvas_identity() || row.painting.asset_id.is_none() {
                return None;
            }
            let candidates: Vec<usize> = (0..prior.len())
                .filter(|&i| !used[i] && prior[i].asset_id == row.painting.asset_id)
                .collect();
            candidates
                .iter()
                .copied()
                .find(|&i| prior[i].choice_order == row.painting.choice_order)
                .or_else(|| candidates.first().copied())
        };

        let Some(index) = by_canvas.or_else(by_asset) else {
            continue;
        };
        used[index] = true;
        carry_over(&mut row.painting, &prior[index]);
    }

    // Rows on a canvas share its id
    let mut canvas_ids: BTreeMap<i32, String> = BTreeMap::new();
    for row in rows.iter() {
        if let Some(canvas_id) = &row.painting.canvas_id {
            canvas_ids
                .entry(row.painting.canvas_order)
                .or_insert_with(|| canvas_id.clone());
        }
    }
    for row in rows.iter_mut() {
        if row.painting.canvas_id.is_none() {
            row.painting.canvas_id = canvas_ids.get(&row.painting.canvas_order).cloned();
        }
    }

    let matched = used.iter().filter(|u| **u).count();
    debug!(prior = prior.len(), matched, "Aligned canvas paintings with prior rows");
}

fn carry_over(row: &mut CanvasPainting, prior: &CanvasPainting) {
    row.canvas_painting_id = prior.canvas_painting_id;
    if row.canvas_id.is_none() {
        row.canvas_id = prior.canvas_id.clone();
    }

    // Already processed: keep what processing produced
    if row.asset_id.is_some() && row.asset_id == prior.asset_id && !prior.ingesting {
        row.ingesting = false;
        if row.thumbnail.is_none() {
            row.thumbnail = prior.thumbnail.clone();
        }
        if row.duration.is_none() {
            row.duration = prior.duration;
        }
        if row.static_width.is_none() && row.static_height.is_none() {
            row.static_width = prior.static_width;
            row.static_height = prior.static_height;
        }
    }
}

// ============================================================================
// Ingest Overlay
// ============================================================================

fn overlay_ingest(
    rows: &mut [InterimCanvasPainting],
    ingest: &IngestResult,
) -> Result<(), ReconcileError> {
    let mut mismatches = Vec::new();
    let mut applied = 0;

    for row in rows.iter_mut() {
        let Some(declared) = row.painting.asset_id.clone() else {
            continue;
        };
        let Some(ingested) = ingest.get(&declared) else {
            continue;
        };

        let context = row.location();
        match identity::reconcile(Some(&declared), Some(&ingested.asset_id), &context) {
            Ok(confirmed) => row.painting.asset_id = confirmed,
            Err(mismatch) => {
                mismatches.push(mismatch);
                continue;
            }
        }

        let painting = &mut row.painting;
        if ingested.duration.is_some() {
            painting.duration = ingested.duration;
        }
        if ingested.thumbnail.is_some() {
            painting.thumbnail = ingested.thumbnail.clone();
        }
        if painting.static_width.is_none() && painting.static_height.is_none() {
            painting.static_width = ingested.width;
            painting.static_height = ingested.height;
        }
        painting.ingesting = false;
        applied += 1;
    }

    if !mismatches.is_empty() {
        return Err(ReconcileError::IdentityMismatch(mismatches));
    }

    debug!(applied, "Applied ingest overlay");
    Ok(())
}

// ============================================================================
// Canvas Labels
// ============================================================================

/// A canvas with no `canvas_label` takes the label of its first row.
/// Expects `rows` in presentation order.
fn default_canvas_labels(rows: &mut [InterimCanvasPainting]) {
    let mut start = 0;
    while start < rows.len() {
        let canvas_order = rows[start].painting.canvas_order;
        let end = rows[start..]
            .iter()
            .position(|row| row.painting.canvas_order != canvas_order)
            .map_or(rows.len(), |offset| start + offset);

        let group = &mut rows[start..end];
        if group.iter().all(|row| row.painting.canvas_label.is_none()) {
            let first = &mut group[0].painting;
            first.canvas_label = first.label.clone();
        }
        start = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIdAllocator;
    use crate::painting::ingest::IngestedAsset;
    use crate::painting::model::{language_map, AssetId};

    fn painting(canvas: &str, canvas_order: i32, choice_order: Option<i32>) -> CanvasPainting {
        CanvasPainting {
            manifest_id: "m1".into(),
            customer_id: 1,
            canvas_id: Some(canvas.into()),
            canvas_order,
            choice_order,
            ..Default::default()
        }
    }

    fn painted(canvas: &str, canvas_order: i32, choice_order: Option<i32>, asset: &str) -> InterimCanvasPainting {
        let mut row = painting(canvas, canvas_order, choice_order);
        row.asset_id = Some(AssetId::new(1, 2, asset));
        row.ingesting = true;
        InterimCanvasPainting::new(row, Provenance::PaintedResource)
    }

    fn item(original: &str, canvas_order: i32) -> InterimCanvasPainting {
        let row = CanvasPainting {
            manifest_id: "m1".into(),
            customer_id: 1,
            canvas_original_id: Some(original.into()),
            canvas_order,
            ..Default::default()
        };
        let mut row = InterimCanvasPainting::new(row, Provenance::Items);
        row.implicit_order = true;
        row.body = Some(serde_json::json!({"id": format!("{}/image.jpg", original), "type": "Image"}));
        row
    }

    fn persisted(mut rows: Vec<CanvasPainting>) -> Vec<CanvasPainting> {
        for (i, row) in rows.iter_mut().enumerate() {
            row.canvas_painting_id = Some(i as i32 + 1);
        }
        rows
    }

    fn run(
        prior: &[CanvasPainting],
        items: Vec<InterimCanvasPainting>,
        painted: Vec<InterimCanvasPainting>,
        ingest: Option<&IngestResult>,
    ) -> Result<MergedCanvasPaintings, ReconcileError> {
        merge(MergeInput {
            prior,
            items,
            painted_resources: painted,
            ingest,
        })
    }

    #[test]
    fn test_new_rows_have_no_row_id() {
        let merged = run(&[], vec![], vec![painted("c1", 0, None, "a")], None).unwrap();
        assert_eq!(merged.rows.len(), 1);
        assert!(merged.rows[0].painting.canvas_painting_id.is_none());
    }

    #[test]
    fn test_matched_rows_keep_row_id() {
        let prior = persisted(vec![painting("c1", 0, None)]);
        let merged = run(&prior, vec![], vec![painted("c1", 3, None, "a")], None).unwrap();
        assert_eq!(merged.rows[0].painting.canvas_painting_id, Some(1));
        assert_eq!(merged.rows[0].painting.canvas_order, 3);
    }

    #[test]
    fn test_rows_without_canvas_match_prior_by_asset() {
        let mut prior_row = painting("c9", 0, None);
        prior_row.asset_id = Some(AssetId::new(1, 2, "a"));
        prior_row.thumbnail = Some("https://thumbs/a.jpg".into());
        let prior = persisted(vec![prior_row]);

        let mut row = painted("ignored", 0, None, "a");
        row.painting.canvas_id = None;

        let merged = run(&prior, vec![], vec![row], None).unwrap();
        let result = &merged.rows[0].painting;
        assert_eq!(result.canvas_painting_id, Some(1));
        assert_eq!(result.canvas_id.as_deref(), Some("c9"));
        assert!(!result.ingesting);
        assert_eq!(result.thumbnail.as_deref(), Some("https://thumbs/a.jpg"));
    }

    #[test]
    fn test_choice_members_share_canvas_id() {
        let mut first = painted("c1", 0, Some(1), "a");
        first.painting.canvas_id = None;
        let mut second = painted("c1", 0, Some(2), "b");
        second.painting.canvas_id = None;
        first.painting.canvas_original_id = Some("https://example.org/c".into());
        second.painting.canvas_original_id = Some("https://example.org/c".into());

        let mut merged = run(&[], vec![], vec![first, second], None).unwrap();
        let allocator = SequentialIdAllocator::new("canvas-");
        assert_eq!(merged.allocate_canvas_ids(1, &allocator).unwrap(), 1);
        assert!(merged
            .rows
            .iter()
            .all(|r| r.painting.canvas_id.as_deref() == Some("canvas-1")));
    }

    #[test]
    fn test_distinct_canvases_get_distinct_ids() {
        let mut a = painted("x", 0, None, "a");
        a.painting.canvas_id = None;
        let mut b = painted("x", 1, None, "b");
        b.painting.canvas_id = None;

        let mut merged = run(&[], vec![], vec![a, b], None).unwrap();
        merged
            .allocate_canvas_ids(1, &SequentialIdAllocator::new("canvas-"))
            .unwrap();
        assert_eq!(merged.rows[0].painting.canvas_id.as_deref(), Some("canvas-1"));
        assert_eq!(merged.rows[1].painting.canvas_id.as_deref(), Some("canvas-2"));
    }

    #[test]
    fn test_repeated_original_canvas_gets_id_per_run() {
        let rows: Vec<_> = [("a", 0, "x"), ("a", 1, "y"), ("b", 2, "z"), ("a", 3, "w")]
            .into_iter()
            .map(|(original, order, asset)| {
                let mut row = painted("unused", order, None, asset);
                row.painting.canvas_id = None;
                row.painting.canvas_original_id = Some(format!("https://example.org/{}", original));
                row
            })
            .collect();

        let mut merged = run(&[], vec![], rows, None).unwrap();
        let allocated = merged
            .allocate_canvas_ids(1, &SequentialIdAllocator::new("canvas-"))
            .unwrap();
        assert_eq!(allocated, 3);
        let ids: Vec<_> = merged
            .rows
            .iter()
            .map(|r| r.painting.canvas_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["canvas-1", "canvas-1", "canvas-2", "canvas-3"]);
    }

    #[test]
    fn test_canvas_label_defaults_to_first_label() {
        let mut first = painted("c1", 0, Some(1), "a");
        first.painting.label = Some(language_map("en", "first"));
        let mut second = painted("c1", 0, Some(2), "b");
        second.painting.label = Some(language_map("en", "second"));

        let merged = run(&[], vec![], vec![second, first], None).unwrap();
        assert_eq!(merged.rows[0].painting.canvas_label, Some(language_map("en", "first")));
        assert!(merged.rows[1].painting.canvas_label.is_none());
    }

    #[test]
    fn test_existing_canvas_label_is_kept() {
        let mut row = painted("c1", 0, None, "a");
        row.painting.label = Some(language_map("en", "asset"));
        row.painting.canvas_label = Some(language_map("en", "canvas"));
        let merged = run(&[], vec![], vec![row], None).unwrap();
        assert_eq!(merged.rows[0].painting.canvas_label, Some(language_map("en", "canvas")));
    }

    #[test]
    fn test_items_join_painted_resource_on_same_canvas() {
        let items = vec![item("https://example.org/c1", 0), item("https://example.org/c2", 1)];
        let mut resource = painted("unused", 5, None, "a");
        resource.painting.canvas_id = None;
        resource.painting.canvas_original_id = Some("https://example.org/c2".into());
        resource.painting.label = Some(language_map("en", "from client"));

        let merged = run(&[], items, vec![resource], None).unwrap();
        assert_eq!(merged.rows.len(), 2);

        // Unjoined items canvas fills the gap before the painted order
        assert_eq!(merged.rows[0].painting.canvas_order, 0);
        assert_eq!(merged.rows[0].provenance, Provenance::Items);

        let joined = &merged.rows[1];
        assert_eq!(joined.painting.canvas_order, 5);
        assert_eq!(joined.provenance, Provenance::Mixed);
        assert_eq!(joined.painting.asset_id, Some(AssetId::new(1, 2, "a")));
        assert!(joined.body.is_some());
    }

    #[test]
    fn test_leftover_items_are_appended() {
        let items = vec![item("https://example.org/c1", 0), item("https://example.org/c2", 1)];
        let merged = run(&[], items, vec![painted("c9", 0, None, "a")], None).unwrap();
        let orders: Vec<_> = merged.rows.iter().map(|r| r.painting.canvas_order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(merged.rows[0].provenance, Provenance::PaintedResource);
    }

    #[test]
    fn test_joined_label_conflict_is_internal_error() {
        let mut items = vec![item("https://example.org/c1", 0)];
        items[0].painting.label = Some(language_map("en", "items"));
        let mut resource = painted("unused", 0, None, "a");
        resource.painting.canvas_id = None;
        resource.painting.canvas_original_id = Some("https://example.org/c1".into());
        resource.painting.label = Some(language_map("en", "client"));

        let err = run(&[], items, vec![resource], None).unwrap_err();
        match err {
            ReconcileError::Merger(e) => {
                assert_eq!(e.canvas_original_id, "https://example.org/c1");
                assert!(e.message.contains("label"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_ingest_overlay_fills_metadata() {
        let mut ingest = IngestResult::default();
        let mut asset = IngestedAsset::new(AssetId::new(1, 2, "a"));
        asset.width = Some(1000);
        asset.height = Some(800);
        asset.thumbnail = Some("https://thumbs/a.jpg".into());
        ingest.insert(AssetId::new(1, 2, "a"), asset);

        let mut sized = painted("c2", 1, None, "b");
        sized.painting.static_width = Some(10);
        sized.painting.static_height = Some(20);
        let mut other = IngestedAsset::new(AssetId::new(1, 2, "b"));
        other.width = Some(500);
        other.height = Some(500);
        ingest.insert(AssetId::new(1, 2, "b"), other);

        let merged = run(&[], vec![], vec![painted("c1", 0, None, "a"), sized], Some(&ingest)).unwrap();
        let first = &merged.rows[0].painting;
        assert_eq!((first.static_width, first.static_height), (Some(1000), Some(800)));
        assert_eq!(first.thumbnail.as_deref(), Some("https://thumbs/a.jpg"));
        assert!(!first.ingesting);

        // Client-specified sizes survive
        let second = &merged.rows[1].painting;
        assert_eq!((second.static_width, second.static_height), (Some(10), Some(20)));
        assert!(!merged.any_ingesting());
    }

    #[test]
    fn test_ingest_identity_mismatch_aborts() {
        let mut ingest = IngestResult::default();
        ingest.insert(AssetId::new(1, 2, "a"), IngestedAsset::new(AssetId::new(1, 3, "a")));

        let err = run(&[], vec![], vec![painted("c1", 0, None, "a")], Some(&ingest)).unwrap_err();
        match err {
            ReconcileError::IdentityMismatch(mismatches) => {
                assert_eq!(mismatches[0].declared, AssetId::new(1, 2, "a"));
                assert_eq!(mismatches[0].resolved, AssetId::new(1, 3, "a"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_revalidation_rejects_null_choice_in_group() {
        let err = run(
            &[],
            vec![],
            vec![painted("c1", 0, None, "a"), painted("c1", 0, Some(1), "b")],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ReconcileError::Validation(_)));
        assert!(err.is_user_error());
    }
}
