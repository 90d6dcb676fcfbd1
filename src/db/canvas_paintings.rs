//! Canvas painting row operations

use diesel::prelude::*;
use tracing::debug;

use super::context::CustomerContext;
use super::diesel_schema::canvas_paintings;
use super::models::{CanvasPaintingRow, CanvasPaintingValues};
use crate::error::PresentationError;
use crate::painting::{CanvasPainting, CanvasPaintingChangeset};

// ============================================================================
// Read Operations
// ============================================================================

/// All rows of a Manifest in presentation order
pub fn list_for_manifest(
    conn: &mut SqliteConnection,
    ctx: &CustomerContext,
    manifest_id: &str,
) -> Result<Vec<CanvasPainting>, PresentationError> {
    let rows: Vec<CanvasPaintingRow> = canvas_paintings::table
        .filter(canvas_paintings::customer_id.eq(ctx.customer_id))
        .filter(canvas_paintings::manifest_id.eq(manifest_id))
        .order((
            canvas_paintings::canvas_order.asc(),
            canvas_paintings::choice_order.asc(),
        ))
        .select(CanvasPaintingRow::as_select())
        .load(conn)
        .map_err(|e| PresentationError::Internal(format!("Query failed: {}", e)))?;

    rows.into_iter().map(CanvasPainting::try_from).collect()
}

// ============================================================================
// Write Operations
// ============================================================================

/// Apply a changeset atomically and return the stored rows
pub fn apply_changeset(
    conn: &mut SqliteConnection,
    ctx: &CustomerContext,
    manifest_id: &str,
    changes: &CanvasPaintingChangeset,
) -> Result<Vec<CanvasPainting>, PresentationError> {
    conn.transaction(|conn| {
        let delete_ids: Vec<i32> = changes
            .delete
            .iter()
            .filter_map(|row| row.canvas_painting_id)
            .collect();
        if !delete_ids.is_empty() {
            diesel::delete(
                canvas_paintings::table
                    .filter(canvas_paintings::customer_id.eq(ctx.customer_id))
                    .filter(canvas_paintings::manifest_id.eq(manifest_id))
                    .filter(canvas_paintings::canvas_painting_id.eq_any(&delete_ids)),
            )
            .execute(conn)
            .map_err(|e| PresentationError::Internal(format!("Delete failed: {}", e)))?;
        }

        // The (canvas, order, choice) key is checked per statement: park
        // updated rows on unique negative orders before rewriting them
        for row in &changes.update {
            let id = row_id(row)?;
            diesel::update(
                canvas_paintings::table
                    .find(id)
                    .filter(canvas_paintings::customer_id.eq(ctx.customer_id)),
            )
            .set(canvas_paintings::canvas_order.eq(-id - 1))
            .execute(conn)
            .map_err(|e| PresentationError::Internal(format!("Update failed: {}", e)))?;
        }

        for row in &changes.update {
            let id = row_id(row)?;
            let values = CanvasPaintingValues::try_from(row)?;
            diesel::update(
                canvas_paintings::table
                    .find(id)
                    .filter(canvas_paintings::customer_id.eq(ctx.customer_id)),
            )
            .set(&values)
            .execute(conn)
            .map_err(|e| PresentationError::Internal(format!("Update failed: {}", e)))?;
        }

        for row in &changes.insert {
            let values = CanvasPaintingValues::try_from(row)?;
            diesel::insert_into(canvas_paintings::table)
                .values(&values)
                .execute(conn)
                .map_err(|e| PresentationError::Internal(format!("Insert failed: {}", e)))?;
        }

        debug!(
            manifest_id,
            inserted = changes.insert.len(),
            updated = changes.update.len(),
            deleted = delete_ids.len(),
            unchanged = changes.unchanged,
            "Applied canvas painting changeset"
        );

        list_for_manifest(conn, ctx, manifest_id)
    })
}

fn row_id(row: &CanvasPainting) -> Result<i32, PresentationError> {
    row.canvas_painting_id.ok_or_else(|| {
        PresentationError::Internal(format!(
            "Update for canvasOrder {} has no row id",
            row.canvas_order
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::manifests;
    use crate::db::test_support::setup_test_db;
    use crate::painting::{diff, AssetId};

    fn painting(canvas: &str, canvas_order: i32, choice_order: Option<i32>) -> CanvasPainting {
        CanvasPainting {
            manifest_id: "m1".into(),
            customer_id: 1,
            canvas_id: Some(canvas.into()),
            canvas_order,
            choice_order,
            asset_id: Some(AssetId::new(1, 2, format!("a{}", canvas_order))),
            ingesting: true,
            ..Default::default()
        }
    }

    fn seed(conn: &mut SqliteConnection, rows: Vec<CanvasPainting>) -> Vec<CanvasPainting> {
        let ctx = CustomerContext::new(1);
        manifests::upsert(conn, &ctx, "m1", None, None).unwrap();
        let changes = diff(&[], &rows);
        apply_changeset(conn, &ctx, "m1", &changes).unwrap()
    }

    #[test]
    fn test_insert_assigns_row_ids_and_orders() {
        let mut conn = setup_test_db();
        let stored = seed(
            &mut conn,
            vec![painting("c2", 1, None), painting("c1", 0, Some(2)), painting("c1", 0, Some(1))],
        );

        assert!(stored.iter().all(|r| r.canvas_painting_id.is_some()));
        let keys: Vec<_> = stored.iter().map(|r| (r.canvas_order, r.choice_order)).collect();
        assert_eq!(keys, vec![(0, Some(1)), (0, Some(2)), (1, None)]);
        assert!(stored.iter().all(|r| r.ingesting));
    }

    #[test]
    fn test_swapping_choice_orders_does_not_violate_unique_key() {
        let mut conn = setup_test_db();
        let ctx = CustomerContext::new(1);
        let prior = seed(&mut conn, vec![painting("c1", 0, Some(1)), painting("c1", 0, Some(2))]);

        let mut merged = prior.clone();
        merged[0].choice_order = Some(2);
        merged[1].choice_order = Some(1);
        let changes = diff(&prior, &merged);
        assert_eq!(changes.update.len(), 2);

        let stored = apply_changeset(&mut conn, &ctx, "m1", &changes).unwrap();
        assert_eq!(stored[0].canvas_painting_id, prior[1].canvas_painting_id);
        assert_eq!(stored[1].canvas_painting_id, prior[0].canvas_painting_id);
    }

    #[test]
    fn test_delete_and_cascade() {
        let mut conn = setup_test_db();
        let ctx = CustomerContext::new(1);
        let prior = seed(&mut conn, vec![painting("c1", 0, None), painting("c2", 1, None)]);

        let changes = diff(&prior, &prior[..1]);
        let stored = apply_changeset(&mut conn, &ctx, "m1", &changes).unwrap();
        assert_eq!(stored.len(), 1);

        manifests::delete(&mut conn, &ctx, "m1").unwrap();
        assert!(list_for_manifest(&mut conn, &ctx, "m1").unwrap().is_empty());
    }

    #[test]
    fn test_failed_insert_rolls_back() {
        let mut conn = setup_test_db();
        let ctx = CustomerContext::new(1);
        let prior = seed(&mut conn, vec![painting("c1", 0, None)]);

        // Second insert has no canvas id, so the whole changeset must be undone
        let mut orphan = painting("c9", 5, None);
        orphan.canvas_id = None;
        let changes = CanvasPaintingChangeset {
            delete: prior.clone(),
            insert: vec![painting("c3", 3, None), orphan],
            ..Default::default()
        };
        assert!(apply_changeset(&mut conn, &ctx, "m1", &changes).is_err());
        assert_eq!(list_for_manifest(&mut conn, &ctx, "m1").unwrap(), prior);
    }
}
