//! Manifest record operations

use diesel::prelude::*;

use super::context::CustomerContext;
use super::diesel_schema::manifests;
use super::models::{current_timestamp, encode_label, ManifestRecord, ManifestRow, NewManifest};
use crate::error::PresentationError;
use crate::painting::LanguageMap;

// ============================================================================
// Read Operations
// ============================================================================

/// Get a Manifest by id
pub fn get(
    conn: &mut SqliteConnection,
    ctx: &CustomerContext,
    id: &str,
) -> Result<Option<ManifestRecord>, PresentationError> {
    manifests::table
        .filter(manifests::customer_id.eq(ctx.customer_id))
        .filter(manifests::id.eq(id))
        .select(ManifestRow::as_select())
        .first(conn)
        .optional()
        .map_err(|e| PresentationError::Internal(format!("Query failed: {}", e)))?
        .map(ManifestRecord::try_from)
        .transpose()
}

/// List Manifest ids for a customer
pub fn list_ids(
    conn: &mut SqliteConnection,
    ctx: &CustomerContext,
) -> Result<Vec<String>, PresentationError> {
    manifests::table
        .filter(manifests::customer_id.eq(ctx.customer_id))
        .select(manifests::id)
        .order(manifests::id.asc())
        .load(conn)
        .map_err(|e| PresentationError::Internal(format!("Query failed: {}", e)))
}

// ============================================================================
// Write Operations
// ============================================================================

/// Insert a Manifest or update its label and space. Returns true if created.
pub fn upsert(
    conn: &mut SqliteConnection,
    ctx: &CustomerContext,
    id: &str,
    label: Option<&LanguageMap>,
    space_id: Option<i32>,
) -> Result<bool, PresentationError> {
    let label_json = encode_label(label)?;
    let exists = get(conn, ctx, id)?.is_some();

    if exists {
        diesel::update(
            manifests::table
                .filter(manifests::customer_id.eq(ctx.customer_id))
                .filter(manifests::id.eq(id)),
        )
        .set((
            manifests::label_json.eq(label_json),
            manifests::space_id.eq(space_id),
            manifests::modified_at.eq(current_timestamp()),
        ))
        .execute(conn)
        .map_err(|e| PresentationError::Internal(format!("Update failed: {}", e)))?;
    } else {
        let new = NewManifest {
            id,
            customer_id: ctx.customer_id,
            label_json,
            space_id,
        };
        diesel::insert_into(manifests::table)
            .values(&new)
            .execute(conn)
            .map_err(|e| PresentationError::Internal(format!("Insert failed: {}", e)))?;
    }

    Ok(!exists)
}

/// Record that asset processing for this Manifest has completed
pub fn mark_processed(
    conn: &mut SqliteConnection,
    ctx: &CustomerContext,
    id: &str,
) -> Result<bool, PresentationError> {
    let now = current_timestamp();
    let updated = diesel::update(
        manifests::table
            .filter(manifests::customer_id.eq(ctx.customer_id))
            .filter(manifests::id.eq(id)),
    )
    .set((
        manifests::last_processed_at.eq(Some(now.clone())),
        manifests::modified_at.eq(now),
    ))
    .execute(conn)
    .map_err(|e| PresentationError::Internal(format!("Update failed: {}", e)))?;

    Ok(updated > 0)
}

/// Delete a Manifest; its canvas paintings go with it
pub fn delete(
    conn: &mut SqliteConnection,
    ctx: &CustomerContext,
    id: &str,
) -> Result<bool, PresentationError> {
    let deleted = diesel::delete(
        manifests::table
            .filter(manifests::customer_id.eq(ctx.customer_id))
            .filter(manifests::id.eq(id)),
    )
    .execute(conn)
    .map_err(|e| PresentationError::Internal(format!("Delete failed: {}", e)))?;

    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_test_db;
    use crate::painting::model::language_map;

    #[test]
    fn test_upsert_creates_then_updates() {
        let mut conn = setup_test_db();
        let ctx = CustomerContext::new(1);

        let created = upsert(&mut conn, &ctx, "m1", Some(&language_map("en", "First")), Some(2)).unwrap();
        assert!(created);

        let created = upsert(&mut conn, &ctx, "m1", Some(&language_map("en", "Second")), None).unwrap();
        assert!(!created);

        let record = get(&mut conn, &ctx, "m1").unwrap().unwrap();
        assert_eq!(record.label, Some(language_map("en", "Second")));
        assert_eq!(record.space_id, None);
        assert!(record.last_processed_at.is_none());
    }

    #[test]
    fn test_customer_isolation() {
        let mut conn = setup_test_db();
        upsert(&mut conn, &CustomerContext::new(1), "m1", None, None).unwrap();

        assert!(get(&mut conn, &CustomerContext::new(2), "m1").unwrap().is_none());
        assert!(!delete(&mut conn, &CustomerContext::new(2), "m1").unwrap());
        assert_eq!(list_ids(&mut conn, &CustomerContext::new(1)).unwrap(), vec!["m1"]);
    }

    #[test]
    fn test_mark_processed() {
        let mut conn = setup_test_db();
        let ctx = CustomerContext::new(1);
        upsert(&mut conn, &ctx, "m1", None, None).unwrap();

        assert!(mark_processed(&mut conn, &ctx, "m1").unwrap());
        assert!(get(&mut conn, &ctx, "m1").unwrap().unwrap().last_processed_at.is_some());
        assert!(!mark_processed(&mut conn, &ctx, "missing").unwrap());
    }
}
