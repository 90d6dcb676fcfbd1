//! Diesel row models and conversions to domain types

use diesel::prelude::*;
use serde::Serialize;

use super::diesel_schema::{canvas_paintings, manifests};
use crate::error::PresentationError;
use crate::painting::{AssetId, CanvasPainting, LanguageMap};

/// Stored `choice_order` for a row that is not part of a Choice
pub const NO_CHOICE: i32 = -1;

/// Current timestamp in the format stored by the schema defaults
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ============================================================================
// Manifests
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = manifests)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ManifestRow {
    pub id: String,
    pub customer_id: i32,
    pub label_json: Option<String>,
    pub space_id: Option<i32>,
    pub created_at: String,
    pub modified_at: String,
    pub last_processed_at: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = manifests)]
pub struct NewManifest<'a> {
    pub id: &'a str,
    pub customer_id: i32,
    pub label_json: Option<String>,
    pub space_id: Option<i32>,
}

/// Manifest record as seen by callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRecord {
    pub id: String,
    pub customer_id: i32,
    pub label: Option<LanguageMap>,
    pub space_id: Option<i32>,
    pub created_at: String,
    pub modified_at: String,
    pub last_processed_at: Option<String>,
}

impl TryFrom<ManifestRow> for ManifestRecord {
    type Error = PresentationError;

    fn try_from(row: ManifestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            label: decode_label(row.label_json.as_deref())?,
            id: row.id,
            customer_id: row.customer_id,
            space_id: row.space_id,
            created_at: row.created_at,
            modified_at: row.modified_at,
            last_processed_at: row.last_processed_at,
        })
    }
}

// ============================================================================
// Canvas Paintings
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = canvas_paintings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CanvasPaintingRow {
    pub canvas_painting_id: i32,
    pub canvas_id: String,
    pub manifest_id: String,
    pub customer_id: i32,
    pub canvas_original_id: Option<String>,
    pub canvas_order: i32,
    pub choice_order: i32,
    pub asset_id: Option<String>,
    pub external_asset_id: Option<String>,
    pub label_json: Option<String>,
    pub canvas_label_json: Option<String>,
    pub target: Option<String>,
    pub thumbnail: Option<String>,
    pub static_width: Option<i32>,
    pub static_height: Option<i32>,
    pub duration: Option<f64>,
    pub ingesting: i32,
    pub created_at: String,
    pub modified_at: String,
}

/// Column values written on insert and update
#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = canvas_paintings)]
#[diesel(treat_none_as_null = true)]
pub struct CanvasPaintingValues {
    pub canvas_id: String,
    pub manifest_id: String,
    pub customer_id: i32,
    pub canvas_original_id: Option<String>,
    pub canvas_order: i32,
    pub choice_order: i32,
    pub asset_id: Option<String>,
    pub external_asset_id: Option<String>,
    pub label_json: Option<String>,
    pub canvas_label_json: Option<String>,
    pub target: Option<String>,
    pub thumbnail: Option<String>,
    pub static_width: Option<i32>,
    pub static_height: Option<i32>,
    pub duration: Option<f64>,
    pub ingesting: i32,
    pub modified_at: String,
}

impl TryFrom<CanvasPaintingRow> for CanvasPainting {
    type Error = PresentationError;

    fn try_from(row: CanvasPaintingRow) -> Result<Self, Self::Error> {
        let asset_id = row.asset_id.as_deref().map(str::parse::<AssetId>).transpose()?;
        Ok(Self {
            canvas_painting_id: Some(row.canvas_painting_id),
            label: decode_label(row.label_json.as_deref())?,
            canvas_label: decode_label(row.canvas_label_json.as_deref())?,
            manifest_id: row.manifest_id,
            customer_id: row.customer_id,
            canvas_id: Some(row.canvas_id),
            canvas_original_id: row.canvas_original_id,
            canvas_order: row.canvas_order,
            choice_order: (row.choice_order != NO_CHOICE).then_some(row.choice_order),
            asset_id,
            external_asset_id: row.external_asset_id,
            target: row.target,
            thumbnail: row.thumbnail,
            static_width: row.static_width,
            static_height: row.static_height,
            duration: row.duration,
            ingesting: row.ingesting != 0,
        })
    }
}

impl TryFrom<&CanvasPainting> for CanvasPaintingValues {
    type Error = PresentationError;

    fn try_from(painting: &CanvasPainting) -> Result<Self, Self::Error> {
        let canvas_id = painting.canvas_id.clone().ok_or_else(|| {
            PresentationError::Internal(format!(
                "Canvas painting at canvasOrder {} has no canvas id",
                painting.canvas_order
            ))
        })?;

        Ok(Self {
            canvas_id,
            manifest_id: painting.manifest_id.clone(),
            customer_id: painting.customer_id,
            canvas_original_id: painting.canvas_original_id.clone(),
            canvas_order: painting.canvas_order,
            choice_order: painting.choice_order.unwrap_or(NO_CHOICE),
            asset_id: painting.asset_id.as_ref().map(AssetId::to_string),
            external_asset_id: painting.external_asset_id.clone(),
            label_json: encode_label(painting.label.as_ref())?,
            canvas_label_json: encode_label(painting.canvas_label.as_ref())?,
            target: painting.target.clone(),
            thumbnail: painting.thumbnail.clone(),
            static_width: painting.static_width,
            static_height: painting.static_height,
            duration: painting.duration,
            ingesting: i32::from(painting.ingesting),
            modified_at: current_timestamp(),
        })
    }
}

pub(crate) fn encode_label(label: Option<&LanguageMap>) -> Result<Option<String>, PresentationError> {
    label.map(serde_json::to_string).transpose().map_err(Into::into)
}

fn decode_label(json: Option<&str>) -> Result<Option<LanguageMap>, PresentationError> {
    json.map(serde_json::from_str).transpose().map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::painting::model::language_map;

    #[test]
    fn test_values_store_null_choice_as_sentinel() {
        let painting = CanvasPainting {
            manifest_id: "m1".into(),
            customer_id: 1,
            canvas_id: Some("c1".into()),
            label: Some(language_map("en", "Page 1")),
            ..Default::default()
        };
        let values = CanvasPaintingValues::try_from(&painting).unwrap();
        assert_eq!(values.choice_order, NO_CHOICE);
        assert_eq!(values.label_json.as_deref(), Some(r#"{"en":["Page 1"]}"#));
    }

    #[test]
    fn test_values_require_canvas_id() {
        let painting = CanvasPainting {
            manifest_id: "m1".into(),
            customer_id: 1,
            ..Default::default()
        };
        assert!(CanvasPaintingValues::try_from(&painting).is_err());
    }

    #[test]
    fn test_row_to_domain() {
        let row = CanvasPaintingRow {
            canvas_painting_id: 7,
            canvas_id: "c1".into(),
            manifest_id: "m1".into(),
            customer_id: 1,
            canvas_original_id: None,
            canvas_order: 2,
            choice_order: NO_CHOICE,
            asset_id: Some("1/2/img".into()),
            external_asset_id: None,
            label_json: None,
            canvas_label_json: Some(r#"{"none":["Cover"]}"#.into()),
            target: None,
            thumbnail: None,
            static_width: None,
            static_height: None,
            duration: None,
            ingesting: 1,
            created_at: current_timestamp(),
            modified_at: current_timestamp(),
        };
        let painting = CanvasPainting::try_from(row).unwrap();
        assert_eq!(painting.canvas_painting_id, Some(7));
        assert_eq!(painting.choice_order, None);
        assert_eq!(painting.asset_id, Some(AssetId::new(1, 2, "img")));
        assert_eq!(painting.canvas_label, Some(language_map("none", "Cover")));
        assert!(painting.ingesting);
    }
}
