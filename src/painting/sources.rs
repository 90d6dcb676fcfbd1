//! Parsing of the two client-supplied sources into working rows
//!
//! - `paintedResources`: explicit painting descriptors paired with asset bodies
//! - `items`: the canvases of a submitted Manifest
//!
//! Both produce [`InterimCanvasPainting`]s tagged with their provenance.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use super::identity::AssetIdentifier;
use super::interim::{InterimCanvasPainting, Provenance};
use super::model::{AssetId, CanvasPainting, LanguageMap};
use crate::error::{IdentityMismatch, PresentationError, ReconcileError};
use crate::paths::PathGenerator;

/// Characters that may not appear in a client-specified canvas id
const PROHIBITED_CANVAS_ID_CHARS: [char; 3] = ['/', '=', ','];

// ============================================================================
// Request Types
// ============================================================================

/// Client-facing ordering and labelling of one painted asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasPaintingDescriptor {
    #[serde(default)]
    pub canvas_id: Option<String>,
    #[serde(default)]
    pub canvas_original_id: Option<String>,
    #[serde(default)]
    pub canvas_order: Option<i32>,
    #[serde(default)]
    pub choice_order: Option<i32>,
    #[serde(default)]
    pub label: Option<LanguageMap>,
    #[serde(default)]
    pub canvas_label: Option<LanguageMap>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub static_width: Option<i32>,
    #[serde(default)]
    pub static_height: Option<i32>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// A painting descriptor paired with an opaque asset body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaintedResource {
    #[serde(default)]
    pub canvas_painting: Option<CanvasPaintingDescriptor>,
    /// Asset body; must carry `id` and `space`
    #[serde(default)]
    pub asset: Option<Value>,
}

/// What the parsers need to know about the Manifest being saved
pub struct SourceContext<'a> {
    pub customer_id: i32,
    pub manifest_id: &'a str,
    pub paths: &'a dyn PathGenerator,
    pub identifier: &'a AssetIdentifier,
}

impl SourceContext<'_> {
    fn blank_row(&self) -> CanvasPainting {
        CanvasPainting {
            manifest_id: self.manifest_id.to_string(),
            customer_id: self.customer_id,
            ..Default::default()
        }
    }
}

// ============================================================================
// Painted Resources
// ============================================================================

/// Parse `paintedResources` into working rows.
///
/// Rows without an explicit `canvasOrder` are flagged for implicit ordering.
pub fn parse_painted_resources(
    resources: &[PaintedResource],
    ctx: &SourceContext<'_>,
) -> Result<Vec<InterimCanvasPainting>, PresentationError> {
    let mut rows = Vec::with_capacity(resources.len());

    for (index, resource) in resources.iter().enumerate() {
        let descriptor = resource.canvas_painting.clone().unwrap_or_default();
        let mut painting = ctx.blank_row();

        painting.canvas_id = descriptor
            .canvas_id
            .as_deref()
            .map(|id| managed_canvas_id(id, index, ctx))
            .transpose()?;
        painting.canvas_original_id = descriptor.canvas_original_id;
        painting.canvas_order = descriptor.canvas_order.unwrap_or_default();
        painting.choice_order = descriptor.choice_order;
        painting.label = descriptor.label;
        painting.canvas_label = descriptor.canvas_label;
        painting.target = descriptor.target;
        painting.static_width = descriptor.static_width;
        painting.static_height = descriptor.static_height;
        painting.duration = descriptor.duration;

        match &resource.asset {
            Some(asset) => {
                painting.asset_id = Some(declared_asset_id(asset, index, ctx.customer_id)?);
                painting.ingesting = true;
            }
            None if !painting.has_canvas_identity() => {
                trace!(index, "Skipping painted resource with neither asset nor canvas");
                continue;
            }
            None => {}
        }

        let mut row = InterimCanvasPainting::new(painting, Provenance::PaintedResource);
        row.implicit_order = descriptor.canvas_order.is_none();
        rows.push(row);
    }

    debug!(
        manifest_id = %ctx.manifest_id,
        count = rows.len(),
        "Parsed painted resources"
    );
    Ok(rows)
}

fn managed_canvas_id(
    canvas_id: &str,
    index: usize,
    ctx: &SourceContext<'_>,
) -> Result<String, PresentationError> {
    if let Some(id) = ctx.paths.parse_canvas_id(ctx.customer_id, canvas_id) {
        return Ok(id);
    }
    if canvas_id.contains(PROHIBITED_CANVAS_ID_CHARS) {
        return Err(PresentationError::InvalidInput(format!(
            "paintedResources[{}]: canvasId '{}' contains a prohibited character",
            index, canvas_id
        )));
    }
    Ok(canvas_id.to_string())
}

fn declared_asset_id(asset: &Value, index: usize, customer_id: i32) -> Result<AssetId, PresentationError> {
    let missing = |property: &str| {
        PresentationError::InvalidInput(format!(
            "paintedResources[{}]: asset is missing required property '{}'",
            index, property
        ))
    };

    let id = match asset.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(missing("id")),
    };
    let space = match asset.get("space") {
        Some(Value::Number(space)) => space.as_i64().and_then(|s| i32::try_from(s).ok()),
        Some(Value::String(space)) => space.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| missing("space"))?;

    Ok(AssetId::new(customer_id, space, id))
}

// ============================================================================
// Manifest Items
// ============================================================================

/// Parse the canvases of a submitted Manifest into working rows.
///
/// Every painting annotation starts a new `canvasOrder`; members of a Choice
/// body share it with 1-based `choiceOrder`s. A canvas without painting
/// annotations still yields one placeholder row.
pub fn parse_items(
    items: &[Value],
    ctx: &SourceContext<'_>,
) -> Result<Vec<InterimCanvasPainting>, PresentationError> {
    let mut rows = Vec::new();
    let mut mismatches: Vec<IdentityMismatch> = Vec::new();
    let mut canvas_order = 0;

    for canvas in items {
        let Some(canvas_uri) = canvas.get("id").and_then(Value::as_str) else {
            return Err(PresentationError::InvalidInput(
                "Manifest items must all have an 'id'".to_string(),
            ));
        };
        let canvas_label = language_map(canvas.get("label"));
        let first_row = rows.len();

        let mut template = ctx.blank_row();
        match ctx.paths.parse_canvas_id(ctx.customer_id, canvas_uri) {
            Some(canvas_id) => template.canvas_id = Some(canvas_id),
            None => template.canvas_original_id = Some(canvas_uri.to_string()),
        }

        for annotation in painting_annotations(canvas) {
            let Some(body) = annotation.get("body") else {
                continue;
            };
            let target = annotation_target(annotation.get("target"), canvas_uri);
            let annotation_label = language_map(annotation.get("label"));

            let members: Vec<(Option<i32>, &Value)> = match body {
                Value::Object(_) if body_type(body) == Some("Choice") => choice_items(body)
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (Some(i as i32 + 1), item))
                    .collect(),
                Value::Array(bodies) if bodies.len() > 1 => bodies
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (Some(i as i32 + 1), item))
                    .collect(),
                Value::Array(bodies) => bodies.iter().map(|item| (None, item)).collect(),
                _ => vec![(None, body)],
            };

            for (choice_order, member) in members {
                let mut painting = template.clone();
                painting.canvas_order = canvas_order;
                painting.choice_order = choice_order;
                painting.target = target.clone();
                painting.label = language_map(member.get("label"))
                    .or_else(|| annotation_label.clone())
                    .or_else(|| canvas_label.clone());

                let mut row = InterimCanvasPainting::new(painting, Provenance::Items);
                row.implicit_order = true;
                row.body = Some(member.clone());

                match ctx.identifier.resolve_body(member, ctx.customer_id) {
                    Ok(Some(asset)) => {
                        row.suspected_space = Some(asset.space);
                        row.suspected_asset_id = Some(asset.asset);
                    }
                    Ok(None) => row.painting.external_asset_id = body_id(member),
                    Err(mismatch) => mismatches.push(mismatch),
                }
                rows.push(row);
            }
            canvas_order += 1;
        }

        if rows.len() == first_row {
            let mut painting = template;
            painting.canvas_order = canvas_order;
            painting.label = canvas_label.clone();
            let mut row = InterimCanvasPainting::new(painting, Provenance::Items);
            row.implicit_order = true;
            rows.push(row);
            canvas_order += 1;
        }

        // Canvas label is carried once, and only when it adds something
        if let Some(first) = rows.get_mut(first_row) {
            if canvas_label.is_some() && first.painting.label != canvas_label {
                first.painting.canvas_label = canvas_label;
            }
        }
    }

    if !mismatches.is_empty() {
        return Err(ReconcileError::IdentityMismatch(mismatches).into());
    }

    debug!(
        manifest_id = %ctx.manifest_id,
        canvases = items.len(),
        rows = rows.len(),
        "Parsed manifest items"
    );
    Ok(rows)
}

fn painting_annotations(canvas: &Value) -> impl Iterator<Item = &Value> {
    canvas
        .get("items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|page| page.get("items").and_then(Value::as_array))
        .flatten()
        .filter(|annotation| {
            annotation.get("motivation").and_then(Value::as_str) == Some("painting")
        })
}

fn body_type(body: &Value) -> Option<&str> {
    body.get("type").and_then(Value::as_str)
}

fn body_id(body: &Value) -> Option<String> {
    body.get("id")
        .and_then(Value::as_str)
        .or_else(|| body.get("source").and_then(|s| s.get("id")).and_then(Value::as_str))
        .map(str::to_string)
}

fn choice_items(body: &Value) -> &[Value] {
    body.get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Whole-canvas targets are stored as `None`
fn annotation_target(target: Option<&Value>, canvas_uri: &str) -> Option<String> {
    match target? {
        Value::String(t) if t == canvas_uri => None,
        Value::String(t) => Some(
            t.strip_prefix(canvas_uri)
                .and_then(|fragment| fragment.strip_prefix('#'))
                .unwrap_or(t.as_str())
                .to_string(),
        ),
        Value::Object(o) if o.get("id").and_then(Value::as_str) == Some(canvas_uri) => None,
        other => Some(other.to_string()),
    }
}

fn language_map(value: Option<&Value>) -> Option<LanguageMap> {
    value.and_then(|v| serde_json::from_value(v.clone()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::ConfigPathGenerator;
    use serde_json::json;

    fn with_ctx<T>(f: impl FnOnce(&SourceContext<'_>) -> T) -> T {
        let paths = ConfigPathGenerator::new("https://iiif.example.org");
        let identifier = AssetIdentifier::new(Some("dlc.services".into()));
        let ctx = SourceContext {
            customer_id: 1,
            manifest_id: "m1",
            paths: &paths,
            identifier: &identifier,
        };
        f(&ctx)
    }

    fn resource(canvas_id: Option<&str>, canvas_order: Option<i32>, asset: &str) -> PaintedResource {
        PaintedResource {
            canvas_painting: Some(CanvasPaintingDescriptor {
                canvas_id: canvas_id.map(str::to_string),
                canvas_order,
                ..Default::default()
            }),
            asset: Some(json!({"id": asset, "space": 2})),
        }
    }

    #[test]
    fn test_painted_resources_declare_assets() {
        let rows = with_ctx(|ctx| {
            parse_painted_resources(&[resource(Some("c1"), Some(4), "foo"), resource(None, None, "bar")], ctx)
        })
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].painting.asset_id, Some(AssetId::new(1, 2, "foo")));
        assert_eq!(rows[0].painting.canvas_id.as_deref(), Some("c1"));
        assert_eq!(rows[0].painting.canvas_order, 4);
        assert!(!rows[0].implicit_order);
        assert!(rows[0].painting.ingesting);
        assert!(rows[1].implicit_order);
        assert_eq!(rows[1].provenance, Provenance::PaintedResource);
    }

    #[test]
    fn test_painted_resource_canvas_uri_is_reduced_to_id() {
        let rows = with_ctx(|ctx| {
            parse_painted_resources(
                &[resource(Some("https://iiif.example.org/1/canvases/abc"), None, "foo")],
                ctx,
            )
        })
        .unwrap();
        assert_eq!(rows[0].painting.canvas_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_painted_resource_rejects_prohibited_canvas_id() {
        let err = with_ctx(|ctx| parse_painted_resources(&[resource(Some("a,b"), None, "foo")], ctx))
            .unwrap_err();
        assert!(matches!(err, PresentationError::InvalidInput(_)));
    }

    #[test]
    fn test_painted_resource_requires_space() {
        let resources = [PaintedResource {
            canvas_painting: None,
            asset: Some(json!({"id": "foo"})),
        }];
        let err = with_ctx(|ctx| parse_painted_resources(&resources, ctx)).unwrap_err();
        assert!(err.to_string().contains("space"));
    }

    #[test]
    fn test_items_with_choice_and_external_canvas() {
        let items = vec![
            json!({
                "id": "https://example.org/canvas/1",
                "type": "Canvas",
                "label": {"en": ["Page 1"]},
                "items": [{"type": "AnnotationPage", "items": [{
                    "type": "Annotation",
                    "motivation": "painting",
                    "target": "https://example.org/canvas/1",
                    "body": {"type": "Choice", "items": [
                        {"id": "https://dlc.services/iiif-img/1/2/a/full/max/0/default.jpg", "type": "Image"},
                        {"id": "https://example.org/b.jpg", "type": "Image"}
                    ]}
                }]}]
            }),
            json!({
                "id": "https://iiif.example.org/1/canvases/managed",
                "type": "Canvas",
                "items": []
            }),
        ];

        let rows = with_ctx(|ctx| parse_items(&items, ctx)).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].painting.canvas_original_id.as_deref(), Some("https://example.org/canvas/1"));
        assert_eq!((rows[0].painting.canvas_order, rows[0].painting.choice_order), (0, Some(1)));
        assert_eq!((rows[1].painting.canvas_order, rows[1].painting.choice_order), (0, Some(2)));
        assert_eq!(rows[0].suspected_asset_id.as_deref(), Some("a"));
        assert_eq!(rows[0].suspected_space, Some(2));
        assert_eq!(rows[1].painting.external_asset_id.as_deref(), Some("https://example.org/b.jpg"));
        assert!(rows[0].painting.target.is_none());
        // Label came from the canvas, so no separate canvas label
        assert!(rows[0].painting.canvas_label.is_none());

        assert_eq!(rows[2].painting.canvas_id.as_deref(), Some("managed"));
        assert_eq!(rows[2].painting.canvas_order, 1);
        assert!(rows[2].body.is_none());
        assert!(rows.iter().all(|r| r.implicit_order && r.provenance == Provenance::Items));
    }

    #[test]
    fn test_items_report_identity_mismatch() {
        let items = vec![json!({
            "id": "https://example.org/canvas/1",
            "items": [{"items": [{
                "motivation": "painting",
                "body": {
                    "id": "https://dlc.services/iiif-img/1/2/foo/full/max/0/default.jpg",
                    "type": "Image",
                    "service": [{"id": "https://dlc.services/iiif-img/v3/1/3/foo", "type": "ImageService3"}]
                }
            }]}]
        })];

        let err = with_ctx(|ctx| parse_items(&items, ctx)).unwrap_err();
        match err {
            PresentationError::Reconcile(ReconcileError::IdentityMismatch(mismatches)) => {
                assert_eq!(mismatches.len(), 1);
                assert_eq!(mismatches[0].resolved, AssetId::new(1, 3, "foo"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_annotation_target_fragment() {
        let canvas = "https://example.org/canvas/1";
        assert_eq!(annotation_target(Some(&json!(canvas)), canvas), None);
        assert_eq!(
            annotation_target(Some(&json!("https://example.org/canvas/1#xywh=0,0,10,10")), canvas),
            Some("xywh=0,0,10,10".to_string())
        );
    }
}
