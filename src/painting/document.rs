//! IIIF canvas structure for the stored Manifest document
//!
//! Each `canvas_order` becomes one painting annotation. Consecutive orders on
//! the same canvas id share one Canvas (a composite canvas); a single order
//! with several rows paints a `Choice` body ordered by `choice_order`.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::identity::AssetIdentifier;
use super::ingest::IngestResult;
use super::merger::MergedRow;
use super::model::{CanvasPainting, LanguageMap};
use crate::paths::PathGenerator;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaintingAnnotation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub motivation: String,
    pub body: Value,
    pub target: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationPage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub items: Vec<PaintingAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Canvas {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<LanguageMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub thumbnail: Vec<Value>,
    pub items: Vec<AnnotationPage>,
}

/// A generated canvas, or one carried over verbatim from the submitted document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CanvasEntry {
    Generated(Canvas),
    Existing(Value),
}

/// Everything shaping needs beyond the merged rows
pub struct DocumentContext<'a> {
    pub customer_id: i32,
    pub paths: &'a dyn PathGenerator,
    pub ingest: Option<&'a IngestResult>,
    /// `items` of the document being replaced
    pub existing_items: &'a [Value],
}

/// Build the canvases for `rows`, which must be in presentation order
pub fn build_canvases(rows: &[MergedRow], ctx: &DocumentContext<'_>) -> Vec<CanvasEntry> {
    let mut canvases = Vec::new();

    for canvas_rows in canvas_runs(rows) {
        let first = &canvas_rows[0][0].painting;

        let unmanaged = canvas_rows
            .iter()
            .flatten()
            .all(|row| row.painting.asset_id.is_none() && row.body.is_none());
        if unmanaged {
            if let Some(existing) = find_existing(first.canvas_original_id.as_deref(), ctx) {
                canvases.push(CanvasEntry::Existing(existing.clone()));
                continue;
            }
        }

        let (canvas_uri, canvas_key) = match (&first.canvas_id, &first.canvas_original_id) {
            (Some(canvas_id), _) => (ctx.paths.canvas_id(ctx.customer_id, canvas_id), canvas_id.clone()),
            (None, Some(original)) => (original.clone(), original.clone()),
            (None, None) => {
                warn!(canvas_order = first.canvas_order, "Canvas has no identity, skipping");
                continue;
            }
        };

        let repeated = canvases
            .iter()
            .any(|entry| matches!(entry, CanvasEntry::Generated(canvas) if canvas.id == canvas_uri));
        if repeated {
            warn!(
                canvas = %canvas_uri,
                canvas_order = first.canvas_order,
                "Canvas id painted by non-adjacent canvas orders"
            );
        }

        canvases.push(CanvasEntry::Generated(build_canvas(
            &canvas_rows,
            canvas_uri,
            &canvas_key,
            ctx,
        )));
    }

    debug!(canvases = canvases.len(), rows = rows.len(), "Built canvas structure");
    canvases
}

/// Replace the `items` of a Manifest document with `canvases`
pub fn apply_to_manifest(manifest: &mut Value, canvases: &[CanvasEntry]) -> Result<(), serde_json::Error> {
    let items = serde_json::to_value(canvases)?;
    if let Value::Object(map) = manifest {
        map.insert("items".to_string(), items);
    }
    Ok(())
}

/// Body a stored document paints for `painting`.
///
/// Rows read back from the database carry no bodies; this recovers the ones
/// written with an earlier version of the document. A managed asset is matched
/// by identity anywhere in the document, never by canvas or Choice position.
pub fn stored_body(
    document: &Value,
    painting: &CanvasPainting,
    customer_id: i32,
    paths: &dyn PathGenerator,
    identifier: &AssetIdentifier,
) -> Option<Value> {
    if let Some(asset) = &painting.asset_id {
        let by_identity = painting_annotations(document)
            .filter_map(|annotation| annotation.get("body"))
            .flat_map(|body| choice_members(body.clone()))
            .find(|member| {
                identifier.resolve_body(member, customer_id).ok().flatten().as_ref() == Some(asset)
            });
        if by_identity.is_some() {
            return by_identity;
        }
    }

    let canvas_key = painting
        .canvas_id
        .as_deref()
        .or(painting.canvas_original_id.as_deref())?;
    let annotation_id = paths.painting_annotation_id(customer_id, canvas_key, painting.canvas_order);
    let body = painting_annotations(document)
        .find(|annotation| annotation.get("id").and_then(Value::as_str) == Some(annotation_id.as_str()))?
        .get("body")?;

    // Anything still found for a managed asset must not name a different one
    let unclaimed = |candidate: &Value| match &painting.asset_id {
        Some(_) => matches!(identifier.resolve_body(candidate, customer_id), Ok(None)),
        None => true,
    };

    let Some(choice_order) = painting.choice_order else {
        return Some(body.clone()).filter(unclaimed);
    };
    let members = choice_members(body.clone());
    if let Some(external) = painting.external_asset_id.as_deref() {
        if let Some(member) = members
            .iter()
            .find(|member| member.get("id").and_then(Value::as_str) == Some(external))
        {
            return Some(member.clone());
        }
    }
    // Unprocessed managed members are left out of a stored Choice
    if painting.asset_id.is_some() {
        return None;
    }
    members.get(usize::try_from(choice_order - 1).ok()?).cloned()
}

/// Every painting annotation in a stored document
fn painting_annotations(document: &Value) -> impl Iterator<Item = &Value> + '_ {
    document
        .get("items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|canvas| canvas.get("items").and_then(Value::as_array))
        .flatten()
        .filter_map(|page| page.get("items").and_then(Value::as_array))
        .flatten()
}

#[derive(Clone, Copy)]
enum Placement {
    SameOrder,
    SameCanvas,
    NewCanvas,
}

/// Split rows into canvases: groups of `canvas_order`, with consecutive
/// groups on the same canvas id merged
fn canvas_runs(rows: &[MergedRow]) -> Vec<Vec<Vec<&MergedRow>>> {
    let mut runs: Vec<Vec<Vec<&MergedRow>>> = Vec::new();

    for row in rows {
        let placement = runs
            .last()
            .and_then(|run| run.last())
            .and_then(|group| group.first())
            .map_or(Placement::NewCanvas, |head| {
                if head.painting.canvas_order == row.painting.canvas_order {
                    Placement::SameOrder
                } else if head.painting.canvas_id.is_some()
                    && head.painting.canvas_id == row.painting.canvas_id
                {
                    Placement::SameCanvas
                } else {
                    Placement::NewCanvas
                }
            });

        match placement {
            Placement::SameOrder => {
                if let Some(group) = runs.last_mut().and_then(|run| run.last_mut()) {
                    group.push(row);
                }
            }
            Placement::SameCanvas => {
                if let Some(run) = runs.last_mut() {
                    run.push(vec![row]);
                }
            }
            Placement::NewCanvas => runs.push(vec![vec![row]]),
        }
    }
    runs
}

fn find_existing<'a>(canvas_original_id: Option<&str>, ctx: &DocumentContext<'a>) -> Option<&'a Value> {
    let original = canvas_original_id?;
    ctx.existing_items
        .iter()
        .find(|canvas| canvas.get("id").and_then(Value::as_str) == Some(original))
}

fn build_canvas(
    groups: &[Vec<&MergedRow>],
    canvas_uri: String,
    canvas_key: &str,
    ctx: &DocumentContext<'_>,
) -> Canvas {
    let all_rows = || groups.iter().flatten().map(|row| &row.painting);
    let first_order = groups[0][0].painting.canvas_order;
    let sole_row = groups.len() == 1 && groups[0].len() == 1;

    let canvas_label = all_rows()
        .find_map(|p| p.canvas_label.clone())
        .or_else(|| if sole_row { groups[0][0].painting.label.clone() } else { None });

    let (width, height) = all_rows()
        .find_map(|p| p.static_width.zip(p.static_height))
        .map_or((None, None), |(w, h)| (Some(w), Some(h)));
    let duration = all_rows().find_map(|p| p.duration);
    let thumbnail = all_rows()
        .find_map(|p| p.thumbnail.clone())
        .map(|t| vec![json!({"id": t, "type": "Image"})])
        .unwrap_or_default();

    let mut annotations = Vec::new();
    for group in groups {
        let canvas_order = group[0].painting.canvas_order;
        let bodies: Vec<Value> = group
            .iter()
            .filter_map(|row| body_for(row, ctx, canvas_label.as_ref(), group.len() > 1))
            .collect();

        if bodies.is_empty() {
            debug!(canvas = %canvas_uri, canvas_order, "No body available yet, leaving annotation out");
            continue;
        }

        let body = if group.len() == 1 {
            bodies.into_iter().next().unwrap_or(Value::Null)
        } else {
            let items: Vec<Value> = bodies.into_iter().flat_map(choice_members).collect();
            json!({"type": "Choice", "items": items})
        };

        let target = group
            .iter()
            .find_map(|row| row.painting.target.as_deref())
            .map_or_else(|| Value::String(canvas_uri.clone()), |t| target_value(&canvas_uri, t));

        annotations.push(PaintingAnnotation {
            id: ctx.paths.painting_annotation_id(ctx.customer_id, canvas_key, canvas_order),
            kind: "Annotation".to_string(),
            motivation: "painting".to_string(),
            body,
            target,
        });
    }

    Canvas {
        id: canvas_uri,
        kind: "Canvas".to_string(),
        label: canvas_label,
        width,
        height,
        duration,
        thumbnail,
        items: vec![AnnotationPage {
            id: ctx.paths.annotation_page_id(ctx.customer_id, canvas_key, first_order),
            kind: "AnnotationPage".to_string(),
            items: annotations,
        }],
    }
}

/// Body for one row: ingest result first, then whatever was submitted
fn body_for(
    row: &MergedRow,
    ctx: &DocumentContext<'_>,
    canvas_label: Option<&LanguageMap>,
    in_choice: bool,
) -> Option<Value> {
    let painting = &row.painting;
    let ingested = painting
        .asset_id
        .as_ref()
        .and_then(|asset| ctx.ingest.and_then(|ingest| ingest.get(asset)))
        .and_then(|asset| asset.body.clone());

    let mut body = ingested.or_else(|| row.body.clone())?;

    if let Value::Object(map) = &mut body {
        // Client-specified size wins over what processing reported
        if let (Some(width), Some(height)) = (painting.static_width, painting.static_height) {
            if map.get("type").and_then(Value::as_str) == Some("Image") {
                map.insert("width".to_string(), json!(width));
                map.insert("height".to_string(), json!(height));
            }
        }
        if let Some(label) = &painting.label {
            if in_choice || canvas_label != Some(label) {
                map.insert("label".to_string(), json!(label));
            }
        }
    }
    Some(body)
}

/// Flatten a nested Choice into its members
fn choice_members(body: Value) -> Vec<Value> {
    match body {
        Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("Choice") => {
            match map.get("items") {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            }
        }
        other => vec![other],
    }
}

fn target_value(canvas_uri: &str, target: &str) -> Value {
    if target.starts_with('{') {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(target) {
            return value;
        }
    }
    if target.contains("://") {
        return Value::String(target.to_string());
    }
    Value::String(format!("{}#{}", canvas_uri, target.trim_start_matches('#')))
}
