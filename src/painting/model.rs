//! Canvas painting rows and the ordering contract
//!
//! A canvas exists only as the group of rows sharing a `canvas_order`.
//! Rows inside a group are alternatives of a Choice body, ordered by
//! `choice_order` (1-based, `None` for a sole painting).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PresentationError;

/// IIIF language map: language tag -> values
pub type LanguageMap = BTreeMap<String, Vec<String>>;

// ============================================================================
// Asset Identity
// ============================================================================

/// Identity of a platform-managed asset: customer / space / asset
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId {
    pub customer: i32,
    pub space: i32,
    pub asset: String,
}

impl AssetId {
    pub fn new(customer: i32, space: i32, asset: impl Into<String>) -> Self {
        Self {
            customer,
            space,
            asset: asset.into(),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.customer, self.space, self.asset)
    }
}

impl FromStr for AssetId {
    type Err = PresentationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let [customer, space, asset] = parts.as_slice() else {
            return Err(PresentationError::InvalidInput(format!(
                "AssetId '{}' is invalid, expected customer/space/asset",
                s
            )));
        };

        let customer = customer.parse().map_err(|_| {
            PresentationError::InvalidInput(format!("AssetId '{}' has a non-numeric customer", s))
        })?;
        let space = space.parse().map_err(|_| {
            PresentationError::InvalidInput(format!("AssetId '{}' has a non-numeric space", s))
        })?;
        if asset.is_empty() {
            return Err(PresentationError::InvalidInput(format!(
                "AssetId '{}' has an empty asset",
                s
            )));
        }

        Ok(Self::new(customer, space, *asset))
    }
}

impl TryFrom<String> for AssetId {
    type Error = PresentationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AssetId> for String {
    fn from(id: AssetId) -> Self {
        id.to_string()
    }
}

// ============================================================================
// Ordering
// ============================================================================

/// Sort key: `canvas_order` ascending, then `choice_order` with `None` first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderKey {
    pub canvas_order: i32,
    pub choice_order: Option<i32>,
}

/// Anything positioned on a canvas
pub trait Ordered {
    fn canvas_order(&self) -> i32;
    fn choice_order(&self) -> Option<i32>;

    fn order_key(&self) -> OrderKey {
        OrderKey {
            canvas_order: self.canvas_order(),
            choice_order: self.choice_order(),
        }
    }
}

/// Ordered rows that also carry a canvas identity, as seen by the validators
pub trait CanvasPlacement: Ordered {
    /// Platform canvas id, else the external canvas URI
    fn canvas_identity(&self) -> Option<&str>;

    /// Human-readable location for error reports
    fn location(&self) -> String {
        match self.choice_order() {
            Some(choice) => format!("canvasOrder {} choiceOrder {}", self.canvas_order(), choice),
            None => format!("canvasOrder {}", self.canvas_order()),
        }
    }
}

/// Two rows are on the same canvas iff their `canvas_order` is equal
pub fn same_canvas<A: Ordered + ?Sized, B: Ordered + ?Sized>(a: &A, b: &B) -> bool {
    a.canvas_order() == b.canvas_order()
}

/// Same Choice member: same canvas and equal, non-null `choice_order`
pub fn same_choice<A: Ordered + ?Sized, B: Ordered + ?Sized>(a: &A, b: &B) -> bool {
    same_canvas(a, b) && a.choice_order().is_some() && a.choice_order() == b.choice_order()
}

/// Stable sort into presentation order
pub fn sort_by_order<T: Ordered>(items: &mut [T]) {
    items.sort_by_key(|item| item.order_key());
}

/// Group rows by `canvas_order`, each group in presentation order
pub fn group_by_canvas_order<T: Ordered>(items: &[T]) -> BTreeMap<i32, Vec<&T>> {
    let mut groups: BTreeMap<i32, Vec<&T>> = BTreeMap::new();
    for item in items {
        groups.entry(item.canvas_order()).or_default().push(item);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|item| item.choice_order());
    }
    groups
}

// ============================================================================
// Canvas Painting
// ============================================================================

/// One asset painted on one canvas of a Manifest
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasPainting {
    /// Surrogate row id, `None` until inserted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_painting_id: Option<i32>,
    pub manifest_id: String,
    pub customer_id: i32,
    #[serde(default)]
    pub canvas_id: Option<String>,
    #[serde(default)]
    pub canvas_original_id: Option<String>,
    pub canvas_order: i32,
    #[serde(default)]
    pub choice_order: Option<i32>,
    #[serde(default)]
    pub asset_id: Option<AssetId>,
    #[serde(default)]
    pub external_asset_id: Option<String>,
    #[serde(default)]
    pub label: Option<LanguageMap>,
    #[serde(default)]
    pub canvas_label: Option<LanguageMap>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub static_width: Option<i32>,
    #[serde(default)]
    pub static_height: Option<i32>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub ingesting: bool,
}

impl CanvasPainting {
    /// Copy the client-controlled fields of `other` onto this row, keeping row identity
    pub fn update_from(&mut self, other: &CanvasPainting) {
        if other.canvas_id.is_some() {
            self.canvas_id = other.canvas_id.clone();
        }
        self.canvas_original_id = other.canvas_original_id.clone();
        self.canvas_order = other.canvas_order;
        self.choice_order = other.choice_order;
        self.asset_id = other.asset_id.clone();
        self.external_asset_id = other.external_asset_id.clone();
        self.label = other.label.clone();
        self.canvas_label = other.canvas_label.clone();
        self.target = other.target.clone();
        self.thumbnail = other.thumbnail.clone();
        self.static_width = other.static_width;
        self.static_height = other.static_height;
        self.duration = other.duration;
        self.ingesting = other.ingesting;
    }

    /// True if either platform or external canvas identity is present
    pub fn has_canvas_identity(&self) -> bool {
        self.canvas_id.is_some() || self.canvas_original_id.is_some()
    }
}

impl Ordered for CanvasPainting {
    fn canvas_order(&self) -> i32 {
        self.canvas_order
    }

    fn choice_order(&self) -> Option<i32> {
        self.choice_order
    }
}

impl CanvasPlacement for CanvasPainting {
    fn canvas_identity(&self) -> Option<&str> {
        self.canvas_id
            .as_deref()
            .or(self.canvas_original_id.as_deref())
    }
}

/// Build a single-language label map
pub fn language_map(language: &str, value: &str) -> LanguageMap {
    let mut map = LanguageMap::new();
    map.insert(language.to_string(), vec![value.to_string()]);
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(canvas_order: i32, choice_order: Option<i32>) -> CanvasPainting {
        CanvasPainting {
            manifest_id: "m1".into(),
            customer_id: 1,
            canvas_order,
            choice_order,
            ..Default::default()
        }
    }

    #[test]
    fn test_asset_id_round_trip() {
        let id: AssetId = "1/2/foo".parse().unwrap();
        assert_eq!(id, AssetId::new(1, 2, "foo"));
        assert_eq!(id.to_string(), "1/2/foo");
    }

    #[test]
    fn test_asset_id_rejects_wrong_shape() {
        assert!("1/2".parse::<AssetId>().is_err());
        assert!("1/x/foo".parse::<AssetId>().is_err());
        assert!("1/2/foo/bar".parse::<AssetId>().is_err());
        assert!("1/2/".parse::<AssetId>().is_err());
    }

    #[test]
    fn test_asset_id_serializes_as_string() {
        let json = serde_json::to_string(&AssetId::new(3, 4, "img")).unwrap();
        assert_eq!(json, "\"3/4/img\"");
        let back: AssetId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AssetId::new(3, 4, "img"));
    }

    #[test]
    fn test_sort_puts_null_choice_first() {
        let mut rows = vec![row(1, None), row(0, Some(2)), row(0, None), row(0, Some(1))];
        sort_by_order(&mut rows);
        let keys: Vec<_> = rows.iter().map(|r| (r.canvas_order, r.choice_order)).collect();
        assert_eq!(keys, vec![(0, None), (0, Some(1)), (0, Some(2)), (1, None)]);
    }

    #[test]
    fn test_same_canvas_and_choice() {
        assert!(same_canvas(&row(0, None), &row(0, Some(1))));
        assert!(!same_canvas(&row(0, None), &row(1, None)));
        assert!(same_choice(&row(0, Some(1)), &row(0, Some(1))));
        assert!(!same_choice(&row(0, None), &row(0, None)));
        assert!(!same_choice(&row(0, Some(1)), &row(1, Some(1))));
    }

    #[test]
    fn test_group_by_canvas_order() {
        let rows = vec![row(2, None), row(0, Some(2)), row(0, Some(1))];
        let groups = group_by_canvas_order(&rows);
        assert_eq!(groups.len(), 2);
        let first: Vec<_> = groups[&0].iter().map(|r| r.choice_order).collect();
        assert_eq!(first, vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_canvas_identity_prefers_platform_id() {
        let mut r = row(0, None);
        r.canvas_original_id = Some("https://example.org/canvas/1".into());
        assert_eq!(r.canvas_identity(), Some("https://example.org/canvas/1"));
        r.canvas_id = Some("abc".into());
        assert_eq!(r.canvas_identity(), Some("abc"));
    }
}
