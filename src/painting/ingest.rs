//! Authoritative asset data reported once processing completes

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::AssetId;

/// Technical metadata for one processed asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestedAsset {
    /// Identity as confirmed by the processing subsystem
    pub asset_id: AssetId,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Annotation body to paint, e.g. an Image with its image services
    #[serde(default)]
    pub body: Option<Value>,
}

impl IngestedAsset {
    pub fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            width: None,
            height: None,
            duration: None,
            thumbnail: None,
            body: None,
        }
    }
}

/// Processing results keyed by the identity each asset was requested under
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestResult {
    #[serde(default)]
    pub assets: BTreeMap<AssetId, IngestedAsset>,
}

impl IngestResult {
    pub fn get(&self, requested: &AssetId) -> Option<&IngestedAsset> {
        self.assets.get(requested)
    }

    pub fn insert(&mut self, requested: AssetId, asset: IngestedAsset) {
        self.assets.insert(requested, asset);
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_result_parses_string_keys() {
        let json = r#"{
            "assets": {
                "1/2/foo": {"assetId": "1/2/foo", "width": 1000, "height": 800, "thumbnail": "https://t/foo.jpg"}
            }
        }"#;
        let result: IngestResult = serde_json::from_str(json).unwrap();
        let asset = result.get(&AssetId::new(1, 2, "foo")).unwrap();
        assert_eq!(asset.width, Some(1000));
        assert_eq!(asset.thumbnail.as_deref(), Some("https://t/foo.jpg"));
        assert!(asset.body.is_none());
    }
}
