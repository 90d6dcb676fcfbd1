//! Working copies of canvas paintings used during a single reconciliation pass

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::{AssetId, CanvasPainting, CanvasPlacement, Ordered};
use crate::error::PresentationError;

/// Which input produced a working row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    /// Rebuilt from persisted rows, source no longer known
    Unknown,
    /// Parsed from the `items` of a submitted Manifest
    Items,
    /// Parsed from the client's painted resource list
    PaintedResource,
    /// Joined from both of the above
    Mixed,
}

/// A canvas painting plus the bookkeeping needed while reconciling it.
/// Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct InterimCanvasPainting {
    pub painting: CanvasPainting,
    /// Space inferred from the submitted body, pending confirmation
    pub suspected_space: Option<i32>,
    /// Asset id inferred from the submitted body, pending confirmation
    pub suspected_asset_id: Option<String>,
    pub provenance: Provenance,
    /// Order fields are computed rather than client supplied
    pub implicit_order: bool,
    /// Annotation body as submitted, if any
    pub body: Option<Value>,
}

impl InterimCanvasPainting {
    pub fn new(painting: CanvasPainting, provenance: Provenance) -> Self {
        Self {
            painting,
            suspected_space: None,
            suspected_asset_id: None,
            provenance,
            implicit_order: false,
            body: None,
        }
    }

    /// Rebuild a working row from persisted state. Orders are fixed.
    pub fn from_persisted(painting: &CanvasPainting) -> Self {
        Self::new(painting.clone(), Provenance::Unknown)
    }

    /// Resolve the suspected identity into a managed asset id.
    ///
    /// A suspected asset without a space can only be placed when the
    /// Manifest supplies a default space.
    pub fn confirm_asset(&mut self, default_space: Option<i32>) -> Result<(), PresentationError> {
        let Some(asset) = self.suspected_asset_id.take() else {
            return Ok(());
        };

        let space = self.suspected_space.or(default_space).ok_or_else(|| {
            PresentationError::InvalidInput(format!(
                "Space for asset '{}' cannot be inferred at {}",
                asset,
                self.location()
            ))
        })?;

        self.painting.asset_id = Some(AssetId::new(self.painting.customer_id, space, asset));
        Ok(())
    }
}

impl Ordered for InterimCanvasPainting {
    fn canvas_order(&self) -> i32 {
        self.painting.canvas_order
    }

    fn choice_order(&self) -> Option<i32> {
        self.painting.choice_order
    }
}

impl CanvasPlacement for InterimCanvasPainting {
    fn canvas_identity(&self) -> Option<&str> {
        self.painting.canvas_identity()
    }
}
