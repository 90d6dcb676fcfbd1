//! Asset identity resolution and reconciliation
//!
//! Managed assets are recognised from their delivery URLs on the asset host:
//!
//! ```text
//! /iiif-img/{customer}/{space}/{asset}/...
//! /iiif-img/v2/{customer}/{space}/{asset}/...
//! /iiif-img/v3/{customer}/{space}/{asset}/...
//! /iiif-av/{customer}/{space}/{asset}/...
//! ```
//!
//! An image body can name its asset twice, once in the body id and once in
//! each image service. All of them must agree.

use serde_json::Value;
use tracing::trace;
use url::Url;

use super::model::AssetId;
use crate::error::IdentityMismatch;

/// Confirm an identity seen from two independent sources.
///
/// Equal identities (or a single known one) confirm; two different
/// identities are a mismatch, never a silent preference.
pub fn reconcile(
    declared: Option<&AssetId>,
    resolved: Option<&AssetId>,
    context: &str,
) -> Result<Option<AssetId>, IdentityMismatch> {
    match (declared, resolved) {
        (Some(declared), Some(resolved)) if declared != resolved => Err(IdentityMismatch {
            declared: declared.clone(),
            resolved: resolved.clone(),
            context: context.to_string(),
        }),
        (Some(id), _) | (None, Some(id)) => Ok(Some(id.clone())),
        (None, None) => Ok(None),
    }
}

/// Recognises managed asset URLs for one asset host
#[derive(Debug, Clone)]
pub struct AssetIdentifier {
    asset_host: Option<String>,
}

impl AssetIdentifier {
    /// `asset_host` is the host (optionally with port) of the delivery service.
    /// `None` disables recognition.
    pub fn new(asset_host: Option<String>) -> Self {
        Self { asset_host }
    }

    /// Resolve the managed asset painted by `body`, if any
    pub fn resolve_body(
        &self,
        body: &Value,
        customer_id: i32,
    ) -> Result<Option<AssetId>, IdentityMismatch> {
        let body_type = body.get("type").and_then(Value::as_str).unwrap_or_default();
        let body_id = body.get("id").and_then(Value::as_str);

        match body_type {
            "Image" => {
                let from_body = body_id.and_then(|id| self.parse_image_url(id, customer_id));
                let from_services = self.resolve_services(body, customer_id)?;
                let context = body_id.unwrap_or("image body");
                reconcile(from_body.as_ref(), from_services.as_ref(), context)
            }
            "Sound" | "Video" => Ok(body_id.and_then(|id| self.parse_av_url(id, customer_id))),
            "SpecificResource" => match body.get("source") {
                Some(source) if source.is_object() => self.resolve_body(source, customer_id),
                Some(Value::String(source)) => Ok(self
                    .parse_image_url(source, customer_id)
                    .or_else(|| self.parse_av_url(source, customer_id))),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// All image services on a body must name the same asset
    fn resolve_services(
        &self,
        body: &Value,
        customer_id: i32,
    ) -> Result<Option<AssetId>, IdentityMismatch> {
        let services = match body.get("service") {
            Some(Value::Array(services)) => services.as_slice(),
            Some(service @ Value::Object(_)) => std::slice::from_ref(service),
            _ => return Ok(None),
        };

        let mut resolved: Option<AssetId> = None;
        for service in services {
            let Some(id) = service
                .get("id")
                .or_else(|| service.get("@id"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            let Some(candidate) = self.parse_image_url(id, customer_id) else {
                continue;
            };
            resolved = reconcile(resolved.as_ref(), Some(&candidate), id)?;
        }
        Ok(resolved)
    }

    /// Parse an image delivery URL
    pub fn parse_image_url(&self, uri: &str, customer_id: i32) -> Option<AssetId> {
        let path = self.managed_path(uri)?;
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let rest = match segments.as_slice() {
            ["iiif-img", "v2" | "v3", rest @ ..] => rest,
            ["iiif-img", rest @ ..] => rest,
            _ => return None,
        };
        Self::asset_from_segments(rest, customer_id, uri)
    }

    /// Parse an audio/video delivery URL
    pub fn parse_av_url(&self, uri: &str, customer_id: i32) -> Option<AssetId> {
        let path = self.managed_path(uri)?;
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            ["iiif-av", rest @ ..] => Self::asset_from_segments(rest, customer_id, uri),
            _ => None,
        }
    }

    /// URL path, if `uri` points at the asset host
    fn managed_path(&self, uri: &str) -> Option<String> {
        let asset_host = self.asset_host.as_deref()?;
        let url = Url::parse(uri).ok()?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => return None,
        };
        if !host.eq_ignore_ascii_case(asset_host) {
            return None;
        }
        Some(url.path().to_string())
    }

    fn asset_from_segments(segments: &[&str], customer_id: i32, uri: &str) -> Option<AssetId> {
        let [customer, space, asset, ..] = segments else {
            return None;
        };
        let customer: i32 = customer.parse().ok()?;
        let space: i32 = space.parse().ok()?;

        if customer != customer_id {
            trace!(uri = %uri, customer_id, "Asset URL belongs to another customer");
            return None;
        }

        Some(AssetId::new(customer, space, *asset))
    }
}
