//! Public URIs for Manifests, Canvases and their annotations

use url::Url;

/// Builds and recognises the platform's public resource URIs
pub trait PathGenerator: Send + Sync {
    fn manifest_id(&self, customer_id: i32, manifest_id: &str) -> String;
    fn canvas_id(&self, customer_id: i32, canvas_id: &str) -> String;
    fn annotation_page_id(&self, customer_id: i32, canvas_id: &str, canvas_order: i32) -> String;
    fn painting_annotation_id(&self, customer_id: i32, canvas_id: &str, canvas_order: i32) -> String;

    /// Platform canvas id from a canvas URI, if the URI is one of ours
    fn parse_canvas_id(&self, customer_id: i32, uri: &str) -> Option<String>;
}

/// `{base}/{customer}/manifests/{id}`, `{base}/{customer}/canvases/{id}` and so on
#[derive(Debug, Clone)]
pub struct ConfigPathGenerator {
    base_url: String,
}

impl ConfigPathGenerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl PathGenerator for ConfigPathGenerator {
    fn manifest_id(&self, customer_id: i32, manifest_id: &str) -> String {
        format!("{}/{}/manifests/{}", self.base_url, customer_id, manifest_id)
    }

    fn canvas_id(&self, customer_id: i32, canvas_id: &str) -> String {
        format!("{}/{}/canvases/{}", self.base_url, customer_id, canvas_id)
    }

    fn annotation_page_id(&self, customer_id: i32, canvas_id: &str, canvas_order: i32) -> String {
        format!(
            "{}/annopages/{}",
            self.canvas_id(customer_id, canvas_id),
            canvas_order
        )
    }

    fn painting_annotation_id(&self, customer_id: i32, canvas_id: &str, canvas_order: i32) -> String {
        format!(
            "{}/annotations/{}",
            self.canvas_id(customer_id, canvas_id),
            canvas_order
        )
    }

    fn parse_canvas_id(&self, customer_id: i32, uri: &str) -> Option<String> {
        let prefix = format!("{}/{}/canvases/", self.base_url, customer_id);
        let rest = uri.strip_prefix(&prefix)?;
        let id = rest.split(['/', '#', '?']).next()?;
        if id.is_empty() || Url::parse(uri).is_err() {
            return None;
        }
        Some(id.to_string())
    }
}
