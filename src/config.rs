//! Configuration for iiif-presentation

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::PresentationError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("iiif-presentation")
}

/// Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database and stored documents
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Base URL for Manifest, Canvas and annotation ids
    #[serde(default = "default_presentation_base_url")]
    pub presentation_base_url: String,

    /// Host serving managed image and AV assets. When unset, no body URL
    /// is recognised as a managed asset.
    #[serde(default)]
    pub asset_host: Option<String>,

    /// Space used for `items` assets that name none
    #[serde(default)]
    pub default_space: Option<i32>,

    /// Attempts at completing an ingest before giving up on a moving Manifest
    #[serde(default = "default_max_ingest_attempts")]
    pub max_ingest_attempts: u32,
}

fn default_presentation_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_max_ingest_attempts() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            presentation_base_url: default_presentation_base_url(),
            asset_host: None,
            default_space: None,
            max_ingest_attempts: default_max_ingest_attempts(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PresentationError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PresentationError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PresentationError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| PresentationError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get documents directory
    pub fn documents_dir(&self) -> PathBuf {
        self.storage_dir.join("documents")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = toml::from_str(r#"presentation_base_url = "https://iiif.example.org""#).unwrap();
        assert_eq!(config.presentation_base_url, "https://iiif.example.org");
        assert_eq!(config.max_ingest_attempts, 3);
        assert_eq!(config.default_space, None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            storage_dir: dir.path().to_path_buf(),
            asset_host: Some("dlc.example.org".into()),
            default_space: Some(4),
            ..Default::default()
        };
        config.save(config.config_path()).unwrap();
        assert_eq!(Config::load(config.config_path()).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_ingest_attempts = \"many\"").unwrap();
        assert!(matches!(Config::load(&path), Err(PresentationError::Config(_))));
    }
}
