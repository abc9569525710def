//! Export configuration: where to read from, what to export, where to write.
//!
//! Loaded from a TOML file; every field has a default so an absent file means
//! "all built-in entities, default limits". The API key is deliberately not
//! part of this file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::batch::DEFAULT_MAX_BATCH_BYTES;
use crate::error::AppError;

/// Complete export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Root of the OData business object API,
    /// e.g. `https://tenant.example.com/HEAT/api/odata/businessobject/`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Directory under which per-entity output directories are created.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Byte budget per batch file.
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: u64,
    /// Optional ceiling on pages fetched per entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    /// Entities to export. Empty means the built-in presets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<EntityConfig>,
}

/// One exported entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Short name, used in file names (`<name>_batch_<n>.json`).
    pub name: String,
    /// Collection path below the base URL.
    pub resource: String,
    /// OData `$filter` expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// OData `$top` page-size hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    /// Output directory; defaults to `<output_root>/<name>_batches`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_batch_bytes() -> u64 {
    DEFAULT_MAX_BATCH_BYTES
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            output_root: default_output_root(),
            max_batch_bytes: default_max_batch_bytes(),
            max_pages: None,
            entities: Vec::new(),
        }
    }
}

impl EntityConfig {
    fn preset(name: &str, resource: &str, filter: Option<&str>, page_size: Option<u32>) -> Self {
        Self {
            name: name.to_string(),
            resource: resource.to_string(),
            filter: filter.map(str::to_string),
            page_size,
            output_dir: None,
        }
    }

    /// The built-in entity catalogue.
    pub fn presets() -> Vec<EntityConfig> {
        vec![
            Self::preset("documents", "FRS_Knowledge__Documents", None, None),
            Self::preset("error_messages", "FRS_Knowledge__ErrorMessages", None, None),
            Self::preset("incidents", "Incidents", Some("Status eq 'Resolved'"), Some(100)),
            Self::preset("knowledges", "FRS_Knowledges", None, Some(100)),
            Self::preset("problems", "Problems", None, None),
            Self::preset("references", "FRS_Knowledge__References", None, None),
            Self::preset("resolution_actions", "ProblemResolutionActions", None, None),
            Self::preset(
                "service_requests",
                "ServiceReqs",
                Some("Resolution ne '$NULL'"),
                Some(100),
            ),
            Self::preset("sources", "ProblemSources", None, None),
            Self::preset("workarounds", "ProblemWorkarounds", None, None),
        ]
    }

    /// Directory the entity's batch files go to.
    pub fn output_dir(&self, output_root: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => output_root.join(dir),
            None => output_root.join(format!("{}_batches", self.name)),
        }
    }
}

impl ExportConfig {
    /// Loads and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        Self::from_toml(&content)
            .map_err(|e| AppError::Config(format!("{} ({})", e, path.display())))
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, AppError> {
        let config: ExportConfig = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_batch_bytes == 0 {
            return Err(AppError::Config("max_batch_bytes must be positive".into()));
        }
        if self.max_pages == Some(0) {
            return Err(AppError::Config("max_pages must be positive".into()));
        }

        let mut seen = HashSet::new();
        for entity in &self.entities {
            if !is_valid_entity_name(&entity.name) {
                return Err(AppError::Config(format!(
                    "Invalid entity name '{}': use letters, digits, '_' or '-'",
                    entity.name
                )));
            }
            if entity.resource.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "Entity '{}' has an empty resource",
                    entity.name
                )));
            }
            if entity.page_size == Some(0) {
                return Err(AppError::Config(format!(
                    "Entity '{}' has page_size 0",
                    entity.name
                )));
            }
            if !seen.insert(entity.name.as_str()) {
                return Err(AppError::Config(format!(
                    "Entity '{}' is configured twice",
                    entity.name
                )));
            }
        }

        Ok(())
    }

    /// The configured entities, or the presets when none are configured.
    pub fn entities(&self) -> Vec<EntityConfig> {
        if self.entities.is_empty() {
            EntityConfig::presets()
        } else {
            self.entities.clone()
        }
    }

    /// Picks the named entities, in the order given. No names selects all.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownEntity` for a name that is not configured.
    pub fn select(&self, names: &[String]) -> Result<Vec<EntityConfig>, AppError> {
        let available = self.entities();
        if names.is_empty() {
            return Ok(available);
        }

        names
            .iter()
            .map(|name| {
                available
                    .iter()
                    .find(|e| &e.name == name)
                    .cloned()
                    .ok_or_else(|| AppError::UnknownEntity(name.clone()))
            })
            .collect()
    }

    /// The API base URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if no base URL is configured.
    pub fn base_url(&self) -> Result<&str, AppError> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                AppError::Config("No base_url configured (use --base-url or the config file)".into())
            })
    }
}

/// Entity names end up in file names, so keep them to a safe alphabet.
fn is_valid_entity_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
