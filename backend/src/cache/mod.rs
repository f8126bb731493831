//! Mapping Registry - Store and reuse confirmed column mappings
//!
//! Saves mappings to disk and matches them to new files by their header row,
//! so a recurring export format does not need a fresh suggestion each time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::models::ColumnMapping;
use crate::validation::validate_mapping;

/// Directory where mappings are stored (relative to current dir)
pub const DEFAULT_REGISTRY_DIR: &str = ".ipdrload/mappings";

/// Minimum column overlap for a template to be offered
const COMPATIBILITY_THRESHOLD: f64 = 0.5;

/// A stored mapping with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMapping {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// The confirmed mapping
    pub mapping: ColumnMapping,
    /// Header row this mapping was confirmed for
    pub csv_columns: Vec<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last time this mapping was used
    pub last_used: Option<String>,
    /// Success rate (0.0 to 1.0)
    pub success_rate: f64,
    /// Number of times used
    pub use_count: u32,
}

/// Registry for managing mapping templates
pub struct MappingRegistry {
    /// Directory where mappings are stored
    registry_dir: PathBuf,
    /// Loaded mappings (id -> mapping)
    mappings: HashMap<String, StoredMapping>,
}

impl MappingRegistry {
    /// Create a new registry, loading existing mappings from disk
    pub fn new() -> Self {
        Self::with_dir(DEFAULT_REGISTRY_DIR)
    }

    /// Create a registry with a custom directory
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            registry_dir: dir.as_ref().to_path_buf(),
            mappings: HashMap::new(),
        };
        registry.load_all();
        registry
    }

    /// Load all mappings from the registry directory
    fn load_all(&mut self) {
        let entries = match fs::read_dir(&self.registry_dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(RegistryError::from)
                .and_then(|c| serde_json::from_str::<StoredMapping>(&c).map_err(RegistryError::from))
            {
                Ok(stored) => {
                    self.mappings.insert(stored.id.clone(), stored);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable template"),
            }
        }
        debug!(count = self.mappings.len(), "loaded mapping templates");
    }

    /// Get all stored mappings, most used first
    pub fn list(&self) -> Vec<&StoredMapping> {
        let mut all: Vec<_> = self.mappings.values().collect();
        all.sort_by(|a, b| b.use_count.cmp(&a.use_count).then_with(|| a.name.cmp(&b.name)));
        all
    }

    /// Get a mapping by ID
    pub fn get(&self, id: &str) -> RegistryResult<&StoredMapping> {
        self.mappings
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Find compatible mappings for given CSV columns
    /// Returns mappings sorted by compatibility score and success rate
    pub fn find_compatible(&self, csv_columns: &[String]) -> Vec<(&StoredMapping, f64)> {
        let mut compatible: Vec<_> = self
            .mappings
            .values()
            .filter_map(|m| {
                let score = compatibility(&m.csv_columns, csv_columns);
                (score > COMPATIBILITY_THRESHOLD).then_some((m, score))
            })
            .collect();

        // Sort by: compatibility score * success rate (descending)
        compatible.sort_by(|a, b| {
            let score_a = a.1 * a.0.success_rate;
            let score_b = b.1 * b.0.success_rate;
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });

        compatible
    }

    /// Save a new mapping to the registry
    pub fn save(
        &mut self,
        mapping: ColumnMapping,
        name: &str,
        csv_columns: Vec<String>,
    ) -> RegistryResult<String> {
        fs::create_dir_all(&self.registry_dir)?;

        let id = self.generate_id(name);
        let stored = StoredMapping {
            id: id.clone(),
            name: name.to_string(),
            mapping,
            csv_columns,
            created_at: chrono::Utc::now().to_rfc3339(),
            last_used: None,
            success_rate: 1.0,
            use_count: 0,
        };

        self.write(&stored)?;
        self.mappings.insert(id.clone(), stored);
        Ok(id)
    }

    /// Import a mapping from a JSON file (`{field: header | "unmapped" | null}`)
    pub fn import(&mut self, path: &Path, name: Option<&str>) -> RegistryResult<String> {
        let content = fs::read_to_string(path)?;
        let mapping: ColumnMapping = serde_json::from_str(&content)
            .map_err(|e| RegistryError::InvalidTemplate(format!("Invalid mapping JSON: {}", e)))?;

        let report = validate_mapping(&mapping, None);
        if !report.is_valid {
            return Err(RegistryError::InvalidTemplate(report.errors.join("; ")));
        }

        let mapping_name = name.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("imported")
        });

        let csv_columns = mapping.headers().into_iter().map(str::to_string).collect();
        self.save(mapping, mapping_name, csv_columns)
    }

    /// Update statistics after using a mapping
    pub fn update_stats(&mut self, id: &str, success: bool) -> RegistryResult<()> {
        let stored = self
            .mappings
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        // Exponential moving average
        stored.success_rate = if success {
            stored.success_rate * 0.9 + 0.1
        } else {
            stored.success_rate * 0.9
        };
        stored.last_used = Some(chrono::Utc::now().to_rfc3339());
        stored.use_count += 1;

        let stored = stored.clone();
        self.write(&stored)
    }

    /// Delete a mapping from the registry
    pub fn delete(&mut self, id: &str) -> RegistryResult<()> {
        if self.mappings.remove(id).is_none() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        fs::remove_file(self.path_for(id))?;
        Ok(())
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.registry_dir.join(format!("{}.json", id))
    }

    fn write(&self, stored: &StoredMapping) -> RegistryResult<()> {
        let content = serde_json::to_string_pretty(stored)?;
        fs::write(self.path_for(&stored.id), content)?;
        Ok(())
    }

    /// Generate a unique ID from a name
    fn generate_id(&self, name: &str) -> String {
        let slug: String = name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        let slug = if slug.is_empty() { "mapping".to_string() } else { slug };

        let base = format!("{}-{}", slug, chrono::Utc::now().timestamp_millis());
        let mut id = base.clone();
        let mut n = 1;
        while self.mappings.contains_key(&id) {
            n += 1;
            id = format!("{}-{}", base, n);
        }
        id
    }
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Share of stored columns present in `csv` (case-insensitive)
fn compatibility(stored: &[String], csv: &[String]) -> f64 {
    if stored.is_empty() {
        return 0.0;
    }

    let csv_lower: Vec<String> = csv.iter().map(|c| c.to_lowercase()).collect();
    let match_count = stored
        .iter()
        .filter(|col| csv_lower.contains(&col.to_lowercase()))
        .count();

    match_count as f64 / stored.len() as f64
}
