//! BIAN Graph Loader
//!
//! Loads the BIAN reference model into Neo4j:
//! - Business Area / Business Domain / Service Domain hierarchy from the scraped index
//! - Service domain enrichment and derived `TRIGGERS` relationships
//! - Control records, behavior qualifiers, operations and schemas from the OpenAPI specifications
//! - Per-run provenance with preview-then-delete rollback

pub mod ingest;
pub mod neo4j;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub neo4j: Neo4jYamlConfig,
    pub sources: SourcesYamlConfig,
    pub import: ImportYamlConfig,
}

/// Neo4j configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jYamlConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for Neo4jYamlConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "password".into(),
        }
    }
}

/// Scraper output locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesYamlConfig {
    pub hierarchy_file: PathBuf,
    pub service_domains_dir: PathBuf,
    pub specifications_dir: PathBuf,
}

impl Default for SourcesYamlConfig {
    fn default() -> Self {
        Self {
            hierarchy_file: "./data/index_hierarchy.json".into(),
            service_domains_dir: "./data/service_domains".into(),
            specifications_dir: "./data/yamls".into(),
        }
    }
}

/// Import run configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportYamlConfig {
    pub run_prefix: String,
    pub delete_batch_size: usize,
    pub progress_every: usize,
}

impl Default for ImportYamlConfig {
    fn default() -> Self {
        let settings = ingest::ImportSettings::default();
        Self {
            run_prefix: settings.run_prefix,
            delete_batch_size: settings.delete_batch_size,
            progress_every: settings.progress_every,
        }
    }
}

// ============================================================================
// Runtime config (what the loader actually uses)
// ============================================================================

/// Loader configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub hierarchy_file: PathBuf,
    pub service_domains_dir: PathBuf,
    pub specifications_dir: PathBuf,
    pub run_prefix: String,
    pub delete_batch_size: usize,
    pub progress_every: usize,
}

impl Config {
    /// Load configuration from environment variables and defaults only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let path_var = |name: &str, fallback: PathBuf| {
            std::env::var(name).map(PathBuf::from).unwrap_or(fallback)
        };

        Ok(Self {
            neo4j_uri: std::env::var("NEO4J_URI").unwrap_or(yaml.neo4j.uri),
            neo4j_user: std::env::var("NEO4J_USER").unwrap_or(yaml.neo4j.user),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or(yaml.neo4j.password),
            hierarchy_file: path_var("BIAN_HIERARCHY_FILE", yaml.sources.hierarchy_file),
            service_domains_dir: path_var(
                "BIAN_SERVICE_DOMAINS_DIR",
                yaml.sources.service_domains_dir,
            ),
            specifications_dir: path_var("BIAN_SPECIFICATIONS_DIR", yaml.sources.specifications_dir),
            run_prefix: std::env::var("BIAN_RUN_PREFIX").unwrap_or(yaml.import.run_prefix),
            delete_batch_size: yaml.import.delete_batch_size,
            progress_every: yaml.import.progress_every,
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    pub fn source_locations(&self) -> ingest::SourceLocations {
        ingest::SourceLocations {
            hierarchy_file: self.hierarchy_file.clone(),
            service_domains_dir: self.service_domains_dir.clone(),
            specifications_dir: self.specifications_dir.clone(),
        }
    }

    pub fn import_settings(&self) -> ingest::ImportSettings {
        ingest::ImportSettings {
            run_prefix: self.run_prefix.clone(),
            delete_batch_size: self.delete_batch_size,
            progress_every: self.progress_every,
        }
    }
}

/// Shared loader state: the graph plus the configuration it was opened with
#[derive(Clone)]
pub struct LoaderState {
    pub graph: Arc<dyn neo4j::GraphStore>,
    pub config: Arc<Config>,
}

impl LoaderState {
    /// Connect to Neo4j
    pub async fn new(config: Config) -> Result<Self> {
        let graph = Arc::new(
            neo4j::client::Neo4jClient::new(
                &config.neo4j_uri,
                &config.neo4j_user,
                &config.neo4j_password,
            )
            .await?,
        );

        Ok(Self {
            graph,
            config: Arc::new(config),
        })
    }

    pub fn pipeline(&self) -> ingest::PipelineDriver {
        ingest::PipelineDriver::new(self.graph.clone(), self.config.import_settings())
    }

    pub fn registry(&self) -> ingest::RunRegistry {
        ingest::RunRegistry::new(
            self.graph.clone(),
            self.config.run_prefix.clone(),
            self.config.delete_batch_size,
        )
    }

    pub fn constraints(&self) -> ingest::ConstraintManager {
        ingest::ConstraintManager::new(self.graph.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
