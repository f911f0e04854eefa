//! Configuration module for the knowledge-base search engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `KB_` and use double underscores
//! to separate nested levels:
//! - `KB_SEMANTIC_SEARCH__TOP_K=10` sets `semantic_search.top_k`
//! - `KB_SEMANTIC_SEARCH__ENABLED=false` sets `semantic_search.enabled`
//! - `KB_LOGGING__LEVEL=debug` sets `logging.level`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".kbsearch";
const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding records and embeddings
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Workspace root directory (where .kbsearch is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Semantic search settings
    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SemanticSearchConfig {
    /// Enable semantic search
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Model to use for embeddings
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Where downloaded model files are cached
    #[serde(default = "default_model_cache_dir")]
    pub model_cache_dir: PathBuf,

    /// Show a progress bar while the model downloads
    #[serde(default = "default_true")]
    pub show_download_progress: bool,

    /// Maximum number of results returned by a search
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum similarity score for search results (0.0 to 1.0)
    #[serde(default = "default_similarity_threshold")]
    pub threshold: f32,

    /// Records embedded per model call during backfill
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Longest accepted query, in characters
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,

    /// Upper bound for a single model call
    #[serde(default = "default_encode_timeout_ms")]
    pub encode_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// One of: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_store_path() -> PathBuf {
    PathBuf::from(".kbsearch/store")
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_embedding_model() -> String {
    "ParaphraseMLMiniLML12V2".to_string()
}
/// Models are shared between workspaces through the user cache directory.
fn default_model_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("kbsearch").join("models"))
        .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("models"))
}
fn default_top_k() -> usize {
    5
}
fn default_similarity_threshold() -> f32 {
    crate::semantic::thresholds::DEFAULT
}
fn default_batch_size() -> usize {
    10
}
fn default_max_query_length() -> usize {
    200
}
fn default_encode_timeout_ms() -> u64 {
    30_000
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            store_path: default_store_path(),
            workspace_root: None,
            debug: false,
            semantic_search: SemanticSearchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_embedding_model(),
            model_cache_dir: default_model_cache_dir(),
            show_download_progress: true,
            top_k: default_top_k(),
            threshold: default_similarity_threshold(),
            batch_size: default_batch_size(),
            max_query_length: default_max_query_length(),
            encode_timeout_ms: default_encode_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SemanticSearchConfig {
    pub fn encode_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.encode_timeout_ms)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .kbsearch directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings.resolve_paths();
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay inside field names
            .merge(Env::prefixed("KB_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Relative store and model paths are taken from the workspace root.
    fn resolve_paths(&mut self) {
        let Some(root) = self.workspace_root.clone() else {
            return;
        };
        if self.store_path.is_relative() {
            self.store_path = root.join(&self.store_path);
        }
        if self.semantic_search.model_cache_dir.is_relative() {
            self.semantic_search.model_cache_dir =
                root.join(&self.semantic_search.model_cache_dir);
        }
    }

    /// Find the workspace config by looking for a .kbsearch directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .kbsearch is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let defaults = SemanticSearchConfig::default();
        let template = format!(
            r#"# kbsearch configuration file

# Version of the configuration schema
version = 1

# Directory holding records and embeddings (relative to workspace root)
store_path = ".kbsearch/store"

# Global debug mode
debug = false

[semantic_search]
# Generate embeddings and answer semantic queries
enabled = true

# Embedding model. One of: AllMiniLML6V2, AllMiniLML12V2,
# ParaphraseMLMiniLML12V2, MultilingualE5Small, BGESmallENV15, BGEBaseENV15
model = "{model}"

# Model download cache, shared between workspaces by default.
# Relative paths are resolved against the workspace root.
# model_cache_dir = ".kbsearch/models"

show_download_progress = true

# Default number of results per search
top_k = {top_k}

# Minimum similarity score (0.0 to 1.0)
threshold = {threshold}

# Records embedded per model call during backfill
batch_size = {batch_size}

# Longest accepted query, in characters
max_query_length = {max_query_length}

# Upper bound for one model call, in milliseconds
encode_timeout_ms = {encode_timeout_ms}

[logging]
# One of: error, warn, info, debug, trace
level = "warn"
"#,
            model = defaults.model,
            top_k = defaults.top_k,
            threshold = defaults.threshold,
            batch_size = defaults.batch_size,
            max_query_length = defaults.max_query_length,
            encode_timeout_ms = defaults.encode_timeout_ms,
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }
}
