//! Configuration module for the retrieval engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.quarry/settings.toml`)
//! - Environment variable overrides
//! - CLI argument overrides (applied by the binary)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `QUARRY_` and use double
//! underscores to separate nested levels:
//! - `QUARRY_SEARCH__TOP_K=20` sets `search.top_k`
//! - `QUARRY_ANN__MIN_CHUNKS=500` sets `ann.min_chunks`
//! - `QUARRY_LOG_LEVEL=debug` sets `log_level`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ann::{AnnBuildOptions, DEFAULT_MIN_CHUNKS};
use crate::search::SearchMode;
use crate::search::types::{
    DEFAULT_HALF_LIFE_DAYS, DEFAULT_NPROBE, DEFAULT_RECENCY_WEIGHT, DEFAULT_TOP_K, SearchOptions,
};
use crate::vector::{DEFAULT_MAX_ITERATIONS, DEFAULT_SEED};

/// Directory holding the settings file and, by default, the indexes.
pub const CONFIG_DIR: &str = ".quarry";
const SETTINGS_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "QUARRY_";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding one subdirectory per index
    #[serde(default = "default_index_root")]
    pub index_root: PathBuf,

    /// Workspace root directory (where .quarry is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Log filter for the binary: error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Search defaults
    #[serde(default)]
    pub search: SearchConfig,

    /// ANN build settings
    #[serde(default)]
    pub ann: AnnConfig,

    /// Query embedding settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum score a result needs
    #[serde(default)]
    pub threshold: f64,

    #[serde(default)]
    pub mode: SearchMode,

    /// Weight of the recency boost, 0 disables it
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,

    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,

    /// Restrict vector scoring to ANN candidates when an ANN index exists
    #[serde(default)]
    pub use_ann: bool,

    #[serde(default = "default_nprobe")]
    pub nprobe: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AnnConfig {
    /// Indexes with fewer chunks are not clustered
    #[serde(default = "default_min_chunks")]
    pub min_chunks: usize,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// k-means seed; equal seeds give identical builds
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// fastembed model used to embed queries
    #[serde(default = "default_text_model")]
    pub text_model: String,

    /// Where downloaded models are cached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_root() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("indexes")
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
fn default_recency_weight() -> f64 {
    DEFAULT_RECENCY_WEIGHT
}
fn default_half_life_days() -> f64 {
    DEFAULT_HALF_LIFE_DAYS
}
fn default_nprobe() -> usize {
    DEFAULT_NPROBE
}
fn default_min_chunks() -> usize {
    DEFAULT_MIN_CHUNKS
}
fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}
fn default_seed() -> u64 {
    DEFAULT_SEED
}
fn default_text_model() -> String {
    "AllMiniLML6V2".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_root: default_index_root(),
            workspace_root: None,
            log_level: default_log_level(),
            search: SearchConfig::default(),
            ann: AnnConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            threshold: 0.0,
            mode: SearchMode::default(),
            recency_weight: default_recency_weight(),
            half_life_days: default_half_life_days(),
            use_ann: false,
            nprobe: default_nprobe(),
        }
    }
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            min_chunks: default_min_chunks(),
            max_iterations: default_max_iterations(),
            seed: default_seed(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            text_model: default_text_model(),
            cache_dir: None,
        }
    }
}

impl SearchConfig {
    /// Search options carrying these defaults and no filters.
    pub fn to_options(&self) -> SearchOptions {
        SearchOptions {
            top_k: self.top_k,
            threshold: self.threshold,
            mode: self.mode,
            recency_weight: self.recency_weight,
            half_life_days: self.half_life_days,
            use_ann: self.use_ann,
            nprobe: self.nprobe,
            ..SearchOptions::default()
        }
    }
}

impl AnnConfig {
    pub fn to_build_options(&self) -> AnnBuildOptions {
        AnnBuildOptions {
            min_chunks: self.min_chunks,
            max_iterations: self.max_iterations,
            seed: self.seed,
        }
    }
}

/// `QUARRY_SEARCH__TOP_K` becomes `search.top_k`.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| key.as_str().to_lowercase().replace("__", ".").into())
}

impl Settings {
    /// Load configuration from all sources, starting the settings file
    /// search at the current directory.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let current = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::load_from_workspace(&current)
    }

    /// Load configuration, looking for `.quarry/settings.toml` in `start`
    /// and its ancestors.
    pub fn load_from_workspace(start: &Path) -> Result<Self, Box<figment::Error>> {
        let workspace = Self::find_workspace_root(start);
        let config_path = workspace
            .as_ref()
            .map(|root| root.join(CONFIG_DIR).join(SETTINGS_FILE))
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE));

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(env_provider())
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = workspace;
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(env_provider())
            .extract()
            .map_err(Box::new)
    }

    /// Nearest ancestor of `start` (inclusive) containing a `.quarry` directory.
    pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Index root with relative paths resolved against the workspace root.
    pub fn resolved_index_root(&self) -> PathBuf {
        match &self.workspace_root {
            Some(root) if self.index_root.is_relative() => root.join(&self.index_root),
            _ => self.index_root.clone(),
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BoxError> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments in `dir`.
    ///
    /// Returns the path written.
    pub fn init_config_file(dir: &Path, force: bool) -> Result<PathBuf, BoxError> {
        let config_path = dir.join(CONFIG_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# Quarry Configuration File

# Version of the configuration schema
version = 1

# Directory holding one subdirectory per index (relative to this workspace)
index_root = "{index_root}"

# Log level for the quarry binary: error, warn, info, debug, trace
log_level = "warn"

[search]
# Number of results returned
top_k = {top_k}

# Minimum score a result needs
threshold = 0.0

# "text", "vision" or "hybrid"
mode = "text"

# Weight of the recency boost (0.0 disables it)
recency_weight = {recency_weight}

# Content this many days old gets half the boost of fresh content
half_life_days = {half_life_days:.1}

# Score only ANN candidates when an ANN index has been built
use_ann = false

# Number of clusters probed when use_ann is set
nprobe = {nprobe}

[ann]
# Indexes with fewer chunks keep using brute-force scoring
min_chunks = {min_chunks}

# k-means iteration cap
max_iterations = {max_iterations}

# k-means seed; equal seeds give identical builds
seed = {seed}

[embedding]
# fastembed model used to embed queries
text_model = "{text_model}"

# Where downloaded models are cached
# cache_dir = "{cache_dir}"
"#,
            index_root = default_index_root().display(),
            top_k = DEFAULT_TOP_K,
            recency_weight = DEFAULT_RECENCY_WEIGHT,
            half_life_days = DEFAULT_HALF_LIFE_DAYS,
            nprobe = DEFAULT_NPROBE,
            min_chunks = DEFAULT_MIN_CHUNKS,
            max_iterations = DEFAULT_MAX_ITERATIONS,
            seed = DEFAULT_SEED,
            text_model = default_text_model(),
            cache_dir = default_models_dir().display(),
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }

    /// Model cache directory: configured, or the per-user default.
    pub fn models_dir(&self) -> PathBuf {
        self.embedding
            .cache_dir
            .clone()
            .unwrap_or_else(default_models_dir)
    }
}

/// `~/.quarry/models`, or `.quarry/models` when there is no home directory.
pub fn default_models_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR))
        .unwrap_or_else(|| PathBuf::from(CONFIG_DIR))
        .join("models")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.index_root, PathBuf::from(".quarry/indexes"));
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.search.top_k, 10);
        assert_eq!(settings.search.mode, SearchMode::Text);
        assert_eq!(settings.ann.min_chunks, 1000);
        assert_eq!(settings.embedding.text_model, "AllMiniLML6V2");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[search]
top_k = 25
mode = "hybrid"
recency_weight = 0.0

[embedding]
text_model = "BGESmallENV15"
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.search.top_k, 25);
        assert_eq!(settings.search.mode, SearchMode::Hybrid);
        assert_eq!(settings.search.recency_weight, 0.0);
        // Untouched values keep their defaults
        assert_eq!(settings.search.half_life_days, 90.0);
        assert_eq!(settings.embedding.text_model, "BGESmallENV15");
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.search.nprobe = 3;
        settings.search.use_ann = true;
        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.search.nprobe, 3);
        assert!(loaded.search.use_ann);
    }

    #[test]
    fn test_init_template_parses_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = Settings::init_config_file(temp_dir.path(), false).unwrap();
        assert!(path.ends_with(".quarry/settings.toml"));

        let content = fs::read_to_string(&path).unwrap();
        let parsed: Settings = toml::from_str(&content).unwrap();
        let defaults = Settings::default();
        assert_eq!(parsed.search, defaults.search);
        assert_eq!(parsed.ann, defaults.ann);
        assert_eq!(parsed.index_root, defaults.index_root);

        assert!(Settings::init_config_file(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_layered_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().join(".quarry");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(
            config_dir.join("settings.toml"),
            "[ann]\nmin_chunks = 50\nmax_iterations = 7\n",
        )
        .unwrap();
        let nested = temp_dir.path().join("docs").join("deep");
        fs::create_dir_all(&nested).unwrap();

        // Environment variables override the config file
        unsafe {
            std::env::set_var("QUARRY_ANN__MIN_CHUNKS", "75");
        }
        let settings = Settings::load_from_workspace(&nested).unwrap();
        unsafe {
            std::env::remove_var("QUARRY_ANN__MIN_CHUNKS");
        }

        assert_eq!(settings.ann.min_chunks, 75);
        assert_eq!(settings.ann.max_iterations, 7);
        assert_eq!(settings.workspace_root.as_deref(), Some(temp_dir.path()));
        assert_eq!(
            settings.resolved_index_root(),
            temp_dir.path().join(".quarry/indexes")
        );
    }

    #[test]
    fn test_search_config_to_options() {
        let config = SearchConfig {
            top_k: 3,
            mode: SearchMode::Vision,
            use_ann: true,
            nprobe: 2,
            ..SearchConfig::default()
        };
        let opts = config.to_options();
        assert_eq!(opts.top_k, 3);
        assert_eq!(opts.mode, SearchMode::Vision);
        assert!(opts.use_ann);
        assert_eq!(opts.nprobe, 2);
        assert!(opts.filters.is_empty());
        assert!(opts.now_ms.is_none());
    }
}
