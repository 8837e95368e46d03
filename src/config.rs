//! TOML configuration: storage location, catalog sources and engine tuning

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::analyzer::DEFAULT_BOTTLENECK_THRESHOLD;
use crate::store::GLOBAL_CONTEXT;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog file or directory imported by `import-catalog` when no path is given
    #[serde(default)]
    pub path: Option<String>,
    /// Optional barter/exchange data (JSON object keyed by material)
    #[serde(default)]
    pub barter_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_bottleneck_threshold")]
    pub bottleneck_threshold: usize,
    #[serde(default = "default_context")]
    pub context: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub db_path: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        PathBuf::from("fleet-ledger.toml")
    }

    /// Load from `path`, or defaults when the file does not exist
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        parsed
            .engine
            .validate()
            .with_context(|| format!("invalid [engine] section: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(db_path) = overrides.db_path {
            self.storage.db_path = db_path;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed creating config directory: {}", parent.display())
                })?;
            }
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn default_template() -> String {
        let template = r#"[storage]
db_path = "fleet_ledger.db"

[catalog]
# path = "data/catalog"
# barter_path = "data/barter.json"

[engine]
cache_ttl_secs = 30
bottleneck_threshold = 3
context = "global"
"#;
        template.to_string()
    }
}

impl EngineConfig {
    /// The context becomes a quantity key segment, so it may not contain the separator
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.context.is_empty(), "context must not be empty");
        ensure!(
            !self.context.contains(':'),
            "context '{}' must not contain ':'",
            self.context
        );
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            bottleneck_threshold: default_bottleneck_threshold(),
            context: default_context(),
        }
    }
}

fn default_db_path() -> String {
    "fleet_ledger.db".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    30
}

fn default_bottleneck_threshold() -> usize {
    DEFAULT_BOTTLENECK_THRESHOLD
}

fn default_context() -> String {
    GLOBAL_CONTEXT.to_string()
}
