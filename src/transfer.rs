//! JSON export and import of projects and owned quantities

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Project;

pub const BUNDLE_VERSION: u32 = 1;

/// Everything the user entered: active projects and owned counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub projects: Vec<Project>,
    #[serde(default)]
    pub quantities: BTreeMap<String, u64>,
}

impl ExportBundle {
    pub fn new(projects: Vec<Project>, quantities: BTreeMap<String, u64>) -> Self {
        Self {
            version: BUNDLE_VERSION,
            exported_at: Utc::now(),
            projects,
            quantities,
        }
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("failed writing export: {}", path.display()))
    }

    pub fn read_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed reading import: {}", path.display()))?;
        let bundle: Self = serde_json::from_str(&data)
            .with_context(|| format!("failed parsing import: {}", path.display()))?;
        if bundle.version > BUNDLE_VERSION {
            bail!(
                "export version {} is newer than supported version {}",
                bundle.version,
                BUNDLE_VERSION
            );
        }
        Ok(bundle)
    }
}

/// What an import changed
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportOutcome {
    pub projects: usize,
    pub skipped_projects: Vec<String>,
    pub quantities_changed: usize,
}

impl std::fmt::Display for ImportOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} projects, {} quantity changes",
            self.projects, self.quantities_changed
        )?;
        if !self.skipped_projects.is_empty() {
            write!(f, ". Skipped unknown: {}", self.skipped_projects.join(", "))?;
        }
        Ok(())
    }
}
