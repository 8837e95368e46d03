//! Recipe catalog extraction from JSON data files
//!
//! A catalog path may be a single JSON file or a directory tree of them.
//! Each file maps item keys to recipe definitions; files are merged in
//! path order so later files override earlier ones.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::Connection;
use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::db;
use crate::models::{ItemKind, Recipe, Requirement, RequirementLine};

/// Recipe definition as written in catalog files
#[derive(Debug, Deserialize)]
struct RecipeDef {
    #[serde(default)]
    base_name: Option<String>,
    #[serde(rename = "type")]
    kind: ItemKind,
    #[serde(default)]
    requirements: Vec<RequirementLine>,
}

/// Matches enhancement-qualified keys such as "Cutter +2"
fn enhancement_regex() -> Result<Regex> {
    Ok(Regex::new(r"^(.*?)\s*\+\d+$")?)
}

/// Display name for a catalog key: "Cutter +2" -> "Cutter"
fn base_name(enhancement: &Regex, key: &str) -> String {
    match enhancement.captures(key) {
        Some(cap) if !cap[1].is_empty() => cap[1].to_string(),
        _ => key.to_string(),
    }
}

/// Find all catalog JSON files under a path, sorted
pub fn find_catalog_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.exists() {
        anyhow::bail!("catalog path does not exist: {}", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Parse catalog JSON text into recipes, sorted by key
pub fn parse_catalog_str(content: &str) -> Result<Vec<Recipe>> {
    let defs: BTreeMap<String, RecipeDef> = serde_json::from_str(content)?;
    let enhancement = enhancement_regex()?;
    Ok(defs
        .into_iter()
        .map(|(name, def)| Recipe {
            base_name: def.base_name.unwrap_or_else(|| base_name(&enhancement, &name)),
            name,
            kind: def.kind,
            requirements: def.requirements,
        })
        .collect())
}

fn parse_catalog_file(path: &Path) -> Result<Vec<Recipe>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_catalog_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Why a recipe cannot be used, if it cannot
fn validate(recipe: &Recipe) -> Option<String> {
    for line in &recipe.requirements {
        match &line.requirement {
            Requirement::Item(item) if item.quantity == 0 => {
                return Some(format!("line '{}' has zero quantity", line.name));
            }
            Requirement::Alternatives(group) if group.options.is_empty() => {
                return Some(format!("alternative group '{}' has no options", line.name));
            }
            Requirement::Alternatives(group) if group.quantity == 0 => {
                return Some(format!("alternative group '{}' has zero quantity", line.name));
            }
            Requirement::Alternatives(group) => {
                if let Some(option) = group.options.iter().find(|o| o.quantity == 0) {
                    return Some(format!(
                        "option '{}' in group '{}' has zero quantity",
                        option.name, line.name
                    ));
                }
            }
            _ => {}
        }
    }
    None
}

/// Load and merge every catalog file under `path`
pub fn load_catalog_files(path: &Path) -> Result<(Vec<Recipe>, ImportStats)> {
    let mut stats = ImportStats::default();
    let mut merged: BTreeMap<String, Recipe> = BTreeMap::new();

    let files = find_catalog_files(path)?;
    info!("Found {} catalog files under {}", files.len(), path.display());

    for file in &files {
        match parse_catalog_file(file) {
            Ok(recipes) => {
                debug!("Parsed {} recipes from {}", recipes.len(), file.display());
                for recipe in recipes {
                    if let Some(reason) = validate(&recipe) {
                        warn!("Skipping recipe '{}': {}", recipe.name, reason);
                        stats.skipped += 1;
                        continue;
                    }
                    if merged.insert(recipe.name.clone(), recipe).is_some() {
                        stats.overridden += 1;
                    }
                }
            }
            Err(e) => {
                warn!("Error parsing {}: {:#}", file.display(), e);
                stats.errors += 1;
            }
        }
    }

    for recipe in merged.values() {
        stats.recipes += 1;
        stats.lines += recipe.requirements.len();
        stats.alternative_groups += recipe
            .requirements
            .iter()
            .filter(|l| matches!(l.requirement, Requirement::Alternatives(_)))
            .count();
    }

    Ok((merged.into_values().collect(), stats))
}

/// Replace the stored catalog with the recipes found under `path`
pub fn extract_to_database(conn: &mut Connection, path: &Path) -> Result<ImportStats> {
    let (recipes, stats) = load_catalog_files(path)?;
    write_catalog(conn, &recipes)?;
    Ok(stats)
}

/// Replace the stored catalog in one transaction
pub fn write_catalog(conn: &mut Connection, recipes: &[Recipe]) -> Result<()> {
    let tx = conn.transaction()?;
    db::clear_catalog(&tx)?;
    for recipe in recipes {
        db::upsert_recipe(&tx, recipe)?;
    }
    tx.commit()?;
    info!("Stored {} recipes", recipes.len());
    Ok(())
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub recipes: usize,
    pub lines: usize,
    pub alternative_groups: usize,
    pub overridden: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} recipes ({} lines, {} alternative groups). Overridden: {}, Skipped: {}, Errors: {}",
            self.recipes,
            self.lines,
            self.alternative_groups,
            self.overridden,
            self.skipped,
            self.errors
        )
    }
}
