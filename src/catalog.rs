//! Immutable recipe catalog with lookup indexes

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::error::TrackerError;
use crate::models::{Recipe, Requirement};

/// All known recipes, keyed by item name
#[derive(Debug, Default)]
pub struct RecipeCatalog {
    recipes: HashMap<String, Recipe>,
    /// Number of distinct recipes that list an item
    usage: HashMap<String, usize>,
    /// For each alternative option, the other options of every group it appears in
    siblings: HashMap<String, BTreeSet<String>>,
}

impl RecipeCatalog {
    pub fn new(recipes: Vec<Recipe>) -> crate::error::Result<Self> {
        let mut catalog = Self::default();

        for recipe in recipes {
            let mut required: BTreeSet<&str> = BTreeSet::new();
            for line in &recipe.requirements {
                match &line.requirement {
                    Requirement::Item(_) => {
                        required.insert(line.name.as_str());
                    }
                    Requirement::Alternatives(group) => {
                        if group.options.is_empty() {
                            return Err(TrackerError::InvalidCatalog {
                                item: recipe.name.clone(),
                                reason: format!("alternative group '{}' has no options", line.name),
                            });
                        }
                        for option in &group.options {
                            required.insert(option.name.as_str());
                            let others = group
                                .options
                                .iter()
                                .filter(|o| o.name != option.name)
                                .map(|o| o.name.clone());
                            catalog
                                .siblings
                                .entry(option.name.clone())
                                .or_default()
                                .extend(others);
                        }
                    }
                }
            }
            for name in required {
                *catalog.usage.entry(name.to_string()).or_default() += 1;
            }
            catalog.recipes.insert(recipe.name.clone(), recipe);
        }

        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&Recipe> {
        self.recipes.get(name)
    }

    /// Look up a recipe, failing for names the catalog does not know
    pub fn require(&self, name: &str) -> crate::error::Result<&Recipe> {
        self.recipes
            .get(name)
            .ok_or_else(|| TrackerError::UnknownItem(name.to_string()))
    }

    pub fn is_craftable(&self, name: &str) -> bool {
        self.recipes.contains_key(name)
    }

    pub fn usage_count(&self, name: &str) -> usize {
        self.usage.get(name).copied().unwrap_or(0)
    }

    pub fn alternative_siblings(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.siblings.get(name)
    }

    /// Recipes sorted by name
    pub fn recipes(&self) -> Vec<&Recipe> {
        let mut all: Vec<_> = self.recipes.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

/// Opaque barter/exchange data, consulted only for entry existence
#[derive(Debug, Default)]
pub struct BarterIndex {
    entries: HashMap<String, Value>,
}

impl BarterIndex {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading barter data: {}", path.display()))?;
        let entries: HashMap<String, Value> = serde_json::from_str(&data)
            .with_context(|| format!("failed parsing barter data: {}", path.display()))?;
        Ok(Self { entries })
    }

    pub fn has_entry(&self, material: &str) -> bool {
        self.entries.contains_key(material)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl FromIterator<(String, Value)> for BarterIndex {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
