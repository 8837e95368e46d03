//! Data models for recipes, projects and derived requirement views

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of item a requirement points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Ship,
    ShipPart,
    Material,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Ship => "ship",
            ItemKind::ShipPart => "ship_part",
            ItemKind::Material => "material",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ship" => Some(ItemKind::Ship),
            "ship_part" => Some(ItemKind::ShipPart),
            "material" => Some(ItemKind::Material),
            _ => None,
        }
    }
}

/// Target type of a requirement line, including the alternative-group case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Ship,
    ShipPart,
    Material,
    AlternativeGroup,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Ship => "ship",
            TargetType::ShipPart => "ship_part",
            TargetType::Material => "material",
            TargetType::AlternativeGroup => "alternative_group",
        }
    }
}

impl From<ItemKind> for TargetType {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Ship => TargetType::Ship,
            ItemKind::ShipPart => TargetType::ShipPart,
            ItemKind::Material => TargetType::Material,
        }
    }
}

/// A craftable item and what one craft of it consumes
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    /// Catalog key, possibly enhancement-qualified ("Cutter +2")
    pub name: String,
    pub base_name: String,
    pub kind: ItemKind,
    /// Requirement lines in declaration order
    pub requirements: Vec<RequirementLine>,
}

/// One named line of a recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementLine {
    pub name: String,
    #[serde(flatten)]
    pub requirement: Requirement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    Item(ItemRequirement),
    Alternatives(AlternativeGroup),
}

impl Requirement {
    pub fn target_type(&self) -> TargetType {
        match self {
            Requirement::Item(item) => item.target_type.into(),
            Requirement::Alternatives(_) => TargetType::AlternativeGroup,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRequirement {
    pub quantity: u64,
    pub target_type: ItemKind,
    /// Whether the target has its own recipe and can be expanded
    #[serde(default)]
    pub clickable: bool,
}

/// A single requirement satisfiable by any one of several options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeGroup {
    #[serde(default = "default_group_quantity")]
    pub quantity: u64,
    pub options: Vec<AlternativeOption>,
}

fn default_group_quantity() -> u64 {
    1
}

impl AlternativeGroup {
    /// The option the engine follows: the recommended one, else the first
    pub fn selected(&self) -> Option<&AlternativeOption> {
        self.options
            .iter()
            .find(|o| o.recommended)
            .or_else(|| self.options.first())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeOption {
    pub name: String,
    pub quantity: u64,
    pub target_type: ItemKind,
    #[serde(default)]
    pub clickable: bool,
    #[serde(default)]
    pub recommended: bool,
}

/// Project priority tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
    Someday,
}

impl Priority {
    pub fn score(&self) -> u32 {
        match self {
            Priority::Urgent => 100,
            Priority::High => 75,
            Priority::Normal => 50,
            Priority::Low => 25,
            Priority::Someday => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Someday => "someday",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            "someday" => Ok(Priority::Someday),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// An item the user is actively building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub item_type: ItemKind,
    pub priority: Priority,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Recipe lines as they were when the project was added
    pub requirements: Vec<RequirementLine>,
}

/// Aggregated need for one material across all active projects
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalRequirement {
    pub total_needed: u64,
    pub target_type: ItemKind,
    /// Contributing projects, in first-contribution order
    pub used_by: Vec<String>,
    pub clickable: bool,
    pub has_alternatives: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<AlternativeOption>,
}

pub type GlobalRequirements = BTreeMap<String, GlobalRequirement>;

/// Where else a material can come from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum AlternativeSource {
    /// Sibling option of an alternative group that lists this material
    Recipe { name: String },
    /// The barter data has an exchange entry for this material
    Barter,
}

/// Owned-vs-needed view for one material
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryStatus {
    pub needed: u64,
    pub stored: u64,
    pub remaining: u64,
    pub completion_percent: f64,
    pub is_complete: bool,
    pub usage_count: usize,
    pub bottleneck_score: f64,
    /// Requiring projects, highest priority first
    pub priority_projects: Vec<String>,
    pub alternative_sources: Vec<AlternativeSource>,
}

impl InventoryStatus {
    /// Status of a material no active project requires
    pub fn not_needed(stored: u64) -> Self {
        Self {
            needed: 0,
            stored,
            remaining: 0,
            completion_percent: 100.0,
            is_complete: true,
            usage_count: 0,
            bottleneck_score: 0.0,
            priority_projects: Vec::new(),
            alternative_sources: Vec::new(),
        }
    }
}

pub type InventoryStatuses = BTreeMap<String, InventoryStatus>;

/// Result of walking a single item's recipe tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyReport {
    pub item: String,
    pub depth: usize,
    pub total_materials: usize,
    pub cross_craft_deps: usize,
    /// Each path starts and ends with the repeated item
    pub circular_deps: Vec<Vec<String>>,
    pub bottlenecks: Vec<String>,
}
