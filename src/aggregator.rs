//! Requirements aggregation across all active projects
//!
//! Walks each project's requirement lines with an accumulating multiplier,
//! descending into any target the catalog has a recipe for. Totals for the
//! same material are merged and every contributing project is recorded.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::catalog::RecipeCatalog;
use crate::models::{
    AlternativeOption, GlobalRequirement, GlobalRequirements, ItemKind, Project, Requirement,
    RequirementLine,
};

/// Compute the global requirement map for a set of projects
///
/// Items that reappear in their own ancestry are counted but not expanded
/// again, so a malformed catalog still terminates.
pub fn aggregate(projects: &[Project], catalog: &RecipeCatalog) -> GlobalRequirements {
    let mut result = GlobalRequirements::new();
    for project in projects {
        let mut path = vec![project.name.clone()];
        walk_lines(
            &project.requirements,
            1,
            &project.name,
            catalog,
            &mut path,
            &mut result,
        );
    }
    result
}

fn walk_lines(
    lines: &[RequirementLine],
    multiplier: u64,
    project: &str,
    catalog: &RecipeCatalog,
    path: &mut Vec<String>,
    result: &mut GlobalRequirements,
) {
    for line in lines {
        match &line.requirement {
            Requirement::Item(item) => {
                let target = Target {
                    name: &line.name,
                    quantity: item.quantity.saturating_mul(multiplier),
                    kind: item.target_type,
                    clickable: item.clickable,
                    alternatives: None,
                };
                accumulate(target, project, catalog, path, result);
            }
            Requirement::Alternatives(group) => {
                let Some(selected) = group.selected() else {
                    continue;
                };
                if !selected.recommended {
                    debug!(
                        "No recommended option in '{}', using first option '{}'",
                        line.name, selected.name
                    );
                }
                let target = Target {
                    name: &selected.name,
                    quantity: selected
                        .quantity
                        .saturating_mul(group.quantity)
                        .saturating_mul(multiplier),
                    kind: selected.target_type,
                    clickable: selected.clickable,
                    alternatives: Some(&group.options),
                };
                accumulate(target, project, catalog, path, result);
            }
        }
    }
}

/// A requirement resolved to a single concrete item
struct Target<'a> {
    name: &'a str,
    quantity: u64,
    kind: ItemKind,
    clickable: bool,
    alternatives: Option<&'a [AlternativeOption]>,
}

fn accumulate(
    target: Target<'_>,
    project: &str,
    catalog: &RecipeCatalog,
    path: &mut Vec<String>,
    result: &mut GlobalRequirements,
) {
    let entry = result
        .entry(target.name.to_string())
        .or_insert_with(|| GlobalRequirement {
            total_needed: 0,
            target_type: target.kind,
            used_by: Vec::new(),
            clickable: target.clickable,
            has_alternatives: false,
            alternatives: Vec::new(),
        });
    entry.total_needed = entry.total_needed.saturating_add(target.quantity);
    if !entry.used_by.iter().any(|p| p == project) {
        entry.used_by.push(project.to_string());
    }
    if let Some(options) = target.alternatives {
        if !entry.has_alternatives {
            entry.has_alternatives = true;
            entry.alternatives = options.to_vec();
        }
    }

    if !target.clickable {
        return;
    }
    let Some(recipe) = catalog.get(target.name) else {
        debug!("'{}' is marked craftable but has no recipe, treating as leaf", target.name);
        return;
    };
    if path.iter().any(|ancestor| ancestor == target.name) {
        warn!(
            "Circular reference: {} -> {}, not expanding further",
            path.join(" -> "),
            target.name
        );
        return;
    }

    path.push(target.name.to_string());
    walk_lines(&recipe.requirements, target.quantity, project, catalog, path, result);
    path.pop();
}

struct CacheEntry {
    key: Vec<String>,
    computed_at: DateTime<Utc>,
    requirements: GlobalRequirements,
}

/// Aggregation with a cache keyed by the sorted active project names
pub struct Aggregator {
    ttl: Duration,
    cache: Mutex<Option<CacheEntry>>,
}

impl Aggregator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(None),
        }
    }

    /// Cached aggregate for `projects`, recomputed when the key or TTL no longer match
    pub fn requirements(&self, projects: &[Project], catalog: &RecipeCatalog) -> GlobalRequirements {
        let mut key: Vec<String> = projects.iter().map(|p| p.name.clone()).collect();
        key.sort();

        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(entry) = cache.as_ref() {
            if entry.key == key && Utc::now() - entry.computed_at < self.ttl {
                debug!("Aggregation cache hit for {} projects", key.len());
                return entry.requirements.clone();
            }
        }

        debug!("Aggregating requirements for {} projects", key.len());
        let requirements = aggregate(projects, catalog);
        *cache = Some(CacheEntry {
            key,
            computed_at: Utc::now(),
            requirements: requirements.clone(),
        });
        requirements
    }

    /// Drop any cached result; returns whether something was cached
    pub fn invalidate(&self) -> bool {
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.take().is_some()
    }

    pub fn is_cached(&self) -> bool {
        let cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::*;
    use crate::models::Priority;

    fn project(catalog: &RecipeCatalog, name: &str) -> Project {
        let recipe = catalog.get(name).unwrap();
        let now = Utc::now();
        Project {
            name: name.to_string(),
            item_type: recipe.kind,
            priority: Priority::Normal,
            added_at: now,
            updated_at: now,
            requirements: recipe.requirements.clone(),
        }
    }

    #[test]
    fn test_hull_scenario() {
        let catalog = RecipeCatalog::new(hull_catalog()).unwrap();
        let reqs = aggregate(&[project(&catalog, "Hull")], &catalog);

        assert_eq!(reqs["Plank"].total_needed, 2);
        assert_eq!(reqs["Sail"].total_needed, 1);
        assert_eq!(reqs["Cloth"].total_needed, 3);
        assert_eq!(reqs["Cloth"].used_by, vec!["Hull".to_string()]);
        assert!(reqs["Sail"].clickable);
        assert!(!reqs.contains_key("Hull"));
    }

    #[test]
    fn test_multiplier_propagates() {
        let catalog = RecipeCatalog::new(vec![
            recipe("Brig", ItemKind::Ship, vec![part("Hull", 2)]),
            recipe("Hull", ItemKind::ShipPart, vec![material("Plank", 2), part("Sail", 3)]),
            recipe("Sail", ItemKind::ShipPart, vec![material("Cloth", 3)]),
        ])
        .unwrap();
        let reqs = aggregate(&[project(&catalog, "Brig")], &catalog);

        assert_eq!(reqs["Hull"].total_needed, 2);
        assert_eq!(reqs["Plank"].total_needed, 4);
        assert_eq!(reqs["Sail"].total_needed, 6);
        assert_eq!(reqs["Cloth"].total_needed, 18);
    }

    #[test]
    fn test_direct_quantity_is_total() {
        let catalog = RecipeCatalog::new(vec![recipe(
            "Raft",
            ItemKind::Ship,
            vec![material("Rope", 7)],
        )])
        .unwrap();
        let reqs = aggregate(&[project(&catalog, "Raft")], &catalog);
        assert_eq!(reqs["Rope"].total_needed, 7);
    }

    #[test]
    fn test_disjoint_projects_are_additive() {
        let catalog = RecipeCatalog::new(vec![
            recipe("Raft", ItemKind::Ship, vec![material("Rope", 7), material("Log", 4)]),
            recipe("Canoe", ItemKind::Ship, vec![material("Bark", 2)]),
        ])
        .unwrap();
        let a = aggregate(&[project(&catalog, "Raft")], &catalog);
        let b = aggregate(&[project(&catalog, "Canoe")], &catalog);
        let both = aggregate(
            &[project(&catalog, "Raft"), project(&catalog, "Canoe")],
            &catalog,
        );

        assert_eq!(both.len(), a.len() + b.len());
        for (name, req) in a.iter().chain(b.iter()) {
            assert_eq!(both[name].total_needed, req.total_needed);
        }
    }

    #[test]
    fn test_shared_material_merges_and_records_projects() {
        let catalog = RecipeCatalog::new(vec![
            recipe("Raft", ItemKind::Ship, vec![material("Rope", 7)]),
            recipe("Sloop", ItemKind::Ship, vec![material("Rope", 5)]),
        ])
        .unwrap();
        let reqs = aggregate(
            &[project(&catalog, "Sloop"), project(&catalog, "Raft")],
            &catalog,
        );
        assert_eq!(reqs["Rope"].total_needed, 12);
        assert_eq!(reqs["Rope"].used_by, vec!["Sloop".to_string(), "Raft".to_string()]);
    }

    #[test]
    fn test_alternative_group_uses_recommended() {
        let catalog = RecipeCatalog::new(vec![recipe(
            "Mast",
            ItemKind::ShipPart,
            vec![alternatives(
                "Timber",
                vec![option("Pine", 3, false), option("Oak", 2, true)],
            )],
        )])
        .unwrap();
        let reqs = aggregate(&[project(&catalog, "Mast")], &catalog);

        assert_eq!(reqs["Oak"].total_needed, 2);
        assert!(!reqs.contains_key("Pine"));
        assert!(reqs["Oak"].has_alternatives);
        assert_eq!(reqs["Oak"].alternatives.len(), 2);
    }

    #[test]
    fn test_alternative_group_without_recommendation_uses_first() {
        let catalog = RecipeCatalog::new(vec![recipe(
            "Mast",
            ItemKind::ShipPart,
            vec![alternatives(
                "Timber",
                vec![option("Pine", 3, false), option("Oak", 2, false)],
            )],
        )])
        .unwrap();
        let reqs = aggregate(&[project(&catalog, "Mast")], &catalog);
        assert_eq!(reqs["Pine"].total_needed, 3);
        assert!(!reqs.contains_key("Oak"));
    }

    #[test]
    fn test_group_quantity_scales_craftable_option() {
        let catalog = RecipeCatalog::new(vec![
            recipe("Galleon", ItemKind::Ship, vec![part("Deck", 3)]),
            recipe(
                "Deck",
                ItemKind::ShipPart,
                vec![group(
                    "Planking",
                    2,
                    vec![option("Pine", 5, false), craftable_option("Laminate", 2, true)],
                )],
            ),
            recipe(
                "Laminate",
                ItemKind::ShipPart,
                vec![material("Resin", 4), material("Oak", 1)],
            ),
        ])
        .unwrap();
        let reqs = aggregate(&[project(&catalog, "Galleon")], &catalog);

        assert_eq!(reqs["Deck"].total_needed, 3);
        // 2 per option x 2 per group x 3 decks
        assert_eq!(reqs["Laminate"].total_needed, 12);
        assert!(reqs["Laminate"].has_alternatives);
        assert_eq!(reqs["Resin"].total_needed, 48);
        assert_eq!(reqs["Oak"].total_needed, 12);
        assert!(!reqs.contains_key("Pine"));
        assert_eq!(reqs["Resin"].used_by, vec!["Galleon".to_string()]);
    }

    #[test]
    fn test_cycle_terminates() {
        let catalog = RecipeCatalog::new(vec![
            recipe("A", ItemKind::ShipPart, vec![part("B", 1)]),
            recipe("B", ItemKind::ShipPart, vec![part("A", 2), material("Tar", 1)]),
        ])
        .unwrap();
        let reqs = aggregate(&[project(&catalog, "A")], &catalog);

        assert_eq!(reqs["B"].total_needed, 1);
        assert_eq!(reqs["A"].total_needed, 2);
        assert_eq!(reqs["Tar"].total_needed, 1);
    }

    #[test]
    fn test_clickable_without_recipe_is_leaf() {
        let catalog = RecipeCatalog::new(vec![recipe(
            "Raft",
            ItemKind::Ship,
            vec![part("Paddle", 2)],
        )])
        .unwrap();
        let reqs = aggregate(&[project(&catalog, "Raft")], &catalog);
        assert_eq!(reqs["Paddle"].total_needed, 2);
        assert_eq!(reqs.len(), 1);
    }

    #[test]
    fn test_repeated_aggregation_is_identical() {
        let catalog = RecipeCatalog::new(hull_catalog()).unwrap();
        let projects = vec![project(&catalog, "Hull"), project(&catalog, "Sail")];
        assert_eq!(aggregate(&projects, &catalog), aggregate(&projects, &catalog));
    }

    #[test]
    fn test_cache_keyed_by_project_names() {
        let catalog = RecipeCatalog::new(hull_catalog()).unwrap();
        let aggregator = Aggregator::new(Duration::seconds(60));

        let hull = vec![project(&catalog, "Hull")];
        let first = aggregator.requirements(&hull, &catalog);
        assert!(aggregator.is_cached());
        assert_eq!(aggregator.requirements(&hull, &catalog), first);

        let sail = vec![project(&catalog, "Sail")];
        let second = aggregator.requirements(&sail, &catalog);
        assert_eq!(second["Cloth"].total_needed, 3);
        assert!(!second.contains_key("Plank"));

        assert!(aggregator.invalidate());
        assert!(!aggregator.is_cached());
        assert!(!aggregator.invalidate());
    }

    #[test]
    fn test_zero_ttl_always_recomputes() {
        let catalog = RecipeCatalog::new(hull_catalog()).unwrap();
        let aggregator = Aggregator::new(Duration::zero());
        let hull = vec![project(&catalog, "Hull")];
        let first = aggregator.requirements(&hull, &catalog);
        assert_eq!(aggregator.requirements(&hull, &catalog), first);
    }
}
