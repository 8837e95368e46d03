//! Dependency analysis of a single item's recipe tree

use std::collections::BTreeSet;

use tracing::warn;

use crate::catalog::RecipeCatalog;
use crate::error::Result;
use crate::models::{DependencyReport, Requirement};

/// Catalog-wide usage count above which a material is reported as a bottleneck
pub const DEFAULT_BOTTLENECK_THRESHOLD: usize = 3;

#[derive(Default)]
struct Walk {
    depth: usize,
    materials: BTreeSet<String>,
    craftable: BTreeSet<String>,
    cycles: Vec<Vec<String>>,
}

/// Walk `item`'s recipe tree, following every alternative option
///
/// Cycles are reported as the path from the repeated item back to itself
/// and are not expanded further.
pub fn analyze(item: &str, catalog: &RecipeCatalog, threshold: usize) -> Result<DependencyReport> {
    let recipe = catalog.require(item)?;
    let mut walk = Walk::default();
    let mut path = vec![recipe.name.clone()];
    walk_recipe(&recipe.name, 1, catalog, &mut path, &mut walk);

    for cycle in &walk.cycles {
        warn!("Circular reference in catalog: {}", cycle.join(" -> "));
    }

    let bottlenecks = walk
        .materials
        .iter()
        .filter(|m| catalog.usage_count(m) > threshold)
        .cloned()
        .collect();

    Ok(DependencyReport {
        item: recipe.name.clone(),
        depth: walk.depth,
        total_materials: walk.materials.len(),
        cross_craft_deps: walk.craftable.len(),
        circular_deps: walk.cycles,
        bottlenecks,
    })
}

fn walk_recipe(
    name: &str,
    level: usize,
    catalog: &RecipeCatalog,
    path: &mut Vec<String>,
    walk: &mut Walk,
) {
    let Some(recipe) = catalog.get(name) else {
        return;
    };
    for line in &recipe.requirements {
        let targets: Vec<(&str, bool)> = match &line.requirement {
            Requirement::Item(item) => vec![(line.name.as_str(), item.clickable)],
            Requirement::Alternatives(group) => group
                .options
                .iter()
                .map(|o| (o.name.as_str(), o.clickable))
                .collect(),
        };

        for (target, clickable) in targets {
            walk.depth = walk.depth.max(level);
            walk.materials.insert(target.to_string());
            if !clickable || !catalog.is_craftable(target) {
                continue;
            }
            walk.craftable.insert(target.to_string());

            if let Some(start) = path.iter().position(|p| p == target) {
                let mut cycle: Vec<String> = path[start..].to_vec();
                cycle.push(target.to_string());
                if !walk.cycles.contains(&cycle) {
                    walk.cycles.push(cycle);
                }
                continue;
            }

            path.push(target.to_string());
            walk_recipe(target, level + 1, catalog, path, walk);
            path.pop();
        }
    }
}
