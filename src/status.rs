//! Inventory status: owned vs needed per material, bottlenecks and summary

use std::collections::HashMap;

use serde::Serialize;

use crate::catalog::{BarterIndex, RecipeCatalog};
use crate::models::{
    AlternativeSource, GlobalRequirement, GlobalRequirements, InventoryStatus, InventoryStatuses,
    Project,
};
use crate::store::QuantityStore;

const USAGE_WEIGHT: f64 = 100.0;
const REMAINING_WEIGHT: f64 = 50.0;
const PRIORITY_DIVISOR: f64 = 100.0;

/// Percentage of `needed` covered by `stored`, clamped to [0, 100]
pub fn completion_percent(stored: u64, needed: u64) -> f64 {
    if needed == 0 {
        return 100.0;
    }
    (stored as f64 / needed as f64 * 100.0).min(100.0)
}

/// Ranking heuristic: more requiring projects and more outstanding need score higher
pub fn bottleneck_score(usage_count: usize, remaining: u64, needed: u64, priority_weight: u32) -> f64 {
    let remaining_ratio = if needed == 0 {
        0.0
    } else {
        remaining as f64 / needed as f64
    };
    usage_count as f64 * USAGE_WEIGHT
        + remaining_ratio * REMAINING_WEIGHT
        + priority_weight as f64 / PRIORITY_DIVISOR
}

/// Combines aggregated requirements with owned quantities
pub struct StatusCalculator<'a> {
    catalog: &'a RecipeCatalog,
    barter: &'a BarterIndex,
    projects: HashMap<&'a str, &'a Project>,
}

impl<'a> StatusCalculator<'a> {
    pub fn new(catalog: &'a RecipeCatalog, barter: &'a BarterIndex, projects: &'a [Project]) -> Self {
        Self {
            catalog,
            barter,
            projects: projects.iter().map(|p| (p.name.as_str(), p)).collect(),
        }
    }

    pub fn compute(
        &self,
        requirements: &GlobalRequirements,
        quantities: &QuantityStore,
        context: &str,
    ) -> InventoryStatuses {
        requirements
            .iter()
            .map(|(name, req)| {
                let stored = quantities.get(name, context);
                (name.clone(), self.status(name, req, stored))
            })
            .collect()
    }

    /// Status of one material; absent from `requirements` means not needed
    pub fn status_of(
        &self,
        material: &str,
        requirements: &GlobalRequirements,
        quantities: &QuantityStore,
        context: &str,
    ) -> InventoryStatus {
        let stored = quantities.get(material, context);
        match requirements.get(material) {
            Some(req) => self.status(material, req, stored),
            None => {
                let mut status = InventoryStatus::not_needed(stored);
                status.alternative_sources = self.alternative_sources(material);
                status
            }
        }
    }

    fn status(&self, name: &str, req: &GlobalRequirement, stored: u64) -> InventoryStatus {
        let needed = req.total_needed;
        let remaining = needed.saturating_sub(stored);
        let usage_count = req.used_by.len();

        let mut requiring: Vec<&Project> = req
            .used_by
            .iter()
            .filter_map(|p| self.projects.get(p.as_str()).copied())
            .collect();
        requiring.sort_by(|a, b| {
            b.priority
                .score()
                .cmp(&a.priority.score())
                .then(a.added_at.cmp(&b.added_at))
                .then(a.name.cmp(&b.name))
        });
        let priority_weight: u32 = requiring.iter().map(|p| p.priority.score()).sum();

        InventoryStatus {
            needed,
            stored,
            remaining,
            completion_percent: completion_percent(stored, needed),
            is_complete: remaining == 0,
            usage_count,
            bottleneck_score: bottleneck_score(usage_count, remaining, needed, priority_weight),
            priority_projects: requiring.iter().map(|p| p.name.clone()).collect(),
            alternative_sources: self.alternative_sources(name),
        }
    }

    fn alternative_sources(&self, material: &str) -> Vec<AlternativeSource> {
        let mut sources: Vec<AlternativeSource> = self
            .catalog
            .alternative_siblings(material)
            .into_iter()
            .flatten()
            .map(|name| AlternativeSource::Recipe { name: name.clone() })
            .collect();
        if self.barter.has_entry(material) {
            sources.push(AlternativeSource::Barter);
        }
        sources
    }
}

/// Incomplete materials ordered by bottleneck score, highest first
pub fn bottlenecks(statuses: &InventoryStatuses, limit: usize) -> Vec<(&String, &InventoryStatus)> {
    let mut ranked: Vec<_> = statuses.iter().filter(|(_, s)| !s.is_complete).collect();
    ranked.sort_by(|a, b| {
        b.1.bottleneck_score
            .total_cmp(&a.1.bottleneck_score)
            .then(a.0.cmp(b.0))
    });
    ranked.truncate(limit);
    ranked
}

/// Materials needed by more than one project, most shared first
pub fn shared_materials(statuses: &InventoryStatuses) -> Vec<(&String, &InventoryStatus)> {
    let mut shared: Vec<_> = statuses.iter().filter(|(_, s)| s.usage_count > 1).collect();
    shared.sort_by(|a, b| b.1.usage_count.cmp(&a.1.usage_count).then(a.0.cmp(b.0)));
    shared
}

/// Totals across every tracked material
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_materials: usize,
    pub completed: usize,
    pub total_stored: u64,
    pub total_needed: u64,
    pub total_remaining: u64,
    pub completion_percent: f64,
}

pub fn summarize(statuses: &InventoryStatuses) -> Summary {
    let mut summary = Summary {
        total_materials: statuses.len(),
        completed: 0,
        total_stored: 0,
        total_needed: 0,
        total_remaining: 0,
        completion_percent: 100.0,
    };
    let mut covered = 0u64;
    for status in statuses.values() {
        if status.is_complete {
            summary.completed += 1;
        }
        summary.total_stored = summary.total_stored.saturating_add(status.stored);
        summary.total_needed = summary.total_needed.saturating_add(status.needed);
        summary.total_remaining = summary.total_remaining.saturating_add(status.remaining);
        covered = covered.saturating_add(status.stored.min(status.needed));
    }
    summary.completion_percent = completion_percent(covered, summary.total_needed);
    summary
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Requirements Summary ===")?;
        writeln!(
            f,
            "Materials: {} tracked, {} complete",
            self.total_materials, self.completed
        )?;
        writeln!(f, "Owned:     {}", self.total_stored)?;
        writeln!(f, "Needed:    {}", self.total_needed)?;
        writeln!(f, "Remaining: {}", self.total_remaining)?;
        writeln!(f, "Progress:  {:.1}%", self.completion_percent)?;
        Ok(())
    }
}
