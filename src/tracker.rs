//! The tracker service: projects, quantities and derived views in one place
//!
//! Constructed once by the entry point and passed by reference. Every
//! mutation that changes state emits a [`ChangeEvent`]; no-op mutations
//! emit nothing.

use std::collections::BTreeMap;

use chrono::Duration;
use tracing::info;

use crate::aggregator::Aggregator;
use crate::analyzer;
use crate::catalog::{BarterIndex, RecipeCatalog};
use crate::config::EngineConfig;
use crate::error::{Result, TrackerError};
use crate::events::{ChangeEvent, ChangeKind, EventBus, EventSource, ListenerId};
use crate::models::{
    DependencyReport, GlobalRequirements, InventoryStatus, InventoryStatuses, Priority, Project,
};
use crate::projects::{AddOutcome, ProjectSet};
use crate::status::{self, StatusCalculator, Summary};
use crate::store::{lock, QuantityStore, SharedStore};
use crate::transfer::{ExportBundle, ImportOutcome};

const MAX_CACHE_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct Settings {
    pub cache_ttl: Duration,
    pub bottleneck_threshold: usize,
    pub context: String,
}

impl From<&EngineConfig> for Settings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            cache_ttl: Duration::seconds(config.cache_ttl_secs.min(MAX_CACHE_TTL_SECS) as i64),
            bottleneck_threshold: config.bottleneck_threshold,
            context: config.context.clone(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

pub struct Tracker {
    catalog: RecipeCatalog,
    barter: BarterIndex,
    store: SharedStore,
    projects: ProjectSet,
    quantities: QuantityStore,
    aggregator: Aggregator,
    events: EventBus,
    settings: Settings,
}

impl Tracker {
    pub fn new(
        catalog: RecipeCatalog,
        store: SharedStore,
        barter: BarterIndex,
        settings: Settings,
    ) -> Self {
        Self {
            projects: ProjectSet::load(store.clone()),
            quantities: QuantityStore::new(store.clone()),
            aggregator: Aggregator::new(settings.cache_ttl),
            events: EventBus::new(),
            catalog,
            barter,
            store,
            settings,
        }
    }

    pub fn catalog(&self) -> &RecipeCatalog {
        &self.catalog
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&ChangeEvent) + Send + 'static) -> ListenerId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    fn invalidate(&mut self, source: EventSource) {
        if self.aggregator.invalidate() {
            self.events.emit(source, ChangeKind::CacheInvalidated);
        }
    }

    pub fn add_project(&mut self, name: &str, priority: Priority) -> Result<AddOutcome> {
        let outcome = self.projects.add(name, priority, &self.catalog)?;
        if let AddOutcome::Added(project) = &outcome {
            info!("Added project {} ({})", project.name, priority.as_str());
            self.invalidate(EventSource::User);
            self.events.emit(
                EventSource::User,
                ChangeKind::ProjectAdded {
                    name: project.name.clone(),
                },
            );
        }
        Ok(outcome)
    }

    /// Returns false, and emits nothing, if the project was not active
    pub fn remove_project(&mut self, name: &str) -> Result<bool> {
        if !self.projects.remove(name)? {
            return Ok(false);
        }
        info!("Removed project {}", name);
        self.invalidate(EventSource::User);
        self.events.emit(
            EventSource::User,
            ChangeKind::ProjectRemoved {
                name: name.to_string(),
            },
        );
        Ok(true)
    }

    pub fn set_priority(&mut self, name: &str, priority: Priority) -> Result<bool> {
        if !self.projects.set_priority(name, priority)? {
            return Ok(false);
        }
        self.events.emit(
            EventSource::User,
            ChangeKind::PriorityChanged {
                name: name.to_string(),
            },
        );
        Ok(true)
    }

    pub fn projects(&self) -> &[Project] {
        self.projects.list()
    }

    pub fn quantity(&self, material: &str) -> u64 {
        self.quantities.get(material, &self.settings.context)
    }

    /// Returns false when the count was already stored
    pub fn set_quantity(&mut self, material: &str, quantity: u64) -> Result<bool> {
        let Some(change) = self
            .quantities
            .set(material, &self.settings.context, quantity)?
        else {
            return Ok(false);
        };
        self.events.emit(
            EventSource::User,
            ChangeKind::QuantityChanged {
                material: change.material,
                context: change.context,
                old: change.old,
                new: change.new,
            },
        );
        Ok(true)
    }

    /// Apply several counts with a single notification
    ///
    /// Counts written before a storage failure stay written and are still
    /// announced before the error is returned.
    pub fn set_quantities(
        &mut self,
        quantities: &BTreeMap<String, u64>,
        source: EventSource,
    ) -> Result<usize> {
        let context = self.settings.context.clone();
        let mut changed = Vec::new();
        let mut failure = None;
        for (material, quantity) in quantities {
            match self.quantities.set(material, &context, *quantity) {
                Ok(Some(change)) => changed.push(change.material),
                Ok(None) => {}
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let count = changed.len();
        if count > 0 {
            self.events.emit(
                source,
                ChangeKind::QuantitiesChanged {
                    materials: changed,
                    context,
                },
            );
        }
        match failure {
            Some(e) => Err(TrackerError::Storage(e)),
            None => Ok(count),
        }
    }

    pub fn requirements(&self) -> GlobalRequirements {
        self.aggregator
            .requirements(self.projects.list(), &self.catalog)
    }

    fn calculator(&self) -> StatusCalculator<'_> {
        StatusCalculator::new(&self.catalog, &self.barter, self.projects.list())
    }

    pub fn status(&self) -> InventoryStatuses {
        let requirements = self.requirements();
        self.calculator()
            .compute(&requirements, &self.quantities, &self.settings.context)
    }

    pub fn status_of(&self, material: &str) -> InventoryStatus {
        let requirements = self.requirements();
        self.calculator()
            .status_of(material, &requirements, &self.quantities, &self.settings.context)
    }

    pub fn summary(&self) -> Summary {
        status::summarize(&self.status())
    }

    pub fn bottlenecks(&self, limit: usize) -> Vec<(String, InventoryStatus)> {
        let statuses = self.status();
        status::bottlenecks(&statuses, limit)
            .into_iter()
            .map(|(name, s)| (name.clone(), s.clone()))
            .collect()
    }

    pub fn shared_materials(&self) -> Vec<(String, InventoryStatus)> {
        let statuses = self.status();
        status::shared_materials(&statuses)
            .into_iter()
            .map(|(name, s)| (name.clone(), s.clone()))
            .collect()
    }

    pub fn analyze(&self, item: &str) -> Result<DependencyReport> {
        analyzer::analyze(item, &self.catalog, self.settings.bottleneck_threshold)
    }

    /// Pick up changes another process made to the store
    pub fn sync_external(&mut self) -> Result<bool> {
        let changed = lock(&self.store).external_change()?;
        if !changed {
            return Ok(false);
        }
        self.projects.reload()?;
        self.invalidate(EventSource::Sync);
        self.events.emit(EventSource::Sync, ChangeKind::ExternalChange);
        Ok(true)
    }

    pub fn export(&self) -> Result<ExportBundle> {
        let quantities = self.quantities.all(&self.settings.context)?;
        Ok(ExportBundle::new(self.projects.list().to_vec(), quantities))
    }

    /// Replace projects with the bundle's and apply its quantities
    pub fn import(&mut self, bundle: ExportBundle) -> Result<ImportOutcome> {
        let mut outcome = ImportOutcome::default();
        let (known, unknown): (Vec<Project>, Vec<Project>) = bundle
            .projects
            .into_iter()
            .partition(|p| self.catalog.is_craftable(&p.name));
        outcome.skipped_projects = unknown.into_iter().map(|p| p.name).collect();

        let mut incoming: Vec<Project> = Vec::new();
        for project in known {
            if !incoming.iter().any(|p| p.name == project.name) {
                incoming.push(project);
            }
        }
        let previous: Vec<String> = self.projects.list().iter().map(|p| p.name.clone()).collect();
        let removed: Vec<String> = previous
            .iter()
            .filter(|name| !incoming.iter().any(|p| &p.name == *name))
            .cloned()
            .collect();
        let added: Vec<String> = incoming
            .iter()
            .filter(|p| !previous.contains(&p.name))
            .map(|p| p.name.clone())
            .collect();

        outcome.projects = incoming.len();
        self.projects.replace(incoming)?;
        self.invalidate(EventSource::Import);
        for name in removed {
            self.events
                .emit(EventSource::Import, ChangeKind::ProjectRemoved { name });
        }
        for name in added {
            self.events
                .emit(EventSource::Import, ChangeKind::ProjectAdded { name });
        }

        outcome.quantities_changed = self.set_quantities(&bundle.quantities, EventSource::Import)?;
        info!("{}", outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::*;
    use crate::models::ItemKind;
    use crate::db::SqliteStore;
    use crate::store::{shared, Faults, MemoryStore};
    use std::sync::{Arc, Mutex};

    fn tracker_with(recipes: Vec<crate::models::Recipe>) -> (Tracker, Arc<Faults>, Arc<Mutex<Vec<ChangeEvent>>>) {
        let memory = MemoryStore::new();
        let faults = memory.faults();
        let mut tracker = Tracker::new(
            RecipeCatalog::new(recipes).unwrap(),
            shared(memory),
            BarterIndex::default(),
            Settings::default(),
        );
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        tracker.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        (tracker, faults, events)
    }

    fn tracker() -> (Tracker, Arc<Faults>, Arc<Mutex<Vec<ChangeEvent>>>) {
        tracker_with(hull_catalog())
    }

    #[test]
    fn test_hull_end_to_end() {
        let (mut tracker, _, _) = tracker();
        tracker.add_project("Hull", Priority::Normal).unwrap();

        let reqs = tracker.requirements();
        assert_eq!(reqs["Plank"].total_needed, 2);
        assert_eq!(reqs["Sail"].total_needed, 1);
        assert_eq!(reqs["Cloth"].total_needed, 3);

        tracker.set_quantity("Cloth", 3).unwrap();
        let cloth = tracker.status_of("Cloth");
        assert!(cloth.is_complete);
        assert_eq!(cloth.completion_percent, 100.0);

        let plank = tracker.status_of("Plank");
        assert!(!plank.is_complete);
        assert_eq!((plank.stored, plank.needed), (0, 2));
    }

    #[test]
    fn test_duplicate_add_reports_already_active() {
        let (mut tracker, _, events) = tracker();
        tracker.add_project("Hull", Priority::Normal).unwrap();
        let events_after_first = events.lock().unwrap().len();

        let second = tracker.add_project("Hull", Priority::Normal).unwrap();
        assert_eq!(second, AddOutcome::AlreadyActive);
        assert_eq!(tracker.projects().len(), 1);
        assert_eq!(events.lock().unwrap().len(), events_after_first);
    }

    #[test]
    fn test_remove_absent_emits_nothing() {
        let (mut tracker, _, events) = tracker();
        tracker.add_project("Hull", Priority::Normal).unwrap();
        events.lock().unwrap().clear();

        assert!(!tracker.remove_project("Sail").unwrap());
        assert_eq!(tracker.projects().len(), 1);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_mutation_invalidates_cache() {
        let (mut tracker, _, events) = tracker();
        tracker.add_project("Sail", Priority::Normal).unwrap();
        assert!(!tracker.requirements().contains_key("Plank"));

        tracker.add_project("Hull", Priority::Normal).unwrap();
        let reqs = tracker.requirements();
        assert_eq!(reqs["Plank"].total_needed, 2);
        assert_eq!(reqs["Cloth"].total_needed, 6);

        let kinds: Vec<_> = events.lock().unwrap().iter().map(|e| e.kind.clone()).collect();
        assert!(kinds.contains(&ChangeKind::CacheInvalidated));

        tracker.remove_project("Hull").unwrap();
        assert!(!tracker.requirements().contains_key("Plank"));
    }

    #[test]
    fn test_quantity_events() {
        let (mut tracker, _, events) = tracker();
        assert!(tracker.set_quantity("Cloth", 2).unwrap());
        assert!(!tracker.set_quantity("Cloth", 2).unwrap());

        let seen = events.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].kind,
            ChangeKind::QuantityChanged {
                material: "Cloth".to_string(),
                context: "global".to_string(),
                old: 0,
                new: 2,
            }
        );
        assert_eq!(seen[0].source, EventSource::User);
    }

    #[test]
    fn test_unsubscribed_listener_sees_nothing() {
        let (mut tracker, _, events) = tracker();
        let late = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&late);
        let id = tracker.subscribe(move |_| *counter.lock().unwrap() += 1);

        tracker.set_quantity("Cloth", 1).unwrap();
        assert!(tracker.unsubscribe(id));
        tracker.set_quantity("Cloth", 2).unwrap();

        assert_eq!(*late.lock().unwrap(), 1);
        assert_eq!(events.lock().unwrap().len(), 2);
        assert!(!tracker.unsubscribe(id));
    }

    #[test]
    fn test_bulk_quantities_single_event() {
        let (mut tracker, _, events) = tracker();
        let mut counts = BTreeMap::new();
        counts.insert("Cloth".to_string(), 1);
        counts.insert("Plank".to_string(), 2);
        assert_eq!(tracker.set_quantities(&counts, EventSource::User).unwrap(), 2);
        assert_eq!(events.lock().unwrap().len(), 1);
        assert_eq!(tracker.quantity("Plank"), 2);
    }

    #[test]
    fn test_storage_failure_reported_and_state_kept() {
        let (mut tracker, faults, events) = tracker();
        tracker.add_project("Hull", Priority::Normal).unwrap();
        let before = tracker.requirements();
        events.lock().unwrap().clear();

        faults.fail_writes(true);
        assert!(matches!(
            tracker.add_project("Sail", Priority::Normal),
            Err(TrackerError::Storage(_))
        ));
        assert!(tracker.set_quantity("Cloth", 3).is_err());
        assert!(tracker.remove_project("Hull").is_err());

        assert_eq!(tracker.projects().len(), 1);
        assert_eq!(tracker.requirements(), before);
        assert!(events.lock().unwrap().is_empty());

        faults.fail_reads(true);
        assert_eq!(tracker.quantity("Cloth"), 0);
    }

    #[test]
    fn test_priority_change() {
        let (mut tracker, _, events) = tracker();
        tracker.add_project("Hull", Priority::Normal).unwrap();
        events.lock().unwrap().clear();

        assert!(tracker.set_priority("Hull", Priority::Urgent).unwrap());
        assert!(!tracker.set_priority("Sail", Priority::Urgent).unwrap());
        assert_eq!(events.lock().unwrap().len(), 1);
        assert_eq!(tracker.status_of("Plank").priority_projects, vec!["Hull".to_string()]);
    }

    #[test]
    fn test_summary_and_rankings() {
        let (mut tracker, _, _) = tracker_with(vec![
            recipe("Raft", ItemKind::Ship, vec![material("Rope", 2), material("Log", 4)]),
            recipe("Sloop", ItemKind::Ship, vec![material("Rope", 3)]),
        ]);
        tracker.add_project("Raft", Priority::Normal).unwrap();
        tracker.add_project("Sloop", Priority::High).unwrap();
        tracker.set_quantity("Log", 4).unwrap();

        let summary = tracker.summary();
        assert_eq!(summary.total_materials, 2);
        assert_eq!(summary.completed, 1);

        let top = tracker.bottlenecks(5);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0, "Rope");

        let shared = tracker.shared_materials();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].1.usage_count, 2);
    }

    #[test]
    fn test_analyze_cycle() {
        let (tracker, _, _) = tracker_with(vec![
            recipe("A", ItemKind::ShipPart, vec![part("B", 1)]),
            recipe("B", ItemKind::ShipPart, vec![part("A", 1)]),
        ]);
        let report = tracker.analyze("A").unwrap();
        assert_eq!(
            report.circular_deps,
            vec![vec!["A".to_string(), "B".to_string(), "A".to_string()]]
        );
    }

    #[test]
    fn test_export_import_roundtrip() {
        let (mut source, _, _) = tracker();
        source.add_project("Hull", Priority::High).unwrap();
        source.set_quantity("Cloth", 2).unwrap();
        let mut bundle = source.export().unwrap();
        assert_eq!(bundle.quantities.get("Cloth"), Some(&2));

        let mut ghost = bundle.projects[0].clone();
        ghost.name = "Galleon".to_string();
        bundle.projects.push(ghost);

        let (mut target, _, events) = tracker();
        target.add_project("Sail", Priority::Normal).unwrap();
        events.lock().unwrap().clear();

        let outcome = target.import(bundle).unwrap();
        assert_eq!(outcome.projects, 1);
        assert_eq!(outcome.skipped_projects, vec!["Galleon".to_string()]);
        assert_eq!(outcome.quantities_changed, 1);

        let names: Vec<_> = target.projects().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Hull"]);
        assert_eq!(target.quantity("Cloth"), 2);
        assert!(events.lock().unwrap().iter().all(|e| e.source == EventSource::Import));
    }

    #[test]
    fn test_sync_external_reloads_projects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let open = || {
            Tracker::new(
                RecipeCatalog::new(hull_catalog()).unwrap(),
                shared(SqliteStore::open(&path).unwrap()),
                BarterIndex::default(),
                Settings::default(),
            )
        };
        let mut first = open();
        let mut second = open();
        first.sync_external().unwrap();

        second.add_project("Hull", Priority::Normal).unwrap();
        assert!(first.projects().is_empty());
        assert!(first.sync_external().unwrap());
        assert_eq!(first.projects().len(), 1);
        assert!(!first.sync_external().unwrap());
    }
}
