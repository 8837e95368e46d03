//! The set of active projects, persisted as JSON

use chrono::Utc;
use tracing::{debug, warn};

use crate::catalog::RecipeCatalog;
use crate::error::{Result, StoreError};
use crate::models::{Priority, Project};
use crate::store::{lock, SharedStore};

const PROJECTS_KEY: &str = "projects";

/// Outcome of an add request
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Added(Project),
    /// The name was already active; nothing changed
    AlreadyActive,
}

/// Active projects in insertion order
pub struct ProjectSet {
    projects: Vec<Project>,
    kv: SharedStore,
}

impl ProjectSet {
    /// Load the persisted set; unreadable data starts an empty set
    pub fn load(kv: SharedStore) -> Self {
        let projects = match read_projects(&kv) {
            Ok(projects) => projects,
            Err(e) => {
                warn!("Could not read saved projects, starting empty: {}", e);
                Vec::new()
            }
        };
        debug!("Loaded {} active projects", projects.len());
        Self { projects, kv }
    }

    /// Re-read the persisted set, replacing the in-memory copy
    pub fn reload(&mut self) -> std::result::Result<(), StoreError> {
        self.projects = read_projects(&self.kv)?;
        Ok(())
    }

    pub fn add(
        &mut self,
        name: &str,
        priority: Priority,
        catalog: &RecipeCatalog,
    ) -> Result<AddOutcome> {
        if self.contains(name) {
            return Ok(AddOutcome::AlreadyActive);
        }
        let recipe = catalog.require(name)?;
        let now = Utc::now();
        let project = Project {
            name: recipe.name.clone(),
            item_type: recipe.kind,
            priority,
            added_at: now,
            updated_at: now,
            requirements: recipe.requirements.clone(),
        };

        self.projects.push(project.clone());
        if let Err(e) = self.persist() {
            self.projects.pop();
            return Err(e.into());
        }
        Ok(AddOutcome::Added(project))
    }

    /// Returns false if the name was not active
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let Some(index) = self.projects.iter().position(|p| p.name == name) else {
            return Ok(false);
        };
        let removed = self.projects.remove(index);
        if let Err(e) = self.persist() {
            self.projects.insert(index, removed);
            return Err(e.into());
        }
        Ok(true)
    }

    /// Change a project's priority; false if absent or unchanged
    pub fn set_priority(&mut self, name: &str, priority: Priority) -> Result<bool> {
        let Some(project) = self.projects.iter_mut().find(|p| p.name == name) else {
            return Ok(false);
        };
        if project.priority == priority {
            return Ok(false);
        }
        let previous = (project.priority, project.updated_at);
        project.priority = priority;
        project.updated_at = Utc::now();

        if let Err(e) = self.persist() {
            if let Some(project) = self.projects.iter_mut().find(|p| p.name == name) {
                (project.priority, project.updated_at) = previous;
            }
            return Err(e.into());
        }
        Ok(true)
    }

    /// Replace the whole set, e.g. from an import
    pub fn replace(&mut self, projects: Vec<Project>) -> Result<()> {
        let previous = std::mem::replace(&mut self.projects, projects);
        if let Err(e) = self.persist() {
            self.projects = previous;
            return Err(e.into());
        }
        Ok(())
    }

    pub fn list(&self) -> &[Project] {
        &self.projects
    }

    pub fn get(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    fn persist(&self) -> std::result::Result<(), StoreError> {
        let json = serde_json::to_string(&self.projects)?;
        lock(&self.kv).set(PROJECTS_KEY, &json)
    }
}

fn read_projects(kv: &SharedStore) -> std::result::Result<Vec<Project>, StoreError> {
    let raw = lock(kv).get(PROJECTS_KEY)?;
    match raw {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}
