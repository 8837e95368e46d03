//! Fleet Ledger
//!
//! Tracks material requirements for ship-building projects.

mod aggregator;
mod analyzer;
mod catalog;
mod config;
mod db;
mod error;
mod events;
mod extract;
mod models;
mod projects;
mod status;
mod store;
mod tracker;
mod transfer;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::catalog::{BarterIndex, RecipeCatalog};
use crate::config::{Config, ConfigOverrides};
use crate::db::SqliteStore;
use crate::models::{Priority, Requirement};
use crate::projects::AddOutcome;
use crate::tracker::{Settings, Tracker};
use crate::transfer::ExportBundle;

#[derive(Parser)]
#[command(name = "fleet-ledger")]
#[command(about = "Material requirements tracker for ship-building projects")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the SQLite database (overrides the config file)
    #[arg(short, long)]
    database: Option<String>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Write a configuration template
    ConfigInit {
        /// Where to write it
        #[arg(default_value = "fleet-ledger.toml")]
        path: PathBuf,
    },

    /// Load a sample shipyard catalog for testing
    LoadSample,

    /// Import recipe catalog JSON from a file or directory
    ImportCatalog {
        /// Catalog file or directory (defaults to the configured path)
        path: Option<PathBuf>,
    },

    /// List all craftable items in the catalog
    Items,

    /// Show the recipe for a specific item
    Item {
        name: String,
    },

    /// Mark an item as an active project
    Add {
        name: String,

        #[arg(short, long, default_value = "normal")]
        priority: Priority,
    },

    /// Stop tracking a project
    Remove {
        name: String,
    },

    /// Change a project's priority
    Priority {
        name: String,
        priority: Priority,
    },

    /// List active projects
    Projects,

    /// Set the owned count of a material
    Set {
        material: String,
        count: u64,
    },

    /// Show aggregated requirements across active projects
    Requirements {
        #[arg(long)]
        json: bool,
    },

    /// Show owned vs needed per material
    Status {
        /// Include completed materials
        #[arg(short, long)]
        all: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show overall progress
    Summary,

    /// Rank materials most likely to block progress
    Bottlenecks {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List materials required by more than one project
    Shared,

    /// Analyze an item's dependency tree
    Analyze {
        item: String,
    },

    /// Export projects and owned quantities to JSON
    Export {
        path: PathBuf,
    },

    /// Import projects and owned quantities from JSON
    Import {
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "fleet_ledger=info",
        1 => "fleet_ledger=debug",
        _ => "fleet_ledger=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_overrides(ConfigOverrides {
        db_path: cli.database,
    });

    if let Commands::ConfigInit { path } = &cli.command {
        Config::write_template(path)?;
        println!("Configuration template written to {}", path.display());
        return Ok(());
    }

    let db_path = PathBuf::from(&config.storage.db_path);
    let mut sqlite = SqliteStore::open(&db_path)?;
    debug!("Opened database {}", db_path.display());

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", db_path.display());
            return Ok(());
        }
        Commands::LoadSample => {
            load_sample_data(sqlite.conn_mut())?;
            println!("Sample data loaded successfully!");
            return Ok(());
        }
        Commands::ImportCatalog { path } => {
            let path = path
                .or_else(|| config.catalog.path.as_ref().map(PathBuf::from))
                .context("no catalog path given and none configured")?;
            let stats = extract::extract_to_database(sqlite.conn_mut(), &path)?;
            println!("{}", stats);
            return Ok(());
        }
        _ => {}
    }

    let catalog = RecipeCatalog::new(db::load_recipes(sqlite.conn())?)?;
    if catalog.is_empty() {
        println!("No recipes in database. Run 'import-catalog' or 'load-sample' first.");
        return Ok(());
    }
    let barter = match &config.catalog.barter_path {
        Some(path) => BarterIndex::load(Path::new(path))?,
        None => BarterIndex::default(),
    };
    info!("Loaded {} recipes, {} barter entries", catalog.len(), barter.len());

    let mut tracker = Tracker::new(
        catalog,
        store::shared(sqlite),
        barter,
        Settings::from(&config.engine),
    );
    let listener = tracker.subscribe(|event| {
        if let Ok(json) = serde_json::to_string(event) {
            debug!("change: {}", json);
        }
    });

    let outcome = run(&mut tracker, cli.command);
    tracker.unsubscribe(listener);
    outcome
}

fn run(tracker: &mut Tracker, command: Commands) -> Result<()> {
    match command {
        Commands::Items => {
            println!("{:<30} {:<12} {:>6}", "Item", "Type", "Lines");
            println!("{}", "-".repeat(50));
            for recipe in tracker.catalog().recipes() {
                println!(
                    "{:<30} {:<12} {:>6}",
                    recipe.name,
                    recipe.kind.as_str(),
                    recipe.requirements.len()
                );
            }
        }

        Commands::Item { name } => {
            let recipe = tracker.catalog().require(&name)?;
            println!("Item: {}", recipe.name);
            if recipe.base_name != recipe.name {
                println!("  Base name: {}", recipe.base_name);
            }
            println!("  Type: {}", recipe.kind.as_str());
            if recipe.requirements.is_empty() {
                println!("  No requirements");
            } else {
                println!("  Requires:");
            }
            for line in &recipe.requirements {
                let target_type = line.requirement.target_type().as_str();
                match &line.requirement {
                    Requirement::Item(item) => {
                        let marker = if item.clickable { " *" } else { "" };
                        println!("    {}x {} [{}]{}", item.quantity, line.name, target_type, marker);
                    }
                    Requirement::Alternatives(group) => {
                        println!("    {}x {} [{}], one of:", group.quantity, line.name, target_type);
                        for option in &group.options {
                            let marker = if option.recommended { " (recommended)" } else { "" };
                            println!("      {}x {}{}", option.quantity, option.name, marker);
                        }
                    }
                }
            }
        }

        Commands::Add { name, priority } => match tracker.add_project(&name, priority)? {
            AddOutcome::Added(project) => {
                println!("Added {} ({})", project.name, project.priority.as_str())
            }
            AddOutcome::AlreadyActive => println!("{} is already an active project", name),
        },

        Commands::Remove { name } => {
            if tracker.remove_project(&name)? {
                println!("Removed {}", name);
            } else {
                println!("{} is not an active project", name);
            }
        }

        Commands::Priority { name, priority } => {
            if tracker.set_priority(&name, priority)? {
                println!("{} is now {}", name, priority.as_str());
            } else {
                println!("No change for {}", name);
            }
        }

        Commands::Projects => {
            let projects = tracker.projects();
            if projects.is_empty() {
                println!("No active projects.");
            } else {
                println!("{:<30} {:<10} {:<10} {}", "Project", "Type", "Priority", "Added");
                println!("{}", "-".repeat(72));
                for p in projects {
                    println!(
                        "{:<30} {:<10} {:<10} {}",
                        p.name,
                        p.item_type.as_str(),
                        p.priority.as_str(),
                        p.added_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }

        Commands::Set { material, count } => {
            if tracker.set_quantity(&material, count)? {
                let status = tracker.status_of(&material);
                println!(
                    "{}: {}/{} ({:.0}%)",
                    material, status.stored, status.needed, status.completion_percent
                );
            } else {
                println!("{} already at {}", material, count);
            }
        }

        Commands::Requirements { json } => {
            let requirements = tracker.requirements();
            if json {
                println!("{}", serde_json::to_string_pretty(&requirements)?);
            } else if requirements.is_empty() {
                println!("No requirements. Add a project first.");
            } else {
                println!("{:<30} {:>8} {:<10} {}", "Material", "Needed", "Type", "Used by");
                println!("{}", "-".repeat(72));
                for (name, req) in &requirements {
                    let alt = if req.has_alternatives { " (alt)" } else { "" };
                    println!(
                        "{:<30} {:>8} {:<10} {}{}",
                        name,
                        req.total_needed,
                        req.target_type.as_str(),
                        req.used_by.join(", "),
                        alt
                    );
                }
            }
        }

        Commands::Status { all, json } => {
            let statuses = tracker.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                println!(
                    "{:<30} {:>8} {:>8} {:>9} {:>7}",
                    "Material", "Stored", "Needed", "Remaining", "Done"
                );
                println!("{}", "-".repeat(66));
                for (name, s) in statuses.iter().filter(|(_, s)| all || !s.is_complete) {
                    println!(
                        "{:<30} {:>8} {:>8} {:>9} {:>6.0}%",
                        name, s.stored, s.needed, s.remaining, s.completion_percent
                    );
                }
            }
        }

        Commands::Summary => {
            println!("{}", tracker.summary());
        }

        Commands::Bottlenecks { limit } => {
            let ranked = tracker.bottlenecks(limit);
            if ranked.is_empty() {
                println!("No outstanding materials.");
            }
            for (i, (name, s)) in ranked.iter().enumerate() {
                println!(
                    "{:>2}. {:<30} score {:>7.1}  {} remaining, used by {}",
                    i + 1,
                    name,
                    s.bottleneck_score,
                    s.remaining,
                    s.priority_projects.join(", ")
                );
            }
        }

        Commands::Shared => {
            let shared = tracker.shared_materials();
            if shared.is_empty() {
                println!("No materials are shared between projects.");
            }
            for (name, s) in shared {
                println!("{:<30} {} projects: {}", name, s.usage_count, s.priority_projects.join(", "));
            }
        }

        Commands::Analyze { item } => {
            let report = tracker.analyze(&item)?;
            println!("=== Dependencies of {} ===", report.item);
            println!("Depth:            {}", report.depth);
            println!("Total materials:  {}", report.total_materials);
            println!("Craftable inputs: {}", report.cross_craft_deps);
            if !report.bottlenecks.is_empty() {
                println!("Bottlenecks:      {}", report.bottlenecks.join(", "));
            }
            for cycle in &report.circular_deps {
                println!("Circular:         {}", cycle.join(" -> "));
            }
        }

        Commands::Export { path } => {
            let bundle = tracker.export()?;
            bundle.write_file(&path)?;
            println!(
                "Exported {} projects and {} quantities to {}",
                bundle.projects.len(),
                bundle.quantities.len(),
                path.display()
            );
        }

        Commands::Import { path } => {
            let bundle = ExportBundle::read_file(&path)?;
            let outcome = tracker.import(bundle)?;
            println!("{}", outcome);
        }

        Commands::Init
        | Commands::ConfigInit { .. }
        | Commands::LoadSample
        | Commands::ImportCatalog { .. } => {}
    }

    Ok(())
}

/// Sample shipyard catalog for testing without real game data
const SAMPLE_CATALOG: &str = r#"{
    "Brigantine": {
        "type": "ship",
        "requirements": [
            { "kind": "item", "name": "Hull", "quantity": 1, "target_type": "ship_part", "clickable": true },
            { "kind": "item", "name": "Mast", "quantity": 2, "target_type": "ship_part", "clickable": true },
            { "kind": "item", "name": "Cannon", "quantity": 8, "target_type": "ship_part", "clickable": true },
            { "kind": "item", "name": "Rope", "quantity": 40, "target_type": "material" }
        ]
    },
    "Brigantine +1": {
        "type": "ship",
        "requirements": [
            { "kind": "item", "name": "Brigantine", "quantity": 1, "target_type": "ship", "clickable": true },
            { "kind": "item", "name": "Reinforced Plank", "quantity": 30, "target_type": "ship_part", "clickable": true },
            { "kind": "item", "name": "Gold Coin", "quantity": 500, "target_type": "material" }
        ]
    },
    "Cutter": {
        "type": "ship",
        "requirements": [
            { "kind": "item", "name": "Hull", "quantity": 1, "target_type": "ship_part", "clickable": true },
            { "kind": "item", "name": "Mast", "quantity": 1, "target_type": "ship_part", "clickable": true },
            { "kind": "item", "name": "Rope", "quantity": 15, "target_type": "material" }
        ]
    },
    "Hull": {
        "type": "ship_part",
        "requirements": [
            { "kind": "item", "name": "Plank", "quantity": 20, "target_type": "material" },
            { "kind": "item", "name": "Iron Ingot", "quantity": 4, "target_type": "material" },
            { "kind": "alternatives", "name": "Sealant", "options": [
                { "name": "Tar", "quantity": 5, "target_type": "material", "recommended": true },
                { "name": "Resin", "quantity": 8, "target_type": "material" }
            ]}
        ]
    },
    "Mast": {
        "type": "ship_part",
        "requirements": [
            { "kind": "alternatives", "name": "Timber", "options": [
                { "name": "Oak Log", "quantity": 6, "target_type": "material", "recommended": true },
                { "name": "Pine Log", "quantity": 9, "target_type": "material" }
            ]},
            { "kind": "item", "name": "Sail", "quantity": 1, "target_type": "ship_part", "clickable": true },
            { "kind": "item", "name": "Rope", "quantity": 10, "target_type": "material" }
        ]
    },
    "Sail": {
        "type": "ship_part",
        "requirements": [
            { "kind": "item", "name": "Canvas", "quantity": 12, "target_type": "material" },
            { "kind": "item", "name": "Rope", "quantity": 4, "target_type": "material" }
        ]
    },
    "Cannon": {
        "type": "ship_part",
        "requirements": [
            { "kind": "item", "name": "Iron Ingot", "quantity": 6, "target_type": "material" },
            { "kind": "item", "name": "Gunpowder", "quantity": 2, "target_type": "material" }
        ]
    },
    "Reinforced Plank": {
        "type": "ship_part",
        "requirements": [
            { "kind": "item", "name": "Plank", "quantity": 2, "target_type": "material" },
            { "kind": "item", "name": "Iron Ingot", "quantity": 1, "target_type": "material" }
        ]
    }
}"#;

/// Load the sample catalog, replacing any stored recipes
fn load_sample_data(conn: &mut rusqlite::Connection) -> Result<()> {
    let recipes = extract::parse_catalog_str(SAMPLE_CATALOG)?;
    let count = recipes.len();
    extract::write_catalog(conn, &recipes)?;
    println!("Loaded {} sample recipes", count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{shared, MemoryStore};

    #[test]
    fn test_sample_catalog_is_valid() {
        let recipes = extract::parse_catalog_str(SAMPLE_CATALOG).unwrap();
        let catalog = RecipeCatalog::new(recipes).unwrap();
        assert_eq!(catalog.len(), 8);
        assert_eq!(catalog.get("Brigantine +1").unwrap().base_name, "Brigantine");

        let report = tracker::Tracker::new(
            catalog,
            shared(MemoryStore::new()),
            BarterIndex::default(),
            Settings::default(),
        )
        .analyze("Brigantine +1")
        .unwrap();
        assert!(report.circular_deps.is_empty());
        assert_eq!(report.depth, 4);
    }

    #[test]
    fn test_sample_brigantine_totals() {
        let catalog = RecipeCatalog::new(extract::parse_catalog_str(SAMPLE_CATALOG).unwrap()).unwrap();
        let mut tracker = Tracker::new(
            catalog,
            shared(MemoryStore::new()),
            BarterIndex::default(),
            Settings::default(),
        );
        tracker.add_project("Brigantine", Priority::High).unwrap();
        let reqs = tracker.requirements();

        // 40 direct + 2 masts x (10 + sail 4)
        assert_eq!(reqs["Rope"].total_needed, 68);
        // hull 4 + 8 cannons x 6
        assert_eq!(reqs["Iron Ingot"].total_needed, 52);
        assert_eq!(reqs["Oak Log"].total_needed, 12);
        assert_eq!(reqs["Tar"].total_needed, 5);
        assert!(!reqs.contains_key("Resin"));
    }
}
