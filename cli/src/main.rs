mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use crate::commands::{
    cmd_catalog_add, cmd_catalog_list, cmd_inventory_list, cmd_inventory_mark,
    cmd_inventory_reconcile, cmd_inventory_remove, cmd_recipe_add, cmd_recipe_list,
    cmd_recipe_show, cmd_shopping_build, cmd_shopping_check, cmd_shopping_list_all,
    cmd_shopping_show,
};
use crate::config::Config;
use pantry_core::matcher::MatcherConfig;
use pantry_core::reconcile::ReconcileConfig;
use pantry_core::service::PantryService;

#[derive(Parser)]
#[command(
    name = "pantry",
    version,
    about = "A simple pantry tracker CLI",
    long_about = "Track what is in your fridge, reconcile ingredient scans, and build\nshopping lists from recipes — all stored locally."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the ingredient catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
    /// Manage your inventory
    Inventory {
        #[command(subcommand)]
        command: InventoryCommands,
    },
    /// Manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Build and manage shopping lists
    Shopping {
        #[command(subcommand)]
        command: ShoppingCommands,
    },
}

#[derive(Subcommand)]
enum CatalogCommands {
    /// Add an ingredient to the catalog
    Add {
        /// Ingredient name
        name: String,
        /// Category: vegetables, meat, fish, dairy, seasonings, others
        #[arg(short, long, default_value = "others")]
        category: String,
        /// Default unit (e.g. "g", "ml", "piece")
        #[arg(short, long, default_value = "")]
        unit: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List/search the catalog
    List {
        /// Search query to filter ingredients
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum InventoryCommands {
    /// List inventory rows
    List {
        /// User ID
        #[arg(long, default_value = "1")]
        user: i64,
        /// Include used/expired rows as well
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reconcile a recognition batch (JSON file of {name, confidence}) into inventory
    Reconcile {
        /// Path to the recognition JSON file
        file: PathBuf,
        /// User ID
        #[arg(long, default_value = "1")]
        user: i64,
        /// Source batch ID (random when omitted; reuse one to test idempotency)
        #[arg(long)]
        batch_id: Option<String>,
        /// Minimum recognition confidence to accept
        #[arg(long, default_value = "0.5")]
        min_confidence: f64,
        /// Create catalog entries for names that match nothing
        #[arg(long)]
        auto_create: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark an inventory row used
    Use {
        /// Inventory row ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark an inventory row expired
    Expire {
        /// Inventory row ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an inventory row entirely
    Remove {
        /// Inventory row ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Import a recipe from a JSON file
    Add {
        /// Path to the recipe JSON file
        file: PathBuf,
        /// User ID
        #[arg(long, default_value = "1")]
        user: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recipes
    List {
        /// User ID
        #[arg(long, default_value = "1")]
        user: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe and its required ingredients
    Show {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ShoppingCommands {
    /// Build a shopping list from one or more recipes
    Build {
        /// Recipe IDs
        #[arg(required = true)]
        recipes: Vec<i64>,
        /// User ID
        #[arg(long, default_value = "1")]
        user: i64,
        /// Group items by category
        #[arg(long)]
        group: bool,
        /// List title
        #[arg(long)]
        title: Option<String>,
        /// List note
        #[arg(long)]
        note: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a shopping list
    Show {
        /// Shopping list ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List shopping lists
    List {
        /// User ID
        #[arg(long, default_value = "1")]
        user: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check off a shopping-list item
    Check {
        /// Item ID
        item_id: i64,
        /// Item version as last seen (optimistic concurrency)
        #[arg(long, default_value = "1")]
        version: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let service = PantryService::new(&config.db_path)?;

    match cli.command {
        Commands::Catalog { command } => match command {
            CatalogCommands::Add {
                name,
                category,
                unit,
                json,
            } => cmd_catalog_add(&service, &name, &category, &unit, json),
            CatalogCommands::List { search, json } => {
                cmd_catalog_list(&service, search.as_deref(), json)
            }
        },
        Commands::Inventory { command } => match command {
            InventoryCommands::List { user, all, json } => {
                cmd_inventory_list(&service, user, all, json)
            }
            InventoryCommands::Reconcile {
                file,
                user,
                batch_id,
                min_confidence,
                auto_create,
                json,
            } => {
                let service = service.with_configs(
                    MatcherConfig {
                        auto_create,
                        ..MatcherConfig::default()
                    },
                    ReconcileConfig { min_confidence },
                );
                cmd_inventory_reconcile(&service, &file, user, batch_id, json)
            }
            InventoryCommands::Use { id, json } => cmd_inventory_mark(&service, id, true, json),
            InventoryCommands::Expire { id, json } => cmd_inventory_mark(&service, id, false, json),
            InventoryCommands::Remove { id, json } => cmd_inventory_remove(&service, id, json),
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Add { file, user, json } => cmd_recipe_add(&service, &file, user, json),
            RecipeCommands::List { user, json } => cmd_recipe_list(&service, user, json),
            RecipeCommands::Show { id, json } => cmd_recipe_show(&service, id, json),
        },
        Commands::Shopping { command } => match command {
            ShoppingCommands::Build {
                recipes,
                user,
                group,
                title,
                note,
                json,
            } => cmd_shopping_build(&service, user, &recipes, group, title, note, json),
            ShoppingCommands::Show { id, json } => cmd_shopping_show(&service, id, json),
            ShoppingCommands::List { user, json } => cmd_shopping_list_all(&service, user, json),
            ShoppingCommands::Check {
                item_id,
                version,
                json,
            } => cmd_shopping_check(&service, item_id, version, json),
        },
    }
}
