use std::path::Path;

use anyhow::Result;
use chrono::Local;

use crate::db::Database;
use crate::matcher::{IngredientMatcher, MatcherConfig};
use crate::models::{
    BuiltList, Ingredient, IngredientCategory, InventoryStatus, NewIngredient, Recipe,
    RecipeImport, RecipeIngredientRequirement, ReconcileReport, RecognizedCandidate, ShoppingList,
    ShoppingListItem, UserIngredient, validate_recipe_import,
};
use crate::reconcile::{ReconcileConfig, reconcile};
use crate::shopping::{BuildOptions, build};

/// Facade over the store and the core engines. One instance per process;
/// every operation is synchronous and request-scoped.
pub struct PantryService {
    db: Database,
    matcher_config: MatcherConfig,
    reconcile_config: ReconcileConfig,
}

impl PantryService {
    pub fn new(db_path: &Path) -> Result<Self> {
        Ok(Self {
            db: Database::open(db_path)?,
            matcher_config: MatcherConfig::default(),
            reconcile_config: ReconcileConfig::default(),
        })
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self {
            db: Database::open_in_memory()?,
            matcher_config: MatcherConfig::default(),
            reconcile_config: ReconcileConfig::default(),
        })
    }

    #[must_use]
    pub fn with_configs(
        mut self,
        matcher_config: MatcherConfig,
        reconcile_config: ReconcileConfig,
    ) -> Self {
        self.matcher_config = matcher_config;
        self.reconcile_config = reconcile_config;
        self
    }

    // --- Catalog ---

    pub fn add_ingredient(
        &self,
        name: &str,
        category: IngredientCategory,
        unit: &str,
    ) -> Result<Ingredient> {
        self.db.insert_ingredient(&NewIngredient {
            name: name.to_string(),
            category,
            unit: unit.to_string(),
        })
    }

    pub fn list_ingredients(&self, search: Option<&str>) -> Result<Vec<Ingredient>> {
        self.db.list_ingredients(search)
    }

    // --- Inventory ---

    /// Reconcile one recognition batch into the user's inventory.
    pub fn reconcile_batch(
        &self,
        user_id: i64,
        batch: &[RecognizedCandidate],
        source_batch_id: &str,
    ) -> Result<ReconcileReport> {
        reconcile(
            &self.db,
            user_id,
            batch,
            source_batch_id,
            &self.matcher_config,
            &self.reconcile_config,
            Local::now().date_naive(),
        )
    }

    pub fn list_inventory(
        &self,
        user_id: i64,
        status: Option<InventoryStatus>,
    ) -> Result<Vec<UserIngredient>> {
        self.db.list_inventory(user_id, status)
    }

    pub fn mark_inventory(&self, id: i64, status: InventoryStatus) -> Result<bool> {
        self.db.set_inventory_status(id, status)
    }

    pub fn remove_inventory(&self, id: i64) -> Result<bool> {
        self.db.remove_user_ingredient(id)
    }

    // --- Recipes ---

    /// Import a recipe from provider JSON. Ingredient names are resolved
    /// against the catalog up front so stored requirements carry their
    /// canonical references where a match exists; unresolved names stay
    /// name-only and are retried at shopping-list time.
    pub fn import_recipe(&self, user_id: i64, import: RecipeImport) -> Result<Recipe> {
        validate_recipe_import(&import)?;

        let mut matcher = IngredientMatcher::new(&self.db, self.matcher_config.clone());
        let mut requirements: Vec<RecipeIngredientRequirement> = Vec::new();
        for input in import.ingredients {
            let mut req = input.into_requirement();
            if let Some(result) = matcher.match_name(&req.ingredient_name)? {
                req.ingredient_id = Some(result.ingredient.id);
            }
            requirements.push(req);
        }
        self.db.insert_recipe(user_id, &import.title, &requirements)
    }

    pub fn get_recipe(&self, id: i64) -> Result<Recipe> {
        self.db.get_recipe(id)
    }

    pub fn recipe_requirements(&self, recipe_id: i64) -> Result<Vec<RecipeIngredientRequirement>> {
        self.db.recipe_requirements(recipe_id)
    }

    pub fn list_recipes(&self, user_id: i64) -> Result<Vec<Recipe>> {
        self.db.list_recipes(user_id)
    }

    // --- Shopping lists ---

    pub fn build_shopping_list(
        &self,
        user_id: i64,
        recipe_ids: &[i64],
        options: &BuildOptions,
    ) -> Result<BuiltList> {
        build(&self.db, user_id, recipe_ids, &self.matcher_config, options)
    }

    pub fn get_shopping_list(&self, id: i64) -> Result<(ShoppingList, Vec<ShoppingListItem>)> {
        self.db.get_shopping_list(id)
    }

    pub fn list_shopping_lists(&self, user_id: i64) -> Result<Vec<ShoppingList>> {
        self.db.list_shopping_lists(user_id)
    }

    /// Mark one item checked; a stale version surfaces as
    /// `StoreError::VersionConflict`.
    pub fn check_list_item(&self, item_id: i64, expected_version: i64) -> Result<ShoppingListItem> {
        self.db.check_item(item_id, expected_version)
    }
}
