use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, params};

use crate::matcher::IngredientCatalog;
use crate::models::{
    Ingredient, IngredientCategory, InventoryStatus, ListStatus, NewIngredient,
    NewShoppingListItem, NewUserIngredient, Recipe, RecipeIngredientRequirement, ShoppingList,
    ShoppingListItem, UserIngredient,
};
use crate::normalize::normalize;

/// Typed store errors for the cases callers must distinguish from a generic
/// failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict: expected version {expected}, found {actual}")]
    VersionConflict { expected: i64, actual: i64 },
}

/// Whether an error is a transient store conflict (unique violation, busy or
/// locked database) that warrants a single retry. Everything else propagates
/// without retry.
#[must_use]
pub fn is_transient_store_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<rusqlite::Error>()
            .is_some_and(|e| match e {
                rusqlite::Error::SqliteFailure(f, _) => matches!(
                    f.code,
                    rusqlite::ErrorCode::ConstraintViolation
                        | rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                ),
                _ => false,
            })
    })
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    normalized_name TEXT NOT NULL UNIQUE,
                    category TEXT NOT NULL,
                    unit TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
                    quantity REAL NOT NULL CHECK (quantity >= 0),
                    unit TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'available',
                    expiry_date TEXT,
                    source_batch_id TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    ingredient_id INTEGER REFERENCES ingredients(id),
                    ingredient_name TEXT NOT NULL,
                    amount REAL,
                    unit TEXT,
                    is_optional INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS shopping_lists (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    note TEXT,
                    status TEXT NOT NULL DEFAULT 'open',
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS shopping_list_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    shopping_list_id INTEGER NOT NULL REFERENCES shopping_lists(id) ON DELETE CASCADE,
                    ingredient_id INTEGER REFERENCES ingredients(id),
                    ingredient_name TEXT NOT NULL,
                    quantity REAL NOT NULL,
                    unit TEXT NOT NULL,
                    is_checked INTEGER NOT NULL DEFAULT 0,
                    version INTEGER NOT NULL DEFAULT 1
                );

                CREATE INDEX IF NOT EXISTS idx_ingredients_normalized ON ingredients(normalized_name);
                CREATE INDEX IF NOT EXISTS idx_user_ingredients_user ON user_ingredients(user_id, status);
                CREATE INDEX IF NOT EXISTS idx_user_ingredients_batch ON user_ingredients(source_batch_id);
                CREATE INDEX IF NOT EXISTS idx_recipes_user ON recipes(user_id);
                CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe ON recipe_ingredients(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_shopping_list_items_list ON shopping_list_items(shopping_list_id);

                -- One available row per merge key
                CREATE UNIQUE INDEX IF NOT EXISTS idx_user_ingredients_merge_key
                    ON user_ingredients(user_id, ingredient_id, unit, ifnull(expiry_date, ''))
                    WHERE status = 'available';

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    /// Run `f` inside one transaction on this connection. Commits on `Ok`,
    /// rolls back on `Err`. All `Database` calls made inside the closure
    /// share the transaction.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let result = f(self)?;
        tx.commit()?;
        Ok(result)
    }

    // --- Row mapping helpers ---

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        let category: String = row.get(3)?;
        Ok(Ingredient {
            id: row.get(0)?,
            name: row.get(1)?,
            normalized_name: row.get(2)?,
            category: IngredientCategory::parse(&category).unwrap_or(IngredientCategory::Others),
            unit: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    // Expects columns:
    // 0: ui.id, 1: ui.user_id, 2: ui.ingredient_id, 3: ui.quantity, 4: ui.unit,
    // 5: ui.status, 6: ui.expiry_date, 7: ui.source_batch_id,
    // 8: ui.created_at, 9: ui.updated_at, 10: i.name
    fn user_ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<UserIngredient> {
        let status: String = row.get(5)?;
        let expiry: Option<String> = row.get(6)?;
        Ok(UserIngredient {
            id: row.get(0)?,
            user_id: row.get(1)?,
            ingredient_id: row.get(2)?,
            quantity: row.get(3)?,
            unit: row.get(4)?,
            status: InventoryStatus::parse(&status).unwrap_or(InventoryStatus::Available),
            expiry_date: expiry.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            source_batch_id: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            ingredient_name: row.get(10)?,
        })
    }

    fn shopping_list_from_row(row: &rusqlite::Row) -> rusqlite::Result<ShoppingList> {
        let status: String = row.get(4)?;
        Ok(ShoppingList {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            note: row.get(3)?,
            status: ListStatus::parse(&status).unwrap_or(ListStatus::Open),
            created_at: row.get(5)?,
        })
    }

    fn item_from_row(row: &rusqlite::Row) -> rusqlite::Result<ShoppingListItem> {
        Ok(ShoppingListItem {
            id: row.get(0)?,
            shopping_list_id: row.get(1)?,
            ingredient_id: row.get(2)?,
            ingredient_name: row.get(3)?,
            quantity: row.get(4)?,
            unit: row.get(5)?,
            is_checked: row.get::<_, i64>(6)? != 0,
            version: row.get(7)?,
        })
    }

    // --- Catalog ---

    pub fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient> {
        let now = Local::now().to_rfc3339();
        let normalized = normalize(&ingredient.name);
        if normalized.is_empty() {
            anyhow::bail!("Ingredient name must not be empty");
        }
        self.conn.execute(
            "INSERT INTO ingredients (name, normalized_name, category, unit, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ingredient.name,
                normalized,
                ingredient.category.as_str(),
                ingredient.unit,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_ingredient_by_id(id)
    }

    pub fn get_ingredient_by_id(&self, id: i64) -> Result<Ingredient> {
        self.conn
            .query_row(
                "SELECT * FROM ingredients WHERE id = ?1",
                params![id],
                Self::ingredient_from_row,
            )
            .context("Ingredient not found")
    }

    pub fn list_ingredients(&self, search: Option<&str>) -> Result<Vec<Ingredient>> {
        if let Some(query) = search {
            let pattern = format!("%{}%", escape_like(&normalize(query)));
            let mut stmt = self.conn.prepare(
                "SELECT * FROM ingredients WHERE normalized_name LIKE ?1 ESCAPE '\\' ORDER BY name LIMIT 100",
            )?;
            let rows = stmt
                .query_map(params![pattern], Self::ingredient_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(rows);
        }
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM ingredients ORDER BY name LIMIT 500")?;
        let rows = stmt
            .query_map([], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Inventory ---

    /// Whether any inventory row already references this source batch.
    pub fn has_source_batch(&self, user_id: i64, source_batch_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM user_ingredients WHERE user_id = ?1 AND source_batch_id = ?2",
            params![user_id, source_batch_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// The user's `available` rows for one ingredient, i.e. the rows the
    /// reconciliation merge rule groups by `(unit, expiry_date)`.
    pub fn available_rows(&self, user_id: i64, ingredient_id: i64) -> Result<Vec<UserIngredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT ui.id, ui.user_id, ui.ingredient_id, ui.quantity, ui.unit,
                    ui.status, ui.expiry_date, ui.source_batch_id, ui.created_at, ui.updated_at,
                    i.name
             FROM user_ingredients ui
             JOIN ingredients i ON ui.ingredient_id = i.id
             WHERE ui.user_id = ?1 AND ui.ingredient_id = ?2 AND ui.status = 'available'
             ORDER BY ui.id",
        )?;
        let rows = stmt
            .query_map(params![user_id, ingredient_id], Self::user_ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_user_ingredient(&self, row: &NewUserIngredient) -> Result<i64> {
        let now = Local::now().to_rfc3339();
        let expiry = row.expiry_date.map(|d| d.format("%Y-%m-%d").to_string());
        self.conn.execute(
            "INSERT INTO user_ingredients
                (user_id, ingredient_id, quantity, unit, status, expiry_date, source_batch_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'available', ?5, ?6, ?7, ?7)",
            params![
                row.user_id,
                row.ingredient_id,
                row.quantity,
                row.unit,
                expiry,
                row.source_batch_id,
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Bulk insert through one prepared statement. Callers wrap this in a
    /// transaction when atomicity across rows matters.
    pub fn insert_user_ingredients(&self, rows: &[NewUserIngredient]) -> Result<usize> {
        let now = Local::now().to_rfc3339();
        let mut stmt = self.conn.prepare(
            "INSERT INTO user_ingredients
                (user_id, ingredient_id, quantity, unit, status, expiry_date, source_batch_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'available', ?5, ?6, ?7, ?7)",
        )?;
        for row in rows {
            let expiry = row.expiry_date.map(|d| d.format("%Y-%m-%d").to_string());
            stmt.execute(params![
                row.user_id,
                row.ingredient_id,
                row.quantity,
                row.unit,
                expiry,
                row.source_batch_id,
                now,
            ])?;
        }
        Ok(rows.len())
    }

    /// Add quantity to an existing inventory row, optionally stamping a fresh
    /// expiry date (used when dating a not-yet-dated row).
    pub fn merge_into_row(
        &self,
        row_id: i64,
        add_quantity: f64,
        new_expiry: Option<NaiveDate>,
    ) -> Result<()> {
        let now = Local::now().to_rfc3339();
        if let Some(expiry) = new_expiry {
            self.conn.execute(
                "UPDATE user_ingredients
                 SET quantity = quantity + ?1, expiry_date = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![add_quantity, expiry.format("%Y-%m-%d").to_string(), now, row_id],
            )?;
        } else {
            self.conn.execute(
                "UPDATE user_ingredients
                 SET quantity = quantity + ?1, updated_at = ?2
                 WHERE id = ?3",
                params![add_quantity, now, row_id],
            )?;
        }
        Ok(())
    }

    pub fn list_inventory(
        &self,
        user_id: i64,
        status: Option<InventoryStatus>,
    ) -> Result<Vec<UserIngredient>> {
        let base = "SELECT ui.id, ui.user_id, ui.ingredient_id, ui.quantity, ui.unit,
                    ui.status, ui.expiry_date, ui.source_batch_id, ui.created_at, ui.updated_at,
                    i.name
             FROM user_ingredients ui
             JOIN ingredients i ON ui.ingredient_id = i.id";
        let rows = if let Some(status) = status {
            let mut stmt = self.conn.prepare(&format!(
                "{base} WHERE ui.user_id = ?1 AND ui.status = ?2 ORDER BY i.name, ui.expiry_date"
            ))?;
            stmt.query_map(
                params![user_id, status.as_str()],
                Self::user_ingredient_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?
        } else {
            let mut stmt = self.conn.prepare(&format!(
                "{base} WHERE ui.user_id = ?1 ORDER BY i.name, ui.expiry_date"
            ))?;
            stmt.query_map(params![user_id], Self::user_ingredient_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    /// Logical deletion: rows leave the working set by status transition.
    pub fn set_inventory_status(&self, id: i64, status: InventoryStatus) -> Result<bool> {
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE user_ingredients SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, id],
        )?;
        Ok(rows > 0)
    }

    /// Explicit removal is the only hard delete.
    pub fn remove_user_ingredient(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM user_ingredients WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Recipes ---

    pub fn insert_recipe(
        &self,
        user_id: i64,
        title: &str,
        requirements: &[RecipeIngredientRequirement],
    ) -> Result<Recipe> {
        self.with_transaction(|db| {
            let now = Local::now().to_rfc3339();
            db.conn.execute(
                "INSERT INTO recipes (user_id, title, created_at) VALUES (?1, ?2, ?3)",
                params![user_id, title, now],
            )?;
            let recipe_id = db.conn.last_insert_rowid();

            let mut stmt = db.conn.prepare(
                "INSERT INTO recipe_ingredients
                    (recipe_id, ingredient_id, ingredient_name, amount, unit, is_optional)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for req in requirements {
                stmt.execute(params![
                    recipe_id,
                    req.ingredient_id,
                    req.ingredient_name,
                    req.amount,
                    req.unit,
                    i64::from(req.is_optional),
                ])?;
            }
            db.get_recipe(recipe_id)
        })
    }

    pub fn get_recipe(&self, id: i64) -> Result<Recipe> {
        self.conn
            .query_row(
                "SELECT id, user_id, title, created_at FROM recipes WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Recipe {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        title: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .context("Recipe not found")
    }

    pub fn recipe_requirements(&self, recipe_id: i64) -> Result<Vec<RecipeIngredientRequirement>> {
        let mut stmt = self.conn.prepare(
            "SELECT ingredient_id, ingredient_name, amount, unit, is_optional
             FROM recipe_ingredients WHERE recipe_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![recipe_id], |row| {
                Ok(RecipeIngredientRequirement {
                    ingredient_id: row.get(0)?,
                    ingredient_name: row.get(1)?,
                    amount: row.get(2)?,
                    unit: row.get(3)?,
                    is_optional: row.get::<_, i64>(4)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_recipes(&self, user_id: i64) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, title, created_at FROM recipes WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(Recipe {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Shopping lists ---

    /// Insert a list header and all of its items. Callers run this inside
    /// `with_transaction` so an item failure rolls back the header too.
    pub fn insert_shopping_list(
        &self,
        user_id: i64,
        title: &str,
        note: Option<&str>,
        items: &[NewShoppingListItem],
    ) -> Result<(ShoppingList, Vec<ShoppingListItem>)> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO shopping_lists (user_id, title, note, status, created_at)
             VALUES (?1, ?2, ?3, 'open', ?4)",
            params![user_id, title, note, now],
        )?;
        let list_id = self.conn.last_insert_rowid();

        let mut stmt = self.conn.prepare(
            "INSERT INTO shopping_list_items
                (shopping_list_id, ingredient_id, ingredient_name, quantity, unit)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for item in items {
            stmt.execute(params![
                list_id,
                item.ingredient_id,
                item.ingredient_name,
                item.quantity,
                item.unit,
            ])?;
        }
        drop(stmt);

        self.get_shopping_list(list_id)
    }

    pub fn get_shopping_list(&self, id: i64) -> Result<(ShoppingList, Vec<ShoppingListItem>)> {
        let list = self
            .conn
            .query_row(
                "SELECT id, user_id, title, note, status, created_at FROM shopping_lists WHERE id = ?1",
                params![id],
                Self::shopping_list_from_row,
            )
            .context("Shopping list not found")?;

        let mut stmt = self.conn.prepare(
            "SELECT id, shopping_list_id, ingredient_id, ingredient_name, quantity, unit, is_checked, version
             FROM shopping_list_items WHERE shopping_list_id = ?1 ORDER BY id",
        )?;
        let items = stmt
            .query_map(params![id], Self::item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((list, items))
    }

    pub fn list_shopping_lists(&self, user_id: i64) -> Result<Vec<ShoppingList>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, title, note, status, created_at
             FROM shopping_lists WHERE user_id = ?1 ORDER BY id DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], Self::shopping_list_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Mark an item checked under optimistic concurrency. A stale
    /// `expected_version` surfaces as `StoreError::VersionConflict`, distinct
    /// from any other failure.
    pub fn check_item(&self, item_id: i64, expected_version: i64) -> Result<ShoppingListItem> {
        let actual: i64 = self
            .conn
            .query_row(
                "SELECT version FROM shopping_list_items WHERE id = ?1",
                params![item_id],
                |row| row.get(0),
            )
            .context("Shopping list item not found")?;
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual,
            }
            .into());
        }

        let rows = self.conn.execute(
            "UPDATE shopping_list_items SET is_checked = 1, version = version + 1
             WHERE id = ?1 AND version = ?2",
            params![item_id, expected_version],
        )?;
        if rows == 0 {
            // The row moved between our read and the guarded update.
            let actual: i64 = self.conn.query_row(
                "SELECT version FROM shopping_list_items WHERE id = ?1",
                params![item_id],
                |row| row.get(0),
            )?;
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual,
            }
            .into());
        }

        self.conn
            .query_row(
                "SELECT id, shopping_list_id, ingredient_id, ingredient_name, quantity, unit, is_checked, version
                 FROM shopping_list_items WHERE id = ?1",
                params![item_id],
                Self::item_from_row,
            )
            .context("Shopping list item not found")
    }
}

impl IngredientCatalog for Database {
    fn find_by_normalized(&self, key: &str) -> Result<Vec<Ingredient>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM ingredients WHERE normalized_name = ?1")?;
        let rows = stmt
            .query_map(params![key], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find_by_normalized_prefix(&self, key: &str) -> Result<Vec<Ingredient>> {
        let pattern = format!("{}%", escape_like(key));
        let mut stmt = self.conn.prepare(
            "SELECT * FROM ingredients WHERE normalized_name LIKE ?1 ESCAPE '\\' ORDER BY normalized_name LIMIT 50",
        )?;
        let rows = stmt
            .query_map(params![pattern], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find_by_normalized_contains(&self, key: &str) -> Result<Vec<Ingredient>> {
        let pattern = format!("%{}%", escape_like(key));
        let mut stmt = self.conn.prepare(
            "SELECT * FROM ingredients WHERE normalized_name LIKE ?1 ESCAPE '\\' ORDER BY normalized_name LIMIT 50",
        )?;
        let rows = stmt
            .query_map(params![pattern], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn create_ingredient(
        &self,
        name: &str,
        category: IngredientCategory,
        unit: &str,
    ) -> Result<Ingredient> {
        self.insert_ingredient(&NewIngredient {
            name: name.to_string(),
            category,
            unit: unit.to_string(),
        })
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
