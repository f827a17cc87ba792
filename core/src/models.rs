use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical ingredient record in the shared dictionary.
///
/// Reference data: rows are immutable after creation and only ever created
/// lazily through the matcher's auto-creation path or an explicit catalog add.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    /// Comparison key produced by `normalize::normalize`, maintained by the
    /// store on insert.
    pub normalized_name: String,
    pub category: IngredientCategory,
    /// Default unit for this ingredient (e.g. "g", "ml", "piece"). May be
    /// empty when the catalog has no opinion.
    pub unit: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewIngredient {
    pub name: String,
    pub category: IngredientCategory,
    pub unit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngredientCategory {
    Vegetables,
    Meat,
    Fish,
    Dairy,
    Seasonings,
    Others,
}

impl IngredientCategory {
    pub const ALL: &'static [IngredientCategory] = &[
        IngredientCategory::Vegetables,
        IngredientCategory::Meat,
        IngredientCategory::Fish,
        IngredientCategory::Dairy,
        IngredientCategory::Seasonings,
        IngredientCategory::Others,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IngredientCategory::Vegetables => "vegetables",
            IngredientCategory::Meat => "meat",
            IngredientCategory::Fish => "fish",
            IngredientCategory::Dairy => "dairy",
            IngredientCategory::Seasonings => "seasonings",
            IngredientCategory::Others => "others",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "vegetables" => Some(IngredientCategory::Vegetables),
            "meat" => Some(IngredientCategory::Meat),
            "fish" => Some(IngredientCategory::Fish),
            "dairy" => Some(IngredientCategory::Dairy),
            "seasonings" => Some(IngredientCategory::Seasonings),
            "others" => Some(IngredientCategory::Others),
            _ => None,
        }
    }

    /// Position in the fixed shopping-list display order.
    #[must_use]
    pub fn display_order(self) -> usize {
        match self {
            IngredientCategory::Vegetables => 0,
            IngredientCategory::Meat => 1,
            IngredientCategory::Fish => 2,
            IngredientCategory::Dairy => 3,
            IngredientCategory::Seasonings => 4,
            IngredientCategory::Others => 5,
        }
    }

    /// Shelf life in days used when estimating an expiry date.
    #[must_use]
    pub fn expiry_days(self) -> i64 {
        match self {
            IngredientCategory::Vegetables => 7,
            IngredientCategory::Meat => 3,
            IngredientCategory::Fish => 2,
            IngredientCategory::Dairy => 10,
            IngredientCategory::Seasonings => 365,
            IngredientCategory::Others => 14,
        }
    }
}

/// One candidate produced by the image-recognition provider. Ephemeral input,
/// never persisted directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedCandidate {
    pub name: String,
    pub confidence: f64,
}

pub fn validate_candidate(candidate: &RecognizedCandidate) -> Result<()> {
    if candidate.name.trim().is_empty() {
        bail!("Recognized candidate name must not be empty");
    }
    if !(0.0..=1.0).contains(&candidate.confidence) {
        bail!(
            "Recognized candidate confidence must be between 0 and 1 (got {})",
            candidate.confidence
        );
    }
    Ok(())
}

/// Strategy that produced a match, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Exact,
    Forward,
    Partial,
}

/// Result of resolving one free-text name against the catalog.
/// Consumed immediately by callers, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub ingredient: Ingredient,
    pub confidence: f64,
    pub tier: MatchTier,
}

/// Diagnostic entry for a name no tier could resolve.
#[derive(Debug, Clone, Serialize)]
pub struct UnmatchedRecord {
    pub original_name: String,
    pub normalized_name: String,
    pub timestamp: String,
}

/// Diagnostic entry for a tier that yielded more than one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct AmbiguousRecord {
    pub normalized_name: String,
    pub candidate_names: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryStatus {
    Available,
    Used,
    Expired,
}

impl InventoryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            InventoryStatus::Available => "available",
            InventoryStatus::Used => "used",
            InventoryStatus::Expired => "expired",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(InventoryStatus::Available),
            "used" => Some(InventoryStatus::Used),
            "expired" => Some(InventoryStatus::Expired),
            _ => None,
        }
    }
}

/// One inventory row. For a given `(user_id, ingredient_id, unit, expiry_date)`
/// tuple with `status = available` at most one row exists; that tuple is the
/// reconciliation merge key.
#[derive(Debug, Clone, Serialize)]
pub struct UserIngredient {
    pub id: i64,
    pub user_id: i64,
    pub ingredient_id: i64,
    pub quantity: f64,
    pub unit: String,
    pub status: InventoryStatus,
    pub expiry_date: Option<NaiveDate>,
    /// Traceability to the recognition/import event that produced this row.
    pub source_batch_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    // Joined field for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredient_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUserIngredient {
    pub user_id: i64,
    pub ingredient_id: i64,
    pub quantity: f64,
    pub unit: String,
    pub expiry_date: Option<NaiveDate>,
    pub source_batch_id: Option<String>,
}

// --- Recipes ---

#[derive(Debug, Clone, Serialize)]
pub struct Recipe {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub created_at: String,
}

/// One required ingredient of a recipe, as stored.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeIngredientRequirement {
    pub ingredient_id: Option<i64>,
    pub ingredient_name: String,
    pub amount: Option<f64>,
    pub unit: Option<String>,
    pub is_optional: bool,
}

/// Recipe-ingredient input as it arrives from the LLM provider: either a bare
/// name string or a structured object. Modeled as an explicit variant type
/// with one exhaustive conversion instead of runtime shape sniffing.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RequirementInput {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        amount: Option<f64>,
        #[serde(default)]
        unit: Option<String>,
        #[serde(default)]
        optional: bool,
    },
}

impl RequirementInput {
    #[must_use]
    pub fn into_requirement(self) -> RecipeIngredientRequirement {
        match self {
            RequirementInput::Name(name) => RecipeIngredientRequirement {
                ingredient_id: None,
                ingredient_name: name,
                amount: None,
                unit: None,
                is_optional: false,
            },
            RequirementInput::Detailed {
                name,
                amount,
                unit,
                optional,
            } => RecipeIngredientRequirement {
                ingredient_id: None,
                ingredient_name: name,
                amount,
                unit,
                is_optional: optional,
            },
        }
    }
}

/// Recipe as imported from a JSON file (LLM provider output shape).
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeImport {
    pub title: String,
    pub ingredients: Vec<RequirementInput>,
}

pub fn validate_recipe_import(import: &RecipeImport) -> Result<()> {
    if import.title.trim().is_empty() {
        bail!("Recipe title must not be empty");
    }
    if import.ingredients.is_empty() {
        bail!("Recipe must have at least one ingredient");
    }
    Ok(())
}

// --- Shopping lists ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListStatus {
    Open,
    Done,
}

impl ListStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ListStatus::Open => "open",
            ListStatus::Done => "done",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ListStatus::Open),
            "done" => Some(ListStatus::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShoppingList {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub note: Option<String>,
    pub status: ListStatus,
    pub created_at: String,
}

/// One line of a shopping list. `ingredient_id` is None for items that never
/// matched the catalog; `ingredient_name` always carries display text.
/// `version` backs optimistic concurrency for check-off.
#[derive(Debug, Clone, Serialize)]
pub struct ShoppingListItem {
    pub id: i64,
    pub shopping_list_id: i64,
    pub ingredient_id: Option<i64>,
    pub ingredient_name: String,
    pub quantity: f64,
    pub unit: String,
    pub is_checked: bool,
    pub version: i64,
}

/// Draft line item, produced by consolidation and persisted in bulk.
#[derive(Debug, Clone)]
pub struct NewShoppingListItem {
    pub ingredient_id: Option<i64>,
    pub ingredient_name: String,
    pub quantity: f64,
    pub unit: String,
}

/// A freshly generated shopping list together with the diagnostics gathered
/// while building it.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltList {
    pub list: ShoppingList,
    pub items: Vec<ShoppingListItem>,
    pub warnings: Vec<String>,
    pub unmatched_ingredients: Vec<UnmatchedRecord>,
    pub ambiguous_matches: Vec<AmbiguousRecord>,
}

// --- Reconciliation ---

/// Outcome of one reconcile run. Counters follow the processing stages:
/// recognized → confidence filter → match → merge-or-insert.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub total_recognized: usize,
    pub successful_conversions: usize,
    pub skipped_low_confidence: usize,
    pub unmatched_ingredients: usize,
    /// Observations merged into existing inventory rows.
    pub duplicate_updates: usize,
    /// Newly created inventory rows.
    pub new_ingredients: usize,
    pub errors: Vec<String>,
    /// Set when this `source_batch_id` was already reconciled; the whole run
    /// was a no-op.
    pub already_processed: bool,
}
