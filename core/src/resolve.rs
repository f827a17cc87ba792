//! Default quantity, unit, and expiry estimation for ingredients observed
//! without an explicit amount (image recognition yields names only).

use chrono::{Duration, NaiveDate};

use crate::models::{Ingredient, IngredientCategory};
use crate::normalize::normalize;

/// Per-name overrides, keyed by normalized name. Checked before any category
/// default: eggs come in cartons of ten, milk in one-litre packs.
const SPECIAL_QUANTITIES: &[(&str, f64, &str)] = &[
    ("卵", 10.0, "piece"),
    ("タマゴ", 10.0, "piece"),
    ("egg", 10.0, "piece"),
    ("eggs", 10.0, "piece"),
    ("牛乳", 1000.0, "ml"),
    ("ミルク", 1000.0, "ml"),
    ("milk", 1000.0, "ml"),
];

/// Default quantity and unit per category, used when no special case applies.
fn category_default(category: IngredientCategory) -> (f64, &'static str) {
    match category {
        IngredientCategory::Meat => (200.0, "g"),
        IngredientCategory::Vegetables
        | IngredientCategory::Fish
        | IngredientCategory::Dairy
        | IngredientCategory::Seasonings
        | IngredientCategory::Others => (1.0, "piece"),
    }
}

/// Derive the default quantity and unit for one observed ingredient.
///
/// Priority: special-case table by normalized name, then the category
/// default. The category default's unit yields to the ingredient's own
/// catalog unit when one is set; a special-case hit keeps its own unit.
#[must_use]
pub fn resolve_quantity(ingredient: &Ingredient) -> (f64, String) {
    let key = normalize(&ingredient.name);
    for (name, quantity, unit) in SPECIAL_QUANTITIES {
        if key == *name {
            return (*quantity, (*unit).to_string());
        }
    }

    let (quantity, default_unit) = category_default(ingredient.category);
    let unit = if ingredient.unit.trim().is_empty() {
        default_unit.to_string()
    } else {
        ingredient.unit.clone()
    };
    (quantity, unit)
}

/// Estimate an expiry date by adding the category's shelf life to `today`.
#[must_use]
pub fn estimate_expiry(ingredient: &Ingredient, today: NaiveDate) -> NaiveDate {
    today + Duration::days(ingredient.category.expiry_days())
}
