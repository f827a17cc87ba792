//! Computes what is missing for one or more recipes given the user's current
//! inventory, and persists the result as a shopping list in one transaction.

use std::collections::HashMap;

use anyhow::{Result, bail};
use log::{debug, warn};

use crate::db::Database;
use crate::matcher::{IngredientMatcher, MatcherConfig};
use crate::models::{
    BuiltList, Ingredient, IngredientCategory, NewShoppingListItem, RecipeIngredientRequirement,
};
use crate::units::convert;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub title: Option<String>,
    pub note: Option<String>,
    /// Order items by category (fixed display order), then name. Without it
    /// items sort by name alone.
    pub group_by_category: bool,
}

/// Running totals for one catalog-matched ingredient across all recipes.
struct MatchedAgg {
    ingredient: Ingredient,
    catalog_unit: String,
    /// Requirements successfully converted into the catalog unit, summed
    /// before inventory is subtracted once at the end.
    converted_required: f64,
    /// Requirements whose unit could not be converted; passed through raw.
    unresolved: Vec<(f64, String)>,
}

/// Line item before consolidation and rounding.
struct Pending {
    ingredient_id: Option<i64>,
    name: String,
    quantity: f64,
    unit: String,
    category: Option<IngredientCategory>,
}

/// Build and persist a shopping list covering the shortages of the given
/// recipes. Validation failures are fatal and happen before the transaction;
/// resolution misses become diagnostics on the returned list.
pub fn build(
    db: &Database,
    user_id: i64,
    recipe_ids: &[i64],
    matcher_config: &MatcherConfig,
    options: &BuildOptions,
) -> Result<BuiltList> {
    if user_id <= 0 {
        bail!("A valid user is required");
    }
    if recipe_ids.is_empty() {
        bail!("At least one recipe is required");
    }

    let mut requirements: Vec<RecipeIngredientRequirement> = Vec::new();
    let mut titles: Vec<String> = Vec::new();
    for &recipe_id in recipe_ids {
        let recipe = db.get_recipe(recipe_id)?;
        if recipe.user_id != user_id {
            bail!("Recipe {recipe_id} does not belong to this user");
        }
        titles.push(recipe.title.clone());
        requirements.extend(
            db.recipe_requirements(recipe_id)?
                .into_iter()
                .filter(|r| !r.is_optional),
        );
    }
    if requirements.is_empty() {
        bail!("The selected recipes have no required ingredients");
    }

    let mut warnings: Vec<String> = Vec::new();
    let mut matcher = IngredientMatcher::new(db, matcher_config.clone());

    let mut matched: HashMap<i64, MatchedAgg> = HashMap::new();
    let mut unmatched: HashMap<(String, String), f64> = HashMap::new();

    for req in &requirements {
        let amount = req.amount.filter(|a| *a > 0.0).unwrap_or(1.0);

        // A stored ingredient reference short-circuits the matcher.
        let resolved = match req.ingredient_id {
            Some(id) => Some(db.get_ingredient_by_id(id)?),
            None => matcher
                .match_name(&req.ingredient_name)?
                .map(|m| m.ingredient),
        };

        let Some(ingredient) = resolved else {
            // No catalog record: no inventory to compare against, so the raw
            // recipe quantity and unit pass straight through, keyed by name.
            let unit = req.unit.clone().unwrap_or_else(|| "piece".to_string());
            *unmatched
                .entry((req.ingredient_name.clone(), unit))
                .or_insert(0.0) += amount;
            continue;
        };

        let catalog_unit = if ingredient.unit.trim().is_empty() {
            req.unit.clone().unwrap_or_else(|| "piece".to_string())
        } else {
            ingredient.unit.clone()
        };
        let recipe_unit = req.unit.clone().unwrap_or_else(|| catalog_unit.clone());

        let agg = matched
            .entry(ingredient.id)
            .or_insert_with(|| MatchedAgg {
                ingredient,
                catalog_unit,
                converted_required: 0.0,
                unresolved: Vec::new(),
            });

        match convert(amount, &recipe_unit, &agg.catalog_unit) {
            Some(converted) => agg.converted_required += converted,
            None => {
                warn!(
                    "cannot convert {amount} {recipe_unit} of '{}' into catalog unit '{}'",
                    agg.ingredient.name, agg.catalog_unit
                );
                warnings.push(format!(
                    "'{}': {amount} {recipe_unit} is not convertible to {}; kept as-is",
                    agg.ingredient.name, agg.catalog_unit
                ));
                agg.unresolved.push((amount, recipe_unit));
            }
        }
    }

    // Subtract inventory once per ingredient, after all recipes are summed.
    let mut pending: Vec<Pending> = Vec::new();
    for agg in matched.into_values() {
        if agg.converted_required > 0.0 {
            let mut on_hand = 0.0;
            for row in db.available_rows(user_id, agg.ingredient.id)? {
                match convert(row.quantity, &row.unit, &agg.catalog_unit) {
                    Some(v) => on_hand += v,
                    None => debug!(
                        "inventory row {} ('{}', {} {}) not convertible to '{}', ignored",
                        row.id, agg.ingredient.name, row.quantity, row.unit, agg.catalog_unit
                    ),
                }
            }
            let shortage = agg.converted_required - on_hand;
            if shortage > 0.0 {
                pending.push(Pending {
                    ingredient_id: Some(agg.ingredient.id),
                    name: agg.ingredient.name.clone(),
                    quantity: shortage,
                    unit: agg.catalog_unit.clone(),
                    category: Some(agg.ingredient.category),
                });
            }
        }
        for (quantity, unit) in agg.unresolved {
            pending.push(Pending {
                ingredient_id: Some(agg.ingredient.id),
                name: agg.ingredient.name.clone(),
                quantity,
                unit,
                category: Some(agg.ingredient.category),
            });
        }
    }
    for ((name, unit), quantity) in unmatched {
        pending.push(Pending {
            ingredient_id: None,
            name,
            quantity,
            unit,
            category: None,
        });
    }

    let items = consolidate(pending, options.group_by_category);

    let title = options
        .title
        .clone()
        .unwrap_or_else(|| format!("Shopping list: {}", titles.join(", ")));

    let (list, saved_items) = db.with_transaction(|db| {
        db.insert_shopping_list(user_id, &title, options.note.as_deref(), &items)
    })?;

    Ok(BuiltList {
        list,
        items: saved_items,
        warnings,
        unmatched_ingredients: matcher.unmatched(),
        ambiguous_matches: matcher.ambiguous(),
    })
}

/// Collapse pending items onto the `(ingredient_id or name, unit)` key,
/// round quantities, and order for display.
fn consolidate(pending: Vec<Pending>, group_by_category: bool) -> Vec<NewShoppingListItem> {
    let mut merged: HashMap<(String, String), Pending> = HashMap::new();
    for item in pending {
        let key_head = match item.ingredient_id {
            Some(id) => format!("#{id}"),
            None => item.name.to_lowercase(),
        };
        let key = (key_head, item.unit.to_lowercase());
        merged
            .entry(key)
            .and_modify(|existing| existing.quantity += item.quantity)
            .or_insert(item);
    }

    let mut items: Vec<Pending> = merged.into_values().collect();
    if group_by_category {
        // Known categories in fixed order, unrecognized last, names within
        items.sort_by(|a, b| {
            let ka = a.category.map_or(usize::MAX, IngredientCategory::display_order);
            let kb = b.category.map_or(usize::MAX, IngredientCategory::display_order);
            ka.cmp(&kb).then_with(|| a.name.cmp(&b.name))
        });
    } else {
        items.sort_by(|a, b| a.name.cmp(&b.name));
    }

    items
        .into_iter()
        .map(|p| NewShoppingListItem {
            ingredient_id: p.ingredient_id,
            ingredient_name: p.name,
            quantity: finalize_quantity(p.quantity),
            unit: p.unit,
        })
        .collect()
}

/// Zero or negative quantities coerce to one item; everything else rounds to
/// two decimals.
fn finalize_quantity(q: f64) -> f64 {
    if q <= 0.0 {
        1.0
    } else {
        (q * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewIngredient, NewUserIngredient, RequirementInput};

    fn seed(db: &Database, name: &str, category: IngredientCategory, unit: &str) -> Ingredient {
        db.insert_ingredient(&NewIngredient {
            name: name.to_string(),
            category,
            unit: unit.to_string(),
        })
        .unwrap()
    }

    fn requirement(name: &str, amount: Option<f64>, unit: Option<&str>) -> RequirementInput {
        RequirementInput::Detailed {
            name: name.to_string(),
            amount,
            unit: unit.map(String::from),
            optional: false,
        }
    }

    fn add_recipe(db: &Database, user_id: i64, title: &str, reqs: Vec<RequirementInput>) -> i64 {
        let requirements: Vec<RecipeIngredientRequirement> =
            reqs.into_iter().map(RequirementInput::into_requirement).collect();
        db.insert_recipe(user_id, title, &requirements).unwrap().id
    }

    fn build_default(db: &Database, recipe_ids: &[i64]) -> BuiltList {
        build(
            db,
            1,
            recipe_ids,
            &MatcherConfig::default(),
            &BuildOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_single_recipe_shortage() {
        let db = Database::open_in_memory().unwrap();
        let pork = seed(&db, "pork", IngredientCategory::Meat, "g");
        db.insert_user_ingredient(&NewUserIngredient {
            user_id: 1,
            ingredient_id: pork.id,
            quantity: 100.0,
            unit: "g".to_string(),
            expiry_date: None,
            source_batch_id: None,
        })
        .unwrap();

        let recipe = add_recipe(
            &db,
            1,
            "Pork stew",
            vec![requirement("pork", Some(300.0), Some("g"))],
        );
        let built = build_default(&db, &[recipe]);

        assert_eq!(built.items.len(), 1);
        let item = &built.items[0];
        assert_eq!(item.ingredient_id, Some(pork.id));
        assert!((item.quantity - 200.0).abs() < f64::EPSILON);
        assert_eq!(item.unit, "g");
        assert!(built.warnings.is_empty());
    }

    #[test]
    fn test_fully_stocked_yields_empty_list() {
        let db = Database::open_in_memory().unwrap();
        let pork = seed(&db, "pork", IngredientCategory::Meat, "g");
        db.insert_user_ingredient(&NewUserIngredient {
            user_id: 1,
            ingredient_id: pork.id,
            quantity: 500.0,
            unit: "g".to_string(),
            expiry_date: None,
            source_batch_id: None,
        })
        .unwrap();

        let recipe = add_recipe(
            &db,
            1,
            "Pork stew",
            vec![requirement("pork", Some(300.0), Some("g"))],
        );
        let built = build_default(&db, &[recipe]);
        assert!(built.items.is_empty());
    }

    #[test]
    fn test_cross_unit_inventory_subtraction() {
        let db = Database::open_in_memory().unwrap();
        let milk = seed(&db, "milk", IngredientCategory::Dairy, "ml");
        // Inventory is held in litres; the requirement is in ml
        db.insert_user_ingredient(&NewUserIngredient {
            user_id: 1,
            ingredient_id: milk.id,
            quantity: 1.0,
            unit: "l".to_string(),
            expiry_date: None,
            source_batch_id: None,
        })
        .unwrap();

        let recipe = add_recipe(
            &db,
            1,
            "Custard",
            vec![requirement("milk", Some(1500.0), Some("ml"))],
        );
        let built = build_default(&db, &[recipe]);
        assert_eq!(built.items.len(), 1);
        assert!((built.items[0].quantity - 500.0).abs() < f64::EPSILON);
        assert_eq!(built.items[0].unit, "ml");
    }

    #[test]
    fn test_multi_recipe_aggregation() {
        let db = Database::open_in_memory().unwrap();
        let onion = seed(&db, "onion", IngredientCategory::Vegetables, "piece");

        let r1 = add_recipe(
            &db,
            1,
            "Curry",
            vec![requirement("onion", Some(2.0), Some("piece"))],
        );
        let r2 = add_recipe(
            &db,
            1,
            "Soup",
            vec![requirement("onion", Some(1.0), Some("piece"))],
        );
        let built = build_default(&db, &[r1, r2]);

        assert_eq!(built.items.len(), 1);
        assert_eq!(built.items[0].ingredient_id, Some(onion.id));
        assert!((built.items[0].quantity - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregate_then_subtract_once() {
        let db = Database::open_in_memory().unwrap();
        let onion = seed(&db, "onion", IngredientCategory::Vegetables, "piece");
        db.insert_user_ingredient(&NewUserIngredient {
            user_id: 1,
            ingredient_id: onion.id,
            quantity: 2.0,
            unit: "piece".to_string(),
            expiry_date: None,
            source_batch_id: None,
        })
        .unwrap();

        // 2 + 2 required, 2 on hand: subtracting per recipe would yield 2,
        // subtracting once after summing yields 2 as well only if done right
        // (per-recipe subtraction would have produced 0 + 0).
        let r1 = add_recipe(
            &db,
            1,
            "Curry",
            vec![requirement("onion", Some(2.0), Some("piece"))],
        );
        let r2 = add_recipe(
            &db,
            1,
            "Soup",
            vec![requirement("onion", Some(2.0), Some("piece"))],
        );
        let built = build_default(&db, &[r1, r2]);

        assert_eq!(built.items.len(), 1);
        assert!((built.items[0].quantity - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_amount_is_one() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "carrot", IngredientCategory::Vegetables, "piece");
        let recipe = add_recipe(&db, 1, "Salad", vec![requirement("carrot", None, None)]);
        let built = build_default(&db, &[recipe]);
        assert_eq!(built.items.len(), 1);
        assert!((built.items[0].quantity - 1.0).abs() < f64::EPSILON);
        assert_eq!(built.items[0].unit, "piece");
    }

    #[test]
    fn test_unmatched_ingredient_passes_raw() {
        let db = Database::open_in_memory().unwrap();
        let recipe = add_recipe(
            &db,
            1,
            "Mystery dish",
            vec![requirement("dragonfruit", Some(2.0), Some("piece"))],
        );
        let built = build_default(&db, &[recipe]);

        assert_eq!(built.items.len(), 1);
        assert_eq!(built.items[0].ingredient_id, None);
        assert_eq!(built.items[0].ingredient_name, "dragonfruit");
        assert!((built.items[0].quantity - 2.0).abs() < f64::EPSILON);
        assert_eq!(built.unmatched_ingredients.len(), 1);
    }

    #[test]
    fn test_non_convertible_unit_skips_subtraction() {
        let db = Database::open_in_memory().unwrap();
        let pork = seed(&db, "pork", IngredientCategory::Meat, "g");
        // Plenty on hand, but the requirement unit cannot reach grams
        db.insert_user_ingredient(&NewUserIngredient {
            user_id: 1,
            ingredient_id: pork.id,
            quantity: 900.0,
            unit: "g".to_string(),
            expiry_date: None,
            source_batch_id: None,
        })
        .unwrap();

        let recipe = add_recipe(
            &db,
            1,
            "Roast",
            vec![requirement("pork", Some(2.0), Some("cup"))],
        );
        let built = build_default(&db, &[recipe]);

        // Raw quantity and unit pass through untouched, with a warning
        assert_eq!(built.items.len(), 1);
        assert!((built.items[0].quantity - 2.0).abs() < f64::EPSILON);
        assert_eq!(built.items[0].unit, "cup");
        assert_eq!(built.warnings.len(), 1);
    }

    #[test]
    fn test_consolidation_no_duplicate_keys() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "onion", IngredientCategory::Vegetables, "piece");
        let recipe = add_recipe(
            &db,
            1,
            "Everything soup",
            vec![
                requirement("onion", Some(1.0), Some("piece")),
                requirement("onion", Some(2.0), Some("piece")),
                requirement("starfruit", Some(1.0), None),
                requirement("starfruit", Some(2.0), None),
            ],
        );
        let built = build_default(&db, &[recipe]);

        let mut keys: Vec<(Option<i64>, String, String)> = built
            .items
            .iter()
            .map(|i| {
                (
                    i.ingredient_id,
                    i.ingredient_name.to_lowercase(),
                    i.unit.clone(),
                )
            })
            .collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total, "found duplicate (ingredient, unit) keys");
        assert_eq!(built.items.len(), 2);
    }

    #[test]
    fn test_grouped_output_follows_category_order() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "salt", IngredientCategory::Seasonings, "g");
        seed(&db, "salmon", IngredientCategory::Fish, "piece");
        seed(&db, "spinach", IngredientCategory::Vegetables, "piece");

        let recipe = add_recipe(
            &db,
            1,
            "Dinner",
            vec![
                requirement("salt", Some(10.0), Some("g")),
                requirement("salmon", Some(2.0), None),
                requirement("spinach", Some(1.0), None),
            ],
        );
        let built = build(
            &db,
            1,
            &[recipe],
            &MatcherConfig::default(),
            &BuildOptions {
                group_by_category: true,
                ..BuildOptions::default()
            },
        )
        .unwrap();

        let names: Vec<&str> = built
            .items
            .iter()
            .map(|i| i.ingredient_name.as_str())
            .collect();
        // vegetables, fish, seasonings
        assert_eq!(names, vec!["spinach", "salmon", "salt"]);
    }

    #[test]
    fn test_rounding_two_decimals() {
        let db = Database::open_in_memory().unwrap();
        let flour = seed(&db, "flour", IngredientCategory::Others, "g");
        db.insert_user_ingredient(&NewUserIngredient {
            user_id: 1,
            ingredient_id: flour.id,
            quantity: 0.333,
            unit: "g".to_string(),
            expiry_date: None,
            source_batch_id: None,
        })
        .unwrap();

        let recipe = add_recipe(
            &db,
            1,
            "Bread",
            vec![requirement("flour", Some(100.0), Some("g"))],
        );
        let built = build_default(&db, &[recipe]);
        assert_eq!(built.items.len(), 1);
        assert!((built.items[0].quantity - 99.67).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validation_errors() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "onion", IngredientCategory::Vegetables, "piece");

        // No recipes
        assert!(
            build(&db, 1, &[], &MatcherConfig::default(), &BuildOptions::default()).is_err()
        );
        // Unknown recipe
        assert!(
            build(&db, 1, &[99], &MatcherConfig::default(), &BuildOptions::default()).is_err()
        );

        // Foreign recipe
        let foreign = add_recipe(
            &db,
            2,
            "Not yours",
            vec![requirement("onion", Some(1.0), None)],
        );
        assert!(
            build(&db, 1, &[foreign], &MatcherConfig::default(), &BuildOptions::default())
                .is_err()
        );

        // Only optional ingredients
        let optional_only = db
            .insert_recipe(
                1,
                "Garnish",
                &[RecipeIngredientRequirement {
                    ingredient_id: None,
                    ingredient_name: "parsley".to_string(),
                    amount: None,
                    unit: None,
                    is_optional: true,
                }],
            )
            .unwrap();
        assert!(
            build(
                &db,
                1,
                &[optional_only.id],
                &MatcherConfig::default(),
                &BuildOptions::default()
            )
            .is_err()
        );

        // Nothing was persisted by any failed validation
        assert!(db.list_shopping_lists(1).unwrap().is_empty());
    }

    #[test]
    fn test_list_is_persisted() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "onion", IngredientCategory::Vegetables, "piece");
        let recipe = add_recipe(&db, 1, "Soup", vec![requirement("onion", Some(2.0), None)]);

        let built = build_default(&db, &[recipe]);
        let (list, items) = db.get_shopping_list(built.list.id).unwrap();
        assert_eq!(list.user_id, 1);
        assert!(list.title.contains("Soup"));
        assert_eq!(items.len(), built.items.len());
    }
}
