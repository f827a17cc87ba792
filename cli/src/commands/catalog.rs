use anyhow::Result;

use pantry_core::service::PantryService;

use super::helpers::{parse_category, print_ingredient_table};

pub fn cmd_catalog_add(
    service: &PantryService,
    name: &str,
    category: &str,
    unit: &str,
    json: bool,
) -> Result<()> {
    let category = parse_category(category)?;
    let ingredient = service.add_ingredient(name, category, unit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredient)?);
    } else {
        println!(
            "Added '{}' (id {}, {}{})",
            ingredient.name,
            ingredient.id,
            ingredient.category.as_str(),
            if ingredient.unit.is_empty() {
                String::new()
            } else {
                format!(", unit {}", ingredient.unit)
            }
        );
    }
    Ok(())
}

pub fn cmd_catalog_list(service: &PantryService, search: Option<&str>, json: bool) -> Result<()> {
    let ingredients = service.list_ingredients(search)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredients)?);
        return Ok(());
    }

    if ingredients.is_empty() {
        println!("No ingredients found.");
        return Ok(());
    }
    print_ingredient_table(&ingredients);
    Ok(())
}
