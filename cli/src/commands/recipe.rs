use std::path::Path;

use anyhow::{Context, Result};

use pantry_core::models::RecipeImport;
use pantry_core::service::PantryService;

pub fn cmd_recipe_add(service: &PantryService, path: &Path, user: i64, json: bool) -> Result<()> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let import: RecipeImport = serde_json::from_str(&data).context("Invalid recipe JSON")?;

    let recipe = service.import_recipe(user, import)?;
    let requirements = service.recipe_requirements(recipe.id)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "recipe": recipe, "ingredients": requirements })
        );
    } else {
        let linked = requirements
            .iter()
            .filter(|r| r.ingredient_id.is_some())
            .count();
        println!(
            "Imported '{}' (id {}): {} ingredients, {} linked to the catalog.",
            recipe.title,
            recipe.id,
            requirements.len(),
            linked
        );
    }
    Ok(())
}

pub fn cmd_recipe_list(service: &PantryService, user: i64, json: bool) -> Result<()> {
    let recipes = service.list_recipes(user)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    if recipes.is_empty() {
        println!("No recipes yet.");
        return Ok(());
    }
    for recipe in &recipes {
        println!("  {}  {}", recipe.id, recipe.title);
    }
    Ok(())
}

pub fn cmd_recipe_show(service: &PantryService, id: i64, json: bool) -> Result<()> {
    let recipe = service.get_recipe(id)?;
    let requirements = service.recipe_requirements(id)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "recipe": recipe, "ingredients": requirements })
        );
        return Ok(());
    }

    println!("{} (id {})", recipe.title, recipe.id);
    for req in &requirements {
        let amount = req
            .amount
            .map_or("-".to_string(), |a| format!("{a}"));
        let unit = req.unit.as_deref().unwrap_or("");
        let optional = if req.is_optional { " (optional)" } else { "" };
        println!("  {} {} {}{}", amount, unit, req.ingredient_name, optional);
    }
    Ok(())
}
