use anyhow::Result;

use pantry_core::db::StoreError;
use pantry_core::service::PantryService;
use pantry_core::shopping::BuildOptions;

use super::helpers::print_item_table;

#[allow(clippy::fn_params_excessive_bools)]
pub fn cmd_shopping_build(
    service: &PantryService,
    user: i64,
    recipes: &[i64],
    group: bool,
    title: Option<String>,
    note: Option<String>,
    json: bool,
) -> Result<()> {
    let options = BuildOptions {
        title,
        note,
        group_by_category: group,
    };
    let built = service.build_shopping_list(user, recipes, &options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&built)?);
        return Ok(());
    }

    println!("Created '{}' (list {}).", built.list.title, built.list.id);
    if built.items.is_empty() {
        println!("Everything is already in stock — nothing to buy.");
    } else {
        print_item_table(&built.items);
    }
    for warning in &built.warnings {
        eprintln!("  warning: {warning}");
    }
    if !built.unmatched_ingredients.is_empty() {
        let names: Vec<&str> = built
            .unmatched_ingredients
            .iter()
            .map(|u| u.original_name.as_str())
            .collect();
        eprintln!("  not in catalog: {}", names.join(", "));
    }
    Ok(())
}

pub fn cmd_shopping_show(service: &PantryService, id: i64, json: bool) -> Result<()> {
    let (list, items) = service.get_shopping_list(id)?;

    if json {
        println!("{}", serde_json::json!({ "list": list, "items": items }));
        return Ok(());
    }

    println!("{} [{}]", list.title, list.status.as_str());
    if let Some(note) = &list.note {
        println!("  {note}");
    }
    if items.is_empty() {
        println!("(empty)");
    } else {
        print_item_table(&items);
    }
    Ok(())
}

pub fn cmd_shopping_list_all(service: &PantryService, user: i64, json: bool) -> Result<()> {
    let lists = service.list_shopping_lists(user)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&lists)?);
        return Ok(());
    }

    if lists.is_empty() {
        println!("No shopping lists yet.");
        return Ok(());
    }
    for list in &lists {
        println!("  {}  {} [{}]", list.id, list.title, list.status.as_str());
    }
    Ok(())
}

pub fn cmd_shopping_check(
    service: &PantryService,
    item_id: i64,
    version: i64,
    json: bool,
) -> Result<()> {
    match service.check_list_item(item_id, version) {
        Ok(item) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&item)?);
            } else {
                println!("Checked off '{}'.", item.ingredient_name);
            }
            Ok(())
        }
        Err(e) => {
            // A stale version is a conflict the user can recover from by
            // re-reading the list, not a crash.
            if let Some(StoreError::VersionConflict { expected, actual }) =
                e.downcast_ref::<StoreError>()
            {
                if json {
                    println!(
                        "{}",
                        serde_json::json!({
                            "error": "version_conflict",
                            "expected": expected,
                            "actual": actual,
                        })
                    );
                    return Ok(());
                }
                anyhow::bail!(
                    "Item {item_id} changed since you last saw it (version {actual}, you had {expected}). Re-run 'pantry shopping show' and try again."
                );
            }
            Err(e)
        }
    }
}
