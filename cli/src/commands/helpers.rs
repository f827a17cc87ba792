use anyhow::{Context, Result};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use pantry_core::models::{
    Ingredient, IngredientCategory, ShoppingListItem, UserIngredient,
};

pub(crate) fn parse_category(s: &str) -> Result<IngredientCategory> {
    IngredientCategory::parse(s).with_context(|| {
        format!(
            "Invalid category '{s}'. Must be one of: vegetables, meat, fish, dairy, seasonings, others"
        )
    })
}

pub(crate) fn print_ingredient_table(ingredients: &[Ingredient]) {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Category")]
        category: &'static str,
        #[tabled(rename = "Unit")]
        unit: String,
    }

    let rows: Vec<IngredientRow> = ingredients
        .iter()
        .map(|i| IngredientRow {
            id: i.id,
            name: truncate(&i.name, 35),
            category: i.category.as_str(),
            unit: if i.unit.is_empty() {
                "-".to_string()
            } else {
                i.unit.clone()
            },
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn print_inventory_table(rows: &[UserIngredient]) {
    #[derive(Tabled)]
    struct InventoryRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Ingredient")]
        name: String,
        #[tabled(rename = "Qty")]
        quantity: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Status")]
        status: &'static str,
        #[tabled(rename = "Expires")]
        expiry: String,
    }

    let table_rows: Vec<InventoryRow> = rows
        .iter()
        .map(|r| InventoryRow {
            id: r.id,
            name: truncate(r.ingredient_name.as_deref().unwrap_or("?"), 35),
            quantity: format!("{:.2}", r.quantity),
            unit: r.unit.clone(),
            status: r.status.as_str(),
            expiry: r
                .expiry_date
                .map_or("-".to_string(), |d| d.format("%Y-%m-%d").to_string()),
        })
        .collect();

    let table = Table::new(&table_rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_item_table(items: &[ShoppingListItem]) {
    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Item")]
        name: String,
        #[tabled(rename = "Qty")]
        quantity: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Done")]
        checked: &'static str,
        #[tabled(rename = "Ver")]
        version: i64,
    }

    let rows: Vec<ItemRow> = items
        .iter()
        .map(|i| ItemRow {
            id: i.id,
            name: truncate(&i.ingredient_name, 35),
            quantity: format!("{:.2}", i.quantity),
            unit: i.unit.clone(),
            checked: if i.is_checked { "x" } else { "" },
            version: i.version,
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
