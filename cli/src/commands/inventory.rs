use std::path::Path;

use anyhow::{Context, Result};
use uuid::Uuid;

use pantry_core::models::{InventoryStatus, RecognizedCandidate};
use pantry_core::service::PantryService;

use super::helpers::print_inventory_table;

pub fn cmd_inventory_list(service: &PantryService, user: i64, all: bool, json: bool) -> Result<()> {
    let status = if all {
        None
    } else {
        Some(InventoryStatus::Available)
    };
    let rows = service.list_inventory(user, status)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("Inventory is empty.");
        return Ok(());
    }
    print_inventory_table(&rows);
    Ok(())
}

pub fn cmd_inventory_reconcile(
    service: &PantryService,
    path: &Path,
    user: i64,
    batch_id: Option<String>,
    json: bool,
) -> Result<()> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let batch: Vec<RecognizedCandidate> =
        serde_json::from_str(&data).context("Invalid recognition JSON")?;

    let batch_id = batch_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let report = service.reconcile_batch(user, &batch, &batch_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.already_processed {
        println!("Batch '{batch_id}' was already reconciled — nothing to do.");
        return Ok(());
    }

    println!("Reconcile complete (batch {batch_id}).\n");
    println!("  Recognized:       {}", report.total_recognized);
    println!("  Converted:        {}", report.successful_conversions);
    println!("  Low confidence:   {}", report.skipped_low_confidence);
    println!("  Unmatched:        {}", report.unmatched_ingredients);
    println!("  Merged into rows: {}", report.duplicate_updates);
    println!("  New rows:         {}", report.new_ingredients);
    for err in &report.errors {
        eprintln!("  error: {err}");
    }
    Ok(())
}

pub fn cmd_inventory_mark(service: &PantryService, id: i64, used: bool, json: bool) -> Result<()> {
    let status = if used {
        InventoryStatus::Used
    } else {
        InventoryStatus::Expired
    };
    let updated = service.mark_inventory(id, status)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "id": id, "status": status.as_str(), "updated": updated })
        );
    } else if updated {
        println!("Marked row {id} as {}.", status.as_str());
    } else {
        println!("No inventory row with ID {id}.");
    }
    Ok(())
}

pub fn cmd_inventory_remove(service: &PantryService, id: i64, json: bool) -> Result<()> {
    let removed = service.remove_inventory(id)?;

    if json {
        println!("{}", serde_json::json!({ "id": id, "removed": removed }));
    } else if removed {
        println!("Removed row {id}.");
    } else {
        println!("No inventory row with ID {id}.");
    }
    Ok(())
}
