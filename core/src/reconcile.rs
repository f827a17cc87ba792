//! Merges a batch of recognized ingredient observations into a user's
//! existing inventory. One call is one transaction: the run either commits
//! as a whole, rolls back, or is skipped entirely by the idempotency guard.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use log::{debug, warn};

use crate::db::{Database, is_transient_store_error};
use crate::matcher::{IngredientMatcher, MatcherConfig};
use crate::models::{
    Ingredient, NewUserIngredient, RecognizedCandidate, ReconcileReport, validate_candidate,
};
use crate::resolve::{estimate_expiry, resolve_quantity};

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Candidates below this confidence are skipped before matching.
    pub min_confidence: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
        }
    }
}

const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Reconcile one recognition batch into the user's inventory.
///
/// Validation failures return `Err` before any transaction opens. Everything
/// else lands in the returned report: a transient store conflict retries the
/// whole transaction once, and a run that still fails is reported through
/// `errors` with the partial counters gathered before the rollback.
pub fn reconcile(
    db: &Database,
    user_id: i64,
    batch: &[RecognizedCandidate],
    source_batch_id: &str,
    matcher_config: &MatcherConfig,
    config: &ReconcileConfig,
    today: NaiveDate,
) -> Result<ReconcileReport> {
    if user_id <= 0 {
        bail!("A valid user is required");
    }
    if source_batch_id.trim().is_empty() {
        bail!("A source batch id is required");
    }
    for candidate in batch {
        validate_candidate(candidate)?;
    }

    let mut attempt = 0;
    loop {
        let mut report = ReconcileReport {
            total_recognized: batch.len(),
            ..ReconcileReport::default()
        };
        match db.with_transaction(|db| {
            run(
                db,
                user_id,
                batch,
                source_batch_id,
                matcher_config,
                config,
                today,
                &mut report,
            )
        }) {
            Ok(()) => return Ok(report),
            Err(e) => {
                if attempt == 0 && is_transient_store_error(&e) {
                    attempt += 1;
                    warn!("transient store conflict during reconcile, retrying once: {e:#}");
                    std::thread::sleep(RETRY_DELAY);
                    continue;
                }
                report.errors.push(format!("reconcile failed: {e:#}"));
                return Ok(report);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    db: &Database,
    user_id: i64,
    batch: &[RecognizedCandidate],
    source_batch_id: &str,
    matcher_config: &MatcherConfig,
    config: &ReconcileConfig,
    today: NaiveDate,
    report: &mut ReconcileReport,
) -> Result<()> {
    // Idempotency guard: a batch that already left its mark is a no-op.
    if db.has_source_batch(user_id, source_batch_id)? {
        report.already_processed = true;
        return Ok(());
    }

    let confident: Vec<&RecognizedCandidate> = batch
        .iter()
        .filter(|c| {
            if c.confidence >= config.min_confidence {
                true
            } else {
                debug!(
                    "skipping '{}' below confidence threshold ({:.2} < {:.2})",
                    c.name, c.confidence, config.min_confidence
                );
                report.skipped_low_confidence += 1;
                false
            }
        })
        .collect();

    let names: Vec<String> = confident.iter().map(|c| c.name.clone()).collect();
    let mut matcher = IngredientMatcher::new(db, matcher_config.clone());
    let matches = matcher.match_batch(&names)?;

    // Aggregate observations per ingredient so one candidate seen twice
    // merges within the batch instead of violating the merge-key invariant.
    let mut observed: HashMap<i64, (Ingredient, f64, String)> = HashMap::new();
    for candidate in &confident {
        match matches.get(&candidate.name).and_then(Clone::clone) {
            Some(result) => {
                report.successful_conversions += 1;
                let (quantity, unit) = resolve_quantity(&result.ingredient);
                observed
                    .entry(result.ingredient.id)
                    .and_modify(|(_, total, _)| *total += quantity)
                    .or_insert((result.ingredient, quantity, unit));
            }
            None => {
                report.unmatched_ingredients += 1;
            }
        }
    }

    let mut pending_inserts: Vec<NewUserIngredient> = Vec::new();
    for (ingredient, quantity, unit) in observed.into_values() {
        if let Err(e) = merge_observation(
            db,
            user_id,
            &ingredient,
            quantity,
            &unit,
            source_batch_id,
            today,
            report,
            &mut pending_inserts,
        ) {
            // Store-level conflicts abort the transaction (and trigger the
            // caller's single retry); anything else is recorded per
            // ingredient and the batch continues.
            if is_transient_store_error(&e) {
                return Err(e);
            }
            report
                .errors
                .push(format!("failed to reconcile '{}': {e:#}", ingredient.name));
        }
    }

    db.insert_user_ingredients(&pending_inserts)?;
    Ok(())
}

/// Apply the merge rule for one aggregated observation, in order: a same-unit
/// row with no expiry date absorbs the quantity and gets dated (it was "not
/// yet dated" and is dated on this sighting); a same-unit row with the same
/// fresh expiry absorbs the quantity; otherwise a new row is queued.
#[allow(clippy::too_many_arguments)]
fn merge_observation(
    db: &Database,
    user_id: i64,
    ingredient: &Ingredient,
    quantity: f64,
    unit: &str,
    source_batch_id: &str,
    today: NaiveDate,
    report: &mut ReconcileReport,
    pending_inserts: &mut Vec<NewUserIngredient>,
) -> Result<()> {
    let expiry = estimate_expiry(ingredient, today);
    let rows = db.available_rows(user_id, ingredient.id)?;

    if let Some(undated) = rows
        .iter()
        .find(|r| r.unit == unit && r.expiry_date.is_none())
    {
        db.merge_into_row(undated.id, quantity, Some(expiry))?;
        report.duplicate_updates += 1;
        return Ok(());
    }

    if let Some(same_expiry) = rows
        .iter()
        .find(|r| r.unit == unit && r.expiry_date == Some(expiry))
    {
        db.merge_into_row(same_expiry.id, quantity, None)?;
        report.duplicate_updates += 1;
        return Ok(());
    }

    pending_inserts.push(NewUserIngredient {
        user_id,
        ingredient_id: ingredient.id,
        quantity,
        unit: unit.to_string(),
        expiry_date: Some(expiry),
        source_batch_id: Some(source_batch_id.to_string()),
    });
    report.new_ingredients += 1;
    Ok(())
}
