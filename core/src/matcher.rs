//! Tiered resolution of free-text names to canonical catalog records.
//!
//! Three strategies are tried in strict priority order — exact, forward
//! (prefix), partial (substring) — with an ambiguity gate at each tier so a
//! near-tie never silently picks the wrong record. Diagnostics accumulate per
//! matcher instance; construct one per recognition batch.

use std::collections::HashMap;

use anyhow::Result;
use chrono::Local;
use log::{debug, warn};
use strsim::normalized_levenshtein;

use crate::models::{
    AmbiguousRecord, Ingredient, IngredientCategory, MatchResult, MatchTier, UnmatchedRecord,
};
use crate::normalize::normalize;

/// Read side of the ingredient dictionary, plus the gated creation hook.
///
/// All keys are pre-normalized; implementations apply the same normalization
/// to their stored names (the SQLite store persists a `normalized_name`
/// column computed at insert time). An in-memory stub suffices for tests.
pub trait IngredientCatalog {
    /// Entries whose normalized name equals `key`.
    fn find_by_normalized(&self, key: &str) -> Result<Vec<Ingredient>>;
    /// Entries whose normalized name starts with `key`.
    fn find_by_normalized_prefix(&self, key: &str) -> Result<Vec<Ingredient>>;
    /// Entries whose normalized name contains `key` anywhere.
    fn find_by_normalized_contains(&self, key: &str) -> Result<Vec<Ingredient>>;
    /// Create a catalog entry (auto-creation support).
    fn create_ingredient(
        &self,
        name: &str,
        category: IngredientCategory,
        unit: &str,
    ) -> Result<Ingredient>;
}

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Minimum similarity for a partial match to count.
    pub partial_match_threshold: f64,
    /// A tier with best−second below this gap is treated as unresolved.
    pub ambiguity_gap: f64,
    /// Create a catalog entry when no tier matches.
    pub auto_create: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            partial_match_threshold: 0.6,
            ambiguity_gap: 0.1,
            auto_create: false,
        }
    }
}

const AUTO_CREATE_CONFIDENCE: f64 = 0.5;
const AUTO_CREATE_ATTEMPTS: usize = 3;

/// Resolves names against an injected catalog, accumulating unmatched and
/// ambiguous diagnostics for its own lifetime only.
pub struct IngredientMatcher<'a> {
    catalog: &'a dyn IngredientCatalog,
    config: MatcherConfig,
    unmatched: Vec<UnmatchedRecord>,
    ambiguous: Vec<AmbiguousRecord>,
}

impl<'a> IngredientMatcher<'a> {
    pub fn new(catalog: &'a dyn IngredientCatalog, config: MatcherConfig) -> Self {
        Self {
            catalog,
            config,
            unmatched: Vec::new(),
            ambiguous: Vec::new(),
        }
    }

    /// Resolve one name. `None` means no tier produced a confident match;
    /// the miss is recorded in the unmatched diagnostics.
    pub fn match_name(&mut self, name: &str) -> Result<Option<MatchResult>> {
        let key = normalize(name);
        self.match_key(name, &key)
    }

    /// Resolve a batch of names, returning a map from each original name to
    /// its result. Each input is normalized once and the catalog is queried
    /// once per distinct normalized form.
    pub fn match_batch(&mut self, names: &[String]) -> Result<HashMap<String, Option<MatchResult>>> {
        let mut by_key: HashMap<String, Option<MatchResult>> = HashMap::new();
        let mut results = HashMap::with_capacity(names.len());

        for name in names {
            let key = normalize(name);
            let resolved = match by_key.get(&key) {
                Some(cached) => cached.clone(),
                None => {
                    let fresh = self.match_key(name, &key)?;
                    by_key.insert(key, fresh.clone());
                    fresh
                }
            };
            results.insert(name.clone(), resolved);
        }
        Ok(results)
    }

    /// Snapshot of the names no tier resolved (defensive copy).
    #[must_use]
    pub fn unmatched(&self) -> Vec<UnmatchedRecord> {
        self.unmatched.clone()
    }

    /// Snapshot of the multi-candidate situations seen (defensive copy).
    #[must_use]
    pub fn ambiguous(&self) -> Vec<AmbiguousRecord> {
        self.ambiguous.clone()
    }

    fn match_key(&mut self, original: &str, key: &str) -> Result<Option<MatchResult>> {
        if key.is_empty() {
            self.record_unmatched(original, key);
            return Ok(None);
        }

        // Exact tier
        let exact = self.catalog.find_by_normalized(key)?;
        if let Some(ingredient) = self.pick_candidate(key, exact) {
            return Ok(Some(MatchResult {
                ingredient,
                confidence: 1.0,
                tier: MatchTier::Exact,
            }));
        }

        // Forward tier: key is a prefix of the entry, excluding exact hits
        // already tried above.
        let forward: Vec<Ingredient> = self
            .catalog
            .find_by_normalized_prefix(key)?
            .into_iter()
            .filter(|i| i.normalized_name != key)
            .collect();
        if let Some(ingredient) = self.pick_candidate(key, forward) {
            return Ok(Some(MatchResult {
                ingredient,
                confidence: 0.8,
                tier: MatchTier::Forward,
            }));
        }

        // Partial tier: key appears inside the entry but is not a prefix
        // (prefix hits already had their chance), and short keys are too
        // noisy to trust.
        if key.chars().count() >= 2 {
            let partial: Vec<Ingredient> = self
                .catalog
                .find_by_normalized_contains(key)?
                .into_iter()
                .filter(|i| !i.normalized_name.starts_with(key))
                .filter(|i| similarity(key, &i.normalized_name) >= self.config.partial_match_threshold)
                .collect();
            if let Some(ingredient) = self.pick_candidate(key, partial) {
                let confidence = similarity(key, &ingredient.normalized_name);
                return Ok(Some(MatchResult {
                    ingredient,
                    confidence,
                    tier: MatchTier::Partial,
                }));
            }
        }

        if self.config.auto_create {
            let ingredient = self.auto_create(original)?;
            return Ok(Some(MatchResult {
                ingredient,
                confidence: AUTO_CREATE_CONFIDENCE,
                tier: MatchTier::Exact,
            }));
        }

        self.record_unmatched(original, key);
        Ok(None)
    }

    /// Pick the winner of one tier, applying the ambiguity policy.
    ///
    /// Multiple candidates are scored against the key and sorted descending.
    /// A gap between the top two below the configured threshold leaves the
    /// tier unresolved (recorded as ambiguous); a wide enough gap accepts the
    /// top candidate but still records the situation for later review.
    fn pick_candidate(&mut self, key: &str, candidates: Vec<Ingredient>) -> Option<Ingredient> {
        match candidates.len() {
            0 => None,
            1 => candidates.into_iter().next(),
            _ => {
                let mut scored: Vec<(f64, Ingredient)> = candidates
                    .into_iter()
                    .map(|i| (similarity(key, &i.normalized_name), i))
                    .collect();
                scored.sort_by(|a, b| b.0.total_cmp(&a.0));

                self.record_ambiguous(key, &scored);

                let gap = scored[0].0 - scored[1].0;
                if gap < self.config.ambiguity_gap {
                    debug!(
                        "ambiguous tier for '{key}': best {:.3} vs second {:.3}, falling through",
                        scored[0].0, scored[1].0
                    );
                    return None;
                }
                Some(scored.swap_remove(0).1)
            }
        }
    }

    fn auto_create(&mut self, original: &str) -> Result<Ingredient> {
        let name = original.trim();
        let mut last_err = None;
        for attempt in 0..AUTO_CREATE_ATTEMPTS {
            match self
                .catalog
                .create_ingredient(name, IngredientCategory::Others, "piece")
            {
                Ok(ingredient) => return Ok(ingredient),
                Err(e) => {
                    // Lost a uniqueness race: someone else created the entry
                    // between our miss and our insert. Re-query before trying
                    // again.
                    warn!("auto-create attempt {} for '{name}' failed: {e:#}", attempt + 1);
                    let requeried = self.catalog.find_by_normalized(&normalize(name))?;
                    if let Some(existing) = requeried.into_iter().next() {
                        return Ok(existing);
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("auto-create failed for '{name}'")))
    }

    fn record_unmatched(&mut self, original: &str, key: &str) {
        self.unmatched.push(UnmatchedRecord {
            original_name: original.to_string(),
            normalized_name: key.to_string(),
            timestamp: Local::now().to_rfc3339(),
        });
    }

    fn record_ambiguous(&mut self, key: &str, scored: &[(f64, Ingredient)]) {
        self.ambiguous.push(AmbiguousRecord {
            normalized_name: key.to_string(),
            candidate_names: scored.iter().map(|(_, i)| i.name.clone()).collect(),
            timestamp: Local::now().to_rfc3339(),
        });
    }
}

/// Similarity between two normalized strings: `(max_len - edit_distance) /
/// max_len` with classic Levenshtein costs. 1.0 for identical strings, 0.0
/// when the longer one is empty.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// In-memory catalog stub: a plain vector queried with the same
    /// exact/prefix/contains semantics as the SQLite store.
    struct StubCatalog {
        entries: RefCell<Vec<Ingredient>>,
        queries: RefCell<usize>,
        fail_creates: RefCell<usize>,
    }

    impl StubCatalog {
        fn new(names: &[&str]) -> Self {
            let entries = names
                .iter()
                .enumerate()
                .map(|(i, name)| Ingredient {
                    id: i as i64 + 1,
                    name: (*name).to_string(),
                    normalized_name: normalize(name),
                    category: IngredientCategory::Others,
                    unit: String::new(),
                    created_at: String::new(),
                })
                .collect();
            Self {
                entries: RefCell::new(entries),
                queries: RefCell::new(0),
                fail_creates: RefCell::new(0),
            }
        }

        fn query_count(&self) -> usize {
            *self.queries.borrow()
        }
    }

    impl IngredientCatalog for StubCatalog {
        fn find_by_normalized(&self, key: &str) -> Result<Vec<Ingredient>> {
            *self.queries.borrow_mut() += 1;
            Ok(self
                .entries
                .borrow()
                .iter()
                .filter(|i| i.normalized_name == key)
                .cloned()
                .collect())
        }

        fn find_by_normalized_prefix(&self, key: &str) -> Result<Vec<Ingredient>> {
            *self.queries.borrow_mut() += 1;
            Ok(self
                .entries
                .borrow()
                .iter()
                .filter(|i| i.normalized_name.starts_with(key))
                .cloned()
                .collect())
        }

        fn find_by_normalized_contains(&self, key: &str) -> Result<Vec<Ingredient>> {
            *self.queries.borrow_mut() += 1;
            Ok(self
                .entries
                .borrow()
                .iter()
                .filter(|i| i.normalized_name.contains(key))
                .cloned()
                .collect())
        }

        fn create_ingredient(
            &self,
            name: &str,
            category: IngredientCategory,
            unit: &str,
        ) -> Result<Ingredient> {
            let mut failures = self.fail_creates.borrow_mut();
            if *failures > 0 {
                *failures -= 1;
                anyhow::bail!("UNIQUE constraint failed: ingredients.normalized_name");
            }
            let mut entries = self.entries.borrow_mut();
            let ingredient = Ingredient {
                id: entries.len() as i64 + 1,
                name: name.to_string(),
                normalized_name: normalize(name),
                category,
                unit: unit.to_string(),
                created_at: String::new(),
            };
            entries.push(ingredient.clone());
            Ok(ingredient)
        }
    }

    fn matcher(catalog: &StubCatalog) -> IngredientMatcher<'_> {
        IngredientMatcher::new(catalog, MatcherConfig::default())
    }

    #[test]
    fn test_exact_match() {
        let catalog = StubCatalog::new(&["tomato", "potato"]);
        let mut m = matcher(&catalog);
        let result = m.match_name("Tomato").unwrap().unwrap();
        assert_eq!(result.ingredient.name, "tomato");
        assert_eq!(result.tier, MatchTier::Exact);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_exact_wins_over_forward() {
        // "tomato" matches "tomato" exactly and is a prefix of "tomato paste";
        // tier order must pick the exact hit.
        let catalog = StubCatalog::new(&["tomato", "tomato paste"]);
        let mut m = matcher(&catalog);
        let result = m.match_name("tomato").unwrap().unwrap();
        assert_eq!(result.ingredient.name, "tomato");
        assert_eq!(result.tier, MatchTier::Exact);
    }

    #[test]
    fn test_forward_match() {
        let catalog = StubCatalog::new(&["tomato paste"]);
        let mut m = matcher(&catalog);
        let result = m.match_name("tomato").unwrap().unwrap();
        assert_eq!(result.ingredient.name, "tomato paste");
        assert_eq!(result.tier, MatchTier::Forward);
        assert!((result.confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_match() {
        // "reenonion" is inside "greenonion" but not a prefix
        let catalog = StubCatalog::new(&["green onion"]);
        let mut m = matcher(&catalog);
        let result = m.match_name("reen onion").unwrap().unwrap();
        assert_eq!(result.ingredient.name, "green onion");
        assert_eq!(result.tier, MatchTier::Partial);
        assert!(result.confidence >= 0.6);
    }

    #[test]
    fn test_partial_requires_two_chars() {
        let catalog = StubCatalog::new(&["miso"]);
        let mut m = matcher(&catalog);
        // Single-character key: "i" is a substring of "miso" but must not match
        assert!(m.match_name("i").unwrap().is_none());
        assert_eq!(m.unmatched().len(), 1);
    }

    #[test]
    fn test_partial_below_threshold_rejected() {
        // "on" is contained in "lemon" (not a prefix) but similarity 2/5 = 0.4
        let catalog = StubCatalog::new(&["lemon"]);
        let mut m = matcher(&catalog);
        assert!(m.match_name("on").unwrap().is_none());
        assert_eq!(m.unmatched().len(), 1);
    }

    #[test]
    fn test_ambiguous_tier_falls_through_to_unmatched() {
        // Two entries share the normalized key exactly: both score 1.0, the
        // gap is zero, so the exact tier must refuse to choose. No other tier
        // resolves, so the name ends up unmatched.
        let catalog = StubCatalog::new(&["ねぎ", "ネギ"]);
        let mut m = matcher(&catalog);
        let result = m.match_name("ねぎ").unwrap();
        assert!(result.is_none());
        assert_eq!(m.ambiguous().len(), 1);
        assert_eq!(m.ambiguous()[0].candidate_names.len(), 2);
        assert_eq!(m.unmatched().len(), 1);
    }

    #[test]
    fn test_ambiguous_tier_falls_through_to_next_tier() {
        // The exact tier ties on "ミソ" (hiragana and katakana spellings both
        // normalize onto it) and must refuse to choose; matching then falls
        // through and the forward tier resolves against the longer entry.
        let catalog = StubCatalog::new(&["みそ", "ミソ", "みそしる"]);
        let mut m = matcher(&catalog);
        let result = m.match_name("みそ").unwrap().unwrap();
        assert_eq!(result.tier, MatchTier::Forward);
        assert_eq!(result.ingredient.name, "みそしる");
        assert_eq!(m.ambiguous().len(), 1);
    }

    #[test]
    fn test_clear_winner_still_records_ambiguous() {
        // Forward tier with two candidates of very different lengths: the
        // short one scores far higher, wins, and the situation is still
        // logged for review.
        let catalog = StubCatalog::new(&["tomatoes", "tomato and chili relish"]);
        let mut m = matcher(&catalog);
        let result = m.match_name("tomato").unwrap().unwrap();
        assert_eq!(result.ingredient.name, "tomatoes");
        assert_eq!(result.tier, MatchTier::Forward);
        assert_eq!(m.ambiguous().len(), 1);
        assert!(m.unmatched().is_empty());
    }

    #[test]
    fn test_unmatched_recorded() {
        let catalog = StubCatalog::new(&["tomato"]);
        let mut m = matcher(&catalog);
        assert!(m.match_name("dragonfruit").unwrap().is_none());
        let unmatched = m.unmatched();
        assert_eq!(unmatched.len(), 1);
        assert_eq!(unmatched[0].original_name, "dragonfruit");
        assert_eq!(unmatched[0].normalized_name, "dragonfruit");
    }

    #[test]
    fn test_empty_name_unmatched() {
        let catalog = StubCatalog::new(&["tomato"]);
        let mut m = matcher(&catalog);
        assert!(m.match_name("  ").unwrap().is_none());
        assert_eq!(m.unmatched().len(), 1);
    }

    #[test]
    fn test_batch_dedupes_normalized_forms() {
        let catalog = StubCatalog::new(&["トマト"]);
        let mut m = matcher(&catalog);
        // Three spellings, one normalized form: the catalog must be queried
        // once (one exact hit, no further tiers).
        let names = vec![
            "トマト".to_string(),
            "とまと".to_string(),
            " とまと ".to_string(),
        ];
        let results = m.match_batch(&names).unwrap();
        assert_eq!(results.len(), 3);
        for name in &names {
            assert!(results[name].is_some(), "no match for {name}");
        }
        assert_eq!(catalog.query_count(), 1);
    }

    #[test]
    fn test_batch_mixed_hits_and_misses() {
        let catalog = StubCatalog::new(&["tomato", "onion"]);
        let mut m = matcher(&catalog);
        let names = vec!["tomato".to_string(), "durian".to_string()];
        let results = m.match_batch(&names).unwrap();
        assert!(results["tomato"].is_some());
        assert!(results["durian"].is_none());
        assert_eq!(m.unmatched().len(), 1);
    }

    #[test]
    fn test_auto_create_disabled_by_default() {
        let catalog = StubCatalog::new(&[]);
        let mut m = matcher(&catalog);
        assert!(m.match_name("yuzu").unwrap().is_none());
        assert!(catalog.entries.borrow().is_empty());
    }

    #[test]
    fn test_auto_create_enabled() {
        let catalog = StubCatalog::new(&[]);
        let mut m = IngredientMatcher::new(
            &catalog,
            MatcherConfig {
                auto_create: true,
                ..MatcherConfig::default()
            },
        );
        let result = m.match_name("yuzu").unwrap().unwrap();
        assert_eq!(result.ingredient.name, "yuzu");
        assert!((result.confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(result.ingredient.category, IngredientCategory::Others);
        assert!(m.unmatched().is_empty());
    }

    #[test]
    fn test_auto_create_retries_after_race() {
        let catalog = StubCatalog::new(&[]);
        *catalog.fail_creates.borrow_mut() = 2;
        let mut m = IngredientMatcher::new(
            &catalog,
            MatcherConfig {
                auto_create: true,
                ..MatcherConfig::default()
            },
        );
        // First two create attempts fail, re-query finds nothing, third
        // attempt succeeds.
        let result = m.match_name("yuzu").unwrap().unwrap();
        assert_eq!(result.ingredient.name, "yuzu");
    }

    #[test]
    fn test_auto_create_gives_up_after_bounded_attempts() {
        let catalog = StubCatalog::new(&[]);
        *catalog.fail_creates.borrow_mut() = 5;
        let mut m = IngredientMatcher::new(
            &catalog,
            MatcherConfig {
                auto_create: true,
                ..MatcherConfig::default()
            },
        );
        assert!(m.match_name("yuzu").is_err());
    }

    #[test]
    fn test_snapshots_are_defensive_copies() {
        let catalog = StubCatalog::new(&[]);
        let mut m = matcher(&catalog);
        m.match_name("durian").unwrap();
        let mut snapshot = m.unmatched();
        snapshot.clear();
        assert_eq!(m.unmatched().len(), 1);
    }
}
