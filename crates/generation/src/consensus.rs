//! Merging several recovered results into one cross-validated result.
//!
//! Items are matched across results by [`normalize_name`]. An item survives
//! only if at least `min(2, number_of_results)` results reported it. Each
//! surviving item's descriptive fields are decided by plurality vote (ties go
//! to the value seen first) and its confidence is the mean over the reports.
//! Placeholder values only win a vote when no source supplied a real value.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    normalize_name, Confidence, ContentItem, Meal, Provenance, ProviderId, RecognizedIngredient,
    RecoveredResult, RecoveryStage, RequestKind, RunId, Timestamp, PLACEHOLDER,
};

/// One merged item and how many sources reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedItem {
    pub item: ContentItem,
    pub reported_by: usize,
}

/// Output of [`merge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// `None` only for the empty fallback result.
    pub kind: Option<RequestKind>,
    pub items: Vec<MergedItem>,
    /// Number of results that took part in the vote.
    pub sources: usize,
    /// Contributing providers in first-seen order.
    pub providers: Vec<ProviderId>,
    /// Weakest recovery stage among the inputs.
    pub stage: Option<RecoveryStage>,
}

impl ConsensusResult {
    /// The deterministic result for zero inputs.
    pub fn empty() -> Self {
        Self {
            kind: None,
            items: Vec::new(),
            sources: 0,
            providers: Vec::new(),
            stage: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Merged items without support counts.
    pub fn content(&self) -> Vec<ContentItem> {
        self.items.iter().map(|m| m.item.clone()).collect()
    }

    /// Converts into a [`RecoveredResult`] whose provenance lists every
    /// contributing provider. Returns `None` for the empty fallback.
    pub fn into_recovered(self, run_id: RunId) -> Option<RecoveredResult> {
        let kind = self.kind?;
        let stage = self.stage?;
        Some(RecoveredResult {
            kind,
            items: self.items.into_iter().map(|m| m.item).collect(),
            provenance: Provenance {
                providers: self.providers,
                stage,
                run_id,
                recovered_at: Timestamp::now(),
            },
        })
    }
}

/// Merges `results` into one consensus result.
///
/// Results whose kind differs from the first result's kind are ignored. Zero
/// inputs produce [`ConsensusResult::empty`].
pub fn merge(results: &[RecoveredResult]) -> ConsensusResult {
    let Some(first) = results.first() else {
        return ConsensusResult::empty();
    };
    let kind = first.kind;
    let sources: Vec<&RecoveredResult> = results
        .iter()
        .filter(|r| {
            let same = r.kind == kind;
            if !same {
                warn!(expected = %kind, found = %r.kind, "ignoring result of different kind in consensus");
            }
            same
        })
        .collect();

    let threshold = sources.len().min(2);

    // Group reports by normalized name, first-seen order, one report per source.
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&ContentItem>> = HashMap::new();
    for source in &sources {
        let mut seen_here: Vec<String> = Vec::new();
        for item in &source.items {
            let key = item.normalized_name();
            if key.is_empty() || seen_here.contains(&key) {
                continue;
            }
            seen_here.push(key.clone());
            groups
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(item);
        }
    }

    let items = order
        .iter()
        .filter_map(|key| {
            let reports = groups.get(key)?;
            if reports.len() < threshold {
                return None;
            }
            merge_reports(reports).map(|item| MergedItem {
                item,
                reported_by: reports.len(),
            })
        })
        .collect();

    let mut providers: Vec<ProviderId> = Vec::new();
    for provider in sources.iter().flat_map(|r| r.provenance.providers.iter()) {
        if !providers.contains(provider) {
            providers.push(provider.clone());
        }
    }

    ConsensusResult {
        kind: Some(kind),
        items,
        sources: sources.len(),
        providers,
        stage: sources.iter().map(|r| r.stage()).max(),
    }
}

fn merge_reports(reports: &[&ContentItem]) -> Option<ContentItem> {
    let confidence = Confidence::mean(reports.iter().map(|r| r.confidence()))?;
    let name = plurality_text(reports.iter().map(|r| r.name()))?;

    match reports.first()? {
        ContentItem::Meal(_) => {
            let meals: Vec<&Meal> = reports
                .iter()
                .filter_map(|r| match r {
                    ContentItem::Meal(m) => Some(m),
                    ContentItem::Ingredient(_) => None,
                })
                .collect();
            Some(ContentItem::Meal(Meal {
                name,
                ingredients: plurality_list(meals.iter().map(|m| &m.ingredients))?,
                instructions: plurality_list(meals.iter().map(|m| &m.instructions))?,
                prep_minutes: plurality(meals.iter().filter_map(|m| m.prep_minutes)),
                confidence,
            }))
        }
        ContentItem::Ingredient(_) => {
            let found: Vec<&RecognizedIngredient> = reports
                .iter()
                .filter_map(|r| match r {
                    ContentItem::Ingredient(i) => Some(i),
                    ContentItem::Meal(_) => None,
                })
                .collect();
            Some(ContentItem::Ingredient(RecognizedIngredient {
                name,
                category: plurality_text(found.iter().map(|i| i.category.as_str()))?,
                quantity: plurality_text(found.iter().map(|i| i.quantity.as_str()))?,
                freshness: plurality_text(found.iter().map(|i| i.freshness.as_str()))?,
                confidence,
            }))
        }
    }
}

/// Most frequent value; ties go to the value seen first.
fn plurality<T: PartialEq>(values: impl IntoIterator<Item = T>) -> Option<T> {
    let mut tally: Vec<(T, usize)> = Vec::new();
    for value in values {
        match tally.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => tally.push((value, 1)),
        }
    }
    let best = tally.iter().map(|(_, c)| *c).max()?;
    tally.into_iter().find(|(_, c)| *c == best).map(|(v, _)| v)
}

/// Plurality over case-insensitive text; the winner is reported in the form
/// it was first seen. Placeholders only win when nothing else was reported.
fn plurality_text<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let values: Vec<&str> = values.into_iter().collect();
    let real: Vec<&str> = values
        .iter()
        .copied()
        .filter(|v| *v != PLACEHOLDER)
        .collect();
    let pool = if real.is_empty() { values } else { real };

    let winner = plurality(pool.iter().map(|v| normalize_name(v)))?;
    pool.into_iter()
        .find(|v| normalize_name(v) == winner)
        .map(str::to_owned)
}

fn plurality_list<'a>(lists: impl IntoIterator<Item = &'a Vec<String>>) -> Option<Vec<String>> {
    let lists: Vec<&Vec<String>> = lists.into_iter().collect();
    let is_placeholder = |l: &Vec<String>| l.len() == 1 && l[0] == PLACEHOLDER;
    let real: Vec<&Vec<String>> = lists.iter().copied().filter(|l| !is_placeholder(l)).collect();
    let pool = if real.is_empty() { lists } else { real };
    plurality(pool).cloned()
}
