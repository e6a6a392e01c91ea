use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::item::InventorySnapshot;
use crate::matcher::{Discrepancy, MatchOutcome, SourceOnly};
use crate::sku::SkuCollision;

/// Order discrepancies by absolute difference, largest first.
///
/// The sort is stable: equal magnitudes keep the order the matcher produced them in.
pub fn rank_discrepancies(mut discrepancies: Vec<Discrepancy>) -> Vec<Discrepancy> {
    discrepancies.sort_by_key(|d| std::cmp::Reverse(d.difference.unsigned_abs()));
    discrepancies
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItemCounts {
    pub source_a: usize,
    pub source_b: usize,
}

impl SourceItemCounts {
    pub fn of(a: &InventorySnapshot, b: &InventorySnapshot) -> Self {
        Self {
            source_a: a.len(),
            source_b: b.len(),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    pub exact_matches: usize,
    /// Pairs (exact or not) found by the strict phase.
    pub strict_matches: usize,
    /// Pairs (exact or not) found by the loose phase.
    pub loose_matches: usize,
    /// Raw SKUs suppressed by the ignore list.
    pub ignored: usize,
}

/// Result of one reconciliation run.
///
/// `discrepancies` is always the full ranked list; channels that need a
/// bounded view use [`DiscrepancyReport::top`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub date: NaiveDate,
    pub total_discrepancies: usize,
    pub discrepancies: Vec<Discrepancy>,
    pub source_item_counts: SourceItemCounts,
    pub match_stats: MatchStats,
    #[serde(default)]
    pub source_only_a: Vec<SourceOnly>,
    #[serde(default)]
    pub source_only_b: Vec<SourceOnly>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collisions: Vec<SkuCollision>,
}

impl DiscrepancyReport {
    pub fn assemble(date: NaiveDate, outcome: MatchOutcome, counts: SourceItemCounts) -> Self {
        let match_stats = MatchStats {
            exact_matches: outcome.exact_matches.len(),
            strict_matches: outcome.strict_pairs,
            loose_matches: outcome.loose_pairs,
            ignored: outcome.ignored_count(),
        };
        let discrepancies = rank_discrepancies(outcome.discrepancies);

        Self {
            date,
            total_discrepancies: discrepancies.len(),
            discrepancies,
            source_item_counts: counts,
            match_stats,
            source_only_a: outcome.source_only_a,
            source_only_b: outcome.source_only_b,
            collisions: outcome.collisions,
        }
    }

    /// The `max` largest discrepancies (the whole list if it is shorter).
    pub fn top(&self, max: usize) -> &[Discrepancy] {
        &self.discrepancies[..self.discrepancies.len().min(max)]
    }

    pub fn has_discrepancies(&self) -> bool {
        self.total_discrepancies > 0
    }
}
