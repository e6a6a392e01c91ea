//! Identity resolution across the two sources.
//!
//! Matching runs in three phases, each a pure function returning its records
//! and the raw SKUs it settled:
//!
//! 1. `strict_phase`: strict keys present in both sources.
//! 2. `loose_phase`: loose keys present in both sources, only for SKUs the strict phase left unsettled.
//! 3. `residual_phase`: everything still unsettled becomes source-only.
//!
//! The ignore list is applied inside each phase, so a suppressed pair also
//! removes its counterpart from consideration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use stockrecon_core::DomainResult;

use crate::ignore::IgnoreList;
use crate::item::{InventorySnapshot, SourceSide};
use crate::sku::{CollisionPolicy, IndexedItem, NormalizedIndex, SkuCollision};

pub const UNKNOWN_PRODUCT: &str = "Unknown";

/// Phase that paired two SKUs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Strict,
    Loose,
}

/// Raw SKUs on each side that a pair stands for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedSkus {
    pub a: Vec<String>,
    pub b: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactMatch {
    pub sku: String,
    pub quantity: u64,
    pub match_type: MatchType,
    pub matched_skus: MatchedSkus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub display_sku: String,
    pub product_name: String,
    pub quantity_a: u64,
    pub quantity_b: u64,
    /// `quantity_a - quantity_b`.
    pub difference: i64,
    /// `|difference| / quantity_b * 100`, one decimal; `100` when `quantity_b == 0`.
    pub percentage_difference: f64,
    pub match_type: MatchType,
    pub matched_skus: MatchedSkus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOnly {
    pub sku: String,
    pub quantity: u64,
    pub source: SourceSide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchRecord {
    ExactMatch(ExactMatch),
    Discrepancy(Discrepancy),
    SourceOnly(SourceOnly),
}

/// Records produced by one phase plus the raw SKUs it took out of play.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseOutcome {
    pub records: Vec<MatchRecord>,
    pub settled_a: BTreeSet<String>,
    pub settled_b: BTreeSet<String>,
    /// Settled SKUs that were suppressed by the ignore list (subset of `settled_*`).
    pub ignored_a: BTreeSet<String>,
    pub ignored_b: BTreeSet<String>,
}

impl PhaseOutcome {
    fn settle_pair(&mut self, a: &IndexedItem, b: &IndexedItem) {
        self.settled_a.extend(a.members.iter().cloned());
        self.settled_b.extend(b.members.iter().cloned());
    }

    fn ignore_pair(&mut self, a: &IndexedItem, b: &IndexedItem) {
        self.ignored_a.extend(a.members.iter().cloned());
        self.ignored_b.extend(b.members.iter().cloned());
    }

    fn pair_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| !matches!(r, MatchRecord::SourceOnly(_)))
            .count()
    }
}

fn prefer<'a>(a: &'a str, b: &'a str) -> Option<&'a str> {
    [a, b].into_iter().find(|s| !s.trim().is_empty())
}

fn difference(quantity_a: u64, quantity_b: u64) -> i64 {
    let diff = quantity_a as i128 - quantity_b as i128;
    i64::try_from(diff).unwrap_or(if diff < 0 { i64::MIN } else { i64::MAX })
}

fn percentage_difference(difference: i64, quantity_b: u64) -> f64 {
    if quantity_b == 0 {
        return 100.0;
    }
    let pct = difference.unsigned_abs() as f64 / quantity_b as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

fn display_sku(a: &IndexedItem, b: &IndexedItem) -> String {
    prefer(&a.original_sku, &b.original_sku)
        .unwrap_or(a.original_sku.as_str())
        .to_string()
}

fn classify(a: &IndexedItem, b: &IndexedItem, match_type: MatchType) -> MatchRecord {
    let sku = display_sku(a, b);
    let matched_skus = MatchedSkus {
        a: a.members.clone(),
        b: b.members.clone(),
    };

    if a.quantity == b.quantity {
        return MatchRecord::ExactMatch(ExactMatch {
            sku,
            quantity: a.quantity,
            match_type,
            matched_skus,
        });
    }

    let difference = difference(a.quantity, b.quantity);
    MatchRecord::Discrepancy(Discrepancy {
        display_sku: sku,
        product_name: prefer(&a.product_name, &b.product_name)
            .unwrap_or(UNKNOWN_PRODUCT)
            .to_string(),
        quantity_a: a.quantity,
        quantity_b: b.quantity,
        difference,
        percentage_difference: percentage_difference(difference, b.quantity),
        match_type,
        matched_skus,
    })
}

/// Phase 1: pair every strict key present in both sources.
pub fn strict_phase(a: &NormalizedIndex, b: &NormalizedIndex, ignore: &IgnoreList) -> PhaseOutcome {
    let mut out = PhaseOutcome::default();

    for (key, entry_a) in a.strict() {
        let Some(entry_b) = b.strict().get(key) else {
            continue;
        };

        out.settle_pair(entry_a, entry_b);
        if ignore.contains(&display_sku(entry_a, entry_b)) {
            out.ignore_pair(entry_a, entry_b);
            continue;
        }
        out.records.push(classify(entry_a, entry_b, MatchType::Strict));
    }

    out
}

/// Phase 2: pair loose keys present in both sources, skipping anything already settled.
pub fn loose_phase(
    a: &NormalizedIndex,
    b: &NormalizedIndex,
    settled_a: &BTreeSet<String>,
    settled_b: &BTreeSet<String>,
    ignore: &IgnoreList,
) -> PhaseOutcome {
    let mut out = PhaseOutcome::default();

    let keys: BTreeSet<&String> = a.loose().keys().chain(b.loose().keys()).collect();

    for key in keys {
        let (Some(entry_a), Some(entry_b)) = (a.lookup_loose(key), b.lookup_loose(key)) else {
            continue;
        };

        let taken_a = entry_a
            .members
            .iter()
            .any(|sku| settled_a.contains(sku) || out.settled_a.contains(sku));
        let taken_b = entry_b
            .members
            .iter()
            .any(|sku| settled_b.contains(sku) || out.settled_b.contains(sku));
        if taken_a || taken_b {
            continue;
        }

        out.settle_pair(entry_a, entry_b);
        if ignore.contains(&display_sku(entry_a, entry_b)) {
            out.ignore_pair(entry_a, entry_b);
            continue;
        }
        out.records.push(classify(entry_a, entry_b, MatchType::Loose));
    }

    out
}

/// Phase 3: every raw SKU not settled by the pairing phases is source-only.
pub fn residual_phase(
    a: &InventorySnapshot,
    b: &InventorySnapshot,
    settled_a: &BTreeSet<String>,
    settled_b: &BTreeSet<String>,
    ignore: &IgnoreList,
) -> PhaseOutcome {
    let mut out = PhaseOutcome::default();

    for (snapshot, settled) in [(a, settled_a), (b, settled_b)] {
        for item in snapshot.iter().filter(|item| !settled.contains(&item.sku)) {
            let side = snapshot.side();
            let (settled_out, ignored_out) = match side {
                SourceSide::A => (&mut out.settled_a, &mut out.ignored_a),
                SourceSide::B => (&mut out.settled_b, &mut out.ignored_b),
            };
            settled_out.insert(item.sku.clone());
            if ignore.contains(&item.sku) {
                ignored_out.insert(item.sku.clone());
                continue;
            }
            out.records.push(MatchRecord::SourceOnly(SourceOnly {
                sku: item.sku.clone(),
                quantity: item.quantity,
                source: side,
            }));
        }
    }

    out
}

/// Everything the matcher found, grouped by record kind (phase order preserved).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    pub exact_matches: Vec<ExactMatch>,
    pub discrepancies: Vec<Discrepancy>,
    pub source_only_a: Vec<SourceOnly>,
    pub source_only_b: Vec<SourceOnly>,
    /// Pairs emitted by the strict phase (exact matches + discrepancies).
    pub strict_pairs: usize,
    /// Pairs emitted by the loose phase.
    pub loose_pairs: usize,
    /// Raw SKUs suppressed by the ignore list, per side.
    pub ignored_a: BTreeSet<String>,
    pub ignored_b: BTreeSet<String>,
    pub collisions: Vec<SkuCollision>,
}

impl MatchOutcome {
    fn from_phases(phases: [PhaseOutcome; 3], collisions: Vec<SkuCollision>) -> Self {
        let [strict, loose, residual] = phases;
        let mut outcome = Self {
            strict_pairs: strict.pair_count(),
            loose_pairs: loose.pair_count(),
            collisions,
            ..Self::default()
        };

        for phase in [strict, loose, residual] {
            outcome.ignored_a.extend(phase.ignored_a);
            outcome.ignored_b.extend(phase.ignored_b);
            for record in phase.records {
                match record {
                    MatchRecord::ExactMatch(m) => outcome.exact_matches.push(m),
                    MatchRecord::Discrepancy(d) => outcome.discrepancies.push(d),
                    MatchRecord::SourceOnly(s) if s.source == SourceSide::A => {
                        outcome.source_only_a.push(s)
                    }
                    MatchRecord::SourceOnly(s) => outcome.source_only_b.push(s),
                }
            }
        }

        outcome
    }

    pub fn ignored_count(&self) -> usize {
        self.ignored_a.len() + self.ignored_b.len()
    }
}

/// Normalize both snapshots and run the three phases.
///
/// Fails only when `policy` is `Reject` and a source has colliding SKUs.
pub fn match_snapshots(
    a: &InventorySnapshot,
    b: &InventorySnapshot,
    policy: CollisionPolicy,
    ignore: &IgnoreList,
) -> DomainResult<MatchOutcome> {
    let index_a = NormalizedIndex::build(a, policy)?;
    let index_b = NormalizedIndex::build(b, policy)?;

    let strict = strict_phase(&index_a, &index_b, ignore);
    let loose = loose_phase(&index_a, &index_b, &strict.settled_a, &strict.settled_b, ignore);

    let settled_a: BTreeSet<String> = strict.settled_a.union(&loose.settled_a).cloned().collect();
    let settled_b: BTreeSet<String> = strict.settled_b.union(&loose.settled_b).cloned().collect();
    let residual = residual_phase(a, b, &settled_a, &settled_b, ignore);

    let mut collisions = index_a.collisions().to_vec();
    collisions.extend_from_slice(index_b.collisions());

    Ok(MatchOutcome::from_phases([strict, loose, residual], collisions))
}
