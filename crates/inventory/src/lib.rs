//! Inventory reconciliation domain.
//!
//! This crate contains the reconciliation rules, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage):
//! snapshots → SKU normalization → matching phases → ranked report.

pub mod ignore;
pub mod item;
pub mod matcher;
pub mod report;
pub mod sku;

pub use ignore::IgnoreList;
pub use item::{InventoryItem, InventorySnapshot, SourceSide};
pub use matcher::{
    Discrepancy, ExactMatch, MatchOutcome, MatchRecord, MatchType, MatchedSkus, PhaseOutcome,
    SourceOnly, UNKNOWN_PRODUCT,
    loose_phase, match_snapshots, residual_phase, strict_phase,
};
pub use report::{DiscrepancyReport, MatchStats, SourceItemCounts, rank_discrepancies};
pub use sku::{CollisionPolicy, IndexedItem, KeyKind, NormalizedIndex, SkuCollision, normalize_loose, normalize_strict};
