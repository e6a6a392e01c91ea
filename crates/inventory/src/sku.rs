//! SKU normalization and per-source reverse lookup maps.
//!
//! Two canonical keys are derived from every raw SKU:
//! - **strict**: trimmed and lower-cased, separators preserved (`" ABC-1 "` → `"abc-1"`)
//! - **loose**: strict key with everything outside `[a-z0-9]` removed (`"abc-1"` → `"abc1"`)

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use stockrecon_core::{DomainError, DomainResult};

use crate::item::{InventoryItem, InventorySnapshot, SourceSide};

/// Case-insensitive key; separators are significant.
pub fn normalize_strict(sku: &str) -> String {
    sku.trim().to_lowercase()
}

/// Case- and separator-insensitive key.
pub fn normalize_loose(sku: &str) -> String {
    normalize_strict(sku)
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// What to do when two SKUs of the same source normalize to the same key.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Keep the first-seen SKU; later colliding SKUs drop out of that key.
    #[default]
    FirstWins,
    /// Fold colliding SKUs into the first entry, summing quantities.
    Merge,
    /// Refuse to reconcile a source whose SKUs collide.
    Reject,
}

impl FromStr for CollisionPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "first_wins" => Ok(Self::FirstWins),
            "merge" => Ok(Self::Merge),
            "reject" => Ok(Self::Reject),
            other => Err(DomainError::validation(format!(
                "unknown collision policy '{other}' (expected first_wins, merge or reject)"
            ))),
        }
    }
}

/// Which of the two normalized maps a key belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Strict,
    Loose,
}

/// Two SKUs of one source that normalize to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuCollision {
    pub side: SourceSide,
    pub kind: KeyKind,
    pub key: String,
    pub kept_sku: String,
    pub colliding_sku: String,
}

impl SkuCollision {
    fn into_error(self) -> DomainError {
        DomainError::conflict(format!(
            "source {} SKUs '{}' and '{}' share {} key '{}'",
            self.side,
            self.kept_sku,
            self.colliding_sku,
            match self.kind {
                KeyKind::Strict => "strict",
                KeyKind::Loose => "loose",
            },
            self.key
        ))
    }
}

/// Entry of a normalized map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedItem {
    /// Spelling of the first SKU that claimed the key.
    pub original_sku: String,
    pub product_name: String,
    pub quantity: u64,
    /// Every raw SKU represented by this entry (more than one only under `Merge`).
    pub members: Vec<String>,
}

impl IndexedItem {
    fn from_item(item: &InventoryItem) -> Self {
        Self {
            original_sku: item.sku.clone(),
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            members: vec![item.sku.clone()],
        }
    }

    fn absorb(&mut self, item: &InventoryItem) {
        self.quantity = self.quantity.saturating_add(item.quantity);
        self.members.push(item.sku.clone());
    }
}

/// Reverse lookup maps for one source.
///
/// `loose` only holds SKUs whose loose key differs from their strict key; a
/// separator-free SKU is reachable through `strict` under the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedIndex {
    side: SourceSide,
    strict: BTreeMap<String, IndexedItem>,
    loose: BTreeMap<String, IndexedItem>,
    collisions: Vec<SkuCollision>,
}

impl NormalizedIndex {
    /// Index a snapshot in fetch order.
    ///
    /// SKUs that normalize to an empty key are left out; they can only end up source-only.
    pub fn build(snapshot: &InventorySnapshot, policy: CollisionPolicy) -> DomainResult<Self> {
        let side = snapshot.side();
        let mut strict: BTreeMap<String, IndexedItem> = BTreeMap::new();
        let mut loose: BTreeMap<String, IndexedItem> = BTreeMap::new();
        let mut collisions: Vec<SkuCollision> = Vec::new();

        for item in snapshot.iter() {
            let strict_key = normalize_strict(&item.sku);
            if strict_key.is_empty() {
                continue;
            }
            let loose_key = normalize_loose(&item.sku);

            if let Some(existing) = strict.get_mut(&strict_key) {
                let collision = SkuCollision {
                    side,
                    kind: KeyKind::Strict,
                    key: strict_key.clone(),
                    kept_sku: existing.original_sku.clone(),
                    colliding_sku: item.sku.clone(),
                };
                match policy {
                    CollisionPolicy::FirstWins => {}
                    CollisionPolicy::Merge => {
                        existing.absorb(item);
                        // Same strict key implies same loose key; keep the loose twin in step.
                        if let Some(twin) = loose.get_mut(&loose_key) {
                            if twin.original_sku == collision.kept_sku {
                                twin.absorb(item);
                            }
                        }
                    }
                    CollisionPolicy::Reject => return Err(collision.into_error()),
                }
                collisions.push(collision);
                continue;
            }

            strict.insert(strict_key.clone(), IndexedItem::from_item(item));

            if loose_key == strict_key || loose_key.is_empty() {
                continue;
            }

            if let Some(existing) = loose.get_mut(&loose_key) {
                let collision = SkuCollision {
                    side,
                    kind: KeyKind::Loose,
                    key: loose_key,
                    kept_sku: existing.original_sku.clone(),
                    colliding_sku: item.sku.clone(),
                };
                match policy {
                    CollisionPolicy::FirstWins => {}
                    CollisionPolicy::Merge => existing.absorb(item),
                    CollisionPolicy::Reject => return Err(collision.into_error()),
                }
                collisions.push(collision);
                continue;
            }

            loose.insert(loose_key, IndexedItem::from_item(item));
        }

        Ok(Self {
            side,
            strict,
            loose,
            collisions,
        })
    }

    pub fn side(&self) -> SourceSide {
        self.side
    }

    pub fn strict(&self) -> &BTreeMap<String, IndexedItem> {
        &self.strict
    }

    pub fn loose(&self) -> &BTreeMap<String, IndexedItem> {
        &self.loose
    }

    pub fn collisions(&self) -> &[SkuCollision] {
        &self.collisions
    }

    /// Candidate for a loose key: the loose map first, then a strict entry whose key is already loose.
    pub fn lookup_loose(&self, key: &str) -> Option<&IndexedItem> {
        self.loose.get(key).or_else(|| self.strict.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snapshot(side: SourceSide, items: &[(&str, u64)]) -> InventorySnapshot {
        InventorySnapshot::from_items(
            side,
            items.iter().map(|(sku, qty)| InventoryItem::new(*sku, "Item", *qty)),
        )
    }

    #[test]
    fn strict_is_case_insensitive_and_trims() {
        assert_eq!(normalize_strict("ABC-1"), normalize_strict("abc-1"));
        assert_eq!(normalize_strict("  Abc-1\t"), "abc-1");
    }

    #[test]
    fn loose_ignores_separators() {
        assert_eq!(normalize_loose("QB-TOWELS"), "qbtowels");
        assert_eq!(normalize_loose("QBTowels"), "qbtowels");
        assert_eq!(normalize_loose("qb_towels / 2"), "qbtowels2");
    }

    #[test]
    fn loose_entries_only_for_skus_with_separators() {
        let snap = snapshot(SourceSide::A, &[("QB-TOWELS", 5), ("PLAIN1", 2)]);
        let index = NormalizedIndex::build(&snap, CollisionPolicy::FirstWins).unwrap();

        assert_eq!(index.strict().len(), 2);
        assert_eq!(index.loose().len(), 1);
        assert!(index.loose().contains_key("qbtowels"));
        assert_eq!(index.lookup_loose("plain1").unwrap().original_sku, "PLAIN1");
    }

    #[test]
    fn first_wins_keeps_first_and_records_collision() {
        let snap = snapshot(SourceSide::B, &[("abc", 1), ("ABC", 7)]);
        let index = NormalizedIndex::build(&snap, CollisionPolicy::FirstWins).unwrap();

        let entry = index.strict().get("abc").unwrap();
        assert_eq!(entry.original_sku, "abc");
        assert_eq!(entry.quantity, 1);
        assert_eq!(entry.members, vec!["abc".to_string()]);
        assert_eq!(index.collisions().len(), 1);
        assert_eq!(index.collisions()[0].colliding_sku, "ABC");
    }

    #[test]
    fn loose_collision_keeps_strict_entry_of_later_sku() {
        let snap = snapshot(SourceSide::A, &[("A-B", 1), ("A_B", 2)]);
        let index = NormalizedIndex::build(&snap, CollisionPolicy::FirstWins).unwrap();

        assert!(index.strict().contains_key("a-b"));
        assert!(index.strict().contains_key("a_b"));
        assert_eq!(index.loose().get("ab").unwrap().original_sku, "A-B");
        assert_eq!(index.collisions()[0].kind, KeyKind::Loose);
    }

    #[test]
    fn merge_sums_quantities_in_both_maps() {
        let snap = snapshot(SourceSide::A, &[("Ab-1", 2), ("AB-1", 3)]);
        let index = NormalizedIndex::build(&snap, CollisionPolicy::Merge).unwrap();

        let strict = index.strict().get("ab-1").unwrap();
        assert_eq!(strict.quantity, 5);
        assert_eq!(strict.members.len(), 2);
        assert_eq!(index.loose().get("ab1").unwrap().quantity, 5);
    }

    #[test]
    fn reject_fails_on_first_collision() {
        let snap = snapshot(SourceSide::A, &[("x-1", 2), ("X-1", 3)]);
        let err = NormalizedIndex::build(&snap, CollisionPolicy::Reject).unwrap_err();
        match err {
            DomainError::Conflict(msg) => assert!(msg.contains("'x-1' and 'X-1'")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn blank_skus_are_not_indexed() {
        let snap = snapshot(SourceSide::A, &[("   ", 2), ("--", 1)]);
        let index = NormalizedIndex::build(&snap, CollisionPolicy::FirstWins).unwrap();
        assert!(index.strict().get("").is_none());
        assert!(index.loose().is_empty());
    }

    #[test]
    fn collision_policy_parses_from_config_strings() {
        assert_eq!("first-wins".parse::<CollisionPolicy>().unwrap(), CollisionPolicy::FirstWins);
        assert_eq!("MERGE".parse::<CollisionPolicy>().unwrap(), CollisionPolicy::Merge);
        assert!("sometimes".parse::<CollisionPolicy>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: normalization is idempotent and ignores case.
        #[test]
        fn normalization_is_idempotent(sku in "[ a-zA-Z0-9_/.-]{0,24}") {
            let strict = normalize_strict(&sku);
            prop_assert_eq!(normalize_strict(&strict), strict.clone());
            prop_assert_eq!(normalize_strict(&sku.to_uppercase()), strict);

            let loose = normalize_loose(&sku);
            prop_assert_eq!(normalize_loose(&loose), loose.clone());
            prop_assert!(loose.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }
}
