use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Which system of record an item came from.
///
/// `A` is the ERP (product master + availability), `B` the warehouse system.
/// Display and naming preferences favour `A`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceSide {
    A,
    B,
}

impl SourceSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSide::A => "A",
            SourceSide::B => "B",
        }
    }
}

impl core::fmt::Display for SourceSide {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inventory line as reported by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Raw SKU exactly as the source spells it.
    pub sku: String,
    pub product_name: String,
    pub quantity: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

impl InventoryItem {
    pub fn new(sku: impl Into<String>, product_name: impl Into<String>, quantity: u64) -> Self {
        Self {
            sku: sku.into(),
            product_name: product_name.into(),
            quantity,
            brand: None,
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }
}

/// Complete inventory of one source for one run.
///
/// Raw SKUs are unique within a snapshot. Items keep the order in which the
/// source returned them; "first seen" everywhere downstream means fetch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySnapshot {
    side: SourceSide,
    items: Vec<InventoryItem>,
    by_sku: HashMap<String, usize>,
}

impl InventorySnapshot {
    pub fn new(side: SourceSide) -> Self {
        Self {
            side,
            items: Vec::new(),
            by_sku: HashMap::new(),
        }
    }

    /// Build a snapshot from items in source order. Repeated raw SKUs keep the first item.
    pub fn from_items(side: SourceSide, items: impl IntoIterator<Item = InventoryItem>) -> Self {
        let mut snapshot = Self::new(side);
        for item in items {
            snapshot.insert(item);
        }
        snapshot
    }

    /// Insert an item; returns `false` (and keeps the existing item) if the raw SKU is already present.
    pub fn insert(&mut self, item: InventoryItem) -> bool {
        if self.by_sku.contains_key(&item.sku) {
            return false;
        }
        self.by_sku.insert(item.sku.clone(), self.items.len());
        self.items.push(item);
        true
    }

    pub fn side(&self) -> SourceSide {
        self.side
    }

    pub fn get(&self, sku: &str) -> Option<&InventoryItem> {
        self.by_sku.get(sku).map(|&idx| &self.items[idx])
    }

    pub fn contains(&self, sku: &str) -> bool {
        self.by_sku.contains_key(sku)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InventoryItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
