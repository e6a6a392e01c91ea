use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use stockrecon_inventory::{InventoryItem, InventorySnapshot, SourceSide};

use super::{FetchError, InventorySource};

/// Source returning a preset snapshot (dev wiring, tests).
#[derive(Debug, Clone)]
pub struct FixedSource {
    name: String,
    snapshot: InventorySnapshot,
}

impl FixedSource {
    pub fn new(name: impl Into<String>, snapshot: InventorySnapshot) -> Self {
        Self {
            name: name.into(),
            snapshot,
        }
    }

    pub fn from_items(side: SourceSide, items: impl IntoIterator<Item = InventoryItem>) -> Self {
        Self::new(format!("fixed-{}", side.as_str().to_ascii_lowercase()), InventorySnapshot::from_items(side, items))
    }

    pub fn empty(side: SourceSide) -> Self {
        Self::from_items(side, Vec::new())
    }
}

#[async_trait]
impl InventorySource for FixedSource {
    fn side(&self) -> SourceSide {
        self.snapshot.side()
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<InventorySnapshot, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        Ok(self.snapshot.clone())
    }
}
