//! Inventory sources: paginated HTTP fetchers for the two systems of record
//! plus a fixed in-memory source for local wiring and tests.
//!
//! Every source produces one complete [`InventorySnapshot`] per run or fails
//! the run. Partial snapshots are never returned.

pub mod erp;
pub mod fixed;
pub mod http;
pub mod wms;

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use stockrecon_inventory::{InventoryItem, InventorySnapshot, SourceSide};

use crate::retry::{Cancelled, Retryable};

pub use erp::ErpSource;
pub use fixed::FixedSource;
pub use http::{SourceAuth, SourceHttpClient};
pub use wms::WmsSource;

/// A page (or availability batch) that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed payload from {endpoint}: {message}")]
pub struct ParseError {
    pub endpoint: String,
    pub message: String,
}

impl ParseError {
    pub fn new(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

/// Failure to obtain a complete snapshot from a source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("network error calling {url}: {message}")]
    Network { url: String, message: String },

    #[error("authentication rejected by {url} (HTTP {status})")]
    Auth { url: String, status: u16 },

    #[error("request to {url} rejected with HTTP {status}: {body}")]
    Client { url: String, status: u16, body: String },

    #[error("server error from {url} (HTTP {status})")]
    Server { url: String, status: u16 },

    #[error("could not build request for {url}: {message}")]
    Request { url: String, message: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("fetch cancelled")]
    Cancelled,
}

impl Retryable for FetchError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout { .. } | FetchError::Network { .. } | FetchError::Server { .. }
        )
    }
}

impl From<Cancelled> for FetchError {
    fn from(_: Cancelled) -> Self {
        FetchError::Cancelled
    }
}

/// One system of record.
#[async_trait]
pub trait InventorySource: Send + Sync {
    fn side(&self) -> SourceSide;

    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    async fn fetch(&self, cancel: &CancellationToken) -> Result<InventorySnapshot, FetchError>;
}

/// Render a provider id (number or string) as a comparable string.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Interpret a provider quantity.
///
/// `null`/absent counts as zero, fractions are floored and negatives clamp to
/// zero. Anything non-numeric is a parse failure.
pub(crate) fn coerce_quantity(value: &Value, sku: &str, endpoint: &str) -> Result<u64, ParseError> {
    let raw = match value {
        Value::Null => return Ok(0),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    let Some(raw) = raw.filter(|v| v.is_finite()) else {
        return Err(ParseError::new(
            endpoint,
            format!("quantity for SKU '{sku}' is not a number: {value}"),
        ));
    };

    if raw < 0.0 {
        warn!(sku = %sku, quantity = raw, "negative quantity reported, clamping to 0");
        return Ok(0);
    }

    Ok(raw.floor() as u64)
}

/// Accumulates items in fetch order, dropping provider ids already seen
/// (overlapping pages) and raw SKUs already claimed by another id.
pub(crate) struct SnapshotBuilder {
    snapshot: InventorySnapshot,
    seen_ids: HashSet<String>,
}

impl SnapshotBuilder {
    pub(crate) fn new(side: SourceSide) -> Self {
        Self {
            snapshot: InventorySnapshot::new(side),
            seen_ids: HashSet::new(),
        }
    }

    /// Whether `id` has not been seen yet; marks it seen.
    pub(crate) fn claim_id(&mut self, id: &str) -> bool {
        self.seen_ids.insert(id.to_string())
    }

    pub(crate) fn push(&mut self, id: &str, item: InventoryItem) {
        let sku = item.sku.clone();
        if !self.snapshot.insert(item) {
            warn!(
                source = %self.snapshot.side(),
                id = %id,
                sku = %sku,
                "SKU repeated under a different id, keeping the first item"
            );
        }
    }

    pub(crate) fn finish(self) -> InventorySnapshot {
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quantities_are_floored_and_clamped() {
        assert_eq!(coerce_quantity(&json!(4.9), "s", "e").unwrap(), 4);
        assert_eq!(coerce_quantity(&json!(-3), "s", "e").unwrap(), 0);
        assert_eq!(coerce_quantity(&json!(null), "s", "e").unwrap(), 0);
        assert_eq!(coerce_quantity(&json!("12"), "s", "e").unwrap(), 12);
        assert!(coerce_quantity(&json!({"n": 1}), "s", "e").is_err());
        assert!(coerce_quantity(&json!("lots"), "s", "e").is_err());
    }

    #[test]
    fn scalar_ids_compare_as_strings() {
        assert_eq!(scalar_to_string(&json!(42)).as_deref(), Some("42"));
        assert_eq!(scalar_to_string(&json!(" 42 ")).as_deref(), Some("42"));
        assert_eq!(scalar_to_string(&json!([42])), None);
    }

    #[test]
    fn transient_classification() {
        let url = "http://x".to_string();
        assert!(FetchError::Server { url: url.clone(), status: 503 }.is_transient());
        assert!(FetchError::Timeout { url: url.clone() }.is_transient());
        assert!(!FetchError::Auth { url: url.clone(), status: 401 }.is_transient());
        assert!(!FetchError::Client { url, status: 404, body: String::new() }.is_transient());
        assert!(!FetchError::Parse(ParseError::new("e", "bad")).is_transient());
    }

    #[test]
    fn builder_keeps_first_of_repeated_ids_and_skus() {
        let mut builder = SnapshotBuilder::new(SourceSide::B);
        assert!(builder.claim_id("1"));
        builder.push("1", InventoryItem::new("A", "First", 1));
        assert!(!builder.claim_id("1"));
        assert!(builder.claim_id("2"));
        builder.push("2", InventoryItem::new("A", "Second", 9));

        let snapshot = builder.finish();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("A").unwrap().quantity, 1);
    }
}
