//! Source A: the ERP product catalogue.
//!
//! Two endpoints are involved. The search endpoint pages through stock-tracked
//! products (positional rows, 1-indexed `firstResult` offset). The
//! availability endpoint is then queried in batches of ids for on-hand totals.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use stockrecon_inventory::{InventoryItem, InventorySnapshot, SourceSide};

use crate::config::{ErpConfig, FetchSettings};

use super::http::{SourceAuth, SourceHttpClient};
use super::{FetchError, InventorySource, ParseError, SnapshotBuilder, coerce_quantity, scalar_to_string};

/// Ids per availability request.
pub const AVAILABILITY_BATCH_SIZE: usize = 50;

const SEARCH_PATH: &str = "/api/v1/products/search";
const AVAILABILITY_PATH: &str = "/api/v1/products/availability";
const STOCK_TRACKED_FILTER: &str = "stockTracked eq true";

const COL_ID: usize = 0;
const COL_NAME: usize = 1;
const COL_SKU: usize = 2;
const COL_STOCK_TRACKED: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    meta_data: SearchMeta,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchMeta {
    #[serde(default)]
    more_pages_available: bool,
}

#[derive(Debug, Deserialize)]
struct Availability {
    #[serde(default)]
    total: Option<AvailabilityTotal>,
}

#[derive(Debug, Deserialize)]
struct AvailabilityTotal {
    #[serde(default, rename = "inStock")]
    in_stock: Value,
}

/// A stock-tracked product from the search endpoint, before quantities are known.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CatalogueEntry {
    id: String,
    name: String,
    sku: String,
}

pub struct ErpSource {
    http: SourceHttpClient,
    config: ErpConfig,
    max_pages: u32,
}

impl ErpSource {
    pub fn new(config: ErpConfig, settings: &FetchSettings) -> Result<Self, FetchError> {
        let http = SourceHttpClient::new(settings, SourceAuth::Bearer(config.api_token.clone()))?;
        Ok(Self {
            http,
            config,
            max_pages: settings.max_pages,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn fetch_catalogue(&self, cancel: &CancellationToken) -> Result<Vec<CatalogueEntry>, FetchError> {
        let url = self.url(SEARCH_PATH);
        let page_size = self.config.page_size;
        let mut seen_ids = HashSet::new();
        let mut entries = Vec::new();

        for page in 0..self.max_pages {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let first_result = u64::from(page) * u64::from(page_size) + 1;
            let query = [
                ("pageSize", page_size.to_string()),
                ("firstResult", first_result.to_string()),
                ("filter", STOCK_TRACKED_FILTER.to_string()),
            ];
            let body: SearchPage = self.http.get_json(&url, &query, cancel).await?;

            let rows = body.data.len();
            for row in &body.data {
                let Some(entry) = parse_row(row, &url)? else {
                    continue;
                };
                if seen_ids.insert(entry.id.clone()) {
                    entries.push(entry);
                }
            }

            debug!(source = "erp", page = page + 1, rows, "fetched search page");

            if rows == 0 || !body.meta_data.more_pages_available {
                return Ok(entries);
            }
        }

        warn!(
            source = "erp",
            max_pages = self.max_pages,
            "page cap reached while more pages were reported; stopping pagination"
        );
        Ok(entries)
    }

    async fn fetch_availability(
        &self,
        ids: &[&str],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, u64>, FetchError> {
        let url = self.url(AVAILABILITY_PATH);
        let mut quantities = HashMap::with_capacity(ids.len());

        for batch in ids.chunks(AVAILABILITY_BATCH_SIZE) {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let query = [("ids", batch.join(","))];
            let body: HashMap<String, Availability> = self.http.get_json(&url, &query, cancel).await?;

            for (id, availability) in body {
                let in_stock = availability
                    .total
                    .map(|t| t.in_stock)
                    .unwrap_or(Value::Null);
                let quantity = coerce_quantity(&in_stock, &id, &url)?;
                quantities.insert(id, quantity);
            }
        }

        Ok(quantities)
    }
}

/// Interpret one positional search row.
///
/// Returns `None` for rows that are not stock tracked or have no SKU.
fn parse_row(row: &[Value], endpoint: &str) -> Result<Option<CatalogueEntry>, ParseError> {
    if row.len() <= COL_STOCK_TRACKED {
        return Err(ParseError::new(
            endpoint,
            format!("search row has {} columns, expected at least {}", row.len(), COL_STOCK_TRACKED + 1),
        ));
    }

    let id = scalar_to_string(&row[COL_ID])
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ParseError::new(endpoint, format!("product id is not a scalar: {}", row[COL_ID])))?;

    if !is_truthy(&row[COL_STOCK_TRACKED]) {
        return Ok(None);
    }

    let sku = match &row[COL_SKU] {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => scalar_to_string(other).unwrap_or_default(),
    };
    if sku.is_empty() {
        return Ok(None);
    }

    let name = match &row[COL_NAME] {
        Value::String(s) => s.clone(),
        _ => String::new(),
    };

    Ok(Some(CatalogueEntry { id, name, sku }))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

#[async_trait]
impl InventorySource for ErpSource {
    fn side(&self) -> SourceSide {
        SourceSide::A
    }

    fn name(&self) -> &str {
        "erp"
    }

    #[instrument(skip(self, cancel), fields(source = "erp"), err)]
    async fn fetch(&self, cancel: &CancellationToken) -> Result<InventorySnapshot, FetchError> {
        let catalogue = self.fetch_catalogue(cancel).await?;
        let ids: Vec<&str> = catalogue.iter().map(|e| e.id.as_str()).collect();
        let quantities = self.fetch_availability(&ids, cancel).await?;

        let mut builder = SnapshotBuilder::new(SourceSide::A);
        for entry in catalogue {
            let quantity = quantities.get(&entry.id).copied().unwrap_or(0);
            let id = entry.id;
            builder.push(&id, InventoryItem::new(entry.sku, entry.name, quantity));
        }

        let snapshot = builder.finish();
        info!(source = "erp", items = snapshot.len(), "snapshot fetched");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: Value, name: &str, sku: Value, tracked: Value) -> Vec<Value> {
        vec![id, json!(name), sku, json!(null), json!(null), json!(null), json!(null), json!(null), tracked]
    }

    #[test]
    fn parses_positional_rows() {
        let entry = parse_row(&row(json!(7), "Towels", json!("QB-TOWELS"), json!(true)), "e")
            .unwrap()
            .unwrap();
        assert_eq!(
            entry,
            CatalogueEntry {
                id: "7".to_string(),
                name: "Towels".to_string(),
                sku: "QB-TOWELS".to_string(),
            }
        );
    }

    #[test]
    fn skips_untracked_and_skuless_rows() {
        assert!(parse_row(&row(json!(1), "a", json!("A"), json!(false)), "e").unwrap().is_none());
        assert!(parse_row(&row(json!(1), "a", json!("  "), json!(true)), "e").unwrap().is_none());
        assert!(parse_row(&row(json!(1), "a", json!(null), json!("true")), "e").unwrap().is_none());
        assert!(parse_row(&row(json!(1), "a", json!("A"), json!(1)), "e").unwrap().is_some());
    }

    #[test]
    fn short_rows_and_bad_ids_are_parse_errors() {
        assert!(parse_row(&[json!(1), json!("a"), json!("A")], "e").is_err());
        assert!(parse_row(&row(json!({"id": 1}), "a", json!("A"), json!(true)), "e").is_err());
    }
}
