//! Source B: the warehouse management system.
//!
//! Inventory is listed with 1-indexed `page`/`limit` paging and no continuation
//! flag; an empty page ends the listing. The endpoint returns every business
//! unit's records, so `lobId` is filtered client-side.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use stockrecon_inventory::{InventoryItem, InventorySnapshot, SourceSide};

use crate::config::{FetchSettings, WmsConfig};

use super::http::{SourceAuth, SourceHttpClient};
use super::{FetchError, InventorySource, ParseError, SnapshotBuilder, coerce_quantity, scalar_to_string};

const INVENTORY_PATH: &str = "/api/v1/inventory";
const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WmsRecord {
    id: Value,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    lob_id: Value,
    #[serde(default)]
    available_quantity: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    brand: Option<String>,
}

pub struct WmsSource {
    http: SourceHttpClient,
    config: WmsConfig,
    max_pages: u32,
}

impl WmsSource {
    pub fn new(config: WmsConfig, settings: &FetchSettings) -> Result<Self, FetchError> {
        let http = SourceHttpClient::new(
            settings,
            SourceAuth::ApiKey {
                header: API_KEY_HEADER,
                key: config.api_key.clone(),
            },
        )?;
        Ok(Self {
            http,
            config,
            max_pages: settings.max_pages,
        })
    }

    /// Convert one record, or `None` when it belongs to another business unit.
    fn accept(&self, record: WmsRecord, endpoint: &str) -> Result<Option<(String, InventoryItem)>, ParseError> {
        let id = scalar_to_string(&record.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ParseError::new(endpoint, format!("record id is not a scalar: {}", record.id)))?;

        if scalar_to_string(&record.lob_id).as_deref() != Some(self.config.lob_id.as_str()) {
            return Ok(None);
        }

        let sku = record.sku.unwrap_or_default();
        let quantity = coerce_quantity(&record.available_quantity, &sku, endpoint)?;

        let mut item = InventoryItem::new(sku, record.name.unwrap_or_default(), quantity);
        if let Some(brand) = record.brand.filter(|b| !b.trim().is_empty()) {
            item = item.with_brand(brand);
        }
        Ok(Some((id, item)))
    }
}

#[async_trait]
impl InventorySource for WmsSource {
    fn side(&self) -> SourceSide {
        SourceSide::B
    }

    fn name(&self) -> &str {
        "wms"
    }

    #[instrument(skip(self, cancel), fields(source = "wms", lob_id = %self.config.lob_id), err)]
    async fn fetch(&self, cancel: &CancellationToken) -> Result<InventorySnapshot, FetchError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), INVENTORY_PATH);
        let limit = self.config.page_size;
        let mut builder = SnapshotBuilder::new(SourceSide::B);
        let mut skipped_other_units = 0usize;

        for page in 1..=self.max_pages {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let query = [("page", page.to_string()), ("limit", limit.to_string())];
            let records: Vec<WmsRecord> = self.http.get_json(&url, &query, cancel).await?;
            let count = records.len();

            for record in records {
                match self.accept(record, &url)? {
                    Some((id, item)) => {
                        if builder.claim_id(&id) {
                            builder.push(&id, item);
                        }
                    }
                    None => skipped_other_units += 1,
                }
            }

            debug!(source = "wms", page, records = count, "fetched inventory page");

            // Providers may clamp `limit`, so a short page is not the end.
            if count == 0 {
                let snapshot = builder.finish();
                info!(
                    source = "wms",
                    items = snapshot.len(),
                    skipped_other_units,
                    "snapshot fetched"
                );
                return Ok(snapshot);
            }
        }

        warn!(
            source = "wms",
            max_pages = self.max_pages,
            "page cap reached before an empty page; stopping pagination"
        );
        Ok(builder.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchSettings;
    use serde_json::json;

    fn source(lob_id: &str) -> WmsSource {
        WmsSource::new(
            WmsConfig {
                base_url: "http://wms.invalid".to_string(),
                api_key: "k".to_string(),
                lob_id: lob_id.to_string(),
                page_size: 10,
            },
            &FetchSettings::default(),
        )
        .unwrap()
    }

    fn record(value: Value) -> WmsRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn lob_ids_compare_as_strings() {
        let wms = source("12");
        let kept = wms
            .accept(record(json!({"id": 1, "sku": "A", "lobId": 12, "availableQuantity": 3})), "e")
            .unwrap();
        let (id, item) = kept.unwrap();
        assert_eq!(id, "1");
        assert_eq!(item.quantity, 3);

        let other = wms
            .accept(record(json!({"id": "2", "sku": "B", "lobId": "13", "availableQuantity": 3})), "e")
            .unwrap();
        assert!(other.is_none());
    }

    #[test]
    fn optional_fields_populate_item() {
        let wms = source("1");
        let (_, item) = wms
            .accept(
                record(json!({
                    "id": 5, "sku": "QBTowels", "lobId": 1, "availableQuantity": 2.7,
                    "name": "Towels", "brand": "QB"
                })),
                "e",
            )
            .unwrap()
            .unwrap();
        assert_eq!(item.product_name, "Towels");
        assert_eq!(item.brand.as_deref(), Some("QB"));
        assert_eq!(item.quantity, 2);
    }

    #[test]
    fn missing_id_is_a_parse_error() {
        let wms = source("1");
        assert!(wms.accept(record(json!({"id": null, "sku": "A", "lobId": 1})), "e").is_err());
    }
}
