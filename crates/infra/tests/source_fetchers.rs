//! Fetcher tests against mock ERP / WMS servers.
//!
//! Covers pagination termination, availability batching, client-side
//! filtering, retry on 5xx, no retry on 4xx, parse failures and cancellation.

use std::time::Duration;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stockrecon_infra::config::{ErpConfig, FetchSettings, WmsConfig};
use stockrecon_infra::retry::RetryPolicy;
use stockrecon_infra::sources::{ErpSource, FetchError, InventorySource, WmsSource};
use stockrecon_inventory::SourceSide;

// =============================================================================
// Test Helpers
// =============================================================================

fn settings(max_pages: u32) -> FetchSettings {
    stockrecon_observability::tracing::init_for_tests();
    FetchSettings {
        timeout: Duration::from_secs(5),
        retry: RetryPolicy::linear(2, Duration::from_millis(1)),
        max_pages,
    }
}

fn erp(server: &MockServer, page_size: u32) -> ErpSource {
    ErpSource::new(
        ErpConfig {
            base_url: server.uri(),
            api_token: "erp-token".to_string(),
            page_size,
        },
        &settings(500),
    )
    .unwrap()
}

fn wms(server: &MockServer, page_size: u32, max_pages: u32) -> WmsSource {
    WmsSource::new(
        WmsConfig {
            base_url: server.uri(),
            api_key: "wms-key".to_string(),
            lob_id: "7".to_string(),
            page_size,
        },
        &settings(max_pages),
    )
    .unwrap()
}

fn erp_row(id: u64, name: &str, sku: &str, tracked: bool) -> Value {
    json!([id, name, sku, null, null, null, null, null, tracked])
}

fn search_page(rows: Vec<Value>, more: bool) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "metaData": { "morePagesAvailable": more },
        "data": rows,
    }))
}

fn wms_record(id: u64, sku: &str, lob_id: Value, quantity: Value) -> Value {
    json!({ "id": id, "sku": sku, "lobId": lob_id, "availableQuantity": quantity })
}

async fn mount_wms_page(server: &MockServer, page: u32, records: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/api/v1/inventory"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(records)))
        .expect(1)
        .mount(server)
        .await;
}

// =============================================================================
// ERP (source A)
// =============================================================================

#[tokio::test]
async fn erp_single_page_makes_exactly_one_search_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/search"))
        .and(query_param("firstResult", "1"))
        .and(query_param("pageSize", "100"))
        .and(query_param("filter", "stockTracked eq true"))
        .and(header("Authorization", "Bearer erp-token"))
        .respond_with(search_page(
            vec![
                erp_row(1, "Towels", "QB-TOWELS", true),
                erp_row(2, "Untracked", "UNT-1", false),
                erp_row(3, "No SKU", "", true),
            ],
            false,
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/availability"))
        .and(query_param("ids", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "1": { "total": { "inStock": 5 } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = erp(&server, 100).fetch(&CancellationToken::new()).await.unwrap();

    assert_eq!(snapshot.side(), SourceSide::A);
    assert_eq!(snapshot.len(), 1);
    let item = snapshot.get("QB-TOWELS").unwrap();
    assert_eq!(item.quantity, 5);
    assert_eq!(item.product_name, "Towels");
}

#[tokio::test]
async fn erp_follows_offsets_and_dedups_overlapping_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/search"))
        .and(query_param("firstResult", "1"))
        .respond_with(search_page(
            vec![erp_row(1, "One", "SKU-1", true), erp_row(2, "Two", "SKU-2", true)],
            true,
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/search"))
        .and(query_param("firstResult", "3"))
        .respond_with(search_page(
            vec![erp_row(2, "Two", "SKU-2", true), erp_row(3, "Three", "SKU-3", true)],
            false,
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/availability"))
        .and(query_param("ids", "1,2,3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "1": { "total": { "inStock": 4 } },
            "2": { "total": { "inStock": 2.9 } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = erp(&server, 2).fetch(&CancellationToken::new()).await.unwrap();

    let skus: Vec<&str> = snapshot.iter().map(|i| i.sku.as_str()).collect();
    assert_eq!(skus, vec!["SKU-1", "SKU-2", "SKU-3"]);
    assert_eq!(snapshot.get("SKU-2").unwrap().quantity, 2);
    // Absent from the availability map.
    assert_eq!(snapshot.get("SKU-3").unwrap().quantity, 0);
}

#[tokio::test]
async fn erp_availability_is_requested_in_batches_of_fifty() {
    let server = MockServer::start().await;

    let rows: Vec<Value> = (1..=60).map(|i| erp_row(i, "Item", &format!("SKU-{i}"), true)).collect();
    Mock::given(method("GET"))
        .and(path("/api/v1/products/search"))
        .respond_with(search_page(rows, false))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let snapshot = erp(&server, 100).fetch(&CancellationToken::new()).await.unwrap();
    assert_eq!(snapshot.len(), 60);
    assert!(snapshot.iter().all(|i| i.quantity == 0));
}

#[tokio::test]
async fn erp_auth_failure_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/search"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .expect(1)
        .mount(&server)
        .await;

    let err = erp(&server, 100).fetch(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, FetchError::Auth { status: 401, .. }), "got {err:?}");
}

#[tokio::test]
async fn erp_malformed_page_is_a_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/search"))
        .respond_with(search_page(vec![json!([1, "Too short"])], false))
        .expect(1)
        .mount(&server)
        .await;

    let err = erp(&server, 100).fetch(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, FetchError::Parse(_)), "got {err:?}");
}

#[tokio::test]
async fn erp_empty_page_stops_despite_more_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/search"))
        .and(query_param("firstResult", "1"))
        .respond_with(search_page(vec![erp_row(1, "One", "SKU-1", true)], true))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/search"))
        .and(query_param("firstResult", "2"))
        .respond_with(search_page(vec![], true))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/search"))
        .and(query_param("firstResult", "3"))
        .respond_with(search_page(vec![erp_row(9, "Never", "SKU-9", true)], false))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/availability"))
        .and(query_param("ids", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "1": { "total": { "inStock": 3 } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = erp(&server, 1).fetch(&CancellationToken::new()).await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.get("SKU-1").unwrap().quantity, 3);
}

#[tokio::test]
async fn erp_page_cap_terminates_pagination() {
    let server = MockServer::start().await;

    // The provider always claims more pages; only the cap stops the loop.
    Mock::given(method("GET"))
        .and(path("/api/v1/products/search"))
        .respond_with(search_page(vec![erp_row(1, "One", "SKU-1", true)], true))
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/products/availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "1": { "total": { "inStock": 1 } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = ErpSource::new(
        ErpConfig {
            base_url: server.uri(),
            api_token: "erp-token".to_string(),
            page_size: 1,
        },
        &settings(3),
    )
    .unwrap();

    let snapshot = source.fetch(&CancellationToken::new()).await.unwrap();
    assert_eq!(snapshot.len(), 1);
}

// =============================================================================
// WMS (source B)
// =============================================================================

#[tokio::test]
async fn wms_filters_business_unit_and_stops_on_empty_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/inventory"))
        .and(query_param("page", "1"))
        .and(query_param("limit", "2"))
        .and(header("X-Api-Key", "wms-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            wms_record(10, "QBTowels", json!(7), json!(3)),
            wms_record(11, "OTHER-UNIT", json!("8"), json!(9)),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    mount_wms_page(&server, 2, vec![wms_record(12, "sku1", json!("7"), json!(-4))]).await;
    mount_wms_page(&server, 3, vec![]).await;

    let snapshot = wms(&server, 2, 500).fetch(&CancellationToken::new()).await.unwrap();

    assert_eq!(snapshot.side(), SourceSide::B);
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.get("QBTowels").unwrap().quantity, 3);
    assert_eq!(snapshot.get("sku1").unwrap().quantity, 0);
    assert!(!snapshot.contains("OTHER-UNIT"));
}

#[tokio::test]
async fn wms_short_pages_do_not_end_pagination() {
    let server = MockServer::start().await;

    // limit=5 requested, but the provider clamps every page to two records.
    for page in 1..=3u64 {
        let first = page * 10;
        mount_wms_page(
            &server,
            page as u32,
            vec![
                wms_record(first, &format!("SKU-{first}"), json!(7), json!(1)),
                wms_record(first + 1, &format!("SKU-{}", first + 1), json!(7), json!(1)),
            ],
        )
        .await;
    }
    mount_wms_page(&server, 4, vec![]).await;

    let snapshot = wms(&server, 5, 500).fetch(&CancellationToken::new()).await.unwrap();
    assert_eq!(snapshot.len(), 6);
    assert!(snapshot.contains("SKU-31"));
}

#[tokio::test]
async fn wms_retries_transient_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/inventory"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    mount_wms_page(&server, 1, vec![wms_record(1, "A", json!(7), json!(1))]).await;
    mount_wms_page(&server, 2, vec![]).await;

    let snapshot = wms(&server, 10, 500).fetch(&CancellationToken::new()).await.unwrap();
    assert_eq!(snapshot.len(), 1);
}

#[tokio::test]
async fn wms_gives_up_after_bounded_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/inventory"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = wms(&server, 10, 500).fetch(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, FetchError::Server { status: 500, .. }), "got {err:?}");
}

#[tokio::test]
async fn wms_client_errors_abort_immediately() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/inventory"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such inventory"))
        .expect(1)
        .mount(&server)
        .await;

    let err = wms(&server, 10, 500).fetch(&CancellationToken::new()).await.unwrap_err();
    match err {
        FetchError::Client { status, body, .. } => {
            assert_eq!(status, 404);
            assert_eq!(body, "no such inventory");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn wms_page_cap_terminates_pagination() {
    let server = MockServer::start().await;

    // No page is ever empty, so only the cap stops the loop; ids repeat across pages.
    Mock::given(method("GET"))
        .and(path("/api/v1/inventory"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            wms_record(1, "A", json!(7), json!(1)),
            wms_record(2, "B", json!(7), json!(2)),
        ])))
        .expect(3)
        .mount(&server)
        .await;

    let snapshot = wms(&server, 2, 3).fetch(&CancellationToken::new()).await.unwrap();
    assert_eq!(snapshot.len(), 2);
}

#[tokio::test]
async fn cancelled_fetch_makes_no_requests() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = wms(&server, 10, 500).fetch(&cancel).await.unwrap_err();
    assert!(matches!(err, FetchError::Cancelled));
}
