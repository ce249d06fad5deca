//! Response envelope tests for the invocation adapter

mod common;

use common::*;
use partload_core::catalog::CatalogOp;
use partload_core::storage::StoreOp;
use partload_core::{InvocationAdapter, InvocationEvent};
use serde_json::json;

fn adapter(h: &Harness) -> InvocationAdapter {
    InvocationAdapter::new(h.orchestrator.clone())
}

#[tokio::test]
async fn test_success_envelope() {
    let h = Harness::new();
    h.land_orders();

    let envelope = adapter(&h)
        .handle(InvocationEvent::for_date(TARGET_DATE))
        .await;

    assert_eq!(envelope.status_code, 200);
    assert_eq!(envelope.body["rows_inserted"], 3);
    assert_eq!(envelope.body["target_date"], TARGET_DATE);
    assert_eq!(envelope.body["target_table"], "sales.orders");
    assert_eq!(
        envelope.body["archive_key"],
        todays_archive_key("orders_2024-03-10.csv")
    );
}

#[tokio::test]
async fn test_no_data_envelope() {
    let h = Harness::new();
    h.land(SOURCE_KEY, "order_id,amount\n");

    let envelope = adapter(&h)
        .handle_json(json!({ "TARGET_DATE": TARGET_DATE }))
        .await;

    assert_eq!(envelope.status_code, 200);
    assert_eq!(envelope.body["message"], "No data found");
    assert_eq!(envelope.body["rows_inserted"], 0);
}

#[tokio::test]
async fn test_failure_envelope_carries_error_kind() {
    let h = Harness::new();
    h.land_orders();
    h.catalog.fail(CatalogOp::Delete);

    let envelope = adapter(&h)
        .handle(InvocationEvent::for_date(TARGET_DATE))
        .await;

    assert_eq!(envelope.status_code, 500);
    assert!(!envelope.is_success());
    assert_eq!(envelope.body["error"]["kind"], "write_error");
    assert_eq!(envelope.body["error"]["stage"], "write");
    assert_eq!(envelope.body["error"]["retryable"], true);
    assert_eq!(envelope.body["target_date"], TARGET_DATE);
    assert_eq!(envelope.body["committed"], false);
    assert_eq!(envelope.body["rows_inserted"], 0);
}

#[tokio::test]
async fn test_archive_failure_envelope_reports_committed_rows() {
    let h = Harness::new();
    h.land_orders();
    h.store.fail(StoreOp::Copy);

    let envelope = adapter(&h)
        .handle(InvocationEvent::for_date(TARGET_DATE))
        .await;

    assert_eq!(envelope.status_code, 500);
    assert_eq!(envelope.body["error"]["kind"], "archive_error");
    assert_eq!(envelope.body["error"]["stage"], "archive");
    assert_eq!(envelope.body["committed"], true);
    assert_eq!(envelope.body["rows_inserted"], 3);
}

#[tokio::test]
async fn test_missing_or_malformed_event_is_bad_request() {
    let h = Harness::new();
    let adapter = adapter(&h);

    let missing = adapter.handle(InvocationEvent::default()).await;
    assert_eq!(missing.status_code, 400);
    assert_eq!(missing.body["error"]["kind"], "invalid_argument");

    let malformed = adapter.handle_json(json!({ "target_date": 20240310 })).await;
    assert_eq!(malformed.status_code, 400);

    assert_eq!(h.catalog.total_calls(), 0);
}

#[tokio::test]
async fn test_unparseable_date_is_bad_request() {
    let h = Harness::new();
    let envelope = adapter(&h)
        .handle(InvocationEvent::for_date("not-a-date"))
        .await;

    let value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(value["statusCode"], 400);
    assert_eq!(value["body"]["error"]["kind"], "invalid_argument");
    assert_eq!(value["body"]["error"]["stage"], "resolve");
}
