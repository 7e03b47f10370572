//! SheetsStore against a mocked values API.

use bks_reconcile::{
    build_index, synchronize, trade_record, FieldValue, QueryFilter, RecordFields, RecordHandle,
    RecordStore, StoreError, WritePolicy, TRADE_COLUMNS, TRADE_KEY_FIELD,
};
use bks_schemas::{Side, TradeRecord};
use bks_sheets::SheetsStore;
use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::json;

fn store(server: &MockServer) -> SheetsStore {
    SheetsStore::new_with_base_url(
        "sheet-token".to_string(),
        server.base_url(),
        "sid".to_string(),
        TRADE_COLUMNS.iter().map(|c| c.to_string()).collect(),
    )
}

fn filter(page_size: u32) -> QueryFilter {
    QueryFilter {
        collection: "Trades".to_string(),
        key_field: TRADE_KEY_FIELD.to_string(),
        page_size,
    }
}

#[tokio::test]
async fn key_column_is_read_in_row_windows() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v4/spreadsheets/sid/values/'Trades'!A2:A3")
                .header("authorization", "Bearer sheet-token");
            then.status(200).json_body(json!({
                "range": "Trades!A2:A3",
                "majorDimension": "ROWS",
                "values": [ ["E1"], ["E2"] ]
            }));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v4/spreadsheets/sid/values/'Trades'!A4:A5");
            then.status(200).json_body(json!({
                "range": "Trades!A4:A5",
                "majorDimension": "ROWS",
                "values": [ [""] ]
            }));
        })
        .await;

    let end = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v4/spreadsheets/sid/values/'Trades'!A6:A7");
            then.status(200)
                .json_body(json!({ "range": "Trades!A6:A7", "majorDimension": "ROWS" }));
        })
        .await;

    let index = build_index(&store(&server), &filter(2)).await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    end.assert_async().await;
    assert_eq!(index.pages_fetched(), 3);
    assert_eq!(index.len(), 2);
    assert_eq!(index.unkeyed(), 1);
    assert_eq!(
        index.get("E2"),
        Some(&RecordHandle("'Trades'!A3:H3".to_string()))
    );
}

#[tokio::test]
async fn cleared_row_at_window_end_does_not_stop_the_listing() {
    let server = MockServer::start_async().await;
    // Row 3 was cleared by hand; the API returns only row 2 for A2:A3.
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v4/spreadsheets/sid/values/'Trades'!A2:A3");
            then.status(200).json_body(json!({ "values": [ ["E1"] ] }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v4/spreadsheets/sid/values/'Trades'!A4:A5");
            then.status(200).json_body(json!({ "values": [ ["E3"], ["E4"] ] }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v4/spreadsheets/sid/values/'Trades'!A6:A7");
            then.status(200).json_body(json!({}));
        })
        .await;

    let index = build_index(&store(&server), &filter(2)).await.unwrap();

    assert_eq!(index.len(), 3);
    assert_eq!(
        index.get("E3"),
        Some(&RecordHandle("'Trades'!A4:H4".to_string()))
    );
    assert!(index.contains("E4"));
}

#[tokio::test]
async fn empty_sheet_omits_values_and_yields_empty_index() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v4/spreadsheets/sid/values/'Trades'!A2:A101");
            then.status(200)
                .json_body(json!({ "range": "Trades!A2:A101", "majorDimension": "ROWS" }));
        })
        .await;

    let index = build_index(&store(&server), &filter(100)).await.unwrap();
    assert!(index.is_empty());
    assert_eq!(index.pages_fetched(), 1);
}

#[tokio::test]
async fn append_only_sync_appends_new_trades_and_skips_known() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v4/spreadsheets/sid/values/'Trades'!A2:A101");
            then.status(200).json_body(json!({ "values": [ ["E-OLD"] ] }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v4/spreadsheets/sid/values/'Trades'!A102:A201");
            then.status(200).json_body(json!({ "range": "Trades!A102:A201" }));
        })
        .await;
    let append = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v4/spreadsheets/sid/values/'Trades'!A1:H1:append")
                .query_param("valueInputOption", "RAW")
                .query_param("insertDataOption", "INSERT_ROWS")
                .json_body(json!({
                    "majorDimension": "ROWS",
                    "values": [[
                        "E-NEW", "42", "ABC", "BUY", 15.0, 101.0, 1.5, "2024-05-01 14:30:00"
                    ]]
                }));
            then.status(200).json_body(json!({
                "spreadsheetId": "sid",
                "updates": { "updatedRange": "Trades!A3:H3", "updatedRows": 1 }
            }));
        })
        .await;

    let trade = |id: &str| TradeRecord {
        record_id: id.to_string(),
        order_id: "42".to_string(),
        symbol: "ABC".to_string(),
        side: Side::Buy,
        qty: 15,
        avg_price_micros: 101_000_000,
        commission_micros: 1_500_000,
        ts_utc: Utc.with_ymd_and_hms(2024, 5, 1, 14, 30, 0).unwrap(),
    };
    let records = vec![trade_record(&trade("E-OLD")), trade_record(&trade("E-NEW"))];

    let sheets = store(&server);
    let mut index = build_index(&sheets, &filter(100)).await.unwrap();
    let report =
        synchronize(&sheets, "Trades", &records, &mut index, WritePolicy::AppendOnly).await;

    append.assert_async().await;
    assert_eq!(report.created, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        index.get("E-NEW"),
        Some(&RecordHandle("'Trades'!A3:H3".to_string()))
    );
}

#[tokio::test]
async fn update_puts_the_whole_row() {
    let server = MockServer::start_async().await;
    let put = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/v4/spreadsheets/sid/values/'Trades'!A7:H7")
                .query_param("valueInputOption", "RAW");
            then.status(200).json_body(json!({ "updatedRows": 1 }));
        })
        .await;

    let fields = RecordFields::new().with("exec_id", FieldValue::Title("E7".to_string()));
    store(&server)
        .update_record(&RecordHandle("'Trades'!A7:H7".to_string()), &fields)
        .await
        .unwrap();
    put.assert_async().await;
}

#[tokio::test]
async fn ensure_header_writes_only_into_an_empty_first_row() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v4/spreadsheets/sid/values/'Trades'!A1:H1");
            then.status(200).json_body(json!({ "range": "Trades!A1:H1" }));
        })
        .await;
    let put = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/v4/spreadsheets/sid/values/'Trades'!A1:H1")
                .json_body_partial(
                    r#"{ "values": [["exec_id","order_id","symbol","side","quantity","avg_price","commission","timestamp"]] }"#,
                );
            then.status(200).json_body(json!({ "updatedRows": 1 }));
        })
        .await;

    assert!(store(&server).ensure_header("Trades").await.unwrap());
    put.assert_async().await;
}

#[tokio::test]
async fn google_error_envelope_becomes_api_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(403).json_body(json!({
                "error": {
                    "code": 403,
                    "message": "The caller does not have permission",
                    "status": "PERMISSION_DENIED"
                }
            }));
        })
        .await;

    let err = store(&server)
        .query_page(&filter(10), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::Api {
            status: 403,
            message: "PERMISSION_DENIED: The caller does not have permission".to_string()
        }
    );
}
