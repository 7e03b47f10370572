//! Canonical record → store field set. Key field always comes first.

use bks_schemas::{micros_to_price, MarginUsage, TradeRecord, ValuedPosition};
use chrono::{DateTime, Utc};

use crate::{position_key, trade_key, FieldValue, RecordFields, SyncRecord};

pub const POSITION_KEY_FIELD: &str = "position_id";
pub const TRADE_KEY_FIELD: &str = "exec_id";

/// Column order of the trade log.
pub const TRADE_COLUMNS: &[&str] = &[
    TRADE_KEY_FIELD,
    "order_id",
    "symbol",
    "side",
    "quantity",
    "avg_price",
    "commission",
    "timestamp",
];

/// Position record. The key goes into `key_field`, which must be the field the
/// index reads. Margin fields are only written when an estimate exists; an
/// unavailable estimate is left blank rather than written as zero.
pub fn position_record(
    valued: &ValuedPosition,
    margin: Option<&MarginUsage>,
    key_field: &str,
    updated_at: DateTime<Utc>,
) -> SyncRecord {
    let position = &valued.position;
    let key = position_key(&position.instrument);

    let mut fields = RecordFields::new()
        .with(key_field, FieldValue::Title(key.to_string()))
        .with("symbol", FieldValue::Text(position.instrument.symbol.clone()))
        .with(
            "sec_type",
            FieldValue::Select(position.instrument.sec_type.as_str().to_string()),
        )
        .with("quantity", FieldValue::Number(position.qty as f64))
        .with(
            "avg_cost",
            FieldValue::Number(micros_to_price(position.avg_cost_micros)),
        )
        .with(
            "market_value",
            FieldValue::Number(micros_to_price(valued.market_value_micros)),
        );

    if let Some(m) = margin {
        fields.set(
            "init_margin",
            FieldValue::Number(micros_to_price(m.init_margin_delta_micros)),
        );
        fields.set(
            "maint_margin",
            FieldValue::Number(micros_to_price(m.maint_margin_delta_micros)),
        );
    }
    fields.set("updated_at", FieldValue::Date(updated_at));

    SyncRecord { key, fields }
}

pub fn trade_record(trade: &TradeRecord) -> SyncRecord {
    let key = trade_key(trade);
    let fields = RecordFields::new()
        .with(TRADE_KEY_FIELD, FieldValue::Title(key.to_string()))
        .with("order_id", FieldValue::Text(trade.order_id.clone()))
        .with("symbol", FieldValue::Text(trade.symbol.clone()))
        .with("side", FieldValue::Select(trade.side.as_str().to_string()))
        .with("quantity", FieldValue::Number(trade.qty as f64))
        .with(
            "avg_price",
            FieldValue::Number(micros_to_price(trade.avg_price_micros)),
        )
        .with(
            "commission",
            FieldValue::Number(micros_to_price(trade.commission_micros)),
        )
        .with("timestamp", FieldValue::Date(trade.ts_utc));
    SyncRecord { key, fields }
}
