//! `RecordFields` ↔ Notion page properties.

use bks_reconcile::{FieldValue, RecordFields};
use chrono::SecondsFormat;
use serde_json::{json, Map, Value};

use crate::client::plain_text;

/// Notion caps one rich-text run at this many characters.
pub(crate) const MAX_TEXT_RUN: usize = 2000;

pub(crate) fn encode_properties(fields: &RecordFields) -> Value {
    let mut props = Map::new();
    for (name, value) in fields.iter() {
        props.insert(name.to_string(), encode_value(value));
    }
    Value::Object(props)
}

fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Title(s) => json!({ "title": text_runs(s) }),
        FieldValue::Text(s) => json!({ "rich_text": text_runs(s) }),
        FieldValue::Select(s) => json!({ "select": { "name": s } }),
        FieldValue::Number(n) if n.is_finite() => json!({ "number": n }),
        FieldValue::Number(_) => json!({ "number": null }),
        FieldValue::Date(ts) => {
            json!({ "date": { "start": ts.to_rfc3339_opts(SecondsFormat::Secs, true) } })
        }
    }
}

/// Split `s` into rich-text runs no longer than [`MAX_TEXT_RUN`] chars.
pub(crate) fn text_runs(s: &str) -> Value {
    let chars: Vec<char> = s.chars().collect();
    let runs: Vec<Value> = chars
        .chunks(MAX_TEXT_RUN)
        .map(|chunk| {
            let content: String = chunk.iter().collect();
            json!({ "type": "text", "text": { "content": content } })
        })
        .collect();
    Value::Array(runs)
}

/// Read the natural key out of a page's `properties[key_property]`.
///
/// Title and rich-text properties yield their plain text, select its name,
/// number its decimal rendering. Empty text counts as no key.
pub(crate) fn read_key(properties: &Value, key_property: &str) -> Option<String> {
    let prop = properties.get(key_property)?;
    let raw = match prop.get("type").and_then(Value::as_str) {
        Some("title") | Some("rich_text") | None => {
            let runs = prop
                .get("title")
                .or_else(|| prop.get("rich_text"))
                .and_then(Value::as_array)?;
            plain_text(runs)
        }
        Some("select") => prop.pointer("/select/name")?.as_str()?.to_string(),
        Some("number") => prop.get("number")?.as_f64()?.to_string(),
        Some(_) => return None,
    };
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn encodes_each_field_kind() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let fields = RecordFields::new()
            .with("position_id", FieldValue::Title("STK-AAPL-USD".to_string()))
            .with("symbol", FieldValue::Text("AAPL".to_string()))
            .with("sec_type", FieldValue::Select("STK".to_string()))
            .with("quantity", FieldValue::Number(10.0))
            .with("updated_at", FieldValue::Date(ts));
        let props = encode_properties(&fields);

        assert_eq!(
            props.pointer("/position_id/title/0/text/content"),
            Some(&json!("STK-AAPL-USD"))
        );
        assert_eq!(props.pointer("/symbol/rich_text/0/text/content"), Some(&json!("AAPL")));
        assert_eq!(props.pointer("/sec_type/select/name"), Some(&json!("STK")));
        assert_eq!(props.pointer("/quantity/number"), Some(&json!(10.0)));
        assert_eq!(
            props.pointer("/updated_at/date/start"),
            Some(&json!("2024-05-01T12:30:00Z"))
        );
    }

    #[test]
    fn non_finite_number_is_cleared() {
        let props = encode_properties(&RecordFields::new().with("x", FieldValue::Number(f64::NAN)));
        assert_eq!(props.pointer("/x/number"), Some(&Value::Null));
    }

    #[test]
    fn long_text_is_split_into_runs() {
        let s = "x".repeat(MAX_TEXT_RUN + 5);
        let runs = text_runs(&s);
        let runs = runs.as_array().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].pointer("/text/content"), Some(&json!("xxxxx")));
    }

    #[test]
    fn read_key_from_title_and_missing_property() {
        let props = json!({
            "position_id": { "id": "title", "type": "title", "title": [ { "plain_text": "OPT-SPY-20240621-450.0-C-USD" } ] },
            "empty": { "type": "title", "title": [] }
        });
        assert_eq!(
            read_key(&props, "position_id").as_deref(),
            Some("OPT-SPY-20240621-450.0-C-USD")
        );
        assert_eq!(read_key(&props, "empty"), None);
        assert_eq!(read_key(&props, "absent"), None);
    }
}
