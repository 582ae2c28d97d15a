//! Textual JSON strategy backed by `serde_json`.
//!
//! Decoding is strict: an object key in the stored document that the target
//! type does not consume is rejected, the way a schema-checked mapper refuses
//! unknown properties. Aliases, defaults and skipped-on-write fields count as
//! consumed. Dates go through the types' own serde impls, which for `chrono`
//! is RFC 3339 with an explicit offset.

use super::{ObjectSerializer, deserialization_failure, serialization_failure};
use crate::{errors::ObjectStoreResult, models::SerializerType};
use serde::{Serialize, de::DeserializeOwned};

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl ObjectSerializer for JsonSerializer {
    fn serializer_type(&self) -> SerializerType {
        SerializerType::Json
    }

    fn serialize<T>(&self, collection: &str, key: &str, value: &T) -> ObjectStoreResult<String>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_string(value).map_err(|err| serialization_failure(collection, key, err))
    }

    fn deserialize<T>(&self, collection: &str, key: &str, data: &str) -> ObjectStoreResult<T>
    where
        T: DeserializeOwned,
    {
        let mut document = serde_json::Deserializer::from_str(data);
        let mut unknown: Option<String> = None;

        let value: T = serde_ignored::deserialize(&mut document, |path| {
            unknown.get_or_insert_with(|| path.to_string());
        })
        .map_err(|err| deserialization_failure(collection, key, err))?;
        document
            .end()
            .map_err(|err| deserialization_failure(collection, key, err))?;

        if let Some(path) = unknown {
            return Err(deserialization_failure(
                collection,
                key,
                format!("unknown field `{}`", path),
            ));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ObjectStoreError;
    use chrono::{DateTime, TimeZone, Utc};
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Order {
        id: String,
        amount: i64,
        placed_at: DateTime<Utc>,
        lines: Vec<Line>,
        tags: BTreeMap<String, String>,
        note: Option<String>,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Line {
        sku: String,
        qty: u32,
    }

    fn order() -> Order {
        Order {
            id: "o1".into(),
            amount: 1250,
            placed_at: Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 0).unwrap(),
            lines: vec![Line {
                sku: "A-1".into(),
                qty: 2,
            }],
            tags: BTreeMap::from([("channel".to_string(), "web".to_string())]),
            note: None,
        }
    }

    #[test]
    fn round_trips_structs() {
        let json = JsonSerializer;
        let text = json.serialize("orders", "o1", &order()).unwrap();
        let back: Order = json.deserialize("orders", "o1", &text).unwrap();
        assert_eq!(back, order());
    }

    #[test]
    fn writes_dates_with_offset() {
        let text = JsonSerializer.serialize("orders", "o1", &order()).unwrap();
        assert!(text.contains("\"placed_at\":\"2026-10-16T08:30:00Z\""));
    }

    #[test]
    fn null_is_a_payload_not_an_error() {
        let json = JsonSerializer;
        let text = json.serialize("orders", "o1", &None::<Order>).unwrap();
        assert_eq!(text, "null");
        let back: Option<Order> = json.deserialize("orders", "o1", &text).unwrap();
        assert_eq!(back, None);
    }

    #[test]
    fn rejects_unknown_fields() {
        let text = r#"{"sku":"A-1","qty":2,"colour":"red"}"#;
        let err = JsonSerializer
            .deserialize::<Line>("orders", "o1", text)
            .unwrap_err();
        match err {
            ObjectStoreError::DeserializationFailure {
                collection,
                key,
                source,
            } => {
                assert_eq!(collection, "orders");
                assert_eq!(key, "o1");
                assert_eq!(source.to_string(), "unknown field `colour`");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_nested_fields() {
        let mut doc = serde_json::to_value(order()).unwrap();
        doc["lines"][0]["discount"] = serde_json::Value::from(5);
        let err = JsonSerializer
            .deserialize::<Order>("orders", "o1", &doc.to_string())
            .unwrap_err();
        assert!(source_text(&err).contains("discount"));
    }

    #[test]
    fn rejects_type_mismatch_and_garbage() {
        let json = JsonSerializer;
        assert!(matches!(
            json.deserialize::<Line>("orders", "o1", r#"{"sku":"A-1","qty":"two"}"#),
            Err(ObjectStoreError::DeserializationFailure { .. })
        ));
        assert!(matches!(
            json.deserialize::<Line>("orders", "o1", "not json"),
            Err(ObjectStoreError::DeserializationFailure { .. })
        ));
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Customer {
        #[serde(alias = "full_name")]
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
        #[serde(default, skip_serializing)]
        password_hint: Option<String>,
    }

    #[test]
    fn accepts_aliased_fields() {
        let back: Customer = JsonSerializer
            .deserialize("customers", "c1", r#"{"full_name":"Ada"}"#)
            .unwrap();
        assert_eq!(back.name, "Ada");
    }

    #[test]
    fn accepts_fields_skipped_on_write() {
        let back: Customer = JsonSerializer
            .deserialize(
                "customers",
                "c1",
                r#"{"name":"Ada","tags":[],"password_hint":"cat"}"#,
            )
            .unwrap();
        assert!(back.tags.is_empty());
        assert_eq!(back.password_hint.as_deref(), Some("cat"));
    }

    #[test]
    fn rejects_unknown_null_fields() {
        let err = JsonSerializer
            .deserialize::<Line>("orders", "o1", r#"{"sku":"A-1","qty":2,"colour":null}"#)
            .unwrap_err();
        assert_eq!(source_text(&err), "unknown field `colour`");
    }

    #[test]
    fn rejects_trailing_characters() {
        assert!(JsonSerializer
            .deserialize::<Line>("orders", "o1", r#"{"sku":"A-1","qty":2} x"#)
            .is_err());
    }

    fn source_text(err: &ObjectStoreError) -> String {
        std::error::Error::source(err)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }
}
