//! Free-form tags attached to an object and matched by containment.

use crate::errors::{ObjectStoreError, ObjectStoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// String-keyed JSON tags stored in the `properties` column.
///
/// A query `Properties` matches a stored one when every query entry is present
/// in the stored bag with an equal value; extra stored entries are ignored.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct Properties(Map<String, Value>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Keys end up inside SQLite JSON paths (`$."key"`), so they must be
    /// non-blank and free of double quotes.
    pub fn validate(&self) -> ObjectStoreResult<()> {
        for key in self.0.keys() {
            if key.trim().is_empty() {
                return Err(ObjectStoreError::InvalidArgument(
                    "property keys must not be blank".into(),
                ));
            }
            if key.contains('"') {
                return Err(ObjectStoreError::InvalidArgument(format!(
                    "property key `{}` must not contain double quotes",
                    key
                )));
            }
        }
        Ok(())
    }
}

impl TryFrom<Value> for Properties {
    type Error = ObjectStoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Properties(map)),
            Value::Null => Ok(Properties::new()),
            other => Err(ObjectStoreError::InvalidArgument(format!(
                "properties must be a JSON object, got `{}`",
                other
            ))),
        }
    }
}

impl From<Map<String, Value>> for Properties {
    fn from(map: Map<String, Value>) -> Self {
        Properties(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Properties(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// JSON path addressing a top-level property.
pub(crate) fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key)
}

/// Name SQLite's `json_type()` reports for a value.
pub(crate) fn sqlite_json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(true) => "true",
        Value::Bool(false) => "false",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "real",
        Value::String(_) => "text",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_from_json_object() {
        let props = Properties::try_from(json!({"a": 1, "b": "text"})).unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(props.get("a"), Some(&json!(1)));
        assert_eq!(props, Properties::new().with("b", "text").with("a", 1));
    }

    #[test]
    fn rejects_non_objects() {
        let err = Properties::try_from(json!([1, 2])).unwrap_err();
        assert!(matches!(err, ObjectStoreError::InvalidArgument(_)));
        assert!(Properties::try_from(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn stored_text_has_sorted_keys() {
        let props: Properties = [("b", json!(true)), ("a", json!({"y": 1, "x": 2}))]
            .into_iter()
            .collect();
        assert_eq!(
            serde_json::to_string(&props).unwrap(),
            r#"{"a":{"x":2,"y":1},"b":true}"#
        );
    }

    #[test]
    fn validates_keys() {
        assert!(Properties::new().with("status", "new").validate().is_ok());
        assert!(Properties::new().with(" ", 1).validate().is_err());
        assert!(Properties::new().with("a\"b", 1).validate().is_err());
    }

    #[test]
    fn maps_values_to_sqlite_json_types() {
        assert_eq!(sqlite_json_type(&json!(null)), "null");
        assert_eq!(sqlite_json_type(&json!(true)), "true");
        assert_eq!(sqlite_json_type(&json!(false)), "false");
        assert_eq!(sqlite_json_type(&json!(1)), "integer");
        assert_eq!(sqlite_json_type(&json!(1.5)), "real");
        assert_eq!(sqlite_json_type(&json!("x")), "text");
        assert_eq!(sqlite_json_type(&json!([1])), "array");
        assert_eq!(sqlite_json_type(&json!({"a": 1})), "object");
        assert_eq!(json_path("status"), "$.\"status\"");
    }
}
