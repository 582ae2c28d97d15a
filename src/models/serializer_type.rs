//! Identifier of the strategy used to encode an object's payload.

use crate::errors::ObjectStoreError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Serializer chosen when an object is created.
///
/// Stored in the `serializer_type` column as `JSON` or `BINARY` and fixed for
/// the lifetime of the row.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum SerializerType {
    Json,
    Binary,
}

impl SerializerType {
    pub const ALL: [SerializerType; 2] = [SerializerType::Json, SerializerType::Binary];

    pub fn as_str(&self) -> &'static str {
        match self {
            SerializerType::Json => "JSON",
            SerializerType::Binary => "BINARY",
        }
    }
}

impl fmt::Display for SerializerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SerializerType {
    type Err = ObjectStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "JSON" => Ok(SerializerType::Json),
            "BINARY" => Ok(SerializerType::Binary),
            other => Err(ObjectStoreError::UnsupportedSerializer(other.to_string())),
        }
    }
}
