//! Opaque binary strategy: `bincode` bytes wrapped in standard base64.
//!
//! Meant for values without a useful textual form. The encoding follows the
//! Rust type layout, so it is only readable by a build that shares the type
//! definitions, and self-describing types such as `serde_json::Value` cannot
//! be decoded from it.

use super::{ObjectSerializer, deserialization_failure, serialization_failure};
use crate::{errors::ObjectStoreResult, models::SerializerType};
use base64::{Engine as _, engine::general_purpose};
use bincode::Options;
use serde::{Serialize, de::DeserializeOwned};

#[derive(Clone, Copy, Debug, Default)]
pub struct BinarySerializer;

/// Fixed-width integers and no trailing garbage, so a payload decoded into the
/// wrong type fails instead of yielding a prefix.
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

impl ObjectSerializer for BinarySerializer {
    fn serializer_type(&self) -> SerializerType {
        SerializerType::Binary
    }

    fn serialize<T>(&self, collection: &str, key: &str, value: &T) -> ObjectStoreResult<String>
    where
        T: Serialize + ?Sized,
    {
        let bytes = codec()
            .serialize(value)
            .map_err(|err| serialization_failure(collection, key, err))?;
        Ok(general_purpose::STANDARD.encode(bytes))
    }

    fn deserialize<T>(&self, collection: &str, key: &str, data: &str) -> ObjectStoreResult<T>
    where
        T: DeserializeOwned,
    {
        let bytes = general_purpose::STANDARD
            .decode(data)
            .map_err(|err| deserialization_failure(collection, key, err))?;
        codec()
            .deserialize(&bytes)
            .map_err(|err| deserialization_failure(collection, key, err))
    }
}
