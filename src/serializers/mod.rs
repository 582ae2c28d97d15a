//! Payload serialization strategies.
//!
//! Each stored object names the strategy that encoded it. The set is closed
//! (`JSON`, `BINARY`), so dispatch goes through the [`Serializer`] enum rather
//! than trait objects, and the [`SerializerRegistry`] hands out the right
//! variant for a [`SerializerType`].

pub mod binary;
pub mod json;
pub mod registry;

use crate::{
    errors::{BoxedCause, ObjectStoreError, ObjectStoreResult},
    models::SerializerType,
};
use serde::{Serialize, de::DeserializeOwned};

pub use binary::BinarySerializer;
pub use json::JsonSerializer;
pub use registry::SerializerRegistry;

/// Encode/decode contract shared by every strategy.
///
/// `collection` and `key` are only used to give failures context.
pub trait ObjectSerializer {
    fn serializer_type(&self) -> SerializerType;

    fn serialize<T>(&self, collection: &str, key: &str, value: &T) -> ObjectStoreResult<String>
    where
        T: Serialize + ?Sized;

    fn deserialize<T>(&self, collection: &str, key: &str, data: &str) -> ObjectStoreResult<T>
    where
        T: DeserializeOwned;
}

/// One of the registered strategies.
#[derive(Clone, Copy, Debug)]
pub enum Serializer {
    Json(JsonSerializer),
    Binary(BinarySerializer),
}

impl Serializer {
    pub fn for_type(serializer_type: SerializerType) -> Self {
        match serializer_type {
            SerializerType::Json => Serializer::Json(JsonSerializer),
            SerializerType::Binary => Serializer::Binary(BinarySerializer),
        }
    }
}

impl ObjectSerializer for Serializer {
    fn serializer_type(&self) -> SerializerType {
        match self {
            Serializer::Json(inner) => inner.serializer_type(),
            Serializer::Binary(inner) => inner.serializer_type(),
        }
    }

    fn serialize<T>(&self, collection: &str, key: &str, value: &T) -> ObjectStoreResult<String>
    where
        T: Serialize + ?Sized,
    {
        match self {
            Serializer::Json(inner) => inner.serialize(collection, key, value),
            Serializer::Binary(inner) => inner.serialize(collection, key, value),
        }
    }

    fn deserialize<T>(&self, collection: &str, key: &str, data: &str) -> ObjectStoreResult<T>
    where
        T: DeserializeOwned,
    {
        match self {
            Serializer::Json(inner) => inner.deserialize(collection, key, data),
            Serializer::Binary(inner) => inner.deserialize(collection, key, data),
        }
    }
}

pub(crate) fn serialization_failure(
    collection: &str,
    key: &str,
    cause: impl Into<BoxedCause>,
) -> ObjectStoreError {
    ObjectStoreError::SerializationFailure {
        collection: collection.to_string(),
        key: key.to_string(),
        source: cause.into(),
    }
}

pub(crate) fn deserialization_failure(
    collection: &str,
    key: &str,
    cause: impl Into<BoxedCause>,
) -> ObjectStoreError {
    ObjectStoreError::DeserializationFailure {
        collection: collection.to_string(),
        key: key.to_string(),
        source: cause.into(),
    }
}
