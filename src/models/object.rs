//! Represents a row of the `stored_objects` table.

use crate::{
    errors::{ObjectStoreError, ObjectStoreResult},
    models::{EntityMeta, SerializerType, timestamp},
};
use sqlx::FromRow;

/// A persisted object as it sits in the backing table.
///
/// Only the engine reads these; callers get an `EntityMeta` or the decoded
/// payload instead. Fields hold the raw column text, conversion happens in
/// [`StoredObject::meta`].
#[derive(Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Logical namespace (`collection_id` column).
    #[sqlx(rename = "collection_id")]
    pub collection: String,

    /// Key, unique within the collection.
    pub object_key: String,

    /// Incremented on every successful update.
    pub version: i64,

    /// `JSON` or `BINARY`.
    pub serializer_type: String,

    /// Payload text produced by the serializer.
    pub object_data: String,

    /// JSON object text of the caller-supplied tags.
    pub properties: String,

    /// RFC 3339 UTC instant, `NULL` when the object never expires.
    pub expiration_time: Option<String>,
}

impl StoredObject {
    pub fn serializer(&self) -> ObjectStoreResult<SerializerType> {
        self.serializer_type.parse()
    }

    /// Project the bookkeeping columns into an `EntityMeta`.
    pub fn meta(&self) -> ObjectStoreResult<EntityMeta> {
        let expiration_time = self
            .expiration_time
            .as_deref()
            .map(timestamp::parse_utc)
            .transpose()
            .map_err(|err| {
                ObjectStoreError::query(&self.collection, Some(&self.object_key), err)
            })?;

        Ok(EntityMeta {
            collection: self.collection.clone(),
            object_key: self.object_key.clone(),
            serializer_type: self.serializer()?,
            version: self.version,
            expiration_time,
        })
    }
}
