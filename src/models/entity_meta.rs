//! Bookkeeping projection returned by every mutating operation.

use crate::models::SerializerType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity and version of a stored object.
///
/// Never carries the payload or the properties. A fresh value is produced by
/// each successful create, update or expire.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EntityMeta {
    /// Logical namespace the object lives in.
    pub collection: String,

    /// Key of the object, unique within its collection.
    pub object_key: String,

    /// Strategy the payload was encoded with.
    pub serializer_type: SerializerType,

    /// Version of the row, starting at 1.
    pub version: i64,

    /// Instant after which the object is no longer visible; `None` never expires.
    pub expiration_time: Option<DateTime<Utc>>,
}

impl EntityMeta {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time.is_some_and(|at| at <= now)
    }
}
