//! Error taxonomy for the object store.
//!
//! A single tagged error covers every failure the engine can surface. Each
//! variant carries the collection (and key, where one applies) so callers can
//! decide whether to retry without parsing messages.

use std::fmt;
use thiserror::Error;

/// Boxed cause kept as the `source` of backend and codec failures.
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("serializer `{0}` is not supported")]
    UnsupportedSerializer(String),

    #[error("failed to serialize object `{key}` in collection `{collection}`")]
    SerializationFailure {
        collection: String,
        key: String,
        #[source]
        source: BoxedCause,
    },

    #[error("failed to deserialize object `{key}` in collection `{collection}`")]
    DeserializationFailure {
        collection: String,
        key: String,
        #[source]
        source: BoxedCause,
    },

    #[error("object `{key}` not found in collection `{collection}`")]
    NotFound { collection: String, key: String },

    #[error(
        "version conflict on object `{key}` in collection `{collection}`: expected {expected}, found {}",
        ActualVersion(.actual)
    )]
    VersionConflict {
        collection: String,
        key: String,
        expected: i64,
        /// Version observed in the store, when it could be read.
        actual: Option<i64>,
    },

    #[error("object `{key}` already exists in collection `{collection}`")]
    DuplicateKey { collection: String, key: String },

    #[error("{affected} rows affected for object `{key}` in collection `{collection}`")]
    MultipleRowsAffected {
        collection: String,
        key: String,
        affected: u64,
    },

    #[error("query failed in collection `{collection}`{}", KeySuffix(.key))]
    QueryFailure {
        collection: String,
        key: Option<String>,
        #[source]
        source: BoxedCause,
    },

    #[error("persist failed in collection `{collection}`{}", KeySuffix(.key))]
    PersistFailure {
        collection: String,
        key: Option<String>,
        #[source]
        source: BoxedCause,
    },
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

impl ObjectStoreError {
    /// Only a lost optimistic check is worth retrying, and only after the
    /// caller re-reads the current version.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ObjectStoreError::VersionConflict { .. })
    }

    pub(crate) fn query(
        collection: &str,
        key: Option<&str>,
        source: impl Into<BoxedCause>,
    ) -> Self {
        ObjectStoreError::QueryFailure {
            collection: collection.to_string(),
            key: key.map(str::to_string),
            source: source.into(),
        }
    }

    pub(crate) fn persist(
        collection: &str,
        key: Option<&str>,
        source: impl Into<BoxedCause>,
    ) -> Self {
        ObjectStoreError::PersistFailure {
            collection: collection.to_string(),
            key: key.map(str::to_string),
            source: source.into(),
        }
    }

    pub(crate) fn not_found(collection: &str, key: &str) -> Self {
        ObjectStoreError::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn version_conflict(
        collection: &str,
        key: &str,
        expected: i64,
        actual: Option<i64>,
    ) -> Self {
        ObjectStoreError::VersionConflict {
            collection: collection.to_string(),
            key: key.to_string(),
            expected,
            actual,
        }
    }
}

struct KeySuffix<'a>(&'a Option<String>);

impl fmt::Display for KeySuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(key) => write!(f, " for object `{}`", key),
            None => Ok(()),
        }
    }
}

struct ActualVersion<'a>(&'a Option<i64>);

impl fmt::Display for ActualVersion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(version) => write!(f, "{}", version),
            None => f.write_str("a newer version"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_version_conflicts_are_retryable() {
        let conflict = ObjectStoreError::version_conflict("orders", "o1", 1, Some(2));
        assert!(conflict.is_retryable());
        assert!(!ObjectStoreError::not_found("orders", "o1").is_retryable());
        assert!(!ObjectStoreError::InvalidArgument("blank".into()).is_retryable());
    }

    #[test]
    fn messages_carry_collection_and_key() {
        let conflict = ObjectStoreError::version_conflict("orders", "o1", 1, Some(2));
        assert_eq!(
            conflict.to_string(),
            "version conflict on object `o1` in collection `orders`: expected 1, found 2"
        );

        let lost = ObjectStoreError::version_conflict("orders", "o1", 3, None);
        assert!(lost.to_string().ends_with("found a newer version"));

        let query = ObjectStoreError::query("orders", None, "boom");
        assert_eq!(query.to_string(), "query failed in collection `orders`");

        let persist = ObjectStoreError::persist("orders", Some("o1"), "boom");
        assert_eq!(
            persist.to_string(),
            "persist failed in collection `orders` for object `o1`"
        );
    }
}
