//! src/services/object_store.rs
//!
//! ObjectStore: versioned CRUD over a single SQLite table. Payloads are
//! encoded by the serializer chosen at creation, properties are stored as a
//! JSON object and matched by containment, and expired rows are hidden from
//! reads by a query-time filter rather than removed by a reaper.

use crate::{
    config::StoreConfig,
    db,
    errors::{ObjectStoreError, ObjectStoreResult},
    models::{
        EntityMeta, Properties, SerializerType,
        object::StoredObject,
        properties::{json_path, sqlite_json_type},
        timestamp,
    },
    serializers::{ObjectSerializer, SerializerRegistry, serialization_failure},
};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use sqlx::{QueryBuilder, SqliteConnection, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use tracing::{debug, warn};

const SELECT_OBJECTS: &str = "SELECT collection_id, object_key, version, serializer_type, \
     object_data, properties, expiration_time FROM stored_objects WHERE collection_id = ";

/// ObjectStore exposes the object lifecycle:
/// - create an object at version 1 under `(collection, key)`
/// - read one object, a whole collection, or the objects whose properties
///   contain a given set, skipping expired rows
/// - update with an expected version (compare-and-swap on `version`)
/// - expire, delete and count
///
/// Every operation runs in its own transaction. The struct holds no mutable
/// state and is cheap to clone across tasks.
#[derive(Clone)]
pub struct ObjectStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,

    /// Strategies used to encode and decode payloads.
    serializers: Arc<SerializerRegistry>,
}

impl ObjectStore {
    /// Create an ObjectStore over an already migrated pool, with both
    /// serializers registered.
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self::with_registry(db, SerializerRegistry::default())
    }

    pub fn with_registry(db: Arc<SqlitePool>, serializers: SerializerRegistry) -> Self {
        Self {
            db,
            serializers: Arc::new(serializers),
        }
    }

    /// Connect using `cfg` and make sure the schema exists.
    pub async fn open(cfg: &StoreConfig) -> Result<Self, sqlx::Error> {
        let pool = db::connect(cfg).await?;
        db::run_migrations(&pool).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Store a new object at version 1.
    ///
    /// An expired row still holding the key is removed first, so only live
    /// objects collide. Returns DuplicateKey when a live object already uses
    /// `(collection, key)`.
    pub async fn create<T>(
        &self,
        collection: &str,
        key: &str,
        serializer_type: SerializerType,
        properties: &Properties,
        value: &T,
        expiration_time: Option<DateTime<Utc>>,
    ) -> ObjectStoreResult<EntityMeta>
    where
        T: Serialize + ?Sized,
    {
        ensure_collection(collection)?;
        ensure_key(key)?;
        properties.validate()?;
        let expiration_time = expiration_time.map(normalize).transpose()?;

        let props = encode_properties(collection, key, properties)?;
        let data = self
            .serializers
            .get(serializer_type)?
            .serialize(collection, key, value)?;
        let persist_err = |err: sqlx::Error| ObjectStoreError::persist(collection, Some(key), err);

        let mut tx = self.db.begin().await.map_err(persist_err)?;

        let purged = sqlx::query(
            "DELETE FROM stored_objects
             WHERE collection_id = ? AND object_key = ?
               AND expiration_time IS NOT NULL AND expiration_time <= ?",
        )
        .bind(collection)
        .bind(key)
        .bind(now_text())
        .execute(&mut *tx)
        .await
        .map_err(persist_err)?
        .rows_affected();
        if purged > 0 {
            debug!(collection, key, "replacing expired object");
        }

        let inserted = sqlx::query(
            "INSERT INTO stored_objects (
                collection_id, object_key, version, serializer_type,
                object_data, properties, expiration_time
             ) VALUES (?, ?, 1, ?, ?, ?, ?)",
        )
        .bind(collection)
        .bind(key)
        .bind(serializer_type.as_str())
        .bind(&data)
        .bind(&props)
        .bind(expiration_time.as_ref().map(timestamp::format_utc))
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(result) if result.rows_affected() == 1 => {}
            Ok(result) => {
                return Err(ObjectStoreError::persist(
                    collection,
                    Some(key),
                    format!("expected 1 inserted row, got {}", result.rows_affected()),
                ));
            }
            Err(err) if is_unique_violation(&err) => {
                return Err(ObjectStoreError::DuplicateKey {
                    collection: collection.to_string(),
                    key: key.to_string(),
                });
            }
            Err(err) => return Err(persist_err(err)),
        }

        tx.commit().await.map_err(persist_err)?;
        debug!(collection, key, %serializer_type, "created object");

        Ok(EntityMeta {
            collection: collection.to_string(),
            object_key: key.to_string(),
            serializer_type,
            version: 1,
            expiration_time,
        })
    }

    /// Fetch and decode the live object at `(collection, key)`.
    pub async fn find<T>(&self, collection: &str, key: &str) -> ObjectStoreResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        ensure_collection(collection)?;
        ensure_key(key)?;
        let query_err = |err: sqlx::Error| ObjectStoreError::query(collection, Some(key), err);

        let mut tx = self.db.begin().await.map_err(query_err)?;
        let row = fetch_live(&mut tx, collection, key).await?;
        tx.commit().await.map_err(query_err)?;

        row.map(|row| self.decode(&row)).transpose()
    }

    /// Bookkeeping of the live object at `(collection, key)`, without decoding
    /// the payload. Lets a caller learn the current version after a conflict.
    pub async fn find_meta(
        &self,
        collection: &str,
        key: &str,
    ) -> ObjectStoreResult<Option<EntityMeta>> {
        ensure_collection(collection)?;
        ensure_key(key)?;
        let query_err = |err: sqlx::Error| ObjectStoreError::query(collection, Some(key), err);

        let mut tx = self.db.begin().await.map_err(query_err)?;
        let row = fetch_live(&mut tx, collection, key).await?;
        tx.commit().await.map_err(query_err)?;

        row.map(|row| row.meta()).transpose()
    }

    /// Decode every live object of a collection. Order is not significant.
    pub async fn find_by_collection<T>(&self, collection: &str) -> ObjectStoreResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.find_matching(collection, None).await
    }

    /// Decode every live object whose properties contain all of `properties`.
    pub async fn find_by_properties<T>(
        &self,
        collection: &str,
        properties: &Properties,
    ) -> ObjectStoreResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        properties.validate()?;
        self.find_matching(collection, Some(properties)).await
    }

    pub async fn count_by_collection(&self, collection: &str) -> ObjectStoreResult<u64> {
        self.count_matching(collection, None).await
    }

    pub async fn count_by_properties(
        &self,
        collection: &str,
        properties: &Properties,
    ) -> ObjectStoreResult<u64> {
        properties.validate()?;
        self.count_matching(collection, Some(properties)).await
    }

    /// Remove the object at `(collection, key)` whether or not it expired.
    /// Returns the number of rows removed (0 or 1).
    pub async fn delete(&self, collection: &str, key: &str) -> ObjectStoreResult<u64> {
        ensure_collection(collection)?;
        ensure_key(key)?;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "DELETE FROM stored_objects WHERE collection_id = ",
        );
        builder.push_bind(collection.to_string());
        builder.push(" AND object_key = ");
        builder.push_bind(key.to_string());

        self.execute_delete(collection, Some(key), builder).await
    }

    /// Remove every object of a collection, expired ones included.
    pub async fn delete_by_collection(&self, collection: &str) -> ObjectStoreResult<u64> {
        ensure_collection(collection)?;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "DELETE FROM stored_objects WHERE collection_id = ",
        );
        builder.push_bind(collection.to_string());

        self.execute_delete(collection, None, builder).await
    }

    /// Remove every object whose properties contain all of `properties`,
    /// expired ones included.
    pub async fn delete_by_properties(
        &self,
        collection: &str,
        properties: &Properties,
    ) -> ObjectStoreResult<u64> {
        ensure_collection(collection)?;
        properties.validate()?;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "DELETE FROM stored_objects WHERE collection_id = ",
        );
        builder.push_bind(collection.to_string());
        push_containment(&mut builder, properties);

        self.execute_delete(collection, None, builder).await
    }

    /// Housekeeping: physically remove objects of a collection whose
    /// expiration time has passed.
    pub async fn delete_expired(&self, collection: &str) -> ObjectStoreResult<u64> {
        ensure_collection(collection)?;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "DELETE FROM stored_objects WHERE collection_id = ",
        );
        builder.push_bind(collection.to_string());
        builder.push(" AND expiration_time IS NOT NULL AND expiration_time <= ");
        builder.push_bind(now_text());

        self.execute_delete(collection, None, builder).await
    }

    /// Replace the payload and properties of a live object, provided it is
    /// still at `expected_version`.
    ///
    /// The payload is re-encoded with the serializer the object was created
    /// with. `expiration_time = None` keeps the stored expiration. Fails with
    /// NotFound when no live object exists and VersionConflict when the
    /// stored version differs or a concurrent writer got there first.
    pub async fn update<T>(
        &self,
        collection: &str,
        key: &str,
        expected_version: i64,
        properties: &Properties,
        value: &T,
        expiration_time: Option<DateTime<Utc>>,
    ) -> ObjectStoreResult<EntityMeta>
    where
        T: Serialize + ?Sized,
    {
        ensure_collection(collection)?;
        ensure_key(key)?;
        ensure_version(expected_version)?;
        properties.validate()?;
        let expiration_time = expiration_time.map(normalize).transpose()?;

        let props = encode_properties(collection, key, properties)?;

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|err| write_failure(collection, key, expected_version, err))?;

        let current = self
            .checked_current(&mut tx, collection, key, expected_version)
            .await?;
        let meta = current.meta()?;
        let data = self
            .serializers
            .get(meta.serializer_type)?
            .serialize(collection, key, value)?;

        let now = now_text();
        let affected = sqlx::query(
            "UPDATE stored_objects
             SET version = ?, properties = ?, object_data = ?,
                 expiration_time = COALESCE(?, expiration_time)
             WHERE collection_id = ? AND object_key = ? AND version = ?
               AND (expiration_time IS NULL OR expiration_time > ?)",
        )
        .bind(expected_version + 1)
        .bind(&props)
        .bind(&data)
        .bind(expiration_time.as_ref().map(timestamp::format_utc))
        .bind(collection)
        .bind(key)
        .bind(expected_version)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|err| write_failure(collection, key, expected_version, err))?
        .rows_affected();

        ensure_swapped(collection, key, expected_version, affected)?;
        tx.commit()
            .await
            .map_err(|err| write_failure(collection, key, expected_version, err))?;
        debug!(collection, key, version = expected_version + 1, "updated object");

        Ok(EntityMeta {
            version: expected_version + 1,
            expiration_time: expiration_time.or(meta.expiration_time),
            ..meta
        })
    }

    /// Set the expiration time of a live object, keeping its payload and
    /// properties. Counts as a modification: the version is bumped.
    pub async fn expire(
        &self,
        collection: &str,
        key: &str,
        expiration_time: DateTime<Utc>,
    ) -> ObjectStoreResult<EntityMeta> {
        ensure_collection(collection)?;
        ensure_key(key)?;
        let expiration_time = normalize(expiration_time)?;
        let query_err = |err: sqlx::Error| ObjectStoreError::query(collection, Some(key), err);

        let mut tx = self.db.begin().await.map_err(query_err)?;

        let current = fetch_live(&mut tx, collection, key)
            .await?
            .ok_or_else(|| ObjectStoreError::not_found(collection, key))?;
        let meta = current.meta()?;
        let version = meta.version;

        let now = now_text();
        let affected = sqlx::query(
            "UPDATE stored_objects
             SET version = ?, expiration_time = ?
             WHERE collection_id = ? AND object_key = ? AND version = ?
               AND (expiration_time IS NULL OR expiration_time > ?)",
        )
        .bind(version + 1)
        .bind(timestamp::format_utc(&expiration_time))
        .bind(collection)
        .bind(key)
        .bind(version)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|err| write_failure(collection, key, version, err))?
        .rows_affected();

        ensure_swapped(collection, key, version, affected)?;
        tx.commit()
            .await
            .map_err(|err| write_failure(collection, key, version, err))?;
        debug!(collection, key, version = version + 1, %expiration_time, "expiration set");

        Ok(EntityMeta {
            version: version + 1,
            expiration_time: Some(expiration_time),
            ..meta
        })
    }

    /// Steps one to three of an update: the live row must exist and sit at
    /// `expected_version`.
    async fn checked_current(
        &self,
        conn: &mut SqliteConnection,
        collection: &str,
        key: &str,
        expected_version: i64,
    ) -> ObjectStoreResult<StoredObject> {
        let current = fetch_live(conn, collection, key)
            .await?
            .ok_or_else(|| ObjectStoreError::not_found(collection, key))?;

        if current.version != expected_version {
            warn!(
                collection,
                key,
                expected = expected_version,
                actual = current.version,
                "stale version"
            );
            return Err(ObjectStoreError::version_conflict(
                collection,
                key,
                expected_version,
                Some(current.version),
            ));
        }
        Ok(current)
    }

    async fn find_matching<T>(
        &self,
        collection: &str,
        properties: Option<&Properties>,
    ) -> ObjectStoreResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        ensure_collection(collection)?;
        let query_err = |err: sqlx::Error| ObjectStoreError::query(collection, None, err);

        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_OBJECTS);
        builder.push_bind(collection.to_string());
        push_live_filter(&mut builder);
        if let Some(properties) = properties {
            push_containment(&mut builder, properties);
        }
        builder.push(" ORDER BY id ASC");

        let mut tx = self.db.begin().await.map_err(query_err)?;
        let rows: Vec<StoredObject> = builder
            .build_query_as()
            .fetch_all(&mut *tx)
            .await
            .map_err(query_err)?;
        tx.commit().await.map_err(query_err)?;

        debug!(collection, matched = rows.len(), "query matched objects");
        rows.iter().map(|row| self.decode(row)).collect()
    }

    async fn count_matching(
        &self,
        collection: &str,
        properties: Option<&Properties>,
    ) -> ObjectStoreResult<u64> {
        ensure_collection(collection)?;
        let query_err = |err: sqlx::Error| ObjectStoreError::query(collection, None, err);

        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM stored_objects WHERE collection_id = ");
        builder.push_bind(collection.to_string());
        push_live_filter(&mut builder);
        if let Some(properties) = properties {
            push_containment(&mut builder, properties);
        }

        let mut tx = self.db.begin().await.map_err(query_err)?;
        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&mut *tx)
            .await
            .map_err(query_err)?;
        tx.commit().await.map_err(query_err)?;

        Ok(count.max(0) as u64)
    }

    async fn execute_delete(
        &self,
        collection: &str,
        key: Option<&str>,
        mut builder: QueryBuilder<'_, Sqlite>,
    ) -> ObjectStoreResult<u64> {
        let persist_err = |err: sqlx::Error| ObjectStoreError::persist(collection, key, err);

        let mut tx = self.db.begin().await.map_err(persist_err)?;
        let removed = builder
            .build()
            .execute(&mut *tx)
            .await
            .map_err(persist_err)?
            .rows_affected();
        tx.commit().await.map_err(persist_err)?;

        debug!(collection, key, removed, "deleted objects");
        Ok(removed)
    }

    /// Decode a row's payload with the serializer recorded on the row.
    fn decode<T>(&self, row: &StoredObject) -> ObjectStoreResult<T>
    where
        T: DeserializeOwned,
    {
        self.serializers
            .get(row.serializer()?)?
            .deserialize(&row.collection, &row.object_key, &row.object_data)
    }
}

/// Fetch the live row for `(collection, key)`. More than one match means the
/// uniqueness constraint is broken and is reported rather than picked from.
async fn fetch_live(
    conn: &mut SqliteConnection,
    collection: &str,
    key: &str,
) -> ObjectStoreResult<Option<StoredObject>> {
    let mut builder = QueryBuilder::<Sqlite>::new(SELECT_OBJECTS);
    builder.push_bind(collection.to_string());
    builder.push(" AND object_key = ");
    builder.push_bind(key.to_string());
    push_live_filter(&mut builder);

    let mut rows: Vec<StoredObject> = builder
        .build_query_as()
        .fetch_all(&mut *conn)
        .await
        .map_err(|err| ObjectStoreError::query(collection, Some(key), err))?;

    if rows.len() > 1 {
        return Err(ObjectStoreError::query(
            collection,
            Some(key),
            format!("expected at most one live object, found {}", rows.len()),
        ));
    }
    Ok(rows.pop())
}

/// Liveness: no expiration, or an expiration still in the future.
fn push_live_filter(builder: &mut QueryBuilder<'_, Sqlite>) {
    builder.push(" AND (expiration_time IS NULL OR expiration_time > ");
    builder.push_bind(now_text());
    builder.push(")");
}

/// Containment over the `properties` column.
///
/// SQLite has no JSON containment operator, so each query entry becomes a
/// `json_type` check plus, for values that carry more than their type, a
/// `json_extract` equality against the query value parsed by SQLite itself.
/// Stored properties are written with sorted keys, which keeps nested objects
/// textually comparable.
fn push_containment(builder: &mut QueryBuilder<'_, Sqlite>, properties: &Properties) {
    for (name, value) in properties.iter() {
        builder.push(" AND json_type(properties, ");
        builder.push_bind(json_path(name));
        builder.push(") = ");
        builder.push_bind(sqlite_json_type(value));

        if !matches!(value, Value::Null | Value::Bool(_)) {
            builder.push(" AND json_extract(properties, ");
            builder.push_bind(json_path(name));
            builder.push(") = json_extract(");
            builder.push_bind(value.to_string());
            builder.push(", '$')");
        }
    }
}

/// Outcome of the compare-and-swap write.
fn ensure_swapped(
    collection: &str,
    key: &str,
    expected_version: i64,
    affected: u64,
) -> ObjectStoreResult<()> {
    match affected {
        1 => Ok(()),
        0 => {
            warn!(collection, key, expected = expected_version, "lost update race");
            Err(ObjectStoreError::version_conflict(
                collection,
                key,
                expected_version,
                None,
            ))
        }
        affected => Err(ObjectStoreError::MultipleRowsAffected {
            collection: collection.to_string(),
            key: key.to_string(),
            affected,
        }),
    }
}

/// A busy database during the conditional write means another transaction
/// wrote first; anything else is a persistence failure.
fn write_failure(
    collection: &str,
    key: &str,
    expected_version: i64,
    err: sqlx::Error,
) -> ObjectStoreError {
    if is_write_contention(&err) {
        warn!(collection, key, expected = expected_version, "write contention: {}", err);
        ObjectStoreError::version_conflict(collection, key, expected_version, None)
    } else {
        ObjectStoreError::persist(collection, Some(key), err)
    }
}

fn encode_properties(
    collection: &str,
    key: &str,
    properties: &Properties,
) -> ObjectStoreResult<String> {
    serde_json::to_string(properties).map_err(|err| serialization_failure(collection, key, err))
}

fn ensure_collection(collection: &str) -> ObjectStoreResult<()> {
    if collection.trim().is_empty() {
        return Err(ObjectStoreError::InvalidArgument(
            "collection must not be blank".into(),
        ));
    }
    Ok(())
}

fn ensure_key(key: &str) -> ObjectStoreResult<()> {
    if key.trim().is_empty() {
        return Err(ObjectStoreError::InvalidArgument(
            "object key must not be blank".into(),
        ));
    }
    Ok(())
}

fn ensure_version(version: i64) -> ObjectStoreResult<()> {
    if version <= 0 {
        return Err(ObjectStoreError::InvalidArgument(format!(
            "version must be a positive number, got {}",
            version
        )));
    }
    Ok(())
}

/// Stored expirations keep microseconds and a four-digit year.
fn normalize(time: DateTime<Utc>) -> ObjectStoreResult<DateTime<Utc>> {
    if !timestamp::is_storable(&time) {
        return Err(ObjectStoreError::InvalidArgument(format!(
            "expiration time {} is outside years 0000 to 9999",
            time
        )));
    }
    Ok(time.trunc_subsecs(6))
}

fn now_text() -> String {
    timestamp::format_utc(&Utc::now())
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// SQLITE_BUSY and its extended BUSY_RECOVERY / BUSY_SNAPSHOT codes.
fn is_write_contention(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if matches!(db_err.code().as_deref(), Some("5" | "261" | "517"))
    )
}
