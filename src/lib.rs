//! A versioned object store on top of one relational table.
//!
//! Values of any serde type are stored under a `(collection, key)` address,
//! tagged with free-form JSON properties for containment queries, optionally
//! given an expiration time, and updated under optimistic concurrency control:
//! every update names the version it expects and loses with
//! [`ObjectStoreError::VersionConflict`] if someone else got there first.
//!
//! ```rust,no_run
//! use objstore::{ObjectStore, Properties, SerializerType, StoreConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ObjectStore::open(&StoreConfig::from_env()?).await?;
//!
//! let props = Properties::new().with("status", "new");
//! let meta = store
//!     .create("orders", "o1", SerializerType::Json, &props, &vec![1, 2, 3], None)
//!     .await?;
//!
//! let paid = Properties::new().with("status", "paid");
//! store
//!     .update("orders", "o1", meta.version, &paid, &vec![1, 2, 3, 4], None)
//!     .await?;
//!
//! let found: Option<Vec<i32>> = store.find("orders", "o1").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod serializers;
pub mod services;

pub use config::StoreConfig;
pub use errors::{ObjectStoreError, ObjectStoreResult};
pub use models::{EntityMeta, Properties, SerializerType};
pub use serializers::{ObjectSerializer, Serializer, SerializerRegistry};
pub use services::object_store::ObjectStore;
