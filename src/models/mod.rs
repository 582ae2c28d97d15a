//! Core data models for the relational object store.
//!
//! `StoredObject` maps one row of the backing table via `sqlx::FromRow`;
//! everything else here is what callers see: the bookkeeping projection
//! (`EntityMeta`), the serializer tag and the queryable property bag.

pub mod entity_meta;
pub mod object;
pub mod properties;
pub mod serializer_type;
pub mod timestamp;

pub use entity_meta::EntityMeta;
pub use properties::Properties;
pub use serializer_type::SerializerType;
