//! Lookup from serializer identifier to strategy.

use super::Serializer;
use crate::{
    errors::{ObjectStoreError, ObjectStoreResult},
    models::SerializerType,
};
use std::collections::BTreeMap;

/// Fixed set of strategies, immutable once built.
#[derive(Clone, Debug)]
pub struct SerializerRegistry {
    serializers: BTreeMap<SerializerType, Serializer>,
}

impl SerializerRegistry {
    /// Registry restricted to `types`. Objects written with any other
    /// serializer fail with `UnsupportedSerializer`.
    pub fn with_types(types: impl IntoIterator<Item = SerializerType>) -> Self {
        Self {
            serializers: types
                .into_iter()
                .map(|ty| (ty, Serializer::for_type(ty)))
                .collect(),
        }
    }

    pub fn get(&self, serializer_type: SerializerType) -> ObjectStoreResult<&Serializer> {
        self.serializers
            .get(&serializer_type)
            .ok_or_else(|| ObjectStoreError::UnsupportedSerializer(serializer_type.to_string()))
    }

    pub fn supported(&self) -> impl Iterator<Item = SerializerType> + '_ {
        self.serializers.keys().copied()
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::with_types(SerializerType::ALL)
    }
}
