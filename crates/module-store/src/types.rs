//! Record trait and on-disk layout.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A struct that can be persisted in a [`Bucket`](crate::Bucket).
///
/// Records of the same `KIND` share an id sequence inside a bucket. An id of
/// `0` means "not saved yet"; saving such a record assigns the next id.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Collection name for this record type.
    const KIND: &'static str;

    fn id(&self) -> u64;

    fn set_id(&mut self, id: u64);
}

/// Records of one kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Collection {
    pub last_id: u64,
    pub records: BTreeMap<u64, serde_json::Value>,
}

/// All collections owned by one namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Namespace {
    pub collections: BTreeMap<String, Collection>,
}

/// Whole database image, as written to disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Database {
    pub namespaces: BTreeMap<String, Namespace>,
}

impl Database {
    pub fn collection(&self, namespace: &str, kind: &str) -> Option<&Collection> {
        self.namespaces
            .get(namespace)
            .and_then(|ns| ns.collections.get(kind))
    }

    pub fn collection_mut(&mut self, namespace: &str, kind: &str) -> &mut Collection {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .collections
            .entry(kind.to_string())
            .or_default()
    }

    pub fn record_count(&self) -> usize {
        self.namespaces
            .values()
            .flat_map(|ns| ns.collections.values())
            .map(|c| c.records.len())
            .sum()
    }
}
