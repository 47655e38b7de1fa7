use super::types::{ClientKey, WindowRecord};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;

/// Key of one window record: client key plus the counted path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey(String);

impl StoreKey {
    pub fn new(client: &ClientKey, path: &str) -> Self {
        Self(format!("{}|{}", client, path))
    }

    /// Key in a separate namespace, e.g. `admin` for the strict admin policy
    pub fn namespaced(namespace: &str, client: &ClientKey, path: &str) -> Self {
        Self(format!("{}:{}|{}", namespace, client, path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for window records.
///
/// `update` is the only read-modify-write entry point and must be atomic per
/// key: the closure sees the current slot and leaves the new one behind
/// (`None` deletes). Implementations backed by a shared key-value store
/// would map it onto a script or compare-and-swap.
pub trait WindowStore: Send + Sync {
    fn get(&self, key: &StoreKey) -> Option<WindowRecord>;

    fn set(&self, key: StoreKey, record: WindowRecord);

    fn delete(&self, key: &StoreKey) -> Option<WindowRecord>;

    /// Atomically apply `apply` to the slot for `key`
    fn update(&self, key: &StoreKey, apply: &mut dyn FnMut(&mut Option<WindowRecord>));

    /// Keep only the records for which `keep` returns true; returns how many were removed
    fn retain(&self, keep: &mut dyn FnMut(&StoreKey, &WindowRecord) -> bool) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process window store.
///
/// Locking is per `DashMap` shard, so updates on unrelated keys rarely contend.
#[derive(Debug, Default)]
pub struct InMemoryWindowStore {
    records: DashMap<StoreKey, WindowRecord>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WindowStore for InMemoryWindowStore {
    fn get(&self, key: &StoreKey) -> Option<WindowRecord> {
        self.records.get(key).map(|r| *r.value())
    }

    fn set(&self, key: StoreKey, record: WindowRecord) {
        self.records.insert(key, record);
    }

    fn delete(&self, key: &StoreKey) -> Option<WindowRecord> {
        self.records.remove(key).map(|(_, record)| record)
    }

    fn update(&self, key: &StoreKey, apply: &mut dyn FnMut(&mut Option<WindowRecord>)) {
        // The entry guard holds the shard write lock for the whole closure
        match self.records.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let mut slot = Some(*occupied.get());
                apply(&mut slot);
                match slot {
                    Some(record) => {
                        occupied.insert(record);
                    }
                    None => {
                        occupied.remove();
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let mut slot = None;
                apply(&mut slot);
                if let Some(record) = slot {
                    vacant.insert(record);
                }
            }
        }
    }

    fn retain(&self, keep: &mut dyn FnMut(&StoreKey, &WindowRecord) -> bool) -> usize {
        let before = self.records.len();
        self.records.retain(|key, record| keep(key, record));
        before.saturating_sub(self.records.len())
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
