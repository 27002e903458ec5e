//! Executor-side reference table.

use std::collections::HashMap;

use crate::runtime::value::Value;

/// Values retained on behalf of the host, keyed by the id of the request
/// that produced them.
///
/// Presence decides whether an entry exists: a stored `null`, `false` or `0`
/// is as valid as any other value.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    entries: HashMap<u64, Value>,
}

impl ReferenceTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `id`, replacing any previous entry.
    pub fn insert(&mut self, id: u64, value: Value) {
        self.entries.insert(id, value);
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&Value> {
        self.entries.get(&id)
    }

    /// Remove an entry, returning it if it existed.
    pub fn remove(&mut self, id: u64) -> Option<Value> {
        self.entries.remove(&id)
    }

    /// Whether `id` has an entry.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
