//! Run-scoped resource cache for stateful tools.

use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use anyhow::{Result, anyhow};

/// Resources opened by tools during one run, keyed by tool-defined keys.
///
/// Owned by the run's [`super::Dispatcher`] and dropped with it.
#[derive(Default)]
pub struct ResourceCache {
    entries: HashMap<String, Box<dyn Any>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(|entry| entry.downcast_ref())
    }

    pub fn insert<T: Any>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Box::new(value));
    }

    /// Return the cached value for `key`, building it with `init` on first use.
    pub fn get_or_try_insert_with<T: Any>(
        &mut self,
        key: &str,
        init: impl FnOnce() -> Result<T>,
    ) -> Result<&mut T> {
        let slot = match self.entries.entry(key.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(Box::new(init()?)),
        };
        slot.downcast_mut()
            .ok_or_else(|| anyhow!("resource '{key}' holds a different type"))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("ResourceCache").field("keys", &keys).finish()
    }
}
