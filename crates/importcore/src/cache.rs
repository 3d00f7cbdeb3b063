//! Shared content cache for resolved imports.
//!
//! Keys pair the chained target with its pinned digest. Entries are
//! immutable once published. Each key owns a slot mutex: the first task to
//! lock an empty slot computes the value while later tasks for the same key
//! block on the lock, so at most one fetch per key runs.

use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use marlang::{Expr, Fetchable};

pub type CacheKey = (Fetchable, Option<String>);

type Slot = Arc<Mutex<Option<Expr>>>;

#[derive(Clone, Default)]
pub struct Cache {
    slots: Arc<DashMap<CacheKey, Slot>>,
}

impl Cache {
    pub fn new() -> Cache {
        Cache::default()
    }

    /// The slot for `key`, created empty on first use.
    pub(crate) fn slot(&self, key: CacheKey) -> Slot {
        self.slots.entry(key).or_default().clone()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

pub(crate) fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<Expr>> {
    match slot.lock() {
        Ok(guard) => guard,
        // a poisoned slot only ever holds a published, immutable value
        Err(poisoned) => poisoned.into_inner(),
    }
}
