//  Copyright 2025 rezex authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! The external, duck-typed handle spec.md §4.6/§7 describes: a value
//! that can be "null" or "used after release". `PatternHandle` itself
//! is a move-only, `Arc`-backed Rust value with no such states - a
//! double-release of it would be a compile error, not the runtime-
//! checked `InvalidHandle` the spec requires. `HandleTable` is the
//! boundary that turns a `PatternHandle` into that kind of value: an
//! opaque `HandleId` a caller can hold, pass back, and - if they pass it
//! back twice - get told about (P1).

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::Mutex;
use rezex_cache::PatternHandle;
use rezex_common::RezexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

pub struct HandleTable {
    next_id: AtomicU64,
    slots: Mutex<HashMap<u64, PatternHandle, ahash::RandomState>>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            slots: Mutex::new(HashMap::with_hasher(ahash::RandomState::default())),
        }
    }

    pub fn insert(&self, handle: PatternHandle) -> HandleId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().insert(id, handle);
        HandleId(id)
    }

    /// A cheap `Arc` clone, not a move: callers may issue many
    /// operations against the same `HandleId` without releasing it.
    pub fn get(&self, id: HandleId) -> Result<PatternHandle, RezexError> {
        self.slots
            .lock()
            .get(&id.0)
            .cloned()
            .ok_or(RezexError::InvalidHandle)
    }

    /// Removes the slot and hands the underlying `PatternHandle` back
    /// to the caller so `PatternCache::release` can drop its refcount
    /// clone. A second call with the same `id` finds nothing and
    /// reports `InvalidHandle` rather than silently double-decrementing
    /// - this is P1.
    pub fn release(&self, id: HandleId) -> Result<PatternHandle, RezexError> {
        self.slots.lock().remove(&id.0).ok_or(RezexError::InvalidHandle)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use rezex_cache::{CacheConfig, PatternCache};
    use rezex_common::options::PatternOptions;

    use super::*;

    #[test]
    fn double_release_is_reported_as_invalid_handle() {
        let pc = PatternCache::new(CacheConfig::default());
        let handle = pc.get_or_compile(b"a+", PatternOptions::default(), 0).unwrap();
        let table = HandleTable::new();
        let id = table.insert(handle);

        assert!(table.release(id).is_ok());
        assert!(matches!(table.release(id), Err(RezexError::InvalidHandle)));
    }

    #[test]
    fn unknown_id_is_invalid_handle() {
        let table = HandleTable::new();
        assert!(matches!(table.get(HandleId(42)), Err(RezexError::InvalidHandle)));
    }

    #[test]
    fn get_does_not_consume_the_slot() {
        let pc = PatternCache::new(CacheConfig::default());
        let handle = pc.get_or_compile(b"a+", PatternOptions::default(), 0).unwrap();
        let table = HandleTable::new();
        let id = table.insert(handle);

        assert!(table.get(id).is_ok());
        assert!(table.get(id).is_ok());
        assert_eq!(table.len(), 1);
    }
}
