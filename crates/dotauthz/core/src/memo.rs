// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Capacity-bounded concurrent memo tables for derived values

use dashmap::DashMap;
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use tracing::trace;

/// Concurrent map holding at most `capacity` entries
///
/// Entries are recomputable, so when the bound is reached arbitrary entries
/// are dropped to make room for the new one.
pub(crate) struct BoundedMemo<K: Eq + Hash, V> {
    entries: DashMap<K, V>,
    capacity: usize,
}

impl<K: Eq + Hash, V> fmt::Debug for BoundedMemo<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedMemo").field("len", &self.entries.len()).field("capacity", &self.capacity).finish()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedMemo<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub(crate) fn insert(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&key) {
            self.make_room();
        }
        self.entries.insert(key, value);
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn make_room(&self) {
        let mut evicted = 0usize;
        while self.len() >= self.capacity {
            let victim = self.entries.iter().next().map(|entry| entry.key().clone());
            match victim {
                Some(key) => {
                    if self.entries.remove(&key).is_some() {
                        evicted += 1;
                    }
                }
                None => break,
            }
        }
        if evicted > 0 {
            trace!(evicted, capacity = self.capacity, "Memo entries evicted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_never_exceeded() {
        let memo = BoundedMemo::new(8);
        for i in 0..1000 {
            memo.insert(format!("key{}", i), i);
            assert!(memo.len() <= 8);
        }
        assert_eq!(memo.get("key999"), Some(999));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let memo = BoundedMemo::new(2);
        memo.insert("a".to_string(), 1);
        memo.insert("b".to_string(), 2);
        memo.insert("a".to_string(), 3);
        assert_eq!(memo.get("a"), Some(3));
        assert_eq!(memo.get("b"), Some(2));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let memo: BoundedMemo<String, bool> = BoundedMemo::new(0);
        memo.insert("a".to_string(), true);
        assert_eq!(memo.len(), 0);
        memo.clear();
        assert!(memo.get("a").is_none());
    }
}
