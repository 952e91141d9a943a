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

//! Decision caching for repeated enforcement requests

use crate::config::CacheConfig;
use crate::value::Value;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome of one enforcement
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decision {
    /// Whether the request is permitted
    pub allowed: bool,

    /// Policy rows that produced the outcome, in evaluation order
    pub explain: Vec<Vec<String>>,
}

impl Decision {
    pub fn new(allowed: bool, explain: Vec<Vec<String>>) -> Self {
        Self { allowed, explain }
    }
}

/// Cache key identifying a request under one enforcement context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    /// Derive a fingerprint from the context type names, the request values
    /// and, for ad hoc matchers, the matcher text
    pub fn new(context: &[&str], request: &[Value], matcher: Option<&str>) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in context {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.update(&(request.len() as u64).to_le_bytes());
        for value in request {
            value.hash_into(&mut hasher);
        }
        match matcher {
            Some(text) => {
                hasher.update(&[1]);
                hasher.update(text.as_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        Self(hasher.finalize())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

/// Decision cache consulted before evaluation
///
/// Implementations only need to be a concurrent map: two racing misses for
/// the same key store the same decision.
pub trait Cache: Send + Sync + fmt::Debug {
    fn get(&self, key: &Fingerprint) -> Option<Decision>;

    fn set(&self, key: Fingerprint, decision: Decision);

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> CacheEntry<T> {
    fn new(value: T, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() > at)
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,

    /// Total cache misses
    pub misses: u64,

    /// Entries dropped by expiry or capacity pressure
    pub evictions: u64,

    /// Current cache size
    pub current_size: usize,

    /// Largest size observed
    pub max_size_reached: usize,
}

impl CacheStats {
    /// Calculate hit ratio
    pub fn hit_ratio(&self) -> f64 {
        if self.hits + self.misses == 0 { 0.0 } else { self.hits as f64 / (self.hits + self.misses) as f64 }
    }
}

/// In-memory decision cache with optional TTL and capacity bound
pub struct DefaultCache {
    entries: DashMap<Fingerprint, CacheEntry<Decision>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    max_size_reached: AtomicUsize,
}

impl fmt::Debug for DefaultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultCache").field("config", &self.config).field("len", &self.entries.len()).finish()
    }
}

impl DefaultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            max_size_reached: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Drop expired entries; returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let mut evicted = 0;
        self.entries.retain(|_, entry| {
            if entry.is_expired() {
                evicted += 1;
                false
            } else {
                true
            }
        });

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!("Cleaned up {} expired cache entries", evicted);
        }
        evicted
    }

    pub fn stats(&self) -> CacheStats {
        let stats = CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            current_size: self.entries.len(),
            max_size_reached: self.max_size_reached.load(Ordering::Relaxed),
        };
        if stats.hits + stats.misses > 100 && stats.hit_ratio() < 0.5 {
            warn!("Low decision cache hit ratio: {:.2}%", stats.hit_ratio() * 100.0);
        }
        stats
    }

    /// Make room for one more entry when the capacity bound is reached
    fn make_room(&self, capacity: usize) {
        if self.entries.len() < capacity {
            return;
        }
        self.cleanup_expired();

        while self.entries.len() >= capacity {
            let victim = self.entries.iter().next().map(|entry| *entry.key());
            match victim {
                Some(key) => {
                    if self.entries.remove(&key).is_some() {
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                    }
                }
                None => break,
            }
        }
    }
}

impl Default for DefaultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl Cache for DefaultCache {
    fn get(&self, key: &Fingerprint) -> Option<Decision> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }

        if self.entries.remove_if(key, |_, entry| entry.is_expired()).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn set(&self, key: Fingerprint, decision: Decision) {
        if let Some(capacity) = self.config.capacity {
            if capacity == 0 {
                return;
            }
            if !self.entries.contains_key(&key) {
                self.make_room(capacity);
            }
        }
        self.entries.insert(key, CacheEntry::new(decision, self.config.ttl));
        self.max_size_reached.fetch_max(self.entries.len(), Ordering::Relaxed);
    }

    fn clear(&self) {
        self.entries.clear();
        debug!("Cleared all decision cache entries");
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
