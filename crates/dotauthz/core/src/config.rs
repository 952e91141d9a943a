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

//! Configuration for the enforcer and its decision cache

use crate::rbac::DEFAULT_MAX_HIERARCHY_LEVEL;
use std::env;
use std::time::Duration;

/// Behavioural switches of an [`crate::Enforcer`]
#[derive(Debug, Clone, PartialEq)]
pub struct EnforcerConfig {
    /// When false every enforcement call returns `true` without evaluating
    pub enabled: bool,

    /// Forward policy mutations to the adapter
    pub auto_save: bool,

    /// Keep role graphs in sync with grouping-policy mutations
    pub auto_build_role_links: bool,

    /// Notify the watcher after each mutation
    pub auto_notify_watcher: bool,

    /// Clear the decision cache after each mutation
    pub auto_clean_cache: bool,

    /// Hop bound for role inheritance
    pub max_hierarchy_level: usize,

    /// Bounded wait for the state lock (`None` blocks)
    pub lock_timeout: Option<Duration>,

    /// Worker threads for batch enforcement (0 = rayon default)
    pub batch_parallelism: usize,

    /// Enforcement calls slower than this are logged at warn level
    pub slow_enforce_threshold: Duration,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_save: true,
            auto_build_role_links: true,
            auto_notify_watcher: true,
            auto_clean_cache: true,
            max_hierarchy_level: DEFAULT_MAX_HIERARCHY_LEVEL,
            lock_timeout: None,
            batch_parallelism: 0,
            slow_enforce_threshold: Duration::from_millis(5),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).map(|v| v.parse().unwrap_or(default)).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).map(|v| v.parse().unwrap_or(default)).unwrap_or(default)
}

fn env_millis(key: &str) -> Option<Duration> {
    env::var(key).ok().and_then(|v| v.parse::<u64>().ok()).map(Duration::from_millis)
}

impl EnforcerConfig {
    /// Load configuration from `DOTAUTHZ_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_bool("DOTAUTHZ_ENABLED", defaults.enabled),

            auto_save: env_bool("DOTAUTHZ_AUTO_SAVE", defaults.auto_save),

            auto_build_role_links: env_bool("DOTAUTHZ_AUTO_BUILD_ROLE_LINKS", defaults.auto_build_role_links),

            auto_notify_watcher: env_bool("DOTAUTHZ_AUTO_NOTIFY_WATCHER", defaults.auto_notify_watcher),

            auto_clean_cache: env_bool("DOTAUTHZ_AUTO_CLEAN_CACHE", defaults.auto_clean_cache),

            max_hierarchy_level: env_usize("DOTAUTHZ_MAX_HIERARCHY_LEVEL", defaults.max_hierarchy_level),

            lock_timeout: env_millis("DOTAUTHZ_LOCK_TIMEOUT_MS").or(defaults.lock_timeout),

            batch_parallelism: env_usize("DOTAUTHZ_BATCH_PARALLELISM", defaults.batch_parallelism),

            slow_enforce_threshold: env_millis("DOTAUTHZ_SLOW_ENFORCE_MS").unwrap_or(defaults.slow_enforce_threshold),
        }
    }
}

/// Settings for [`crate::cache::DefaultCache`]
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Entries older than this are treated as misses (`None` = never expire)
    pub ttl: Option<Duration>,

    /// Maximum number of entries (`None` = unbounded)
    pub capacity: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            capacity: Some(10_000),
        }
    }
}

impl CacheConfig {
    /// Load configuration from `DOTAUTHZ_CACHE_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ttl: env_millis("DOTAUTHZ_CACHE_TTL_MS").or(defaults.ttl),
            capacity: env::var("DOTAUTHZ_CACHE_CAPACITY").ok().and_then(|v| v.parse().ok()).or(defaults.capacity),
        }
    }
}
