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

//! Dotlanth authorization engine
//!
//! This crate evaluates access requests against a declarative model (request,
//! policy, role, effect and matcher definitions) and the policy rows stored
//! under it. Role inheritance is answered by per-type role graphs, matchers are
//! compiled once per request/policy type pair, and decisions are optionally
//! cached until the next policy mutation.

pub mod adapter;
pub mod cache;
pub mod config;
pub mod effect;
pub mod enforcer;
pub mod error;
pub mod matcher;
mod memo;
pub mod model;
pub mod rbac;
pub mod value;
pub mod watcher;

pub use adapter::{Adapter, MemoryAdapter, NullAdapter, PolicyLine};
pub use cache::{Cache, CacheStats, Decision, DefaultCache, Fingerprint};
pub use config::{CacheConfig, EnforcerConfig};
pub use effect::{Effect, EffectKind};
pub use enforcer::{BatchOptions, EnforceContext, Enforcer, EnforcerBuilder};
pub use error::{AdapterError, AdapterResult, AuthzError, AuthzResult};
pub use model::{Model, Section};
pub use rbac::{DefaultRoleManager, GroupingRoleManager, MatchingFn, RoleManager};
pub use value::{IntoRequest, Value};
pub use watcher::{PolicyChange, Watcher};
