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

//! Role inheritance graphs
//!
//! A role manager stores "subject has role" edges, optionally scoped by a
//! domain, and answers transitive membership queries for the `g(...)` calls
//! inside a matcher. Two implementations are provided:
//! - [`DefaultRoleManager`]: indexed adjacency with pattern-aware names and
//!   domains and memoised reachability
//! - [`GroupingRoleManager`]: a flat edge list mirroring the grouping rows

pub mod default_role_manager;
pub mod grouping_role_manager;

pub use default_role_manager::*;
pub use grouping_role_manager::*;

use std::fmt;
use std::sync::Arc;

/// Domain used for links added without an explicit domain
pub const DEFAULT_DOMAIN: &str = "dotauthz::default";

/// Default bound on the number of hops followed by `has_link`
pub const DEFAULT_MAX_HIERARCHY_LEVEL: usize = 10;

/// Equivalence predicate `(query, stored) -> bool` where `stored` may be a pattern
pub type MatchingFn = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Role inheritance graph contract
pub trait RoleManager: Send + Sync + fmt::Debug {
    /// Insert `name1 -> name2`; returns whether the edge is new
    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool;

    /// Remove `name1 -> name2`; returns whether the edge existed
    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool;

    /// Whether `name1` inherits `name2`, transitively and within the hierarchy bound
    fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool;

    /// Direct roles of `name` (one hop)
    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String>;

    /// Direct members of `name` (one hop)
    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String>;

    /// Domains in which `name` has at least one link
    fn get_domains(&self, name: &str) -> Vec<String>;

    /// Install a name equivalence predicate
    fn add_matching_fn(&mut self, f: MatchingFn);

    /// Install a domain equivalence predicate
    fn add_domain_matching_fn(&mut self, f: MatchingFn);

    /// Drop every link and matching function
    fn clear(&mut self);
}
