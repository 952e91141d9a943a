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

//! Indexed, domain-scoped role graph

use super::{DEFAULT_DOMAIN, DEFAULT_MAX_HIERARCHY_LEVEL, MatchingFn, RoleManager};
use crate::memo::BoundedMemo;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::trace;

/// Adjacency of a single domain, kept in both directions
#[derive(Debug, Default)]
struct DomainLinks {
    /// subject -> roles it holds
    roles: HashMap<String, BTreeSet<String>>,
    /// role -> subjects holding it
    users: HashMap<String, BTreeSet<String>>,
}

impl DomainLinks {
    fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

type ReachabilityKey = (String, String, String);

/// Upper bound on memoised `has_link` answers
const REACHABILITY_MEMO_CAPACITY: usize = 4096;

/// Role manager with hash-indexed adjacency per domain
///
/// Without matching functions every hop is a hash lookup. Once a name or
/// domain matching function is installed, stored names may be patterns, so
/// each hop scans the domain's adjacency and applies the predicates.
pub struct DefaultRoleManager {
    /// Links grouped by domain
    domains: HashMap<String, DomainLinks>,

    /// Maximum number of hops followed by `has_link`
    max_hierarchy_level: usize,

    /// Name equivalence predicates, tried in registration order
    matching_fns: Vec<MatchingFn>,

    /// Domain equivalence predicates, tried in registration order
    domain_matching_fns: Vec<MatchingFn>,

    /// Memoised `has_link` answers, dropped on every mutation
    reachability_cache: BoundedMemo<ReachabilityKey, bool>,
}

impl DefaultRoleManager {
    /// Create a role manager following at most `max_hierarchy_level` hops
    pub fn new(max_hierarchy_level: usize) -> Self {
        Self {
            domains: HashMap::new(),
            max_hierarchy_level,
            matching_fns: Vec::new(),
            domain_matching_fns: Vec::new(),
            reachability_cache: BoundedMemo::new(REACHABILITY_MEMO_CAPACITY),
        }
    }

    /// Total number of stored edges across all domains
    pub fn link_count(&self) -> usize {
        self.domains.values().map(|links| links.roles.values().map(BTreeSet::len).sum::<usize>()).sum()
    }

    fn name_matches(&self, query: &str, stored: &str) -> bool {
        query == stored || self.matching_fns.iter().any(|f| f(query, stored))
    }

    fn domain_matches(&self, query: &str, stored: &str) -> bool {
        query == stored || self.domain_matching_fns.iter().any(|f| f(query, stored))
    }

    fn matching_domains(&self, domain: &str) -> Vec<&DomainLinks> {
        if self.domain_matching_fns.is_empty() {
            return self.domains.get(domain).into_iter().collect();
        }
        self.domains.iter().filter(|(stored, _)| self.domain_matches(domain, stored)).map(|(_, links)| links).collect()
    }

    fn direct_roles(&self, name: &str, domain: &str) -> BTreeSet<String> {
        let mut roles = BTreeSet::new();
        for links in self.matching_domains(domain) {
            if self.matching_fns.is_empty() {
                if let Some(direct) = links.roles.get(name) {
                    roles.extend(direct.iter().cloned());
                }
            } else {
                for (subject, direct) in &links.roles {
                    if self.name_matches(name, subject) {
                        roles.extend(direct.iter().cloned());
                    }
                }
            }
        }
        roles
    }

    fn direct_users(&self, name: &str, domain: &str) -> BTreeSet<String> {
        let mut users = BTreeSet::new();
        for links in self.matching_domains(domain) {
            if self.matching_fns.is_empty() {
                if let Some(direct) = links.users.get(name) {
                    users.extend(direct.iter().cloned());
                }
            } else {
                for (role, direct) in &links.users {
                    if self.name_matches(name, role) {
                        users.extend(direct.iter().cloned());
                    }
                }
            }
        }
        users
    }

    /// Breadth-first search bounded by `max_hierarchy_level` hops
    fn search(&self, name1: &str, name2: &str, domain: &str) -> bool {
        let mut visited: HashSet<String> = HashSet::from([name1.to_string()]);
        let mut frontier = vec![name1.to_string()];

        for _ in 0..self.max_hierarchy_level {
            if frontier.is_empty() {
                break;
            }

            let mut next = Vec::new();
            for node in &frontier {
                for role in self.direct_roles(node, domain) {
                    if self.name_matches(name2, &role) {
                        return true;
                    }
                    if visited.insert(role.clone()) {
                        next.push(role);
                    }
                }
            }
            frontier = next;
        }

        false
    }

    fn invalidate_cache(&self) {
        self.reachability_cache.clear();
    }
}

impl Default for DefaultRoleManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HIERARCHY_LEVEL)
    }
}

impl fmt::Debug for DefaultRoleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultRoleManager")
            .field("domains", &self.domains)
            .field("max_hierarchy_level", &self.max_hierarchy_level)
            .field("matching_fns", &self.matching_fns.len())
            .field("domain_matching_fns", &self.domain_matching_fns.len())
            .finish()
    }
}

impl RoleManager for DefaultRoleManager {
    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        let domain = domain.unwrap_or(DEFAULT_DOMAIN);
        let links = self.domains.entry(domain.to_string()).or_default();

        let added = links.roles.entry(name1.to_string()).or_default().insert(name2.to_string());
        links.users.entry(name2.to_string()).or_default().insert(name1.to_string());

        if added {
            trace!(name1 = %name1, name2 = %name2, domain = %domain, "Role link added");
            self.invalidate_cache();
        }
        added
    }

    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        let domain = domain.unwrap_or(DEFAULT_DOMAIN);
        let Some(links) = self.domains.get_mut(domain) else {
            return false;
        };

        let removed = match links.roles.get_mut(name1) {
            Some(roles) => {
                let removed = roles.remove(name2);
                if roles.is_empty() {
                    links.roles.remove(name1);
                }
                removed
            }
            None => false,
        };

        if let Some(users) = links.users.get_mut(name2) {
            users.remove(name1);
            if users.is_empty() {
                links.users.remove(name2);
            }
        }

        if links.is_empty() {
            self.domains.remove(domain);
        }

        if removed {
            trace!(name1 = %name1, name2 = %name2, domain = %domain, "Role link deleted");
            self.invalidate_cache();
        }
        removed
    }

    fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        if self.name_matches(name1, name2) {
            return true;
        }

        let domain = domain.unwrap_or(DEFAULT_DOMAIN);
        let key = (name1.to_string(), name2.to_string(), domain.to_string());
        if let Some(cached) = self.reachability_cache.get(&key) {
            return cached;
        }

        let reachable = self.search(name1, name2, domain);
        self.reachability_cache.insert(key, reachable);
        reachable
    }

    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        self.direct_roles(name, domain.unwrap_or(DEFAULT_DOMAIN)).into_iter().collect()
    }

    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        self.direct_users(name, domain.unwrap_or(DEFAULT_DOMAIN)).into_iter().collect()
    }

    fn get_domains(&self, name: &str) -> Vec<String> {
        let mut domains: Vec<String> = self
            .domains
            .iter()
            .filter(|(domain, links)| domain.as_str() != DEFAULT_DOMAIN && (links.roles.contains_key(name) || links.users.contains_key(name)))
            .map(|(domain, _)| domain.clone())
            .collect();
        domains.sort();
        domains
    }

    fn add_matching_fn(&mut self, f: MatchingFn) {
        self.matching_fns.push(f);
        self.invalidate_cache();
    }

    fn add_domain_matching_fn(&mut self, f: MatchingFn) {
        self.domain_matching_fns.push(f);
        self.invalidate_cache();
    }

    fn clear(&mut self) {
        self.domains.clear();
        self.matching_fns.clear();
        self.domain_matching_fns.clear();
        self.invalidate_cache();
    }
}
