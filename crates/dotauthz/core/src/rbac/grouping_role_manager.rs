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

//! Role manager backed by the grouping rows themselves
//!
//! Keeps exactly the `(subject, role, domain)` triples of the grouping
//! policy in insertion order and answers every query with a linear scan and
//! exact string comparison. Pattern matching is not supported.

use super::{DEFAULT_DOMAIN, DEFAULT_MAX_HIERARCHY_LEVEL, MatchingFn, RoleManager};
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edge {
    subject: String,
    role: String,
    domain: String,
}

/// Flat edge-list role manager
#[derive(Debug, Clone)]
pub struct GroupingRoleManager {
    edges: Vec<Edge>,
    max_hierarchy_level: usize,
}

impl GroupingRoleManager {
    pub fn new(max_hierarchy_level: usize) -> Self {
        Self {
            edges: Vec::new(),
            max_hierarchy_level,
        }
    }

    fn position(&self, subject: &str, role: &str, domain: &str) -> Option<usize> {
        self.edges.iter().position(|e| e.subject == subject && e.role == role && e.domain == domain)
    }

    fn roles_of<'a>(&'a self, subject: &'a str, domain: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges.iter().filter(move |e| e.subject == subject && e.domain == domain).map(|e| e.role.as_str())
    }
}

impl Default for GroupingRoleManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HIERARCHY_LEVEL)
    }
}

impl RoleManager for GroupingRoleManager {
    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        let domain = domain.unwrap_or(DEFAULT_DOMAIN);
        if self.position(name1, name2, domain).is_some() {
            return false;
        }
        self.edges.push(Edge {
            subject: name1.to_string(),
            role: name2.to_string(),
            domain: domain.to_string(),
        });
        true
    }

    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        match self.position(name1, name2, domain.unwrap_or(DEFAULT_DOMAIN)) {
            Some(index) => {
                self.edges.remove(index);
                true
            }
            None => false,
        }
    }

    fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        if name1 == name2 {
            return true;
        }

        let domain = domain.unwrap_or(DEFAULT_DOMAIN);
        let mut visited: HashSet<&str> = HashSet::from([name1]);
        let mut frontier = vec![name1];

        for _ in 0..self.max_hierarchy_level {
            let mut next = Vec::new();
            for node in frontier {
                for role in self.roles_of(node, domain) {
                    if role == name2 {
                        return true;
                    }
                    if visited.insert(role) {
                        next.push(role);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        false
    }

    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        let domain = domain.unwrap_or(DEFAULT_DOMAIN);
        self.roles_of(name, domain).map(str::to_string).collect::<BTreeSet<_>>().into_iter().collect()
    }

    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        let domain = domain.unwrap_or(DEFAULT_DOMAIN);
        self.edges
            .iter()
            .filter(|e| e.role == name && e.domain == domain)
            .map(|e| e.subject.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn get_domains(&self, name: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|e| e.domain != DEFAULT_DOMAIN && (e.subject == name || e.role == name))
            .map(|e| e.domain.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn add_matching_fn(&mut self, _f: MatchingFn) {
        warn!("GroupingRoleManager does not support name matching functions; ignoring");
    }

    fn add_domain_matching_fn(&mut self, _f: MatchingFn) {
        warn!("GroupingRoleManager does not support domain matching functions; ignoring");
    }

    fn clear(&mut self) {
        self.edges.clear();
    }
}
