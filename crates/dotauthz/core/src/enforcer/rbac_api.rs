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

//! Role and permission helpers over the `g` and `p` types

use super::Enforcer;
use super::management::{FilteredRemoval, G, P};
use crate::error::AuthzResult;
use crate::model::Model;
use std::collections::{HashSet, VecDeque};

fn direct_roles(model: &Model, name: &str, domain: Option<&str>) -> Vec<String> {
    model.role_manager(G).map(|rm| rm.get_roles(name, domain)).unwrap_or_default()
}

fn removal<'a>(ptype: &'a str, field_index: usize, value: &str) -> FilteredRemoval<'a> {
    FilteredRemoval {
        sec: ptype,
        ptype,
        field_index,
        field_values: vec![value.to_string()],
    }
}

fn with_domain(head: &str, domain: Option<&str>) -> Vec<String> {
    let mut values = vec![head.to_string()];
    values.extend(domain.map(str::to_string));
    values
}

impl Enforcer {
    /// Direct roles of `name`
    pub fn get_roles_for_user(&self, name: &str, domain: Option<&str>) -> AuthzResult<Vec<String>> {
        self.with_model(|m| direct_roles(m, name, domain))
    }

    /// Every role `name` inherits, breadth first
    pub fn get_implicit_roles_for_user(&self, name: &str, domain: Option<&str>) -> AuthzResult<Vec<String>> {
        self.with_model(|m| {
            let mut visited = HashSet::from([name.to_string()]);
            let mut queue = VecDeque::from([name.to_string()]);
            let mut roles = Vec::new();
            while let Some(current) = queue.pop_front() {
                for role in direct_roles(m, &current, domain) {
                    if visited.insert(role.clone()) {
                        roles.push(role.clone());
                        queue.push_back(role);
                    }
                }
            }
            roles
        })
    }

    /// Direct members of `role`
    pub fn get_users_for_role(&self, role: &str, domain: Option<&str>) -> AuthzResult<Vec<String>> {
        self.with_model(|m| m.role_manager(G).map(|rm| rm.get_users(role, domain)).unwrap_or_default())
    }

    pub fn has_role_for_user(&self, name: &str, role: &str, domain: Option<&str>) -> AuthzResult<bool> {
        Ok(self.get_roles_for_user(name, domain)?.iter().any(|r| r == role))
    }

    /// Domains in which `name` holds any role
    pub fn get_domains_for_user(&self, name: &str) -> AuthzResult<Vec<String>> {
        self.with_model(|m| m.role_manager(G).map(|rm| rm.get_domains(name)).unwrap_or_default())
    }

    pub fn add_role_for_user(&self, user: &str, role: &str, domain: Option<&str>) -> AuthzResult<bool> {
        let mut rule = vec![user.to_string(), role.to_string()];
        rule.extend(domain.map(str::to_string));
        self.add_grouping_policy(&rule)
    }

    pub fn delete_role_for_user(&self, user: &str, role: &str, domain: Option<&str>) -> AuthzResult<bool> {
        let mut rule = vec![user.to_string(), role.to_string()];
        rule.extend(domain.map(str::to_string));
        self.remove_grouping_policy(&rule)
    }

    /// Drop every role of `user` (within `domain`, if given)
    pub fn delete_roles_for_user(&self, user: &str, domain: Option<&str>) -> AuthzResult<bool> {
        match domain {
            Some(domain) => self.remove_filtered_grouping_policy(0, &[user, "", domain]),
            None => self.remove_filtered_grouping_policy(0, &[user]),
        }
    }

    /// Remove `user` from both role assignments and permissions
    pub fn delete_user(&self, user: &str) -> AuthzResult<bool> {
        self.remove_filtered_together(&[removal(G, 0, user), removal(P, 0, user)])
    }

    /// Remove `role` from role assignments and the permissions granted to it
    pub fn delete_role(&self, role: &str) -> AuthzResult<bool> {
        self.remove_filtered_together(&[removal(G, 1, role), removal(P, 0, role)])
    }

    pub fn add_permission_for_user<S: AsRef<str>>(&self, user: &str, permission: &[S]) -> AuthzResult<bool> {
        let mut rule = vec![user.to_string()];
        rule.extend(permission.iter().map(|s| s.as_ref().to_string()));
        self.add_policy(&rule)
    }

    pub fn delete_permission_for_user<S: AsRef<str>>(&self, user: &str, permission: &[S]) -> AuthzResult<bool> {
        let mut rule = vec![user.to_string()];
        rule.extend(permission.iter().map(|s| s.as_ref().to_string()));
        self.remove_policy(&rule)
    }

    /// Rules whose subject is `user` (and whose second field is `domain`, if given)
    pub fn get_permissions_for_user(&self, user: &str, domain: Option<&str>) -> AuthzResult<Vec<Vec<String>>> {
        self.get_filtered_policy(0, &with_domain(user, domain))
    }

    /// Rules granted to `user` directly or through any inherited role, without duplicates
    pub fn get_implicit_permissions_for_user(&self, user: &str, domain: Option<&str>) -> AuthzResult<Vec<Vec<String>>> {
        let mut subjects = vec![user.to_string()];
        subjects.extend(self.get_implicit_roles_for_user(user, domain)?);

        self.with_model(|m| {
            let mut seen = HashSet::new();
            subjects
                .iter()
                .flat_map(|subject| m.get_filtered_policy("p", "p", 0, &with_domain(subject, domain)))
                .filter(|rule| seen.insert(rule.clone()))
                .collect()
        })
    }
}
