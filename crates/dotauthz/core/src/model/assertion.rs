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

//! One model definition and the policy rows stored under it

use super::Section;
use crate::effect::{Effect, EffectKind};
use crate::error::{AuthzError, AuthzResult};
use crate::rbac::{DefaultRoleManager, MatchingFn, RoleManager};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// Field name that orders rows of a policy type
pub const PRIORITY_FIELD: &str = "priority";

/// Fields of a grouping row that identify its edge: subject, role, domain
pub(crate) const LINK_FIELDS: usize = 3;

/// Field name that carries a row's effect label
pub const EFFECT_FIELD: &str = "eft";

/// Direction of an incremental role-link update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOp {
    Add,
    Remove,
}

/// A single `key = value` definition of the model
pub struct Assertion {
    pub key: String,
    pub value: String,
    pub section: Section,
    /// Declared field names (`sub`, `obj`, ...); role types use `_0`, `_1`, ...
    pub tokens: Vec<String>,
    pub(crate) effect: Option<EffectKind>,
    policy: Vec<Vec<String>>,
    policy_set: HashSet<Vec<String>>,
    priority_index: Option<usize>,
    eft_index: Option<usize>,
    role_manager: Option<Box<dyn RoleManager>>,
    matching_fns: Vec<MatchingFn>,
    domain_matching_fns: Vec<MatchingFn>,
}

impl fmt::Debug for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assertion")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("tokens", &self.tokens)
            .field("rows", &self.policy.len())
            .field("role_manager", &self.role_manager)
            .finish()
    }
}

fn parse_fields(key: &str, value: &str) -> AuthzResult<Vec<String>> {
    let fields: Vec<String> = value.split(',').map(|f| f.trim().to_string()).collect();
    for field in &fields {
        let valid = !field.is_empty() && field.chars().all(|c| c.is_alphanumeric() || c == '_') && !field.starts_with(|c: char| c.is_ascii_digit());
        if !valid {
            return Err(AuthzError::model(format!("invalid field name '{}' in '{}'", field, key)));
        }
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = fields.iter().find(|f| !seen.insert(f.as_str())) {
        return Err(AuthzError::model(format!("duplicate field '{}' in '{}'", duplicate, key)));
    }
    Ok(fields)
}

/// Numeric priorities sort before non-numeric ones; numbers compare numerically, the rest lexicographically
fn compare_priority(a: &str, b: &str) -> Ordering {
    let numeric = |s: &str| s.trim().parse::<f64>().ok().filter(|v| v.is_finite());
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

impl Assertion {
    pub(crate) fn new(section: Section, key: &str, value: &str) -> AuthzResult<Self> {
        let mut assertion = Self {
            key: key.to_string(),
            value: value.to_string(),
            section,
            tokens: Vec::new(),
            effect: None,
            policy: Vec::new(),
            policy_set: HashSet::new(),
            priority_index: None,
            eft_index: None,
            role_manager: None,
            matching_fns: Vec::new(),
            domain_matching_fns: Vec::new(),
        };

        match section {
            Section::Request | Section::Policy => {
                assertion.tokens = parse_fields(key, value)?;
                if section == Section::Policy {
                    assertion.priority_index = assertion.tokens.iter().position(|t| t == PRIORITY_FIELD);
                    assertion.eft_index = assertion.tokens.iter().position(|t| t == EFFECT_FIELD);
                }
            }
            Section::Role => {
                let parts: Vec<&str> = value.split(',').map(str::trim).collect();
                if parts.len() < 2 || parts.iter().any(|p| *p != "_") {
                    return Err(AuthzError::model(format!("role definition '{}' must list at least two '_' fields, got '{}'", key, value)));
                }
                assertion.tokens = (0..parts.len()).map(|i| format!("_{}", i)).collect();
                assertion.role_manager = Some(Box::new(DefaultRoleManager::default()));
            }
            Section::Effect => {
                assertion.effect = Some(EffectKind::parse(value)?);
            }
            Section::Matcher => {
                if value.trim().is_empty() {
                    return Err(AuthzError::model(format!("matcher '{}' is empty", key)));
                }
            }
        }

        Ok(assertion)
    }

    /// Number of values each row must carry
    pub fn arity(&self) -> usize {
        self.tokens.len()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.tokens.iter().position(|t| t == name)
    }

    pub fn priority_index(&self) -> Option<usize> {
        self.priority_index
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.policy
    }

    /// Effect label of a row (missing `eft` field means allow)
    pub fn effect_of(&self, row: &[String]) -> Effect {
        Effect::from_label(self.eft_index.and_then(|i| row.get(i)).map(String::as_str))
    }

    pub(crate) fn check_arity(&self, rule: &[String]) -> AuthzResult<()> {
        if rule.len() != self.arity() {
            return Err(AuthzError::ArityMismatch {
                ptype: self.key.clone(),
                expected: self.arity(),
                actual: rule.len(),
            });
        }
        Ok(())
    }

    pub fn has(&self, rule: &[String]) -> bool {
        self.policy_set.contains(rule)
    }

    /// Insert a row, keeping priority order; returns false for duplicates
    pub(crate) fn insert(&mut self, rule: Vec<String>) -> bool {
        if self.policy_set.contains(&rule) {
            return false;
        }
        self.policy_set.insert(rule.clone());

        match self.priority_index {
            Some(pi) => {
                let position = self.policy.partition_point(|existing| compare_priority(&existing[pi], &rule[pi]) != Ordering::Greater);
                self.policy.insert(position, rule);
            }
            None => self.policy.push(rule),
        }
        true
    }

    pub(crate) fn remove(&mut self, rule: &[String]) -> bool {
        if !self.policy_set.remove(rule) {
            return false;
        }
        if let Some(index) = self.policy.iter().position(|existing| existing == rule) {
            self.policy.remove(index);
        }
        true
    }

    /// Replace `old` with `new` in place; the caller has checked both
    pub(crate) fn replace(&mut self, old: &[String], new: Vec<String>) -> bool {
        let Some(index) = self.policy.iter().position(|existing| existing == old) else {
            return false;
        };
        self.policy_set.remove(old);
        self.policy_set.insert(new.clone());
        match self.priority_index {
            Some(pi) if self.policy[index][pi] != new[pi] => {
                self.policy.remove(index);
                let position = self.policy.partition_point(|existing| compare_priority(&existing[pi], &new[pi]) != Ordering::Greater);
                self.policy.insert(position, new);
            }
            _ => self.policy[index] = new,
        }
        true
    }

    /// Rows whose fields starting at `field_index` equal `values` (empty value = wildcard)
    pub fn filtered(&self, field_index: usize, values: &[String]) -> Vec<Vec<String>> {
        self.policy.iter().filter(|row| row_matches_filter(row, field_index, values)).cloned().collect()
    }

    pub(crate) fn remove_filtered(&mut self, field_index: usize, values: &[String]) -> Vec<Vec<String>> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.policy).into_iter().partition(|row| row_matches_filter(row, field_index, values));
        self.policy = kept;
        for row in &removed {
            self.policy_set.remove(row);
        }
        removed
    }

    pub(crate) fn clear_rows(&mut self) {
        self.policy.clear();
        self.policy_set.clear();
    }

    pub fn role_manager(&self) -> Option<&dyn RoleManager> {
        self.role_manager.as_deref()
    }

    pub(crate) fn set_role_manager(&mut self, rm: Box<dyn RoleManager>) {
        self.role_manager = Some(rm);
    }

    /// Remember and install a name matching function
    pub(crate) fn add_matching_fn(&mut self, f: MatchingFn) {
        if let Some(rm) = self.role_manager.as_deref_mut() {
            rm.add_matching_fn(f.clone());
        }
        self.matching_fns.push(f);
    }

    /// Remember and install a domain matching function
    pub(crate) fn add_domain_matching_fn(&mut self, f: MatchingFn) {
        if let Some(rm) = self.role_manager.as_deref_mut() {
            rm.add_domain_matching_fn(f.clone());
        }
        self.domain_matching_fns.push(f);
    }

    /// Rebuild the role graph from scratch out of the current rows
    pub(crate) fn build_role_links(&mut self) -> AuthzResult<()> {
        let Some(rm) = self.role_manager.as_deref_mut() else {
            return Ok(());
        };
        rm.clear();
        for f in &self.matching_fns {
            rm.add_matching_fn(f.clone());
        }
        for f in &self.domain_matching_fns {
            rm.add_domain_matching_fn(f.clone());
        }
        for row in &self.policy {
            apply_link(rm, &self.key, LinkOp::Add, row)?;
        }
        Ok(())
    }

    /// Apply exactly the edges implied by `rules`
    ///
    /// Runs after the store was updated. An edge is only deleted when no
    /// remaining row still implies it, since rows that differ past the
    /// domain field share one edge.
    pub(crate) fn build_incremental_role_links(&mut self, op: LinkOp, rules: &[Vec<String>]) -> AuthzResult<()> {
        let Some(rm) = self.role_manager.as_deref_mut() else {
            return Ok(());
        };
        for rule in rules {
            if op == LinkOp::Remove && self.policy.iter().any(|row| same_link(row, rule)) {
                continue;
            }
            apply_link(rm, &self.key, op, rule)?;
        }
        Ok(())
    }
}

fn row_matches_filter(row: &[String], field_index: usize, values: &[String]) -> bool {
    values.iter().enumerate().all(|(offset, value)| value.is_empty() || row.get(field_index + offset) == Some(value))
}

/// Rows naming the same subject, role and domain map to one edge
fn same_link(a: &[String], b: &[String]) -> bool {
    a.iter().take(LINK_FIELDS).eq(b.iter().take(LINK_FIELDS))
}

fn apply_link(rm: &mut dyn RoleManager, key: &str, op: LinkOp, rule: &[String]) -> AuthzResult<()> {
    if rule.len() < 2 {
        return Err(AuthzError::model(format!("grouping policy '{}' needs at least two values, got {:?}", key, rule)));
    }
    let domain = rule.get(2).map(String::as_str);
    match op {
        LinkOp::Add => {
            rm.add_link(&rule[0], &rule[1], domain);
        }
        LinkOp::Remove => {
            rm.delete_link(&rule[0], &rule[1], domain);
        }
    }
    Ok(())
}
