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

//! Access-control model and the policy store it owns
//!
//! A model is a registry of [`Assertion`]s keyed by section and type:
//! - `r`: request shape, e.g. `sub, obj, act`
//! - `p`: policy shape; rows live here
//! - `g`: role definitions (`_, _` or `_, _, _`); rows feed the role graph
//! - `e`: effect expression
//! - `m`: matcher expression
//!
//! Numbered types (`p2`, `g2`, `m2`, ...) live alongside the plain ones.

pub mod assertion;

pub use assertion::{Assertion, EFFECT_FIELD, LinkOp, PRIORITY_FIELD};

use crate::adapter::PolicyLine;
use crate::effect::EffectKind;
use crate::error::{AuthzError, AuthzResult};
use crate::matcher::{CompileScope, RoleLookup};
use crate::rbac::RoleManager;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::debug;

/// Model section tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Request,
    Policy,
    Role,
    Effect,
    Matcher,
}

impl Section {
    pub const ALL: [Section; 5] = [Section::Request, Section::Policy, Section::Role, Section::Effect, Section::Matcher];

    pub fn key(self) -> &'static str {
        match self {
            Section::Request => "r",
            Section::Policy => "p",
            Section::Role => "g",
            Section::Effect => "e",
            Section::Matcher => "m",
        }
    }

    pub fn from_key(key: &str) -> AuthzResult<Self> {
        Section::ALL
            .into_iter()
            .find(|s| s.key() == key)
            .ok_or_else(|| AuthzError::model(format!("unknown section '{}'", key)))
    }

    /// Section a type key (`p2`, `g`, ...) belongs to
    pub fn of_ptype(ptype: &str) -> AuthzResult<Self> {
        Self::from_key(ptype.get(..1).unwrap_or_default())
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Model definitions plus the policy rows stored under them
#[derive(Debug, Default)]
pub struct Model {
    assertions: BTreeMap<Section, BTreeMap<String, Assertion>>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model from `(section, key, value)` definitions
    pub fn from_defs(defs: &[(&str, &str, &str)]) -> AuthzResult<Self> {
        let mut model = Self::new();
        for (sec, key, value) in defs {
            model.add_def(sec, key, value)?;
        }
        Ok(model)
    }

    /// Add one definition; empty values are ignored and return false
    pub fn add_def(&mut self, sec: &str, key: &str, value: &str) -> AuthzResult<bool> {
        let section = Section::from_key(sec)?;
        let suffix = key.strip_prefix(sec).ok_or_else(|| AuthzError::model(format!("key '{}' does not belong to section '{}'", key, sec)))?;
        if !suffix.chars().all(|c| c.is_ascii_digit()) {
            return Err(AuthzError::model(format!("invalid key '{}'", key)));
        }
        if value.trim().is_empty() {
            return Ok(false);
        }

        let assertion = Assertion::new(section, key, value)?;
        debug!(section = %section, key = %key, "Model definition added");
        self.assertions.entry(section).or_default().insert(key.to_string(), assertion);
        Ok(true)
    }

    pub fn has_section(&self, section: Section) -> bool {
        self.assertions.get(&section).is_some_and(|s| !s.is_empty())
    }

    pub fn get(&self, section: Section, key: &str) -> AuthzResult<&Assertion> {
        self.assertions.get(&section).and_then(|s| s.get(key)).ok_or_else(|| AuthzError::PolicyTypeNotFound {
            section: section.key().to_string(),
            ptype: key.to_string(),
        })
    }

    pub(crate) fn get_mut(&mut self, section: Section, key: &str) -> AuthzResult<&mut Assertion> {
        self.assertions.get_mut(&section).and_then(|s| s.get_mut(key)).ok_or_else(|| AuthzError::PolicyTypeNotFound {
            section: section.key().to_string(),
            ptype: key.to_string(),
        })
    }

    /// Assertions of one section in key order
    pub fn section(&self, section: Section) -> impl Iterator<Item = &Assertion> {
        self.assertions.get(&section).into_iter().flat_map(|s| s.values())
    }

    pub(crate) fn section_mut(&mut self, section: Section) -> impl Iterator<Item = &mut Assertion> {
        self.assertions.get_mut(&section).into_iter().flat_map(|s| s.values_mut())
    }

    pub fn effect(&self, key: &str) -> AuthzResult<EffectKind> {
        self.get(Section::Effect, key)?.effect.ok_or_else(|| AuthzError::model(format!("effect '{}' has no expression", key)))
    }

    pub fn matcher(&self, key: &str) -> AuthzResult<&str> {
        Ok(&self.get(Section::Matcher, key)?.value)
    }

    /// Names visible to a matcher evaluated with request type `rtype` and policy type `ptype`
    pub fn compile_scope(&self, rtype: &str, ptype: &str) -> AuthzResult<CompileScope> {
        let request = self.get(Section::Request, rtype)?;
        let policy = self.get(Section::Policy, ptype)?;
        let mut scope = CompileScope::new(rtype, &request.tokens, ptype, &policy.tokens);
        for role in self.section(Section::Role) {
            scope = scope.with_role_type(&role.key, role.arity());
        }
        Ok(scope)
    }

    pub fn role_manager(&self, ptype: &str) -> Option<&dyn RoleManager> {
        self.get(Section::Role, ptype).ok().and_then(Assertion::role_manager)
    }

    /// Install `rm` for role type `ptype` and populate it from the stored rows
    pub fn set_role_manager(&mut self, ptype: &str, rm: Box<dyn RoleManager>) -> AuthzResult<()> {
        let assertion = self.get_mut(Section::Role, ptype)?;
        assertion.set_role_manager(rm);
        assertion.build_role_links()
    }

    // Policy store

    fn policy_section(sec: &str) -> AuthzResult<Section> {
        match Section::from_key(sec)? {
            section @ (Section::Policy | Section::Role) => Ok(section),
            other => Err(AuthzError::InvalidArgument {
                message: format!("section '{}' does not hold policy rows", other),
            }),
        }
    }

    fn store(&self, sec: &str, ptype: &str) -> AuthzResult<&Assertion> {
        self.get(Self::policy_section(sec)?, ptype)
    }

    fn store_mut(&mut self, sec: &str, ptype: &str) -> AuthzResult<&mut Assertion> {
        self.get_mut(Self::policy_section(sec)?, ptype)
    }

    pub fn has_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> bool {
        self.store(sec, ptype).is_ok_and(|a| a.has(rule))
    }

    pub fn get_policy(&self, sec: &str, ptype: &str) -> Vec<Vec<String>> {
        self.store(sec, ptype).map(|a| a.rows().to_vec()).unwrap_or_default()
    }

    pub fn get_filtered_policy(&self, sec: &str, ptype: &str, field_index: usize, field_values: &[String]) -> Vec<Vec<String>> {
        self.store(sec, ptype).map(|a| a.filtered(field_index, field_values)).unwrap_or_default()
    }

    /// Distinct values of one field across the rows of a type
    pub fn get_values_for_field(&self, sec: &str, ptype: &str, field_index: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        self.get_policy(sec, ptype)
            .into_iter()
            .filter_map(|row| row.get(field_index).cloned())
            .filter(|value| seen.insert(value.clone()))
            .collect()
    }

    /// Validate the arity of `rules` against `ptype` without mutating anything
    pub fn check_arity(&self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> AuthzResult<()> {
        let assertion = self.store(sec, ptype)?;
        rules.iter().try_for_each(|rule| assertion.check_arity(rule))
    }

    pub fn add_policy(&mut self, sec: &str, ptype: &str, rule: Vec<String>) -> AuthzResult<bool> {
        let assertion = self.store_mut(sec, ptype)?;
        assertion.check_arity(&rule)?;
        Ok(assertion.insert(rule))
    }

    /// Add all rows or none: fails as a whole if any row already exists or repeats
    pub fn add_policies(&mut self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> AuthzResult<bool> {
        let assertion = self.store_mut(sec, ptype)?;
        let mut batch = HashSet::new();
        for rule in &rules {
            assertion.check_arity(rule)?;
            if assertion.has(rule) || !batch.insert(rule) {
                return Ok(false);
            }
        }
        for rule in rules {
            assertion.insert(rule);
        }
        Ok(true)
    }

    pub fn remove_policy(&mut self, sec: &str, ptype: &str, rule: &[String]) -> AuthzResult<bool> {
        Ok(self.store_mut(sec, ptype)?.remove(rule))
    }

    /// Remove all rows or none: fails as a whole if any row is absent
    pub fn remove_policies(&mut self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> AuthzResult<bool> {
        let assertion = self.store_mut(sec, ptype)?;
        if !rules.iter().all(|rule| assertion.has(rule)) {
            return Ok(false);
        }
        for rule in rules {
            assertion.remove(rule);
        }
        Ok(true)
    }

    /// Remove rows matching a field filter; returns the removed rows
    pub fn remove_filtered_policy(&mut self, sec: &str, ptype: &str, field_index: usize, field_values: &[String]) -> AuthzResult<Vec<Vec<String>>> {
        Ok(self.store_mut(sec, ptype)?.remove_filtered(field_index, field_values))
    }

    pub fn update_policy(&mut self, sec: &str, ptype: &str, old_rule: &[String], new_rule: Vec<String>) -> AuthzResult<bool> {
        let assertion = self.store_mut(sec, ptype)?;
        assertion.check_arity(&new_rule)?;
        if !assertion.has(old_rule) || (old_rule != new_rule.as_slice() && assertion.has(&new_rule)) {
            return Ok(false);
        }
        Ok(assertion.replace(old_rule, new_rule))
    }

    /// Update all rows or none
    pub fn update_policies(&mut self, sec: &str, ptype: &str, old_rules: &[Vec<String>], new_rules: Vec<Vec<String>>) -> AuthzResult<bool> {
        if old_rules.len() != new_rules.len() {
            return Err(AuthzError::InvalidArgument {
                message: format!("{} old rules but {} new rules", old_rules.len(), new_rules.len()),
            });
        }
        let assertion = self.store_mut(sec, ptype)?;
        for rule in &new_rules {
            assertion.check_arity(rule)?;
        }
        let old_set: HashSet<&Vec<String>> = old_rules.iter().collect();
        let mut new_set = HashSet::new();
        let applicable = old_set.len() == old_rules.len()
            && old_rules.iter().all(|rule| assertion.has(rule))
            && new_rules.iter().all(|rule| new_set.insert(rule) && (!assertion.has(rule) || old_set.contains(rule)));
        if !applicable {
            return Ok(false);
        }

        // remove first so that rotations such as a->b, b->a succeed
        for rule in old_rules {
            assertion.remove(rule);
        }
        for rule in new_rules {
            assertion.insert(rule);
        }
        Ok(true)
    }

    /// Drop every policy and grouping row (role graphs are left untouched)
    pub fn clear_policy(&mut self) {
        for section in [Section::Policy, Section::Role] {
            for assertion in self.section_mut(section) {
                assertion.clear_rows();
            }
        }
    }

    /// Serialise all stored rows, `p` types first, then `g` types
    pub fn to_lines(&self) -> Vec<PolicyLine> {
        [Section::Policy, Section::Role]
            .into_iter()
            .flat_map(|section| self.section(section))
            .flat_map(|assertion| assertion.rows().iter().map(|row| PolicyLine::new(assertion.key.clone(), row.clone())))
            .collect()
    }

    /// Insert rows produced by an adapter; duplicates are skipped
    pub fn load_lines(&mut self, lines: Vec<PolicyLine>) -> AuthzResult<usize> {
        let mut loaded = 0;
        for line in lines {
            let sec = Section::of_ptype(&line.ptype)?;
            if self.add_policy(sec.key(), &line.ptype, line.rule)? {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Rebuild every role graph from the grouping rows
    pub fn build_role_links(&mut self) -> AuthzResult<()> {
        for assertion in self.section_mut(Section::Role) {
            assertion.build_role_links()?;
        }
        Ok(())
    }

    pub fn build_incremental_role_links(&mut self, op: LinkOp, ptype: &str, rules: &[Vec<String>]) -> AuthzResult<()> {
        self.get_mut(Section::Role, ptype)?.build_incremental_role_links(op, rules)
    }
}

impl RoleLookup for Model {
    fn has_link(&self, ptype: &str, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        match self.role_manager(ptype) {
            Some(rm) => rm.has_link(name1, name2, domain),
            None => name1 == name2,
        }
    }
}
