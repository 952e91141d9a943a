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

//! Policy persistence boundary
//!
//! The enforcer's in-memory model is authoritative; an adapter only loads the
//! initial rows and mirrors later mutations. Incremental operations default to
//! [`AdapterError::NotImplemented`], which the enforcer treats as a no-op.

use crate::error::{AdapterError, AdapterResult};
use serde::{Deserialize, Serialize};

/// One stored policy row together with its policy type (`p`, `g2`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyLine {
    pub ptype: String,
    pub rule: Vec<String>,
}

impl PolicyLine {
    pub fn new(ptype: impl Into<String>, rule: Vec<String>) -> Self {
        Self { ptype: ptype.into(), rule }
    }

    /// Section key derived from the policy type's leading letter
    pub fn section(&self) -> &str {
        self.ptype.get(..1).unwrap_or_default()
    }
}

/// Persistence collaborator
pub trait Adapter: Send + Sync {
    /// Read every stored row
    fn load_policy(&self) -> AdapterResult<Vec<PolicyLine>>;

    /// Replace the stored rows with `lines`
    fn save_policy(&mut self, lines: &[PolicyLine]) -> AdapterResult<()>;

    fn add_policy(&mut self, _sec: &str, _ptype: &str, _rule: &[String]) -> AdapterResult<()> {
        Err(AdapterError::NotImplemented("add_policy"))
    }

    fn add_policies(&mut self, _sec: &str, _ptype: &str, _rules: &[Vec<String>]) -> AdapterResult<()> {
        Err(AdapterError::NotImplemented("add_policies"))
    }

    fn remove_policy(&mut self, _sec: &str, _ptype: &str, _rule: &[String]) -> AdapterResult<()> {
        Err(AdapterError::NotImplemented("remove_policy"))
    }

    fn remove_policies(&mut self, _sec: &str, _ptype: &str, _rules: &[Vec<String>]) -> AdapterResult<()> {
        Err(AdapterError::NotImplemented("remove_policies"))
    }

    fn remove_filtered_policy(&mut self, _sec: &str, _ptype: &str, _field_index: usize, _field_values: &[String]) -> AdapterResult<()> {
        Err(AdapterError::NotImplemented("remove_filtered_policy"))
    }

    fn update_policy(&mut self, _sec: &str, _ptype: &str, _old_rule: &[String], _new_rule: &[String]) -> AdapterResult<()> {
        Err(AdapterError::NotImplemented("update_policy"))
    }

    fn update_policies(&mut self, _sec: &str, _ptype: &str, _old_rules: &[Vec<String>], _new_rules: &[Vec<String>]) -> AdapterResult<()> {
        Err(AdapterError::NotImplemented("update_policies"))
    }
}

/// Adapter that persists nothing; every incremental call is a no-op
#[derive(Debug, Default, Clone)]
pub struct NullAdapter;

impl Adapter for NullAdapter {
    fn load_policy(&self) -> AdapterResult<Vec<PolicyLine>> {
        Ok(Vec::new())
    }

    fn save_policy(&mut self, _lines: &[PolicyLine]) -> AdapterResult<()> {
        Ok(())
    }
}

/// Adapter holding rows in memory, serialisable to JSON
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryAdapter {
    lines: Vec<PolicyLine>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lines(lines: Vec<PolicyLine>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[PolicyLine] {
        &self.lines
    }

    pub fn to_json(&self) -> AdapterResult<String> {
        Ok(serde_json::to_string(&self.lines)?)
    }

    pub fn from_json(json: &str) -> AdapterResult<Self> {
        Ok(Self { lines: serde_json::from_str(json)? })
    }

    fn position(&self, ptype: &str, rule: &[String]) -> Option<usize> {
        self.lines.iter().position(|line| line.ptype == ptype && line.rule == rule)
    }
}

impl Adapter for MemoryAdapter {
    fn load_policy(&self) -> AdapterResult<Vec<PolicyLine>> {
        Ok(self.lines.clone())
    }

    fn save_policy(&mut self, lines: &[PolicyLine]) -> AdapterResult<()> {
        self.lines = lines.to_vec();
        Ok(())
    }

    fn add_policy(&mut self, _sec: &str, ptype: &str, rule: &[String]) -> AdapterResult<()> {
        if self.position(ptype, rule).is_none() {
            self.lines.push(PolicyLine::new(ptype, rule.to_vec()));
        }
        Ok(())
    }

    fn add_policies(&mut self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> AdapterResult<()> {
        for rule in rules {
            self.add_policy(sec, ptype, rule)?;
        }
        Ok(())
    }

    fn remove_policy(&mut self, _sec: &str, ptype: &str, rule: &[String]) -> AdapterResult<()> {
        if let Some(index) = self.position(ptype, rule) {
            self.lines.remove(index);
        }
        Ok(())
    }

    fn remove_policies(&mut self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> AdapterResult<()> {
        for rule in rules {
            self.remove_policy(sec, ptype, rule)?;
        }
        Ok(())
    }

    fn remove_filtered_policy(&mut self, _sec: &str, ptype: &str, field_index: usize, field_values: &[String]) -> AdapterResult<()> {
        self.lines.retain(|line| {
            let matches = line.ptype == ptype
                && field_values
                    .iter()
                    .enumerate()
                    .all(|(offset, value)| value.is_empty() || line.rule.get(field_index + offset) == Some(value));
            !matches
        });
        Ok(())
    }

    fn update_policy(&mut self, _sec: &str, ptype: &str, old_rule: &[String], new_rule: &[String]) -> AdapterResult<()> {
        match self.position(ptype, old_rule) {
            Some(index) => {
                self.lines[index].rule = new_rule.to_vec();
                Ok(())
            }
            None => Err(AdapterError::Other(format!("rule {:?} not stored under '{}'", old_rule, ptype))),
        }
    }

    fn update_policies(&mut self, sec: &str, ptype: &str, old_rules: &[Vec<String>], new_rules: &[Vec<String>]) -> AdapterResult<()> {
        for (old_rule, new_rule) in old_rules.iter().zip(new_rules) {
            self.update_policy(sec, ptype, old_rule, new_rule)?;
        }
        Ok(())
    }
}
