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

//! Policy management API
//!
//! Every mutation goes through [`Enforcer::commit`]: apply to the model under
//! the write lock, mirror to the adapter, patch the role graph with exactly the
//! affected edges, then clear the decision cache and notify the watcher.

use super::Enforcer;
use crate::adapter::Adapter;
use crate::error::{AdapterResult, AuthzResult};
use crate::model::{LinkOp, Model, Section};
use crate::watcher::PolicyChange;
use tracing::info;

pub(super) const P: &str = "p";
pub(super) const G: &str = "g";

fn to_rule<S: AsRef<str>>(rule: &[S]) -> Vec<String> {
    rule.iter().map(|s| s.as_ref().to_string()).collect()
}

fn to_rules<R, S>(rules: &[R]) -> Vec<Vec<String>>
where
    R: AsRef<[S]>,
    S: AsRef<str>,
{
    rules.iter().map(|r| to_rule(r.as_ref())).collect()
}

/// Grouping rows whose edges change with a mutation
#[derive(Default)]
struct RoleDelta {
    removed: Vec<Vec<String>>,
    added: Vec<Vec<String>>,
}

/// One filtered removal of a combined mutation
pub(super) struct FilteredRemoval<'a> {
    pub(super) sec: &'a str,
    pub(super) ptype: &'a str,
    pub(super) field_index: usize,
    pub(super) field_values: Vec<String>,
}

impl RoleDelta {
    fn added(rows: Vec<Vec<String>>) -> Self {
        Self { added: rows, ..Self::default() }
    }

    fn removed(rows: Vec<Vec<String>>) -> Self {
        Self { removed: rows, ..Self::default() }
    }
}

impl Enforcer {
    /// Apply one mutation and run the follow-up steps if it changed anything
    ///
    /// `apply` returns `None` for a no-op, in which case nothing is persisted
    /// or notified. Adapter failures other than `NotImplemented` are returned
    /// after the in-memory change and its follow-ups have been applied.
    fn commit<A, W>(&self, sec: &str, ptype: &str, apply: A, write: W, change: PolicyChange) -> AuthzResult<bool>
    where
        A: FnOnce(&mut Model) -> AuthzResult<Option<RoleDelta>>,
        W: FnOnce(&mut dyn Adapter) -> AdapterResult<()>,
    {
        let mut state = self.write_state()?;
        let Some(delta) = apply(&mut state.model)? else {
            return Ok(false);
        };

        let persisted = self.persist(write);
        if sec == G && self.config.auto_build_role_links {
            state.model.build_incremental_role_links(LinkOp::Remove, ptype, &delta.removed)?;
            state.model.build_incremental_role_links(LinkOp::Add, ptype, &delta.added)?;
        }
        drop(state);

        self.after_mutation(change);
        persisted.map(|()| true)
    }

    /// Apply several filtered removals under one write lock
    ///
    /// Readers see either none or all of them. Follow-up steps run once per
    /// removal that changed anything; returns whether any did.
    pub(super) fn remove_filtered_together(&self, removals: &[FilteredRemoval<'_>]) -> AuthzResult<bool> {
        let mut state = self.write_state()?;
        for removal in removals {
            state.model.get(Section::from_key(removal.sec)?, removal.ptype)?;
        }

        let mut changes = Vec::new();
        let mut persisted = Ok(());
        for removal in removals {
            let removed = state.model.remove_filtered_policy(removal.sec, removal.ptype, removal.field_index, &removal.field_values)?;
            if removed.is_empty() {
                continue;
            }
            let outcome = self.persist(|adapter| adapter.remove_filtered_policy(removal.sec, removal.ptype, removal.field_index, &removal.field_values));
            if persisted.is_ok() {
                persisted = outcome;
            }
            if removal.sec == G && self.config.auto_build_role_links {
                state.model.build_incremental_role_links(LinkOp::Remove, removal.ptype, &removed)?;
            }
            changes.push(PolicyChange::RemoveFilteredPolicy {
                sec: removal.sec.to_string(),
                ptype: removal.ptype.to_string(),
                field_index: removal.field_index,
                field_values: removal.field_values.clone(),
            });
        }
        drop(state);

        let changed = !changes.is_empty();
        for change in changes {
            self.after_mutation(change);
        }
        persisted.map(|()| changed)
    }

    fn add_rule(&self, sec: &str, ptype: &str, rule: Vec<String>) -> AuthzResult<bool> {
        let change = PolicyChange::AddPolicy {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            rule: rule.clone(),
        };
        let stored = rule.clone();
        self.commit(
            sec,
            ptype,
            |model| Ok(model.add_policy(sec, ptype, stored)?.then(|| RoleDelta::added(vec![rule.clone()]))),
            |adapter| adapter.add_policy(sec, ptype, &rule),
            change,
        )
    }

    fn add_rules(&self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> AuthzResult<bool> {
        let change = PolicyChange::AddPolicies {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            rules: rules.clone(),
        };
        let stored = rules.clone();
        self.commit(
            sec,
            ptype,
            |model| Ok(model.add_policies(sec, ptype, stored)?.then(|| RoleDelta::added(rules.clone()))),
            |adapter| adapter.add_policies(sec, ptype, &rules),
            change,
        )
    }

    fn remove_rule(&self, sec: &str, ptype: &str, rule: Vec<String>) -> AuthzResult<bool> {
        let change = PolicyChange::RemovePolicy {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            rule: rule.clone(),
        };
        self.commit(
            sec,
            ptype,
            |model| Ok(model.remove_policy(sec, ptype, &rule)?.then(|| RoleDelta::removed(vec![rule.clone()]))),
            |adapter| adapter.remove_policy(sec, ptype, &rule),
            change,
        )
    }

    fn remove_rules(&self, sec: &str, ptype: &str, rules: Vec<Vec<String>>) -> AuthzResult<bool> {
        let change = PolicyChange::RemovePolicies {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            rules: rules.clone(),
        };
        self.commit(
            sec,
            ptype,
            |model| Ok(model.remove_policies(sec, ptype, &rules)?.then(|| RoleDelta::removed(rules.clone()))),
            |adapter| adapter.remove_policies(sec, ptype, &rules),
            change,
        )
    }

    fn remove_filtered_rules(&self, sec: &str, ptype: &str, field_index: usize, field_values: Vec<String>) -> AuthzResult<bool> {
        let change = PolicyChange::RemoveFilteredPolicy {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            field_index,
            field_values: field_values.clone(),
        };
        self.commit(
            sec,
            ptype,
            |model| {
                let removed = model.remove_filtered_policy(sec, ptype, field_index, &field_values)?;
                Ok((!removed.is_empty()).then(|| RoleDelta::removed(removed)))
            },
            |adapter| adapter.remove_filtered_policy(sec, ptype, field_index, &field_values),
            change,
        )
    }

    fn update_rule(&self, sec: &str, ptype: &str, old_rule: Vec<String>, new_rule: Vec<String>) -> AuthzResult<bool> {
        let change = PolicyChange::UpdatePolicy {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            old_rule: old_rule.clone(),
            new_rule: new_rule.clone(),
        };
        let stored = new_rule.clone();
        self.commit(
            sec,
            ptype,
            |model| {
                let updated = model.update_policy(sec, ptype, &old_rule, stored)?;
                Ok(updated.then(|| RoleDelta {
                    removed: vec![old_rule.clone()],
                    added: vec![new_rule.clone()],
                }))
            },
            |adapter| adapter.update_policy(sec, ptype, &old_rule, &new_rule),
            change,
        )
    }

    fn update_rules(&self, sec: &str, ptype: &str, old_rules: Vec<Vec<String>>, new_rules: Vec<Vec<String>>) -> AuthzResult<bool> {
        let change = PolicyChange::UpdatePolicies {
            sec: sec.to_string(),
            ptype: ptype.to_string(),
            old_rules: old_rules.clone(),
            new_rules: new_rules.clone(),
        };
        let stored = new_rules.clone();
        self.commit(
            sec,
            ptype,
            |model| {
                let updated = model.update_policies(sec, ptype, &old_rules, stored)?;
                Ok(updated.then(|| RoleDelta {
                    removed: old_rules.clone(),
                    added: new_rules.clone(),
                }))
            },
            |adapter| adapter.update_policies(sec, ptype, &old_rules, &new_rules),
            change,
        )
    }

    // Policy rules (`p`)

    pub fn get_policy(&self) -> AuthzResult<Vec<Vec<String>>> {
        self.get_named_policy(P)
    }

    pub fn get_named_policy(&self, ptype: &str) -> AuthzResult<Vec<Vec<String>>> {
        self.with_model(|m| m.get_policy(P, ptype))
    }

    pub fn get_filtered_policy<S: AsRef<str>>(&self, field_index: usize, field_values: &[S]) -> AuthzResult<Vec<Vec<String>>> {
        self.get_filtered_named_policy(P, field_index, field_values)
    }

    pub fn get_filtered_named_policy<S: AsRef<str>>(&self, ptype: &str, field_index: usize, field_values: &[S]) -> AuthzResult<Vec<Vec<String>>> {
        let values = to_rule(field_values);
        self.with_model(|m| m.get_filtered_policy(P, ptype, field_index, &values))
    }

    pub fn has_policy<S: AsRef<str>>(&self, rule: &[S]) -> AuthzResult<bool> {
        self.has_named_policy(P, rule)
    }

    pub fn has_named_policy<S: AsRef<str>>(&self, ptype: &str, rule: &[S]) -> AuthzResult<bool> {
        let rule = to_rule(rule);
        self.with_model(|m| m.has_policy(P, ptype, &rule))
    }

    /// Add a rule; returns false if it already exists
    pub fn add_policy<S: AsRef<str>>(&self, rule: &[S]) -> AuthzResult<bool> {
        self.add_named_policy(P, rule)
    }

    pub fn add_named_policy<S: AsRef<str>>(&self, ptype: &str, rule: &[S]) -> AuthzResult<bool> {
        self.add_rule(P, ptype, to_rule(rule))
    }

    /// Add all rules or none
    pub fn add_policies<R, S>(&self, rules: &[R]) -> AuthzResult<bool>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.add_named_policies(P, rules)
    }

    pub fn add_named_policies<R, S>(&self, ptype: &str, rules: &[R]) -> AuthzResult<bool>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.add_rules(P, ptype, to_rules(rules))
    }

    pub fn remove_policy<S: AsRef<str>>(&self, rule: &[S]) -> AuthzResult<bool> {
        self.remove_named_policy(P, rule)
    }

    pub fn remove_named_policy<S: AsRef<str>>(&self, ptype: &str, rule: &[S]) -> AuthzResult<bool> {
        self.remove_rule(P, ptype, to_rule(rule))
    }

    /// Remove all rules or none
    pub fn remove_policies<R, S>(&self, rules: &[R]) -> AuthzResult<bool>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.remove_named_policies(P, rules)
    }

    pub fn remove_named_policies<R, S>(&self, ptype: &str, rules: &[R]) -> AuthzResult<bool>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.remove_rules(P, ptype, to_rules(rules))
    }

    /// Remove every rule matching the field filter; empty values are wildcards
    pub fn remove_filtered_policy<S: AsRef<str>>(&self, field_index: usize, field_values: &[S]) -> AuthzResult<bool> {
        self.remove_filtered_named_policy(P, field_index, field_values)
    }

    pub fn remove_filtered_named_policy<S: AsRef<str>>(&self, ptype: &str, field_index: usize, field_values: &[S]) -> AuthzResult<bool> {
        self.remove_filtered_rules(P, ptype, field_index, to_rule(field_values))
    }

    pub fn update_policy<S: AsRef<str>>(&self, old_rule: &[S], new_rule: &[S]) -> AuthzResult<bool> {
        self.update_named_policy(P, old_rule, new_rule)
    }

    pub fn update_named_policy<S: AsRef<str>>(&self, ptype: &str, old_rule: &[S], new_rule: &[S]) -> AuthzResult<bool> {
        self.update_rule(P, ptype, to_rule(old_rule), to_rule(new_rule))
    }

    pub fn update_policies<R, S>(&self, old_rules: &[R], new_rules: &[R]) -> AuthzResult<bool>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.update_named_policies(P, old_rules, new_rules)
    }

    pub fn update_named_policies<R, S>(&self, ptype: &str, old_rules: &[R], new_rules: &[R]) -> AuthzResult<bool>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.update_rules(P, ptype, to_rules(old_rules), to_rules(new_rules))
    }

    // Grouping rules (`g`)

    pub fn get_grouping_policy(&self) -> AuthzResult<Vec<Vec<String>>> {
        self.get_named_grouping_policy(G)
    }

    pub fn get_named_grouping_policy(&self, ptype: &str) -> AuthzResult<Vec<Vec<String>>> {
        self.with_model(|m| m.get_policy(G, ptype))
    }

    pub fn get_filtered_grouping_policy<S: AsRef<str>>(&self, field_index: usize, field_values: &[S]) -> AuthzResult<Vec<Vec<String>>> {
        self.get_filtered_named_grouping_policy(G, field_index, field_values)
    }

    pub fn get_filtered_named_grouping_policy<S: AsRef<str>>(&self, ptype: &str, field_index: usize, field_values: &[S]) -> AuthzResult<Vec<Vec<String>>> {
        let values = to_rule(field_values);
        self.with_model(|m| m.get_filtered_policy(G, ptype, field_index, &values))
    }

    pub fn has_grouping_policy<S: AsRef<str>>(&self, rule: &[S]) -> AuthzResult<bool> {
        self.has_named_grouping_policy(G, rule)
    }

    pub fn has_named_grouping_policy<S: AsRef<str>>(&self, ptype: &str, rule: &[S]) -> AuthzResult<bool> {
        let rule = to_rule(rule);
        self.with_model(|m| m.has_policy(G, ptype, &rule))
    }

    pub fn add_grouping_policy<S: AsRef<str>>(&self, rule: &[S]) -> AuthzResult<bool> {
        self.add_named_grouping_policy(G, rule)
    }

    pub fn add_named_grouping_policy<S: AsRef<str>>(&self, ptype: &str, rule: &[S]) -> AuthzResult<bool> {
        self.add_rule(G, ptype, to_rule(rule))
    }

    pub fn add_grouping_policies<R, S>(&self, rules: &[R]) -> AuthzResult<bool>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.add_named_grouping_policies(G, rules)
    }

    pub fn add_named_grouping_policies<R, S>(&self, ptype: &str, rules: &[R]) -> AuthzResult<bool>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.add_rules(G, ptype, to_rules(rules))
    }

    pub fn remove_grouping_policy<S: AsRef<str>>(&self, rule: &[S]) -> AuthzResult<bool> {
        self.remove_named_grouping_policy(G, rule)
    }

    pub fn remove_named_grouping_policy<S: AsRef<str>>(&self, ptype: &str, rule: &[S]) -> AuthzResult<bool> {
        self.remove_rule(G, ptype, to_rule(rule))
    }

    pub fn remove_grouping_policies<R, S>(&self, rules: &[R]) -> AuthzResult<bool>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.remove_named_grouping_policies(G, rules)
    }

    pub fn remove_named_grouping_policies<R, S>(&self, ptype: &str, rules: &[R]) -> AuthzResult<bool>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.remove_rules(G, ptype, to_rules(rules))
    }

    pub fn remove_filtered_grouping_policy<S: AsRef<str>>(&self, field_index: usize, field_values: &[S]) -> AuthzResult<bool> {
        self.remove_filtered_named_grouping_policy(G, field_index, field_values)
    }

    pub fn remove_filtered_named_grouping_policy<S: AsRef<str>>(&self, ptype: &str, field_index: usize, field_values: &[S]) -> AuthzResult<bool> {
        self.remove_filtered_rules(G, ptype, field_index, to_rule(field_values))
    }

    pub fn update_grouping_policy<S: AsRef<str>>(&self, old_rule: &[S], new_rule: &[S]) -> AuthzResult<bool> {
        self.update_named_grouping_policy(G, old_rule, new_rule)
    }

    pub fn update_named_grouping_policy<S: AsRef<str>>(&self, ptype: &str, old_rule: &[S], new_rule: &[S]) -> AuthzResult<bool> {
        self.update_rule(G, ptype, to_rule(old_rule), to_rule(new_rule))
    }

    pub fn update_grouping_policies<R, S>(&self, old_rules: &[R], new_rules: &[R]) -> AuthzResult<bool>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.update_named_grouping_policies(G, old_rules, new_rules)
    }

    pub fn update_named_grouping_policies<R, S>(&self, ptype: &str, old_rules: &[R], new_rules: &[R]) -> AuthzResult<bool>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.update_rules(G, ptype, to_rules(old_rules), to_rules(new_rules))
    }

    // Listings

    /// Distinct subjects (field 0) across `p` rows
    pub fn get_all_subjects(&self) -> AuthzResult<Vec<String>> {
        self.with_model(|m| m.get_values_for_field(P, P, 0))
    }

    pub fn get_all_objects(&self) -> AuthzResult<Vec<String>> {
        self.with_model(|m| m.get_values_for_field(P, P, 1))
    }

    pub fn get_all_actions(&self) -> AuthzResult<Vec<String>> {
        self.with_model(|m| m.get_values_for_field(P, P, 2))
    }

    /// Distinct roles (field 1) across `g` rows
    pub fn get_all_roles(&self) -> AuthzResult<Vec<String>> {
        self.with_model(|m| m.get_values_for_field(G, G, 1))
    }

    /// Drop every stored rule and every role edge
    pub fn clear_policy(&self) -> AuthzResult<()> {
        {
            let mut state = self.write_state()?;
            state.model.clear_policy();
            state.model.build_role_links()?;
        }
        self.persist(|adapter| adapter.save_policy(&[]))?;
        info!("Policy cleared");
        self.after_mutation(PolicyChange::ClearPolicy);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{MemoryAdapter, PolicyLine};
    use crate::error::{AdapterError, AuthzError};

    fn rbac_model() -> Model {
        Model::from_defs(&[
            ("r", "r", "sub, obj, act"),
            ("p", "p", "sub, obj, act"),
            ("g", "g", "_, _"),
            ("e", "e", "some(where (p.eft == allow))"),
            ("m", "m", "g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act"),
        ])
        .unwrap()
    }

    struct FailingAdapter;

    impl Adapter for FailingAdapter {
        fn load_policy(&self) -> AdapterResult<Vec<PolicyLine>> {
            Ok(Vec::new())
        }

        fn save_policy(&mut self, _lines: &[PolicyLine]) -> AdapterResult<()> {
            Ok(())
        }

        fn add_policy(&mut self, _sec: &str, _ptype: &str, _rule: &[String]) -> AdapterResult<()> {
            Err(AdapterError::Other("disk full".into()))
        }
    }

    #[test]
    fn test_grouping_mutations_patch_role_graph() {
        let e = Enforcer::new(rbac_model()).unwrap();
        e.add_policy(&["admin", "data1", "read"]).unwrap();
        assert!(!e.enforce(["alice", "data1", "read"]).unwrap());

        assert!(e.add_grouping_policy(&["alice", "admin"]).unwrap());
        assert!(e.enforce(["alice", "data1", "read"]).unwrap());

        assert!(e.update_grouping_policy(&["alice", "admin"], &["bob", "admin"]).unwrap());
        assert!(!e.enforce(["alice", "data1", "read"]).unwrap());
        assert!(e.enforce(["bob", "data1", "read"]).unwrap());

        assert!(e.remove_filtered_grouping_policy(1, &["admin"]).unwrap());
        assert!(!e.enforce(["bob", "data1", "read"]).unwrap());
        assert!(!e.remove_filtered_grouping_policy(1, &["admin"]).unwrap());
    }

    #[test]
    fn test_mutations_reach_memory_adapter() {
        let e = Enforcer::builder(rbac_model()).with_adapter(MemoryAdapter::new()).build().unwrap();
        e.add_policies(&[vec!["alice", "data1", "read"], vec!["bob", "data2", "write"]]).unwrap();
        e.remove_policy(&["bob", "data2", "write"]).unwrap();
        e.add_grouping_policy(&["alice", "admin"]).unwrap();

        e.load_policy().unwrap();
        assert_eq!(e.get_policy().unwrap(), vec![vec!["alice".to_string(), "data1".into(), "read".into()]]);
        assert!(e.has_grouping_policy(&["alice", "admin"]).unwrap());
    }

    #[test]
    fn test_adapter_failure_is_reported_after_memory_update() {
        let e = Enforcer::builder(rbac_model()).with_adapter(FailingAdapter).build().unwrap();
        assert!(matches!(e.add_policy(&["alice", "data1", "read"]), Err(AuthzError::Adapter(AdapterError::Other(_)))));
        assert!(e.has_policy(&["alice", "data1", "read"]).unwrap());

        // not implemented by the adapter: swallowed
        assert!(e.remove_policy(&["alice", "data1", "read"]).unwrap());
    }

    #[test]
    fn test_noop_mutations_return_false() {
        let e = Enforcer::new(rbac_model()).unwrap();
        assert!(e.add_policy(&["alice", "data1", "read"]).unwrap());
        assert!(!e.add_policy(&["alice", "data1", "read"]).unwrap());
        assert!(!e.remove_policy(&["bob", "data1", "read"]).unwrap());
        assert!(!e.update_policy(&["bob", "data1", "read"], &["bob", "data1", "write"]).unwrap());
        assert!(matches!(e.add_policy(&["alice"]), Err(AuthzError::ArityMismatch { .. })));
        assert!(matches!(e.add_named_policy("p9", &["a", "b", "c"]), Err(AuthzError::PolicyTypeNotFound { .. })));
    }

    #[test]
    fn test_listings() {
        let e = Enforcer::new(rbac_model()).unwrap();
        e.add_policies(&[["alice", "data1", "read"], ["bob", "data2", "write"], ["alice", "data2", "read"]]).unwrap();
        e.add_grouping_policies(&[["alice", "admin"], ["bob", "admin"]]).unwrap();
        assert_eq!(e.get_all_subjects().unwrap(), vec!["alice", "bob"]);
        assert_eq!(e.get_all_objects().unwrap(), vec!["data1", "data2"]);
        assert_eq!(e.get_all_actions().unwrap(), vec!["read", "write"]);
        assert_eq!(e.get_all_roles().unwrap(), vec!["admin"]);
        assert_eq!(e.get_filtered_policy(0, &["alice"]).unwrap().len(), 2);

        e.clear_policy().unwrap();
        assert!(e.get_policy().unwrap().is_empty());
        assert!(!e.enforce(["alice", "data1", "read"]).unwrap());
    }
}
