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

//! Change notification towards other enforcer instances

use crate::error::AuthzResult;
use serde::{Deserialize, Serialize};

/// Description of a policy mutation, sent to the watcher after it was applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyChange {
    AddPolicy { sec: String, ptype: String, rule: Vec<String> },
    AddPolicies { sec: String, ptype: String, rules: Vec<Vec<String>> },
    RemovePolicy { sec: String, ptype: String, rule: Vec<String> },
    RemovePolicies { sec: String, ptype: String, rules: Vec<Vec<String>> },
    RemoveFilteredPolicy { sec: String, ptype: String, field_index: usize, field_values: Vec<String> },
    UpdatePolicy { sec: String, ptype: String, old_rule: Vec<String>, new_rule: Vec<String> },
    UpdatePolicies { sec: String, ptype: String, old_rules: Vec<Vec<String>>, new_rules: Vec<Vec<String>> },
    ClearPolicy,
    SavePolicy,
}

impl PolicyChange {
    /// Policy type touched by the change, if it targets a single one
    pub fn ptype(&self) -> Option<&str> {
        match self {
            PolicyChange::AddPolicy { ptype, .. }
            | PolicyChange::AddPolicies { ptype, .. }
            | PolicyChange::RemovePolicy { ptype, .. }
            | PolicyChange::RemovePolicies { ptype, .. }
            | PolicyChange::RemoveFilteredPolicy { ptype, .. }
            | PolicyChange::UpdatePolicy { ptype, .. }
            | PolicyChange::UpdatePolicies { ptype, .. } => Some(ptype),
            PolicyChange::ClearPolicy | PolicyChange::SavePolicy => None,
        }
    }
}

/// Outbound notification channel; delivery is fire-and-forget from the
/// enforcer's point of view and failures are only logged
pub trait Watcher: Send + Sync {
    fn update(&mut self, change: &PolicyChange) -> AuthzResult<()>;
}
