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

//! Folding of per-row matcher outcomes into one decision

use crate::error::{AuthzError, AuthzResult};
use std::fmt;
use std::ops::ControlFlow;

/// Combination policy declared by an `e` section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// `some(where (p.eft == allow))`
    AllowOverride,
    /// `!some(where (p.eft == deny))`
    DenyOverride,
    /// `some(where (p.eft == allow)) && !some(where (p.eft == deny))`
    AllowAndDeny,
    /// `priority(p.eft) || deny`
    Priority,
}

impl EffectKind {
    /// Recognise an effect expression, ignoring whitespace
    pub fn parse(expression: &str) -> AuthzResult<Self> {
        let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
        match compact.as_str() {
            "some(where(p.eft==allow))" => Ok(EffectKind::AllowOverride),
            "!some(where(p.eft==deny))" => Ok(EffectKind::DenyOverride),
            "some(where(p.eft==allow))&&!some(where(p.eft==deny))" => Ok(EffectKind::AllowAndDeny),
            "priority(p.eft)||deny" => Ok(EffectKind::Priority),
            _ => Err(AuthzError::model(format!("unsupported effect expression '{}'", expression))),
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EffectKind::AllowOverride => "some(where (p.eft == allow))",
            EffectKind::DenyOverride => "!some(where (p.eft == deny))",
            EffectKind::AllowAndDeny => "some(where (p.eft == allow)) && !some(where (p.eft == deny))",
            EffectKind::Priority => "priority(p.eft) || deny",
        };
        f.write_str(text)
    }
}

/// Effect label of one policy row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
    Indeterminate,
}

impl Effect {
    /// Interpret a row's `eft` value; rows without one allow
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            None | Some("allow") => Effect::Allow,
            Some("deny") => Effect::Deny,
            Some(_) => Effect::Indeterminate,
        }
    }
}

/// Incremental fold over the matched rows of one enforcement
///
/// Feed matched rows in policy order through [`EffectFold::observe`]; stop as
/// soon as it returns `Break`, then read the outcome with [`EffectFold::finish`].
/// The returned row indices are the rows that decided the outcome.
#[derive(Debug, Clone)]
pub struct EffectFold {
    kind: EffectKind,
    allow_rows: Vec<usize>,
    decided: Option<(bool, usize)>,
}

impl EffectFold {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            allow_rows: Vec::new(),
            decided: None,
        }
    }

    pub fn observe(&mut self, index: usize, effect: Effect) -> ControlFlow<()> {
        if self.decided.is_some() {
            return ControlFlow::Break(());
        }

        let decision = match (self.kind, effect) {
            (EffectKind::AllowOverride, Effect::Allow) => Some(true),
            (EffectKind::DenyOverride, Effect::Deny) => Some(false),
            (EffectKind::AllowAndDeny, Effect::Deny) => Some(false),
            (EffectKind::AllowAndDeny, Effect::Allow) => {
                self.allow_rows.push(index);
                None
            }
            (EffectKind::Priority, Effect::Allow) => Some(true),
            (EffectKind::Priority, Effect::Deny) => Some(false),
            _ => None,
        };

        match decision {
            Some(allowed) => {
                self.decided = Some((allowed, index));
                ControlFlow::Break(())
            }
            None => ControlFlow::Continue(()),
        }
    }

    /// Final decision and the rows that produced it
    pub fn finish(self) -> (bool, Vec<usize>) {
        if let Some((allowed, index)) = self.decided {
            return (allowed, vec![index]);
        }
        match self.kind {
            EffectKind::AllowOverride | EffectKind::Priority => (false, Vec::new()),
            EffectKind::DenyOverride => (true, Vec::new()),
            EffectKind::AllowAndDeny if self.allow_rows.is_empty() => (false, Vec::new()),
            EffectKind::AllowAndDeny => (true, self.allow_rows),
        }
    }
}

/// Fold a complete sequence of `(matched, effect)` rows
///
/// An empty sequence is `false` for every policy.
pub fn combine<I>(kind: EffectKind, rows: I) -> (bool, Vec<usize>)
where
    I: IntoIterator<Item = (bool, Effect)>,
{
    let mut fold = EffectFold::new(kind);
    let mut seen_any = false;
    for (index, (matched, effect)) in rows.into_iter().enumerate() {
        seen_any = true;
        if matched && fold.observe(index, effect).is_break() {
            break;
        }
    }
    if !seen_any {
        return (false, Vec::new());
    }
    fold.finish()
}
