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

//! Shared fixtures for the integration tests

#![allow(dead_code)]

use dotauthz_core::{Model, Section};
use std::sync::Once;

static INIT: Once = Once::new();

/// Route `tracing` output to the test harness writer
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::DEBUG).try_init();
    });
}

pub const ALLOW_OVERRIDE: &str = "some(where (p.eft == allow))";
pub const DENY_OVERRIDE: &str = "!some(where (p.eft == deny))";
pub const ALLOW_AND_DENY: &str = "some(where (p.eft == allow)) && !some(where (p.eft == deny))";
pub const PRIORITY: &str = "priority(p.eft) || deny";

/// Plain ACL over `sub, obj, act`
pub fn acl_model() -> Model {
    Model::from_defs(&[
        ("r", "r", "sub, obj, act"),
        ("p", "p", "sub, obj, act"),
        ("e", "e", ALLOW_OVERRIDE),
        ("m", "m", "r.sub == p.sub && r.obj == p.obj && r.act == p.act"),
    ])
    .unwrap()
}

/// ACL whose rows carry an explicit effect column, combined with `effect`
pub fn effect_model(effect: &str) -> Model {
    Model::from_defs(&[
        ("r", "r", "sub, obj, act"),
        ("p", "p", "sub, obj, act, eft"),
        ("e", "e", effect),
        ("m", "m", "r.sub == p.sub && r.obj == p.obj && r.act == p.act"),
    ])
    .unwrap()
}

/// RBAC with a single role type `g = _, _`
pub fn rbac_model() -> Model {
    Model::from_defs(&[
        ("r", "r", "sub, obj, act"),
        ("p", "p", "sub, obj, act"),
        ("g", "g", "_, _"),
        ("e", "e", ALLOW_OVERRIDE),
        ("m", "m", "g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act"),
    ])
    .unwrap()
}

/// RBAC with domains, `g = _, _, _`, objects matched with `keyMatch2`
pub fn domain_model() -> Model {
    Model::from_defs(&[
        ("r", "r", "sub, dom, obj, act"),
        ("p", "p", "sub, dom, obj, act"),
        ("g", "g", "_, _, _"),
        ("e", "e", ALLOW_OVERRIDE),
        ("m", "m", "g(r.sub, p.sub, r.dom) && keyMatch(r.dom, p.dom) && keyMatch2(r.obj, p.obj) && r.act == p.act"),
    ])
    .unwrap()
}

pub fn rule(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Every section a complete model needs
pub fn is_complete(model: &Model) -> bool {
    [Section::Request, Section::Policy, Section::Effect, Section::Matcher].into_iter().all(|s| model.has_section(s))
}
