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

// Role graph behaviour, directly and through the enforcer

mod common;

use common::*;
use dotauthz_core::matcher::{key_match, key_match2};
use dotauthz_core::{AuthzError, DefaultRoleManager, Enforcer, EnforcerConfig, GroupingRoleManager, Model, RoleManager};

#[test]
fn test_add_link_is_idempotent() {
    let mut rm = DefaultRoleManager::default();
    assert!(rm.add_link("u1", "g1", None));
    assert!(!rm.add_link("u1", "g1", None));
    assert_eq!(rm.link_count(), 1);
    assert_eq!(rm.get_roles("u1", None), vec!["g1"]);
}

#[test]
fn test_reachability_and_deletion() {
    let managers: Vec<Box<dyn RoleManager>> = vec![Box::new(DefaultRoleManager::default()), Box::new(GroupingRoleManager::default())];
    for mut rm in managers {
        rm.add_link("u1", "g1", None);
        rm.add_link("g1", "g3", None);
        rm.add_link("u3", "g2", None);

        assert!(rm.has_link("u1", "g3", None), "{:?}", rm);
        assert!(!rm.has_link("u1", "g2", None), "{:?}", rm);
        assert!(rm.has_link("u1", "u1", None));

        assert!(rm.delete_link("g1", "g3", None));
        assert!(!rm.has_link("u1", "g3", None), "{:?}", rm);
        assert!(rm.has_link("u1", "g1", None), "{:?}", rm);
        assert!(!rm.delete_link("g1", "g3", None));
    }
}

#[test]
fn test_cycles_terminate() {
    let mut rm = DefaultRoleManager::default();
    rm.add_link("a", "b", None);
    rm.add_link("b", "c", None);
    rm.add_link("c", "a", None);
    assert!(rm.has_link("a", "c", None));
    assert!(!rm.has_link("a", "z", None));
}

#[test]
fn test_hierarchy_level_bounds_search() {
    let config = EnforcerConfig {
        max_hierarchy_level: 2,
        ..EnforcerConfig::default()
    };
    let e = Enforcer::builder(rbac_model()).with_config(config).build().unwrap();
    e.add_policy(&["r3", "data1", "read"]).unwrap();
    e.add_grouping_policies(&[["u", "r1"], ["r1", "r2"], ["r2", "r3"]]).unwrap();

    assert!(!e.enforce(["u", "data1", "read"]).unwrap());
    assert!(e.enforce(["r1", "data1", "read"]).unwrap());
}

#[test]
fn test_rbac_enforcement_through_roles() {
    init_tracing();
    let e = Enforcer::new(rbac_model()).unwrap();
    e.add_policies(&[["alice", "data1", "read"], ["data2_admin", "data2", "read"], ["data2_admin", "data2", "write"]]).unwrap();
    e.add_grouping_policy(&["alice", "data2_admin"]).unwrap();

    assert!(e.enforce(["alice", "data1", "read"]).unwrap());
    assert!(e.enforce(["alice", "data2", "write"]).unwrap());
    assert!(!e.enforce(["bob", "data2", "write"]).unwrap());

    e.delete_role_for_user("alice", "data2_admin", None).unwrap();
    assert!(!e.enforce(["alice", "data2", "write"]).unwrap());
}

#[test]
fn test_domains_with_pattern_matching() {
    let e = Enforcer::new(domain_model()).unwrap();
    e.add_named_domain_matching_fn("g", key_match).unwrap();
    e.add_policies(&[["admin", "tenant*", "/data/:id", "read"], ["admin", "tenant1", "/reports/*", "write"]]).unwrap();
    e.add_grouping_policy(&["alice", "admin", "tenant*"]).unwrap();
    e.add_grouping_policy(&["bob", "admin", "tenant1"]).unwrap();

    assert!(e.enforce(["alice", "tenant7", "/data/42", "read"]).unwrap());
    assert!(!e.enforce(["alice", "tenant7", "/data/42/raw", "read"]).unwrap());
    assert!(e.enforce(["alice", "tenant1", "/reports/q3", "write"]).unwrap());
    assert!(e.enforce(["bob", "tenant1", "/reports/q3", "write"]).unwrap());
    assert!(!e.enforce(["bob", "tenant2", "/data/42", "read"]).unwrap());
    assert!(!e.enforce(["alice", "other", "/data/42", "read"]).unwrap());
}

#[test]
fn test_name_pattern_matching() {
    let e = Enforcer::new(rbac_model()).unwrap();
    e.add_named_matching_fn("g", key_match2).unwrap();
    e.add_policy(&["book_reader", "/book/1", "read"]).unwrap();
    e.add_grouping_policy(&["/book/:id", "book_reader"]).unwrap();

    assert!(e.enforce(["/book/7", "/book/1", "read"]).unwrap());
    assert!(!e.enforce(["/pen/7", "/book/1", "read"]).unwrap());
}

#[test]
fn test_matching_fns_survive_full_rebuild() {
    let e = Enforcer::new(rbac_model()).unwrap();
    e.add_named_matching_fn("g", key_match).unwrap();
    e.add_policy(&["guest", "data1", "read"]).unwrap();
    e.add_grouping_policy(&["*", "guest"]).unwrap();
    assert!(e.enforce(["anyone", "data1", "read"]).unwrap());

    e.build_role_links().unwrap();
    assert!(e.enforce(["anyone", "data1", "read"]).unwrap());
}

#[test]
fn test_grouping_role_manager_swap() {
    let e = Enforcer::new(rbac_model()).unwrap();
    e.add_policy(&["admin", "data1", "read"]).unwrap();
    e.add_grouping_policies(&[["alice", "staff"], ["staff", "admin"]]).unwrap();

    e.set_role_manager("g", Box::new(GroupingRoleManager::default())).unwrap();
    assert!(e.enforce(["alice", "data1", "read"]).unwrap());
    e.remove_grouping_policy(&["staff", "admin"]).unwrap();
    assert!(!e.enforce(["alice", "data1", "read"]).unwrap());

    assert!(e.set_role_manager("g9", Box::new(GroupingRoleManager::default())).is_err());
}

#[test]
fn test_manual_role_link_build() {
    let mut e = Enforcer::new(rbac_model()).unwrap();
    e.enable_auto_build_role_links(false);
    e.add_policy(&["admin", "data1", "read"]).unwrap();
    e.add_grouping_policy(&["alice", "admin"]).unwrap();
    assert!(!e.enforce(["alice", "data1", "read"]).unwrap());

    e.build_role_links().unwrap();
    assert!(e.enforce(["alice", "data1", "read"]).unwrap());
}

#[test]
fn test_multiple_role_types() {
    let model = Model::from_defs(&[
        ("r", "r", "sub, obj, act"),
        ("p", "p", "sub, obj, act"),
        ("g", "g", "_, _"),
        ("g", "g2", "_, _"),
        ("e", "e", ALLOW_OVERRIDE),
        ("m", "m", "g(r.sub, p.sub) && g2(r.obj, p.obj) && r.act == p.act"),
    ])
    .unwrap();
    let e = Enforcer::new(model).unwrap();
    e.add_policy(&["writers", "docs", "write"]).unwrap();
    e.add_grouping_policy(&["alice", "writers"]).unwrap();
    e.add_named_grouping_policy("g2", &["readme.md", "docs"]).unwrap();

    assert!(e.enforce(["alice", "readme.md", "write"]).unwrap());
    assert!(!e.enforce(["alice", "main.rs", "write"]).unwrap());
    assert_eq!(e.get_named_grouping_policy("g2").unwrap(), vec![rule(&["readme.md", "docs"])]);
}

#[test]
fn test_wide_grouping_rows_share_one_edge() {
    let model = Model::from_defs(&[
        ("r", "r", "sub, dom, obj, act"),
        ("p", "p", "sub, dom, obj, act"),
        ("g", "g", "_, _, _, _"),
        ("e", "e", ALLOW_OVERRIDE),
        ("m", "m", "g(r.sub, p.sub, r.dom) && r.dom == p.dom && r.obj == p.obj && r.act == p.act"),
    ])
    .unwrap();
    let e = Enforcer::new(model).unwrap();
    e.add_policy(&["admin", "d1", "data1", "read"]).unwrap();
    e.add_grouping_policies(&[["alice", "admin", "d1", "x"], ["alice", "admin", "d1", "y"]]).unwrap();

    e.remove_grouping_policy(&["alice", "admin", "d1", "x"]).unwrap();
    assert!(e.has_grouping_policy(&["alice", "admin", "d1", "y"]).unwrap());
    assert!(e.enforce(["alice", "d1", "data1", "read"]).unwrap());

    // an update that keeps the edge leaves it in place
    e.update_grouping_policy(&["alice", "admin", "d1", "y"], &["alice", "admin", "d1", "z"]).unwrap();
    assert!(e.enforce(["alice", "d1", "data1", "read"]).unwrap());

    e.remove_grouping_policy(&["alice", "admin", "d1", "z"]).unwrap();
    assert!(!e.enforce(["alice", "d1", "data1", "read"]).unwrap());
}

#[test]
fn test_role_call_takes_at_most_a_domain() {
    let model = Model::from_defs(&[
        ("r", "r", "sub, dom, obj, act"),
        ("p", "p", "sub, dom, obj, act"),
        ("g", "g", "_, _, _, _"),
        ("e", "e", ALLOW_OVERRIDE),
        ("m", "m", "g(r.sub, p.sub, r.dom, r.obj) && r.act == p.act"),
    ])
    .unwrap();
    assert!(matches!(Enforcer::new(model), Err(AuthzError::ModelDefinition { .. })));
}
