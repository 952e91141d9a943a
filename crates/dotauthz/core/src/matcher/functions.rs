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

//! Built-in matcher functions and the function registry
//!
//! The path, regex, IP and glob helpers here encode matching semantics that
//! policies rely on for security decisions; their behaviour is fixed:
//! - `keyMatch`: `*` in the pattern matches the whole remaining suffix
//! - `keyMatch2`: `/*` matches any suffix, `:name` matches one path segment
//! - `keyMatch3`: like `keyMatch2` with `{name}` segments
//! - `keyMatch4`: `{name}` segments, repeated names must bind the same value
//! - `keyMatch5`: `keyMatch3` ignoring a query string on the key
//! - `regexMatch`: unanchored regular expression search
//! - `ipMatch`: IP equality or CIDR containment
//! - `globMatch`: shell glob where `*` does not cross `/`

use crate::error::{AuthzError, AuthzResult};
use crate::value::Value;
use dashmap::DashMap;
use globset::GlobBuilder;
use ipnet::IpNet;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Upper bound on memoised regexes before the cache is reset
const REGEX_CACHE_LIMIT: usize = 4096;

static REGEX_CACHE: LazyLock<DashMap<String, Regex>> = LazyLock::new(DashMap::new);

static COLON_SEGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":[^/]+").expect("static regex"));
static BRACE_SEGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^/]+?\}").expect("static regex"));

/// Compile a regex, reusing a previously compiled instance for the same pattern
fn cached_regex(pattern: &str) -> Result<Regex, regex::Error> {
    if let Some(re) = REGEX_CACHE.get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern)?;
    if REGEX_CACHE.len() >= REGEX_CACHE_LIMIT {
        REGEX_CACHE.clear();
    }
    REGEX_CACHE.insert(pattern.to_string(), re.clone());
    Ok(re)
}

fn anchored_match(key: &str, pattern: &str) -> bool {
    match cached_regex(&format!("^{}$", pattern)) {
        Ok(re) => re.is_match(key),
        Err(e) => {
            debug!(pattern = %pattern, error = %e, "Pattern is not a valid regex; treating as no match");
            false
        }
    }
}

/// `keyMatch("/foo/bar", "/foo*")` is true
pub fn key_match(key1: &str, key2: &str) -> bool {
    match key2.find('*') {
        None => key1 == key2,
        Some(i) => {
            if key1.len() > i {
                key1.as_bytes()[..i] == key2.as_bytes()[..i]
            } else {
                key1 == &key2[..i]
            }
        }
    }
}

/// Suffix of `key1` matched by the `*` in `key2`, or an empty string
pub fn key_get(key1: &str, key2: &str) -> String {
    match key2.find('*') {
        Some(i) if key1.len() > i && key1.as_bytes()[..i] == key2.as_bytes()[..i] => String::from_utf8_lossy(&key1.as_bytes()[i..]).into_owned(),
        _ => String::new(),
    }
}

/// `keyMatch2("/foo/bar", "/foo/*")` and `keyMatch2("/resource1", "/:resource")` are true
pub fn key_match2(key1: &str, key2: &str) -> bool {
    let pattern = key2.replace("/*", "/.*");
    let pattern = COLON_SEGMENT.replace_all(&pattern, "[^/]+");
    anchored_match(key1, &pattern)
}

/// Value bound to `:path_var` when `key1` matches the `keyMatch2` pattern `key2`
pub fn key_get2(key1: &str, key2: &str, path_var: &str) -> String {
    let pattern = key2.replace("/*", "/.*");
    let names: Vec<String> = COLON_SEGMENT.find_iter(&pattern).map(|m| m.as_str()[1..].to_string()).collect();
    let pattern = COLON_SEGMENT.replace_all(&pattern, "([^/]+)");

    let Ok(re) = cached_regex(&format!("^{}$", pattern)) else {
        return String::new();
    };
    let Some(captures) = re.captures(key1) else {
        return String::new();
    };

    names
        .iter()
        .position(|name| name == path_var)
        .and_then(|i| captures.get(i + 1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// `keyMatch3("/foo/bar", "/foo/{id}")` is true
pub fn key_match3(key1: &str, key2: &str) -> bool {
    let pattern = key2.replace("/*", "/.*");
    let pattern = BRACE_SEGMENT.replace_all(&pattern, "[^/]+");
    anchored_match(key1, &pattern)
}

/// Like `keyMatch3`, but every occurrence of the same `{name}` must bind the same value
pub fn key_match4(key1: &str, key2: &str) -> bool {
    let pattern = key2.replace("/*", "/.*");
    let names: Vec<&str> = BRACE_SEGMENT.find_iter(&pattern).map(|m| &m.as_str()[1..m.as_str().len() - 1]).collect();
    let pattern = BRACE_SEGMENT.replace_all(&pattern, "([^/]+)");

    let re = match cached_regex(&format!("^{}$", pattern)) {
        Ok(re) => re,
        Err(_) => return false,
    };
    let Some(captures) = re.captures(key1) else {
        return false;
    };

    let mut bound: HashMap<&str, &str> = HashMap::new();
    for (i, name) in names.iter().enumerate() {
        let Some(value) = captures.get(i + 1).map(|m| m.as_str()) else {
            return false;
        };
        if let Some(previous) = bound.insert(*name, value) {
            if previous != value {
                return false;
            }
        }
    }
    true
}

/// `keyMatch3` applied to `key1` with any `?query` suffix removed
pub fn key_match5(key1: &str, key2: &str) -> bool {
    let key1 = key1.split('?').next().unwrap_or(key1);
    key_match3(key1, key2)
}

/// Unanchored regular expression search of `key2` within `key1`
pub fn regex_match(key1: &str, key2: &str) -> AuthzResult<bool> {
    let re = cached_regex(key2).map_err(|e| AuthzError::Evaluation {
        message: format!("regexMatch: invalid pattern '{}': {}", key2, e),
    })?;
    Ok(re.is_match(key1))
}

/// Whether IP `ip1` equals `ip2` or lies inside the CIDR block `ip2`
pub fn ip_match(ip1: &str, ip2: &str) -> AuthzResult<bool> {
    let addr: IpAddr = ip1.trim().parse().map_err(|_| AuthzError::Evaluation {
        message: format!("ipMatch: argument 1 must be an IP address, got '{}'", ip1),
    })?;

    if let Ok(net) = ip2.trim().parse::<IpNet>() {
        return Ok(net.contains(&addr));
    }

    let other: IpAddr = ip2.trim().parse().map_err(|_| AuthzError::Evaluation {
        message: format!("ipMatch: argument 2 must be an IP address or CIDR, got '{}'", ip2),
    })?;
    Ok(addr == other)
}

/// Shell-style glob match of `key1` against the pattern `key2`
pub fn glob_match(key1: &str, key2: &str) -> AuthzResult<bool> {
    let glob = GlobBuilder::new(key2).literal_separator(true).build().map_err(|e| AuthzError::Evaluation {
        message: format!("globMatch: invalid pattern '{}': {}", key2, e),
    })?;
    Ok(glob.compile_matcher().is_match(key1))
}

fn regex_match_or_false(key1: &str, key2: &str) -> bool {
    regex_match(key1, key2).unwrap_or(false)
}

fn ip_match_or_false(key1: &str, key2: &str) -> bool {
    ip_match(key1, key2).unwrap_or(false)
}

fn glob_match_or_false(key1: &str, key2: &str) -> bool {
    glob_match(key1, key2).unwrap_or(false)
}

/// User-supplied matcher function
pub type CustomFunction = Arc<dyn Fn(&[Value]) -> AuthzResult<Value> + Send + Sync>;

/// Built-in functions resolvable by name inside a matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    KeyMatch,
    KeyGet,
    KeyMatch2,
    KeyGet2,
    KeyMatch3,
    KeyMatch4,
    KeyMatch5,
    RegexMatch,
    IpMatch,
    GlobMatch,
}

impl Builtin {
    pub const ALL: [Builtin; 10] = [
        Builtin::KeyMatch,
        Builtin::KeyGet,
        Builtin::KeyMatch2,
        Builtin::KeyGet2,
        Builtin::KeyMatch3,
        Builtin::KeyMatch4,
        Builtin::KeyMatch5,
        Builtin::RegexMatch,
        Builtin::IpMatch,
        Builtin::GlobMatch,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::KeyMatch => "keyMatch",
            Builtin::KeyGet => "keyGet",
            Builtin::KeyMatch2 => "keyMatch2",
            Builtin::KeyGet2 => "keyGet2",
            Builtin::KeyMatch3 => "keyMatch3",
            Builtin::KeyMatch4 => "keyMatch4",
            Builtin::KeyMatch5 => "keyMatch5",
            Builtin::RegexMatch => "regexMatch",
            Builtin::IpMatch => "ipMatch",
            Builtin::GlobMatch => "globMatch",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Builtin::KeyGet2 => 3,
            _ => 2,
        }
    }

    pub fn call(self, args: &[Value]) -> AuthzResult<Value> {
        let strings = args
            .iter()
            .map(|v| {
                v.as_str().ok_or_else(|| AuthzError::Evaluation {
                    message: format!("{}: expected string arguments, got {}", self.name(), v.type_name()),
                })
            })
            .collect::<AuthzResult<Vec<&str>>>()?;

        if strings.len() != self.arity() {
            return Err(AuthzError::eval(format!("{}: expected {} arguments, got {}", self.name(), self.arity(), strings.len())));
        }

        let value = match self {
            Builtin::KeyMatch => Value::Bool(key_match(strings[0], strings[1])),
            Builtin::KeyGet => Value::Str(key_get(strings[0], strings[1])),
            Builtin::KeyMatch2 => Value::Bool(key_match2(strings[0], strings[1])),
            Builtin::KeyGet2 => Value::Str(key_get2(strings[0], strings[1], strings[2])),
            Builtin::KeyMatch3 => Value::Bool(key_match3(strings[0], strings[1])),
            Builtin::KeyMatch4 => Value::Bool(key_match4(strings[0], strings[1])),
            Builtin::KeyMatch5 => Value::Bool(key_match5(strings[0], strings[1])),
            Builtin::RegexMatch => Value::Bool(regex_match(strings[0], strings[1])?),
            Builtin::IpMatch => Value::Bool(ip_match(strings[0], strings[1])?),
            Builtin::GlobMatch => Value::Bool(glob_match(strings[0], strings[1])?),
        };
        Ok(value)
    }

    /// Boolean two-argument form, usable as a role-graph matching function
    pub fn as_matching_fn(self) -> Option<fn(&str, &str) -> bool> {
        match self {
            Builtin::KeyMatch => Some(key_match),
            Builtin::KeyMatch2 => Some(key_match2),
            Builtin::KeyMatch3 => Some(key_match3),
            Builtin::KeyMatch4 => Some(key_match4),
            Builtin::KeyMatch5 => Some(key_match5),
            Builtin::RegexMatch => Some(regex_match_or_false),
            Builtin::IpMatch => Some(ip_match_or_false),
            Builtin::GlobMatch => Some(glob_match_or_false),
            Builtin::KeyGet | Builtin::KeyGet2 => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.into_iter().find(|b| b.name() == name)
    }
}

/// A function resolvable by name during matcher compilation
#[derive(Clone)]
pub enum Function {
    Builtin(Builtin),
    Custom(CustomFunction),
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Builtin(b) => write!(f, "Builtin({})", b.name()),
            Function::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Registry of named functions available to matchers
#[derive(Debug, Clone)]
pub struct FunctionMap {
    functions: HashMap<String, Function>,
}

impl FunctionMap {
    /// Registry pre-populated with every built-in
    pub fn new() -> Self {
        let functions = Builtin::ALL.into_iter().map(|b| (b.name().to_string(), Function::Builtin(b))).collect();
        Self { functions }
    }

    /// Register or replace a custom function
    pub fn add(&mut self, name: impl Into<String>, f: CustomFunction) {
        self.functions.insert(name.into(), Function::Custom(f));
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }
}

impl Default for FunctionMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_match_and_key_match2_are_distinct() {
        assert!(key_match("/foo/bar", "/foo*"));
        assert!(!key_match2("/foo/bar", "/foo*"));
        assert!(key_match2("/foo/bar", "/foo/*"));
    }

    #[test]
    fn test_key_match() {
        assert!(key_match("/foo", "/foo"));
        assert!(key_match("/foo", "/foo*"));
        assert!(!key_match("/foo", "/foo/*"));
        assert!(!key_match("/bar", "/foo"));
        assert!(key_match("/foo/bar", "/foo/*"));
        assert!(key_match("/foobar", "/foo*"));
        assert!(!key_match("/foobar", "/foo/*"));
    }

    #[test]
    fn test_key_get() {
        assert_eq!(key_get("/foo", "/foo"), "");
        assert_eq!(key_get("/foo", "/foo*"), "");
        assert_eq!(key_get("/foo/bar", "/foo/*"), "bar");
        assert_eq!(key_get("/foobar", "/foo*"), "bar");
        assert_eq!(key_get("/bar/foo", "/foo/*"), "");
    }

    #[test]
    fn test_key_match2() {
        assert!(key_match2("/foo", "/foo*"));
        assert!(key_match2("/foo/baz", "/foo/*"));
        assert!(key_match2("/foo/baz/foo", "/foo/*"));
        assert!(!key_match2("/foo/baz", "/:resource"));
        assert!(key_match2("/resource1", "/:resource"));
        assert!(!key_match2("/foo/bar", "/:resource"));
        assert!(key_match2("/alice/all", "/:id/all"));
        assert!(!key_match2("/alice", "/:id/all"));
        assert!(key_match2("/proxy/myid/res/res2/res3", "/proxy/:id/*"));
    }

    #[test]
    fn test_key_get2() {
        assert_eq!(key_get2("/resource1", "/:resource", "resource"), "resource1");
        assert_eq!(key_get2("/proxy/myid/res", "/proxy/:id/*", "id"), "myid");
        assert_eq!(key_get2("/alice/all", "/:id/all", "id"), "alice");
        assert_eq!(key_get2("/alice/all", "/:id/all", "missing"), "");
        assert_eq!(key_get2("/alice", "/:id/all", "id"), "");
    }

    #[test]
    fn test_key_match3() {
        assert!(key_match3("/foo/bar", "/foo/*"));
        assert!(key_match3("/foo/baz", "/foo/{id}"));
        assert!(!key_match3("/foo/baz/qux", "/foo/{id}"));
        assert!(key_match3("/parent/123/child/456", "/parent/{id}/child/{id}"));
        assert!(!key_match3("/myid/using/myresid", "/{id/using/{resId}"));
    }

    #[test]
    fn test_key_match4_requires_consistent_bindings() {
        assert!(key_match4("/parent/123/child/123", "/parent/{id}/child/{id}"));
        assert!(!key_match4("/parent/123/child/456", "/parent/{id}/child/{id}"));
        assert!(key_match4("/parent/123/child/456", "/parent/{id}/child/{another_id}"));
        assert!(!key_match4("/parent/123", "/parent/{id}/child/{id}"));
    }

    #[test]
    fn test_key_match5_ignores_query() {
        assert!(key_match5("/foo/bar?status=1&type=2", "/foo/bar"));
        assert!(key_match5("/parent/child1?status=1", "/parent/{id}"));
        assert!(!key_match5("/parent/child1/x?status=1", "/parent/{id}"));
    }

    #[test]
    fn test_regex_match() {
        assert!(regex_match("/topic/create", "/topic/create").unwrap());
        assert!(regex_match("/topic/create/123", "/topic/create").unwrap());
        assert!(!regex_match("/topic/delete", "/topic/create").unwrap());
        assert!(regex_match("/topic/edit/123s", "/topic/edit/[0-9]+").unwrap());
        assert!(regex_match("/foo", "(").is_err());
    }

    #[test]
    fn test_ip_match() {
        assert!(ip_match("192.168.2.123", "192.168.2.0/24").unwrap());
        assert!(!ip_match("192.168.2.123", "192.168.3.0/24").unwrap());
        assert!(ip_match("192.168.2.123", "192.168.2.123").unwrap());
        assert!(!ip_match("192.168.2.124", "192.168.2.123").unwrap());
        assert!(ip_match("10.0.0.11", "10.0.0.0/8").unwrap());
        assert!(ip_match("2001:db8::1", "2001:db8::/32").unwrap());
        assert!(ip_match("not-an-ip", "10.0.0.0/8").is_err());
        assert!(ip_match("10.0.0.1", "garbage").is_err());
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("/foo", "/foo").unwrap());
        assert!(glob_match("/foo", "/foo*").unwrap());
        assert!(!glob_match("/foo", "/foo/*").unwrap());
        assert!(glob_match("/foo/bar", "/foo/*").unwrap());
        assert!(!glob_match("/foo/bar/baz", "/foo/*").unwrap());
        assert!(glob_match("/prefix/subprefix/foo", "*/foo").is_ok_and(|m| !m));
        assert!(glob_match("/prefix/subprefix/foo", "/prefix/*/foo").unwrap());
    }

    #[test]
    fn test_builtin_dispatch() {
        let args = [Value::from("/foo/bar"), Value::from("/foo/*")];
        assert_eq!(Builtin::KeyMatch2.call(&args).unwrap(), Value::Bool(true));
        assert!(Builtin::KeyMatch2.call(&[Value::Int(1), Value::from("x")]).is_err());
        assert!(Builtin::KeyGet2.call(&args).is_err());
        assert_eq!(Builtin::from_name("globMatch"), Some(Builtin::GlobMatch));
        assert_eq!(Builtin::from_name("nope"), None);
    }

    proptest! {
        #[test]
        fn prop_key_match_without_wildcard_is_equality(a in "[a-z/]{0,12}", b in "[a-z/]{0,12}") {
            prop_assert_eq!(key_match(&a, &b), a == b);
        }

        #[test]
        fn prop_key_match_prefix_wildcard(prefix in "/[a-z]{1,6}", rest in "[a-z/]{0,8}") {
            let key = format!("{}{}", prefix, rest);
            let pattern = format!("{}*", prefix);
            prop_assert!(key_match(&key, &pattern));
        }
    }
}
