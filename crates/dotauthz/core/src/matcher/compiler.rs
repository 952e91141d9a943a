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

//! Resolution of parsed matchers against a scope, and their evaluation
//!
//! Compilation turns every `r.field` / `p.field` reference into a fixed tuple
//! index and every call into a direct reference to its function, so that
//! evaluating a row does no name lookups at all. Unknown fields and
//! functions are rejected here rather than at evaluation time.

use super::functions::{Builtin, CustomFunction, Function, FunctionMap};
use super::parser::{BinaryOp, Expr, UnaryOp, parse};
use crate::error::{AuthzError, AuthzResult};
use crate::memo::BoundedMemo;
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Upper bound on distinct `eval()` rules kept compiled per matcher
const EVAL_RULE_MEMO_CAPACITY: usize = 1024;

/// Role-membership oracle consulted by `g(...)` calls
pub trait RoleLookup {
    fn has_link(&self, ptype: &str, name1: &str, name2: &str, domain: Option<&str>) -> bool;
}

/// Names visible to a matcher
#[derive(Debug, Clone)]
pub struct CompileScope {
    pub request_token: String,
    pub request_fields: HashMap<String, usize>,
    pub policy_token: String,
    pub policy_fields: HashMap<String, usize>,
    /// Role types (`g`, `g2`, ...) and their declared field count
    pub role_types: HashMap<String, usize>,
    pub functions: FunctionMap,
}

impl CompileScope {
    pub fn new(request_token: &str, request_fields: &[String], policy_token: &str, policy_fields: &[String]) -> Self {
        let index = |fields: &[String]| fields.iter().enumerate().map(|(i, f)| (f.clone(), i)).collect();
        Self {
            request_token: request_token.to_string(),
            request_fields: index(request_fields),
            policy_token: policy_token.to_string(),
            policy_fields: index(policy_fields),
            role_types: HashMap::new(),
            functions: FunctionMap::new(),
        }
    }

    pub fn with_role_type(mut self, ptype: &str, field_count: usize) -> Self {
        self.role_types.insert(ptype.to_string(), field_count);
        self
    }

    pub fn with_functions(mut self, functions: FunctionMap) -> Self {
        self.functions = functions;
        self
    }
}

#[derive(Clone)]
enum Callee {
    Builtin(Builtin),
    Custom(String, CustomFunction),
    Role(String),
    Eval,
}

#[derive(Clone)]
enum Node {
    Literal(Value),
    Request { index: usize, path: Vec<String> },
    Policy { index: usize, path: Vec<String> },
    Unary { op: UnaryOp, expr: Box<Node> },
    Binary { op: BinaryOp, left: Box<Node>, right: Box<Node> },
    Tuple(Vec<Node>),
    Call { callee: Callee, args: Vec<Node> },
}

/// A matcher expression resolved against one scope, reusable across rows and calls
pub struct CompiledMatcher {
    text: String,
    root: Node,
    scope: Arc<CompileScope>,
    uses_policy: bool,
    /// Rules compiled on demand by `eval(...)`, keyed by rule text
    eval_cache: BoundedMemo<String, Arc<Node>>,
}

impl fmt::Debug for CompiledMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMatcher").field("text", &self.text).field("uses_policy", &self.uses_policy).finish()
    }
}

/// Per-evaluation bindings
struct Env<'a> {
    request: &'a [Value],
    policy: &'a [String],
    roles: &'a dyn RoleLookup,
}

impl CompiledMatcher {
    pub fn compile(text: &str, scope: Arc<CompileScope>) -> AuthzResult<Self> {
        let expr = parse(text)?;
        let mut uses_policy = false;
        let root = resolve(&expr, &scope, &mut uses_policy, false)?;
        Ok(Self {
            text: text.to_string(),
            root,
            scope,
            uses_policy,
            eval_cache: BoundedMemo::new(EVAL_RULE_MEMO_CAPACITY),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the expression reads any policy field (or may via `eval`)
    pub fn uses_policy(&self) -> bool {
        self.uses_policy
    }

    /// Evaluate against one request and one policy row
    pub fn evaluate(&self, request: &[Value], policy: &[String], roles: &dyn RoleLookup) -> AuthzResult<bool> {
        let env = Env { request, policy, roles };
        match self.eval_node(&self.root, &env)? {
            Value::Bool(b) => Ok(b),
            other => Err(AuthzError::eval(format!("matcher '{}' produced a {}, expected bool", self.text, other.type_name()))),
        }
    }

    fn eval_node(&self, node: &Node, env: &Env<'_>) -> AuthzResult<Value> {
        match node {
            Node::Literal(value) => Ok(value.clone()),
            Node::Request { index, path } => {
                let value = env
                    .request
                    .get(*index)
                    .ok_or_else(|| AuthzError::eval(format!("request has no value at position {}", index)))?;
                follow_path(value, path).cloned()
            }
            Node::Policy { index, path } => {
                let raw = env
                    .policy
                    .get(*index)
                    .ok_or_else(|| AuthzError::eval(format!("policy row has no value at position {}", index)))?;
                let value = Value::Str(raw.clone());
                follow_path(&value, path).cloned()
            }
            Node::Unary { op, expr } => {
                let value = self.eval_node(expr, env)?;
                match (op, &value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(i.checked_neg().ok_or_else(|| AuthzError::eval("integer overflow"))?)),
                    (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Not, other) => Err(AuthzError::eval(format!("'!' expects bool, got {}", other.type_name()))),
                    (UnaryOp::Neg, other) => Err(AuthzError::eval(format!("'-' expects a number, got {}", other.type_name()))),
                }
            }
            Node::Binary { op: BinaryOp::And, left, right } => {
                if !expect_bool(self.eval_node(left, env)?, "&&")? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(expect_bool(self.eval_node(right, env)?, "&&")?))
            }
            Node::Binary { op: BinaryOp::Or, left, right } => {
                if expect_bool(self.eval_node(left, env)?, "||")? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(expect_bool(self.eval_node(right, env)?, "||")?))
            }
            Node::Binary { op, left, right } => {
                let left = self.eval_node(left, env)?;
                let right = self.eval_node(right, env)?;
                binary(*op, &left, &right)
            }
            Node::Tuple(items) => Ok(Value::List(items.iter().map(|item| self.eval_node(item, env)).collect::<AuthzResult<Vec<_>>>()?)),
            Node::Call { callee, args } => {
                let args = args.iter().map(|arg| self.eval_node(arg, env)).collect::<AuthzResult<Vec<_>>>()?;
                match callee {
                    Callee::Builtin(builtin) => builtin.call(&args),
                    Callee::Custom(_, f) => f(&args),
                    Callee::Role(ptype) => {
                        let names: Vec<String> = args.iter().map(Value::to_plain_string).collect();
                        let domain = names.get(2).map(String::as_str);
                        Ok(Value::Bool(env.roles.has_link(ptype, &names[0], &names[1], domain)))
                    }
                    Callee::Eval => {
                        let rule = args[0]
                            .as_str()
                            .ok_or_else(|| AuthzError::eval(format!("eval() expects a string rule, got {}", args[0].type_name())))?;
                        let node = self.eval_rule(rule)?;
                        self.eval_node(&node, env)
                    }
                }
            }
        }
    }

    fn eval_rule(&self, rule: &str) -> AuthzResult<Arc<Node>> {
        if let Some(node) = self.eval_cache.get(rule) {
            return Ok(node);
        }
        let expr = parse(rule)?;
        let mut uses_policy = false;
        let node = Arc::new(resolve(&expr, &self.scope, &mut uses_policy, true)?);
        self.eval_cache.insert(rule.to_string(), Arc::clone(&node));
        Ok(node)
    }
}

fn follow_path<'v>(mut value: &'v Value, path: &[String]) -> AuthzResult<&'v Value> {
    for attribute in path {
        value = value.attribute(attribute)?;
    }
    Ok(value)
}

fn expect_bool(value: Value, op: &str) -> AuthzResult<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(AuthzError::eval(format!("'{}' expects bool operands, got {}", op, other.type_name()))),
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> AuthzResult<Value> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        (a, b) => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| AuthzError::eval("cannot compare NaN"))?,
            _ => {
                return Err(AuthzError::eval(format!("'{}' cannot compare {} with {}", op.symbol(), a.type_name(), b.type_name())));
            }
        },
    };
    let result = match op {
        BinaryOp::Less => ordering == Ordering::Less,
        BinaryOp::LessEqual => ordering != Ordering::Greater,
        BinaryOp::Greater => ordering == Ordering::Greater,
        BinaryOp::GreaterEqual => ordering != Ordering::Less,
        _ => unreachable!("compare called with non-comparison operator"),
    };
    Ok(Value::Bool(result))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> AuthzResult<Value> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let overflow = || AuthzError::eval(format!("integer overflow in '{}'", op.symbol()));
        return match op {
            BinaryOp::Add => a.checked_add(*b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Sub => a.checked_sub(*b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Mul => a.checked_mul(*b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Div if *b == 0 => Err(AuthzError::eval("division by zero")),
            BinaryOp::Div => Ok(Value::Float(*a as f64 / *b as f64)),
            BinaryOp::Rem if *b == 0 => Err(AuthzError::eval("division by zero")),
            BinaryOp::Rem => a.checked_rem(*b).map(Value::Int).ok_or_else(overflow),
            _ => unreachable!("arithmetic called with non-arithmetic operator"),
        };
    }

    if op == BinaryOp::Add && (matches!(left, Value::Str(_)) || matches!(right, Value::Str(_))) {
        return Ok(Value::Str(left.to_plain_string() + &right.to_plain_string()));
    }

    let (Some(a), Some(b)) = (numeric_operand(left), numeric_operand(right)) else {
        return Err(AuthzError::eval(format!("'{}' cannot combine {} and {}", op.symbol(), left.type_name(), right.type_name())));
    };
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b == 0.0 => return Err(AuthzError::eval("division by zero")),
        BinaryOp::Div => a / b,
        BinaryOp::Rem if b == 0.0 => return Err(AuthzError::eval("division by zero")),
        BinaryOp::Rem => a % b,
        _ => unreachable!("arithmetic called with non-arithmetic operator"),
    };
    Ok(Value::Float(value))
}

fn numeric_operand(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> AuthzResult<Value> {
    match op {
        BinaryOp::Equal => Ok(Value::Bool(left.loose_eq(right))),
        BinaryOp::NotEqual => Ok(Value::Bool(!left.loose_eq(right))),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => compare(op, left, right),
        BinaryOp::In => match right {
            Value::List(items) => Ok(Value::Bool(items.iter().any(|item| left.loose_eq(item)))),
            Value::Map(map) => Ok(Value::Bool(map.contains_key(&left.to_plain_string()))),
            other => Err(AuthzError::eval(format!("'in' expects a tuple or map on the right, got {}", other.type_name()))),
        },
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => arithmetic(op, left, right),
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators are evaluated with short-circuiting"),
    }
}

/// `nested` is set while resolving a rule loaded by `eval()`, which may not call `eval()` again
fn resolve(expr: &Expr, scope: &CompileScope, uses_policy: &mut bool, nested: bool) -> AuthzResult<Node> {
    let node = match expr {
        Expr::Literal(value) => Node::Literal(value.clone()),
        Expr::Identifier { name, .. } => {
            return Err(AuthzError::model(format!("undeclared identifier '{}' in matcher", name)));
        }
        Expr::Field { base, path, .. } => {
            let (fields, is_policy) = if *base == scope.request_token {
                (&scope.request_fields, false)
            } else if *base == scope.policy_token {
                (&scope.policy_fields, true)
            } else {
                return Err(AuthzError::model(format!(
                    "matcher references '{}', but only '{}' and '{}' are in scope",
                    base, scope.request_token, scope.policy_token
                )));
            };
            let field = &path[0];
            let index = *fields
                .get(field)
                .ok_or_else(|| AuthzError::model(format!("matcher references undeclared field '{}.{}'", base, field)))?;
            let path = path[1..].to_vec();
            if is_policy {
                *uses_policy = true;
                Node::Policy { index, path }
            } else {
                Node::Request { index, path }
            }
        }
        Expr::Unary { op, expr } => Node::Unary {
            op: *op,
            expr: Box::new(resolve(expr, scope, uses_policy, nested)?),
        },
        Expr::Binary { op, left, right } => Node::Binary {
            op: *op,
            left: Box::new(resolve(left, scope, uses_policy, nested)?),
            right: Box::new(resolve(right, scope, uses_policy, nested)?),
        },
        Expr::Tuple(items) => Node::Tuple(items.iter().map(|item| resolve(item, scope, uses_policy, nested)).collect::<AuthzResult<Vec<_>>>()?),
        Expr::Call { name, args, .. } => {
            let resolved = args.iter().map(|arg| resolve(arg, scope, uses_policy, nested)).collect::<AuthzResult<Vec<_>>>()?;
            let callee = resolve_callee(name, resolved.len(), scope, nested)?;
            if let Callee::Eval = callee {
                *uses_policy = true;
            }
            Node::Call { callee, args: resolved }
        }
    };
    Ok(node)
}

fn resolve_callee(name: &str, argc: usize, scope: &CompileScope, nested: bool) -> AuthzResult<Callee> {
    let arity_error = |expected: &str| AuthzError::model(format!("function '{}' expects {} arguments, got {}", name, expected, argc));

    if let Some(&field_count) = scope.role_types.get(name) {
        // subject, role and an optional domain; later grouping fields are not part of the edge
        let max_args = field_count.clamp(2, 3);
        if argc < 2 || argc > max_args {
            return Err(arity_error(&format!("2 to {}", max_args)));
        }
        return Ok(Callee::Role(name.to_string()));
    }

    if name == "eval" {
        if nested {
            return Err(AuthzError::eval("a rule evaluated by eval() cannot call eval() itself"));
        }
        if argc != 1 {
            return Err(arity_error("1"));
        }
        return Ok(Callee::Eval);
    }

    match scope.functions.get(name) {
        Some(Function::Builtin(builtin)) => {
            if argc != builtin.arity() {
                return Err(arity_error(&builtin.arity().to_string()));
            }
            Ok(Callee::Builtin(*builtin))
        }
        Some(Function::Custom(f)) => Ok(Callee::Custom(name.to_string(), Arc::clone(f))),
        None => Err(AuthzError::UndefinedFunction { name: name.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashSet};

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn scope() -> Arc<CompileScope> {
        Arc::new(CompileScope::new("r", &fields(&["sub", "obj", "act"]), "p", &fields(&["sub", "obj", "act"])).with_role_type("g", 2))
    }

    fn row(values: &[&str]) -> Vec<String> {
        fields(values)
    }

    fn request(values: &[&str]) -> Vec<Value> {
        values.iter().map(|s| Value::from(*s)).collect()
    }

    /// Every `g(a, b)` is `a == b`
    struct NoRoles;

    impl RoleLookup for NoRoles {
        fn has_link(&self, _ptype: &str, name1: &str, name2: &str, _domain: Option<&str>) -> bool {
            name1 == name2
        }
    }

    struct Links(HashSet<(String, String)>);

    impl RoleLookup for Links {
        fn has_link(&self, _ptype: &str, name1: &str, name2: &str, _domain: Option<&str>) -> bool {
            name1 == name2 || self.0.contains(&(name1.to_string(), name2.to_string()))
        }
    }

    #[test]
    fn test_basic_acl_matcher() {
        let m = CompiledMatcher::compile("r.sub == p.sub && r.obj == p.obj && r.act == p.act", scope()).unwrap();
        let policy = row(&["alice", "data1", "read"]);
        assert!(m.evaluate(&request(&["alice", "data1", "read"]), &policy, &NoRoles).unwrap());
        assert!(!m.evaluate(&request(&["alice", "data1", "write"]), &policy, &NoRoles).unwrap());
        assert!(m.uses_policy());
    }

    #[test]
    fn test_role_call_consults_lookup() {
        let m = CompiledMatcher::compile("g(r.sub, p.sub) && r.obj == p.obj", scope()).unwrap();
        let links = Links(HashSet::from([("alice".to_string(), "admin".to_string())]));
        let policy = row(&["admin", "data1", "read"]);
        assert!(m.evaluate(&request(&["alice", "data1", "read"]), &policy, &links).unwrap());
        assert!(!m.evaluate(&request(&["bob", "data1", "read"]), &policy, &links).unwrap());
    }

    #[test]
    fn test_builtins_and_tuples() {
        let m = CompiledMatcher::compile("keyMatch2(r.obj, p.obj) && r.act in ('GET', 'POST')", scope()).unwrap();
        let policy = row(&["*", "/users/:id", "*"]);
        assert!(m.evaluate(&request(&["a", "/users/42", "GET"]), &policy, &NoRoles).unwrap());
        assert!(!m.evaluate(&request(&["a", "/users/42", "DELETE"]), &policy, &NoRoles).unwrap());
    }

    #[test]
    fn test_abac_attribute_access() {
        let m = CompiledMatcher::compile("r.sub.Age > 18 && r.sub.Name == 'alice'", scope()).unwrap();
        let mut sub = BTreeMap::new();
        sub.insert("Age".to_string(), Value::Int(30));
        sub.insert("Name".to_string(), Value::from("alice"));
        let req = vec![Value::Map(sub), Value::from("data1"), Value::from("read")];
        assert!(m.evaluate(&req, &[], &NoRoles).unwrap());
        assert!(!m.uses_policy());

        let missing = vec![Value::from("alice"), Value::from("data1"), Value::from("read")];
        assert!(matches!(m.evaluate(&missing, &[], &NoRoles), Err(AuthzError::Evaluation { .. })));
    }

    #[test]
    fn test_eval_compiles_rules_from_policy() {
        let s = Arc::new(CompileScope::new("r", &fields(&["sub", "obj", "act"]), "p", &fields(&["sub_rule", "obj", "act"])));
        let m = CompiledMatcher::compile("eval(p.sub_rule) && r.obj == p.obj", s).unwrap();
        let mut sub = BTreeMap::new();
        sub.insert("Age".to_string(), Value::Int(20));
        let req = vec![Value::Map(sub), Value::from("/data1"), Value::from("read")];
        assert!(m.evaluate(&req, &row(&["r.sub.Age > 18", "/data1", "read"]), &NoRoles).unwrap());
        assert!(!m.evaluate(&req, &row(&["r.sub.Age < 18", "/data1", "read"]), &NoRoles).unwrap());
        assert_eq!(m.eval_cache.len(), 2);
    }

    #[test]
    fn test_eval_rules_cannot_nest_eval() {
        let s = Arc::new(CompileScope::new("r", &fields(&["sub", "obj", "act"]), "p", &fields(&["sub_rule", "obj", "act"])));
        let m = CompiledMatcher::compile("eval(p.sub_rule)", s).unwrap();
        let req = request(&["alice", "/data1", "read"]);

        let self_referential = row(&["eval(p.sub_rule)", "/data1", "read"]);
        assert!(matches!(m.evaluate(&req, &self_referential, &NoRoles), Err(AuthzError::Evaluation { .. })));
        let nested = row(&["r.sub == 'alice' && eval('true')", "/data1", "read"]);
        assert!(matches!(m.evaluate(&req, &nested, &NoRoles), Err(AuthzError::Evaluation { .. })));
        assert_eq!(m.eval_cache.len(), 0);
    }

    #[test]
    fn test_eval_rule_memo_is_bounded() {
        let s = Arc::new(CompileScope::new("r", &fields(&["sub", "obj", "act"]), "p", &fields(&["sub_rule", "obj", "act"])));
        let m = CompiledMatcher::compile("eval(p.sub_rule)", s).unwrap();
        let req = request(&["alice", "/data1", "read"]);
        for i in 0..(EVAL_RULE_MEMO_CAPACITY + 100) {
            let rule = format!("r.obj != '/other{}'", i);
            assert!(m.evaluate(&req, &row(&[rule.as_str(), "/data1", "read"]), &NoRoles).unwrap());
        }
        assert!(m.eval_cache.len() <= EVAL_RULE_MEMO_CAPACITY);
    }

    #[test]
    fn test_row_independence_is_detected() {
        assert!(!CompiledMatcher::compile("r.sub == 'root' && g(r.sub, 'admin')", scope()).unwrap().uses_policy());
        assert!(CompiledMatcher::compile("r.sub == p.sub", scope()).unwrap().uses_policy());
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        let m = CompiledMatcher::compile("false && r.sub.Missing == 1", scope()).unwrap();
        assert!(!m.evaluate(&request(&["a", "b", "c"]), &[], &NoRoles).unwrap());
        let m = CompiledMatcher::compile("true || r.sub.Missing == 1", scope()).unwrap();
        assert!(m.evaluate(&request(&["a", "b", "c"]), &[], &NoRoles).unwrap());
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        let m = CompiledMatcher::compile("(2 + 3) * 4 == 20 && 7 % 4 == 3 && 1 / 2 == 0.5 && -2 < 1 && 'a' + 'b' == 'ab'", scope()).unwrap();
        assert!(m.evaluate(&request(&["a", "b", "c"]), &[], &NoRoles).unwrap());
        let m = CompiledMatcher::compile("1 / 0 == 1", scope()).unwrap();
        assert!(m.evaluate(&request(&["a", "b", "c"]), &[], &NoRoles).is_err());
    }

    #[test]
    fn test_compile_errors() {
        assert!(matches!(CompiledMatcher::compile("r.nope == p.sub", scope()).unwrap_err(), AuthzError::ModelDefinition { .. }));
        assert!(matches!(CompiledMatcher::compile("r2.sub == p.sub", scope()).unwrap_err(), AuthzError::ModelDefinition { .. }));
        assert!(matches!(CompiledMatcher::compile("sub == p.sub", scope()).unwrap_err(), AuthzError::ModelDefinition { .. }));
        assert!(matches!(CompiledMatcher::compile("nope(r.sub)", scope()).unwrap_err(), AuthzError::UndefinedFunction { .. }));
        assert!(matches!(CompiledMatcher::compile("g2(r.sub, p.sub)", scope()).unwrap_err(), AuthzError::UndefinedFunction { .. }));
        assert!(matches!(CompiledMatcher::compile("keyMatch(r.obj)", scope()).unwrap_err(), AuthzError::ModelDefinition { .. }));
        assert!(matches!(CompiledMatcher::compile("g(r.sub)", scope()).unwrap_err(), AuthzError::ModelDefinition { .. }));
    }

    #[test]
    fn test_non_boolean_result_is_an_error() {
        let m = CompiledMatcher::compile("r.sub", scope()).unwrap();
        assert!(matches!(m.evaluate(&request(&["a", "b", "c"]), &[], &NoRoles), Err(AuthzError::Evaluation { .. })));
    }

    #[test]
    fn test_custom_function() {
        let mut functions = FunctionMap::new();
        functions.add("startsWith", Arc::new(|args: &[Value]| -> AuthzResult<Value> { Ok(Value::Bool(args[0].to_plain_string().starts_with(&args[1].to_plain_string()))) }));
        let s = CompileScope::new("r", &fields(&["sub", "obj", "act"]), "p", &fields(&["sub", "obj", "act"])).with_functions(functions);
        let m = CompiledMatcher::compile("startsWith(r.obj, p.obj)", Arc::new(s)).unwrap();
        assert!(m.evaluate(&request(&["a", "/data/1", "c"]), &row(&["a", "/data", "c"]), &NoRoles).unwrap());
    }
}
