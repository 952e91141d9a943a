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

//! Request values and matcher operands
//!
//! Request tuples are ordered lists of [`Value`]s. Plain strings cover the
//! classic `sub, obj, act` shape, while maps allow attribute access such as
//! `r.sub.Age` from inside a matcher.

use crate::error::{AuthzError, AuthzResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A dynamically typed value flowing through matcher evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Convert any serializable structure into a value (structs become maps)
    pub fn from_serialize<T: Serialize>(value: &T) -> AuthzResult<Self> {
        let json = serde_json::to_value(value).map_err(|e| AuthzError::InvalidArgument { message: e.to_string() })?;
        Ok(Self::from(json))
    }

    /// Name of the runtime type, used in evaluation errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of the value; strings holding a number are coerced
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Look up a named attribute of a map value
    pub fn attribute(&self, name: &str) -> AuthzResult<&Value> {
        match self {
            Value::Map(map) => map.get(name).ok_or_else(|| AuthzError::eval(format!("attribute '{}' not found", name))),
            other => Err(AuthzError::eval(format!("cannot access attribute '{}' on a {}", name, other.type_name()))),
        }
    }

    /// Loose equality used by `==`, `!=` and `in`
    ///
    /// Numbers compare numerically across int/float, and a string equals a
    /// number when it parses to the same numeric value.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y)),
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) if a.is_numeric() || b.is_numeric() => x == y,
                _ => false,
            },
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Render the value as a plain string (used for role-check arguments)
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Feed a canonical, type-tagged encoding of this value into a hasher
    pub(crate) fn hash_into(&self, hasher: &mut blake3::Hasher) {
        match self {
            Value::Bool(b) => {
                hasher.update(&[0, *b as u8]);
            }
            Value::Int(i) => {
                hasher.update(&[1]);
                hasher.update(&i.to_le_bytes());
            }
            Value::Float(f) => {
                hasher.update(&[2]);
                hasher.update(&f.to_bits().to_le_bytes());
            }
            Value::Str(s) => {
                hasher.update(&[3]);
                hasher.update(&(s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
            Value::List(items) => {
                hasher.update(&[4]);
                hasher.update(&(items.len() as u64).to_le_bytes());
                for item in items {
                    item.hash_into(hasher);
                }
            }
            Value::Map(map) => {
                hasher.update(&[5]);
                hasher.update(&(map.len() as u64).to_le_bytes());
                for (key, value) in map {
                    hasher.update(&(key.len() as u64).to_le_bytes());
                    hasher.update(key.as_bytes());
                    value.hash_into(hasher);
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Value::Map(map) => write!(f, "{}", serde_json::to_string(map).unwrap_or_default()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Str(String::new()),
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

/// Anything that can be turned into an ordered request tuple
///
/// One generic conversion covers every arity, so callers can write
/// `enforcer.enforce(["alice", "data1", "read"])` or pass a `Vec<Value>`.
pub trait IntoRequest {
    fn into_request(self) -> Vec<Value>;
}

impl<T: Into<Value>> IntoRequest for Vec<T> {
    fn into_request(self) -> Vec<Value> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Value>, const N: usize> IntoRequest for [T; N] {
    fn into_request(self) -> Vec<Value> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Value> + Clone> IntoRequest for &[T] {
    fn into_request(self) -> Vec<Value> {
        self.iter().cloned().map(Into::into).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Subject {
        name: String,
        age: i64,
    }

    #[test]
    fn test_from_serialize_builds_map() {
        let value = Value::from_serialize(&Subject { name: "alice".to_string(), age: 30 }).unwrap();
        assert_eq!(value.attribute("name").unwrap(), &Value::Str("alice".to_string()));
        assert_eq!(value.attribute("age").unwrap(), &Value::Int(30));
        assert!(value.attribute("missing").is_err());
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Int(18).loose_eq(&Value::Float(18.0)));
        assert!(Value::Str("18".to_string()).loose_eq(&Value::Int(18)));
        assert!(!Value::Str("abc".to_string()).loose_eq(&Value::Int(18)));
        assert!(!Value::Str("1".to_string()).loose_eq(&Value::Str("1.0".to_string())));
    }

    #[test]
    fn test_into_request_arities() {
        assert_eq!(["alice", "data1", "read"].into_request().len(), 3);
        assert_eq!(vec![Value::Int(1)].into_request(), vec![Value::Int(1)]);
        let owned = vec!["a".to_string(), "b".to_string()];
        assert_eq!(owned.as_slice().into_request(), vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_hash_distinguishes_types() {
        let digest = |v: &Value| {
            let mut hasher = blake3::Hasher::new();
            v.hash_into(&mut hasher);
            hasher.finalize()
        };
        assert_ne!(digest(&Value::Int(1)), digest(&Value::Str("1".to_string())));
        assert_eq!(digest(&Value::from("x")), digest(&Value::from("x")));
    }
}
