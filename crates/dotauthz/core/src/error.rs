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

//! Error types for the authorization engine

use std::time::Duration;
use thiserror::Error;

/// Errors produced by model loading, matcher compilation and enforcement
#[derive(Error, Debug)]
pub enum AuthzError {
    #[error("Model definition error: {message}")]
    ModelDefinition { message: String },

    #[error("Arity mismatch for '{ptype}': expected {expected} values, got {actual}")]
    ArityMismatch { ptype: String, expected: usize, actual: usize },

    #[error("Matcher syntax error at offset {offset}: {message}")]
    MatcherSyntax { offset: usize, message: String },

    #[error("Undefined function: {name}")]
    UndefinedFunction { name: String },

    #[error("Evaluation error: {message}")]
    Evaluation { message: String },

    #[error("Lock timeout after {waited:?} while {operation}")]
    LockTimeout { operation: &'static str, waited: Duration },

    #[error("Policy type '{ptype}' not found in section '{section}'")]
    PolicyTypeNotFound { section: String, ptype: String },

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Watcher error: {message}")]
    Watcher { message: String },

    #[error("Batch enforcement cancelled")]
    Cancelled,

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl AuthzError {
    pub(crate) fn model(message: impl Into<String>) -> Self {
        AuthzError::ModelDefinition { message: message.into() }
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        AuthzError::Evaluation { message: message.into() }
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthzError::LockTimeout { .. })
    }
}

/// Errors reported by persistence adapters
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The adapter does not support this operation; the enforcer treats it as a no-op
    #[error("Operation not implemented by adapter: {0}")]
    NotImplemented(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Type alias for engine results
pub type AuthzResult<T> = Result<T, AuthzError>;

/// Type alias for adapter results
pub type AdapterResult<T> = Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_is_retryable() {
        let err = AuthzError::LockTimeout {
            operation: "enforce",
            waited: Duration::from_millis(10),
        };
        assert!(err.is_retryable());
        assert!(!AuthzError::Cancelled.is_retryable());
    }

    #[test]
    fn test_adapter_error_conversion() {
        let err: AuthzError = AdapterError::NotImplemented("add_policy").into();
        assert!(matches!(err, AuthzError::Adapter(AdapterError::NotImplemented("add_policy"))));
        assert_eq!(err.to_string(), "Adapter error: Operation not implemented by adapter: add_policy");
    }
}
