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

//! Matcher expression language
//!
//! A matcher is a boolean expression over request fields (`r.sub`), policy
//! fields (`p.obj`), role checks (`g(r.sub, p.sub)`) and named functions.
//! Text goes through [`lexer`] and [`parser`] into an expression tree which
//! [`CompiledMatcher::compile`] resolves against a [`CompileScope`].

pub mod compiler;
pub mod functions;
pub mod lexer;
pub mod parser;

pub use compiler::{CompileScope, CompiledMatcher, RoleLookup};
pub use functions::{Builtin, CustomFunction, FunctionMap, glob_match, ip_match, key_get, key_get2, key_match, key_match2, key_match3, key_match4, key_match5, regex_match};
