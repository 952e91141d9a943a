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

//! Precedence-climbing parser producing an unresolved expression tree

use super::lexer::{Spanned, Token, tokenize};
use crate::error::{AuthzError, AuthzResult};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::In => "in",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Expression tree before identifiers are resolved against a scope
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Bare identifier with no field access
    Identifier { name: String, offset: usize },
    /// `base.field[.attr...]`
    Field { base: String, path: Vec<String>, offset: usize },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Tuple(Vec<Expr>),
    Call { name: String, args: Vec<Expr>, offset: usize },
}

/// Parse a complete matcher expression
pub fn parse(input: &str) -> AuthzResult<Expr> {
    let tokens = tokenize(input)?;
    let mut current = 0;
    let expr = parse_expression(&tokens, &mut current)?;
    match tokens.get(current) {
        Some(Spanned { token: Token::EOF, .. }) => Ok(expr),
        Some(spanned) => Err(unexpected(spanned, "end of expression")),
        None => Ok(expr),
    }
}

fn unexpected(spanned: &Spanned, expected: &str) -> AuthzError {
    AuthzError::MatcherSyntax {
        offset: spanned.offset,
        message: format!("expected {}, found {:?}", expected, spanned.token),
    }
}

fn peek(tokens: &[Spanned], current: usize) -> &Token {
    tokens.get(current).map(|s| &s.token).unwrap_or(&Token::EOF)
}

fn expect(tokens: &[Spanned], current: &mut usize, token: Token, what: &str) -> AuthzResult<()> {
    match tokens.get(*current) {
        Some(spanned) if spanned.token == token => {
            *current += 1;
            Ok(())
        }
        Some(spanned) => Err(unexpected(spanned, what)),
        None => Err(AuthzError::MatcherSyntax { offset: 0, message: format!("expected {}", what) }),
    }
}

fn parse_expression(tokens: &[Spanned], current: &mut usize) -> AuthzResult<Expr> {
    parse_binary_op(tokens, current, 0)
}

fn parse_binary_op(tokens: &[Spanned], current: &mut usize, precedence: u8) -> AuthzResult<Expr> {
    let mut left = parse_unary(tokens, current)?;

    while let Some((op, op_prec)) = get_binary_op(peek(tokens, *current)) {
        if op_prec < precedence {
            break;
        }
        *current += 1;
        let right = parse_binary_op(tokens, current, op_prec + 1)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }

    Ok(left)
}

fn parse_unary(tokens: &[Spanned], current: &mut usize) -> AuthzResult<Expr> {
    let op = match peek(tokens, *current) {
        Token::Not => UnaryOp::Not,
        Token::Minus => UnaryOp::Neg,
        _ => return parse_primary(tokens, current),
    };
    *current += 1;
    let expr = parse_unary(tokens, current)?;
    Ok(Expr::Unary { op, expr: Box::new(expr) })
}

fn parse_primary(tokens: &[Spanned], current: &mut usize) -> AuthzResult<Expr> {
    let Some(spanned) = tokens.get(*current) else {
        return Err(AuthzError::MatcherSyntax { offset: 0, message: "unexpected end of expression".to_string() });
    };
    let offset = spanned.offset;

    match &spanned.token {
        Token::Int(i) => {
            *current += 1;
            Ok(Expr::Literal(Value::Int(*i)))
        }
        Token::Float(f) => {
            *current += 1;
            Ok(Expr::Literal(Value::Float(*f)))
        }
        Token::Str(s) => {
            *current += 1;
            Ok(Expr::Literal(Value::Str(s.clone())))
        }
        Token::True => {
            *current += 1;
            Ok(Expr::Literal(Value::Bool(true)))
        }
        Token::False => {
            *current += 1;
            Ok(Expr::Literal(Value::Bool(false)))
        }
        Token::Identifier(name) => {
            *current += 1;
            if let Token::LeftParen = peek(tokens, *current) {
                return parse_function_call(tokens, current, name.clone(), offset);
            }

            let mut path = Vec::new();
            while let Token::Dot = peek(tokens, *current) {
                *current += 1;
                match tokens.get(*current) {
                    Some(Spanned { token: Token::Identifier(field), .. }) => {
                        path.push(field.clone());
                        *current += 1;
                    }
                    Some(other) => return Err(unexpected(other, "field name after '.'")),
                    None => return Err(AuthzError::MatcherSyntax { offset, message: "expected field name after '.'".to_string() }),
                }
            }

            if path.is_empty() {
                Ok(Expr::Identifier { name: name.clone(), offset })
            } else {
                Ok(Expr::Field { base: name.clone(), path, offset })
            }
        }
        Token::LeftParen => {
            *current += 1;
            if let Token::RightParen = peek(tokens, *current) {
                *current += 1;
                return Ok(Expr::Tuple(Vec::new()));
            }

            let first = parse_expression(tokens, current)?;
            if let Token::Comma = peek(tokens, *current) {
                let mut items = vec![first];
                while let Token::Comma = peek(tokens, *current) {
                    *current += 1;
                    items.push(parse_expression(tokens, current)?);
                }
                expect(tokens, current, Token::RightParen, "')' to close tuple")?;
                return Ok(Expr::Tuple(items));
            }

            expect(tokens, current, Token::RightParen, "')'")?;
            Ok(first)
        }
        _ => Err(unexpected(spanned, "expression")),
    }
}

fn parse_function_call(tokens: &[Spanned], current: &mut usize, name: String, offset: usize) -> AuthzResult<Expr> {
    *current += 1;
    let mut args = Vec::new();

    if let Token::RightParen = peek(tokens, *current) {
        *current += 1;
        return Ok(Expr::Call { name, args, offset });
    }

    loop {
        args.push(parse_expression(tokens, current)?);
        match peek(tokens, *current) {
            Token::Comma => *current += 1,
            Token::RightParen => {
                *current += 1;
                break;
            }
            _ => return Err(unexpected(&tokens[(*current).min(tokens.len() - 1)], "',' or ')' in argument list")),
        }
    }

    Ok(Expr::Call { name, args, offset })
}

fn get_binary_op(token: &Token) -> Option<(BinaryOp, u8)> {
    let op = match token {
        Token::Or => (BinaryOp::Or, 1),
        Token::And => (BinaryOp::And, 2),
        Token::Equal => (BinaryOp::Equal, 3),
        Token::NotEqual => (BinaryOp::NotEqual, 3),
        Token::Less => (BinaryOp::Less, 3),
        Token::LessEqual => (BinaryOp::LessEqual, 3),
        Token::Greater => (BinaryOp::Greater, 3),
        Token::GreaterEqual => (BinaryOp::GreaterEqual, 3),
        Token::In => (BinaryOp::In, 3),
        Token::Plus => (BinaryOp::Add, 4),
        Token::Minus => (BinaryOp::Sub, 4),
        Token::Asterisk => (BinaryOp::Mul, 5),
        Token::Slash => (BinaryOp::Div, 5),
        Token::Percent => (BinaryOp::Rem, 5),
        _ => return None,
    };
    Some(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(base: &str, path: &[&str], offset: usize) -> Expr {
        Expr::Field {
            base: base.to_string(),
            path: path.iter().map(|s| s.to_string()).collect(),
            offset,
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a.x || b.y && c.z").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Or, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::And, .. }));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_comparison_binds_tighter_than_and() {
        let expr = parse("r.sub == p.sub && r.obj == p.obj").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::And, left, right } => {
                assert_eq!(
                    *left,
                    Expr::Binary {
                        op: BinaryOp::Equal,
                        left: Box::new(field("r", &["sub"], 0)),
                        right: Box::new(field("p", &["sub"], 9)),
                    }
                );
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Equal, .. }));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_arithmetic_is_left_associative() {
        let expr = parse("10 - 4 - 3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Sub, left, right } => {
                assert!(matches!(*left, Expr::Binary { op: BinaryOp::Sub, .. }));
                assert_eq!(*right, Expr::Literal(Value::Int(3)));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_calls_tuples_and_nested_fields() {
        let expr = parse("g(r.sub, p.sub, r.dom) && r.obj in ('a', 'b') && r.sub.Age >= 18").unwrap();
        let Expr::Binary { left, right, .. } = expr else { panic!("expected binary") };
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::GreaterEqual, .. }));
        let Expr::Binary { left: call, right: membership, .. } = *left else { panic!("expected binary") };
        assert!(matches!(*call, Expr::Call { ref name, ref args, .. } if name == "g" && args.len() == 3));
        match *membership {
            Expr::Binary { op: BinaryOp::In, right, .. } => {
                assert_eq!(*right, Expr::Tuple(vec![Expr::Literal(Value::Str("a".into())), Expr::Literal(Value::Str("b".into()))]));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(
            parse("!true").unwrap(),
            Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(Expr::Literal(Value::Bool(true)))
            }
        );
        assert!(matches!(parse("-r.n > 1").unwrap(), Expr::Binary { op: BinaryOp::Greater, .. }));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse("r.sub ==").unwrap_err(), AuthzError::MatcherSyntax { .. }));
        assert!(matches!(parse("(r.sub == p.sub").unwrap_err(), AuthzError::MatcherSyntax { .. }));
        assert!(matches!(parse("r.sub p.sub").unwrap_err(), AuthzError::MatcherSyntax { .. }));
        assert!(matches!(parse("keyMatch(r.obj p.obj)").unwrap_err(), AuthzError::MatcherSyntax { .. }));
        assert!(matches!(parse("r.").unwrap_err(), AuthzError::MatcherSyntax { .. }));
    }
}
