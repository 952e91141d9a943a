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

//! Tokenizer for matcher expressions

use crate::error::{AuthzError, AuthzResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Identifier(String),
    Str(String),
    Int(i64),
    Float(f64),
    True,
    False,
    In,
    Dot,
    Comma,
    LeftParen,
    RightParen,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    EOF,
}

/// A token together with its byte offset in the source text
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

fn syntax_error(offset: usize, message: impl Into<String>) -> AuthzError {
    AuthzError::MatcherSyntax { offset, message: message.into() }
}

pub fn tokenize(input: &str) -> AuthzResult<Vec<Spanned>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        let mut push = |token: Token| tokens.push(Spanned { token, offset });
        match ch {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '.' => {
                push(Token::Dot);
                chars.next();
            }
            ',' => {
                push(Token::Comma);
                chars.next();
            }
            '(' => {
                push(Token::LeftParen);
                chars.next();
            }
            ')' => {
                push(Token::RightParen);
                chars.next();
            }
            '+' => {
                push(Token::Plus);
                chars.next();
            }
            '-' => {
                push(Token::Minus);
                chars.next();
            }
            '*' => {
                push(Token::Asterisk);
                chars.next();
            }
            '/' => {
                push(Token::Slash);
                chars.next();
            }
            '%' => {
                push(Token::Percent);
                chars.next();
            }
            '=' | '!' | '<' | '>' | '&' | '|' => {
                chars.next();
                let followed_by = |c: char, chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>| {
                    if chars.peek().map(|&(_, next)| next) == Some(c) {
                        chars.next();
                        true
                    } else {
                        false
                    }
                };
                let token = match ch {
                    '=' if followed_by('=', &mut chars) => Token::Equal,
                    '=' => return Err(syntax_error(offset, "expected '==', found '='")),
                    '!' if followed_by('=', &mut chars) => Token::NotEqual,
                    '!' => Token::Not,
                    '<' if followed_by('=', &mut chars) => Token::LessEqual,
                    '<' => Token::Less,
                    '>' if followed_by('=', &mut chars) => Token::GreaterEqual,
                    '>' => Token::Greater,
                    '&' if followed_by('&', &mut chars) => Token::And,
                    '|' if followed_by('|', &mut chars) => Token::Or,
                    other => return Err(syntax_error(offset, format!("unexpected character '{}'", other))),
                };
                push(token);
            }
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    if c == '\\' {
                        match chars.next() {
                            Some((_, escaped)) => literal.push(escaped),
                            None => break,
                        }
                        continue;
                    }
                    literal.push(c);
                }
                if !closed {
                    return Err(syntax_error(offset, "unterminated string literal"));
                }
                push(Token::Str(literal));
            }
            '0'..='9' => {
                let mut number = String::new();
                let mut is_float = false;
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        number.push(c);
                        chars.next();
                    } else if c == '.' && !is_float {
                        is_float = true;
                        number.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = if is_float {
                    Token::Float(number.parse().map_err(|_| syntax_error(offset, format!("invalid number '{}'", number)))?)
                } else {
                    Token::Int(number.parse().map_err(|_| syntax_error(offset, format!("invalid number '{}'", number)))?)
                };
                push(token);
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut identifier = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        identifier.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match identifier.as_str() {
                    "true" => push(Token::True),
                    "false" => push(Token::False),
                    "in" => push(Token::In),
                    _ => push(Token::Identifier(identifier)),
                }
            }
            other => return Err(syntax_error(offset, format!("unexpected character '{}'", other))),
        }
    }

    tokens.push(Spanned { token: Token::EOF, offset: input.len() });
    Ok(tokens)
}
