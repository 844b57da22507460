//! Tokens to values.
//!
//! Lists become right-nested pair chains (`(a b . c)` is dotted), `'x` becomes
//! `(quote x)`, and every other atom is classified by trying the literal
//! parsers in a fixed order before falling back to a reference.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::{digit1, one_of},
    combinator::{all_consuming, opt, recognize, value},
    number::complete::recognize_float,
    sequence::pair,
};

use crate::{MAX_PARSE_DEPTH, STACK_GROW_SIZE, STACK_RED_ZONE};
use crate::ast::{Reference, Value};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::{ErrorKind, LispError, Location};
use num::BigInt;

/// Tokenize and parse `source`, returning its top-level forms in order
pub fn read(source: &str, filename: &str) -> Result<Vec<Value>, LispError> {
    parse(&tokenize(source, filename)?)
}

/// Parse a token stream into top-level forms
pub fn parse(tokens: &[Token]) -> Result<Vec<Value>, LispError> {
    let mut reader = FormReader { tokens, pos: 0 };
    let mut forms = Vec::new();
    while reader.peek().is_some() {
        forms.push(reader.parse_form(0)?);
    }
    Ok(forms)
}

//
// Literal parsers, tried in order; the first that accepts the whole atom wins
//

type LiteralParser = fn(&str) -> Option<Value>;

const LITERAL_PARSERS: &[LiteralParser] = &[parse_bool, parse_int, parse_bigint, parse_float];

/// Optional sign followed by decimal digits
fn integer_text(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(one_of("+-")), digit1)).parse(input)
}

fn parse_bool(atom: &str) -> Option<Value> {
    let result: IResult<&str, bool> =
        all_consuming(alt((value(true, tag("#t")), value(false, tag("#f"))))).parse(atom);
    let (_, b) = result.ok()?;
    Some(Value::Bool(b))
}

fn parse_int(atom: &str) -> Option<Value> {
    let (_, text) = all_consuming(integer_text).parse(atom).ok()?;
    text.parse::<i64>().ok().map(Value::Int)
}

/// Integers too large for a machine word
fn parse_bigint(atom: &str) -> Option<Value> {
    let (_, text) = all_consuming(integer_text).parse(atom).ok()?;
    text.parse::<BigInt>().ok().map(Value::Bigint)
}

fn parse_float(atom: &str) -> Option<Value> {
    let (_, text) = all_consuming(recognize_float::<&str, nom::error::Error<&str>>)
        .parse(atom)
        .ok()?;
    text.parse::<f64>().ok().map(Value::Float)
}

fn parse_atom(atom: &str, location: &Location) -> Value {
    LITERAL_PARSERS
        .iter()
        .find_map(|parse| parse(atom))
        .unwrap_or_else(|| {
            Value::Reference(Reference {
                name: atom.into(),
                location: Some(location.clone()),
            })
        })
}

/// Decode the escape sequences of a raw string literal body
fn unescape(raw: &str, location: &Location) -> Result<String, LispError> {
    let invalid = |message: String| {
        LispError::at(ErrorKind::InvalidEscape, message, Some(location.clone()))
    };

    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        let decoded = match chars.next() {
            Some('n') => '\n',
            Some('r') => '\r',
            Some('t') => '\t',
            Some('\\') => '\\',
            Some('"') => '"',
            Some(prefix @ ('x' | 'u' | 'U')) => {
                let width = match prefix {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = chars.by_ref().take(width).collect();
                if digits.chars().count() != width || !digits.chars().all(|c| c.is_ascii_hexdigit())
                {
                    return Err(invalid(format!(
                        "Escape \\{prefix} needs {width} hex digits, got \"{digits}\""
                    )));
                }
                u32::from_str_radix(&digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| invalid(format!("\\{prefix}{digits} is not a character")))?
            }
            Some(other) => return Err(invalid(format!("Unknown escape sequence \\{other}"))),
            None => return Err(invalid("Trailing backslash in string".to_owned())),
        };
        result.push(decoded);
    }
    Ok(result)
}

/// Cursor over a token slice
struct FormReader<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> FormReader<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn unexpected(token: &Token, message: impl Into<String>) -> LispError {
        LispError::at(
            ErrorKind::UnexpectedToken,
            message,
            Some(token.location.clone()),
        )
    }

    fn parse_form(&mut self, depth: usize) -> Result<Value, LispError> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.read_form(depth))
    }

    fn read_form(&mut self, depth: usize) -> Result<Value, LispError> {
        let Some(token) = self.next() else {
            return Err(LispError::new(
                ErrorKind::UnexpectedToken,
                "Unexpected end of input",
            ));
        };
        if depth >= MAX_PARSE_DEPTH {
            return Err(LispError::at(
                ErrorKind::StackOverflow,
                format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                Some(token.location.clone()),
            ));
        }

        match &token.kind {
            TokenKind::LParen => self.parse_list(&token.location, depth),
            TokenKind::RParen => Err(Self::unexpected(token, "Unexpected ')'")),
            TokenKind::Quote => {
                if self.peek().is_none() {
                    return Err(Self::unexpected(token, "Nothing to quote at end of input"));
                }
                let quoted = self.parse_form(depth + 1)?;
                let quote = Value::Reference(Reference {
                    name: "quote".into(),
                    location: Some(token.location.clone()),
                });
                Ok(Value::pair_at(
                    quote,
                    Value::pair_at(quoted, Value::Nil, None),
                    Some(token.location.clone()),
                ))
            }
            TokenKind::Str(raw) => Ok(Value::Str(unescape(raw, &token.location)?)),
            TokenKind::Atom(text) if text == "." => {
                Err(Self::unexpected(token, "Unexpected '.' outside a list"))
            }
            TokenKind::Atom(text) => Ok(parse_atom(text, &token.location)),
        }
    }

    /// Parse the rest of a list whose `(` has been consumed
    fn parse_list(&mut self, open: &Location, depth: usize) -> Result<Value, LispError> {
        let unclosed = || {
            LispError::at(
                ErrorKind::UnclosedParenthesis,
                "Missing ')'",
                Some(open.clone()),
            )
        };

        let mut items = Vec::new();
        let mut tail = Value::Nil;
        loop {
            let token = self.peek().ok_or_else(unclosed)?;
            match &token.kind {
                TokenKind::RParen => {
                    self.pos += 1;
                    break;
                }
                TokenKind::Atom(text) if text == "." => {
                    if items.is_empty() {
                        return Err(Self::unexpected(token, "Expected an element before '.'"));
                    }
                    self.pos += 1;
                    match self.peek() {
                        None => return Err(unclosed()),
                        Some(next) if next.kind == TokenKind::RParen => {
                            return Err(Self::unexpected(next, "Expected an element after '.'"));
                        }
                        Some(_) => {}
                    }
                    tail = self.parse_form(depth + 1)?;
                    match self.next() {
                        None => return Err(unclosed()),
                        Some(close) if close.kind == TokenKind::RParen => break,
                        Some(other) => {
                            return Err(Self::unexpected(other, "Expected ')' after dotted tail"));
                        }
                    }
                }
                _ => items.push(self.parse_form(depth + 1)?),
            }
        }

        // Build tail-first; the head cell carries the list's location
        let mut list = tail;
        for (i, item) in items.into_iter().enumerate().rev() {
            let location = (i == 0).then(|| open.clone());
            list = Value::pair_at(item, list, location);
        }
        Ok(list)
    }
}
