//! Source text to tokens.
//!
//! Whitespace separates tokens and `;` starts a comment that runs to the end
//! of the line. String literal bodies are kept raw; escape sequences are
//! decoded by the parser.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{escaped, is_not, take_till, take_while1},
    character::complete::{anychar, char, multispace1},
    combinator::{cut, map, opt, recognize, value},
    multi::many0_count,
    sequence::{pair, preceded, terminated},
};

use crate::{ErrorKind, LispError, Location};
use std::rc::Rc;

/// Characters that end an atom
const DELIMITERS: &str = "()'\";";

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LParen,
    RParen,
    Quote,
    /// Body of a string literal, escapes not yet decoded
    Str(String),
    /// Any other run of non-delimiter characters
    Atom(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

/// Skip whitespace and comments
fn trivia(input: &str) -> IResult<&str, usize> {
    many0_count(alt((
        multispace1,
        recognize(pair(char(';'), take_till(|c: char| c == '\n'))),
    )))
    .parse(input)
}

fn string_literal(input: &str) -> IResult<&str, TokenKind> {
    let body = escaped(is_not("\"\\"), '\\', anychar);
    map(
        preceded(char('"'), cut(terminated(opt(body), char('"')))),
        |raw: Option<&str>| TokenKind::Str(raw.unwrap_or_default().to_owned()),
    )
    .parse(input)
}

fn atom(input: &str) -> IResult<&str, TokenKind> {
    map(
        take_while1(|c: char| !c.is_whitespace() && !DELIMITERS.contains(c)),
        |text: &str| TokenKind::Atom(text.to_owned()),
    )
    .parse(input)
}

fn token(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::LParen, char('(')),
        value(TokenKind::RParen, char(')')),
        value(TokenKind::Quote, char('\'')),
        string_literal,
        atom,
    ))
    .parse(input)
}

/// Tracks line and column while scanning forward through the source
struct Cursor<'a> {
    source: &'a str,
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Cursor {
            source,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Move to byte `offset` (never backwards) and report the position there
    fn location_at(&mut self, offset: usize, filename: &Rc<str>) -> Location {
        for ch in self.source[self.offset..offset].chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset = offset;
        Location {
            filename: filename.clone(),
            line: self.line,
            column: self.column,
        }
    }
}

/// Split `source` into tokens, each tagged with its position in `filename`
pub fn tokenize(source: &str, filename: &str) -> Result<Vec<Token>, LispError> {
    let filename: Rc<str> = filename.into();
    let mut cursor = Cursor::new(source);
    let mut tokens = Vec::new();
    let mut input = source;

    loop {
        // trivia cannot fail: it matches zero or more items
        if let Ok((rest, _)) = trivia(input) {
            input = rest;
        }
        if input.is_empty() {
            return Ok(tokens);
        }

        let location = cursor.location_at(source.len() - input.len(), &filename);
        match token(input) {
            Ok((rest, kind)) => {
                tokens.push(Token { kind, location });
                input = rest;
            }
            Err(_) if input.starts_with('"') => {
                return Err(LispError::at(
                    ErrorKind::UnterminatedString,
                    "Unterminated string literal",
                    Some(location),
                ));
            }
            Err(_) => {
                let near: String = input.chars().take(10).collect();
                return Err(LispError::at(
                    ErrorKind::UnexpectedToken,
                    format!("Invalid syntax near '{near}'"),
                    Some(location),
                ));
            }
        }
    }
}
