//! Restricted object-literal parser.
//!
//! Accepts JavaScript/Python-flavoured data literals that strict JSON rejects
//! and produces a [`serde_json::Value`]. Only data is ever interpreted:
//! objects, arrays, strings, numbers, and the keyword literals below. Nothing
//! is evaluated.
//!
//! Accepted beyond strict JSON:
//!
//! - single-quoted and backtick strings (backticks without `${`), `+`
//!   concatenation of string literals;
//! - unquoted identifier and numeric keys;
//! - trailing commas, `//` and `/* */` comments;
//! - `undefined`/`None`/`NaN`/`Infinity` (as `null`), `True`/`False`;
//! - hex integers, leading `+`, leading or trailing decimal point.
//!
//! Spans containing executable-looking tokens (`function`, `=>`, `require`,
//! `import`, calls, ...) are rejected before parsing.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Nesting limit; deeper input is rejected rather than risking the stack.
pub const MAX_DEPTH: usize = 64;

const FORBIDDEN_IDENTIFIERS: &[&str] = &[
    "function", "require", "import", "export", "eval", "new", "class", "return", "await",
    "async", "this", "window", "process", "globalThis", "lambda", "exec", "__import__",
];

/// Why a span was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
    #[error("executable token `{token}` at offset {offset}")]
    ForbiddenToken { token: String, offset: usize },

    #[error("unexpected {found} at offset {offset}")]
    Unexpected { found: String, offset: usize },

    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("invalid number `{text}` at offset {offset}")]
    InvalidNumber { text: String, offset: usize },

    #[error("nesting deeper than {MAX_DEPTH} levels")]
    TooDeep,

    #[error("trailing content at offset {offset}")]
    TrailingContent { offset: usize },
}

/// Parses `span` as a restricted data literal.
///
/// # Errors
///
/// Returns [`LiteralError::ForbiddenToken`] if the span contains anything
/// that looks executable, and a syntax variant for anything else it cannot
/// read as data.
pub fn parse_literal(span: &str) -> Result<Value, LiteralError> {
    let chars: Vec<char> = span.chars().collect();
    reject_executable(&chars)?;

    let mut parser = Parser { chars, pos: 0 };
    let value = parser.value(0)?;
    parser.skip_trivia();
    if parser.pos < parser.chars.len() {
        return Err(LiteralError::TrailingContent { offset: parser.pos });
    }
    Ok(value)
}

/// Scans outside string literals and comments for executable-looking tokens.
fn reject_executable(chars: &[char]) -> Result<(), LiteralError> {
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '"' | '\'' | '`' => {
                if ch == '`' && template_has_substitution(chars, i) {
                    return Err(LiteralError::ForbiddenToken {
                        token: "${".to_owned(),
                        offset: i,
                    });
                }
                i = skip_string(chars, i);
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i += 2;
            }
            '=' if chars.get(i + 1) == Some(&'>') => {
                return Err(LiteralError::ForbiddenToken {
                    token: "=>".to_owned(),
                    offset: i,
                });
            }
            '(' | ')' | ';' | '=' => {
                return Err(LiteralError::ForbiddenToken {
                    token: ch.to_string(),
                    offset: i,
                });
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_continue(chars[i]) {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                if FORBIDDEN_IDENTIFIERS.contains(&ident.as_str()) {
                    return Err(LiteralError::ForbiddenToken {
                        token: ident,
                        offset: start,
                    });
                }
            }
            _ => i += 1,
        }
    }
    Ok(())
}

fn template_has_substitution(chars: &[char], start: usize) -> bool {
    let end = skip_string(chars, start).min(chars.len());
    chars[start..end].windows(2).any(|w| w == ['$', '{'])
}

/// Index just past the string literal opening at `start`.
fn skip_string(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    i
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

// ---------------------------------------------------------------------------
// Recursive descent
// ---------------------------------------------------------------------------

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn unexpected(&self) -> LiteralError {
        match self.peek() {
            Some(c) => LiteralError::Unexpected {
                found: format!("`{c}`"),
                offset: self.pos,
            },
            None => LiteralError::UnexpectedEnd,
        }
    }

    fn expect(&mut self, want: char) -> Result<(), LiteralError> {
        self.skip_trivia();
        if self.peek() == Some(want) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Skips whitespace and comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.pos += 1,
                Some('/') if self.chars.get(self.pos + 1) == Some(&'/') => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                Some('/') if self.chars.get(self.pos + 1) == Some(&'*') => {
                    self.pos += 2;
                    while self.pos < self.chars.len()
                        && !(self.chars[self.pos] == '*'
                            && self.chars.get(self.pos + 1) == Some(&'/'))
                    {
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 2).min(self.chars.len());
                }
                _ => return,
            }
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if depth > MAX_DEPTH {
            return Err(LiteralError::TooDeep);
        }
        self.skip_trivia();
        match self.peek() {
            Some('{') => self.object(depth),
            Some('[') => self.array(depth),
            Some('"' | '\'' | '`') => self.concatenated_string().map(Value::String),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            Some(c) if is_ident_start(c) => self.keyword(),
            _ => Err(self.unexpected()),
        }
    }

    fn object(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some('}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                Some(',') => {
                    // Stray or doubled comma.
                    self.pos += 1;
                    continue;
                }
                None => return Err(LiteralError::UnexpectedEnd),
                _ => {}
            }
            let key = self.key()?;
            self.expect(':')?;
            let value = self.value(depth + 1)?;
            map.insert(key, value);

            self.skip_trivia();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn array(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                None => return Err(LiteralError::UnexpectedEnd),
                _ => {}
            }
            items.push(self.value(depth + 1)?);

            self.skip_trivia();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {}
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn key(&mut self) -> Result<String, LiteralError> {
        self.skip_trivia();
        match self.peek() {
            Some('"' | '\'' | '`') => self.string(),
            Some(c) if is_ident_start(c) => Ok(self.identifier()),
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '.') {
                    self.pos += 1;
                }
                Ok(self.chars[start..self.pos].iter().collect())
            }
            _ => Err(self.unexpected()),
        }
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn keyword(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        let ident = self.identifier();
        match ident.as_str() {
            "true" | "True" => Ok(Value::Bool(true)),
            "false" | "False" => Ok(Value::Bool(false)),
            "null" | "None" | "undefined" | "NaN" | "Infinity" => Ok(Value::Null),
            _ => Err(LiteralError::Unexpected {
                found: format!("identifier `{ident}`"),
                offset: start,
            }),
        }
    }

    /// One or more string literals joined with `+`.
    fn concatenated_string(&mut self) -> Result<String, LiteralError> {
        let mut out = self.string()?;
        loop {
            let save = self.pos;
            self.skip_trivia();
            if self.peek() == Some('+') {
                self.pos += 1;
                self.skip_trivia();
                if matches!(self.peek(), Some('"' | '\'' | '`')) {
                    out.push_str(&self.string()?);
                    continue;
                }
                return Err(self.unexpected());
            }
            self.pos = save;
            return Ok(out);
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = self.peek().ok_or(LiteralError::UnexpectedEnd)?;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let ch = self.peek().ok_or(LiteralError::UnexpectedEnd)?;
            self.pos += 1;
            if ch == quote {
                return Ok(out);
            }
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            let esc = self.peek().ok_or(LiteralError::UnexpectedEnd)?;
            self.pos += 1;
            match esc {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{0008}'),
                'f' => out.push('\u{000C}'),
                'v' => out.push('\u{000B}'),
                '0' => out.push('\0'),
                '\n' => {}
                'u' => out.push(self.hex_escape(4)?),
                'x' => out.push(self.hex_escape(2)?),
                other => out.push(other),
            }
        }
    }

    fn hex_escape(&mut self, len: usize) -> Result<char, LiteralError> {
        let start = self.pos;
        let end = start + len;
        if end > self.chars.len() {
            return Err(LiteralError::UnexpectedEnd);
        }
        let text: String = self.chars[start..end].iter().collect();
        self.pos = end;
        u32::from_str_radix(&text, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or(LiteralError::Unexpected {
                found: format!("escape `{text}`"),
                offset: start,
            })
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        let negative = match self.peek() {
            Some('-') => {
                self.pos += 1;
                true
            }
            Some('+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };

        if self.peek().is_some_and(is_ident_start) {
            // `-Infinity`, `+NaN`.
            return match self.keyword()? {
                Value::Null => Ok(Value::Null),
                _ => Err(LiteralError::InvalidNumber {
                    text: self.chars[start..self.pos].iter().collect(),
                    offset: start,
                }),
            };
        }

        let body_start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_'))
            || (matches!(self.peek(), Some('-' | '+'))
                && matches!(self.chars.get(self.pos.wrapping_sub(1)), Some('e' | 'E')))
        {
            self.pos += 1;
        }
        let body: String = self.chars[body_start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let invalid = || LiteralError::InvalidNumber {
            text: self.chars[start..self.pos].iter().collect(),
            offset: start,
        };

        let number = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
            let magnitude = i64::from_str_radix(hex, 16).map_err(|_| invalid())?;
            Number::from(if negative { -magnitude } else { magnitude })
        } else if !body.contains(['.', 'e', 'E']) {
            let magnitude: i64 = body.parse().map_err(|_| invalid())?;
            Number::from(if negative { -magnitude } else { magnitude })
        } else {
            let magnitude: f64 = body.parse().map_err(|_| invalid())?;
            let signed = if negative { -magnitude } else { magnitude };
            Number::from_f64(signed).ok_or_else(invalid)?
        };
        Ok(Value::Number(number))
    }
}
