//! Parameter repair: JavaScript argument text to pretty-printed JSON
//!
//! The repairer is a recursive scanner over the argument bytes with three
//! kinds of state: inside a string literal, inside an identifier or number
//! token, and structural (objects, arrays, separators). Literal JavaScript
//! values are translated to JSON; every other sub-expression is replaced by an
//! `__EXPR_<id>__` placeholder string and recorded. Structural damage (an
//! unterminated object, a missing separator) fails the whole repair, in which
//! case the caller keeps the raw text.
//!
//! Output is deterministic: keys keep encounter order, indentation is four
//! spaces, and placeholder ids restart at 0 for every block. Running the
//! repairer on its own placeholder-free output returns the same text. A
//! source literal that already reads `__EXPR_<n>__` fails the repair, so every
//! placeholder in the output maps to exactly one recorded expression.

use crate::engine::delimiter;
use crate::models::{ExpressionSlot, ParameterBlock};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::ops::Range;

/// Nesting limit for objects and arrays; matches serde_json's own limit.
const MAX_DEPTH: usize = 100;

/// Calls that serialize their first argument without changing its shape
const TRANSPARENT_WRAPPERS: &[&str] = &[
    "JSON.stringify",
    "qs.stringify",
    "Qs.stringify",
    "querystring.stringify",
];

/// The argument text could not be turned into valid structured data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairFailed;

impl fmt::Display for RepairFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parameter text could not be repaired")
    }
}

/// A successful repair
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    pub value: Value,
    pub text: String,
    pub expressions: Vec<ExpressionSlot>,
}

/// Builds a [`ParameterBlock`] for `raw_text`, keeping only the raw text when
/// repair fails.
pub fn normalize(raw_text: &str) -> ParameterBlock {
    match repair(raw_text) {
        Ok(repaired) => ParameterBlock {
            raw_text: raw_text.to_string(),
            repaired_text: Some(repaired.text),
            expressions: repaired.expressions,
        },
        Err(RepairFailed) => ParameterBlock {
            raw_text: raw_text.to_string(),
            repaired_text: None,
            expressions: Vec::new(),
        },
    }
}

/// Repairs `raw_text` into pretty-printed JSON
pub fn repair(raw_text: &str) -> Result<Repaired, RepairFailed> {
    let region = strip_noise(raw_text);
    let mut parser = Parser::new(raw_text, region);
    let value = parser.parse_arguments()?;
    let text = to_pretty(&value)?;
    // The emitted text must read back as JSON
    serde_json::from_str::<Value>(&text).map_err(|_| RepairFailed)?;
    if !placeholders_consistent(&text, parser.expressions.len()) {
        return Err(RepairFailed);
    }
    Ok(Repaired {
        value,
        text,
        expressions: parser.expressions,
    })
}

/// Every `__EXPR_<n>__` token in `text` names a recorded slot, and no slot
/// appears twice. Source literals that already read like placeholders break
/// this.
fn placeholders_consistent(text: &str, slots: usize) -> bool {
    const PREFIX: &str = "__EXPR_";
    let mut seen = vec![false; slots];
    let mut rest = text;
    while let Some(i) = rest.find(PREFIX) {
        rest = &rest[i + PREFIX.len()..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || !rest[digits..].starts_with("__") {
            continue;
        }
        let Ok(id) = rest[..digits].parse::<usize>() else {
            return false;
        };
        match seen.get_mut(id) {
            Some(used) if !*used => *used = true,
            _ => return false,
        }
    }
    true
}

/// Pretty-prints with four-space indentation
pub fn to_pretty(value: &Value) -> Result<String, RepairFailed> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer).map_err(|_| RepairFailed)?;
    String::from_utf8(buf).map_err(|_| RepairFailed)
}

/// Trims whitespace, trailing semicolons and wrapping parentheses
fn strip_noise(text: &str) -> Range<usize> {
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut end = text.len();
    loop {
        let slice = &text[start..end];
        start += slice.len() - slice.trim_start().len();
        end = start + text[start..end].trim_end().len();
        if end > start && bytes[end - 1] == b';' {
            end -= 1;
            continue;
        }
        if end > start + 1
            && bytes[start] == b'('
            && delimiter::find_balanced_end(&text[..end], start, '(', ')') == Ok(end - 1)
        {
            start += 1;
            end -= 1;
            continue;
        }
        return start..end;
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_ident_char(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

enum Key {
    Identifier(String),
    Other(String),
}

impl Key {
    fn into_string(self) -> String {
        match self {
            Key::Identifier(s) | Key::Other(s) => s,
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    end: usize,
    depth: usize,
    expressions: Vec<ExpressionSlot>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, region: Range<usize>) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: region.start,
            end: region.end,
            depth: 0,
            expressions: Vec::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        (self.pos < self.end).then(|| self.bytes[self.pos])
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.bytes[self.pos..self.end].starts_with(prefix.as_bytes())
    }

    fn skip_ws(&mut self) {
        while self.pos < self.end {
            let b = self.bytes[self.pos];
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else if self.starts_with("//") {
                self.pos = self.find_from(self.pos, "\n").unwrap_or(self.end);
            } else if self.starts_with("/*") {
                self.pos = self
                    .find_from(self.pos + 2, "*/")
                    .map(|i| i + 2)
                    .unwrap_or(self.end);
            } else {
                break;
            }
        }
    }

    fn find_from(&self, from: usize, needle: &str) -> Option<usize> {
        self.src[from..self.end].find(needle).map(|i| from + i)
    }

    fn placeholder(&mut self, text: &str) -> Value {
        let id = self.expressions.len();
        self.expressions.push(ExpressionSlot {
            id,
            text: text.to_string(),
        });
        Value::String(ParameterBlock::placeholder(id))
    }

    /// Top level: one value, or several comma-separated call arguments
    fn parse_arguments(&mut self) -> Result<Value, RepairFailed> {
        let mut values = Vec::new();
        loop {
            self.skip_ws();
            if self.pos >= self.end {
                break;
            }
            values.push(self.parse_value()?);
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(b',') => self.pos += 1,
                Some(_) => return Err(RepairFailed),
            }
        }
        match values.len() {
            0 => Err(RepairFailed),
            1 => values.pop().ok_or(RepairFailed),
            _ => Ok(Value::Array(values)),
        }
    }

    fn parse_value(&mut self) -> Result<Value, RepairFailed> {
        self.skip_ws();
        let start = self.pos;
        let checkpoint = self.expressions.len();

        if let Some(value) = self.parse_literal()? {
            if self.at_value_end() {
                return Ok(value);
            }
        }
        // Not a plain literal after all: `"a" + b`, `{...}.x`, `f(x)`
        self.pos = start;
        self.expressions.truncate(checkpoint);
        self.parse_expression(start)
    }

    fn at_value_end(&mut self) -> bool {
        self.skip_ws();
        matches!(self.peek(), None | Some(b',' | b'}' | b']' | b')'))
    }

    fn parse_expression(&mut self, start: usize) -> Result<Value, RepairFailed> {
        let src = self.src;
        let end = delimiter::expression_end(src, start, self.end);
        let text = src[start..end].trim();
        if text.is_empty() {
            return Err(RepairFailed);
        }
        self.pos = end;
        Ok(self.placeholder(text))
    }

    /// `Ok(None)` means the text at `pos` is not a literal form
    fn parse_literal(&mut self) -> Result<Option<Value>, RepairFailed> {
        match self.peek() {
            None => Err(RepairFailed),
            Some(b'{') => self.parse_object().map(Some),
            Some(b'[') => self.parse_array().map(Some),
            Some(b'\'' | b'"') => self.parse_string().map(|s| Some(Value::String(s))),
            Some(b'`') => self.parse_template(),
            Some(b) if b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.') => {
                Ok(self.parse_number())
            }
            Some(b) if is_ident_start(b) => self.parse_word(),
            Some(_) => Ok(None),
        }
    }

    fn enter(&mut self) -> Result<(), RepairFailed> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(RepairFailed);
        }
        Ok(())
    }

    fn parse_object(&mut self) -> Result<Value, RepairFailed> {
        self.enter()?;
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None | Some(b',') => return Err(RepairFailed),
                Some(b'}') => {
                    self.pos += 1;
                    self.depth -= 1;
                    return Ok(Value::Object(map));
                }
                Some(_) => {}
            }
            self.parse_member(&mut map)?;
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                _ => return Err(RepairFailed),
            }
        }
    }

    fn parse_member(&mut self, map: &mut Map<String, Value>) -> Result<(), RepairFailed> {
        let member_start = self.pos;

        if self.starts_with("...") {
            let src = self.src;
            let expr_start = self.pos + 3;
            let expr_end = delimiter::expression_end(src, expr_start, self.end);
            let expr = src[expr_start..expr_end].trim();
            if expr.is_empty() {
                return Err(RepairFailed);
            }
            let value = self.placeholder(expr);
            map.insert(format!("...{expr}"), value);
            self.pos = expr_end;
            return Ok(());
        }

        let key = self.parse_key()?;
        self.skip_ws();
        match self.peek() {
            Some(b':') => {
                self.pos += 1;
                let value = self.parse_value()?;
                map.insert(key.into_string(), value);
            }
            Some(b',' | b'}') => {
                // Shorthand `{ id }`
                let Key::Identifier(name) = key else {
                    return Err(RepairFailed);
                };
                let value = self.placeholder(&name);
                map.insert(name, value);
            }
            Some(b'(') => {
                let value = self.parse_method_body(member_start)?;
                map.insert(key.into_string(), value);
            }
            Some(b) if is_ident_start(b) || b == b'*' => {
                // `get total() {}`, `async load() {}`, `*items() {}`
                let Key::Identifier(modifier) = key else {
                    return Err(RepairFailed);
                };
                if !matches!(modifier.as_str(), "get" | "set" | "async" | "static") {
                    return Err(RepairFailed);
                }
                if self.peek() == Some(b'*') {
                    self.pos += 1;
                    self.skip_ws();
                }
                let name = self.parse_key()?;
                self.skip_ws();
                if self.peek() != Some(b'(') {
                    return Err(RepairFailed);
                }
                let value = self.parse_method_body(member_start)?;
                map.insert(name.into_string(), value);
            }
            _ => return Err(RepairFailed),
        }
        Ok(())
    }

    /// Consumes `(params) { body }` and records the whole member as one expression
    fn parse_method_body(&mut self, member_start: usize) -> Result<Value, RepairFailed> {
        let src = self.src;
        let region = &src[..self.end];
        let close = delimiter::find_balanced_end(region, self.pos, '(', ')').map_err(|_| RepairFailed)?;
        self.pos = close + 1;
        self.skip_ws();
        if self.peek() != Some(b'{') {
            return Err(RepairFailed);
        }
        let body_close =
            delimiter::find_balanced_end(region, self.pos, '{', '}').map_err(|_| RepairFailed)?;
        self.pos = body_close + 1;
        let text = self.src[member_start..self.pos].trim().to_string();
        Ok(self.placeholder(&text))
    }

    fn parse_key(&mut self) -> Result<Key, RepairFailed> {
        match self.peek() {
            Some(b'\'' | b'"') => self.parse_string().map(Key::Other),
            Some(b'`') => match self.parse_template()? {
                Some(Value::String(s)) => Ok(Key::Other(s)),
                _ => Err(RepairFailed),
            },
            Some(b'[') => {
                let region = &self.src[..self.end];
                let close =
                    delimiter::find_balanced_end(region, self.pos, '[', ']').map_err(|_| RepairFailed)?;
                let key = self.src[self.pos..=close].to_string();
                self.pos = close + 1;
                Ok(Key::Other(key))
            }
            Some(b) if b.is_ascii_digit() || b == b'.' => {
                let start = self.pos;
                self.consume_number_token();
                Ok(Key::Other(self.src[start..self.pos].to_string()))
            }
            Some(b) if is_ident_start(b) => {
                let start = self.pos;
                while self.peek().is_some_and(is_ident_char) {
                    self.pos += 1;
                }
                Ok(Key::Identifier(self.src[start..self.pos].to_string()))
            }
            _ => Err(RepairFailed),
        }
    }

    fn parse_array(&mut self) -> Result<Value, RepairFailed> {
        self.enter()?;
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(RepairFailed),
                Some(b']') => {
                    self.pos += 1;
                    self.depth -= 1;
                    return Ok(Value::Array(items));
                }
                Some(b',') => {
                    // Elision
                    self.pos += 1;
                    items.push(Value::Null);
                    continue;
                }
                Some(_) => {}
            }
            if self.starts_with("...") {
                let start = self.pos;
                let end = delimiter::expression_end(self.src, start + 3, self.end);
                let text = self.src[start..end].trim().to_string();
                self.pos = end;
                items.push(self.placeholder(&text));
            } else {
                items.push(self.parse_value()?);
            }
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {}
                _ => return Err(RepairFailed),
            }
        }
    }

    fn parse_string(&mut self) -> Result<String, RepairFailed> {
        let end = delimiter::skip_string(self.bytes, self.pos, self.end).map_err(|_| RepairFailed)?;
        let body = &self.src[self.pos + 1..end - 1];
        self.pos = end;
        unescape(body)
    }

    /// Interpolation-free templates are strings; others are expressions
    fn parse_template(&mut self) -> Result<Option<Value>, RepairFailed> {
        let end = delimiter::skip_string(self.bytes, self.pos, self.end).map_err(|_| RepairFailed)?;
        let body = &self.src[self.pos + 1..end - 1];
        if has_interpolation(body) {
            return Ok(None);
        }
        self.pos = end;
        unescape(body).map(|s| Some(Value::String(s)))
    }

    fn consume_number_token(&mut self) {
        let start = self.pos;
        while let Some(b) = self.peek() {
            let exponent_sign = matches!(b, b'+' | b'-')
                && self.pos > start
                && matches!(self.bytes[self.pos - 1], b'e' | b'E')
                && !self.src[start..self.pos].to_ascii_lowercase().starts_with("0x");
            let leading_sign = matches!(b, b'+' | b'-') && self.pos == start;
            if b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || exponent_sign || leading_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn parse_number(&mut self) -> Option<Value> {
        let start = self.pos;
        self.consume_number_token();
        let token = self.src[start..self.pos].replace('_', "");
        number_from_token(&token).map(Value::Number)
    }

    /// Keywords, transparent serializer calls; anything else is an expression
    fn parse_word(&mut self) -> Result<Option<Value>, RepairFailed> {
        let start = self.pos;
        while self.peek().is_some_and(|b| is_ident_char(b) || b == b'.') {
            self.pos += 1;
        }
        let word = &self.src[start..self.pos];
        match word {
            "true" => return Ok(Some(Value::Bool(true))),
            "false" => return Ok(Some(Value::Bool(false))),
            "null" | "undefined" => return Ok(Some(Value::Null)),
            _ => {}
        }
        if !TRANSPARENT_WRAPPERS.contains(&word) {
            return Ok(None);
        }

        self.skip_ws();
        if self.peek() != Some(b'(') {
            return Ok(None);
        }
        let Ok(close) = delimiter::find_balanced_end(&self.src[..self.end], self.pos, '(', ')') else {
            return Ok(None);
        };
        let outer_end = self.end;
        self.pos += 1;
        self.end = close;
        self.skip_ws();
        if self.pos >= self.end {
            self.end = outer_end;
            return Ok(None);
        }
        let inner = self.parse_value()?;
        // Replacer and indent arguments do not change the payload
        self.end = outer_end;
        self.pos = close + 1;
        Ok(Some(inner))
    }
}

fn number_from_token(token: &str) -> Option<Number> {
    if token.is_empty() {
        return None;
    }
    if let Ok(number) = serde_json::from_str::<Number>(token) {
        return Some(number);
    }
    let (negative, unsigned) = match token.as_bytes()[0] {
        b'-' => (true, &token[1..]),
        b'+' => (false, &token[1..]),
        _ => (false, token),
    };
    let lower = unsigned.to_ascii_lowercase();
    let radix = if lower.starts_with("0x") {
        Some(16)
    } else if lower.starts_with("0o") {
        Some(8)
    } else if lower.starts_with("0b") {
        Some(2)
    } else {
        None
    };
    if let Some(radix) = radix {
        let value = i64::from_str_radix(&lower[2..], radix).ok()?;
        return Some(Number::from(if negative { -value } else { value }));
    }
    if !unsigned.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) {
        return None;
    }
    let value: f64 = token.parse().ok()?;
    if value.fract() == 0.0 && value.abs() < 9.0e15 && !unsigned.contains(['.', 'e', 'E']) {
        return Some(Number::from(value as i64));
    }
    Number::from_f64(value)
}

fn has_interpolation(body: &str) -> bool {
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if bytes.get(i + 1) == Some(&b'{') => return true,
            _ => i += 1,
        }
    }
    false
}

/// Decodes JavaScript string escapes
fn unescape(body: &str) -> Result<String, RepairFailed> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = chars.next().ok_or(RepairFailed)?;
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !chars.clone().next().is_some_and(|c| c.is_ascii_digit()) => out.push('\0'),
            'x' => {
                let code = read_hex(&mut chars, 2).ok_or(RepairFailed)?;
                out.push(char::from_u32(code).ok_or(RepairFailed)?);
            }
            'u' => out.push(read_unicode_escape(&mut chars)?),
            // Line continuation
            '\n' | '\u{2028}' | '\u{2029}' => {}
            '\r' => {
                if chars.clone().next() == Some('\n') {
                    chars.next();
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn read_hex(chars: &mut std::str::Chars<'_>, digits: usize) -> Option<u32> {
    let mut value = 0u32;
    for _ in 0..digits {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    Some(value)
}

fn read_unicode_escape(chars: &mut std::str::Chars<'_>) -> Result<char, RepairFailed> {
    if chars.clone().next() == Some('{') {
        chars.next();
        let mut value = 0u32;
        let mut digits = 0;
        loop {
            let c = chars.next().ok_or(RepairFailed)?;
            if c == '}' {
                break;
            }
            value = value
                .checked_mul(16)
                .and_then(|v| v.checked_add(c.to_digit(16)?))
                .ok_or(RepairFailed)?;
            digits += 1;
        }
        if digits == 0 {
            return Err(RepairFailed);
        }
        return char::from_u32(value).ok_or(RepairFailed);
    }

    let unit = read_hex(chars, 4).ok_or(RepairFailed)?;
    if (0xD800..0xDC00).contains(&unit) {
        let mut lookahead = chars.clone();
        if lookahead.next() == Some('\\') && lookahead.next() == Some('u') {
            if let Some(low) = read_hex(&mut lookahead, 4).filter(|low| (0xDC00..0xE000).contains(low)) {
                *chars = lookahead;
                let combined = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                return char::from_u32(combined).ok_or(RepairFailed);
            }
        }
    }
    Ok(char::from_u32(unit).unwrap_or('\u{FFFD}'))
}
