//! Balanced delimiter scanning over JavaScript source text
//!
//! Every higher stage of the engine leans on this module to find where a call's
//! argument list, an object literal or a string ends without parsing the
//! surrounding program. The scanner works on bytes: every delimiter it cares
//! about is ASCII, and UTF-8 continuation bytes can never collide with them.

use std::fmt;
use std::ops::Range;

/// Upper bound applied to parameter regions unless configured otherwise.
pub const DEFAULT_MAX_SPAN: usize = 5000;

/// Template interpolations nested deeper than this are treated as unbalanced.
const MAX_NESTING: usize = 64;

/// No closing delimiter balances the opening one before the scan limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotFound;

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no balancing delimiter found")
    }
}

/// Returns the index of the delimiter that closes the one at `open_index`.
///
/// `open` and `close` must be ASCII. Delimiters inside string literals,
/// template literals, comments and regex literals are ignored; `${...}`
/// interpolations are balanced as nested regions. Passing a quote character as
/// both `open` and `close` returns the index of the closing quote.
pub fn find_balanced_end(
    text: &str,
    open_index: usize,
    open: char,
    close: char,
) -> Result<usize, NotFound> {
    find_balanced_end_within(text, open_index, open, close, usize::MAX)
}

/// Like [`find_balanced_end`], but gives up once the region would exceed
/// `max_span` bytes measured from `open_index`.
pub fn find_balanced_end_within(
    text: &str,
    open_index: usize,
    open: char,
    close: char,
    max_span: usize,
) -> Result<usize, NotFound> {
    if !open.is_ascii() || !close.is_ascii() {
        return Err(NotFound);
    }
    let bytes = text.as_bytes();
    let limit = open_index.saturating_add(max_span).min(bytes.len());
    let (open, close) = (open as u8, close as u8);

    if open_index >= limit || bytes[open_index] != open {
        return Err(NotFound);
    }
    if is_quote(open) {
        if open != close {
            return Err(NotFound);
        }
        return skip_string(bytes, open_index, limit).map(|end| end - 1);
    }
    scan_balanced(bytes, open_index, open, close, limit, 0)
}

/// Splits `text` on `separator` occurrences that sit at nesting depth zero,
/// outside strings and comments. Returned ranges are untrimmed and index into
/// `text`. An unterminated construct ends the final segment at end of text.
pub fn split_top_level(text: &str, separator: u8) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut segment_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match skip_trivia(bytes, i, bytes.len(), 0) {
            Ok(Some(next)) => {
                i = next;
                continue;
            }
            Ok(None) => {}
            Err(NotFound) => break,
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b if b == separator && depth == 0 => {
                segments.push(segment_start..i);
                segment_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    segments.push(segment_start..bytes.len());
    segments
}

/// Returns the end of the expression starting at `start`: the first depth-zero
/// `,`, the first closer that has no opener inside the expression, or `limit`.
pub fn expression_end(text: &str, start: usize, limit: usize) -> usize {
    let bytes = text.as_bytes();
    let limit = limit.min(bytes.len());
    let mut depth = 0usize;
    let mut i = start;

    while i < limit {
        match skip_trivia(bytes, i, limit, 0) {
            Ok(Some(next)) => {
                i = next;
                continue;
            }
            Ok(None) => {}
            Err(NotFound) => return limit,
        }
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                if depth == 0 {
                    return i;
                }
                depth -= 1;
            }
            b',' if depth == 0 => return i,
            _ => {}
        }
        i += 1;
    }
    limit
}

/// Yields every string and template literal in `range` as
/// `(literal_start, literal_end_exclusive)`, skipping comments.
pub fn string_literals(text: &str, range: Range<usize>) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let limit = range.end.min(bytes.len());
    let mut literals = Vec::new();
    let mut i = range.start;

    while i < limit {
        if is_quote(bytes[i]) {
            match skip_string(bytes, i, bytes.len()) {
                Ok(end) => {
                    literals.push((i, end));
                    i = end;
                }
                Err(NotFound) => i += 1,
            }
            continue;
        }
        match skip_trivia(bytes, i, limit, 0) {
            Ok(Some(next)) => i = next,
            Ok(None) => i += 1,
            Err(NotFound) => break,
        }
    }
    literals
}

/// Returns the body of `arg` when it is exactly one string or template literal.
pub fn string_literal_content(arg: &str) -> Option<&str> {
    let arg = arg.trim();
    let bytes = arg.as_bytes();
    if bytes.len() < 2 || !is_quote(bytes[0]) {
        return None;
    }
    match skip_string(bytes, 0, bytes.len()) {
        Ok(end) if end == bytes.len() => Some(&arg[1..end - 1]),
        _ => None,
    }
}

/// Returns the trimmed value text of the top-level property `key` of an
/// object literal. Quoted keys match their unquoted form.
pub fn object_property<'a>(object: &'a str, key: &str) -> Option<&'a str> {
    let object = object.trim();
    if !object.starts_with('{') || find_balanced_end(object, 0, '{', '}') != Ok(object.len() - 1) {
        return None;
    }
    let inner = &object[1..object.len() - 1];
    for member in split_top_level(inner, b',') {
        let member = &inner[member];
        let Some(colon) = split_top_level(member, b':').first().map(|r| r.end) else {
            continue;
        };
        if colon >= member.len() {
            continue;
        }
        let name = member[..colon].trim();
        let name = string_literal_content(name).unwrap_or(name);
        if name == key {
            return Some(member[colon + 1..].trim());
        }
    }
    None
}

/// Largest char boundary of `text` that is not after `index`.
pub fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

pub(crate) fn is_quote(b: u8) -> bool {
    matches!(b, b'\'' | b'"' | b'`')
}

fn scan_balanced(
    bytes: &[u8],
    open_index: usize,
    open: u8,
    close: u8,
    limit: usize,
    nesting: usize,
) -> Result<usize, NotFound> {
    let mut depth = 0usize;
    let mut i = open_index;

    while i < limit {
        if let Some(next) = skip_trivia(bytes, i, limit, nesting)? {
            i = next;
            continue;
        }
        let b = bytes[i];
        if b == open {
            depth += 1;
        } else if b == close {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Ok(i);
            }
        }
        i += 1;
    }
    Err(NotFound)
}

/// Returns the index just past the string or template literal at `start`.
///
/// Single and double quoted strings may not contain a raw newline; hitting one
/// means the literal is unterminated.
pub(crate) fn skip_string(bytes: &[u8], start: usize, limit: usize) -> Result<usize, NotFound> {
    skip_string_nested(bytes, start, limit, 0)
}

fn skip_string_nested(
    bytes: &[u8],
    start: usize,
    limit: usize,
    nesting: usize,
) -> Result<usize, NotFound> {
    let quote = bytes[start];
    let mut i = start + 1;

    while i < limit {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' if quote != b'`' => return Err(NotFound),
            b'$' if quote == b'`' && bytes.get(i + 1) == Some(&b'{') => {
                if nesting >= MAX_NESTING {
                    return Err(NotFound);
                }
                let end = scan_balanced(bytes, i + 1, b'{', b'}', limit, nesting + 1)?;
                i = end + 1;
            }
            b if b == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(NotFound)
}

/// If a string, comment or regex literal starts at `i`, returns the index just
/// past it. Returns `Ok(None)` for ordinary code.
fn skip_trivia(
    bytes: &[u8],
    i: usize,
    limit: usize,
    nesting: usize,
) -> Result<Option<usize>, NotFound> {
    let b = bytes[i];
    if is_quote(b) {
        return match skip_string_nested(bytes, i, limit, nesting) {
            Ok(end) => Ok(Some(end)),
            // A stray quote ends at the line break so one bad literal cannot
            // swallow the rest of the file.
            Err(NotFound) if b != b'`' => match position_of(bytes, b'\n', i, limit) {
                Some(newline) => Ok(Some(newline)),
                None => Err(NotFound),
            },
            Err(NotFound) => Err(NotFound),
        };
    }
    if b != b'/' {
        return Ok(None);
    }
    match bytes.get(i + 1) {
        Some(b'/') => Ok(Some(position_of(bytes, b'\n', i, limit).unwrap_or(limit))),
        Some(b'*') => {
            let mut j = i + 2;
            while j + 1 < limit {
                if bytes[j] == b'*' && bytes[j + 1] == b'/' {
                    return Ok(Some(j + 2));
                }
                j += 1;
            }
            Err(NotFound)
        }
        _ if regex_allowed_before(bytes, i) => Ok(skip_regex(bytes, i, limit)),
        _ => Ok(None),
    }
}

fn position_of(bytes: &[u8], needle: u8, from: usize, limit: usize) -> Option<usize> {
    bytes[from..limit]
        .iter()
        .position(|&b| b == needle)
        .map(|offset| from + offset)
}

fn regex_allowed_before(bytes: &[u8], slash: usize) -> bool {
    let mut j = slash;
    while j > 0 {
        j -= 1;
        let b = bytes[j];
        if b.is_ascii_whitespace() {
            continue;
        }
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'$' {
            let mut word_start = j;
            while word_start > 0
                && (bytes[word_start - 1].is_ascii_alphanumeric() || bytes[word_start - 1] == b'_')
            {
                word_start -= 1;
            }
            return matches!(&bytes[word_start..=j], b"return" | b"typeof" | b"case");
        }
        return b"(,=:[!&|?{};+-*%<>~^".contains(&b);
    }
    true
}

fn skip_regex(bytes: &[u8], slash: usize, limit: usize) -> Option<usize> {
    let mut i = slash + 1;
    let mut in_class = false;

    while i < limit {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            b'[' => {
                in_class = true;
                i += 1;
            }
            b']' => {
                in_class = false;
                i += 1;
            }
            b'/' if !in_class => {
                i += 1;
                while i < limit && bytes[i].is_ascii_alphabetic() {
                    i += 1;
                }
                return Some(i);
            }
            _ => i += 1,
        }
    }
    None
}
