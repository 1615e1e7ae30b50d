//! VALUES clause parser.
//!
//! Splits an INSERT statement into its header, the individual row tuples and
//! whatever follows the last tuple, then breaks tuples into fields. String
//! literals are decoded once into their canonical content according to the
//! source escape convention; re-encoding is the caller's business.

use super::scan::SourceEscapes;
use smallvec::SmallVec;
use std::fmt;

/// Why a VALUES clause or a tuple could not be resolved unambiguously
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscapeError {
    /// No `VALUES (` found outside literals
    MissingValues,
    /// A quoted literal runs to the end of the text
    UnterminatedLiteral { offset: usize },
    /// A tuple's parentheses never close
    UnbalancedTuple { offset: usize },
    /// Something other than `,` + `(` between tuples
    UnexpectedToken { offset: usize, found: String },
    /// `(1,,2)` or `()`
    EmptyField,
    /// A literal embedded in an expression, e.g. `CONCAT('a', b)`
    EmbeddedLiteral { expression: String },
    /// `\0` or a raw NUL byte, which PostgreSQL text cannot store
    NulByte,
}

impl fmt::Display for EscapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscapeError::MissingValues => write!(f, "no VALUES tuples found"),
            EscapeError::UnterminatedLiteral { offset } => {
                write!(f, "unterminated string literal at offset {}", offset)
            }
            EscapeError::UnbalancedTuple { offset } => {
                write!(f, "unbalanced parentheses in tuple at offset {}", offset)
            }
            EscapeError::UnexpectedToken { offset, found } => {
                if found.is_empty() {
                    write!(f, "unexpected end of statement at offset {}", offset)
                } else {
                    write!(f, "unexpected '{}' at offset {}", found, offset)
                }
            }
            EscapeError::EmptyField => write!(f, "empty field in tuple"),
            EscapeError::EmbeddedLiteral { expression } => {
                write!(f, "string literal inside expression: {}", expression)
            }
            EscapeError::NulByte => write!(f, "NUL character in string literal"),
        }
    }
}

impl std::error::Error for EscapeError {}

/// One column value inside a tuple
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Null,
    /// Number, boolean, function call or other unquoted token (trimmed source text)
    Bare(String),
    /// Decoded string literal content
    Text(String),
}

/// A parsed row `(v1, v2, ...)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueTuple {
    pub fields: SmallVec<[Field; 8]>,
}

/// A tuple's location in the statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleSpan<'a> {
    /// Text between the previous tuple and this one (empty for the first)
    pub separator: &'a str,
    /// The tuple including its parentheses
    pub raw: &'a str,
}

/// An INSERT statement cut at tuple boundaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesClause<'a> {
    /// Everything up to the first tuple, e.g. `INSERT INTO t (a, b) VALUES `
    pub head: &'a str,
    pub tuples: Vec<TupleSpan<'a>>,
    /// Everything after the last tuple, normally `;`
    pub tail: &'a str,
}

impl<'a> ValuesClause<'a> {
    /// Split a statement into header, tuples and tail.
    pub fn split(stmt: &'a str, escapes: SourceEscapes) -> Result<Self, EscapeError> {
        let bytes = stmt.as_bytes();
        let values_end = find_values_keyword(bytes, escapes)?;

        let mut pos = skip_whitespace(bytes, values_end);
        if pos >= bytes.len() || bytes[pos] != b'(' {
            return Err(EscapeError::MissingValues);
        }

        let head = &stmt[..pos];
        let mut tuples = Vec::new();
        let mut separator_start = pos;

        loop {
            let end = find_tuple_end(bytes, pos, escapes)?;
            tuples.push(TupleSpan {
                separator: &stmt[separator_start..pos],
                raw: &stmt[pos..end],
            });

            let mut next = skip_whitespace(bytes, end);
            if next < bytes.len() && bytes[next] == b',' {
                next = skip_whitespace(bytes, next + 1);
                if next < bytes.len() && bytes[next] == b'(' {
                    separator_start = end;
                    pos = next;
                    continue;
                }
                return Err(EscapeError::UnexpectedToken {
                    offset: next,
                    found: stmt[next..].chars().take(12).collect(),
                });
            }

            return Ok(Self {
                head,
                tuples,
                tail: &stmt[end..],
            });
        }
    }

    pub fn row_count(&self) -> usize {
        self.tuples.len()
    }
}

impl ValueTuple {
    /// Parse a raw `(...)` tuple into fields.
    pub fn parse(raw: &str, escapes: SourceEscapes) -> Result<Self, EscapeError> {
        let inner = raw
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or(EscapeError::UnbalancedTuple { offset: 0 })?;
        let bytes = inner.as_bytes();

        let mut fields = SmallVec::new();
        let mut start = 0;
        let mut depth = 0i32;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'\'' | b'"' | b'`' => {
                    i = skip_quoted(bytes, i, escapes)?;
                    continue;
                }
                b'(' => depth += 1,
                b')' => depth -= 1,
                b',' if depth == 0 => {
                    fields.push(Field::parse(&inner[start..i], escapes)?);
                    start = i + 1;
                }
                _ => {}
            }
            i += 1;
        }
        fields.push(Field::parse(&inner[start..], escapes)?);

        Ok(Self { fields })
    }
}

impl Field {
    pub fn parse(text: &str, escapes: SourceEscapes) -> Result<Self, EscapeError> {
        let t = text.trim();
        if t.is_empty() {
            return Err(EscapeError::EmptyField);
        }
        if t.eq_ignore_ascii_case("NULL") {
            return Ok(Field::Null);
        }
        if is_bit_or_hex_string(t) {
            return Ok(Field::Bare(t.to_string()));
        }

        let literal = strip_charset_introducer(t);
        let first = literal.as_bytes()[0];
        if first == b'\'' || first == b'"' {
            let (content, end) = decode_literal(literal, escapes)?;
            if end == literal.len() {
                return Ok(Field::Text(content));
            }
            return Err(EscapeError::EmbeddedLiteral {
                expression: preview(t),
            });
        }

        if t.contains(['\'', '"']) {
            return Err(EscapeError::EmbeddedLiteral {
                expression: preview(t),
            });
        }

        Ok(Field::Bare(t.to_string()))
    }
}

/// Decode the literal starting at `text[0]` (a `'` or `"`).
///
/// Returns the content and the byte offset just past the closing quote.
pub fn decode_literal(text: &str, escapes: SourceEscapes) -> Result<(String, usize), EscapeError> {
    let bytes = text.as_bytes();
    let quote = bytes[0];
    let mut out: Vec<u8> = Vec::with_capacity(text.len());
    let mut i = 1;

    while i < bytes.len() {
        let b = bytes[i];

        if b == b'\\' && escapes == SourceEscapes::Backslash {
            let next = *bytes
                .get(i + 1)
                .ok_or(EscapeError::UnterminatedLiteral { offset: 0 })?;
            match next {
                b'0' => return Err(EscapeError::NulByte),
                b'n' => out.push(b'\n'),
                b'r' => out.push(b'\r'),
                b't' => out.push(b'\t'),
                b'b' => out.push(0x08),
                b'Z' => out.push(0x1A),
                // LIKE wildcards keep their backslash in MySQL
                b'%' | b'_' => {
                    out.push(b'\\');
                    out.push(next);
                }
                other => out.push(other),
            }
            i += 2;
            continue;
        }

        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                out.push(quote);
                i += 2;
                continue;
            }
            if memchr::memchr(0, &out).is_some() {
                return Err(EscapeError::NulByte);
            }
            let content = String::from_utf8(out)
                .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());
            return Ok((content, i + 1));
        }

        out.push(b);
        i += 1;
    }

    Err(EscapeError::UnterminatedLiteral { offset: 0 })
}

/// `pos` points at an opening quote; returns the index just past its closing quote.
fn skip_quoted(bytes: &[u8], pos: usize, escapes: SourceEscapes) -> Result<usize, EscapeError> {
    let quote = bytes[pos];
    let mut i = pos + 1;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' && quote != b'`' && escapes == SourceEscapes::Backslash {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }

    Err(EscapeError::UnterminatedLiteral { offset: pos })
}

fn find_values_keyword(bytes: &[u8], escapes: SourceEscapes) -> Result<usize, EscapeError> {
    let mut depth = 0i32;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                i = skip_quoted(bytes, i, escapes)?;
                continue;
            }
            b'(' => depth += 1,
            b')' => depth -= 1,
            b'V' | b'v' if depth == 0 && is_keyword_at(bytes, i, b"VALUES") => {
                return Ok(i + 6);
            }
            _ => {}
        }
        i += 1;
    }

    Err(EscapeError::MissingValues)
}

fn find_tuple_end(bytes: &[u8], pos: usize, escapes: SourceEscapes) -> Result<usize, EscapeError> {
    let mut depth = 0i32;
    let mut i = pos;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                i = skip_quoted(bytes, i, escapes)?;
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }

    Err(EscapeError::UnbalancedTuple { offset: pos })
}

fn is_keyword_at(bytes: &[u8], pos: usize, keyword: &[u8]) -> bool {
    let end = pos + keyword.len();
    end <= bytes.len()
        && bytes[pos..end].eq_ignore_ascii_case(keyword)
        && (pos == 0 || !is_ident_byte(bytes[pos - 1]))
        && (end == bytes.len() || !is_ident_byte(bytes[end]))
}

#[inline]
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

#[inline]
fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// `_utf8mb4'abc'` / `_binary 'abc'` → `'abc'`
fn strip_charset_introducer(t: &str) -> &str {
    if !t.starts_with('_') {
        return t;
    }
    let name_end = t
        .bytes()
        .position(|b| !is_ident_byte(b))
        .unwrap_or(t.len());
    let rest = t[name_end..].trim_start();
    if rest.starts_with('\'') {
        rest
    } else {
        t
    }
}

/// `b'0101'` and `X'1F'` literals are valid PostgreSQL as-is
fn is_bit_or_hex_string(t: &str) -> bool {
    let bytes = t.as_bytes();
    if bytes.len() < 3 || bytes[1] != b'\'' || bytes[bytes.len() - 1] != b'\'' {
        return false;
    }
    let digits = &bytes[2..bytes.len() - 1];
    match bytes[0] {
        b'b' | b'B' => digits.iter().all(|b| *b == b'0' || *b == b'1'),
        b'x' | b'X' => digits.iter().all(|b| b.is_ascii_hexdigit()),
        _ => false,
    }
}

fn preview(text: &str) -> String {
    let mut s: String = text.chars().take(40).collect();
    if s.len() < text.len() {
        s.push_str("...");
    }
    s
}
