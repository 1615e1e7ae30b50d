//! Quote-aware character scanner shared by the segmenter and identifier
//! normalization.
//!
//! Tracks whether the current position is inside a single-quoted literal, a
//! double-quoted literal or a backtick identifier, plus the parenthesis depth
//! outside of them. A `;` is only a statement terminator when none of those
//! spans is open.

use serde::{Deserialize, Serialize};

/// How string literals in the source dump escape their quote character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceEscapes {
    /// mysqldump convention: `\'`, `\\`, `\n`, ... plus doubled quotes
    #[default]
    Backslash,
    /// Standard SQL: only doubled quotes, backslash is ordinary content
    Standard,
}

impl std::str::FromStr for SourceEscapes {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "backslash" | "mysql" => Ok(SourceEscapes::Backslash),
            "standard" | "doubled" => Ok(SourceEscapes::Standard),
            _ => Err(format!(
                "Unknown escape convention: {}. Valid options: backslash, standard",
                s
            )),
        }
    }
}

impl std::fmt::Display for SourceEscapes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceEscapes::Backslash => write!(f, "backslash"),
            SourceEscapes::Standard => write!(f, "standard"),
        }
    }
}

/// The kind of quoted span the scanner is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Single,
    Double,
    Backtick,
}

impl Quote {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '\'' => Some(Quote::Single),
            '"' => Some(Quote::Double),
            '`' => Some(Quote::Backtick),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Quote::Single => '\'',
            Quote::Double => '"',
            Quote::Backtick => '`',
        }
    }
}

/// Streaming scanner state. Feed characters in order with [`QuoteScanner::advance`].
///
/// Doubled quotes (`''`) need no lookahead: the first quote closes the span
/// and the second reopens it, so no character is ever observed "outside" in
/// between.
#[derive(Debug, Clone)]
pub struct QuoteScanner {
    escapes: SourceEscapes,
    quote: Option<Quote>,
    escaped: bool,
    depth: i32,
}

impl QuoteScanner {
    pub fn new(escapes: SourceEscapes) -> Self {
        Self {
            escapes,
            quote: None,
            escaped: false,
            depth: 0,
        }
    }

    /// Consume one character. Returns `true` when it is a statement terminator.
    pub fn advance(&mut self, c: char) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }

        match self.quote {
            Some(q) => {
                if c == '\\' && q != Quote::Backtick && self.escapes == SourceEscapes::Backslash {
                    self.escaped = true;
                } else if c == q.as_char() {
                    self.quote = None;
                }
                false
            }
            None => {
                if let Some(q) = Quote::from_char(c) {
                    self.quote = Some(q);
                    return false;
                }
                match c {
                    '(' => self.depth += 1,
                    ')' => self.depth -= 1,
                    ';' => return true,
                    _ => {}
                }
                false
            }
        }
    }

    /// Currently inside a string literal (not a backtick identifier)
    pub fn in_literal(&self) -> bool {
        matches!(self.quote, Some(Quote::Single | Quote::Double))
    }

    /// Parenthesis depth outside quoted spans
    pub fn depth(&self) -> i32 {
        self.depth
    }

    /// Balanced: no open quote and parentheses closed
    pub fn is_balanced(&self) -> bool {
        self.quote.is_none() && self.depth == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminators(input: &str, escapes: SourceEscapes) -> Vec<usize> {
        let mut scanner = QuoteScanner::new(escapes);
        input
            .char_indices()
            .filter(|&(_, c)| scanner.advance(c))
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_terminator_outside_literal() {
        let sql = "INSERT INTO t VALUES (1, 'a');";
        assert_eq!(terminators(sql, SourceEscapes::Backslash), vec![sql.len() - 1]);
    }

    #[test]
    fn test_terminator_inside_literal_ignored() {
        let sql = "INSERT INTO t VALUES (1, 'x); y');";
        assert_eq!(terminators(sql, SourceEscapes::Backslash), vec![sql.len() - 1]);
    }

    #[test]
    fn test_backslash_quote_stays_inside() {
        let sql = r"INSERT INTO t VALUES ('it\'s; fine');";
        assert_eq!(terminators(sql, SourceEscapes::Backslash), vec![sql.len() - 1]);
    }

    #[test]
    fn test_standard_escapes_backslash_is_content() {
        // Under standard rules the literal ends right after the backslash
        let sql = r"INSERT INTO t VALUES ('C:\'); SELECT 1;";
        let found = terminators(sql, SourceEscapes::Standard);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_doubled_quotes() {
        let sql = "INSERT INTO t VALUES ('O''Brien;');";
        assert_eq!(terminators(sql, SourceEscapes::Standard), vec![sql.len() - 1]);
        assert_eq!(terminators(sql, SourceEscapes::Backslash), vec![sql.len() - 1]);
    }

    #[test]
    fn test_depth_tracking() {
        let mut scanner = QuoteScanner::new(SourceEscapes::Backslash);
        for c in "VALUES ((1), ')'".chars() {
            scanner.advance(c);
        }
        assert_eq!(scanner.depth(), 1);
        assert!(!scanner.is_balanced());
        scanner.advance(')');
        assert!(scanner.is_balanced());
    }

    #[test]
    fn test_backtick_semicolon_ignored() {
        let sql = "INSERT INTO `we;ird` VALUES (1);";
        assert_eq!(terminators(sql, SourceEscapes::Backslash), vec![sql.len() - 1]);
    }

    #[test]
    fn test_escape_parse() {
        assert_eq!("BACKSLASH".parse::<SourceEscapes>().unwrap(), SourceEscapes::Backslash);
        assert_eq!("standard".parse::<SourceEscapes>().unwrap(), SourceEscapes::Standard);
        assert!("weird".parse::<SourceEscapes>().is_err());
    }
}
