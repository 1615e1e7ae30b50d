//! Statement segmentation for MySQL dumps.
//!
//! The [`Segmenter`] walks the dump line by line, throws away comments,
//! session directives and schema definitions, and glues the physical lines of
//! each `INSERT` back together. Termination is decided by a quote-aware
//! scanner, so `);` inside a string literal never ends a statement.

pub mod scan;
pub mod values;

pub use scan::{QuoteScanner, SourceEscapes};
pub use values::{EscapeError, Field, TupleSpan, ValueTuple, ValuesClause};

use crate::loader::{DumpLines, Line};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::BufRead;

static INSERT_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*INSERT\s+(?:IGNORE\s+)?INTO\b").unwrap());

/// What to do with MySQL backtick identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierMode {
    /// Drop the backticks: `users` → users
    #[default]
    Strip,
    /// Convert to standard quoting: `users` → "users"
    Quote,
}

impl IdentifierMode {
    /// Render an identifier for the destination script
    pub fn quote<'a>(&self, name: &'a str) -> Cow<'a, str> {
        match self {
            IdentifierMode::Strip => Cow::Borrowed(name),
            IdentifierMode::Quote => {
                let parts: Vec<String> = name
                    .split('.')
                    .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
                    .collect();
                Cow::Owned(parts.join("."))
            }
        }
    }
}

impl std::str::FromStr for IdentifierMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strip" => Ok(IdentifierMode::Strip),
            "quote" => Ok(IdentifierMode::Quote),
            _ => Err(format!(
                "Unknown identifier mode: {}. Valid options: strip, quote",
                s
            )),
        }
    }
}

impl std::fmt::Display for IdentifierMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentifierMode::Strip => write!(f, "strip"),
            IdentifierMode::Quote => write!(f, "quote"),
        }
    }
}

/// One logical INSERT statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Target table (identifier quotes removed)
    pub table: String,
    /// Statement text including the terminating `;` when complete
    pub text: String,
    /// Terminated outside any literal with balanced parentheses
    pub complete: bool,
    /// 1-based line number where the statement starts
    pub line: usize,
}

/// Classification of a line that is not part of an INSERT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Comment,
    Directive,
    Definition,
    Other,
    InsertStart,
}

/// Counters for the lines the segmenter discarded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentStats {
    pub lines_read: u64,
    pub blank_lines: u64,
    pub comment_lines: u64,
    pub directive_lines: u64,
    pub definition_lines: u64,
    pub other_lines: u64,
    pub statements: u64,
    pub incomplete_statements: u64,
}

impl SegmentStats {
    fn record(&mut self, kind: LineKind) {
        match kind {
            LineKind::Blank => self.blank_lines += 1,
            LineKind::Comment => self.comment_lines += 1,
            LineKind::Directive => self.directive_lines += 1,
            LineKind::Definition => self.definition_lines += 1,
            LineKind::Other => self.other_lines += 1,
            LineKind::InsertStart => {}
        }
    }
}

pub struct Segmenter<R: BufRead> {
    lines: DumpLines<R>,
    escapes: SourceEscapes,
    identifiers: IdentifierMode,
    /// Text left on a line after a statement terminator
    pending: Option<Line>,
    in_block_comment: bool,
    in_definition: bool,
    /// Between `DELIMITER ;;` and `DELIMITER ;`
    in_routine: bool,
    stats: SegmentStats,
}

impl<R: BufRead> Segmenter<R> {
    pub fn new(lines: DumpLines<R>) -> Self {
        Self {
            lines,
            escapes: SourceEscapes::default(),
            identifiers: IdentifierMode::default(),
            pending: None,
            in_block_comment: false,
            in_definition: false,
            in_routine: false,
            stats: SegmentStats::default(),
        }
    }

    /// Segment an in-memory reader directly
    pub fn from_reader(reader: R) -> Self {
        Self::new(DumpLines::new(reader))
    }

    pub fn with_escapes(mut self, escapes: SourceEscapes) -> Self {
        self.escapes = escapes;
        self
    }

    pub fn with_identifiers(mut self, identifiers: IdentifierMode) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// Read the next INSERT statement, skipping everything else.
    pub fn read_statement(&mut self) -> std::io::Result<Option<Statement>> {
        loop {
            let line = match self.next_line()? {
                Some(line) => line,
                None => return Ok(None),
            };

            match self.classify(&line.text) {
                (LineKind::InsertStart, rest) => {
                    let start = Line {
                        number: line.number,
                        text: rest.to_string(),
                    };
                    return self.collect_statement(start).map(Some);
                }
                (kind, _) => self.stats.record(kind),
            }
        }
    }

    pub fn stats(&self) -> &SegmentStats {
        &self.stats
    }

    /// Line numbers that were decoded with replacement characters
    pub fn lossy_lines(&self) -> &[usize] {
        self.lines.lossy_lines()
    }

    fn next_line(&mut self) -> std::io::Result<Option<Line>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let line = self.lines.next_line()?;
        if line.is_some() {
            self.stats.lines_read += 1;
        }
        Ok(line)
    }

    /// Classify one line, returning the text an INSERT would start from.
    fn classify<'t>(&mut self, text: &'t str) -> (LineKind, &'t str) {
        let t = text.trim();

        // Stored routines and triggers: everything up to `DELIMITER ;` is DDL
        if starts_with_keyword(t, "DELIMITER") {
            let delimiter = t["DELIMITER".len()..].trim();
            self.in_routine = !delimiter.is_empty() && delimiter != ";";
            if !self.in_routine {
                self.in_block_comment = false;
                self.in_definition = false;
            }
            return (LineKind::Directive, t);
        }
        if self.in_routine {
            return (LineKind::Definition, t);
        }

        if self.in_block_comment {
            let end = match t.find("*/") {
                Some(end) => end,
                None => return (LineKind::Comment, t),
            };
            let (rest, open) = skip_block_comments(t[end + 2..].trim_start());
            self.in_block_comment = open;
            if is_statement_end(rest) {
                return (LineKind::Comment, rest);
            }
            return self.classify_statement(rest);
        }

        if t.is_empty() {
            return (LineKind::Blank, t);
        }

        if t.starts_with("/*") {
            let (rest, open) = skip_block_comments(t);
            self.in_block_comment = open;
            if is_statement_end(rest) {
                let kind = if t.starts_with("/*!") {
                    LineKind::Directive
                } else {
                    LineKind::Comment
                };
                return (kind, rest);
            }
            return self.classify_statement(rest);
        }

        self.classify_statement(t)
    }

    fn classify_statement<'t>(&mut self, t: &'t str) -> (LineKind, &'t str) {
        if t.starts_with("--") || t.starts_with('#') {
            return (LineKind::Comment, t);
        }

        if self.in_definition {
            if t.ends_with(';') {
                self.in_definition = false;
            }
            return (LineKind::Definition, t);
        }

        if INSERT_START_RE.is_match(t) {
            return (LineKind::InsertStart, t);
        }

        const DEFINITIONS: &[&str] = &["CREATE", "DROP", "ALTER", "RENAME", "TRUNCATE"];
        if DEFINITIONS.iter().any(|kw| starts_with_keyword(t, kw)) {
            if !t.ends_with(';') {
                self.in_definition = true;
            }
            return (LineKind::Definition, t);
        }

        const DEFINITION_PARTS: &[&str] = &[
            "KEY",
            "PRIMARY KEY",
            "UNIQUE KEY",
            "UNIQUE INDEX",
            "FULLTEXT",
            "INDEX",
            "CONSTRAINT",
        ];
        if t.starts_with(')') || DEFINITION_PARTS.iter().any(|kw| starts_with_keyword(t, kw)) {
            return (LineKind::Definition, t);
        }

        const DIRECTIVES: &[&str] = &[
            "SET",
            "START TRANSACTION",
            "BEGIN",
            "COMMIT",
            "ROLLBACK",
            "LOCK TABLES",
            "UNLOCK TABLES",
            "USE",
        ];
        if t == ";" || DIRECTIVES.iter().any(|kw| starts_with_keyword(t, kw)) {
            return (LineKind::Directive, t);
        }

        (LineKind::Other, t)
    }

    fn collect_statement(&mut self, first: Line) -> std::io::Result<Statement> {
        let start_line = first.number;
        let mut scanner = QuoteScanner::new(self.escapes);
        let mut text = String::new();
        let mut current = Line {
            number: first.number,
            text: first.text.trim_start().to_string(),
        };

        loop {
            let terminator = current
                .text
                .char_indices()
                .find(|&(_, c)| scanner.advance(c))
                .map(|(i, _)| i);

            if let Some(idx) = terminator {
                text.push_str(&current.text[..=idx]);
                let rest = current.text[idx + 1..].trim();
                if !rest.is_empty() {
                    self.pending = Some(Line {
                        number: current.number,
                        text: rest.to_string(),
                    });
                }
                let complete = scanner.is_balanced();
                return Ok(self.finish_statement(text, start_line, complete));
            }

            text.push_str(&current.text);
            match self.next_line()? {
                Some(next) => {
                    text.push('\n');
                    scanner.advance('\n');
                    current = next;
                }
                None => return Ok(self.finish_statement(text, start_line, false)),
            }
        }
    }

    fn finish_statement(&mut self, text: String, line: usize, complete: bool) -> Statement {
        self.stats.statements += 1;
        if !complete {
            self.stats.incomplete_statements += 1;
        }

        let text = normalize_identifiers(text, self.escapes, self.identifiers);
        let table = extract_insert_table(&text).unwrap_or_default();

        Statement {
            table,
            text,
            complete,
            line,
        }
    }
}

/// Skip leading `/* ... */` comments. The flag is set when the last one
/// is still open at the end of the line.
fn skip_block_comments(mut text: &str) -> (&str, bool) {
    while let Some(body) = text.strip_prefix("/*") {
        match body.find("*/") {
            Some(end) => text = body[end + 2..].trim_start(),
            None => return ("", true),
        }
    }
    (text, false)
}

/// Nothing left but terminators (`*/;` or `END */;;` tails)
fn is_statement_end(text: &str) -> bool {
    text.trim_start_matches(|c: char| c == ';' || c.is_whitespace())
        .is_empty()
}

/// Case-insensitive keyword prefix match that respects word boundaries.
fn starts_with_keyword(text: &str, keyword: &str) -> bool {
    let bytes = text.as_bytes();
    let kw = keyword.as_bytes();
    if bytes.len() < kw.len() || !bytes[..kw.len()].eq_ignore_ascii_case(kw) {
        return false;
    }
    bytes
        .get(kw.len())
        .map_or(true, |&b| !(b.is_ascii_alphanumeric() || b == b'_'))
}

/// Remove or convert backtick identifier quotes outside string literals.
///
/// Backticks inside literals are data and are left alone.
pub fn normalize_identifiers(text: String, escapes: SourceEscapes, mode: IdentifierMode) -> String {
    if memchr::memchr(b'`', text.as_bytes()).is_none() {
        return text;
    }

    let mut scanner = QuoteScanner::new(escapes);
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let in_literal = scanner.in_literal();
        scanner.advance(c);
        if c == '`' && !in_literal {
            if mode == IdentifierMode::Quote {
                out.push('"');
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Extract the target table from an INSERT header.
///
/// Qualified names keep their schema: `"db"."users"` gives `db.users`.
pub fn extract_insert_table(stmt: &str) -> Option<String> {
    let m = INSERT_START_RE.find(stmt)?;
    extract_table_name(stmt.as_bytes(), m.end()).map(|(name, _)| name)
}

/// Column list of an INSERT header, or None for positional inserts.
pub fn insert_columns(stmt: &str) -> Option<Vec<String>> {
    let m = INSERT_START_RE.find(stmt)?;
    let bytes = stmt.as_bytes();
    let (_, mut i) = extract_table_name(bytes, m.end())?;

    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if bytes.get(i) != Some(&b'(') {
        return None;
    }
    let close = i + memchr::memchr(b')', &bytes[i..])?;

    Some(
        stmt[i + 1..close]
            .split(',')
            .map(|c| c.trim().trim_matches(|q| q == '"' || q == '`').to_string())
            .filter(|c| !c.is_empty())
            .collect(),
    )
}

/// Table name and the offset just past it
fn extract_table_name(stmt: &[u8], offset: usize) -> Option<(String, usize)> {
    let mut i = offset;

    while i < stmt.len() && stmt[i].is_ascii_whitespace() {
        i += 1;
    }

    let mut name = String::new();
    loop {
        let (part, next) = read_identifier(stmt, i)?;
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(&part);
        i = next;

        if stmt.get(i) == Some(&b'.') {
            i += 1;
        } else {
            break;
        }
    }

    Some((name, i))
}

#[inline]
fn read_identifier(stmt: &[u8], start: usize) -> Option<(String, usize)> {
    let first = *stmt.get(start)?;

    if first == b'`' || first == b'"' {
        let len = memchr::memchr(first, &stmt[start + 1..])?;
        let end = start + 1 + len;
        return Some((String::from_utf8_lossy(&stmt[start + 1..end]).into_owned(), end + 1));
    }

    let mut i = start;
    while i < stmt.len() {
        let b = stmt[i];
        if b.is_ascii_whitespace() || matches!(b, b'(' | b';' | b',' | b'.') {
            break;
        }
        i += 1;
    }

    if i > start {
        Some((String::from_utf8_lossy(&stmt[start..i]).into_owned(), i))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(sql: &str) -> Vec<Statement> {
        let mut seg = Segmenter::from_reader(sql.as_bytes());
        let mut out = Vec::new();
        while let Some(stmt) = seg.read_statement().unwrap() {
            out.push(stmt);
        }
        out
    }

    #[test]
    fn test_extract_insert_table() {
        assert_eq!(
            extract_insert_table("INSERT INTO users (id) VALUES (1);").as_deref(),
            Some("users")
        );
        assert_eq!(
            extract_insert_table("insert ignore into \"Order\" VALUES (1);").as_deref(),
            Some("Order")
        );
        assert_eq!(extract_insert_table("UPDATE users SET a = 1;"), None);
    }

    #[test]
    fn test_extract_qualified_table() {
        assert_eq!(
            extract_insert_table("INSERT INTO \"db\".\"users\" (\"id\") VALUES (1);").as_deref(),
            Some("db.users")
        );
        assert_eq!(
            extract_insert_table("INSERT INTO db.users VALUES (1);").as_deref(),
            Some("db.users")
        );
        assert_eq!(IdentifierMode::Quote.quote("db.users"), "\"db\".\"users\"");
    }

    #[test]
    fn test_insert_columns() {
        assert_eq!(
            insert_columns("INSERT INTO event_attendees (event_id, \"user_id\") VALUES (1, 2);"),
            Some(vec!["event_id".to_string(), "user_id".to_string()])
        );
        assert_eq!(insert_columns("INSERT INTO t(id) VALUES (1);"), Some(vec!["id".to_string()]));
        assert_eq!(insert_columns("INSERT INTO t VALUES (1, 2);"), None);
    }

    #[test]
    fn test_mysqldump_trigger_block_discarded() {
        let sql = r#"INSERT INTO `t` VALUES (1);
/*!50003 SET @saved_cs_client      = @@character_set_client */ ;
/*!50003 SET character_set_client  = utf8mb4 */ ;
DELIMITER ;;
/*!50003 CREATE*/ /*!50017 DEFINER=`root`@`localhost`*/ /*!50003 TRIGGER `t_audit` AFTER INSERT ON `t` FOR EACH ROW BEGIN
INSERT INTO audit (t_id) VALUES (NEW.id);
END */;;
DELIMITER ;
/*!50003 SET character_set_client  = @saved_cs_client */ ;
INSERT INTO `t` VALUES (2);
"#;
        let stmts = segment(sql);
        let tables: Vec<&str> = stmts.iter().map(|s| s.table.as_str()).collect();
        assert_eq!(tables, vec!["t", "t"]);
        assert_eq!(stmts[1].text, "INSERT INTO t VALUES (2);");
    }

    #[test]
    fn test_trigger_comment_without_delimiter() {
        let sql = "/*!50003 CREATE*/ /*!50017 DEFINER=`root`@`%`*/ /*!50003 TRIGGER `x` BEFORE INSERT ON `t` FOR EACH ROW BEGIN\nINSERT INTO audit VALUES (NEW.id);\nEND */;\nINSERT INTO t VALUES (1);\n";
        let stmts = segment(sql);
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].table, "t");
    }

    #[test]
    fn test_stored_procedure_delimiter_block() {
        let sql = "DELIMITER $$\nCREATE PROCEDURE fill()\nBEGIN\n  INSERT INTO logs VALUES (1);\nEND$$\nDELIMITER ;\nINSERT INTO users VALUES (1);\n";
        let mut seg = Segmenter::from_reader(sql.as_bytes());
        let stmt = seg.read_statement().unwrap().unwrap();
        assert_eq!(stmt.table, "users");
        assert!(seg.read_statement().unwrap().is_none());
        assert_eq!(seg.stats().definition_lines, 4);
    }

    #[test]
    fn test_insert_after_closed_comment() {
        let stmts = segment("/* data */ INSERT INTO `t` VALUES (1);\n/*!40000 ALTER TABLE `t` ENABLE KEYS */;\n");
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].text, "INSERT INTO t VALUES (1);");
        assert_eq!(stmts[0].line, 1);
    }

    #[test]
    fn test_single_line_statement() {
        let stmts = segment("INSERT INTO `t` VALUES (1,'a');\n");
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].table, "t");
        assert_eq!(stmts[0].text, "INSERT INTO t VALUES (1,'a');");
        assert!(stmts[0].complete);
        assert_eq!(stmts[0].line, 1);
    }

    #[test]
    fn test_multi_line_literal_preserved() {
        let sql = "INSERT INTO notes VALUES (1, 'line one\nline two');\n";
        let stmts = segment(sql);
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].text, "INSERT INTO notes VALUES (1, 'line one\nline two');");
    }

    #[test]
    fn test_two_statements_on_one_line() {
        let stmts = segment("INSERT INTO a VALUES (1); INSERT INTO b VALUES (2);");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1].table, "b");
        assert_eq!(stmts[1].text, "INSERT INTO b VALUES (2);");
    }

    #[test]
    fn test_unterminated_statement_is_incomplete() {
        let stmts = segment("INSERT INTO a VALUES (1, 'never closed);\n");
        assert_eq!(stmts.len(), 1);
        assert!(!stmts[0].complete);
    }

    #[test]
    fn test_backticks_in_literal_survive() {
        let stmts = segment("INSERT INTO `t` (`a`) VALUES ('use `code` here');");
        assert_eq!(stmts[0].text, "INSERT INTO t (a) VALUES ('use `code` here');");
    }

    #[test]
    fn test_quote_identifier_mode() {
        let mut seg = Segmenter::from_reader(&b"INSERT INTO `order` (`id`) VALUES (1);"[..])
            .with_identifiers(IdentifierMode::Quote);
        let stmt = seg.read_statement().unwrap().unwrap();
        assert_eq!(stmt.text, "INSERT INTO \"order\" (\"id\") VALUES (1);");
        assert_eq!(stmt.table, "order");
    }

    #[test]
    fn test_create_table_body_is_definition() {
        let sql = "CREATE TABLE `t` (\n  `id` int NOT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB;\n";
        let mut seg = Segmenter::from_reader(sql.as_bytes());
        assert!(seg.read_statement().unwrap().is_none());
        assert_eq!(seg.stats().definition_lines, 4);
        assert_eq!(seg.stats().statements, 0);
    }

    #[test]
    fn test_block_comment_spanning_lines() {
        let sql = "/*\nINSERT INTO fake VALUES (1);\n*/\nINSERT INTO real VALUES (2);\n";
        let stmts = segment(sql);
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].table, "real");
        assert_eq!(stmts[0].line, 4);
    }

    #[test]
    fn test_keyword_boundary() {
        assert!(starts_with_keyword("SET NAMES utf8;", "SET"));
        assert!(!starts_with_keyword("SETTINGS", "SET"));
        assert!(starts_with_keyword("lock tables `t` write;", "LOCK TABLES"));
    }

    #[test]
    fn test_identifier_mode_quote_fn() {
        assert_eq!(IdentifierMode::Strip.quote("users"), "users");
        assert_eq!(IdentifierMode::Quote.quote("users"), "\"users\"");
        assert_eq!("QUOTE".parse::<IdentifierMode>().unwrap(), IdentifierMode::Quote);
    }
}
