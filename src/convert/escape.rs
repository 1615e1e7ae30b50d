//! Literal re-escaping for INSERT statements.
//!
//! Every string literal is decoded once with the source escape convention and
//! encoded once as a PostgreSQL standard literal: single quotes, embedded
//! quotes doubled, backslashes as plain content.

use crate::parser::{EscapeError, Field, SourceEscapes, ValueTuple, ValuesClause};

/// Encode content as a standard single-quoted literal.
pub fn quote_literal(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + 2);
    out.push('\'');
    for c in content.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

pub fn render_field(field: &Field, out: &mut String) {
    match field {
        Field::Null => out.push_str("NULL"),
        Field::Bare(text) => out.push_str(text),
        Field::Text(content) => out.push_str(&quote_literal(content)),
    }
}

/// `(a, b, c)` with fields joined by `, `
pub fn render_tuple(tuple: &ValueTuple) -> String {
    let mut out = String::with_capacity(tuple.fields.len() * 8);
    out.push('(');
    for (i, field) in tuple.fields.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        render_field(field, &mut out);
    }
    out.push(')');
    out
}

/// A tuple that was written through with its source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleFailure {
    /// 0-based position within the VALUES clause
    pub index: usize,
    pub error: EscapeError,
}

/// Result of re-escaping one INSERT statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReescapedInsert<'a> {
    pub head: &'a str,
    /// Tuples with their original separators
    pub body: String,
    pub tail: &'a str,
    pub rows: usize,
    pub failures: Vec<TupleFailure>,
}

impl ReescapedInsert<'_> {
    pub fn to_sql(&self) -> String {
        let mut sql = String::with_capacity(self.head.len() + self.body.len() + self.tail.len());
        sql.push_str(self.head);
        sql.push_str(&self.body);
        sql.push_str(self.tail);
        sql
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Re-escape every literal in an INSERT statement.
///
/// Fails only when the VALUES clause itself cannot be split; a tuple that
/// cannot be parsed keeps its original text and is listed in `failures`.
pub fn reescape_insert(
    stmt: &str,
    escapes: SourceEscapes,
) -> Result<ReescapedInsert<'_>, EscapeError> {
    let clause = ValuesClause::split(stmt, escapes)?;
    let mut body = String::with_capacity(stmt.len() - clause.head.len());
    let mut failures = Vec::new();

    for (index, span) in clause.tuples.iter().enumerate() {
        body.push_str(span.separator);
        match ValueTuple::parse(span.raw, escapes) {
            Ok(tuple) => body.push_str(&render_tuple(&tuple)),
            Err(error) => {
                body.push_str(span.raw);
                failures.push(TupleFailure { index, error });
            }
        }
    }

    Ok(ReescapedInsert {
        head: clause.head,
        body,
        tail: clause.tail,
        rows: clause.row_count(),
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BS: SourceEscapes = SourceEscapes::Backslash;
    const STD: SourceEscapes = SourceEscapes::Standard;

    fn convert(sql: &str, escapes: SourceEscapes) -> String {
        reescape_insert(sql, escapes).unwrap().to_sql()
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
        assert_eq!(quote_literal(r"C:\dir"), r"'C:\dir'");
        assert_eq!(quote_literal(""), "''");
    }

    #[test]
    fn test_backslash_quote_becomes_doubled() {
        assert_eq!(
            convert(r"INSERT INTO t VALUES (1,'O\'Brien');", BS),
            "INSERT INTO t VALUES (1, 'O''Brien');"
        );
    }

    #[test]
    fn test_already_doubled_not_doubled_again() {
        let sql = "INSERT INTO users (id, name) VALUES (1, 'O''Brien'), (2, 'Mc''Call');";
        assert_eq!(convert(sql, BS), sql);
        assert_eq!(convert(sql, STD), sql);
    }

    #[test]
    fn test_double_quoted_string_becomes_single() {
        assert_eq!(
            convert(r#"INSERT INTO t VALUES ("it's");"#, BS),
            "INSERT INTO t VALUES ('it''s');"
        );
    }

    #[test]
    fn test_escaped_backslash_and_newline() {
        assert_eq!(
            convert(r"INSERT INTO t VALUES ('a\\b\nc');", BS),
            "INSERT INTO t VALUES ('a\\b\nc');"
        );
    }

    #[test]
    fn test_separators_preserved() {
        let out = convert("INSERT INTO t VALUES (1,'a'),\n(2,NULL);", BS);
        assert_eq!(out, "INSERT INTO t VALUES (1, 'a'),\n(2, NULL);");
    }

    #[test]
    fn test_idempotent_standard() {
        let sql = r"INSERT INTO t VALUES (1,'x\'), (2, 'it''s'), (3, 'C:\dir\''s');";
        let once = convert(sql, STD);
        assert_eq!(
            once,
            r"INSERT INTO t VALUES (1, 'x\'), (2, 'it''s'), (3, 'C:\dir\''s');"
        );
        assert_eq!(convert(&once, STD), once);
    }

    #[test]
    fn test_failed_tuple_passes_through() {
        let sql = r"INSERT INTO t VALUES (1,'ok'),(2,'bad\0'),(3,CONCAT('a','b'));";
        let result = reescape_insert(sql, BS).unwrap();
        assert_eq!(result.rows, 3);
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.failures[0].index, 1);
        assert_eq!(result.failures[0].error, EscapeError::NulByte);
        assert!(result.to_sql().contains(r"(2,'bad\0')"));
        assert!(result.to_sql().starts_with("INSERT INTO t VALUES (1, 'ok')"));
    }

    #[test]
    fn test_terminator_lookalike_in_literal() {
        let sql = r#"INSERT INTO t VALUES (1,'x"); DROP TABLE t; --');"#;
        let result = reescape_insert(sql, BS).unwrap();
        assert!(result.is_clean());
        assert_eq!(result.rows, 1);
        assert_eq!(result.tail, ";");
    }
}
