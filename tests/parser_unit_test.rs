//! Unit tests for segmentation and VALUES parsing.

use dump_gen::{mysql_quote, DumpConfig, DumpGenerator, DumpStyle, TRICKY_STRINGS};
use mysql2pg::parser::values::decode_literal;
use mysql2pg::parser::{
    Field, IdentifierMode, Segmenter, SourceEscapes, Statement, ValueTuple, ValuesClause,
};

fn segment(sql: &str) -> Vec<Statement> {
    let mut seg = Segmenter::from_reader(sql.as_bytes());
    let mut out = Vec::new();
    while let Some(stmt) = seg.read_statement().unwrap() {
        out.push(stmt);
    }
    out
}

#[test]
fn test_terminator_lookalike_does_not_truncate() {
    let sql = "INSERT INTO notes VALUES (1, 'he said \"); \" and left'), (2, 'next');\nINSERT INTO notes VALUES (3, 'x');\n";
    let stmts = segment(sql);
    assert_eq!(stmts.len(), 2);
    assert!(stmts[0].complete);
    assert!(stmts[0].text.ends_with("(2, 'next');"));

    let clause = ValuesClause::split(&stmts[0].text, SourceEscapes::Backslash).unwrap();
    assert_eq!(clause.row_count(), 2);
}

#[test]
fn test_tuple_count_is_boundaries_plus_one() {
    let sql = "INSERT INTO t VALUES (1,'a),(b'),(2,'c'),\n(3,NULL),(4,'d\\'),(e');";
    let clause = ValuesClause::split(sql, SourceEscapes::Backslash).unwrap();
    let boundaries = clause
        .tuples
        .iter()
        .filter(|t| !t.separator.is_empty())
        .count();
    assert_eq!(clause.row_count(), boundaries + 1);
    assert_eq!(clause.row_count(), 4);
}

#[test]
fn test_directives_and_definitions_discarded() {
    let sql = r#"-- Host: localhost
/*!40101 SET NAMES utf8mb4 */;
SET time_zone = "+00:00";
START TRANSACTION;
DROP TABLE IF EXISTS `users`;
CREATE TABLE `users` (
  `id` int NOT NULL,
  UNIQUE KEY `email` (`email`),
  CONSTRAINT `fk` FOREIGN KEY (`x`) REFERENCES `y` (`id`)
) ENGINE=InnoDB;
LOCK TABLES `users` WRITE;
INSERT INTO `users` VALUES (1);
UNLOCK TABLES;
ALTER TABLE `users`
  ADD PRIMARY KEY (`id`);
COMMIT;
"#;
    let mut seg = Segmenter::from_reader(sql.as_bytes());
    let stmt = seg.read_statement().unwrap().unwrap();
    assert_eq!(stmt.text, "INSERT INTO users VALUES (1);");
    assert!(seg.read_statement().unwrap().is_none());

    let stats = seg.stats();
    assert_eq!(stats.statements, 1);
    assert_eq!(stats.comment_lines, 1);
    assert!(stats.directive_lines >= 5);
    assert!(stats.definition_lines >= 7);
}

#[test]
fn test_phpmyadmin_multiline_statement() {
    let sql = "INSERT INTO `users` (`id`, `bio`) VALUES\n(1, 'first\nsecond'),\n(2, NULL);\n";
    let stmts = segment(sql);
    assert_eq!(stmts.len(), 1);
    assert_eq!(
        stmts[0].text,
        "INSERT INTO users (id, bio) VALUES\n(1, 'first\nsecond'),\n(2, NULL);"
    );
}

#[test]
fn test_quote_mode_keeps_case_sensitive_names() {
    let mut seg = Segmenter::from_reader(&b"INSERT INTO `Order` (`Id`) VALUES (1);"[..])
        .with_identifiers(IdentifierMode::Quote);
    let stmt = seg.read_statement().unwrap().unwrap();
    assert_eq!(stmt.table, "Order");
    assert!(stmt.text.starts_with("INSERT INTO \"Order\" (\"Id\")"));
}

#[test]
fn test_tricky_strings_decode_to_original() {
    for s in TRICKY_STRINGS {
        let quoted = mysql_quote(s, false);
        let (decoded, end) = decode_literal(&quoted, SourceEscapes::Backslash).unwrap();
        assert_eq!(&decoded, s, "round trip of {:?}", s);
        assert_eq!(end, quoted.len());
    }
}

#[test]
fn test_generated_dump_segments_fully() {
    for style in [DumpStyle::Mysqldump, DumpStyle::PhpMyAdmin] {
        let (sql, summary) = DumpGenerator::new(DumpConfig {
            style,
            raw_newlines: style == DumpStyle::PhpMyAdmin,
            tricky_ratio: 0.5,
            ..Default::default()
        })
        .generate_string();

        let stmts = segment(&sql);
        assert_eq!(stmts.len(), summary.total_statements());

        let mut rows = 0;
        for stmt in &stmts {
            assert!(stmt.complete, "incomplete: {}", stmt.text);
            let clause = ValuesClause::split(&stmt.text, SourceEscapes::Backslash).unwrap();
            for span in &clause.tuples {
                let tuple = ValueTuple::parse(span.raw, SourceEscapes::Backslash).unwrap();
                assert_eq!(tuple.fields.len(), 6);
                assert!(matches!(tuple.fields[0], Field::Bare(_)));
            }
            rows += clause.row_count();
        }
        assert_eq!(rows, summary.total_rows());
    }
}

#[test]
fn test_standard_escapes_treat_backslash_as_content() {
    let sql = r"INSERT INTO paths VALUES (1, 'C:\temp\'), (2, 'D:\');";
    let mut seg =
        Segmenter::from_reader(sql.as_bytes()).with_escapes(SourceEscapes::Standard);
    let stmt = seg.read_statement().unwrap().unwrap();
    assert!(stmt.complete);

    let clause = ValuesClause::split(&stmt.text, SourceEscapes::Standard).unwrap();
    let tuple = ValueTuple::parse(clause.tuples[0].raw, SourceEscapes::Standard).unwrap();
    assert_eq!(tuple.fields[1], Field::Text(r"C:\temp\".to_string()));
}
