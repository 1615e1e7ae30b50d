//! Deterministic MySQL dump generator for mysql2pg tests and benchmarks.
//!
//! Produces mysqldump- or phpMyAdmin-shaped dumps whose string columns are
//! salted with awkward values: embedded quotes, backslashes, statement
//! terminators inside literals and multi-line text.
//!
//! # Example
//!
//! ```rust
//! use dump_gen::{DumpConfig, DumpGenerator};
//!
//! let mut generator = DumpGenerator::new(DumpConfig::default());
//! let (sql, summary) = generator.generate_string();
//! assert_eq!(summary.total_rows(), 3 * 20);
//! assert!(sql.contains("INSERT INTO `users`"));
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::{self, Write};

/// Values that tend to break naive quote handling
pub const TRICKY_STRINGS: &[&str] = &[
    "O'Brien",
    "Mc'Call",
    "it's \"quoted\"",
    "semi; colon",
    "x'); DROP TABLE users; --",
    "C:\\path\\to\\file",
    "line one\nline two",
    "tab\there",
    "VALUES (1, 2), (3, 4)",
    "backtick `here`",
    "caf\u{e9} na\u{ef}ve \u{2615}",
    "ends with backslash \\",
    "''",
];

const TABLE_NAMES: &[&str] = &[
    "users",
    "files",
    "events",
    "notifications",
    "admin_users",
    "chat_sessions",
    "event_tickets",
    "support_categories",
];

const FIRST_NAMES: &[&str] = &["Alice", "Bob", "Carol", "Dave", "Erin", "Frank", "Grace"];

/// Layout of the generated dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpStyle {
    /// One physical line per INSERT, tuples joined with `,`
    Mysqldump,
    /// Column list, one tuple per line joined with `,\n`
    PhpMyAdmin,
}

impl std::str::FromStr for DumpStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysqldump" => Ok(DumpStyle::Mysqldump),
            "phpmyadmin" | "pma" => Ok(DumpStyle::PhpMyAdmin),
            _ => Err(format!(
                "Unknown style: {}. Use mysqldump or phpmyadmin",
                s
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DumpConfig {
    pub seed: u64,
    pub tables: usize,
    pub rows_per_table: usize,
    /// Rows per INSERT statement
    pub batch_size: usize,
    pub style: DumpStyle,
    /// Probability that a text value is taken from [`TRICKY_STRINGS`]
    pub tricky_ratio: f64,
    /// Write newlines inside literals raw instead of as `\n`
    pub raw_newlines: bool,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            tables: 3,
            rows_per_table: 20,
            batch_size: 8,
            style: DumpStyle::Mysqldump,
            tricky_ratio: 0.3,
            raw_newlines: false,
        }
    }
}

/// What was generated for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub name: String,
    pub rows: usize,
    pub statements: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpSummary {
    pub tables: Vec<TableSummary>,
}

impl DumpSummary {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }

    pub fn total_statements(&self) -> usize {
        self.tables.iter().map(|t| t.statements).sum()
    }
}

/// Escape text the way mysqldump does and wrap it in single quotes.
pub fn mysql_quote(s: &str, raw_newlines: bool) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' if !raw_newlines => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{1a}' => out.push_str("\\Z"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

pub fn table_name(index: usize) -> String {
    match TABLE_NAMES.get(index) {
        Some(name) => name.to_string(),
        None => format!("table_{}", index),
    }
}

pub struct DumpGenerator {
    rng: ChaCha8Rng,
    config: DumpConfig,
}

impl DumpGenerator {
    pub fn new(config: DumpConfig) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
        }
    }

    pub fn generate_string(&mut self) -> (String, DumpSummary) {
        let mut buf = Vec::new();
        let summary = match self.generate_to(&mut buf) {
            Ok(summary) => summary,
            Err(e) => unreachable!("writing to a Vec cannot fail: {}", e),
        };
        (String::from_utf8_lossy(&buf).into_owned(), summary)
    }

    pub fn generate_to<W: Write>(&mut self, w: &mut W) -> io::Result<DumpSummary> {
        let mut summary = DumpSummary::default();

        write_preamble(w)?;
        for t in 0..self.config.tables {
            let name = table_name(t);
            write_table_structure(w, &name)?;
            let statements = self.write_table_data(w, &name)?;
            summary.tables.push(TableSummary {
                name,
                rows: self.config.rows_per_table,
                statements,
            });
        }
        write_postamble(w)?;

        Ok(summary)
    }

    fn write_table_data<W: Write>(&mut self, w: &mut W, table: &str) -> io::Result<usize> {
        writeln!(w, "--")?;
        writeln!(w, "-- Dumping data for table `{}`", table)?;
        writeln!(w, "--")?;
        writeln!(w)?;
        writeln!(w, "LOCK TABLES `{}` WRITE;", table)?;
        writeln!(w, "/*!40000 ALTER TABLE `{}` DISABLE KEYS */;", table)?;

        let batch = self.config.batch_size.max(1);
        let mut statements = 0;
        let mut id = 1;
        while id <= self.config.rows_per_table {
            let end = (id + batch - 1).min(self.config.rows_per_table);
            let tuples: Vec<String> = (id..=end).map(|i| self.row(i)).collect();

            match self.config.style {
                DumpStyle::Mysqldump => {
                    writeln!(w, "INSERT INTO `{}` VALUES {};", table, tuples.join(","))?;
                }
                DumpStyle::PhpMyAdmin => {
                    writeln!(
                        w,
                        "INSERT INTO `{}` (`id`, `name`, `note`, `created_at`, `score`, `active`) VALUES",
                        table
                    )?;
                    writeln!(w, "{};", tuples.join(",\n"))?;
                }
            }
            statements += 1;
            id = end + 1;
        }

        writeln!(w, "/*!40000 ALTER TABLE `{}` ENABLE KEYS */;", table)?;
        writeln!(w, "UNLOCK TABLES;")?;
        writeln!(w)?;
        Ok(statements)
    }

    fn row(&mut self, id: usize) -> String {
        let name = self.text(FIRST_NAMES[id % FIRST_NAMES.len()]);
        let note = if self.rng.random_bool(0.15) {
            "NULL".to_string()
        } else {
            self.text("plain note")
        };
        let created = format!(
            "'2024-{:02}-{:02} {:02}:{:02}:{:02}'",
            self.rng.random_range(1..=12),
            self.rng.random_range(1..=28),
            self.rng.random_range(0..24),
            self.rng.random_range(0..60),
            self.rng.random_range(0..60)
        );
        let score = self.rng.random_range(0..100_000) as f64 / 100.0;
        let active = self.rng.random_range(0..2);

        let sep = match self.config.style {
            DumpStyle::Mysqldump => ",",
            DumpStyle::PhpMyAdmin => ", ",
        };
        let fields = [
            id.to_string(),
            name,
            note,
            created,
            format!("{:.2}", score),
            active.to_string(),
        ];
        format!("({})", fields.join(sep))
    }

    fn text(&mut self, plain: &str) -> String {
        let value = if self.rng.random_bool(self.config.tricky_ratio) {
            TRICKY_STRINGS[self.rng.random_range(0..TRICKY_STRINGS.len())]
        } else {
            plain
        };
        mysql_quote(value, self.config.raw_newlines)
    }
}

fn write_preamble<W: Write>(w: &mut W) -> io::Result<()> {
    writeln!(w, "-- MySQL dump 10.13  Distrib 8.0.36, for Linux (x86_64)")?;
    writeln!(w, "--")?;
    writeln!(w, "-- Host: localhost    Database: app")?;
    writeln!(w, "-- ------------------------------------------------------")?;
    writeln!(w, "-- Server version\t8.0.36")?;
    writeln!(w)?;
    writeln!(
        w,
        "/*!40101 SET @OLD_CHARACTER_SET_CLIENT=@@CHARACTER_SET_CLIENT */;"
    )?;
    writeln!(w, "/*!50503 SET NAMES utf8mb4 */;")?;
    writeln!(
        w,
        "/*!40014 SET @OLD_FOREIGN_KEY_CHECKS=@@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS=0 */;"
    )?;
    writeln!(w, "SET SQL_MODE = \"NO_AUTO_VALUE_ON_ZERO\";")?;
    writeln!(w, "START TRANSACTION;")?;
    writeln!(w)?;
    Ok(())
}

fn write_table_structure<W: Write>(w: &mut W, table: &str) -> io::Result<()> {
    writeln!(w, "--")?;
    writeln!(w, "-- Table structure for table `{}`", table)?;
    writeln!(w, "--")?;
    writeln!(w)?;
    writeln!(w, "DROP TABLE IF EXISTS `{}`;", table)?;
    writeln!(w, "/*!40101 SET @saved_cs_client     = @@character_set_client */;")?;
    writeln!(w, "CREATE TABLE `{}` (", table)?;
    writeln!(w, "  `id` int NOT NULL AUTO_INCREMENT,")?;
    writeln!(w, "  `name` varchar(255) NOT NULL,")?;
    writeln!(w, "  `note` text,")?;
    writeln!(w, "  `created_at` datetime DEFAULT CURRENT_TIMESTAMP,")?;
    writeln!(w, "  `score` decimal(10,2) DEFAULT '0.00',")?;
    writeln!(w, "  `active` tinyint(1) NOT NULL DEFAULT '1',")?;
    writeln!(w, "  PRIMARY KEY (`id`),")?;
    writeln!(w, "  KEY `idx_{}_name` (`name`)", table)?;
    writeln!(
        w,
        ") ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;"
    )?;
    writeln!(w, "/*!40101 SET character_set_client = @saved_cs_client */;")?;
    writeln!(w)?;
    Ok(())
}

fn write_postamble<W: Write>(w: &mut W) -> io::Result<()> {
    writeln!(w, "COMMIT;")?;
    writeln!(w, "/*!40014 SET FOREIGN_KEY_CHECKS=@OLD_FOREIGN_KEY_CHECKS */;")?;
    writeln!(w)?;
    writeln!(w, "-- Dump completed on 2024-06-01 12:00:00")?;
    Ok(())
}
