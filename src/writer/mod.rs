//! Migration script emission.
//!
//! [`MigrationWriter`] lays out the script around the converted statements.
//! [`Output`] decides where the bytes go; file output is staged in a
//! temporary file next to the destination and only renamed into place once
//! the whole script has been written.

use crate::parser::IdentifierMode;
use crate::sequence::SequenceRef;
use anyhow::Context;
use std::io::{self, BufWriter, Sink, Stdout, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const WRITER_BUFFER_SIZE: usize = 256 * 1024;

/// Writes the PostgreSQL migration script
pub struct MigrationWriter<W: Write> {
    writer: W,
    identifiers: IdentifierMode,
    annotate: bool,
    transaction: bool,
    statement_count: usize,
}

impl<W: Write> MigrationWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            identifiers: IdentifierMode::default(),
            annotate: true,
            transaction: false,
            statement_count: 0,
        }
    }

    pub fn with_identifiers(mut self, identifiers: IdentifierMode) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// Precede each statement with `-- INSERT statement N (table, R rows)`
    pub fn with_annotations(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    /// Wrap the script in `BEGIN;` / `COMMIT;`
    pub fn with_transaction(mut self, transaction: bool) -> Self {
        self.transaction = transaction;
        self
    }

    pub fn write_header(&mut self, source: &Path) -> io::Result<()> {
        let w = &mut self.writer;
        writeln!(w, "-- PostgreSQL data migration")?;
        writeln!(
            w,
            "-- Converted from MySQL dump by mysql2pg {}",
            env!("CARGO_PKG_VERSION")
        )?;
        writeln!(w, "-- Source: {}", source.display())?;
        writeln!(
            w,
            "-- Generated: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(w)?;

        if self.transaction {
            writeln!(w, "BEGIN;")?;
            writeln!(w)?;
        }

        writeln!(w, "-- Disable triggers and constraints for faster import")?;
        writeln!(w, "SET session_replication_role = replica;")?;
        writeln!(w)?;
        Ok(())
    }

    pub fn write_statement(&mut self, table: &str, rows: usize, sql: &str) -> io::Result<()> {
        self.statement_count += 1;
        if self.annotate {
            writeln!(
                self.writer,
                "-- INSERT statement {} ({}, {} rows)",
                self.statement_count, table, rows
            )?;
        }
        self.writer.write_all(sql.as_bytes())?;
        self.writer.write_all(b"\n\n")?;
        Ok(())
    }

    pub fn write_footer(&mut self, sequences: &[SequenceRef]) -> io::Result<()> {
        let w = &mut self.writer;
        writeln!(w, "-- Re-enable triggers and constraints")?;
        writeln!(w, "SET session_replication_role = DEFAULT;")?;

        if !sequences.is_empty() {
            writeln!(w)?;
            writeln!(w, "-- Update sequences to correct values")?;
            for seq in sequences {
                writeln!(w, "{}", seq.resync_sql(self.identifiers))?;
            }
        }

        if self.transaction {
            writeln!(w)?;
            writeln!(w, "COMMIT;")?;
        }
        Ok(())
    }

    /// Statements written so far
    pub fn statement_count(&self) -> usize {
        self.statement_count
    }

    /// Flush and hand back the underlying writer
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// A file that only appears at its destination once committed.
///
/// Dropping it without [`AtomicFile::commit`] removes the temporary file and
/// leaves any existing destination untouched.
pub struct AtomicFile {
    tmp: BufWriter<NamedTempFile>,
    dest: PathBuf,
}

impl AtomicFile {
    pub fn create(dest: &Path) -> anyhow::Result<Self> {
        let dir = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;

        let tmp = tempfile::Builder::new()
            .prefix(".mysql2pg-")
            .suffix(".sql.tmp")
            .tempfile_in(&dir)
            .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;

        Ok(Self {
            tmp: BufWriter::with_capacity(WRITER_BUFFER_SIZE, tmp),
            dest: dest.to_path_buf(),
        })
    }

    pub fn commit(self) -> anyhow::Result<()> {
        let dest = self.dest;
        let tmp = self
            .tmp
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("failed to flush output for {}", dest.display()))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("failed to sync output for {}", dest.display()))?;
        // Temporary files are created owner-only
        if let Some(perms) = output_permissions(&dest) {
            std::fs::set_permissions(tmp.path(), perms).with_context(|| {
                format!("failed to set permissions for {}", dest.display())
            })?;
        }
        tmp.persist(&dest)
            .map_err(|e| e.error)
            .with_context(|| format!("failed to write output file {}", dest.display()))?;
        Ok(())
    }

    pub fn destination(&self) -> &Path {
        &self.dest
    }
}

/// Keep an existing destination's mode, otherwise 0644.
#[cfg(unix)]
fn output_permissions(dest: &Path) -> Option<std::fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::metadata(dest)
        .map(|m| m.permissions())
        .unwrap_or_else(|_| std::fs::Permissions::from_mode(0o644));
    Some(perms)
}

#[cfg(not(unix))]
fn output_permissions(_dest: &Path) -> Option<std::fs::Permissions> {
    None
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tmp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.tmp.flush()
    }
}

/// Where the migration script goes
pub enum Output {
    File(AtomicFile),
    Stdout(BufWriter<Stdout>),
    /// `--dry-run`
    Discard(Sink),
}

impl Output {
    /// `None` means stdout.
    pub fn create(path: Option<&Path>, dry_run: bool) -> anyhow::Result<Self> {
        if dry_run {
            return Ok(Output::Discard(io::sink()));
        }
        match path {
            Some(p) => Ok(Output::File(AtomicFile::create(p)?)),
            None => Ok(Output::Stdout(BufWriter::with_capacity(
                WRITER_BUFFER_SIZE,
                io::stdout(),
            ))),
        }
    }

    /// Persist file output; flush otherwise
    pub fn commit(self) -> anyhow::Result<()> {
        match self {
            Output::File(file) => file.commit(),
            Output::Stdout(mut out) => {
                out.flush().context("failed to flush stdout")?;
                Ok(())
            }
            Output::Discard(_) => Ok(()),
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::File(f) => f.write(buf),
            Output::Stdout(s) => s.write(buf),
            Output::Discard(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::File(f) => f.flush(),
            Output::Stdout(s) => s.flush(),
            Output::Discard(s) => s.flush(),
        }
    }
}
