//! Dump loading: decompression and best-effort text decoding.
//!
//! The dump is consumed as physical lines. Bytes that are not valid UTF-8 are
//! replaced with U+FFFD rather than failing the run, and the affected line
//! numbers are remembered so they can be reported.

use crate::progress::ProgressReader;
use anyhow::Context;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

pub const SMALL_BUFFER_SIZE: usize = 64 * 1024;
pub const MEDIUM_BUFFER_SIZE: usize = 256 * 1024;

/// Most line numbers with decoding problems kept for reporting
const MAX_LOSSY_LINES: usize = 100;

/// Compression format detected from file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl Compression {
    /// Detect compression format from file extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("gz" | "gzip") => Compression::Gzip,
            Some("bz2" | "bzip2") => Compression::Bzip2,
            Some("xz" | "lzma") => Compression::Xz,
            Some("zst" | "zstd") => Compression::Zstd,
            _ => Compression::None,
        }
    }

    /// Wrap a reader with the appropriate decompressor
    pub fn wrap_reader<'a>(&self, reader: Box<dyn Read + 'a>) -> std::io::Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::None => reader,
            Compression::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
            Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(reader)),
            Compression::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(reader)?),
        })
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Bzip2 => write!(f, "bzip2"),
            Compression::Xz => write!(f, "xz"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

pub fn determine_buffer_size(file_size: u64) -> usize {
    if file_size > 1024 * 1024 * 1024 {
        MEDIUM_BUFFER_SIZE
    } else {
        SMALL_BUFFER_SIZE
    }
}

/// One decoded physical line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// 1-based line number
    pub number: usize,
    /// Text without the trailing newline
    pub text: String,
}

/// Iterates the physical lines of a dump with lossy UTF-8 decoding.
pub struct DumpLines<R: BufRead> {
    reader: R,
    buf: Vec<u8>,
    line_number: usize,
    bytes_read: u64,
    lossy_lines: Vec<usize>,
    lossy_count: usize,
}

impl<R: BufRead> DumpLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(8 * 1024),
            line_number: 0,
            bytes_read: 0,
            lossy_lines: Vec::new(),
            lossy_count: 0,
        }
    }

    pub fn next_line(&mut self) -> std::io::Result<Option<Line>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.bytes_read += n as u64;
        self.line_number += 1;

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }

        let text = match std::str::from_utf8(&self.buf) {
            Ok(s) => s.to_owned(),
            Err(_) => {
                self.lossy_count += 1;
                if self.lossy_lines.len() < MAX_LOSSY_LINES {
                    self.lossy_lines.push(self.line_number);
                }
                String::from_utf8_lossy(&self.buf).into_owned()
            }
        };

        Ok(Some(Line {
            number: self.line_number,
            text,
        }))
    }

    /// Line numbers that needed replacement characters (capped)
    pub fn lossy_lines(&self) -> &[usize] {
        &self.lossy_lines
    }

    /// Total number of lines that needed replacement characters
    pub fn lossy_count(&self) -> usize {
        self.lossy_count
    }

    /// Decompressed bytes consumed so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

/// Open a dump file, transparently decompressing it.
///
/// `progress` is called with the number of raw (compressed) bytes read.
pub fn open_dump(
    path: &Path,
    progress: Option<Box<dyn Fn(u64)>>,
) -> anyhow::Result<DumpLines<Box<dyn BufRead>>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.display()))?;
    let file_size = file
        .metadata()
        .with_context(|| format!("failed to read metadata for {}", path.display()))?
        .len();
    let compression = Compression::from_path(path);

    let raw: Box<dyn Read> = match progress {
        Some(cb) => Box::new(ProgressReader::new(file, cb)),
        None => Box::new(file),
    };
    let reader = compression
        .wrap_reader(raw)
        .with_context(|| format!("failed to open {} stream for {}", compression, path.display()))?;

    let buffered: Box<dyn BufRead> = Box::new(BufReader::with_capacity(
        determine_buffer_size(file_size),
        reader,
    ));
    Ok(DumpLines::new(buffered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_compression_from_path() {
        assert_eq!(Compression::from_path(Path::new("a.sql.gz")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("a.sql.ZST")), Compression::Zstd);
        assert_eq!(Compression::from_path(Path::new("a.sql.bz2")), Compression::Bzip2);
        assert_eq!(Compression::from_path(Path::new("a.sql.xz")), Compression::Xz);
        assert_eq!(Compression::from_path(Path::new("a.sql")), Compression::None);
    }

    #[test]
    fn test_lines_strip_newlines() {
        let data = b"first\r\nsecond\nthird";
        let mut lines = DumpLines::new(&data[..]);

        assert_eq!(lines.next_line().unwrap().unwrap().text, "first");
        let second = lines.next_line().unwrap().unwrap();
        assert_eq!(second.text, "second");
        assert_eq!(second.number, 2);
        assert_eq!(lines.next_line().unwrap().unwrap().text, "third");
        assert!(lines.next_line().unwrap().is_none());
        assert_eq!(lines.bytes_read(), data.len() as u64);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let data = b"ok\ncaf\xe9\nok\n";
        let mut lines = DumpLines::new(&data[..]);

        lines.next_line().unwrap();
        let bad = lines.next_line().unwrap().unwrap();
        assert_eq!(bad.text, "caf\u{FFFD}");
        lines.next_line().unwrap();

        assert_eq!(lines.lossy_lines(), &[2]);
        assert_eq!(lines.lossy_count(), 1);
    }

    #[test]
    fn test_open_missing_file_names_path() {
        let err = match open_dump(Path::new("/nonexistent/dump.sql"), None) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(format!("{:#}", err).contains("/nonexistent/dump.sql"));
    }

    #[test]
    fn test_open_gzip_dump() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dump.sql.gz");
        let file = File::create(&path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(b"INSERT INTO t VALUES (1);\n").unwrap();
        encoder.finish().unwrap();

        let mut lines = open_dump(&path, None).unwrap();
        assert_eq!(
            lines.next_line().unwrap().unwrap().text,
            "INSERT INTO t VALUES (1);"
        );
    }
}
