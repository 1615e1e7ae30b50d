//! Byte-based progress tracking for the input stream.
//!
//! `ProgressReader` sits between the raw file and the decompressor, so the
//! reported position is comparable with the on-disk file size.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;

/// A reader wrapper that tracks bytes read and reports them to a callback.
pub struct ProgressReader<R: Read, F: Fn(u64)> {
    reader: R,
    callback: F,
    bytes_read: u64,
}

impl<R: Read, F: Fn(u64)> ProgressReader<R, F> {
    pub fn new(reader: R, callback: F) -> Self {
        Self {
            reader,
            callback,
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<R: Read, F: Fn(u64)> Read for ProgressReader<R, F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.bytes_read += n as u64;
        (self.callback)(self.bytes_read);
        Ok(n)
    }
}

/// Byte progress bar sized to the input file, drawn on stderr.
pub fn byte_progress_bar(total_bytes: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_bytes);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {msg}",
    ) {
        pb.set_style(
            style
                .progress_chars("█▓▒░  ")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_progress_reader_reports_totals() {
        let data = vec![7u8; 10_000];
        let seen = Rc::new(Cell::new(0u64));
        let seen_clone = seen.clone();

        let mut reader = ProgressReader::new(&data[..], move |bytes| seen_clone.set(bytes));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        assert_eq!(out.len(), 10_000);
        assert_eq!(reader.bytes_read(), 10_000);
        assert_eq!(seen.get(), 10_000);
    }
}
