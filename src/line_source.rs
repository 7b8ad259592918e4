//! Line Source (spec §4.1): turns one or more byte streams into a lazy
//! sequence of physical lines, counting them and stripping a UTF-8 BOM
//! from the very first line of the very first stream.

use std::io::{self, BufRead};

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Host hook for supplying additional byte streams once the current one
/// is exhausted (part of the import configuration contract, spec §6).
pub trait SourceRollover {
    /// Returns the next byte source, or `None` when there are no more.
    fn next_reader(&mut self) -> io::Result<Option<Box<dyn BufRead>>>;
}

/// No further streams; a single-source reader uses this.
pub struct NoRollover;

impl SourceRollover for NoRollover {
    fn next_reader(&mut self) -> io::Result<Option<Box<dyn BufRead>>> {
        Ok(None)
    }
}

pub struct LineSource {
    current: Option<Box<dyn BufRead>>,
    line_no: u64,
    at_first_line_of_first_stream: bool,
}

impl LineSource {
    pub fn new(first: Box<dyn BufRead>) -> Self {
        LineSource {
            current: Some(first),
            line_no: 0,
            at_first_line_of_first_stream: true,
        }
    }

    /// Absolute number of the line most recently returned (1-based).
    pub fn line_no(&self) -> u64 {
        self.line_no
    }

    /// Read the next physical line, without its terminator (`\n` or
    /// `\r\n`). Returns `None` at true end-of-input across all streams.
    pub fn next_line(&mut self, rollover: &mut dyn SourceRollover) -> io::Result<Option<Vec<u8>>> {
        loop {
            let reader = match self.current.as_mut() {
                Some(r) => r,
                None => return Ok(None),
            };

            let mut buf = Vec::new();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 {
                // This stream is exhausted; roll over to the next one.
                match rollover.next_reader()? {
                    Some(next) => {
                        self.current = Some(next);
                        continue;
                    }
                    None => {
                        self.current = None;
                        return Ok(None);
                    }
                }
            }

            if buf.last() == Some(&b'\n') {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
            }

            if self.at_first_line_of_first_stream {
                self.at_first_line_of_first_stream = false;
                if buf.starts_with(&UTF8_BOM) {
                    buf.drain(0..3);
                }
            }

            self.line_no += 1;
            return Ok(Some(buf));
        }
    }
}
