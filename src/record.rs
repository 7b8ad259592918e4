//! Record Framer (spec §4.2): folds physical lines into one logical
//! record per the continuation, comment, blank-line, and version-
//! directive rules.

use crate::error::{LdifError, Result};
use crate::line_source::{LineSource, SourceRollover};

/// One logical line inside a record: the folded text and the physical
/// line number it started on (used for error reporting).
#[derive(Debug, Clone)]
pub struct LogicalLine {
    pub line_no: u64,
    pub text: Vec<u8>,
}

/// A maximal non-empty sequence of logical lines, separated from other
/// records by one or more blank lines.
#[derive(Debug, Clone)]
pub struct Record {
    pub start_line: u64,
    pub lines: Vec<LogicalLine>,
}

pub struct RecordFramer;

impl RecordFramer {
    /// Read the next record, skipping any standalone `version:` record
    /// and stripping a leading `version:` line from a record that
    /// carries one (spec §4.2). Returns `None` at true end-of-input.
    pub fn next_record(
        source: &mut LineSource,
        rollover: &mut dyn SourceRollover,
    ) -> Result<Option<Record>> {
        loop {
            let record = match Self::next_raw_record(source, rollover)? {
                Some(r) => r,
                None => return Ok(None),
            };
            match strip_version(record) {
                Some(r) => return Ok(Some(r)),
                None => continue, // version-only record: transparently retry
            }
        }
    }

    fn next_raw_record(
        source: &mut LineSource,
        rollover: &mut dyn SourceRollover,
    ) -> Result<Option<Record>> {
        let mut lines: Vec<LogicalLine> = Vec::new();
        let mut start_line: Option<u64> = None;

        loop {
            let line = match source.next_line(rollover)? {
                Some(l) => l,
                None => {
                    if lines.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(Record {
                        start_line: start_line.unwrap(),
                        lines,
                    }));
                }
            };
            let line_no = source.line_no();

            if line.is_empty() {
                if lines.is_empty() {
                    continue; // extra blank line between records
                }
                return Ok(Some(Record {
                    start_line: start_line.unwrap(),
                    lines,
                }));
            }

            if line[0] == b'#' {
                continue; // comment: discard entirely
            }

            if line[0] == b' ' || line[0] == b'\t' {
                match lines.last_mut() {
                    Some(prev) => {
                        prev.text.extend_from_slice(&line[1..]);
                        continue;
                    }
                    None => {
                        return Err(LdifError::parse(
                            line_no,
                            "leading space without predecessor",
                        ));
                    }
                }
            }

            if start_line.is_none() {
                start_line = Some(line_no);
            }
            lines.push(LogicalLine {
                line_no,
                text: line,
            });
        }
    }
}

/// Strip a leading `version: N` line, if present. Returns `None` if the
/// record was nothing but the version line (transparent retry case).
fn strip_version(mut record: Record) -> Option<Record> {
    if record.lines.is_empty() {
        return Some(record);
    }
    let first = &record.lines[0];
    let text = String::from_utf8_lossy(&first.text);
    let (name, rest) = split_attrdesc(&text);
    if !name.eq_ignore_ascii_case("version") {
        return Some(record);
    }
    let _ = rest; // value (must be "1") is validated by the caller if needed
    record.lines.remove(0);
    if record.lines.is_empty() {
        return None;
    }
    record.start_line = record.lines[0].line_no;
    Some(record)
}

fn split_attrdesc(line: &str) -> (&str, &str) {
    match line.find(':') {
        Some(idx) => (&line[..idx], &line[idx + 1..]),
        None => (line, ""),
    }
}
