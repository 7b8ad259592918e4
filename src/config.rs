//! Import configuration contract (spec §6): the host-supplied policy
//! object the reader consults for stream rollover, inclusion/exclusion
//! filtering, schema enforcement mode, and the reject/skip side
//! channels.

use std::io::Write;

use crate::dn::Dn;
use crate::entry::Entry;
use crate::line_source::SourceRollover;
use crate::value::UrlFetcher;

/// Global policy for how syntax violations are handled (spec §4.4 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxEnforcement {
    Off,
    Warn,
    Reject,
}

/// The contract the entry assembler and change-record parser consult.
/// A host application implements this to plug in its own filtering,
/// schema policy, and reject/skip sinks.
pub trait ImportConfig: SourceRollover {
    /// Decide whether an entry's DN is acceptable, before the body is
    /// parsed. `Ok(true)` admits the record; `Ok(false)` with a reason
    /// routes it to the skip channel.
    fn include_entry_dn(&mut self, dn: &Dn) -> (bool, Option<String>) {
        let _ = dn;
        (true, None)
    }

    /// Decide whether a fully assembled entry is acceptable (a second,
    /// filter-based exclusion pass per spec §4.4 step 5).
    fn include_entry(&mut self, entry: &Entry) -> (bool, Option<String>) {
        let _ = entry;
        (true, None)
    }

    fn include_object_classes(&self) -> bool {
        true
    }

    fn include_attribute(&self, attr_type: &str) -> bool {
        let _ = attr_type;
        true
    }

    fn validate_schema(&self) -> bool {
        false
    }

    fn syntax_enforcement(&self) -> SyntaxEnforcement {
        SyntaxEnforcement::Off
    }

    fn invoke_import_plugins(&self) -> bool {
        false
    }

    /// Whether the change-record parser should treat a record lacking a
    /// `changetype:` line as an implicit add (spec §4.5).
    fn default_to_add(&self) -> bool {
        true
    }

    fn reject_writer(&mut self) -> Option<&mut dyn Write> {
        None
    }

    fn skip_writer(&mut self) -> Option<&mut dyn Write> {
        None
    }

    fn url_fetcher(&self) -> &dyn UrlFetcher;

    /// Release sources and sinks. Idempotent.
    fn close(&mut self) {}
}

/// A minimal `ImportConfig` that admits everything, runs no schema
/// enforcement, and discards reject/skip output. Useful as a starting
/// point and in tests.
pub struct PermissiveConfig<F: UrlFetcher> {
    pub fetcher: F,
}

impl<F: UrlFetcher> PermissiveConfig<F> {
    pub fn new(fetcher: F) -> Self {
        PermissiveConfig { fetcher }
    }
}

impl<F: UrlFetcher> SourceRollover for PermissiveConfig<F> {
    fn next_reader(&mut self) -> std::io::Result<Option<Box<dyn std::io::BufRead>>> {
        Ok(None)
    }
}

impl<F: UrlFetcher> ImportConfig for PermissiveConfig<F> {
    fn url_fetcher(&self) -> &dyn UrlFetcher {
        &self.fetcher
    }
}

/// Write the spec §6 side-channel block: `# reason`, the verbatim
/// header/body lines of the offending record, then a blank line.
pub fn write_side_channel(
    w: &mut dyn Write,
    reason: &str,
    lines: &[Vec<u8>],
) -> std::io::Result<()> {
    writeln!(w, "# {}", reason)?;
    for line in lines {
        w.write_all(line)?;
        w.write_all(b"\n")?;
    }
    writeln!(w)?;
    Ok(())
}
