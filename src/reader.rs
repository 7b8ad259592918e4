//! The top-level reader (spec §2, §5): wires the line source, record
//! framer, entry assembler, and change-record parser behind the two
//! public read-next operations, with atomic counters and reject/skip
//! side-channel routing per the error-handling taxonomy of §7.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::change::{parse_change_record, ChangeRecord};
use crate::config::{write_side_channel, ImportConfig};
use crate::entry::{DefaultEntryFactory, Entry, EntryFactory};
use crate::error::{Outcome, Result};
use crate::line_source::{LineSource, SourceRollover};
use crate::plugin::ImportPlugin;
use crate::record::{Record, RecordFramer};
use crate::schema::Schema;

/// Adapts an `&mut dyn ImportConfig` to `SourceRollover` for one call into
/// the line source, without borrowing the config as any other trait
/// object type.
struct ConfigRollover<'a>(&'a mut dyn ImportConfig);

impl<'a> SourceRollover for ConfigRollover<'a> {
    fn next_reader(&mut self) -> io::Result<Option<Box<dyn BufRead>>> {
        self.0.next_reader()
    }
}

/// A snapshot of the reader's atomic counters (spec §3, §8): entries-read
/// equals emitted plus ignored plus rejected, once the source is
/// exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderCounters {
    pub entries_read: u64,
    pub ignored: u64,
    pub rejected: u64,
}

/// The LDIF streaming reader. Combines the line source, record framer,
/// entry assembler, and change-record parser; not safe to call
/// concurrently on the same instance (spec §5).
pub struct LdifReader<'a> {
    source: LineSource,
    config: &'a mut dyn ImportConfig,
    schema: &'a dyn Schema,
    factory: Box<dyn EntryFactory>,
    plugin: Option<&'a mut dyn ImportPlugin>,
    entries_read: AtomicU64,
    ignored: AtomicU64,
    rejected: AtomicU64,
    closed: bool,
}

impl<'a> LdifReader<'a> {
    pub fn new(
        first: Box<dyn BufRead>,
        config: &'a mut dyn ImportConfig,
        schema: &'a dyn Schema,
    ) -> Self {
        LdifReader {
            source: LineSource::new(first),
            config,
            schema,
            factory: Box::new(DefaultEntryFactory),
            plugin: None,
            entries_read: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            closed: false,
        }
    }

    /// Override the default entry-assembly strategy (spec §9's
    /// `EntryFactory` strategy interface).
    pub fn with_entry_factory(mut self, factory: Box<dyn EntryFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Attach an import plugin hook (spec §6). `begin_session` fires
    /// immediately; `end_session` fires when the reader is closed, so
    /// the notifications bracket the reader's lifetime as specified.
    pub fn with_plugin(mut self, plugin: &'a mut dyn ImportPlugin) -> Self {
        plugin.begin_session();
        self.plugin = Some(plugin);
        self
    }

    pub fn counters(&self) -> ReaderCounters {
        ReaderCounters {
            entries_read: self.entries_read.load(Ordering::SeqCst),
            ignored: self.ignored.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
        }
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        let mut rollover = ConfigRollover(&mut *self.config);
        RecordFramer::next_record(&mut self.source, &mut rollover)
    }

    /// Read the next entry, transparently looping past policy-filtered
    /// records (skip channel, ignored counter) until one is emitted, a
    /// parse error occurs, or the source is exhausted.
    pub fn read_next_entry(&mut self) -> Result<Outcome<Entry>> {
        loop {
            let record = match self.next_record()? {
                Some(r) => r,
                None => return Ok(Outcome::Eof),
            };

            match self
                .factory
                .build_entry(&record, &mut *self.config, self.schema)
            {
                Ok(Outcome::Ok(entry)) => {
                    self.entries_read.fetch_add(1, Ordering::SeqCst);
                    if self.config.invoke_import_plugins() {
                        if let Some(plugin) = self.plugin.as_deref_mut() {
                            if let Err(reason) = plugin.process_entry(&entry) {
                                self.ignored.fetch_add(1, Ordering::SeqCst);
                                self.write_skip(&record, &reason)?;
                                continue;
                            }
                        }
                    }
                    return Ok(Outcome::Ok(entry));
                }
                Ok(Outcome::Filtered(reason)) => {
                    self.entries_read.fetch_add(1, Ordering::SeqCst);
                    self.ignored.fetch_add(1, Ordering::SeqCst);
                    self.write_skip(&record, &reason)?;
                    continue;
                }
                Ok(Outcome::Eof) => unreachable!("entry assembly never yields Eof"),
                Err(e) => {
                    self.entries_read.fetch_add(1, Ordering::SeqCst);
                    self.rejected.fetch_add(1, Ordering::SeqCst);
                    self.write_reject(&record, &e.to_string())?;
                    return Err(e);
                }
            }
        }
    }

    /// Read the next change record. Change records are never routed to
    /// the skip channel: they are not subject to include/exclude
    /// filtering (spec §4.5).
    pub fn read_next_change_record(&mut self) -> Result<Outcome<ChangeRecord>> {
        let record = match self.next_record()? {
            Some(r) => r,
            None => return Ok(Outcome::Eof),
        };
        self.entries_read.fetch_add(1, Ordering::SeqCst);

        match parse_change_record(&record, &mut *self.config, self.schema) {
            Ok(change) => Ok(Outcome::Ok(change)),
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::SeqCst);
                self.write_reject(&record, &e.to_string())?;
                Err(e)
            }
        }
    }

    fn write_reject(&mut self, record: &Record, reason: &str) -> Result<()> {
        let lines: Vec<Vec<u8>> = record.lines.iter().map(|l| l.text.clone()).collect();
        if let Some(w) = self.config.reject_writer() {
            write_side_channel(w, reason, &lines)?;
        }
        Ok(())
    }

    fn write_skip(&mut self, record: &Record, reason: &str) -> Result<()> {
        let lines: Vec<Vec<u8>> = record.lines.iter().map(|l| l.text.clone()).collect();
        if let Some(w) = self.config.skip_writer() {
            write_side_channel(w, reason, &lines)?;
        }
        Ok(())
    }

    /// Release the held streams and sinks, and notify an attached plugin
    /// that the session has ended. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Some(plugin) = self.plugin.as_deref_mut() {
            plugin.end_session();
        }
        self.config.close();
        self.closed = true;
    }
}

impl<'a> Drop for LdifReader<'a> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PermissiveConfig;
    use crate::dn::Dn;
    use crate::line_source::SourceRollover;
    use crate::schema::InMemorySchema;
    use crate::value::{FileUrlFetcher, UrlFetcher};
    use std::io::Cursor;

    fn reader<'a>(
        data: &'static [u8],
        config: &'a mut dyn ImportConfig,
        schema: &'a InMemorySchema,
    ) -> LdifReader<'a> {
        LdifReader::new(Box::new(Cursor::new(data)), config, schema)
    }

    #[test]
    fn reads_one_entry_and_stops_at_eof() {
        let mut cfg = PermissiveConfig::new(FileUrlFetcher);
        let schema = InMemorySchema::new();
        let mut r = reader(b"dn: dc=x\nobjectClass: top\ncn: a\n\n", &mut cfg, &schema);

        match r.read_next_entry().unwrap() {
            Outcome::Ok(entry) => assert_eq!(entry.dn.to_string(), "dc=x"),
            _ => panic!("expected an entry"),
        }
        assert!(matches!(r.read_next_entry().unwrap(), Outcome::Eof));
        assert_eq!(
            r.counters(),
            ReaderCounters {
                entries_read: 1,
                ignored: 0,
                rejected: 0,
            }
        );
    }

    #[test]
    fn standalone_version_record_is_not_counted() {
        let mut cfg = PermissiveConfig::new(FileUrlFetcher);
        let schema = InMemorySchema::new();
        let mut r = reader(
            b"version: 1\n\ndn: dc=x\nobjectClass: top\n\n",
            &mut cfg,
            &schema,
        );
        assert!(matches!(r.read_next_entry().unwrap(), Outcome::Ok(_)));
        assert!(matches!(r.read_next_entry().unwrap(), Outcome::Eof));
        assert_eq!(r.counters().entries_read, 1);
    }

    #[test]
    fn parse_error_increments_rejected_and_writes_reject_channel() {
        struct RejectingConfig {
            fetcher: FileUrlFetcher,
            reject: Vec<u8>,
        }
        impl SourceRollover for RejectingConfig {
            fn next_reader(&mut self) -> io::Result<Option<Box<dyn BufRead>>> {
                Ok(None)
            }
        }
        impl ImportConfig for RejectingConfig {
            fn url_fetcher(&self) -> &dyn UrlFetcher {
                &self.fetcher
            }
            fn reject_writer(&mut self) -> Option<&mut dyn Write> {
                Some(&mut self.reject)
            }
        }

        let mut cfg = RejectingConfig {
            fetcher: FileUrlFetcher,
            reject: Vec::new(),
        };
        let schema = InMemorySchema::new();
        let mut r = reader(b"cn: wrong\n\n", &mut cfg, &schema);

        assert!(r.read_next_entry().is_err());
        assert_eq!(
            r.counters(),
            ReaderCounters {
                entries_read: 1,
                ignored: 0,
                rejected: 1,
            }
        );
        drop(r);
        assert!(cfg.reject.starts_with(b"# "));
        assert!(cfg
            .reject
            .windows(b"cn: wrong".len())
            .any(|w| w == b"cn: wrong"));
    }

    #[test]
    fn filtered_entry_increments_ignored_and_writes_skip_channel() {
        struct SkippingConfig {
            fetcher: FileUrlFetcher,
            skip: Vec<u8>,
        }
        impl SourceRollover for SkippingConfig {
            fn next_reader(&mut self) -> io::Result<Option<Box<dyn BufRead>>> {
                Ok(None)
            }
        }
        impl ImportConfig for SkippingConfig {
            fn include_entry_dn(&mut self, _dn: &Dn) -> (bool, Option<String>) {
                (false, Some("excluded".to_string()))
            }
            fn url_fetcher(&self) -> &dyn UrlFetcher {
                &self.fetcher
            }
            fn skip_writer(&mut self) -> Option<&mut dyn Write> {
                Some(&mut self.skip)
            }
        }

        let mut cfg = SkippingConfig {
            fetcher: FileUrlFetcher,
            skip: Vec::new(),
        };
        let schema = InMemorySchema::new();
        let mut r = reader(b"dn: dc=x\ncn: a\n\n", &mut cfg, &schema);

        assert!(matches!(r.read_next_entry().unwrap(), Outcome::Eof));
        assert_eq!(
            r.counters(),
            ReaderCounters {
                entries_read: 1,
                ignored: 1,
                rejected: 0,
            }
        );
        drop(r);
        assert!(cfg.skip.starts_with(b"# excluded"));
    }

    #[test]
    fn reads_modify_change_record() {
        let mut cfg = PermissiveConfig::new(FileUrlFetcher);
        let schema = InMemorySchema::new();
        let mut r = reader(
            b"dn: dc=x\nchangetype: modify\nreplace: cn\ncn: new\n-\n\n",
            &mut cfg,
            &schema,
        );
        match r.read_next_change_record().unwrap() {
            Outcome::Ok(ChangeRecord::Modify(dn, mods)) => {
                assert_eq!(dn.to_string(), "dc=x");
                assert_eq!(mods.len(), 1);
            }
            _ => panic!("expected Modify"),
        }
    }

    #[test]
    fn plugin_rejection_routes_to_skip_and_ignored() {
        struct PluginConfig {
            fetcher: FileUrlFetcher,
            skip: Vec<u8>,
        }
        impl SourceRollover for PluginConfig {
            fn next_reader(&mut self) -> io::Result<Option<Box<dyn BufRead>>> {
                Ok(None)
            }
        }
        impl ImportConfig for PluginConfig {
            fn url_fetcher(&self) -> &dyn UrlFetcher {
                &self.fetcher
            }
            fn invoke_import_plugins(&self) -> bool {
                true
            }
            fn skip_writer(&mut self) -> Option<&mut dyn Write> {
                Some(&mut self.skip)
            }
        }
        struct RejectAll;
        impl crate::plugin::ImportPlugin for RejectAll {
            fn process_entry(&mut self, _entry: &Entry) -> std::result::Result<(), String> {
                Err("rejected by plugin".to_string())
            }
        }

        let mut cfg = PluginConfig {
            fetcher: FileUrlFetcher,
            skip: Vec::new(),
        };
        let schema = InMemorySchema::new();
        let mut plugin = RejectAll;
        let mut r = reader(b"dn: dc=x\nobjectClass: top\n\n", &mut cfg, &schema)
            .with_plugin(&mut plugin);

        assert!(matches!(r.read_next_entry().unwrap(), Outcome::Eof));
        assert_eq!(
            r.counters(),
            ReaderCounters {
                entries_read: 1,
                ignored: 1,
                rejected: 0,
            }
        );
        drop(r);
        assert!(cfg.skip.starts_with(b"# rejected by plugin"));
    }

    #[test]
    fn plugin_session_bracketed_by_reader_lifetime() {
        let mut cfg = PermissiveConfig::new(FileUrlFetcher);
        let schema = InMemorySchema::new();

        struct Tracking {
            began: bool,
            ended: bool,
        }
        impl crate::plugin::ImportPlugin for Tracking {
            fn begin_session(&mut self) {
                self.began = true;
            }
            fn end_session(&mut self) {
                self.ended = true;
            }
        }

        let mut plugin = Tracking {
            began: false,
            ended: false,
        };
        let mut r = reader(b"", &mut cfg, &schema).with_plugin(&mut plugin);
        r.close();
        drop(r);
        assert!(plugin.began);
        assert!(plugin.ended);
    }

    #[test]
    fn close_is_idempotent() {
        struct CountClose {
            fetcher: FileUrlFetcher,
            closes: u32,
        }
        impl SourceRollover for CountClose {
            fn next_reader(&mut self) -> io::Result<Option<Box<dyn BufRead>>> {
                Ok(None)
            }
        }
        impl ImportConfig for CountClose {
            fn url_fetcher(&self) -> &dyn UrlFetcher {
                &self.fetcher
            }
            fn close(&mut self) {
                self.closes += 1;
            }
        }
        let mut cfg = CountClose {
            fetcher: FileUrlFetcher,
            closes: 0,
        };
        let schema = InMemorySchema::new();
        let mut r = reader(b"", &mut cfg, &schema);
        r.close();
        r.close();
        drop(r);
        assert_eq!(cfg.closes, 1);
    }
}
