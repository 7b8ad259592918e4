//! Optional import plugin hook (spec §6): session-lifetime notifications
//! plus a per-entry hook that can reject an entry before it is emitted.

use crate::entry::Entry;

pub trait ImportPlugin {
    fn begin_session(&mut self) {}
    fn end_session(&mut self) {}

    /// Inspect an assembled entry. `Err(reason)` routes it to the skip
    /// channel and bumps the ignored counter, exactly like a filter
    /// rejection (not the reject channel used for schema/parse errors).
    fn process_entry(&mut self, entry: &Entry) -> Result<(), String> {
        let _ = entry;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::Dn;

    struct RejectAll;
    impl ImportPlugin for RejectAll {
        fn process_entry(&mut self, _entry: &Entry) -> Result<(), String> {
            Err("rejected by plugin".to_string())
        }
    }

    #[test]
    fn plugin_can_reject() {
        let mut p = RejectAll;
        let entry = Entry::new(Dn::parse("cn=x").unwrap());
        assert!(p.process_entry(&entry).is_err());
    }

    #[test]
    fn default_plugin_accepts() {
        struct NoOp;
        impl ImportPlugin for NoOp {}
        let mut p = NoOp;
        let entry = Entry::new(Dn::parse("cn=x").unwrap());
        assert!(p.process_entry(&entry).is_ok());
    }
}
