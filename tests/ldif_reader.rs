//! Black-box tests driving the public `LdifReader` API end to end,
//! covering the scenarios and invariants spelled out in the reader's
//! design (continuation folding, BOM transparency, version transparency,
//! counter accounting, and the change-record sub-grammars).

use std::io::Cursor;

use ldif::{
    ChangeRecord, Dn, FileUrlFetcher, InMemorySchema, LdifReader, ModOp, Outcome, PermissiveConfig,
};

fn reader<'a>(
    data: &'static [u8],
    config: &'a mut PermissiveConfig<FileUrlFetcher>,
    schema: &'a InMemorySchema,
) -> LdifReader<'a> {
    LdifReader::new(Box::new(Cursor::new(data)), config, schema)
}

#[test]
fn scenario_simple_entry() {
    let mut cfg = PermissiveConfig::new(FileUrlFetcher);
    let schema = InMemorySchema::new();
    let mut r = reader(b"dn: dc=x\nobjectClass: top\ncn: a\n\n", &mut cfg, &schema);

    let Outcome::Ok(entry) = r.read_next_entry().unwrap() else {
        panic!("expected an entry");
    };
    assert_eq!(entry.dn.to_string(), "dc=x");
    assert!(entry.has_object_class("top"));
    assert_eq!(entry.get_user_attribute("cn").unwrap().values[0], b"a");

    assert!(matches!(r.read_next_entry().unwrap(), Outcome::Eof));
    let counters = r.counters();
    assert_eq!(counters.entries_read, 1);
    assert_eq!(counters.ignored, 0);
    assert_eq!(counters.rejected, 0);
}

#[test]
fn scenario_version_header_is_transparent() {
    let mut cfg = PermissiveConfig::new(FileUrlFetcher);
    let schema = InMemorySchema::new();
    let mut r = reader(
        b"version: 1\n\ndn: dc=x\nobjectClass: top\n\n",
        &mut cfg,
        &schema,
    );

    assert!(matches!(r.read_next_entry().unwrap(), Outcome::Ok(_)));
    assert!(matches!(r.read_next_entry().unwrap(), Outcome::Eof));
    // The standalone version-only record is not counted.
    assert_eq!(r.counters().entries_read, 1);
}

#[test]
fn scenario_base64_value() {
    let mut cfg = PermissiveConfig::new(FileUrlFetcher);
    let schema = InMemorySchema::new();
    let mut r = reader(b"dn: dc=x\ncn:: SGVsbG8=\n\n", &mut cfg, &schema);

    let Outcome::Ok(entry) = r.read_next_entry().unwrap() else {
        panic!("expected an entry");
    };
    assert_eq!(entry.get_user_attribute("cn").unwrap().values[0], b"Hello");
}

#[test]
fn scenario_missing_dn_header_is_one_parse_error() {
    let mut cfg = PermissiveConfig::new(FileUrlFetcher);
    let schema = InMemorySchema::new();
    let mut r = reader(b"cn: wrong\n\n", &mut cfg, &schema);

    assert!(r.read_next_entry().is_err());
    let counters = r.counters();
    assert_eq!(counters.entries_read, 1);
    assert_eq!(counters.ignored, 0);
    assert_eq!(counters.rejected, 1);
}

#[test]
fn scenario_modify_change_record_preserves_order() {
    let mut cfg = PermissiveConfig::new(FileUrlFetcher);
    let schema = InMemorySchema::new();
    let mut r = reader(
        b"dn: dc=x\nchangetype: modify\nreplace: cn\ncn: new\n-\nadd: sn\nsn: s1\nsn: s2\n-\n\n",
        &mut cfg,
        &schema,
    );

    let Outcome::Ok(ChangeRecord::Modify(dn, mods)) = r.read_next_change_record().unwrap() else {
        panic!("expected a Modify change record");
    };
    assert_eq!(dn.to_string(), "dc=x");
    assert_eq!(mods.len(), 2);
    assert_eq!(mods[0].op, ModOp::Replace);
    assert_eq!(mods[0].attribute.description.attr_type, "cn");
    assert_eq!(mods[1].op, ModOp::Add);
    assert_eq!(mods[1].attribute.values, vec![b"s1".to_vec(), b"s2".to_vec()]);
}

#[test]
fn scenario_modify_dn_record() {
    let mut cfg = PermissiveConfig::new(FileUrlFetcher);
    let schema = InMemorySchema::new();
    let mut r = reader(
        b"dn: dc=x\nchangetype: moddn\nnewrdn: dc=y\ndeleteoldrdn: 1\nnewsuperior: dc=root\n\n",
        &mut cfg,
        &schema,
    );

    let Outcome::Ok(ChangeRecord::ModifyDn(dn, new_rdn, delete_old_rdn, new_superior)) =
        r.read_next_change_record().unwrap()
    else {
        panic!("expected a ModifyDn change record");
    };
    assert_eq!(dn.to_string(), "dc=x");
    assert_eq!(new_rdn.avas[0].attr_type, "dc");
    assert!(delete_old_rdn);
    assert_eq!(new_superior.unwrap().to_string(), "dc=root");
}

#[test]
fn bom_transparency() {
    let mut cfg_plain = PermissiveConfig::new(FileUrlFetcher);
    let schema = InMemorySchema::new();
    let mut plain = reader(b"dn: dc=x\ncn: a\n\n", &mut cfg_plain, &schema);
    let Outcome::Ok(plain_entry) = plain.read_next_entry().unwrap() else {
        panic!("expected an entry");
    };

    let mut cfg_bom = PermissiveConfig::new(FileUrlFetcher);
    let mut with_bom = reader(b"\xEF\xBB\xBFdn: dc=x\ncn: a\n\n", &mut cfg_bom, &schema);
    let Outcome::Ok(bom_entry) = with_bom.read_next_entry().unwrap() else {
        panic!("expected an entry");
    };

    assert_eq!(plain_entry.dn.to_string(), bom_entry.dn.to_string());
    assert_eq!(
        plain_entry.get_user_attribute("cn").unwrap().values,
        bom_entry.get_user_attribute("cn").unwrap().values
    );
}

fn folded(n: usize) -> Vec<u8> {
    // "cn: " followed by the value "value" folded across `n` continuation
    // lines, each contributing one character, so the logical value is
    // unchanged regardless of how many lines it was split across.
    let value = "valuexy";
    let head_len = value.len() - n;
    let mut out = format!("dn: dc=x\ncn: {}", &value[..head_len]).into_bytes();
    for ch in value[head_len..].chars() {
        out.extend_from_slice(format!("\n {}", ch).as_bytes());
    }
    out.extend_from_slice(b"\n\n");
    out
}

#[test]
fn continuation_equivalence_across_fold_counts() {
    let schema = InMemorySchema::new();
    for n in [0usize, 1, 2, 7] {
        let data = folded(n);
        let data: &'static [u8] = Box::leak(data.into_boxed_slice());
        let mut cfg = PermissiveConfig::new(FileUrlFetcher);
        let mut r = reader(data, &mut cfg, &schema);
        let Outcome::Ok(entry) = r.read_next_entry().unwrap() else {
            panic!("expected an entry for fold count {}", n);
        };
        assert_eq!(
            entry.get_user_attribute("cn").unwrap().values[0],
            b"valuexy",
            "fold count {} produced a different value",
            n
        );
    }
}

#[test]
fn rdn_completion_invariant() {
    let mut cfg = PermissiveConfig::new(FileUrlFetcher);
    let schema = InMemorySchema::new();
    let mut r = reader(
        b"dn: cn=foo+sn=bar,dc=com\nobjectClass: top\n\n",
        &mut cfg,
        &schema,
    );

    let Outcome::Ok(entry) = r.read_next_entry().unwrap() else {
        panic!("expected an entry");
    };
    for ava in &entry.dn.rdn().unwrap().avas {
        let present = entry
            .get_user_attribute(&ava.attr_type)
            .map(|a| a.contains(&ava.value))
            .unwrap_or(false);
        assert!(present, "RDN value for {} missing from attributes", ava.attr_type);
    }
}

#[test]
fn reject_channel_gets_exactly_one_block() {
    struct Sink {
        fetcher: FileUrlFetcher,
        buf: Vec<u8>,
    }
    impl ldif::line_source::SourceRollover for Sink {
        fn next_reader(&mut self) -> std::io::Result<Option<Box<dyn std::io::BufRead>>> {
            Ok(None)
        }
    }
    impl ldif::ImportConfig for Sink {
        fn url_fetcher(&self) -> &dyn ldif::UrlFetcher {
            &self.fetcher
        }
        fn reject_writer(&mut self) -> Option<&mut dyn std::io::Write> {
            Some(&mut self.buf)
        }
    }

    let mut cfg = Sink {
        fetcher: FileUrlFetcher,
        buf: Vec::new(),
    };
    let schema = InMemorySchema::new();
    let mut r = LdifReader::new(Box::new(Cursor::new(&b"cn: wrong\n\n"[..])), &mut cfg, &schema);
    assert!(r.read_next_entry().is_err());
    drop(r);

    let text = String::from_utf8(cfg.buf).unwrap();
    assert!(text.starts_with("# "));
    assert!(text.contains("cn: wrong"));
    assert!(text.ends_with("\n\n"));
}

#[test]
fn counter_accounting_across_mixed_batch() {
    struct Mixed {
        fetcher: FileUrlFetcher,
    }
    impl ldif::line_source::SourceRollover for Mixed {
        fn next_reader(&mut self) -> std::io::Result<Option<Box<dyn std::io::BufRead>>> {
            Ok(None)
        }
    }
    impl ldif::ImportConfig for Mixed {
        fn url_fetcher(&self) -> &dyn ldif::UrlFetcher {
            &self.fetcher
        }
        fn include_entry_dn(&mut self, dn: &Dn) -> (bool, Option<String>) {
            if dn.to_string() == "dc=skip" {
                (false, Some("excluded".to_string()))
            } else {
                (true, None)
            }
        }
    }

    let mut cfg = Mixed {
        fetcher: FileUrlFetcher,
    };
    let schema = InMemorySchema::new();
    let data = b"dn: dc=ok\ncn: a\n\ndn: dc=skip\ncn: a\n\ncn: wrong\n\n";
    let mut r = LdifReader::new(Box::new(Cursor::new(&data[..])), &mut cfg, &schema);

    // The reader transparently loops past filtered records within a single
    // call, so the `dc=skip` record is absorbed into the same call that
    // then hits the malformed trailing record and raises an error.
    assert!(matches!(r.read_next_entry().unwrap(), Outcome::Ok(_)));
    assert!(r.read_next_entry().is_err());
    assert!(matches!(r.read_next_entry().unwrap(), Outcome::Eof));

    let counters = r.counters();
    assert_eq!(counters.entries_read, 3);
    assert_eq!(counters.ignored, 1);
    assert_eq!(counters.rejected, 1);
    assert_eq!(counters.entries_read, 1 + counters.ignored + counters.rejected);
}
