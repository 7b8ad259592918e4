//! Change-Record Parser (spec §4.5): parses a framed record as a change
//! operation and dispatches to the add/delete/modify/modify-DN
//! sub-grammars.

use crate::attr::{Attribute, AttributeBuilder, AttributeDescription};
use crate::config::ImportConfig;
use crate::dn::{Dn, Rdn};
use crate::entry::{assemble_body, complete_rdn_attributes, parse_dn_header, Entry};
use crate::error::{LdifError, Result};
use crate::record::{LogicalLine, Record};
use crate::schema::Schema;
use crate::value::{decode_value, split_line};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOp {
    Add,
    Delete,
    Replace,
    Increment,
}

/// One modification within a `Modify` change record.
#[derive(Debug, Clone)]
pub struct Modification {
    pub op: ModOp,
    pub attribute: Attribute,
}

/// A parsed LDIF change record.
#[derive(Debug, Clone)]
pub enum ChangeRecord {
    Add(Entry),
    Delete(Dn),
    Modify(Dn, Vec<Modification>),
    ModifyDn(Dn, Rdn, bool, Option<Dn>),
}

/// Parse one framed record as a change record. Unlike entry assembly,
/// change records are not subject to the include/exclude filters (spec
/// §4.5): there is no inclusion check on the DN and no filter replay.
pub fn parse_change_record(
    record: &Record,
    config: &mut dyn ImportConfig,
    schema: &dyn Schema,
) -> Result<ChangeRecord> {
    let (dn, body) = parse_dn_header(record, config)?;

    if body.is_empty() {
        if config.default_to_add() {
            return build_add(dn, record.start_line, &[], config, schema);
        }
        return Err(LdifError::parse(
            record.start_line,
            "missing 'changetype'",
        ));
    }

    let first = &body[0];
    let (attrdesc, raw) =
        split_line(&first.text).map_err(|e| LdifError::parse(first.line_no, e))?;

    if attrdesc.eq_ignore_ascii_case("control") {
        return Err(LdifError::parse(
            first.line_no,
            "'control:' is not supported",
        ));
    }

    if !attrdesc.eq_ignore_ascii_case("changetype") {
        if config.default_to_add() {
            return build_add(dn, record.start_line, body, config, schema);
        }
        return Err(LdifError::parse(
            first.line_no,
            "expected 'changetype'",
        ));
    }

    let bytes = decode_value(raw, config.url_fetcher())
        .map_err(|e| LdifError::parse(first.line_no, e))?;
    let changetype = String::from_utf8(bytes)
        .map_err(|_| LdifError::parse(first.line_no, "changetype value is not valid UTF-8"))?;
    if changetype.is_empty() {
        return Err(LdifError::parse(first.line_no, "empty changetype"));
    }
    let rest = &body[1..];

    match changetype.as_str() {
        "add" => build_add(dn, record.start_line, rest, config, schema),
        "delete" => {
            if let Some(extra) = rest.first() {
                return Err(LdifError::parse(
                    extra.line_no,
                    "garbage at end of delete record",
                ));
            }
            Ok(ChangeRecord::Delete(dn))
        }
        "modify" => {
            let mods = parse_modify_body(rest, config)?;
            Ok(ChangeRecord::Modify(dn, mods))
        }
        "modrdn" | "moddn" => {
            let (new_rdn, delete_old_rdn, new_superior) =
                parse_moddn_body(rest, first.line_no, config)?;
            Ok(ChangeRecord::ModifyDn(dn, new_rdn, delete_old_rdn, new_superior))
        }
        other => Err(LdifError::parse(
            first.line_no,
            format!(
                "invalid changetype '{}': expected add, delete, modify, modrdn, or moddn",
                other
            ),
        )),
    }
}

fn build_add(
    dn: Dn,
    start_line: u64,
    lines: &[LogicalLine],
    config: &mut dyn ImportConfig,
    schema: &dyn Schema,
) -> Result<ChangeRecord> {
    let mut entry = Entry::new(dn);
    assemble_body(&mut entry, start_line, lines, config, schema)?;
    reconstruct_object_class_attribute(&mut entry);
    complete_rdn_attributes(&mut entry);
    Ok(ChangeRecord::Add(entry))
}

/// An add change record carries its object classes as a literal
/// `objectClass` attribute (spec §4.5), unlike a plain entry where they
/// live in `Entry::object_classes`.
fn reconstruct_object_class_attribute(entry: &mut Entry) {
    if entry.object_classes.is_empty() {
        return;
    }
    let values = entry
        .object_classes
        .iter()
        .map(|name| name.clone().into_bytes())
        .collect();
    entry
        .user_attributes
        .insert(0, Attribute::new("objectClass", values));
}

fn parse_mod_op(op: &str) -> std::result::Result<ModOp, String> {
    match op {
        "add" => Ok(ModOp::Add),
        "delete" => Ok(ModOp::Delete),
        "replace" => Ok(ModOp::Replace),
        "increment" => Ok(ModOp::Increment),
        other => Err(format!("invalid change marker: {}", other)),
    }
}

fn parse_modify_body(
    lines: &[LogicalLine],
    config: &dyn ImportConfig,
) -> Result<Vec<Modification>> {
    let mut mods = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let header = &lines[i];
        let (op_raw, attr_raw) =
            split_line(&header.text).map_err(|e| LdifError::parse(header.line_no, e))?;
        let op = parse_mod_op(&op_raw).map_err(|e| LdifError::parse(header.line_no, e))?;
        let attr_bytes = decode_value(attr_raw, config.url_fetcher())
            .map_err(|e| LdifError::parse(header.line_no, e))?;
        let attr_name = String::from_utf8(attr_bytes).map_err(|_| {
            LdifError::parse(header.line_no, "attribute name is not valid UTF-8")
        })?;
        i += 1;

        let mut builder = AttributeBuilder::new(AttributeDescription::parse(&attr_name));
        let mut terminated = false;
        while i < lines.len() {
            let line = &lines[i];
            if line.text == b"-" {
                i += 1;
                terminated = true;
                break;
            }
            let (value_attrdesc, raw) =
                split_line(&line.text).map_err(|e| LdifError::parse(line.line_no, e))?;
            if !value_attrdesc.eq_ignore_ascii_case(&attr_name) {
                return Err(LdifError::parse(
                    line.line_no,
                    "attribute name mismatch in change-modify",
                ));
            }
            let bytes = decode_value(raw, config.url_fetcher())
                .map_err(|e| LdifError::parse(line.line_no, e))?;
            builder.add_value(bytes);
            i += 1;
        }
        if !terminated {
            return Err(LdifError::parse(
                header.line_no,
                "unexpected end of modify operation",
            ));
        }
        mods.push(Modification {
            op,
            attribute: builder.materialise(),
        });
    }
    Ok(mods)
}

fn parse_moddn_body(
    lines: &[LogicalLine],
    changetype_line: u64,
    config: &dyn ImportConfig,
) -> Result<(Rdn, bool, Option<Dn>)> {
    let newrdn_line = lines
        .first()
        .ok_or_else(|| LdifError::parse(changetype_line, "expected 'newrdn'"))?;
    let (attrdesc, raw) = split_line(&newrdn_line.text)
        .map_err(|e| LdifError::parse(newrdn_line.line_no, e))?;
    if !attrdesc.eq_ignore_ascii_case("newrdn") {
        return Err(LdifError::parse(newrdn_line.line_no, "expected 'newrdn'"));
    }
    let bytes = decode_value(raw, config.url_fetcher())
        .map_err(|e| LdifError::parse(newrdn_line.line_no, e))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| LdifError::parse(newrdn_line.line_no, "newrdn value is not valid UTF-8"))?;
    let new_rdn = Rdn::parse(&text).map_err(|e| LdifError::parse(newrdn_line.line_no, e))?;

    let delold_line = lines
        .get(1)
        .ok_or_else(|| LdifError::parse(newrdn_line.line_no, "expected 'deleteoldrdn'"))?;
    let (attrdesc, raw) = split_line(&delold_line.text)
        .map_err(|e| LdifError::parse(delold_line.line_no, e))?;
    if !attrdesc.eq_ignore_ascii_case("deleteoldrdn") {
        return Err(LdifError::parse(
            delold_line.line_no,
            "expected 'deleteoldrdn'",
        ));
    }
    let bytes = decode_value(raw, config.url_fetcher())
        .map_err(|e| LdifError::parse(delold_line.line_no, e))?;
    let text = String::from_utf8(bytes).map_err(|_| {
        LdifError::parse(delold_line.line_no, "deleteoldrdn value is not valid UTF-8")
    })?;
    let delete_old_rdn = parse_bool(&text)
        .ok_or_else(|| LdifError::parse(delold_line.line_no, "invalid 'deleteoldrdn' value"))?;

    let new_superior = match lines.get(2) {
        None => None,
        Some(sup_line) => {
            let (attrdesc, raw) = split_line(&sup_line.text)
                .map_err(|e| LdifError::parse(sup_line.line_no, e))?;
            if !attrdesc.eq_ignore_ascii_case("newsuperior") {
                return Err(LdifError::parse(
                    sup_line.line_no,
                    "garbage at end of modify-DN record",
                ));
            }
            let bytes = decode_value(raw, config.url_fetcher())
                .map_err(|e| LdifError::parse(sup_line.line_no, e))?;
            let text = String::from_utf8(bytes).map_err(|_| {
                LdifError::parse(sup_line.line_no, "newsuperior value is not valid UTF-8")
            })?;
            Some(Dn::parse(&text).map_err(|e| LdifError::parse(sup_line.line_no, e))?)
        }
    };

    if let Some(extra) = lines.get(3) {
        return Err(LdifError::parse(
            extra.line_no,
            "garbage at end of modify-DN record",
        ));
    }

    Ok((new_rdn, delete_old_rdn, new_superior))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "0" | "false" | "no" => Some(false),
        "1" | "true" | "yes" => Some(true),
        _ => None,
    }
}
