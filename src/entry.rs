//! Entry Assembler (spec §4.4): parses a framed record as a directory
//! entry, grouping attribute lines by type and option set, enforcing
//! schema and single-valuedness, and emitting an `Entry`.

use crate::attr::{Attribute, AttributeBuilder, AttributeDescription};
use crate::config::{ImportConfig, SyntaxEnforcement};
use crate::dn::Dn;
use crate::error::{LdifError, Outcome, Result};
use crate::record::{LogicalLine, Record};
use crate::schema::Schema;
use crate::value::{decode_value, split_line};

/// A DN, its object classes, and its attributes split into user and
/// operational buckets. Warnings accumulated while assembling (duplicate
/// object classes, WARN-policy syntax violations, missing structural
/// class) ride along with the entry rather than being printed (§9).
#[derive(Debug, Clone)]
pub struct Entry {
    pub dn: Dn,
    pub object_classes: Vec<String>,
    pub user_attributes: Vec<Attribute>,
    pub operational_attributes: Vec<Attribute>,
    pub warnings: Vec<String>,
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Entry {
            dn,
            object_classes: Vec::new(),
            user_attributes: Vec::new(),
            operational_attributes: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn has_object_class(&self, name: &str) -> bool {
        self.object_classes.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn get_user_attribute(&self, attr_type: &str) -> Option<&Attribute> {
        self.user_attributes
            .iter()
            .find(|a| a.description.type_eq_ignore_case(attr_type))
    }

    pub fn get_operational_attribute(&self, attr_type: &str) -> Option<&Attribute> {
        self.operational_attributes
            .iter()
            .find(|a| a.description.type_eq_ignore_case(attr_type))
    }

    fn present_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .user_attributes
            .iter()
            .chain(self.operational_attributes.iter())
            .map(|a| a.description.attr_type.clone())
            .collect();
        if !self.object_classes.is_empty() {
            types.push("objectClass".to_string());
        }
        types
    }
}

/// Strategy interface customising entry construction (spec §9: the
/// source's `LDIFReader`/`TemplateBasedLDIFReader` inheritance becomes
/// this held-by-value strategy).
pub trait EntryFactory {
    fn build_entry(
        &self,
        record: &Record,
        config: &mut dyn ImportConfig,
        schema: &dyn Schema,
    ) -> Result<Outcome<Entry>>;
}

/// The default factory: implements spec §4.4 exactly.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEntryFactory;

impl EntryFactory for DefaultEntryFactory {
    fn build_entry(
        &self,
        record: &Record,
        config: &mut dyn ImportConfig,
        schema: &dyn Schema,
    ) -> Result<Outcome<Entry>> {
        let (dn, body) = parse_dn_header(record, config)?;

        let (include, skip_reason) = config.include_entry_dn(&dn);
        if !include {
            return Ok(Outcome::Filtered(
                skip_reason.unwrap_or_else(|| "entry excluded by import configuration".to_string()),
            ));
        }

        let mut entry = Entry::new(dn);
        assemble_body(&mut entry, record.start_line, body, config, schema)?;

        if config.validate_schema() {
            add_implicit_superiors(&mut entry.object_classes, schema);
            let present = entry.present_types();
            match schema.check_entry_conformance(&entry.object_classes, &present) {
                Ok(mut warnings) => entry.warnings.append(&mut warnings),
                Err(message) => {
                    return Err(LdifError::parse(record.start_line, message));
                }
            }
        }

        let (include, reason) = config.include_entry(&entry);
        if !include {
            return Ok(Outcome::Filtered(
                reason.unwrap_or_else(|| "entry excluded by import configuration".to_string()),
            ));
        }

        complete_rdn_attributes(&mut entry);

        Ok(Outcome::Ok(entry))
    }
}

/// Consume the header line of a record: require `dn:`, decode its value,
/// and parse it. Returns the parsed DN and the remaining body lines.
pub fn parse_dn_header<'a>(
    record: &'a Record,
    config: &dyn ImportConfig,
) -> Result<(Dn, &'a [LogicalLine])> {
    let header = record
        .lines
        .first()
        .ok_or_else(|| LdifError::parse(record.start_line, "empty record"))?;

    let (attrdesc, raw) =
        split_line(&header.text).map_err(|e| LdifError::parse(header.line_no, e))?;
    if !attrdesc.eq_ignore_ascii_case("dn") {
        return Err(LdifError::parse(
            header.line_no,
            "record does not start with 'dn:'",
        ));
    }
    let bytes = decode_value(raw, config.url_fetcher())
        .map_err(|e| LdifError::parse(header.line_no, e))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| LdifError::parse(header.line_no, "dn value is not valid UTF-8"))?;
    let dn = Dn::parse(&text).map_err(|e| LdifError::parse(header.line_no, e))?;

    Ok((dn, &record.lines[1..]))
}

/// Parse the body lines of a record into object classes and user/
/// operational attribute buckets on `entry` (spec §4.4 steps 3-4). Does
/// not run whole-entry conformance or the filter replay; callers that
/// need the full algorithm (the default factory, and the change-record
/// parser's add path) call those separately.
pub fn assemble_body(
    entry: &mut Entry,
    start_line: u64,
    lines: &[LogicalLine],
    config: &mut dyn ImportConfig,
    schema: &dyn Schema,
) -> Result<()> {
    for line in lines {
        let (attrdesc_raw, raw) =
            split_line(&line.text).map_err(|e| LdifError::parse(line.line_no, e))?;
        let description = AttributeDescription::parse(&attrdesc_raw);

        if description.attr_type.eq_ignore_ascii_case("objectclass") {
            if !config.include_object_classes() {
                continue;
            }
            let bytes = decode_value(raw, config.url_fetcher())
                .map_err(|e| LdifError::parse(line.line_no, e))?;
            let name = String::from_utf8(bytes).map_err(|_| {
                LdifError::parse(line.line_no, "objectClass value is not valid UTF-8")
            })?;
            if entry.has_object_class(&name) {
                entry
                    .warnings
                    .push(format!("duplicate objectClass: {}", name));
            } else {
                // Unknown classes are tolerated and kept by name (step 3).
                let _ = schema.get_objectclass(&name);
                entry.object_classes.push(name);
            }
            continue;
        }

        if !config.include_attribute(&description.attr_type) {
            continue;
        }

        let attr_type = schema.get_attributetype(&description.attr_type);
        let mut description = description;

        if config.validate_schema() {
            if let Some(at) = attr_type {
                if !at.is_ber_encoding_required() && description.has_option("binary") {
                    return Err(LdifError::parse(
                        line.line_no,
                        format!(
                            "attribute {} does not permit the 'binary' option",
                            at.name()
                        ),
                    ));
                }
                if at.is_ber_encoding_required() {
                    description.force_binary();
                }
            }
        }

        let bytes = decode_value(raw, config.url_fetcher())
            .map_err(|e| LdifError::parse(line.line_no, e))?;

        let enforcement = config.syntax_enforcement();
        if config.validate_schema() && enforcement != SyntaxEnforcement::Off {
            if let Some(at) = attr_type {
                if let Err(reason) = at.value_is_acceptable(&bytes) {
                    match enforcement {
                        SyntaxEnforcement::Reject => {
                            return Err(LdifError::parse(line.line_no, reason));
                        }
                        SyntaxEnforcement::Warn => {
                            entry.warnings.push(format!(
                                "{}: {}",
                                description.attr_type, reason
                            ));
                        }
                        SyntaxEnforcement::Off => unreachable!(),
                    }
                }
            }
        }

        let operational = attr_type.map(|at| at.operational).unwrap_or(false);
        let bucket = if operational {
            &mut entry.operational_attributes
        } else {
            &mut entry.user_attributes
        };

        let mut builders: Vec<AttributeBuilder> =
            std::mem::take(bucket).into_iter().map(builder_from).collect();

        let existing = builders.iter().position(|b| b.description == description);
        match existing {
            Some(i) => {
                if config.validate_schema() {
                    if let Some(at) = attr_type {
                        if at.single_value && !builders[i].values.is_empty() {
                            return Err(LdifError::parse(
                                line.line_no,
                                format!("attribute {} is single-valued", at.name()),
                            ));
                        }
                    }
                }
                let added = builders[i].add_value(bytes);
                if !added && config.validate_schema() {
                    return Err(LdifError::parse(
                        line.line_no,
                        format!("duplicate value for attribute {}", description.attr_type),
                    ));
                }
            }
            None => {
                let mut builder = AttributeBuilder::new(description);
                builder.add_value(bytes);
                builders.push(builder);
            }
        }

        *bucket = builders.into_iter().map(|b| b.materialise()).collect();
    }

    let _ = start_line;
    Ok(())
}

fn builder_from(attribute: Attribute) -> AttributeBuilder {
    AttributeBuilder {
        description: attribute.description,
        values: attribute.values,
    }
}

/// Add any superior object classes missing from `object_classes`,
/// walking the SUP chain (spec §4.4 step 5).
fn add_implicit_superiors(object_classes: &mut Vec<String>, schema: &dyn Schema) {
    let mut i = 0;
    while i < object_classes.len() {
        if let Some(oc) = schema.get_objectclass(&object_classes[i].clone()) {
            for sup in oc.sup.clone() {
                if !object_classes.iter().any(|c| c.eq_ignore_ascii_case(&sup)) {
                    object_classes.push(sup);
                }
            }
        }
        i += 1;
    }
}

/// Ensure every RDN attribute-value assertion is present in the
/// attribute map, appending it if missing (spec §4.4 step 6).
pub fn complete_rdn_attributes(entry: &mut Entry) {
    let rdn = match entry.dn.rdn().cloned() {
        Some(rdn) => rdn,
        None => return,
    };
    for ava in &rdn.avas {
        let present = entry
            .user_attributes
            .iter()
            .chain(entry.operational_attributes.iter())
            .any(|a| a.description.type_eq_ignore_case(&ava.attr_type) && a.contains(&ava.value));
        if present {
            continue;
        }
        let existing = entry
            .user_attributes
            .iter()
            .position(|a| a.description.type_eq_ignore_case(&ava.attr_type));
        match existing {
            Some(i) => entry.user_attributes[i].values.push(ava.value.clone()),
            None => entry
                .user_attributes
                .push(Attribute::single(ava.attr_type.clone(), ava.value.clone())),
        }
    }
}
