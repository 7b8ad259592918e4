//! Attribute descriptions, builders, and materialised attributes.

use std::collections::BTreeSet;

/// An attribute type plus an unordered set of lowercase option tags
/// (e.g. `lang-fr`, `binary`). Two descriptions are equal iff the type
/// names case-fold equal and the option sets are equal.
#[derive(Debug, Clone)]
pub struct AttributeDescription {
    pub attr_type: String,
    pub options: BTreeSet<String>,
}

impl AttributeDescription {
    /// Parse `type;option1;option2` (the part before a `:` on an
    /// attribute line). Options are lowercased on the way in, per spec.
    pub fn parse(raw: &str) -> AttributeDescription {
        let mut parts = raw.split(';');
        let attr_type = parts.next().unwrap_or("").to_string();
        let options = parts.map(|o| o.to_ascii_lowercase()).collect();
        AttributeDescription {
            attr_type,
            options,
        }
    }

    pub fn has_option(&self, opt: &str) -> bool {
        self.options.contains(opt)
    }

    /// Force the `binary` option present, as required when the
    /// declared syntax needs binary transfer.
    pub fn force_binary(&mut self) {
        self.options.insert("binary".to_string());
    }

    pub fn type_eq_ignore_case(&self, other: &str) -> bool {
        self.attr_type.eq_ignore_ascii_case(other)
    }
}

impl PartialEq for AttributeDescription {
    fn eq(&self, other: &Self) -> bool {
        self.attr_type.eq_ignore_ascii_case(&other.attr_type) && self.options == other.options
    }
}
impl Eq for AttributeDescription {}

/// Mutable accumulator for one attribute description's values within a
/// single record parse. Materialises into an `Attribute` on emit.
#[derive(Debug, Clone)]
pub struct AttributeBuilder {
    pub description: AttributeDescription,
    pub values: Vec<Vec<u8>>,
}

impl AttributeBuilder {
    pub fn new(description: AttributeDescription) -> Self {
        AttributeBuilder {
            description,
            values: Vec::new(),
        }
    }

    /// Add a value. Returns `false` if the value is already present
    /// (a duplicate within this builder's option set) without adding
    /// it again; the caller decides whether that is fatal.
    pub fn add_value(&mut self, value: Vec<u8>) -> bool {
        if self.values.iter().any(|v| v == &value) {
            return false;
        }
        self.values.push(value);
        true
    }

    pub fn materialise(self) -> Attribute {
        Attribute {
            description: self.description,
            values: self.values,
        }
    }
}

/// An immutable, fully materialised attribute: a description plus its
/// ordered list of byte-string values.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub description: AttributeDescription,
    pub values: Vec<Vec<u8>>,
}

impl Attribute {
    pub fn new(attr_type: impl Into<String>, values: Vec<Vec<u8>>) -> Self {
        Attribute {
            description: AttributeDescription {
                attr_type: attr_type.into(),
                options: BTreeSet::new(),
            },
            values,
        }
    }

    pub fn single(attr_type: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Attribute::new(attr_type, vec![value.into()])
    }

    pub fn contains(&self, value: &[u8]) -> bool {
        self.values.iter().any(|v| v.as_slice() == value)
    }
}
