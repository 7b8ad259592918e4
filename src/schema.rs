//! A read-only schema contract, plus a minimal in-memory implementation
//! (an RFC 4512 definition parser and lookup table) used as the default
//! schema and in tests. The schema compiler itself is out of scope: this
//! module only consumes already-parsed object-class/attribute-type
//! definitions, it does not resolve them against a directory-wide
//! schema store.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

// ---------------------------------------------------------------------------
// CaseFold -- case-insensitive string key for HashMap
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CaseFold(String);

impl CaseFold {
    fn new(s: &str) -> Self {
        CaseFold(s.to_string())
    }
}

impl PartialEq for CaseFold {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for CaseFold {}

impl Hash for CaseFold {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

// ---------------------------------------------------------------------------
// Syntax -- per-attribute value acceptance and BER-encoding requirement
// ---------------------------------------------------------------------------

/// Contract for an attribute syntax: whether it requires binary transfer,
/// and whether a given value conforms to it.
pub trait Syntax: fmt::Debug {
    fn is_ber_encoding_required(&self) -> bool;
    /// Returns `Ok(())` if `value` is acceptable, else `Err(reason)`.
    fn value_is_acceptable(&self, value: &[u8]) -> Result<(), String>;
}

/// Accepts any UTF-8 text. The common case (DirectoryString and
/// friends); not binary-transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryStringSyntax;

impl Syntax for DirectoryStringSyntax {
    fn is_ber_encoding_required(&self) -> bool {
        false
    }
    fn value_is_acceptable(&self, value: &[u8]) -> Result<(), String> {
        std::str::from_utf8(value)
            .map(|_| ())
            .map_err(|_| "value is not valid UTF-8".to_string())
    }
}

/// Accepts arbitrary bytes and requires binary transfer (e.g.
/// `jpegPhoto`, `userCertificate`).
#[derive(Debug, Clone, Copy, Default)]
pub struct OctetStringSyntax;

impl Syntax for OctetStringSyntax {
    fn is_ber_encoding_required(&self) -> bool {
        true
    }
    fn value_is_acceptable(&self, _value: &[u8]) -> Result<(), String> {
        Ok(())
    }
}

/// Accepts only values that parse as a distinguished name.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnSyntax;

impl Syntax for DnSyntax {
    fn is_ber_encoding_required(&self) -> bool {
        false
    }
    fn value_is_acceptable(&self, value: &[u8]) -> Result<(), String> {
        let s = std::str::from_utf8(value).map_err(|_| "DN is not valid UTF-8".to_string())?;
        crate::dn::Dn::parse(s).map(|_| ()).map_err(|e| e)
    }
}

// ---------------------------------------------------------------------------
// ObjectClass, AttributeType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClassKind {
    Abstract,
    Structural,
    Auxiliary,
}

#[derive(Debug, Clone)]
pub struct ObjectClass {
    pub oid: String,
    pub names: Vec<String>,
    pub sup: Vec<String>,
    pub kind: ObjectClassKind,
    pub must: Vec<String>,
    pub may: Vec<String>,
}

impl ObjectClass {
    pub fn name(&self) -> &str {
        self.names.first().map(|s| s.as_str()).unwrap_or(&self.oid)
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone)]
pub struct AttributeType {
    pub oid: String,
    pub names: Vec<String>,
    pub single_value: bool,
    pub operational: bool,
    pub syntax: SyntaxKind,
}

/// A small closed set of syntaxes, enough for the reader's own
/// enforcement needs. A host schema compiler is free to map its own,
/// richer syntax OIDs onto this set when implementing `Schema`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    DirectoryString,
    OctetString,
    Dn,
}

impl SyntaxKind {
    pub fn as_syntax(&self) -> Box<dyn Syntax> {
        match self {
            SyntaxKind::DirectoryString => Box::new(DirectoryStringSyntax),
            SyntaxKind::OctetString => Box::new(OctetStringSyntax),
            SyntaxKind::Dn => Box::new(DnSyntax),
        }
    }
}

impl AttributeType {
    pub fn name(&self) -> &str {
        self.names.first().map(|s| s.as_str()).unwrap_or(&self.oid)
    }

    pub fn is_ber_encoding_required(&self) -> bool {
        self.syntax.as_syntax().is_ber_encoding_required()
    }

    pub fn value_is_acceptable(&self, value: &[u8]) -> Result<(), String> {
        self.syntax.as_syntax().value_is_acceptable(value)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// RFC 4512 schema definition parsers
// ---------------------------------------------------------------------------

/// Tokenizer for RFC 4512 schema definitions.
struct SchemaTokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> SchemaTokenizer<'a> {
    fn new(input: &'a str) -> Self {
        SchemaTokenizer { input, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input.as_bytes()[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    /// Read the next token. Returns None at end of input.
    /// Tokens: '(', ')', '$', quoted strings 'name', or bare words.
    fn next_token(&mut self) -> Option<String> {
        self.skip_whitespace();
        if self.pos >= self.input.len() {
            return None;
        }
        let b = self.input.as_bytes()[self.pos];
        match b {
            b'(' | b')' | b'$' => {
                self.pos += 1;
                Some((b as char).to_string())
            }
            b'\'' => {
                self.pos += 1;
                let start = self.pos;
                while self.pos < self.input.len() && self.input.as_bytes()[self.pos] != b'\'' {
                    self.pos += 1;
                }
                let s = self.input[start..self.pos].to_string();
                if self.pos < self.input.len() {
                    self.pos += 1;
                }
                Some(s)
            }
            _ => {
                let start = self.pos;
                while self.pos < self.input.len() {
                    let c = self.input.as_bytes()[self.pos];
                    if c.is_ascii_whitespace() || c == b'(' || c == b')' || c == b'\'' || c == b'$'
                    {
                        break;
                    }
                    self.pos += 1;
                }
                Some(self.input[start..self.pos].to_string())
            }
        }
    }

    fn read_single_value(&mut self) -> Option<String> {
        self.next_token()
    }

    /// Read a list of names/OIDs: either a single value or ( val1 $ val2 ... ).
    fn read_oid_list(&mut self) -> Vec<String> {
        self.skip_whitespace();
        if self.pos < self.input.len() && self.input.as_bytes()[self.pos] == b'(' {
            self.next_token();
            let mut result = Vec::new();
            while let Some(tok) = self.next_token() {
                if tok == ")" {
                    break;
                }
                if tok == "$" {
                    continue;
                }
                result.push(tok);
            }
            result
        } else {
            match self.read_single_value() {
                Some(v) if v != ")" => vec![v],
                _ => vec![],
            }
        }
    }

    /// Skip past the next token or parenthesized group (for unrecognized keywords).
    fn skip_value(&mut self) {
        self.skip_whitespace();
        if self.pos < self.input.len() && self.input.as_bytes()[self.pos] == b'(' {
            self.next_token();
            let mut depth = 1;
            while depth > 0 {
                match self.next_token() {
                    Some(t) if t == "(" => depth += 1,
                    Some(t) if t == ")" => depth -= 1,
                    None => break,
                    _ => {}
                }
            }
        } else if self.pos < self.input.len() && self.input.as_bytes()[self.pos] == b'\'' {
            self.next_token();
        } else {
            let saved_pos = self.pos;
            if let Some(tok) = self.next_token() {
                if tok == ")" || tok.chars().all(|c| c.is_ascii_uppercase() || c == '-') {
                    self.pos = saved_pos;
                }
            }
        }
    }
}

/// Parse an RFC 4512 ObjectClassDescription string.
pub fn parse_objectclass(s: &str) -> Result<ObjectClass, String> {
    let mut tok = SchemaTokenizer::new(s);

    match tok.next_token() {
        Some(t) if t == "(" => {}
        _ => return Err("expected '('".to_string()),
    }

    let oid = tok.next_token().ok_or_else(|| "expected OID".to_string())?;

    let mut names = Vec::new();
    let mut sup = Vec::new();
    let mut kind = ObjectClassKind::Structural;
    let mut must = Vec::new();
    let mut may = Vec::new();

    loop {
        let keyword = match tok.next_token() {
            Some(t) if t == ")" => break,
            Some(t) => t,
            None => break,
        };
        match keyword.as_str() {
            "NAME" => names = tok.read_oid_list(),
            "SUP" => sup = tok.read_oid_list(),
            "ABSTRACT" => kind = ObjectClassKind::Abstract,
            "STRUCTURAL" => kind = ObjectClassKind::Structural,
            "AUXILIARY" => kind = ObjectClassKind::Auxiliary,
            "MUST" => must = tok.read_oid_list(),
            "MAY" => may = tok.read_oid_list(),
            "DESC" | "OBSOLETE" | "X-ORIGIN" | "X-SCHEMA-FILE" => {
                tok.skip_value();
            }
            _ => {
                tok.skip_value();
            }
        }
    }

    Ok(ObjectClass {
        oid,
        names,
        sup,
        kind,
        must,
        may,
    })
}

/// Parse an RFC 4512 AttributeTypeDescription string.
pub fn parse_attributetype(s: &str) -> Result<AttributeType, String> {
    let mut tok = SchemaTokenizer::new(s);

    match tok.next_token() {
        Some(t) if t == "(" => {}
        _ => return Err("expected '('".to_string()),
    }

    let oid = tok.next_token().ok_or_else(|| "expected OID".to_string())?;

    let mut names = Vec::new();
    let mut single_value = false;
    let mut no_user_modification = false;
    let mut usage_operational = false;
    let mut syntax = SyntaxKind::DirectoryString;

    loop {
        let keyword = match tok.next_token() {
            Some(t) if t == ")" => break,
            Some(t) => t,
            None => break,
        };
        match keyword.as_str() {
            "NAME" => names = tok.read_oid_list(),
            "SINGLE-VALUE" => single_value = true,
            "NO-USER-MODIFICATION" => no_user_modification = true,
            "USAGE" => {
                if let Some(v) = tok.next_token() {
                    usage_operational = v != "userApplications";
                }
            }
            "SYNTAX" => {
                if let Some(oid) = tok.next_token() {
                    syntax = map_syntax_oid(&oid);
                }
            }
            _ => {
                tok.skip_value();
            }
        }
    }

    Ok(AttributeType {
        oid,
        names,
        single_value,
        operational: usage_operational || no_user_modification,
        syntax,
    })
}

/// Map an LDAP syntax OID (RFC 4517) onto our small closed `SyntaxKind` set.
fn map_syntax_oid(oid: &str) -> SyntaxKind {
    match oid {
        "1.3.6.1.4.1.1466.115.121.1.12" => SyntaxKind::Dn,
        "1.3.6.1.4.1.1466.115.121.1.5" | "1.3.6.1.4.1.1466.115.121.1.40" => SyntaxKind::OctetString,
        _ => SyntaxKind::DirectoryString,
    }
}

// ---------------------------------------------------------------------------
// Schema trait -- the read-only contract the reader consumes
// ---------------------------------------------------------------------------

/// Read-only schema contract consumed by the entry assembler and
/// change-record parser (spec §6). The schema compiler that produces an
/// implementation of this trait is out of scope.
pub trait Schema {
    fn get_objectclass(&self, name: &str) -> Option<&ObjectClass>;
    fn get_attributetype(&self, name: &str) -> Option<&AttributeType>;

    /// Whole-entry conformance: every MUST attribute of every requested
    /// object class (and its superclasses) is present. Returns warning
    /// strings for missing superiors that were implicitly added, or an
    /// error for a genuinely unsatisfiable requirement.
    fn check_entry_conformance(
        &self,
        object_classes: &[String],
        present_types: &[String],
    ) -> Result<Vec<String>, String>;
}

// ---------------------------------------------------------------------------
// InMemorySchema -- case-insensitive lookup tables
// ---------------------------------------------------------------------------

/// A simple in-memory schema built from parsed RFC 4512 definitions.
/// Used as the default schema and in tests; a real deployment plugs in
/// its own `Schema` implementation backed by its schema compiler.
#[derive(Default)]
pub struct InMemorySchema {
    classes: HashMap<CaseFold, ObjectClass>,
    class_index: HashMap<CaseFold, usize>,
    class_list: Vec<String>,
    types: HashMap<CaseFold, AttributeType>,
    type_index: HashMap<CaseFold, usize>,
    type_list: Vec<String>,
}

impl InMemorySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_objectclass(&mut self, cls: ObjectClass) {
        let oid = cls.oid.clone();
        let idx = self.class_list.len();
        self.class_list.push(oid.clone());
        self.class_index.insert(CaseFold::new(&oid), idx);
        for name in &cls.names {
            self.class_index.insert(CaseFold::new(name), idx);
        }
        self.classes.insert(CaseFold::new(&oid), cls);
    }

    pub fn add_attributetype(&mut self, at: AttributeType) {
        let oid = at.oid.clone();
        let idx = self.type_list.len();
        self.type_list.push(oid.clone());
        self.type_index.insert(CaseFold::new(&oid), idx);
        for name in &at.names {
            self.type_index.insert(CaseFold::new(name), idx);
        }
        self.types.insert(CaseFold::new(&oid), at);
    }
}

impl Schema for InMemorySchema {
    fn get_objectclass(&self, name: &str) -> Option<&ObjectClass> {
        let idx = self.class_index.get(&CaseFold::new(name))?;
        let oid = &self.class_list[*idx];
        self.classes.get(&CaseFold::new(oid))
    }

    fn get_attributetype(&self, name: &str) -> Option<&AttributeType> {
        let idx = self.type_index.get(&CaseFold::new(name))?;
        let oid = &self.type_list[*idx];
        self.types.get(&CaseFold::new(oid))
    }

    fn check_entry_conformance(
        &self,
        object_classes: &[String],
        present_types: &[String],
    ) -> Result<Vec<String>, String> {
        let mut entroid = Entroid::new(self);
        for oc in object_classes {
            entroid.request_class(oc);
        }
        if !entroid.error.is_empty() {
            // Unknown object classes are tolerated by the caller (entry
            // assembler §4.4 step 3); conformance only checks what
            // resolved.
        }
        entroid.compute()?;

        let present: std::collections::HashSet<String> =
            present_types.iter().map(|s| s.to_ascii_lowercase()).collect();
        let mut warnings = Vec::new();
        for must in &entroid.must {
            if !present.contains(&must.name().to_ascii_lowercase()) {
                return Err(format!(
                    "entry missing required attribute: {}",
                    must.name()
                ));
            }
        }
        if entroid.structural.is_none() {
            warnings.push("no structural object class".to_string());
        }
        Ok(warnings)
    }
}

// ---------------------------------------------------------------------------
// Entroid -- computed MUST/MAY attributes for a set of objectClasses
// ---------------------------------------------------------------------------

struct Entroid<'a> {
    schema: &'a dyn Schema,
    classes: Vec<&'a ObjectClass>,
    must: Vec<&'a AttributeType>,
    may: Vec<&'a AttributeType>,
    structural: Option<&'a ObjectClass>,
    error: String,
}

impl<'a> Entroid<'a> {
    fn new(schema: &'a dyn Schema) -> Self {
        Entroid {
            schema,
            classes: Vec::new(),
            must: Vec::new(),
            may: Vec::new(),
            structural: None,
            error: String::new(),
        }
    }

    fn get_objectclass(&mut self, name: &str) -> Option<&'a ObjectClass> {
        match self.schema.get_objectclass(name) {
            Some(cls) => Some(cls),
            None => {
                self.error
                    .push_str(&format!("Unknown objectClass: {}\n", name));
                None
            }
        }
    }

    fn get_attributetype(&mut self, name: &str) -> Option<&'a AttributeType> {
        match self.schema.get_attributetype(name) {
            Some(at) => Some(at),
            None => {
                self.error
                    .push_str(&format!("Unknown attributeType: {}\n", name));
                None
            }
        }
    }

    fn request_class(&mut self, name: &str) -> Option<&'a ObjectClass> {
        let cls = self.get_objectclass(name)?;
        let ptr = cls as *const ObjectClass;
        if !self.classes.iter().any(|c| std::ptr::eq(*c, ptr)) {
            self.classes.push(cls);
        }
        Some(cls)
    }

    fn compute(&mut self) -> Result<(), String> {
        let mut i = 0;
        while i < self.classes.len() {
            let cls = self.classes[i];
            self.compute_one(cls)?;
            i += 1;
        }
        Ok(())
    }

    fn compute_one(&mut self, cls: &'a ObjectClass) -> Result<(), String> {
        for sup_name in &cls.sup {
            if self.request_class(sup_name).is_none() {
                return Err(format!("superclass not found: {}", sup_name));
            }
        }

        if cls.kind == ObjectClassKind::Structural && self.structural.is_none() {
            self.structural = Some(cls);
        }

        for attr_name in &cls.must {
            let at = match self.get_attributetype(attr_name) {
                Some(at) => at,
                None => return Err(format!("attribute type not found: {}", attr_name)),
            };
            let at_ptr = at as *const AttributeType;
            self.may.retain(|m| !std::ptr::eq(*m, at_ptr));
            if !self.must.iter().any(|m| std::ptr::eq(*m, at_ptr)) {
                self.must.push(at);
            }
        }

        for attr_name in &cls.may {
            let at = match self.get_attributetype(attr_name) {
                Some(at) => at,
                None => return Err(format!("attribute type not found: {}", attr_name)),
            };
            let at_ptr = at as *const AttributeType;
            let in_must = self.must.iter().any(|m| std::ptr::eq(*m, at_ptr));
            if !in_must {
                self.may.push(at);
            }
        }

        Ok(())
    }
}
