//! An RFC 2849 LDIF streaming reader.
//!
//! Consumes an LDIF byte stream and produces either full directory
//! entries (bulk import) or change records (add / delete / modify /
//! modify-DN) for replay against a directory. The reader is built from
//! five cooperating layers: a line source, a record framer, a value
//! decoder, an entry assembler, and a change-record parser, wired
//! together behind [`reader::LdifReader`].
//!
//! Host applications plug in their own policy via [`config::ImportConfig`]
//! and their own type system via [`schema::Schema`]; both are consumed
//! as read-only contracts, never constructed by this crate.

pub mod attr;
pub mod base64;
pub mod change;
pub mod config;
pub mod dn;
pub mod entry;
pub mod error;
pub mod line_source;
pub mod plugin;
pub mod record;
pub mod schema;
pub mod value;

mod reader;

pub use attr::{Attribute, AttributeBuilder, AttributeDescription};
pub use change::{ChangeRecord, ModOp, Modification};
pub use config::{ImportConfig, PermissiveConfig, SyntaxEnforcement};
pub use dn::{Ava, Dn, Rdn};
pub use entry::{DefaultEntryFactory, Entry, EntryFactory};
pub use error::{LdifError, Outcome, Result};
pub use plugin::ImportPlugin;
pub use reader::{LdifReader, ReaderCounters};
pub use schema::{InMemorySchema, Schema};
pub use value::{FileUrlFetcher, UrlFetcher};
