//! `arbor-template`: the record templating language.
//!
//! A record whose `string` starts with the template marker is rendered from
//! its contributing records: one section per record, one clause per `keys`
//! entry. Sections render *raw* (the template source, no lookups) or
//! *expanded* (placeholders substituted, host directory queried).
//!
//! ```text
//! #!tmpl;@acme:resource:app|$db=hosts(acme:role:db /hosts/name primary 0)|url=pg://{$db.address}:{$db.port}/app
//! ```
//!
//! The language has no loops, no recursion and no user-defined functions.

pub mod ast;
pub mod error;
pub mod parser;
pub mod render;
pub mod section;

pub use ast::{Accessor, MatchValue, Reference, Root, Segment, Source, ValueExpr};
pub use error::TemplateError;
pub use parser::{parse_reference, parse_source, parse_value_expr};
pub use render::{DEFAULT_MARKER, Expansion, TemplateEngine, host_value};
pub use section::{ClauseKind, RawClause, Section, SectionSource, literal};
