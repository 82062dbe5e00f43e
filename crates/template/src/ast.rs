//! Parsed template clauses.

use arbor_auth::HostQueryKind;

/// Step into a structured value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// `[n]` on an array.
    Index(usize),
    /// `.name` on a mapping.
    Field(String),
}

/// Where a reference starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Root {
    /// A `keys` entry.
    Key(String),
    /// A variable bound earlier in the section (`$name`).
    Var(String),
}

/// `{root accessor*}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub root: Root,
    pub path: Vec<Accessor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(Reference),
}

/// Literal text interleaved with placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValueExpr {
    pub segments: Vec<Segment>,
}

impl ValueExpr {
    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }
}

/// The match value of a host lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchValue {
    Literal(String),
    Placeholder(Reference),
}

/// Right-hand side of an assignment clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// `keys(name)`
    Keys(String),
    /// `hosts(role kind match index [attr=value])`
    Hosts {
        role: String,
        kind: HostQueryKind,
        match_value: MatchValue,
        index_hint: usize,
        extra: Option<(String, String)>,
    },
}

impl core::fmt::Display for Reference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.root {
            Root::Key(name) => f.write_str(name)?,
            Root::Var(name) => write!(f, "${name}")?,
        }
        for accessor in &self.path {
            match accessor {
                Accessor::Index(i) => write!(f, "[{i}]")?,
                Accessor::Field(name) => write!(f, ".{name}")?,
            }
        }
        Ok(())
    }
}
