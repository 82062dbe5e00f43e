//! Raw and expanded rendering.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value, json};
use tracing::debug;

use arbor_auth::{HostEntry, HostQuery, MembershipDirectory, RoleId};
use arbor_core::{BackendError, IdContext};

use crate::ast::{Accessor, MatchValue, Reference, Root, Segment, Source};
use crate::error::TemplateError;
use crate::parser::{parse_source, parse_value_expr};
use crate::section::{ClauseKind, RawClause, Section, SectionSource, literal};

/// Marker used when none is configured.
pub const DEFAULT_MARKER: &str = "#!tmpl";

const SECTION_SEPARATOR: &str = ";";
const CLAUSE_SEPARATOR: &str = "|";

/// Result of an expanded render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub text: String,
    /// The host bound by the last successful directory assignment.
    pub last_host: Option<HostEntry>,
    /// Clauses emitted raw because they failed to parse or resolve.
    pub degraded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEngine {
    marker: String,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

impl TemplateEngine {
    pub fn new(marker: impl Into<String>) -> Self {
        Self { marker: marker.into() }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn is_template(&self, string: &str) -> bool {
        string.starts_with(&self.marker)
    }

    /// True when any contributing record's `string` starts with the marker.
    pub fn applies(&self, sources: &[SectionSource<'_>]) -> bool {
        sources
            .iter()
            .any(|s| s.string.is_some_and(|string| self.is_template(string)))
    }

    pub fn sections(&self, sources: &[SectionSource<'_>]) -> Vec<Section> {
        sources
            .iter()
            .map(|source| Section::from_source(source, &self.marker))
            .collect()
    }

    /// The template source: marker, then every section verbatim.
    pub fn render_raw(&self, sources: &[SectionSource<'_>]) -> String {
        std::iter::once(self.marker.clone())
            .chain(self.sections(sources).iter().map(Section::render_raw))
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR)
    }

    /// Evaluate every clause in order, querying `directory` once per host assignment.
    ///
    /// Only directory failures are returned as errors; clause-level problems
    /// leave the clause in its raw form.
    pub fn render_expanded(
        &self,
        sources: &[SectionSource<'_>],
        merged: &BTreeMap<String, Value>,
        directory: &dyn MembershipDirectory,
    ) -> Result<Expansion, BackendError> {
        let mut rendered = Vec::with_capacity(sources.len());
        let mut last_host = None;
        let mut degraded = 0;

        for (source, section) in sources.iter().zip(self.sections(sources)) {
            let mut scope = Scope {
                own: source.keys,
                merged,
                vars: HashMap::new(),
                ctx: role_context(source),
            };
            let mut parts = Vec::new();
            if section.owns_string {
                parts.push(section.header());
            }

            for clause in &section.clauses {
                match scope.evaluate(clause, directory)? {
                    Outcome::Text(text) => parts.push(text),
                    Outcome::Bound(host) => {
                        if host.is_some() {
                            last_host = host;
                        }
                    }
                    Outcome::Degraded(err) => {
                        debug!(section = %section.id, clause = %clause.render_raw(), error = %err, "Template clause left unexpanded");
                        degraded += 1;
                        parts.push(clause.render_raw());
                    }
                }
            }

            if !parts.is_empty() {
                rendered.push(parts.join(CLAUSE_SEPARATOR));
            }
        }

        Ok(Expansion {
            text: rendered.join(SECTION_SEPARATOR),
            last_host,
            degraded,
        })
    }
}

/// Role identifiers inside a section resolve within that record's tenant.
fn role_context(source: &SectionSource<'_>) -> IdContext {
    let ctx = IdContext::for_tenant(source.id.tenant().clone());
    match source.id.service() {
        Some(service) => ctx.with_service(service),
        None => ctx,
    }
}

/// JSON view of a host entry as seen by `{$var.field}` references.
pub fn host_value(entry: &HostEntry) -> Value {
    let extra: Map<String, Value> = entry
        .extra
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    json!({
        "name": entry.name,
        "address": entry.address,
        "port": entry.port,
        "cuk": entry.cuk,
        "extra": extra,
    })
}

enum Outcome {
    Text(String),
    /// Assignment succeeded; carries the host when it came from the directory.
    Bound(Option<HostEntry>),
    Degraded(TemplateError),
}

/// Per-section evaluation state.
struct Scope<'a> {
    own: &'a BTreeMap<String, Value>,
    merged: &'a BTreeMap<String, Value>,
    vars: HashMap<String, Value>,
    ctx: IdContext,
}

impl Scope<'_> {
    fn evaluate(&mut self, clause: &RawClause, directory: &dyn MembershipDirectory) -> Result<Outcome, BackendError> {
        let outcome = match clause.kind {
            ClauseKind::Literal => Outcome::Text(clause.render_raw()),
            ClauseKind::Expression => match self.expand(&clause.text) {
                Ok(value) => Outcome::Text(match &clause.label {
                    Some(label) => format!("{label}={value}"),
                    None => value,
                }),
                Err(err) => Outcome::Degraded(err),
            },
            ClauseKind::Assignment => self.assign(clause, directory)?,
        };
        Ok(outcome)
    }

    fn expand(&self, text: &str) -> Result<String, TemplateError> {
        let expr = parse_value_expr(text)?;
        let mut out = String::with_capacity(text.len());
        for segment in &expr.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Placeholder(reference) => out.push_str(&literal(self.lookup(reference)?)),
            }
        }
        Ok(out)
    }

    /// Bind the clause's variable. Only a directory failure is an error.
    fn assign(&mut self, clause: &RawClause, directory: &dyn MembershipDirectory) -> Result<Outcome, BackendError> {
        let Some(var) = clause.variable().filter(|v| !v.is_empty()) else {
            let err = TemplateError::syntax(clause.render_raw(), "assignment needs a variable name");
            return Ok(Outcome::Degraded(err));
        };
        let source = match parse_source(&clause.text) {
            Ok(source) => source,
            Err(err) => return Ok(Outcome::Degraded(err)),
        };

        let (value, host) = match source {
            Source::Keys(name) => {
                let reference = Reference {
                    root: Root::Key(name),
                    path: vec![],
                };
                match self.lookup(&reference) {
                    Ok(value) => (value.clone(), None),
                    Err(err) => return Ok(Outcome::Degraded(err)),
                }
            }
            Source::Hosts {
                role,
                kind,
                match_value,
                index_hint,
                extra,
            } => {
                let role = match RoleId::parse(&role, &self.ctx) {
                    Ok(role) => role,
                    Err(err) => return Ok(Outcome::Degraded(TemplateError::syntax(clause.text.clone(), err.to_string()))),
                };
                let match_value = match match_value {
                    MatchValue::Literal(s) => s,
                    MatchValue::Placeholder(reference) => match self.lookup(&reference) {
                        Ok(value) => literal(value),
                        Err(err) => return Ok(Outcome::Degraded(err)),
                    },
                };
                let query = HostQuery {
                    kind,
                    match_value,
                    index_hint,
                    extra,
                };

                match directory.lookup_host(&role, &query)? {
                    Some(entry) => (host_value(&entry), Some(entry)),
                    None => {
                        return Ok(Outcome::Degraded(TemplateError::HostNotFound {
                            role: role.to_string(),
                            query: format!("{} {}", query.kind.as_path(), query.match_value),
                        }));
                    }
                }
            }
        };

        self.vars.insert(var.to_string(), value);
        Ok(Outcome::Bound(host))
    }

    /// Section keys shadow merged keys; variables live in their own namespace.
    fn lookup(&self, reference: &Reference) -> Result<&Value, TemplateError> {
        let unknown = || TemplateError::UnknownReference(reference.to_string());
        let root = match &reference.root {
            Root::Key(name) => self.own.get(name).or_else(|| self.merged.get(name)),
            Root::Var(name) => self.vars.get(name),
        };
        reference
            .path
            .iter()
            .try_fold(root.ok_or_else(unknown)?, |value, accessor| {
                match accessor {
                    Accessor::Index(i) => value.get(*i),
                    Accessor::Field(field) => value.get(field.as_str()),
                }
                .ok_or_else(unknown)
            })
    }
}
