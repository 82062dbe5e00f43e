//! Sections and raw clauses synthesized from contributing records.

use std::collections::BTreeMap;

use serde_json::Value;

use arbor_core::ResourceId;

/// One contributing record as seen by the template engine.
#[derive(Debug, Clone, Copy)]
pub struct SectionSource<'a> {
    pub id: &'a ResourceId,
    pub string: Option<&'a str>,
    pub keys: &'a BTreeMap<String, Value>,
}

/// How a clause's text is evaluated in expanded mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClauseKind {
    /// Text with `{ref}` placeholders.
    Expression,
    /// Non-string JSON; emitted as is.
    Literal,
    /// `$name=<source>`
    Assignment,
}

/// A clause in its source form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawClause {
    /// `None` for the body clause.
    pub label: Option<String>,
    pub text: String,
    pub kind: ClauseKind,
}

impl RawClause {
    fn body(text: &str) -> Self {
        Self {
            label: None,
            text: text.to_string(),
            kind: ClauseKind::Expression,
        }
    }

    fn keyed(label: String, value: &Value) -> Self {
        match value {
            Value::String(s) => Self {
                label: Some(label),
                text: s.clone(),
                kind: ClauseKind::Expression,
            },
            other => Self {
                label: Some(label),
                text: literal(other),
                kind: ClauseKind::Literal,
            },
        }
    }

    fn assignment(label: &str, value: &Value) -> Self {
        let text = match value {
            Value::String(s) => s.clone(),
            other => literal(other),
        };
        Self {
            label: Some(label.to_string()),
            text,
            kind: ClauseKind::Assignment,
        }
    }

    /// Variable bound by an assignment clause.
    pub fn variable(&self) -> Option<&str> {
        match self.kind {
            ClauseKind::Assignment => self.label.as_deref().and_then(|l| l.strip_prefix('$')),
            _ => None,
        }
    }

    /// `label=text`, or the bare text for the body clause.
    pub fn render_raw(&self) -> String {
        match &self.label {
            Some(label) => format!("{label}={}", self.text),
            None => self.text.clone(),
        }
    }
}

/// Textual form of a JSON value inside rendered output.
///
/// Strings render unquoted, `null` renders empty and structured values render
/// as compact JSON.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// One record's section: a header plus its clauses in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub id: ResourceId,
    /// Whether the record has a `string` of its own; headers of records
    /// without one are dropped from expanded output.
    pub owns_string: bool,
    pub clauses: Vec<RawClause>,
}

impl Section {
    pub fn from_source(source: &SectionSource<'_>, marker: &str) -> Self {
        let string = source.string.filter(|s| !s.is_empty());
        let mut clauses = Vec::with_capacity(source.keys.len() + 1);

        if let Some(s) = string {
            let body = s.strip_prefix(marker).unwrap_or(s);
            if !body.is_empty() {
                clauses.push(RawClause::body(body));
            }
        }

        for (name, value) in source.keys {
            if name.starts_with('$') {
                clauses.push(RawClause::assignment(name, value));
                continue;
            }
            match value {
                Value::Array(items) => clauses.extend(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| RawClause::keyed(format!("{name}[{i}]"), item)),
                ),
                Value::Object(fields) => clauses.extend(
                    fields
                        .iter()
                        .map(|(field, item)| RawClause::keyed(format!("{name}.{field}"), item)),
                ),
                scalar => clauses.push(RawClause::keyed(name.clone(), scalar)),
            }
        }

        Self {
            id: source.id.clone(),
            owns_string: string.is_some(),
            clauses,
        }
    }

    pub fn header(&self) -> String {
        format!("@{}", self.id)
    }

    pub fn render_raw(&self) -> String {
        std::iter::once(self.header())
            .chain(self.clauses.iter().map(RawClause::render_raw))
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(value: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn clauses_follow_key_order_with_assignments_first() {
        let id: ResourceId = "acme:resource:app".parse().unwrap();
        let keys = keys(json!({
            "url": "pg://{$db.address}",
            "$db": "hosts(db /hosts/name primary 0)",
            "ports": [80, 443],
            "limits": {"cpu": "2", "mem": null},
        }));
        let section = Section::from_source(
            &SectionSource {
                id: &id,
                string: Some("#!tmpl"),
                keys: &keys,
            },
            "#!tmpl",
        );

        assert!(section.owns_string);
        assert_eq!(
            section.render_raw(),
            "@acme:resource:app|$db=hosts(db /hosts/name primary 0)|limits.cpu=2|limits.mem=|ports[0]=80|ports[1]=443|url=pg://{$db.address}"
        );
        assert_eq!(section.clauses[0].variable(), Some("db"));
        assert_eq!(section.clauses[3].kind, ClauseKind::Literal);
    }

    #[test]
    fn body_clause_strips_marker() {
        let id: ResourceId = "acme:resource:app".parse().unwrap();
        let empty = BTreeMap::new();
        let section = Section::from_source(
            &SectionSource {
                id: &id,
                string: Some("#!tmplhost={host}"),
                keys: &empty,
            },
            "#!tmpl",
        );
        assert_eq!(section.clauses, vec![RawClause::body("host={host}")]);

        let section = Section::from_source(
            &SectionSource {
                id: &id,
                string: Some("plain"),
                keys: &empty,
            },
            "#!tmpl",
        );
        assert_eq!(section.render_raw(), "@acme:resource:app|plain");
    }

    #[test]
    fn record_without_string_has_no_body() {
        let id: ResourceId = "acme:resource:app".parse().unwrap();
        let keys = keys(json!({"a": "1"}));
        let section = Section::from_source(
            &SectionSource {
                id: &id,
                string: Some(""),
                keys: &keys,
            },
            "#!tmpl",
        );
        assert!(!section.owns_string);
        assert_eq!(section.render_raw(), "@acme:resource:app|a=1");
    }

    #[test]
    fn literal_rendering() {
        assert_eq!(literal(&Value::Null), "");
        assert_eq!(literal(&json!("x")), "x");
        assert_eq!(literal(&json!(5)), "5");
        assert_eq!(literal(&json!([1, "a"])), "[1,\"a\"]");
    }
}
