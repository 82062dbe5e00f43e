use thiserror::Error;

/// Clause-level failures.
///
/// These never reach registry callers: the failing clause is emitted as raw text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template syntax error in '{clause}': {message}")]
    Syntax { clause: String, message: String },

    #[error("unknown reference '{0}'")]
    UnknownReference(String),

    #[error("no host of role {role} matches {query}")]
    HostNotFound { role: String, query: String },
}

impl TemplateError {
    pub fn syntax(clause: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Syntax {
            clause: clause.into(),
            message: message.into(),
        }
    }
}
