use std::fmt;
use thiserror::Error;

use crate::converter::ConvertError;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("TMC API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("conversion error: {0}")]
    Convert(#[from] ConvertError),
    #[error("invalid configuration:\n{0}")]
    Validation(Diagnostics),
    #[error("no valid scope block found: exactly one of [{allowed}] must be set")]
    UnknownScope { allowed: String },
    #[error("invalid ID {id:?}: {reason}")]
    InvalidId { id: String, reason: String },
    #[error("{resource} reached failure phase {phase}")]
    FailedPhase { resource: String, phase: String },
    #[error("timed out after {seconds}s waiting for {resource} to settle")]
    Timeout { resource: String, seconds: u64 },
    #[error("cannot set state attribute {key:?}: {reason}")]
    State { key: String, reason: String },
    #[error("provider configuration error: {0}")]
    Config(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ProviderError>,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    /// Walks through context wrappers to the error that was actually raised.
    pub fn root(&self) -> &ProviderError {
        match self {
            ProviderError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), ProviderError::NotFound(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.root(), ProviderError::Unauthorized(_))
    }

    pub fn context(self, context: impl Into<String>) -> Self {
        ProviderError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Annotates a failing result with the resource it was operating on.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> ProviderResult<T>;
}

impl<T, E: Into<ProviderError>> ResultExt<T> for Result<T, E> {
    fn context(self, context: impl Into<String>) -> ProviderResult<T> {
        self.map_err(|e| e.into().context(context))
    }
}

/// One user-facing configuration problem, anchored at an attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub attribute: String,
    pub summary: String,
}

/// A batch of validation failures reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, attribute: impl Into<String>, summary: impl Into<String>) {
        self.0.push(Diagnostic {
            attribute: attribute.into(),
            summary: summary.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    /// `Ok(())` when nothing was collected, otherwise the whole batch as one error.
    pub fn into_result(self) -> ProviderResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::Validation(self))
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {}: {}", d.attribute, d.summary)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_classification() {
        let err = ProviderError::NotFound("schedule".into()).context("backup schedule a/b/c/d");
        assert!(err.is_not_found());
        assert!(!err.is_unauthorized());
        assert!(err.to_string().starts_with("backup schedule a/b/c/d: "));
    }

    #[test]
    fn test_diagnostics_render_every_entry() {
        let mut diags = Diagnostics::new();
        diags.push("spec.template.included_namespaces", "must be set");
        diags.push("spec.template.label_selector", "must be set");
        assert_eq!(diags.len(), 2);
        let err = diags.into_result().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("included_namespaces: must be set"));
        assert!(text.contains("label_selector: must be set"));
    }

    #[test]
    fn test_empty_diagnostics_is_ok() {
        assert!(Diagnostics::new().into_result().is_ok());
    }
}
