use alloc::{
    format,
    string::{String, ToString as _},
    vec::Vec,
};
use core::fmt::{self, Display, Formatter};
use tracing::{debug, error, warn};

use crate::errors::{CatalogErrorKind, ResolveErrorKind, ResolveNoteKind, ResolveWarningKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// One accumulated finding: stable code, severity, rendered message and an
/// optional resolution-path trace for graph findings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: &'static str,
    pub severity: Severity,
    pub message: String,
    pub trace: Option<String>,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.severity.name(), self.code, self.message)?;
        if let Some(trace) = &self.trace {
            write!(f, "\n  while resolving {trace}")?;
        }
        Ok(())
    }
}

impl From<CatalogErrorKind> for Diagnostic {
    fn from(kind: CatalogErrorKind) -> Self {
        Self {
            code: kind.code(),
            severity: Severity::Error,
            message: kind.to_string(),
            trace: None,
        }
    }
}

impl From<ResolveErrorKind> for Diagnostic {
    fn from(kind: ResolveErrorKind) -> Self {
        Self {
            code: kind.code(),
            severity: Severity::Error,
            message: kind.to_string(),
            trace: None,
        }
    }
}

impl From<ResolveWarningKind> for Diagnostic {
    fn from(kind: ResolveWarningKind) -> Self {
        Self {
            code: kind.code(),
            severity: Severity::Warning,
            message: kind.to_string(),
            trace: None,
        }
    }
}

impl From<ResolveNoteKind> for Diagnostic {
    fn from(kind: ResolveNoteKind) -> Self {
        Self {
            code: kind.code(),
            severity: Severity::Info,
            message: kind.to_string(),
            trace: None,
        }
    }
}

/// Ordered, deterministic diagnostics sink.
///
/// Diagnostics are values, not control flow: callers keep planning past
/// individual failures and read the outcome here. Push order follows
/// declaration and traversal order only, never map iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: impl Into<Diagnostic>) {
        let diagnostic = diagnostic.into();
        match diagnostic.severity {
            Severity::Error => error!("{diagnostic}"),
            Severity::Warning => warn!("{diagnostic}"),
            Severity::Info => debug!("{diagnostic}"),
        }
        self.items.push(diagnostic);
    }

    pub fn push_traced(&mut self, diagnostic: impl Into<Diagnostic>, trace: String) {
        let mut diagnostic = diagnostic.into();
        diagnostic.trace = Some(trace);
        self.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|diagnostic| diagnostic.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|diagnostic| diagnostic.severity == Severity::Warning)
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Folds the accumulated errors into a single error for callers that
    /// only need pass/fail.
    ///
    /// # Errors
    /// Returns an error listing every error-severity diagnostic.
    pub fn into_result(self) -> Result<(), anyhow::Error> {
        if !self.has_errors() {
            return Ok(());
        }

        let mut message = String::new();
        for diagnostic in self.errors() {
            if !message.is_empty() {
                message.push('\n');
            }
            message.push_str(&format!("{diagnostic}"));
        }
        Err(anyhow::anyhow!(message))
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = alloc::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
