//! Structured diagnostics — `spec.md` §7.
//!
//! A [`Diagnostic`] is an *expected* condition surfaced while walking a
//! translation unit or transforming a surface: a dropped variadic function,
//! a macro body that isn't a single literal, a synthesized name. These
//! accumulate and are returned alongside a successful surface; they are a
//! different channel from `anyhow::Error`, which aborts the whole pipeline.
//!
//! Every diagnostic is also logged through `tracing` at its severity as
//! it's pushed (see [`Diagnostics::push`]) so `RUST_LOG` gives live
//! visibility without waiting for the CLI's final summary print.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    UnsupportedType,
    VariadicFunctionDropped,
    MacroObjectNotTranspiled,
    MergePlatformNodes,
    AnonymousNamed,
    AliasShadowsBuiltin,
}

impl DiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticKind::UnsupportedType => Severity::Error,
            DiagnosticKind::VariadicFunctionDropped => Severity::Warning,
            DiagnosticKind::MacroObjectNotTranspiled => Severity::Warning,
            DiagnosticKind::MergePlatformNodes => Severity::Error,
            DiagnosticKind::AnonymousNamed => Severity::Info,
            DiagnosticKind::AliasShadowsBuiltin => Severity::Warning,
        }
    }
}

/// A single source location, matching the `(file, line, column)` triple
/// the parser contract of `spec.md` §6 exposes on every cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub name: String,
    pub location: Location,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, name: impl Into<String>, location: Location) -> Self {
        Diagnostic {
            severity: kind.severity(),
            kind,
            name: name.into(),
            location,
        }
    }
}

/// An ordered accumulator. Order is stable across runs given a stable
/// input (`spec.md` §7's user-visible-behavior rule) because it's simply
/// insertion order, which follows discovery order throughout the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        match diag.severity {
            Severity::Error => {
                tracing::error!(kind = ?diag.kind, name = %diag.name, file = %diag.location.file, line = diag.location.line, "diagnostic");
            }
            Severity::Warning => {
                warn!(kind = ?diag.kind, name = %diag.name, file = %diag.location.file, line = diag.location.line, "diagnostic");
            }
            Severity::Info => {
                info!(kind = ?diag.kind, name = %diag.name, file = %diag.location.file, line = diag.location.line, "diagnostic");
            }
        }
        self.0.push(diag);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        for d in other.0 {
            self.push(d);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_matches_spec_table() {
        assert_eq!(DiagnosticKind::UnsupportedType.severity(), Severity::Error);
        assert_eq!(DiagnosticKind::MergePlatformNodes.severity(), Severity::Error);
        assert_eq!(DiagnosticKind::VariadicFunctionDropped.severity(), Severity::Warning);
        assert_eq!(DiagnosticKind::MacroObjectNotTranspiled.severity(), Severity::Warning);
        assert_eq!(DiagnosticKind::AliasShadowsBuiltin.severity(), Severity::Warning);
        assert_eq!(DiagnosticKind::AnonymousNamed.severity(), Severity::Info);
    }

    #[test]
    fn has_errors_reflects_only_error_severity() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::AnonymousNamed,
            "Anonymous_Union_u",
            Location::default(),
        ));
        assert!(!diagnostics.has_errors());
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::UnsupportedType,
            "va_list",
            Location::default(),
        ));
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn preserves_insertion_order() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::new(DiagnosticKind::AnonymousNamed, "a", Location::default()));
        diagnostics.push(Diagnostic::new(DiagnosticKind::AnonymousNamed, "b", Location::default()));
        diagnostics.push(Diagnostic::new(DiagnosticKind::AnonymousNamed, "c", Location::default()));
        let names: Vec<&str> = diagnostics.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
