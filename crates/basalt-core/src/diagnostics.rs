//! User-facing diagnostics.
//!
//! This is the sole mechanism for surfacing errors and warnings to the
//! program author. Every component reports through
//! [`Diagnostics::report`]; nothing prints directly. A compilation that
//! produced any error-severity diagnostic must be treated as failed even
//! though a structurally valid module was still emitted (best-effort mode
//! exists so one run collects all diagnostics).

use std::collections::VecDeque;
use std::fmt;

use crate::Span;

/// The severity level of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A compilation error. The emitted module must not be trusted.
    Error,
    /// A warning about potentially problematic code.
    Warning,
    /// An informational message about the compilation.
    Info,
}

/// Message templates for every diagnostic the compiler can produce.
///
/// Keeping the set closed makes messages greppable and keeps wording
/// decisions out of the lowering code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    /// An identifier could not be resolved.
    UnresolvedIdentifier,
    /// A type name could not be resolved.
    UnresolvedType,
    /// A member was not found on a type.
    UnresolvedMember,
    /// A declaration needs an explicit type annotation.
    MissingTypeAnnotation,
    /// An implicit conversion requires an explicit cast.
    ConversionRequiresCast,
    /// Two pointer types disagree on their underlying class.
    IncompatibleClasses,
    /// A pointer/integer conversion will change meaning on another target width.
    PortablePointerConversion,
    /// The same name was exported twice.
    DuplicateExport,
    /// A language construct the compiler does not support.
    UnsupportedConstruct,
    /// An unconditional endless loop.
    UnconditionalLoop,
    /// An expression is not assignable.
    NotAssignable,
    /// A literal cannot be represented in the contextual type.
    LiteralOutOfContext,
    /// An operation was applied to types it does not support.
    InvalidOperation,
    /// A call supplied the wrong number of arguments.
    ArgumentCountMismatch,
}

impl DiagnosticCode {
    /// Default severity for this code.
    pub fn kind(self) -> DiagnosticKind {
        match self {
            DiagnosticCode::PortablePointerConversion | DiagnosticCode::UnconditionalLoop => {
                DiagnosticKind::Warning
            }
            _ => DiagnosticKind::Error,
        }
    }

    /// Render the message template against its arguments.
    pub fn message(self, args: &[&str]) -> String {
        let a = |i: usize| args.get(i).copied().unwrap_or("?");
        match self {
            DiagnosticCode::UnresolvedIdentifier => format!("cannot find name '{}'", a(0)),
            DiagnosticCode::UnresolvedType => format!("cannot find type '{}'", a(0)),
            DiagnosticCode::UnresolvedMember => {
                format!("property or method '{}' does not exist on type '{}'", a(0), a(1))
            }
            DiagnosticCode::MissingTypeAnnotation => {
                format!("declaration of '{}' needs a type annotation", a(0))
            }
            DiagnosticCode::ConversionRequiresCast => {
                format!("conversion from '{}' to '{}' requires an explicit cast", a(0), a(1))
            }
            DiagnosticCode::IncompatibleClasses => {
                format!("type '{}' is not assignable to type '{}'", a(0), a(1))
            }
            DiagnosticCode::PortablePointerConversion => format!(
                "conversion between '{}' and '{}' is not portable across target pointer widths",
                a(0),
                a(1)
            ),
            DiagnosticCode::DuplicateExport => format!("duplicate export '{}'", a(0)),
            DiagnosticCode::UnsupportedConstruct => format!("unsupported construct: {}", a(0)),
            DiagnosticCode::UnconditionalLoop => {
                "unconditional loop never terminates".to_string()
            }
            DiagnosticCode::NotAssignable => "expression is not assignable".to_string(),
            DiagnosticCode::LiteralOutOfContext => {
                format!("literal '{}' cannot be represented by type '{}'", a(0), a(1))
            }
            DiagnosticCode::InvalidOperation => {
                format!("operation '{}' cannot be applied to type '{}'", a(0), a(1))
            }
            DiagnosticCode::ArgumentCountMismatch => {
                format!("'{}' expects {} argument(s), got {}", a(0), a(1), a(2))
            }
        }
    }
}

/// A single diagnostic message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// The severity level.
    pub kind: DiagnosticKind,
    /// The diagnostic code this message was rendered from.
    pub code: DiagnosticCode,
    /// The rendered message text.
    pub message: String,
    /// Where in the source the diagnostic points.
    pub span: Span,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind_str = match self.kind {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Info => "info",
        };
        write!(
            f,
            "{}:{}: {}: {}",
            self.span.line, self.span.col, kind_str, self.message
        )
    }
}

/// A collection of diagnostics accumulated over one compilation.
#[derive(Debug, Default)]
pub struct Diagnostics {
    diagnostics: VecDeque<Diagnostic>,
    has_errors: bool,
}

impl Diagnostics {
    /// Creates a new, empty diagnostics collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a diagnostic at the given span.
    ///
    /// The severity comes from the code's default.
    pub fn report(&mut self, span: Span, code: DiagnosticCode, args: &[&str]) {
        let kind = code.kind();
        if kind == DiagnosticKind::Error {
            self.has_errors = true;
        }
        self.diagnostics.push_back(Diagnostic {
            kind,
            code,
            message: code.message(args),
            span,
        });
    }

    /// Returns `true` if any error-severity diagnostic was reported.
    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    /// Returns `true` if any warning was reported.
    pub fn has_warnings(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::Warning)
    }

    /// Returns `true` if the collection contains no diagnostics.
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Removes all diagnostics and clears the error flag.
    pub fn clear(&mut self) {
        self.diagnostics.clear();
        self.has_errors = false;
    }

    /// Iterate over all diagnostics in report order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Iterate over only the error diagnostics.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Error)
    }

    /// Iterate over only the warning diagnostics.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Warning)
    }

    /// Total number of diagnostics.
    pub fn count(&self) -> usize {
        self.diagnostics.len()
    }

    /// Number of error diagnostics.
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Number of warning diagnostics.
    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Write all diagnostics to the provided writer, one per line.
    pub fn emit<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for diagnostic in &self.diagnostics {
            writeln!(writer, "{}", diagnostic)?;
        }
        Ok(())
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}
