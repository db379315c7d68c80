//! Diagnostic message types and related structures.

use scriptlang_core::Span;

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A suggested fix for a diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Fix {
    pub(crate) replacement: String,
    pub(crate) description: String,
}

impl Fix {
    pub fn new(replacement: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            replacement: replacement.into(),
            description: description.into(),
        }
    }
}

/// Related location information for a diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedInfo {
    pub(crate) span: Span,
    pub(crate) message: String,
}

impl RelatedInfo {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

/// A single diagnostic: an error taxonomy member (`UndeclaredName`,
/// `TypeMismatch`, …) carries a kind tag so callers can match on it
/// without parsing the rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    SyntaxError,
    UndeclaredName,
    DuplicateSymbol,
    DuplicateImport,
    UnknownMember,
    TypeMismatch,
    ArityMismatch,
    CircularType,
    CircularConstant,
    NonConstInConst,
    InvalidGlobalType,
    InvalidStaticInitializer,
    DuplicateCase,
    MissingReturn,
    InvalidUsingPath,
}

impl Kind {
    pub fn code(self) -> &'static str {
        match self {
            Kind::SyntaxError => "E0001",
            Kind::UndeclaredName => "E0002",
            Kind::DuplicateSymbol => "E0003",
            Kind::DuplicateImport => "E0004",
            Kind::UnknownMember => "E0005",
            Kind::TypeMismatch => "E0006",
            Kind::ArityMismatch => "E0007",
            Kind::CircularType => "E0008",
            Kind::CircularConstant => "E0009",
            Kind::NonConstInConst => "E0010",
            Kind::InvalidGlobalType => "E0011",
            Kind::InvalidStaticInitializer => "E0012",
            Kind::DuplicateCase => "E0013",
            Kind::MissingReturn => "E0014",
            Kind::InvalidUsingPath => "E0015",
        }
    }
}

/// A diagnostic message with location, message, severity, and optional fix.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticMessage {
    pub(crate) severity: Severity,
    pub(crate) kind: Kind,
    pub(crate) span: Span,
    pub(crate) message: String,
    pub(crate) fix: Option<Fix>,
    pub(crate) related: Vec<RelatedInfo>,
}

impl DiagnosticMessage {
    pub fn error(kind: Kind, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            span,
            message: message.into(),
            fix: None,
            related: Vec::new(),
        }
    }

    pub fn warning(kind: Kind, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            span,
            message: message.into(),
            fix: None,
            related: Vec::new(),
        }
    }

    pub fn with_fix(mut self, fix: Fix) -> Self {
        self.fix = Some(fix);
        self
    }

    pub fn with_related(mut self, related: RelatedInfo) -> Self {
        self.related.push(related);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

impl std::fmt::Display for DiagnosticMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}): {} [{}]: {}",
            self.span, self.severity, self.kind.code(), self.message
        )?;
        if let Some(fix) = &self.fix {
            write!(f, " (fix: {})", fix.description)?;
        }
        for related in &self.related {
            write!(f, " (related: {} at {})", related.message, related.span)?;
        }
        Ok(())
    }
}
