use std::fmt;

use files::FileId;
use rowan::TextRange;

/// A byte range within a file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Span {
        Span { start, end }
    }
}

impl From<TextRange> for Span {
    fn from(range: TextRange) -> Span {
        Span::new(range.start().into(), range.end().into())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RelatedSpan {
    pub file: FileId,
    pub span: Span,
    pub message: String,
}

/// A replacement that resolves a diagnostic.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fix {
    pub span: Span,
    pub replacement: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
}

/// The stage a diagnostic comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticKind {
    Syntax,
    Binding,
    Layout,
    Internal,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::Syntax => "syntax",
            DiagnosticKind::Binding => "binding",
            DiagnosticKind::Layout => "layout",
            DiagnosticKind::Internal => "internal",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DiagnosticCode(&'static str);

impl DiagnosticCode {
    pub fn new(code: &'static str) -> DiagnosticCode {
        DiagnosticCode(code)
    }

    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub code: DiagnosticCode,
    pub message: String,
    pub file: FileId,
    pub span: Span,
    pub related: Vec<RelatedSpan>,
    pub fix: Option<Fix>,
}

impl Diagnostic {
    pub fn error(
        kind: DiagnosticKind,
        code: &'static str,
        message: impl Into<String>,
        file: FileId,
        span: Span,
    ) -> Diagnostic {
        let message = message.into();
        Diagnostic {
            severity: Severity::Error,
            kind,
            code: DiagnosticCode::new(code),
            message,
            file,
            span,
            related: vec![],
            fix: None,
        }
    }

    pub fn warning(
        kind: DiagnosticKind,
        code: &'static str,
        message: impl Into<String>,
        file: FileId,
        span: Span,
    ) -> Diagnostic {
        Diagnostic { severity: Severity::Warning, ..Diagnostic::error(kind, code, message, file, span) }
    }

    pub fn with_related(mut self, file: FileId, span: Span, message: impl Into<String>) -> Diagnostic {
        let message = message.into();
        self.related.push(RelatedSpan { file, span, message });
        self
    }

    pub fn with_fix(mut self, span: Span, replacement: impl Into<String>) -> Diagnostic {
        let replacement = replacement.into();
        self.fix = Some(Fix { span, replacement });
        self
    }
}
