use building_types::QueryError;
use evaluating::{DocumentError, EvaluationError};
use files::FileId;
use itertools::Itertools;
use layout::LayoutWarning;
use parsing::{ParseError, ParseErrorKind};

use crate::{Diagnostic, DiagnosticKind, DiagnosticsContext, Span};

pub trait ToDiagnostics {
    fn to_diagnostics(&self, context: &DiagnosticsContext<'_>) -> Vec<Diagnostic>;
}

impl ToDiagnostics for ParseError {
    fn to_diagnostics(&self, context: &DiagnosticsContext<'_>) -> Vec<Diagnostic> {
        let span = context.span_from_range(self.range);
        let diagnostic = Diagnostic::error(
            DiagnosticKind::Syntax,
            self.kind.code(),
            self.message.as_ref(),
            context.file,
            span,
        );

        let end = Span::new(span.end, span.end);
        let diagnostic = match self.kind {
            ParseErrorKind::UnterminatedGroup => diagnostic.with_fix(end, "}"),
            ParseErrorKind::UnterminatedOptions => diagnostic.with_fix(end, "]"),
            ParseErrorKind::UnterminatedMath => {
                let delimiter = if context.text_of(span).starts_with("$$") { "$$" } else { "$" };
                diagnostic.with_fix(end, delimiter)
            }
            _ => diagnostic,
        };

        vec![diagnostic]
    }
}

impl ToDiagnostics for EvaluationError {
    fn to_diagnostics(&self, context: &DiagnosticsContext<'_>) -> Vec<Diagnostic> {
        let span = context.span_from_range(self.span());

        let (code, message) = match self {
            EvaluationError::NotInScope { name, .. } => {
                ("NotInScope", format!("'{name}' is not in scope"))
            }
            EvaluationError::ArityMismatch { name, expected, actual, .. } => (
                "ArityMismatch",
                format!("'{name}' expects {expected} arguments, got {actual}"),
            ),
            EvaluationError::RecursiveExpansion { name, .. } => {
                ("RecursiveExpansion", format!("Recursive expansion of '{name}'"))
            }
            EvaluationError::ExpansionLimit { name, .. } => {
                ("ExpansionLimit", format!("Expansion of '{name}' exceeds the expansion limit"))
            }
            EvaluationError::InvalidParameter { index, .. } => {
                ("InvalidParameter", format!("Parameter #{index} is not bound here"))
            }
            EvaluationError::InvalidArity { text, .. } => {
                ("InvalidArity", format!("Invalid parameter count '{text}', expected 0 to 9"))
            }
            EvaluationError::IncludeCycle { name, .. } => {
                ("IncludeCycle", format!("Including '{name}' creates a cycle"))
            }
            EvaluationError::IncludeNotFound { name, .. } => {
                ("IncludeNotFound", format!("Cannot include '{name}'"))
            }
            EvaluationError::InvalidLength { option, error, .. } => {
                ("InvalidLength", format!("Invalid length for '{option}': {error}"))
            }
            EvaluationError::UnknownEnvironment { name, .. } => {
                ("UnknownEnvironment", format!("Unknown environment '{name}'"))
            }
            EvaluationError::MismatchedEnvironment { begin, end, .. } => (
                "MismatchedEnvironment",
                format!("Environment '{begin}' is closed by '{end}'"),
            ),
            EvaluationError::Misplaced { name, context, .. } => {
                ("Misplaced", format!("{name} {context}"))
            }
        };

        vec![Diagnostic::error(DiagnosticKind::Binding, code, message, context.file, span)]
    }
}

impl ToDiagnostics for DocumentError {
    fn to_diagnostics(&self, context: &DiagnosticsContext<'_>) -> Vec<Diagnostic> {
        match self {
            DocumentError::UnresolvedReference { key, node } => {
                let Some((file, span)) = context.span_from_node(*node) else { return vec![] };
                let message = format!("Reference to undefined label '{key}'");
                vec![Diagnostic::error(DiagnosticKind::Binding, "UnresolvedReference", message, file, span)]
            }
            DocumentError::DuplicateLabel { key, first, second } => {
                let Some((file, span)) = context.span_from_node(*second) else { return vec![] };
                let message = format!("Label '{key}' is already defined");
                let diagnostic =
                    Diagnostic::error(DiagnosticKind::Binding, "DuplicateLabel", message, file, span);
                let Some((first_file, first_span)) = context.span_from_node(*first) else {
                    return vec![diagnostic];
                };
                vec![diagnostic.with_related(first_file, first_span, "First defined here")]
            }
        }
    }
}

impl ToDiagnostics for LayoutWarning {
    fn to_diagnostics(&self, context: &DiagnosticsContext<'_>) -> Vec<Diagnostic> {
        let Some((file, span)) = context.span_from_node(self.node()) else { return vec![] };
        vec![Diagnostic::warning(DiagnosticKind::Layout, self.code(), self.message(), file, span)]
    }
}

impl ToDiagnostics for QueryError {
    fn to_diagnostics(&self, context: &DiagnosticsContext<'_>) -> Vec<Diagnostic> {
        match self {
            QueryError::Cancelled => vec![],
            QueryError::Cycle { stack } => {
                let stack = stack.iter().map(|key| format!("{key:?}")).join(" -> ");
                let message = format!("Query cycle: {stack}");
                vec![internal(context.file, "QueryCycle", message)]
            }
        }
    }
}

/// A diagnostic for a violated engine invariant, reported at the start of
/// the file.
pub fn internal(file: FileId, code: &'static str, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(DiagnosticKind::Internal, code, message, file, Span::default())
}

#[cfg(test)]
mod tests {
    use evaluating::{Includes, assemble, evaluate_document};
    use files::SourceStore;

    use crate::{DiagnosticKind, DiagnosticsContext, Span, ToDiagnostics};

    #[test]
    fn test_parse_error_fix() {
        let source = "A {B C";
        let mut store = SourceStore::default();
        let file = store.insert("main.fol", source);
        let (_, errors) = parsing::parse_text(source);

        let context = DiagnosticsContext::new(file, source);
        let [diagnostic] = &errors[0].to_diagnostics(&context)[..] else {
            panic!("expected one diagnostic");
        };
        assert_eq!(diagnostic.kind, DiagnosticKind::Syntax);
        assert_eq!(diagnostic.code.as_str(), "UnterminatedGroup");
        let fix = diagnostic.fix.as_ref().unwrap();
        assert_eq!(fix.span, Span::new(6, 6));
        assert_eq!(fix.replacement, "}");
    }

    #[test]
    fn test_evaluation_error_offset() {
        let source = "First\n\nA {B} C";
        let mut store = SourceStore::default();
        let file = store.insert("main.fol", source);
        let (parsed, _) = parsing::parse_text(source);
        let document = evaluate_document(file, &parsed.syntax_node(), &Includes::default());

        let entry = &document.blocks[1];
        let context = DiagnosticsContext::new(file, source).with_offset(entry.range.start());
        let diagnostics = entry.block.errors[0].to_diagnostics(&context);
        assert_eq!(diagnostics[0].message, "'B' is not in scope");
        assert_eq!(context.text_of(diagnostics[0].span), "{B}");
    }

    #[test]
    fn test_duplicate_label_related() {
        let source = "\\section{A}\\label{x}\n\n\\section{B}\\label{x}";
        let mut store = SourceStore::default();
        let file = store.insert("main.fol", source);
        let (parsed, _) = parsing::parse_text(source);
        let document = evaluate_document(file, &parsed.syntax_node(), &Includes::default());
        let tree = assemble(&document);

        let context = DiagnosticsContext::new(file, source).with_tree(&tree);
        let diagnostics = tree.errors()[0].to_diagnostics(&context);
        assert_eq!(context.text_of(diagnostics[0].span), "\\label{x}");
        assert_eq!(diagnostics[0].span.start, 33);
        assert_eq!(diagnostics[0].related[0].span, Span::new(11, 20));
    }
}
