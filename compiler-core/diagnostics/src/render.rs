use std::fmt::Write;
use std::ops::Range;

use files::FileId;
use itertools::Itertools;
use line_index::{LineCol, LineIndex};

use crate::{Diagnostic, Severity};

fn severity(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    }
}

pub fn format_text(diagnostics: &[Diagnostic]) -> String {
    let mut output = String::new();

    for diagnostic in diagnostics {
        let _ = writeln!(
            output,
            "{}[{}] at {}..{}: {}",
            severity(diagnostic.severity),
            diagnostic.code,
            diagnostic.span.start,
            diagnostic.span.end,
            diagnostic.message
        );

        for related in &diagnostic.related {
            let _ = writeln!(
                output,
                "  note at {}..{}: {}",
                related.span.start, related.span.end, related.message
            );
        }

        if let Some(fix) = &diagnostic.fix {
            let _ = writeln!(
                output,
                "  fix at {}..{}: insert {:?}",
                fix.span.start, fix.span.end, fix.replacement
            );
        }
    }

    output
}

/// The zero-based line and the character column of a byte offset.
fn line_column(index: &LineIndex, content: &str, offset: u32) -> Option<(u32, u32)> {
    let LineCol { line, col } = index.try_line_col(offset.into())?;
    let line_range = index.line(line)?;
    let line_content = content.get(Range::<usize>::from(line_range))?;
    let until_col = line_content.get(..col as usize)?;
    Some((line, until_col.chars().count() as u32))
}

/// Renders a diagnostic with the source line it points at.
///
/// ```text
/// error[NotInScope]: 'B' is not in scope
///  --> main.fol:1:3
///   |
/// 1 | A {B} C
///   |   ^^^
/// ```
pub fn format_annotated(diagnostic: &Diagnostic, path: &str, content: &str) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{}[{}]: {}",
        severity(diagnostic.severity),
        diagnostic.code,
        diagnostic.message
    );

    let index = LineIndex::new(content);
    let Some((line, column)) = line_column(&index, content, diagnostic.span.start) else {
        let _ = writeln!(output, " --> {path}");
        return output;
    };

    let text = index
        .line(line)
        .and_then(|range| content.get(Range::<usize>::from(range)))
        .unwrap_or_default()
        .trim_end_matches(['\n', '\r']);

    let width = match line_column(&index, content, diagnostic.span.end) {
        Some((end_line, end_column)) if end_line == line => end_column - column,
        _ => (text.chars().count() as u32).saturating_sub(column),
    };

    let number = (line + 1).to_string();
    let gutter = " ".repeat(number.len());
    let _ = writeln!(output, "{gutter}--> {path}:{}:{}", line + 1, column + 1);
    let _ = writeln!(output, "{gutter} |");
    let _ = writeln!(output, "{number} | {text}");
    let _ = writeln!(
        output,
        "{gutter} | {}{}",
        " ".repeat(column as usize),
        "^".repeat(width.max(1) as usize)
    );

    for related in &diagnostic.related {
        let location = if related.file == diagnostic.file {
            line_column(&index, content, related.span.start)
                .map(|(line, column)| format!(" at {}:{}", line + 1, column + 1))
                .unwrap_or_default()
        } else {
            String::new()
        };
        let _ = writeln!(output, "{gutter} = note{location}: {}", related.message);
    }

    if let Some(fix) = &diagnostic.fix {
        let _ = writeln!(output, "{gutter} = help: insert {:?}", fix.replacement);
    }

    output
}

pub fn to_lsp_diagnostic(
    diagnostic: &Diagnostic,
    content: &str,
    uri: &lsp_types::Url,
) -> Option<lsp_types::Diagnostic> {
    use lsp_types::{
        DiagnosticRelatedInformation, DiagnosticSeverity, Location, NumberOrString, Position, Range,
    };

    let index = LineIndex::new(content);

    let to_position = |offset: u32| -> Option<Position> {
        let (line, character) = line_column(&index, content, offset)?;
        Some(Position { line, character })
    };

    let start = to_position(diagnostic.span.start)?;
    let end = to_position(diagnostic.span.end)?;
    let range = Range { start, end };

    let severity = match diagnostic.severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
    };

    // Related spans in other files need their own content to be mapped.
    let same_file = |file: FileId| file == diagnostic.file;
    let related_information =
        diagnostic.related.iter().filter(|related| same_file(related.file)).filter_map(|related| {
            let start = to_position(related.span.start)?;
            let end = to_position(related.span.end)?;
            Some(DiagnosticRelatedInformation {
                location: Location { uri: uri.clone(), range: Range { start, end } },
                message: related.message.clone(),
            })
        });

    let related_information = related_information.collect_vec();

    Some(lsp_types::Diagnostic {
        range,
        severity: Some(severity),
        code: Some(NumberOrString::String(diagnostic.code.to_string())),
        code_description: None,
        source: Some(format!("folio/{}", diagnostic.kind.as_str())),
        message: diagnostic.message.clone(),
        related_information: if related_information.is_empty() {
            None
        } else {
            Some(related_information)
        },
        tags: None,
        data: None,
    })
}
