mod collector;
mod context;
mod convert;
mod model;
mod render;

pub use collector::Collector;
pub use context::DiagnosticsContext;
pub use convert::{ToDiagnostics, internal};
pub use model::{Diagnostic, DiagnosticCode, DiagnosticKind, Fix, RelatedSpan, Severity, Span};
pub use render::{format_annotated, format_text, to_lsp_diagnostic};
