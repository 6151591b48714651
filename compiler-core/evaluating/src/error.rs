use geometry::LengthError;
use rowan::TextRange;
use smol_str::SmolStr;

/// Errors found while evaluating a block; spans are relative to the block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EvaluationError {
    NotInScope { name: SmolStr, span: TextRange },
    ArityMismatch { name: SmolStr, expected: u8, actual: usize, span: TextRange },
    RecursiveExpansion { name: SmolStr, span: TextRange },
    ExpansionLimit { name: SmolStr, span: TextRange },
    InvalidParameter { index: u8, span: TextRange },
    InvalidArity { text: SmolStr, span: TextRange },
    IncludeCycle { name: SmolStr, span: TextRange },
    IncludeNotFound { name: SmolStr, span: TextRange },
    InvalidLength { option: SmolStr, error: LengthError, span: TextRange },
    UnknownEnvironment { name: SmolStr, span: TextRange },
    MismatchedEnvironment { begin: SmolStr, end: SmolStr, span: TextRange },
    Misplaced { name: SmolStr, context: &'static str, span: TextRange },
}

impl EvaluationError {
    pub fn span(&self) -> TextRange {
        match self {
            EvaluationError::NotInScope { span, .. }
            | EvaluationError::ArityMismatch { span, .. }
            | EvaluationError::RecursiveExpansion { span, .. }
            | EvaluationError::ExpansionLimit { span, .. }
            | EvaluationError::InvalidParameter { span, .. }
            | EvaluationError::InvalidArity { span, .. }
            | EvaluationError::IncludeCycle { span, .. }
            | EvaluationError::IncludeNotFound { span, .. }
            | EvaluationError::InvalidLength { span, .. }
            | EvaluationError::UnknownEnvironment { span, .. }
            | EvaluationError::MismatchedEnvironment { span, .. }
            | EvaluationError::Misplaced { span, .. } => *span,
        }
    }
}

/// Errors found while assembling evaluated blocks into a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentError {
    UnresolvedReference { key: SmolStr, node: crate::NodeRef },
    DuplicateLabel { key: SmolStr, first: crate::NodeRef, second: crate::NodeRef },
}
