use thiserror::Error;

use crate::diagnostic::Diagnostic;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("{0}")]
    Fatal(Diagnostic, Vec<Diagnostic>),
    #[error("aborting due to {} error(s)", .diagnostics.len())]
    Aborted { diagnostics: Vec<Diagnostic> },
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Every diagnostic recorded before the run stopped, in report order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CoreError::Fatal(_, diagnostics) | CoreError::Aborted { diagnostics } => diagnostics,
            _ => &[],
        }
    }

    /// Process exit code for this failure: the last recorded error code.
    pub fn exit_code(&self) -> i32 {
        self.diagnostics().last().map_or(1, |diag| diag.code)
    }
}
