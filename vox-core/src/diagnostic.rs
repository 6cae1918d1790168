//! Diagnostics recorded while compiling a Vox program.
//!
//! Every diagnostic remembers where the compiler was when it was raised:
//! the line number in the file the line came from, the raw text of that line and
//! the function being compiled (`Vmain` for top-level code).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Recorded; compilation continues but no IR is written.
    Error,
    /// Recorded, then the whole run stops.
    Fatal,
}

/// Source position of a diagnostic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub text: String,
    pub function: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Exit code the driver reports if this is the last diagnostic.
    pub code: i32,
    pub location: Location,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, location: Location) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            code: 1,
            location,
        }
    }

    pub fn fatal(message: impl Into<String>, location: Location) -> Self {
        Diagnostic {
            severity: Severity::Fatal,
            ..Diagnostic::error(message, location)
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fatal() {
            f.write_str("[FATAL ERROR]: ")?;
        }
        write!(
            f,
            "{} (at line {}: '{}' and function {})",
            self.message,
            self.location.line,
            self.location.text.trim(),
            self.location.function
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> Location {
        Location {
            line: 3,
            text: "  const X: foo = 1  ".to_string(),
            function: "Vmain".to_string(),
        }
    }

    #[test]
    fn renders_line_text_and_function() {
        let diag = Diagnostic::error("Unknown type 'foo'", location());
        assert_eq!(
            diag.to_string(),
            "Unknown type 'foo' (at line 3: 'const X: foo = 1' and function Vmain)"
        );
    }

    #[test]
    fn fatal_diagnostics_are_marked() {
        let diag = Diagnostic::fatal("broken", location()).with_code(7);
        assert!(diag.is_fatal());
        assert_eq!(diag.code, 7);
        assert!(diag.to_string().starts_with("[FATAL ERROR]: broken"));
    }
}
