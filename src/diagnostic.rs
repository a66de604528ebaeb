//! Compiler diagnostics for conditions that do not stop the build.
//!
//! The only producer today is the lowerer, which reports bytecode opcodes
//! it has no rule for and then skips them. The resulting program is
//! semantically incomplete but still emitted, matching the recovery policy
//! of the pipeline. `--strict` turns a non-empty diagnostic list into a
//! fatal error instead.

use std::fmt;

/// A compiler diagnostic (warning or error).
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Sanitized full name of the method being lowered, if any.
    pub method: Option<String>,
    /// Bytecode offset of the offending instruction, if any.
    pub offset: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn warning(message: String) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            method: None,
            offset: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            severity: Severity::Error,
            message,
            method: None,
            offset: None,
        }
    }

    pub fn in_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn at_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", kind, self.message)?;
        if let Some(method) = &self.method {
            write!(f, " in {}", method)?;
            if let Some(offset) = self.offset {
                write!(f, " at IL_{:04x}", offset)?;
            }
        }
        Ok(())
    }
}

/// Render diagnostics to stderr, one line each.
pub fn render_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{}", diagnostic);
    }
}
