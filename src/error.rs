//! Fatal error taxonomy for the build pipeline.
//!
//! Everything here terminates the build. The one recoverable condition,
//! a bytecode opcode with no lowering rule, is a
//! [`crate::diagnostic::Diagnostic`] instead, unless `--strict` promotes it.

use std::path::PathBuf;

use thiserror::Error;

/// A fatal pipeline error.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Incompatible flag combination, rejected before any compilation work.
    #[error("configuration error: {0}")]
    Config(String),

    /// The input module listing could not be understood.
    #[error("{}:{line}: {message}", path.display())]
    Input {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// The module has no method marked as the entry point.
    #[error("module '{0}' has no entry point")]
    NoEntryPoint(String),

    /// Unsupported opcodes were encountered under `--strict`.
    #[error("{0} unsupported opcode(s) encountered in strict mode")]
    Strict(usize),

    /// An external tool (assembler, linker, image builder) failed.
    #[error("{tool} exited with status {status}")]
    Tool { tool: &'static str, status: i32 },

    /// An external tool could not be spawned at all.
    #[error("cannot run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type BuildResult<T> = Result<T, BuildError>;
