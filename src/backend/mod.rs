//! Architecture backends.
//!
//! A backend consumes the frontend's LIR stream and drives the native
//! toolchain. The [`Architecture`] trait is the only polymorphism in the
//! pipeline; everything behind it is target-specific.

pub mod amd64;

use std::path::Path;
use std::process::Command;

use crate::error::{BuildError, BuildResult};
use crate::lower::CompilationUnit;
use crate::target::{Arch, Target};

pub use amd64::Amd64;

/// A native code-generation target.
pub trait Architecture {
    fn name(&self) -> &'static str;

    /// Native word width in bytes.
    fn pointer_size(&self) -> u32;

    /// Bind the backend to the resolved build configuration.
    fn initialize(&mut self, target: &Target);

    /// Translate the LIR stream into assembly source text.
    fn compile(&mut self, unit: &CompilationUnit) -> BuildResult<String>;

    /// Run the external assembler over the emitted source.
    fn assemble(&self, asm: &Path, object: &Path) -> BuildResult<()>;

    /// Link the object into a freestanding executable.
    fn link(&self, object: &Path, executable: &Path) -> BuildResult<()>;
}

/// Instantiate the backend for an architecture selection.
pub fn create_backend(arch: Arch) -> Box<dyn Architecture> {
    match arch {
        Arch::Amd64 => Box::new(Amd64::new()),
    }
}

/// Spawn an external tool, await it, and surface a non-zero exit status.
pub(crate) fn run_tool(tool: &'static str, command: &mut Command) -> BuildResult<()> {
    let status = command
        .status()
        .map_err(|source| BuildError::Spawn { tool, source })?;
    if status.success() {
        Ok(())
    } else {
        Err(BuildError::Tool {
            tool,
            status: status.code().unwrap_or(-1),
        })
    }
}
