//! Build pipeline: read → lower → emit → assemble → link → image.
//!
//! Synchronous end-to-end. External tools run as awaited child processes;
//! any non-zero exit aborts the build with the tool's status. Re-running
//! on the same input produces byte-identical output.

use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::create_backend;
use crate::diagnostic::render_diagnostics;
use crate::error::{BuildError, BuildResult};
use crate::image;
use crate::lower::Lowerer;
use crate::reader;
use crate::target::{ImageKind, OutputFormat, Target};

/// What a successful build produced.
#[derive(Clone, Debug)]
pub struct BuildOutputs {
    /// Emitted assembly source.
    pub asm: PathBuf,
    /// Final artifact: flat binary, linked ELF, or bootable ISO.
    pub artifact: PathBuf,
    /// Count of unsupported opcodes that were skipped.
    pub skipped: usize,
}

/// Run the whole pipeline. `output` names the final artifact; the
/// assembly source and intermediate object land next to it.
pub fn build(input: &Path, output: &Path, target: &Target) -> BuildResult<BuildOutputs> {
    target.validate()?;

    let module = reader::read_module(input)?;

    let mut backend = create_backend(target.arch);
    backend.initialize(target);

    let (unit, diagnostics) = Lowerer::new(&module, backend.pointer_size()).lower()?;
    render_diagnostics(&diagnostics);
    if target.strict && !diagnostics.is_empty() {
        return Err(BuildError::Strict(diagnostics.len()));
    }

    let asm = output.with_extension("asm");
    fs::write(&asm, backend.compile(&unit)?)?;

    let artifact = match target.format {
        OutputFormat::Bin => {
            // nasm's bin format is already the final flat artifact.
            backend.assemble(&asm, output)?;
            output.to_path_buf()
        }
        OutputFormat::Elf => {
            let object = output.with_extension("o");
            backend.assemble(&asm, &object)?;
            match target.image {
                ImageKind::None => {
                    backend.link(&object, output)?;
                    output.to_path_buf()
                }
                ImageKind::Iso => {
                    let kernel = output.with_extension("elf");
                    backend.link(&object, &kernel)?;
                    image::build_iso(&kernel, &unit.assembly, &target.limine_dir, output)?;
                    output.to_path_buf()
                }
            }
        }
    };

    Ok(BuildOutputs {
        asm,
        artifact,
        skipped: diagnostics.len(),
    })
}
