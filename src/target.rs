//! Build-target configuration: architecture, output format, image kind.
//!
//! The CLI resolves its string flags through the `from_name` constructors
//! here, so the library stays free of argument-parsing concerns.

use std::path::PathBuf;

use crate::error::{BuildError, BuildResult};

/// Native architecture to generate code for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arch {
    Amd64,
}

impl Arch {
    pub fn from_name(name: &str) -> Option<Arch> {
        match name {
            "amd64" | "x86_64" => Some(Arch::Amd64),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
        }
    }

    /// Native word width in bytes. Determines the slot size of the
    /// abstract evaluation stack.
    pub fn pointer_size(self) -> u32 {
        match self {
            Arch::Amd64 => 8,
        }
    }
}

/// Shape of the assembled artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Flat binary straight out of the assembler.
    Bin,
    /// Linked freestanding ELF executable.
    Elf,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Option<OutputFormat> {
        match name {
            "bin" => Some(OutputFormat::Bin),
            "elf" => Some(OutputFormat::Elf),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Bin => "bin",
            OutputFormat::Elf => "elf",
        }
    }
}

/// Optional bootable-media packaging around the executable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    None,
    /// ISO-9660 image wrapping the ELF behind the limine bootloader.
    Iso,
}

impl ImageKind {
    pub fn from_name(name: &str) -> Option<ImageKind> {
        match name {
            "none" => Some(ImageKind::None),
            "iso" => Some(ImageKind::Iso),
            _ => None,
        }
    }
}

/// Fully resolved build configuration.
#[derive(Clone, Debug)]
pub struct Target {
    pub arch: Arch,
    pub format: OutputFormat,
    pub image: ImageKind,
    /// Promote unsupported-opcode diagnostics to a fatal error.
    pub strict: bool,
    /// Directory holding the bootloader's support files
    /// (`limine.sys`, `limine-cd.bin`).
    pub limine_dir: PathBuf,
}

impl Target {
    /// Reject incompatible combinations before any compilation work.
    pub fn validate(&self) -> BuildResult<()> {
        if self.format == OutputFormat::Bin && self.image == ImageKind::Iso {
            return Err(BuildError::Config(
                "a raw binary cannot be packaged into a bootable ISO; use --format elf".into(),
            ));
        }
        Ok(())
    }
}
