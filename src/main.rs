use std::path::PathBuf;
use std::process;

use clap::Parser;

use bedrock::target::{Arch, ImageKind, OutputFormat, Target};

#[derive(Parser)]
#[command(
    name = "bedrock",
    version,
    about = "Compile managed bytecode into a bootable bare-metal kernel"
)]
struct Cli {
    /// Input module listing
    input: PathBuf,
    /// Output artifact path (default: input path with the artifact's extension)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Output format: bin (flat binary) or elf (linked executable)
    #[arg(long, default_value = "elf")]
    format: String,
    /// Bootable image around the executable: none or iso
    #[arg(long, default_value = "none")]
    image: String,
    /// Target architecture (amd64)
    #[arg(long, default_value = "amd64")]
    arch: String,
    /// Directory with the bootloader's support files, for --image iso
    #[arg(long, default_value = "/usr/share/limine")]
    limine_dir: PathBuf,
    /// Fail the build if any opcode has no lowering rule
    #[arg(long)]
    strict: bool,
}

fn main() {
    let cli = Cli::parse();

    let Some(arch) = Arch::from_name(&cli.arch) else {
        die(format!("unknown architecture '{}'", cli.arch));
    };
    let Some(format) = OutputFormat::from_name(&cli.format) else {
        die(format!("unknown output format '{}'", cli.format));
    };
    let Some(image) = ImageKind::from_name(&cli.image) else {
        die(format!("unknown image kind '{}'", cli.image));
    };

    let target = Target {
        arch,
        format,
        image,
        strict: cli.strict,
        limine_dir: cli.limine_dir,
    };

    let output = cli.output.unwrap_or_else(|| {
        let extension = match image {
            ImageKind::Iso => "iso",
            ImageKind::None => format.extension(),
        };
        cli.input.with_extension(extension)
    });

    match bedrock::build(&cli.input, &output, &target) {
        Ok(outputs) => {
            if outputs.skipped > 0 {
                eprintln!("warning: {} opcode(s) skipped; output is incomplete", outputs.skipped);
            }
            println!("{}", outputs.artifact.display());
        }
        Err(e) => die(e.to_string()),
    }
}

fn die(message: String) -> ! {
    eprintln!("error: {}", message);
    process::exit(1);
}
