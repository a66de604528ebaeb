//! Bootable-media packaging: wrap the linked kernel in an ISO-9660 image
//! behind the limine bootloader, then run the bootloader's deploy tool
//! over the result so the image is BIOS-bootable.

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::backend::run_tool;
use crate::error::BuildResult;

/// Boot configuration: one multiboot2 entry, no menu delay.
fn limine_cfg(entry_name: &str) -> String {
    format!(
        "TIMEOUT=0\n\n:{}\nPROTOCOL=multiboot2\nKERNEL_PATH=boot:///kernel.elf\n",
        entry_name
    )
}

/// Author `iso` from the linked `kernel`. The staging directory is rebuilt
/// next to the output on every run.
///
/// Layout inside the image: `kernel.elf`, `limine.sys`, `limine.cfg`, and
/// the no-emulation El Torito boot image `limine-cd.bin`, the latter two
/// sourced from `limine_dir`. The volume identifier is the sanitized
/// assembly name, which doubles as the boot entry name.
pub fn build_iso(
    kernel: &Path,
    volume_id: &str,
    limine_dir: &Path,
    iso: &Path,
) -> BuildResult<()> {
    let stage = iso.with_file_name("iso_root");
    if stage.exists() {
        fs::remove_dir_all(&stage)?;
    }
    fs::create_dir_all(&stage)?;

    fs::copy(kernel, stage.join("kernel.elf"))?;
    fs::copy(limine_dir.join("limine.sys"), stage.join("limine.sys"))?;
    fs::copy(limine_dir.join("limine-cd.bin"), stage.join("limine-cd.bin"))?;
    fs::write(stage.join("limine.cfg"), limine_cfg(volume_id))?;

    run_tool(
        "xorriso",
        Command::new("xorriso")
            .args(["-as", "mkisofs", "-J", "-V"])
            .arg(volume_id)
            .args([
                "-b",
                "limine-cd.bin",
                "-no-emul-boot",
                "-boot-load-size",
                "4",
                "-boot-info-table",
            ])
            .arg(&stage)
            .arg("-o")
            .arg(iso),
    )?;

    run_tool("limine-deploy", Command::new("limine-deploy").arg(iso))
}
