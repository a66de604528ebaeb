//! x86-64 backend: LIR → NASM-syntax assembly text → nasm → ld.
//!
//! The emitter is a direct printer. Every LIR opcode maps to one
//! mnemonic; the instruction's flag set alone decides the operand
//! spelling (register-direct, sized memory operand, immediate, symbol).
//! Code goes to `.text` in stream order, data-slot labels are routed to
//! `.data`, and the entry stub plus the multiboot2 header frame the whole
//! module so the linked ELF is bootable as a kernel.

use std::fs;
use std::path::Path;
use std::process::Command;

use super::{run_tool, Architecture};
use crate::error::BuildResult;
use crate::lir::{Flags, Inst, Op, Operand, Reg, RegId, Width};
use crate::lower::CompilationUnit;
use crate::target::{OutputFormat, Target};

/// Bytes reserved for the abstract evaluation stack.
const EVAL_STACK_BYTES: u32 = 64 * 1024;
/// Bytes reserved for each of the local and argument frame regions.
const FRAME_BYTES: u32 = 8 * 1024;

/// Freestanding layout: multiboot2 header first, loaded at 1 MiB.
const LINKER_SCRIPT: &str = "\
ENTRY(_start)

SECTIONS
{
    . = 1M;

    .multiboot2 : ALIGN(8) { KEEP(*(.multiboot2)) }
    .text : { *(.text) }
    .data : { *(.data) }
    .bss : { *(.bss) }
}
";

/// The x86-64 code generator.
pub struct Amd64 {
    format: OutputFormat,
    text: Vec<String>,
    data: Vec<String>,
}

impl Amd64 {
    pub fn new() -> Self {
        Self {
            format: OutputFormat::Elf,
            text: Vec::new(),
            data: Vec::new(),
        }
    }
}

impl Default for Amd64 {
    fn default() -> Self {
        Self::new()
    }
}

impl Architecture for Amd64 {
    fn name(&self) -> &'static str {
        "amd64"
    }

    fn pointer_size(&self) -> u32 {
        8
    }

    fn initialize(&mut self, target: &Target) {
        self.format = target.format;
    }

    fn compile(&mut self, unit: &CompilationUnit) -> BuildResult<String> {
        self.text.clear();
        self.data.clear();

        for inst in &unit.insts {
            self.emit_inst(inst);
        }

        let mut out = Vec::new();
        out.push(format!(
            "; {} v{}, assembly '{}'",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            unit.assembly
        ));
        out.push("bits 64".into());
        out.push(String::new());

        // Multiboot2 header: magic, i386 architecture tag, length,
        // checksum, terminating end tag. The loader refuses the ELF
        // without it.
        out.push("section .multiboot2".into());
        out.push("align 8".into());
        out.push("mb2_header_start:".into());
        out.push("    dd 0xe85250d6".into());
        out.push("    dd 0".into());
        out.push("    dd mb2_header_end - mb2_header_start".into());
        out.push("    dd -(0xe85250d6 + (mb2_header_end - mb2_header_start))".into());
        out.push("    dw 0".into());
        out.push("    dw 0".into());
        out.push("    dd 8".into());
        out.push("mb2_header_end:".into());
        out.push(String::new());

        out.push("section .text".into());
        if self.format == OutputFormat::Elf {
            out.push("global _start".into());
        }
        out.push("_start:".into());
        out.push(format!("    mov {}, eval_stack", reg64(RegId::R0)));
        out.push(format!("    mov {}, local_frame", reg64(RegId::R3)));
        out.push(format!("    mov {}, arg_frame", reg64(RegId::R4)));
        out.append(&mut self.text);

        if !self.data.is_empty() {
            out.push(String::new());
            out.push("section .data".into());
            out.append(&mut self.data);
        }

        out.push(String::new());
        out.push("section .bss".into());
        out.push("align 16".into());
        out.push(format!("eval_stack: resb {}", EVAL_STACK_BYTES));
        out.push(format!("local_frame: resb {}", FRAME_BYTES));
        out.push(format!("arg_frame: resb {}", FRAME_BYTES));
        out.push(String::new());

        Ok(out.join("\n"))
    }

    fn assemble(&self, asm: &Path, object: &Path) -> BuildResult<()> {
        let format = match self.format {
            OutputFormat::Bin => "bin",
            OutputFormat::Elf => "elf64",
        };
        run_tool(
            "nasm",
            Command::new("nasm")
                .args(["-f", format])
                .arg(asm)
                .arg("-o")
                .arg(object),
        )
    }

    fn link(&self, object: &Path, executable: &Path) -> BuildResult<()> {
        let script = executable.with_file_name("linker.ld");
        fs::write(&script, LINKER_SCRIPT)?;
        run_tool(
            "ld",
            Command::new("ld")
                .arg("-n")
                .arg("-T")
                .arg(&script)
                .arg("-o")
                .arg(executable)
                .arg(object),
        )
    }
}

impl Amd64 {
    fn emit_inst(&mut self, inst: &Inst) {
        match inst.op {
            Op::Label => {
                let name = label_name(&inst.dst);
                if let Some(width) = inst.flags.width() {
                    // Data slot: named directive of the flagged width.
                    let init = match &inst.src {
                        Some(Operand::Imm(v)) => *v,
                        _ => 0,
                    };
                    self.data
                        .push(format!("{}: {} {}", name, data_directive(width), init));
                } else {
                    self.text.push(format!("{}:", name));
                }
            }
            Op::Comment => {
                if let Some(Operand::Text(text)) = &inst.dst {
                    self.text.push(format!("    ; {}", text));
                }
            }
            Op::Store => {
                if let Some(Operand::Text(bytes)) = &inst.dst {
                    self.text.push(format!("    db {}", bytes));
                }
            }
            Op::Nop => self.text.push("    nop".into()),
            Op::Ret => self.text.push("    ret".into()),
            Op::Call => self.text.push(format!("    call {}", label_name(&inst.dst))),
            Op::Jmp => {
                let mnemonic = jump_mnemonic(inst.flags.condition());
                self.text
                    .push(format!("    {} {}", mnemonic, label_name(&inst.dst)));
            }
            Op::Set => {
                let mnemonic = set_mnemonic(inst.flags.condition());
                self.text.push(format!(
                    "    {} {}",
                    mnemonic,
                    format_dst(inst.flags, inst.dst.as_ref())
                ));
            }
            Op::Mov | Op::Add | Op::Sub | Op::Mul | Op::And | Op::Or | Op::Xor | Op::Shl
            | Op::Shr | Op::Cmp => {
                self.text.push(format!(
                    "    {} {}, {}",
                    mnemonic(inst.op),
                    format_dst(inst.flags, inst.dst.as_ref()),
                    format_src(inst.flags, inst.src.as_ref())
                ));
            }
        }
    }
}

// ─── Operand formatting ───────────────────────────────────────────

fn format_dst(flags: Flags, operand: Option<&Operand>) -> String {
    match operand {
        Some(Operand::Reg(r)) if flags.has(Flags::DEST_POINTER) => memory_operand(flags, r),
        Some(Operand::Reg(r)) => reg_name(*r).into(),
        Some(Operand::Label(l)) if flags.has(Flags::DEST_POINTER) => symbol_operand(flags, l),
        Some(Operand::Label(l)) => l.clone(),
        Some(Operand::Imm(v)) => v.to_string(),
        Some(Operand::Text(t)) => t.clone(),
        None => String::new(),
    }
}

fn format_src(flags: Flags, operand: Option<&Operand>) -> String {
    match operand {
        Some(Operand::Reg(r)) if flags.has(Flags::SRC_POINTER) => memory_operand(flags, r),
        Some(Operand::Reg(r)) => reg_name(*r).into(),
        Some(Operand::Label(l)) if flags.has(Flags::SRC_POINTER) => symbol_operand(flags, l),
        Some(Operand::Label(l)) => l.clone(),
        Some(Operand::Imm(v)) => v.to_string(),
        Some(Operand::Text(t)) => t.clone(),
        None => String::new(),
    }
}

/// `qword [rbx + 8]`: size keyword, 64-bit base, optional displacement.
fn memory_operand(flags: Flags, r: &Reg) -> String {
    let size = size_keyword(flags);
    let base = reg64(r.id);
    if r.disp > 0 {
        format!("{} [{} + {}]", size, base, r.disp)
    } else if r.disp < 0 {
        format!("{} [{} - {}]", size, base, -(r.disp as i64))
    } else {
        format!("{} [{}]", size, base)
    }
}

/// `qword [symbol]`.
fn symbol_operand(flags: Flags, label: &str) -> String {
    format!("{} [{}]", size_keyword(flags), label)
}

fn label_name(operand: &Option<Operand>) -> String {
    match operand {
        Some(Operand::Label(l)) => l.clone(),
        _ => String::new(),
    }
}

fn size_keyword(flags: Flags) -> &'static str {
    match flags.width() {
        Some(Width::Byte) => "byte",
        Some(Width::Word) => "word",
        Some(Width::Dword) => "dword",
        Some(Width::Qword) | None => "qword",
    }
}

fn data_directive(width: Width) -> &'static str {
    match width {
        Width::Byte => "db",
        Width::Word => "dw",
        Width::Dword => "dd",
        Width::Qword => "dq",
    }
}

fn mnemonic(op: Op) -> &'static str {
    match op {
        Op::Mov => "mov",
        Op::Add => "add",
        Op::Sub => "sub",
        // Two-operand multiply only exists as imul.
        Op::Mul => "imul",
        Op::And => "and",
        Op::Or => "or",
        Op::Xor => "xor",
        Op::Shl => "shl",
        Op::Shr => "shr",
        Op::Cmp => "cmp",
        _ => unreachable!("not a two-operand instruction: {:?}", op),
    }
}

fn jump_mnemonic(condition: Option<Flags>) -> &'static str {
    match condition {
        None => "jmp",
        Some(Flags::ZERO) => "jz",
        Some(Flags::NOT_ZERO) => "jnz",
        Some(Flags::EQUAL) => "je",
        Some(Flags::NOT_EQUAL) => "jne",
        Some(Flags::LESS) => "jl",
        Some(Flags::LESS_OR_EQUAL) => "jle",
        Some(Flags::GREATER) => "jg",
        Some(Flags::GREATER_OR_EQUAL) => "jge",
        Some(_) => "jmp",
    }
}

fn set_mnemonic(condition: Option<Flags>) -> &'static str {
    match condition {
        Some(Flags::ZERO) => "setz",
        Some(Flags::NOT_ZERO) => "setnz",
        Some(Flags::EQUAL) => "sete",
        Some(Flags::NOT_EQUAL) => "setne",
        Some(Flags::LESS) => "setl",
        Some(Flags::LESS_OR_EQUAL) => "setle",
        Some(Flags::GREATER) => "setg",
        Some(Flags::GREATER_OR_EQUAL) => "setge",
        _ => "sete",
    }
}

// ─── Register names ───────────────────────────────────────────────

/// Full-width name, used for pointer bases and the entry stub.
fn reg64(id: RegId) -> &'static str {
    match id {
        RegId::R0 => "rbx",
        RegId::R1 => "rax",
        RegId::R2 => "rdx",
        RegId::R3 => "rsi",
        RegId::R4 => "rdi",
        RegId::R5 => "rcx",
    }
}

/// Name at the register's own size view. R5 maps to rcx so its byte view
/// is `cl`, the only register a variable shift count encodes through.
fn reg_name(r: Reg) -> &'static str {
    match (r.id, r.width) {
        (RegId::R0, Width::Qword) => "rbx",
        (RegId::R0, Width::Dword) => "ebx",
        (RegId::R0, Width::Word) => "bx",
        (RegId::R0, Width::Byte) => "bl",
        (RegId::R1, Width::Qword) => "rax",
        (RegId::R1, Width::Dword) => "eax",
        (RegId::R1, Width::Word) => "ax",
        (RegId::R1, Width::Byte) => "al",
        (RegId::R2, Width::Qword) => "rdx",
        (RegId::R2, Width::Dword) => "edx",
        (RegId::R2, Width::Word) => "dx",
        (RegId::R2, Width::Byte) => "dl",
        (RegId::R3, Width::Qword) => "rsi",
        (RegId::R3, Width::Dword) => "esi",
        (RegId::R3, Width::Word) => "si",
        (RegId::R3, Width::Byte) => "sil",
        (RegId::R4, Width::Qword) => "rdi",
        (RegId::R4, Width::Dword) => "edi",
        (RegId::R4, Width::Word) => "di",
        (RegId::R4, Width::Byte) => "dil",
        (RegId::R5, Width::Qword) => "rcx",
        (RegId::R5, Width::Dword) => "ecx",
        (RegId::R5, Width::Word) => "cx",
        (RegId::R5, Width::Byte) => "cl",
    }
}

#[cfg(test)]
mod tests;
