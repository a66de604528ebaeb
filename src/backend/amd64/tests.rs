use std::path::PathBuf;

use super::*;
use crate::lower::Lowerer;
use crate::module::{FieldDef, FieldRef, Inst as Bc, MethodDef, MethodRef, Module, Op, TypeDef};
use crate::target::{Arch, ImageKind, Target};

fn target(format: OutputFormat) -> Target {
    Target {
        arch: Arch::Amd64,
        format,
        image: ImageKind::None,
        strict: false,
        limine_dir: PathBuf::from("/usr/share/limine"),
    }
}

/// Lower `body` inside `Kernel.Boot.Main` and print it as assembly.
fn compile_body(body: Vec<Op>) -> String {
    let mut module = Module::new("Kernel");
    let mut ty = TypeDef::new("Kernel", "Boot");
    ty.fields.push(FieldDef {
        name: "X".into(),
        is_static: true,
        init: Some(7),
    });
    let mut main = MethodDef::new("Main");
    main.is_entry_point = true;
    main.locals.push("int64".into());
    main.body = body
        .into_iter()
        .enumerate()
        .map(|(i, op)| Bc::new(i as u32, op))
        .collect();
    ty.methods.push(main);
    module.types.push(ty);

    let (unit, _) = Lowerer::new(&module, 8).lower().unwrap();
    let mut backend = Amd64::new();
    backend.initialize(&target(OutputFormat::Elf));
    backend.compile(&unit).unwrap()
}

#[test]
fn frames_the_module_with_header_stub_and_bss() {
    let asm = compile_body(vec![Op::Ret]);

    assert!(asm.starts_with("; bedrock"));
    assert!(asm.contains("bits 64"));
    assert!(asm.contains("section .multiboot2"));
    assert!(asm.contains("dd 0xe85250d6"));
    assert!(asm.contains("section .text"));
    assert!(asm.contains("global _start"));
    assert!(asm.contains("_start:"));
    assert!(asm.contains("    mov rbx, eval_stack"));
    assert!(asm.contains("    mov rsi, local_frame"));
    assert!(asm.contains("    mov rdi, arg_frame"));
    assert!(asm.contains("section .bss"));
    assert!(asm.contains("eval_stack: resb 65536"));
}

#[test]
fn bin_format_skips_the_global_directive() {
    let mut module = Module::new("K");
    let mut ty = TypeDef::new("", "C");
    let mut main = MethodDef::new("Main");
    main.is_entry_point = true;
    main.body = vec![Bc::new(0, Op::Ret)];
    ty.methods.push(main);
    module.types.push(ty);

    let (unit, _) = Lowerer::new(&module, 8).lower().unwrap();
    let mut backend = Amd64::new();
    backend.initialize(&target(OutputFormat::Bin));
    let asm = backend.compile(&unit).unwrap();
    assert!(!asm.contains("global _start"));
    assert!(asm.contains("_start:"));
}

#[test]
fn pushes_and_pops_spell_sized_memory_operands() {
    let asm = compile_body(vec![Op::LdcI4(5), Op::Pop, Op::Ret]);

    assert!(asm.contains("    add rbx, 8"));
    assert!(asm.contains("    mov qword [rbx], 5"));
    assert!(asm.contains("    sub rbx, 8"));
}

#[test]
fn method_labels_and_calls_use_sanitized_symbols() {
    let asm = compile_body(vec![
        Op::LdcI4(2),
        Op::LdcI4(3),
        Op::Call(MethodRef {
            full_name: "Kernel.Boot.Add".into(),
            arity: 2,
        }),
        Op::Ret,
    ]);

    assert!(asm.contains("Kernel_Boot_Main:"));
    assert!(asm.contains("    call Kernel_Boot_Main"));
    assert!(asm.contains("    call Kernel_Boot_Add"));
    // Argument slots: displaced then flat writes through the arg base.
    assert!(asm.contains("    mov qword [rdi + 8], rax"));
    assert!(asm.contains("    mov qword [rdi], rax"));
}

#[test]
fn static_fields_become_data_directives_in_the_data_section() {
    let asm = compile_body(vec![
        Op::Ldsfld(FieldRef {
            full_name: "Kernel.Boot.X".into(),
        }),
        Op::Ret,
    ]);

    let data_at = asm.find("section .data").expect("data section");
    let slot_at = asm.find("Kernel_Boot_X: dq 7").expect("data slot");
    assert!(slot_at > data_at);
    assert!(asm.contains("    mov rax, qword [Kernel_Boot_X]"));
}

#[test]
fn string_blobs_emit_db_lists_behind_a_jump() {
    let asm = compile_body(vec![Op::Ldstr("Hi".into()), Op::Pop, Op::Ret]);

    assert!(asm.contains("    db 72,0,105,0"));
    let jmp_at = asm.find("    jmp LB_").expect("skip jump");
    let db_at = asm.find("    db ").expect("blob");
    assert!(jmp_at < db_at);
    // The blob address is materialized as a bare symbol.
    assert!(asm.contains("    mov rax, LB_"));
}

#[test]
fn comments_carry_the_source_mnemonic() {
    let asm = compile_body(vec![Op::Nop, Op::Ret]);
    assert!(asm.contains("    ; nop"));
    assert!(asm.contains("    ; ret"));
    assert!(asm.contains("    nop"));
    assert!(asm.contains("    ret"));
}

#[test]
fn conditional_jumps_pick_the_condition_mnemonic() {
    let asm = compile_body(vec![
        Op::LdcI4(1),
        Op::Brtrue(3),
        Op::LdcI4(0),
        Op::Ret,
    ]);
    assert!(asm.contains("    cmp rax, 0"));
    assert!(asm.contains("    jnz LB_"));
}

#[test]
fn comparison_sets_write_the_byte_register() {
    let asm = compile_body(vec![Op::LdcI4(1), Op::LdcI4(2), Op::Clt, Op::Ret]);
    assert!(asm.contains("    cmp rdx, rax"));
    assert!(asm.contains("    setl dl"));
}

#[test]
fn shifts_spell_the_cl_count_register() {
    let asm = compile_body(vec![Op::LdcI4(1), Op::LdcI4(4), Op::Shl, Op::Ret]);
    assert!(asm.contains("    shl rdx, cl"));
}

#[test]
fn multiply_uses_the_two_operand_imul() {
    let asm = compile_body(vec![Op::LdcI4(6), Op::LdcI4(7), Op::Mul, Op::Ret]);
    assert!(asm.contains("    imul rdx, rax"));
}

#[test]
fn narrow_indirect_stores_use_narrow_views() {
    let asm = compile_body(vec![
        Op::LdcI4(0),
        Op::LdcI4(7),
        Op::Stind(crate::module::WidthKind::I2),
        Op::Ret,
    ]);
    assert!(asm.contains("    mov word [rdx], ax"));
}

#[test]
fn identical_units_emit_identical_assembly() {
    let a = compile_body(vec![Op::Ldstr("boot".into()), Op::Pop, Op::Ret]);
    let b = compile_body(vec![Op::Ldstr("boot".into()), Op::Pop, Op::Ret]);
    assert_eq!(a, b);
}
