//! Listing-to-assembly tests over the whole frontend and backend,
//! without touching the external toolchain.

use std::path::{Path, PathBuf};

use bedrock::backend::{create_backend, Architecture};
use bedrock::lower::Lowerer;
use bedrock::reader::parse_listing;
use bedrock::target::{Arch, ImageKind, OutputFormat, Target};
use bedrock::BuildError;

fn target() -> Target {
    Target {
        arch: Arch::Amd64,
        format: OutputFormat::Elf,
        image: ImageKind::None,
        strict: false,
        limine_dir: PathBuf::from("/usr/share/limine"),
    }
}

/// Listing text → assembly text, plus the count of skipped opcodes.
fn compile(listing: &str) -> (String, usize) {
    let module = parse_listing(listing, Path::new("test.il")).unwrap();
    let mut backend = create_backend(Arch::Amd64);
    backend.initialize(&target());
    let (unit, diagnostics) = Lowerer::new(&module, backend.pointer_size()).lower().unwrap();
    (backend.compile(&unit).unwrap(), diagnostics.len())
}

#[test]
fn boot_kernel_compiles_with_staged_initialization() {
    let (asm, skipped) = compile(
        ".assembly Kernel\n\
         .class Kernel.Boot\n\
         .field static Ticks = 7\n\
         .method Init cctor\n\
         IL_0000: ldc.i4.1\n\
         IL_0001: stsfld Kernel.Boot::Ticks\n\
         IL_0002: ret\n\
         .method Main entrypoint\n\
         .local int64\n\
         IL_0000: ldsfld Kernel.Boot::Ticks\n\
         IL_0001: stloc.0\n\
         IL_0002: ldloc.0\n\
         IL_0003: brtrue.s IL_0005\n\
         IL_0004: nop\n\
         IL_0005: ret\n",
    );
    assert_eq!(skipped, 0);

    // The static constructor is staged before the entry call, which in
    // turn precedes every method label.
    let cctor_call = asm.find("    call Kernel_Boot_Init").unwrap();
    let entry_call = asm.find("    call Kernel_Boot_Main").unwrap();
    let cctor_label = asm.find("Kernel_Boot_Init:").unwrap();
    let main_label = asm.find("Kernel_Boot_Main:").unwrap();
    assert!(cctor_call < entry_call);
    assert!(entry_call < cctor_label);
    assert!(cctor_label < main_label);

    // Static slot and its accesses.
    assert!(asm.contains("Kernel_Boot_Ticks: dq 7"));
    assert!(asm.contains("    mov qword [Kernel_Boot_Ticks], rax"));
    assert!(asm.contains("    mov rax, qword [Kernel_Boot_Ticks]"));

    // The branch label lands exactly once, and the jump names it.
    let jnz_at = asm.find("    jnz LB_").unwrap();
    let label = asm[jnz_at + 8..].split_whitespace().next().unwrap();
    assert_eq!(asm.matches(&format!("{}:", label)).count(), 1);
}

#[test]
fn calls_route_arguments_through_the_frame() {
    let (asm, _) = compile(
        ".assembly Calc\n\
         .class Calc.Math\n\
         .method Add\n\
         .param a\n\
         .param b\n\
         IL_0000: ldarg.0\n\
         IL_0001: ldarg.1\n\
         IL_0002: add\n\
         IL_0003: ret\n\
         .method Main entrypoint\n\
         IL_0000: ldc.i4.2\n\
         IL_0001: ldc.i4.3\n\
         IL_0002: call Calc.Math::Add 2\n\
         IL_0003: ret\n",
    );

    let slot1 = asm.find("    mov qword [rdi + 8], rax").unwrap();
    let slot0 = asm.find("    mov qword [rdi], rax").unwrap();
    let call = asm.find("    call Calc_Math_Add").unwrap();
    assert!(slot1 < slot0 && slot0 < call);
    assert!(asm.contains("    mov rax, qword [rdi]"));
    assert!(asm.contains("    mov rax, qword [rdi + 8]"));
}

#[test]
fn string_literals_ride_inline_behind_a_skip_jump() {
    let (asm, _) = compile(
        ".assembly Hello\n\
         .class Hello.Program\n\
         .method Main entrypoint\n\
         IL_0000: ldstr \"Hi\"\n\
         IL_0001: pop\n\
         IL_0002: ret\n",
    );
    assert!(asm.contains("    db 72,0,105,0"));

    // jmp LB_cont; LB_data:; db ...; LB_cont:
    let db_at = asm.find("    db 72").unwrap();
    let before = &asm[..db_at];
    let jmp_target = before
        .rfind("    jmp LB_")
        .map(|at| before[at + 8..].split_whitespace().next().unwrap())
        .unwrap();
    let after = &asm[db_at..];
    assert!(after.contains(&format!("{}:", jmp_target)));
}

#[test]
fn unsupported_opcodes_are_skipped_not_fatal() {
    let (asm, skipped) = compile(
        ".assembly Partial\n\
         .class Partial.Program\n\
         .method Main entrypoint\n\
         IL_0000: newobj Partial.Program::.ctor\n\
         IL_0001: ret\n",
    );
    assert_eq!(skipped, 1);
    assert!(asm.contains("Partial_Program_Main:"));
    assert!(asm.contains("    ret"));
}

#[test]
fn raw_binary_refuses_iso_packaging() {
    let bad = Target {
        format: OutputFormat::Bin,
        image: ImageKind::Iso,
        ..target()
    };
    let err = bad.validate().unwrap_err();
    assert!(matches!(err, BuildError::Config(_)));
    assert!(err.to_string().contains("configuration error"));
}

#[test]
fn rebuilding_the_same_listing_is_deterministic() {
    let listing = ".assembly Kernel\n\
                   .class Kernel.Boot\n\
                   .method Main entrypoint\n\
                   IL_0000: ldstr \"boot\"\n\
                   IL_0001: pop\n\
                   IL_0002: ret\n";
    assert_eq!(compile(listing).0, compile(listing).0);
}
