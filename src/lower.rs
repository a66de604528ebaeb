//! Frontend lowerer: walks a loaded module and produces the LIR stream.
//!
//! The source bytecode is a stack machine; the LIR is a register+memory
//! machine. The bridge is an abstract evaluation stack held in memory and
//! addressed through R0: every push grows R0 by one pointer-sized slot and
//! stores through it, every pop reads through R0 and shrinks it. Locals
//! live at fixed offsets from R3, arguments at fixed offsets from R4; the
//! backend wires all three bases to bss regions in its entry stub.
//!
//! Lowering is a direct transliteration. No width inference, no register
//! allocation: narrower values ride in pointer-sized slots and are
//! re-narrowed with masks where the bytecode demands it.

use std::collections::BTreeSet;

use crate::diagnostic::Diagnostic;
use crate::error::{BuildError, BuildResult};
use crate::lir::{Flags, Inst, Op as Lir, Operand, Reg, Width, R0, R1, R2, R3, R4, R5};
use crate::module::{MethodDef, Module, Op, TypeDef, WidthKind};

/// Output of the frontend: everything a backend needs to emit one module.
#[derive(Clone, Debug)]
pub struct CompilationUnit {
    /// Sanitized assembly name.
    pub assembly: String,
    /// Ordered LIR sequence. Static-field data slots and inline string
    /// blobs are part of the stream; the backend routes them to sections.
    pub insts: Vec<Inst>,
    /// Sanitized entry-point symbol.
    pub entry: String,
}

/// Lowers one module into a [`CompilationUnit`].
pub struct Lowerer<'m> {
    module: &'m Module,
    pointer_size: u32,
    out: Vec<Inst>,
    diagnostics: Vec<Diagnostic>,
}

impl<'m> Lowerer<'m> {
    pub fn new(module: &'m Module, pointer_size: u32) -> Self {
        Self {
            module,
            pointer_size,
            out: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Lower the whole module. Fails only on a missing entry point;
    /// unsupported opcodes become diagnostics and are skipped.
    pub fn lower(mut self) -> BuildResult<(CompilationUnit, Vec<Diagnostic>)> {
        let module = self.module;
        let (entry_ty, entry_method) = module
            .entry_point()
            .ok_or_else(|| BuildError::NoEntryPoint(module.name.clone()))?;
        let entry = safe_name(&entry_method.full_name(entry_ty));

        // Staged initialization: the generated kernel has no runtime, so
        // every constructor and static constructor runs at the top of
        // execution, in source order, before the entry point.
        for ty in &module.types {
            for method in &ty.methods {
                if method.is_constructor || method.is_static_constructor {
                    self.out.push(Inst::call(safe_name(&method.full_name(ty))));
                }
            }
        }
        self.out.push(Inst::call(entry.clone()));

        for ty in &module.types {
            self.lower_static_fields(ty);
            for method in &ty.methods {
                self.lower_method(ty, method);
            }
        }

        let unit = CompilationUnit {
            assembly: safe_name(&module.name),
            insts: self.out,
            entry,
        };
        Ok((unit, self.diagnostics))
    }

    /// One pointer-sized data slot per static field, named after the
    /// sanitized full field name, initialized to its constant (or 0).
    fn lower_static_fields(&mut self, ty: &TypeDef) {
        let width = Width::from_bytes(self.pointer_size);
        for field in ty.fields.iter().filter(|f| f.is_static) {
            let name = safe_name(&format!("{}.{}", ty.full_name(), field.name));
            self.out.push(Inst::data(name, width, field.init.unwrap_or(0)));
        }
    }

    fn lower_method(&mut self, ty: &TypeDef, method: &MethodDef) {
        let full = safe_name(&method.full_name(ty));
        let hash = method_hash(&full);
        self.out.push(Inst::label(full.clone()));

        // Pre-scan: every offset some branch in this body jumps to gets a
        // label emitted inline just before the instruction at that offset.
        let targets: BTreeSet<u32> = method
            .body
            .iter()
            .filter_map(|inst| inst.op.branch_target())
            .collect();

        for inst in &method.body {
            if targets.contains(&inst.offset) {
                self.out.push(Inst::label(branch_label(hash, inst.offset)));
            }
            self.out.push(Inst::comment(inst.op.mnemonic()));
            self.lower_op(&full, hash, inst.offset, &inst.op);
        }
    }

    fn lower_op(&mut self, method: &str, hash: u16, offset: u32, op: &Op) {
        match op {
            Op::Nop => self.out.push(Inst::bare(Lir::Nop)),
            Op::Ret => self.out.push(Inst::bare(Lir::Ret)),

            Op::Dup => {
                self.peek(R1);
                self.push_reg(R1);
            }
            Op::Pop => self.drop_slot(),

            Op::LdcI4(v) => self.push_const(*v as i64),
            Op::LdcI8(v) => self.push_const(*v),

            Op::Ldloc(i) => self.load_slot(R3, *i),
            Op::Stloc(i) => self.store_slot(R3, *i),
            Op::Ldarg(i) => self.load_slot(R4, *i),
            Op::Starg(i) => self.store_slot(R4, *i),

            Op::Ldstr(s) => self.lower_ldstr(s),

            Op::Call(callee) => {
                // Pop the caller's arguments into the callee's argument
                // frame, highest slot first so the first argument lands in
                // slot 0 last.
                for slot in (0..callee.arity).rev() {
                    self.pop(R1);
                    self.store_frame(R4, slot);
                }
                self.out.push(Inst::call(safe_name(&callee.full_name)));
            }

            Op::Add => self.binary(Lir::Add),
            Op::Sub => self.binary(Lir::Sub),
            Op::Mul => self.binary(Lir::Mul),
            Op::And => self.binary(Lir::And),
            Op::Or => self.binary(Lir::Or),
            Op::Xor => self.binary(Lir::Xor),
            Op::Shl => self.shift(Lir::Shl),
            Op::Shr => self.shift(Lir::Shr),

            Op::Conv(kind) => {
                if let Some(mask) = self.conv_mask(*kind) {
                    self.pop(R1);
                    self.mask_reg(R1, mask);
                    self.push_reg(R1);
                }
            }

            Op::Ldind(kind) => {
                self.pop(R1);
                self.out.push(Inst::new(
                    Lir::Mov,
                    Flags::QWORD | Flags::DEST_REGISTER | Flags::SRC_REGISTER | Flags::SRC_POINTER,
                    Some(Operand::Reg(R2)),
                    Some(Operand::Reg(R1)),
                ));
                let bytes = kind.bytes(self.pointer_size);
                if bytes < 8 {
                    self.mask_reg(R2, mask_for_bytes(bytes));
                }
                self.push_reg(R2);
            }

            Op::Stind(kind) => {
                self.pop(R1);
                self.pop(R2);
                let width = Width::from_bytes(kind.bytes(self.pointer_size));
                self.out.push(Inst::new(
                    Lir::Mov,
                    width.flag() | Flags::DEST_REGISTER | Flags::DEST_POINTER | Flags::SRC_REGISTER,
                    Some(Operand::Reg(R2)),
                    Some(Operand::Reg(R1.view(width))),
                ));
            }

            Op::Br(t) => {
                self.out.push(Inst::jmp(branch_label(hash, *t), Flags::NONE));
            }
            Op::Brtrue(t) => self.unary_branch(hash, *t, Flags::NOT_ZERO),
            Op::Brfalse(t) => self.unary_branch(hash, *t, Flags::ZERO),
            Op::Beq(t) => self.compare_branch(hash, *t, Flags::EQUAL),
            Op::Bne(t) => self.compare_branch(hash, *t, Flags::NOT_EQUAL),
            Op::Bge(t) => self.compare_branch(hash, *t, Flags::GREATER_OR_EQUAL),
            Op::Bgt(t) => self.compare_branch(hash, *t, Flags::GREATER),
            Op::Ble(t) => self.compare_branch(hash, *t, Flags::LESS_OR_EQUAL),
            Op::Blt(t) => self.compare_branch(hash, *t, Flags::LESS),

            Op::Ceq => self.compare_set(Flags::EQUAL),
            Op::Cgt => self.compare_set(Flags::GREATER),
            Op::Clt => self.compare_set(Flags::LESS),

            Op::Ldsfld(field) => {
                self.out.push(Inst::new(
                    Lir::Mov,
                    Flags::QWORD | Flags::DEST_REGISTER | Flags::LABEL | Flags::SRC_POINTER,
                    Some(Operand::Reg(R1)),
                    Some(Operand::Label(safe_name(&field.full_name))),
                ));
                self.push_reg(R1);
            }
            Op::Stsfld(field) => {
                self.pop(R1);
                self.out.push(Inst::new(
                    Lir::Mov,
                    Flags::QWORD | Flags::LABEL | Flags::DEST_POINTER | Flags::SRC_REGISTER,
                    Some(Operand::Label(safe_name(&field.full_name))),
                    Some(Operand::Reg(R1)),
                ));
            }

            Op::Unknown(mnemonic) => {
                self.diagnostics.push(
                    Diagnostic::warning(format!("no lowering for opcode '{}'", mnemonic))
                        .in_method(method)
                        .at_offset(offset),
                );
            }
        }
    }

    // ─── Abstract stack discipline ────────────────────────────────

    /// Grow the stack by one slot: `R0 += pointer_size`.
    fn grow(&mut self) {
        self.out.push(Inst::new(
            Lir::Add,
            Flags::QWORD | Flags::DEST_REGISTER | Flags::IMMEDIATE,
            Some(Operand::Reg(R0)),
            Some(Operand::Imm(self.pointer_size as i64)),
        ));
    }

    /// Shrink the stack by one slot: `R0 -= pointer_size`.
    fn drop_slot(&mut self) {
        self.out.push(Inst::new(
            Lir::Sub,
            Flags::QWORD | Flags::DEST_REGISTER | Flags::IMMEDIATE,
            Some(Operand::Reg(R0)),
            Some(Operand::Imm(self.pointer_size as i64)),
        ));
    }

    /// Push a register: grow, then `[R0] ← r`.
    fn push_reg(&mut self, r: Reg) {
        self.grow();
        self.out.push(Inst::new(
            Lir::Mov,
            Flags::QWORD | Flags::DEST_REGISTER | Flags::DEST_POINTER | Flags::SRC_REGISTER,
            Some(Operand::Reg(R0)),
            Some(Operand::Reg(r)),
        ));
    }

    /// Push a constant. Values outside the 32-bit immediate range take a
    /// detour through R1, since a memory store only encodes imm32.
    fn push_const(&mut self, v: i64) {
        if i32::try_from(v).is_ok() {
            self.grow();
            self.out.push(Inst::new(
                Lir::Mov,
                Flags::QWORD | Flags::DEST_REGISTER | Flags::DEST_POINTER | Flags::IMMEDIATE,
                Some(Operand::Reg(R0)),
                Some(Operand::Imm(v)),
            ));
        } else {
            self.load_imm(R1, v);
            self.push_reg(R1);
        }
    }

    /// Pop the top slot into a register: `r ← [R0]; R0 -= pointer_size`.
    fn pop(&mut self, r: Reg) {
        self.peek(r);
        self.drop_slot();
    }

    /// Read the top slot without popping.
    fn peek(&mut self, r: Reg) {
        self.out.push(Inst::new(
            Lir::Mov,
            Flags::QWORD | Flags::DEST_REGISTER | Flags::SRC_REGISTER | Flags::SRC_POINTER,
            Some(Operand::Reg(r)),
            Some(Operand::Reg(R0)),
        ));
    }

    // ─── Frames, constants, masks ─────────────────────────────────

    /// `[base + slot·pointer_size] ← R1`.
    fn store_frame(&mut self, base: Reg, slot: u16) {
        let disp = slot as i32 * self.pointer_size as i32;
        self.out.push(Inst::new(
            Lir::Mov,
            Flags::QWORD | Flags::DEST_REGISTER | Flags::DEST_POINTER | Flags::SRC_REGISTER,
            Some(Operand::Reg(base.plus(disp))),
            Some(Operand::Reg(R1)),
        ));
    }

    /// Pop into frame slot `slot` of `base` (stloc / starg).
    fn store_slot(&mut self, base: Reg, slot: u16) {
        self.pop(R1);
        self.store_frame(base, slot);
    }

    /// Push frame slot `slot` of `base` (ldloc / ldarg).
    fn load_slot(&mut self, base: Reg, slot: u16) {
        let disp = slot as i32 * self.pointer_size as i32;
        self.out.push(Inst::new(
            Lir::Mov,
            Flags::QWORD | Flags::DEST_REGISTER | Flags::SRC_REGISTER | Flags::SRC_POINTER,
            Some(Operand::Reg(R1)),
            Some(Operand::Reg(base.plus(disp))),
        ));
        self.push_reg(R1);
    }

    /// `r ← imm` at full width.
    fn load_imm(&mut self, r: Reg, v: i64) {
        self.out.push(Inst::new(
            Lir::Mov,
            Flags::QWORD | Flags::DEST_REGISTER | Flags::IMMEDIATE,
            Some(Operand::Reg(r)),
            Some(Operand::Imm(v)),
        ));
    }

    /// `r &= mask`. Masks beyond the 32-bit immediate range route through
    /// R2, since `and r64, imm` sign-extends a 32-bit immediate.
    fn mask_reg(&mut self, r: Reg, mask: u64) {
        if mask <= i32::MAX as u64 {
            self.out.push(Inst::new(
                Lir::And,
                Flags::QWORD | Flags::DEST_REGISTER | Flags::IMMEDIATE,
                Some(Operand::Reg(r)),
                Some(Operand::Imm(mask as i64)),
            ));
        } else {
            self.load_imm(R2, mask as i64);
            self.out.push(Inst::new(
                Lir::And,
                Flags::QWORD | Flags::DEST_REGISTER | Flags::SRC_REGISTER,
                Some(Operand::Reg(r)),
                Some(Operand::Reg(R2)),
            ));
        }
    }

    /// Conversion mask for `conv.*`, or None where the conversion is a
    /// no-op at this pointer size. The full-width mask on `conv.i8/u8`
    /// is kept exactly as observed in the source semantics.
    fn conv_mask(&self, kind: WidthKind) -> Option<u64> {
        match kind {
            WidthKind::I1 | WidthKind::U1 => Some(0xFF),
            WidthKind::I2 | WidthKind::U2 => Some(0xFFFF),
            WidthKind::I4 | WidthKind::U4 | WidthKind::I | WidthKind::U => {
                if self.pointer_size == 8 {
                    Some(0xFFFF_FFFF)
                } else {
                    None
                }
            }
            WidthKind::I8 | WidthKind::U8 => Some(u64::MAX),
        }
    }

    // ─── Operator shapes ──────────────────────────────────────────

    /// `pop R1; pop R2; R2 op= R1; push R2`.
    fn binary(&mut self, op: Lir) {
        self.pop(R1);
        self.pop(R2);
        self.out.push(Inst::new(
            op,
            Flags::QWORD | Flags::DEST_REGISTER | Flags::SRC_REGISTER,
            Some(Operand::Reg(R2)),
            Some(Operand::Reg(R1)),
        ));
        self.push_reg(R2);
    }

    /// Shifts take their count through R5's byte view: a variable shift
    /// count on x86-64 only encodes via the low byte of that register.
    fn shift(&mut self, op: Lir) {
        self.pop(R5);
        self.pop(R2);
        self.out.push(Inst::new(
            op,
            Flags::QWORD | Flags::DEST_REGISTER | Flags::SRC_REGISTER,
            Some(Operand::Reg(R2)),
            Some(Operand::Reg(R5.byte())),
        ));
        self.push_reg(R2);
    }

    /// `pop R1; cmp R1, 0; jcc target` (brtrue / brfalse).
    fn unary_branch(&mut self, hash: u16, target: u32, condition: Flags) {
        self.pop(R1);
        self.out.push(Inst::new(
            Lir::Cmp,
            Flags::QWORD | Flags::DEST_REGISTER | Flags::IMMEDIATE,
            Some(Operand::Reg(R1)),
            Some(Operand::Imm(0)),
        ));
        self.out
            .push(Inst::jmp(branch_label(hash, target), condition));
    }

    /// `pop R1; pop R2; cmp R2, R1; jcc target`.
    fn compare_branch(&mut self, hash: u16, target: u32, condition: Flags) {
        self.compare();
        self.out
            .push(Inst::jmp(branch_label(hash, target), condition));
    }

    /// `pop R1; pop R2; cmp R2, R1; setcc R2b; push R2` (ceq / cgt / clt).
    fn compare_set(&mut self, condition: Flags) {
        self.compare();
        self.out.push(Inst::new(
            Lir::Set,
            Flags::BYTE | Flags::DEST_REGISTER | condition,
            Some(Operand::Reg(R2.byte())),
            None,
        ));
        self.push_reg(R2);
    }

    fn compare(&mut self) {
        self.pop(R1);
        self.pop(R2);
        self.out.push(Inst::new(
            Lir::Cmp,
            Flags::QWORD | Flags::DEST_REGISTER | Flags::SRC_REGISTER,
            Some(Operand::Reg(R2)),
            Some(Operand::Reg(R1)),
        ));
    }

    // ─── String literals ──────────────────────────────────────────

    /// Inline a UTF-16-LE blob for the string, push its address, and jump
    /// over the data so execution continues at the label behind it.
    fn lower_ldstr(&mut self, s: &str) {
        let bytes: Vec<u8> = s.encode_utf16().flat_map(u16::to_le_bytes).collect();
        let data = format!("LB_{:08X}", fnv1a(&bytes));
        let mut cont_hash = fnv1a(s.as_bytes());
        if bytes == s.as_bytes() {
            // Empty string: both hashes cover the same (empty) input.
            cont_hash = cont_hash.wrapping_add(1);
        }
        let cont = format!("LB_{:08X}", cont_hash);

        self.out.push(Inst::new(
            Lir::Mov,
            Flags::QWORD | Flags::DEST_REGISTER | Flags::LABEL,
            Some(Operand::Reg(R1)),
            Some(Operand::Label(data.clone())),
        ));
        self.push_reg(R1);
        self.out.push(Inst::jmp(cont.clone(), Flags::NONE));
        self.out.push(Inst::label(data));
        if !bytes.is_empty() {
            self.out.push(Inst::store(&bytes));
        }
        self.out.push(Inst::label(cont));
    }
}

// ─── Names and hashes ─────────────────────────────────────────────

/// Sanitize a dotted bytecode name into a label: every run of
/// non-alphanumeric characters collapses to a single `_`. Pure and
/// idempotent, so identical inputs produce identical symbols across runs.
pub fn safe_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut gap = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            gap = false;
        } else if !gap {
            out.push('_');
            gap = true;
        }
    }
    out
}

/// 32-bit FNV-1a. The label scheme needs nothing cryptographic, only a
/// hash that is a pure function of its input.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Zero-extension mask for an access width.
fn mask_for_bytes(bytes: u32) -> u64 {
    match bytes {
        1 => 0xFF,
        2 => 0xFFFF,
        4 => 0xFFFF_FFFF,
        _ => u64::MAX,
    }
}

/// Stable per-method identity for branch-label synthesis.
fn method_hash(sanitized_full_name: &str) -> u16 {
    fnv1a(sanitized_full_name.as_bytes()) as u16
}

/// Branch-target label at a bytecode offset within a method.
fn branch_label(method_hash: u16, offset: u32) -> String {
    format!("LB_{:04X}{:04X}", method_hash, offset)
}
