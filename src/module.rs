//! Loaded-module model: the shape a managed-assembly metadata reader
//! presents after parsing the container.
//!
//! Container parsing itself (PE headers, metadata tables, signature blobs)
//! stays outside this crate; [`crate::reader`] fills these structures from
//! the flat textual listing a disassembler produces on top of such a
//! reader. The lowerer consumes this model and nothing else.

/// A loaded managed assembly.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// Assembly name as recorded in the container.
    pub name: String,
    pub types: Vec<TypeDef>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
        }
    }

    /// The method flagged as the program entry point, if any.
    pub fn entry_point(&self) -> Option<(&TypeDef, &MethodDef)> {
        self.types.iter().find_map(|ty| {
            ty.methods
                .iter()
                .find(|m| m.is_entry_point)
                .map(|m| (ty, m))
        })
    }
}

/// A type definition: fields plus method bodies.
#[derive(Clone, Debug, Default)]
pub struct TypeDef {
    /// Dotted namespace, empty for the global namespace.
    pub namespace: String,
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Dotted full name, e.g. `Kernel.Boot`.
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldDef {
    pub name: String,
    pub is_static: bool,
    /// Constant initializer, if the container records one.
    pub init: Option<i64>,
}

/// A method definition with its flat, offset-annotated body.
#[derive(Clone, Debug, Default)]
pub struct MethodDef {
    pub name: String,
    pub params: Vec<String>,
    /// Local variable slots. Only the count matters to the lowerer; the
    /// declared type names are kept for listings and debugging.
    pub locals: Vec<String>,
    pub is_entry_point: bool,
    pub is_constructor: bool,
    pub is_static_constructor: bool,
    pub body: Vec<Inst>,
}

impl MethodDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Dotted full name within `ty`, e.g. `Kernel.Boot.Main`.
    pub fn full_name(&self, ty: &TypeDef) -> String {
        format!("{}.{}", ty.full_name(), self.name)
    }
}

/// One bytecode instruction at its byte offset within the method body.
#[derive(Clone, Debug)]
pub struct Inst {
    pub offset: u32,
    pub op: Op,
}

impl Inst {
    pub fn new(offset: u32, op: Op) -> Self {
        Self { offset, op }
    }
}

/// Reference to a callee: enough identity to name its frame and label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodRef {
    /// Dotted full name, e.g. `Kernel.Boot.Add`.
    pub full_name: String,
    /// Number of arguments the callee takes.
    pub arity: u16,
}

/// Reference to a static field by dotted full name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRef {
    pub full_name: String,
}

/// Width selector for conversions and indirect memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WidthKind {
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    /// Native int (pointer-sized).
    I,
    /// Native unsigned int (pointer-sized).
    U,
}

/// The bytecode subset the frontend understands.
///
/// Signed/unsigned and short/long encodings of the same operation collapse
/// to a single variant here; the distinction carries no information the
/// lowerer acts on. Anything the reader cannot classify arrives as
/// [`Op::Unknown`] so the lowerer can report and skip it.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Nop,
    Ret,
    Dup,
    Pop,
    /// Push a 32-bit integer constant.
    LdcI4(i32),
    /// Push a 64-bit integer constant.
    LdcI8(i64),
    Ldloc(u16),
    Stloc(u16),
    Ldarg(u16),
    Starg(u16),
    Ldstr(String),
    Call(MethodRef),
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Conv(WidthKind),
    Ldind(WidthKind),
    Stind(WidthKind),
    /// Unconditional branch to a byte offset.
    Br(u32),
    Brtrue(u32),
    Brfalse(u32),
    Beq(u32),
    Bne(u32),
    Bge(u32),
    Bgt(u32),
    Ble(u32),
    Blt(u32),
    Ceq,
    Cgt,
    Clt,
    Ldsfld(FieldRef),
    Stsfld(FieldRef),
    /// An opcode with no lowering rule, kept by mnemonic for diagnostics.
    Unknown(String),
}

impl Op {
    /// Branch target offset, if this opcode is a branch.
    pub fn branch_target(&self) -> Option<u32> {
        match *self {
            Op::Br(t)
            | Op::Brtrue(t)
            | Op::Brfalse(t)
            | Op::Beq(t)
            | Op::Bne(t)
            | Op::Bge(t)
            | Op::Bgt(t)
            | Op::Ble(t)
            | Op::Blt(t) => Some(t),
            _ => None,
        }
    }

    /// Mnemonic used in comments and diagnostics.
    pub fn mnemonic(&self) -> String {
        match self {
            Op::Nop => "nop".into(),
            Op::Ret => "ret".into(),
            Op::Dup => "dup".into(),
            Op::Pop => "pop".into(),
            Op::LdcI4(v) => format!("ldc.i4 {}", v),
            Op::LdcI8(v) => format!("ldc.i8 {}", v),
            Op::Ldloc(i) => format!("ldloc {}", i),
            Op::Stloc(i) => format!("stloc {}", i),
            Op::Ldarg(i) => format!("ldarg {}", i),
            Op::Starg(i) => format!("starg {}", i),
            Op::Ldstr(s) => format!("ldstr {:?}", s),
            Op::Call(m) => format!("call {}", m.full_name),
            Op::Add => "add".into(),
            Op::Sub => "sub".into(),
            Op::Mul => "mul".into(),
            Op::And => "and".into(),
            Op::Or => "or".into(),
            Op::Xor => "xor".into(),
            Op::Shl => "shl".into(),
            Op::Shr => "shr".into(),
            Op::Conv(k) => format!("conv.{}", k.suffix()),
            Op::Ldind(k) => format!("ldind.{}", k.suffix()),
            Op::Stind(k) => format!("stind.{}", k.suffix()),
            Op::Br(t) => format!("br IL_{:04x}", t),
            Op::Brtrue(t) => format!("brtrue IL_{:04x}", t),
            Op::Brfalse(t) => format!("brfalse IL_{:04x}", t),
            Op::Beq(t) => format!("beq IL_{:04x}", t),
            Op::Bne(t) => format!("bne.un IL_{:04x}", t),
            Op::Bge(t) => format!("bge IL_{:04x}", t),
            Op::Bgt(t) => format!("bgt IL_{:04x}", t),
            Op::Ble(t) => format!("ble IL_{:04x}", t),
            Op::Blt(t) => format!("blt IL_{:04x}", t),
            Op::Ceq => "ceq".into(),
            Op::Cgt => "cgt".into(),
            Op::Clt => "clt".into(),
            Op::Ldsfld(f) => format!("ldsfld {}", f.full_name),
            Op::Stsfld(f) => format!("stsfld {}", f.full_name),
            Op::Unknown(m) => m.clone(),
        }
    }
}

impl WidthKind {
    /// Mnemonic suffix (`conv.i1`, `ldind.u2`, ...).
    pub fn suffix(self) -> &'static str {
        match self {
            WidthKind::I1 => "i1",
            WidthKind::U1 => "u1",
            WidthKind::I2 => "i2",
            WidthKind::U2 => "u2",
            WidthKind::I4 => "i4",
            WidthKind::U4 => "u4",
            WidthKind::I8 => "i8",
            WidthKind::U8 => "u8",
            WidthKind::I => "i",
            WidthKind::U => "u",
        }
    }

    /// Access width in bytes, given the target pointer size.
    pub fn bytes(self, pointer_size: u32) -> u32 {
        match self {
            WidthKind::I1 | WidthKind::U1 => 1,
            WidthKind::I2 | WidthKind::U2 => 2,
            WidthKind::I4 | WidthKind::U4 => 4,
            WidthKind::I8 | WidthKind::U8 => 8,
            WidthKind::I | WidthKind::U => pointer_size,
        }
    }
}
