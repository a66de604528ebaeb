//! Module-listing reader.
//!
//! Fills the [`crate::module`] model from the flat textual listing a
//! disassembler produces on top of a managed-metadata reader. The binary
//! container format itself (PE headers, metadata tables) never enters
//! this crate.
//!
//! The listing is line-oriented:
//!
//! ```text
//! .assembly Kernel
//! .class Kernel.Boot
//! .field static Ticks = 7
//! .method Main entrypoint
//! .local int64
//! IL_0000: ldc.i4.5
//! IL_0001: stloc.0
//! IL_0002: ret
//! ```
//!
//! Directives open a context (`.class`, `.method`) that the next directive
//! of the same kind closes. Instruction lines carry an optional `IL_xxxx:`
//! offset label; without one, offsets count up from the previous
//! instruction. Unknown mnemonics are preserved as [`Op::Unknown`] so the
//! lowerer can report and skip them; malformed operands of known
//! mnemonics are input errors.

use std::fs;
use std::path::Path;

use crate::error::{BuildError, BuildResult};
use crate::module::{FieldDef, FieldRef, Inst, MethodDef, MethodRef, Module, Op, TypeDef, WidthKind};

/// Read and parse a module listing from disk.
pub fn read_module(path: &Path) -> BuildResult<Module> {
    let source = fs::read_to_string(path)?;
    parse_listing(&source, path)
}

/// Parse a module listing. `path` only labels errors.
pub fn parse_listing(source: &str, path: &Path) -> BuildResult<Module> {
    let mut reader = Reader {
        path,
        module: Module::default(),
        in_method: false,
        next_offset: 0,
    };
    for (index, line) in source.lines().enumerate() {
        reader.line(index + 1, line)?;
    }
    Ok(reader.module)
}

struct Reader<'p> {
    path: &'p Path,
    module: Module,
    /// Whether a `.method` context is open on the last type.
    in_method: bool,
    /// Offset assigned to the next instruction without an `IL_` label.
    next_offset: u32,
}

impl Reader<'_> {
    fn line(&mut self, number: usize, raw: &str) -> BuildResult<()> {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            return Ok(());
        }
        if let Some(rest) = line.strip_prefix('.') {
            self.directive(number, rest)
        } else {
            self.instruction(number, line)
        }
    }

    fn directive(&mut self, number: usize, rest: &str) -> BuildResult<()> {
        let (keyword, args) = split_word(rest);
        match keyword {
            "assembly" => {
                self.module.name = args.trim().to_string();
                Ok(())
            }
            "class" => {
                let full = args.trim();
                if full.is_empty() {
                    return Err(self.err(number, "missing class name".into()));
                }
                let (namespace, name) = match full.rsplit_once('.') {
                    Some((ns, n)) => (ns, n),
                    None => ("", full),
                };
                self.module.types.push(TypeDef::new(namespace, name));
                self.in_method = false;
                Ok(())
            }
            "field" => {
                let mut words = args.split_whitespace().peekable();
                let is_static = words.peek() == Some(&"static");
                if is_static {
                    words.next();
                }
                let name = match words.next() {
                    Some(n) => n.to_string(),
                    None => return Err(self.err(number, "missing field name".into())),
                };
                let init = match words.next() {
                    Some("=") => match words.next().map(parse_int) {
                        Some(Some(v)) => Some(v),
                        _ => return Err(self.err(number, "bad field initializer".into())),
                    },
                    Some(other) => {
                        return Err(self.err(number, format!("unexpected '{}'", other)))
                    }
                    None => None,
                };
                self.current_type(number)?.fields.push(FieldDef {
                    name,
                    is_static,
                    init,
                });
                Ok(())
            }
            "method" => {
                let mut words = args.split_whitespace();
                let name = match words.next() {
                    Some(n) => n.to_string(),
                    None => return Err(self.err(number, "missing method name".into())),
                };
                let mut method = MethodDef::new(name);
                for flag in words {
                    match flag {
                        "entrypoint" => method.is_entry_point = true,
                        "ctor" => method.is_constructor = true,
                        "cctor" => method.is_static_constructor = true,
                        "static" => {}
                        other => {
                            return Err(self.err(number, format!("unknown method flag '{}'", other)))
                        }
                    }
                }
                let ty = self.current_type(number)?;
                ty.methods.push(method);
                self.in_method = true;
                self.next_offset = 0;
                Ok(())
            }
            "param" => {
                let name = args.trim().to_string();
                self.current_method(number)?.params.push(name);
                Ok(())
            }
            "local" => {
                let ty = args.trim().to_string();
                self.current_method(number)?.locals.push(ty);
                Ok(())
            }
            other => Err(self.err(number, format!("unknown directive '.{}'", other))),
        }
    }

    fn instruction(&mut self, number: usize, line: &str) -> BuildResult<()> {
        let (offset, rest) = self.split_offset(number, line)?;
        let (mnemonic, operand) = split_word(rest);
        if mnemonic.is_empty() {
            return Ok(());
        }
        let op = self.classify(number, mnemonic, operand.trim())?;
        self.next_offset = offset + 1;
        self.current_method(number)?
            .body
            .push(Inst::new(offset, op));
        Ok(())
    }

    /// Strip an optional `IL_xxxx:` offset label.
    fn split_offset<'a>(&self, number: usize, line: &'a str) -> BuildResult<(u32, &'a str)> {
        let Some((head, rest)) = line.split_once(':') else {
            return Ok((self.next_offset, line));
        };
        let head = head.trim();
        let Some(hex) = head.strip_prefix("IL_") else {
            return Ok((self.next_offset, line));
        };
        let offset = u32::from_str_radix(hex, 16)
            .map_err(|_| self.err(number, format!("bad offset label '{}'", head)))?;
        Ok((offset, rest))
    }

    fn classify(&self, number: usize, mnemonic: &str, operand: &str) -> BuildResult<Op> {
        // Short encodings collapse onto their long forms.
        let base = mnemonic.strip_suffix(".s").unwrap_or(mnemonic);
        let op = match base {
            "nop" => Op::Nop,
            "ret" => Op::Ret,
            "dup" => Op::Dup,
            "pop" => Op::Pop,
            "add" => Op::Add,
            "sub" => Op::Sub,
            "mul" => Op::Mul,
            "and" => Op::And,
            "or" => Op::Or,
            "xor" => Op::Xor,
            "shl" => Op::Shl,
            "shr" | "shr.un" => Op::Shr,
            "ceq" => Op::Ceq,
            "cgt" | "cgt.un" => Op::Cgt,
            "clt" | "clt.un" => Op::Clt,

            "ldc.i4" => Op::LdcI4(self.int_operand(number, operand)? as i32),
            "ldc.i4.m1" => Op::LdcI4(-1),
            "ldc.i8" => Op::LdcI8(self.int_operand(number, operand)?),

            "ldloc" => Op::Ldloc(self.slot_operand(number, operand)?),
            "stloc" => Op::Stloc(self.slot_operand(number, operand)?),
            "ldarg" => Op::Ldarg(self.slot_operand(number, operand)?),
            "starg" => Op::Starg(self.slot_operand(number, operand)?),

            "ldstr" => Op::Ldstr(self.string_operand(number, operand)?),

            "call" => {
                let (name, arity) = split_word(operand);
                let arity = if arity.trim().is_empty() {
                    0
                } else {
                    arity
                        .trim()
                        .parse()
                        .map_err(|_| self.err(number, format!("bad arity '{}'", arity.trim())))?
                };
                Op::Call(MethodRef {
                    full_name: normalize_name(name),
                    arity,
                })
            }

            "ldsfld" => Op::Ldsfld(FieldRef {
                full_name: normalize_name(operand),
            }),
            "stsfld" => Op::Stsfld(FieldRef {
                full_name: normalize_name(operand),
            }),

            "br" => Op::Br(self.target_operand(number, operand)?),
            "brtrue" | "brinst" => Op::Brtrue(self.target_operand(number, operand)?),
            "brfalse" | "brnull" => Op::Brfalse(self.target_operand(number, operand)?),
            "beq" => Op::Beq(self.target_operand(number, operand)?),
            "bne.un" => Op::Bne(self.target_operand(number, operand)?),
            "bge" | "bge.un" => Op::Bge(self.target_operand(number, operand)?),
            "bgt" | "bgt.un" => Op::Bgt(self.target_operand(number, operand)?),
            "ble" | "ble.un" => Op::Ble(self.target_operand(number, operand)?),
            "blt" | "blt.un" => Op::Blt(self.target_operand(number, operand)?),

            _ => {
                // ldc.i4.N / ldloc.N / conv.* / ldind.* families, else unknown.
                if let Some(op) = classify_dotted(base) {
                    op
                } else {
                    Op::Unknown(mnemonic.to_string())
                }
            }
        };
        Ok(op)
    }

    fn int_operand(&self, number: usize, operand: &str) -> BuildResult<i64> {
        parse_int(operand).ok_or_else(|| self.err(number, format!("bad integer '{}'", operand)))
    }

    fn slot_operand(&self, number: usize, operand: &str) -> BuildResult<u16> {
        operand
            .parse()
            .map_err(|_| self.err(number, format!("bad slot index '{}'", operand)))
    }

    fn target_operand(&self, number: usize, operand: &str) -> BuildResult<u32> {
        let parsed = match operand.strip_prefix("IL_") {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => operand.parse().ok(),
        };
        parsed.ok_or_else(|| self.err(number, format!("bad branch target '{}'", operand)))
    }

    fn string_operand(&self, number: usize, operand: &str) -> BuildResult<String> {
        let inner = operand
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .ok_or_else(|| self.err(number, "ldstr operand must be quoted".into()))?;
        unescape(inner).map_err(|message| self.err(number, message))
    }

    fn current_type(&mut self, number: usize) -> BuildResult<&mut TypeDef> {
        let err = self.err(number, "directive outside a .class".into());
        self.module.types.last_mut().ok_or(err)
    }

    fn current_method(&mut self, number: usize) -> BuildResult<&mut MethodDef> {
        if !self.in_method {
            return Err(self.err(number, "instruction outside a .method".into()));
        }
        let err = self.err(number, "instruction outside a .method".into());
        self.module
            .types
            .last_mut()
            .and_then(|ty| ty.methods.last_mut())
            .ok_or(err)
    }

    fn err(&self, line: usize, message: String) -> BuildError {
        BuildError::Input {
            path: self.path.to_path_buf(),
            line,
            message,
        }
    }
}

// ─── Mnemonic families ────────────────────────────────────────────

/// `ldc.i4.N`, `ldloc.N`, `conv.*`, `ldind.*`, `stind.*`.
fn classify_dotted(mnemonic: &str) -> Option<Op> {
    if let Some(digit) = mnemonic.strip_prefix("ldc.i4.") {
        return digit.parse::<i32>().ok().map(Op::LdcI4);
    }
    for (prefix, make) in [
        ("ldloc.", Op::Ldloc as fn(u16) -> Op),
        ("stloc.", Op::Stloc),
        ("ldarg.", Op::Ldarg),
        ("starg.", Op::Starg),
    ] {
        if let Some(digit) = mnemonic.strip_prefix(prefix) {
            return digit.parse::<u16>().ok().map(make);
        }
    }
    if let Some(suffix) = mnemonic.strip_prefix("conv.") {
        return width_kind(suffix).map(Op::Conv);
    }
    if let Some(suffix) = mnemonic.strip_prefix("ldind.") {
        return width_kind(suffix).map(Op::Ldind);
    }
    if let Some(suffix) = mnemonic.strip_prefix("stind.") {
        return width_kind(suffix).map(Op::Stind);
    }
    None
}

fn width_kind(suffix: &str) -> Option<WidthKind> {
    match suffix {
        "i1" => Some(WidthKind::I1),
        "u1" => Some(WidthKind::U1),
        "i2" => Some(WidthKind::I2),
        "u2" => Some(WidthKind::U2),
        "i4" => Some(WidthKind::I4),
        "u4" => Some(WidthKind::U4),
        "i8" => Some(WidthKind::I8),
        "u8" => Some(WidthKind::U8),
        "i" => Some(WidthKind::I),
        "u" => Some(WidthKind::U),
        _ => None,
    }
}

// ─── Lexical helpers ──────────────────────────────────────────────

/// Split off the first whitespace-delimited word.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

/// Strip a `//` comment, ignoring slashes inside string literals.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_string = !in_string,
            b'\\' if in_string => i += 1,
            b'/' if !in_string && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
        i += 1;
    }
    line
}

/// `Ns.Type::Member` and `Ns.Type.Member` both mean the dotted name.
fn normalize_name(name: &str) -> String {
    name.trim().replace("::", ".")
}

fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn unescape(s: &str) -> Result<String, String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => return Err(format!("unknown escape '\\{}'", other)),
            None => return Err("dangling escape at end of string".into()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Module {
        parse_listing(source, Path::new("test.il")).unwrap()
    }

    #[test]
    fn parses_assembly_and_class_structure() {
        let module = parse(
            ".assembly Kernel\n\
             .class Kernel.Boot\n\
             .method Main entrypoint\n\
             IL_0000: ret\n",
        );
        assert_eq!(module.name, "Kernel");
        assert_eq!(module.types.len(), 1);
        assert_eq!(module.types[0].namespace, "Kernel");
        assert_eq!(module.types[0].name, "Boot");
        let (_, main) = module.entry_point().unwrap();
        assert_eq!(main.body.len(), 1);
        assert_eq!(main.body[0].op, Op::Ret);
    }

    #[test]
    fn parses_short_form_mnemonics() {
        let module = parse(
            ".assembly A\n.class C\n.method M entrypoint\n\
             ldc.i4.5\nstloc.0\nldloc.0\nbr.s IL_0000\nret\n",
        );
        let body = &module.types[0].methods[0].body;
        assert_eq!(body[0].op, Op::LdcI4(5));
        assert_eq!(body[1].op, Op::Stloc(0));
        assert_eq!(body[2].op, Op::Ldloc(0));
        assert_eq!(body[3].op, Op::Br(0));
    }

    #[test]
    fn offsets_follow_labels_and_count_up() {
        let module = parse(
            ".assembly A\n.class C\n.method M entrypoint\n\
             IL_0004: nop\nnop\nIL_000a: ret\n",
        );
        let body = &module.types[0].methods[0].body;
        assert_eq!(body[0].offset, 4);
        assert_eq!(body[1].offset, 5);
        assert_eq!(body[2].offset, 0xa);
    }

    #[test]
    fn parses_fields_and_initializers() {
        let module = parse(
            ".assembly A\n.class C\n\
             .field static X = 7\n\
             .field static Y\n\
             .method M entrypoint\nret\n",
        );
        let fields = &module.types[0].fields;
        assert_eq!(fields[0].init, Some(7));
        assert!(fields[0].is_static);
        assert_eq!(fields[1].init, None);
    }

    #[test]
    fn parses_call_with_arity() {
        let module = parse(
            ".assembly A\n.class C\n.method M entrypoint\n\
             call C::Add 2\nret\n",
        );
        let body = &module.types[0].methods[0].body;
        assert_eq!(
            body[0].op,
            Op::Call(MethodRef {
                full_name: "C.Add".into(),
                arity: 2
            })
        );
    }

    #[test]
    fn parses_string_escapes() {
        let module = parse(
            ".assembly A\n.class C\n.method M entrypoint\n\
             ldstr \"a\\n\\\"b\\\"\"\nret\n",
        );
        let body = &module.types[0].methods[0].body;
        assert_eq!(body[0].op, Op::Ldstr("a\n\"b\"".into()));
    }

    #[test]
    fn unknown_mnemonics_survive_as_unknown() {
        let module = parse(
            ".assembly A\n.class C\n.method M entrypoint\n\
             newobj C::.ctor\nret\n",
        );
        let body = &module.types[0].methods[0].body;
        assert_eq!(body[0].op, Op::Unknown("newobj".into()));
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let module = parse(
            "// header\n.assembly A\n\n.class C\n.method M entrypoint\n\
             ret // done\n",
        );
        assert_eq!(module.types[0].methods[0].body.len(), 1);
    }

    #[test]
    fn malformed_operands_are_input_errors() {
        let err = parse_listing(
            ".assembly A\n.class C\n.method M entrypoint\nldstr unquoted\n",
            Path::new("bad.il"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("bad.il:4"));
    }

    #[test]
    fn instructions_outside_methods_are_rejected() {
        let err = parse_listing(".assembly A\nret\n", Path::new("bad.il")).unwrap_err();
        assert!(err.to_string().contains("outside"));
    }
}
