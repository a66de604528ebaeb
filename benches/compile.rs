use criterion::{criterion_group, criterion_main, Criterion};

use bedrock::backend::{create_backend, Architecture};
use bedrock::lower::Lowerer;
use bedrock::module::{Inst, MethodDef, MethodRef, Module, Op, TypeDef};
use bedrock::target::Arch;

/// A module with `methods` arithmetic-heavy method bodies plus an entry
/// point calling the first of them.
fn synthetic_module(methods: usize) -> Module {
    let mut module = Module::new("Bench");
    let mut ty = TypeDef::new("Bench", "Program");

    for n in 0..methods {
        let mut method = MethodDef::new(format!("Work{}", n));
        method.locals.push("int64".into());
        let body = vec![
            Op::LdcI4(n as i32),
            Op::Stloc(0),
            Op::Ldloc(0),
            Op::LdcI4(3),
            Op::Add,
            Op::LdcI4(1),
            Op::Shl,
            Op::LdcI4(0),
            Op::Ceq,
            Op::Brtrue(11),
            Op::Nop,
            Op::Ret,
        ];
        method.body = body
            .into_iter()
            .enumerate()
            .map(|(i, op)| Inst::new(i as u32, op))
            .collect();
        ty.methods.push(method);
    }

    let mut main = MethodDef::new("Main");
    main.is_entry_point = true;
    main.body = vec![
        Inst::new(
            0,
            Op::Call(MethodRef {
                full_name: "Bench.Program.Work0".into(),
                arity: 0,
            }),
        ),
        Inst::new(1, Op::Ret),
    ];
    ty.methods.push(main);

    module.types.push(ty);
    module
}

fn bench_compile(c: &mut Criterion) {
    let module = synthetic_module(64);

    c.bench_function("lower 64 methods", |b| {
        b.iter(|| Lowerer::new(&module, 8).lower().unwrap())
    });

    let (unit, _) = Lowerer::new(&module, 8).lower().unwrap();
    c.bench_function("emit 64 methods", |b| {
        b.iter(|| {
            let mut backend = create_backend(Arch::Amd64);
            backend.compile(&unit).unwrap()
        })
    });
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
