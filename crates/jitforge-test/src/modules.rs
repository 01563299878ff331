//! Arithmetic module fixtures.

use jitforge_ir::{Context, Expr, FunctionDef, Linkage, Module, Signature, Stmt, Type};

/// `add_one(x: i32) -> i32 { x + 1 }`
pub fn add_one_module(context: &mut Context) -> Module {
    let mut module = Module::new("add_one_module", context);
    let add_one = context.symbol("add_one");
    module.define_function(
        FunctionDef::new(add_one, Signature::new([Type::I32], Some(Type::I32)))
            .with_body(vec![Stmt::ret(Expr::param(0) + Expr::i32(1))]),
    );
    module
}

/// `add_two(x: i32) -> i32 { add_one(add_one(x)) }` with `add_one` imported.
///
/// Links only if a previously submitted module exports `add_one`.
pub fn add_two_module(context: &mut Context) -> Module {
    let mut module = Module::new("add_two_module", context);
    let add_one = context.symbol("add_one");
    let add_two = context.symbol("add_two");
    module.import_function(add_one, Signature::new([Type::I32], Some(Type::I32)));
    module.define_function(
        FunctionDef::new(add_two, Signature::new([Type::I32], Some(Type::I32))).with_body(vec![
            Stmt::ret(Expr::call(
                add_one,
                vec![Expr::call(add_one, vec![Expr::param(0)])],
            )),
        ]),
    );
    module
}

/// `call_ghost() -> i32 { ghost_fn() }` where nothing defines `ghost_fn`.
///
/// Also defines `bystander`, which never becomes callable because the module
/// fails to link.
pub fn ghost_module(context: &mut Context) -> Module {
    let mut module = Module::new("ghost_module", context);
    let ghost = context.symbol("ghost_fn");
    let call_ghost = context.symbol("call_ghost");
    let bystander = context.symbol("bystander");
    module.import_function(ghost, Signature::new([], Some(Type::I32)));
    module.define_function(
        FunctionDef::new(call_ghost, Signature::new([], Some(Type::I32)))
            .with_body(vec![Stmt::ret(Expr::call(ghost, vec![]))]),
    );
    module.define_function(
        FunctionDef::new(bystander, Signature::new([], Some(Type::I32)))
            .with_body(vec![Stmt::ret(Expr::i32(7))]),
    );
    module
}

/// `sum_to(n: i64) -> i64`, summing `1..=n` through a module-local helper
/// `step(acc, i) -> acc + i`.
pub fn sum_to_module(context: &mut Context) -> Module {
    let mut module = Module::new("sum_to_module", context);
    let step = context.symbol("step");
    let sum_to = context.symbol("sum_to");

    module.define_function(
        FunctionDef::new(step, Signature::new([Type::I64, Type::I64], Some(Type::I64)))
            .with_linkage(Linkage::Local)
            .with_body(vec![Stmt::ret(Expr::param(0) + Expr::param(1))]),
    );

    let mut function = FunctionDef::new(sum_to, Signature::new([Type::I64], Some(Type::I64)));
    let acc = function.local(Type::I64);
    let i = function.local(Type::I64);
    function.push(Stmt::set(i, Expr::i64(1)));
    function.push(Stmt::while_loop(
        Expr::le(Expr::local(i), Expr::param(0)),
        vec![
            Stmt::set(
                acc,
                Expr::call(step, vec![Expr::local(acc), Expr::local(i)]),
            ),
            Stmt::set(i, Expr::local(i) + Expr::i64(1)),
        ],
    ));
    function.push(Stmt::ret(Expr::local(acc)));
    module.define_function(function);
    module
}
