//! Builds an `integer_distances` kernel as IR, compiles it into the process
//! and prints the element-wise distances of two fixed vectors.
//!
//! The kernel allocates its result from a host arena through an imported
//! helper, so the run exercises host symbol resolution as well as code
//! generation.
//!
//! Engine settings are read from `jitforge.toml` when present.

use std::process::ExitCode;

use jitforge::arena::ALLOC_SYMBOL;
use jitforge::ir::{Context, Expr, FunctionDef, Module, Signature, Stmt, Type};
use jitforge::{IntArena, Jit, JitConfig, JitError, Result, TargetDescriptor};

const ARENA: &str = "jit_arena";
const X: [i32; 3] = [0, 1, 2];
const Y: [i32; 3] = [3, 1, -1];

fn main() -> ExitCode {
    jitforge_console::init();

    match run() {
        Ok(distances) => {
            let joined: Vec<String> = distances.iter().map(i32::to_string).collect();
            println!("Integer Distances: {}", joined.join(", "));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("integer-distances: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<Vec<i32>> {
    let config = JitConfig::load("jitforge.toml").unwrap_or_default();
    let target = TargetDescriptor::host(&config)?;

    // Declared before the engine so it outlives the code that points at it.
    let arena = Box::new(IntArena::new(X.len()));
    let jit = Jit::with_config(target, &config);
    jit.add_host_generator(arena.symbols(ARENA));

    let mut context = Context::new();
    let module = build_module(&mut context, X.len() as i32);
    jit.submit_module(module, context)?;

    let kernel = unsafe {
        jit.get_function::<extern "C" fn(*const i32, *const i32) -> *mut i32>("integer_distances")
    }?;
    let result = kernel.call(X.as_ptr(), Y.as_ptr());
    if result.is_null() {
        return Err(JitError::Memory(format!(
            "arena exhausted after {} of {} slots",
            arena.used(),
            arena.capacity()
        )));
    }

    // SAFETY: a non-null result points at `X.len()` slots inside `arena`.
    Ok(unsafe { std::slice::from_raw_parts(result, X.len()) }.to_vec())
}

/// `integer_distances(x: ptr, y: ptr) -> ptr`
fn build_module(context: &mut Context, items: i32) -> Module {
    let mut module = Module::new("integer_distances", context);
    let alloc = context.symbol(ALLOC_SYMBOL);
    let arena = context.symbol(ARENA);
    let name = context.symbol("integer_distances");

    module.import_function(alloc, Signature::new([Type::Ptr, Type::I32], Some(Type::Ptr)));
    module.import_data(arena);

    let mut function = FunctionDef::new(name, Signature::new([Type::Ptr, Type::Ptr], Some(Type::Ptr)));
    let out = function.local(Type::Ptr);
    let i = function.local(Type::I32);
    let element = |base: Expr| Expr::load(Type::I32, Expr::offset(base, Expr::local(i), 4), 0);

    function.push(Stmt::set(
        out,
        Expr::call(alloc, vec![Expr::address_of(arena), Expr::i32(items)]),
    ));
    function.push(Stmt::if_then(
        Expr::eq(Expr::local(out), Expr::int(Type::Ptr, 0)),
        vec![Stmt::ret(Expr::local(out))],
    ));
    function.push(Stmt::while_loop(
        Expr::lt(Expr::local(i), Expr::i32(items)),
        vec![
            Stmt::store(
                Type::I32,
                Expr::offset(Expr::local(out), Expr::local(i), 4),
                0,
                Expr::abs(element(Expr::param(0)) - element(Expr::param(1))),
            ),
            Stmt::set(i, Expr::local(i) + Expr::i32(1)),
        ],
    ));
    function.push(Stmt::ret(Expr::local(out)));
    module.define_function(function);
    module
}
