//! Modules that call host-provided runtime helpers.
//!
//! The helper has the C signature `fn(arena: *mut Arena, items: u32) ->
//! *mut i32` and the arena is reached through an imported data symbol whose
//! address is the arena itself.

use jitforge_ir::{Context, Expr, FunctionDef, Module, Signature, Stmt, Type};

/// Signature of the host allocation helper.
pub fn alloc_signature() -> Signature {
    Signature::new([Type::Ptr, Type::I32], Some(Type::Ptr))
}

/// `allocate_block(items: i32) -> ptr { helper(&arena, items) }`
pub fn allocate_block_module(context: &mut Context, helper: &str, arena: &str) -> Module {
    let mut module = Module::new("allocate_block_module", context);
    let helper = context.symbol(helper);
    let arena = context.symbol(arena);
    let allocate_block = context.symbol("allocate_block");

    module.import_function(helper, alloc_signature());
    module.import_data(arena);
    module.define_function(
        FunctionDef::new(
            allocate_block,
            Signature::new([Type::I32], Some(Type::Ptr)),
        )
        .with_body(vec![Stmt::ret(Expr::call(
            helper,
            vec![Expr::address_of(arena), Expr::param(0)],
        ))]),
    );
    module
}

/// `integer_distances(x: ptr, y: ptr) -> ptr`
///
/// Allocates `items` slots through the host helper, stores
/// `abs(x[i] - y[i])` into each and returns the block. Returns null when the
/// helper does.
pub fn integer_distances_module(
    context: &mut Context,
    helper: &str,
    arena: &str,
    items: i32,
) -> Module {
    let mut module = Module::new("integer_distances_module", context);
    let helper = context.symbol(helper);
    let arena = context.symbol(arena);
    let integer_distances = context.symbol("integer_distances");

    module.import_function(helper, alloc_signature());
    module.import_data(arena);

    let mut function = FunctionDef::new(
        integer_distances,
        Signature::new([Type::Ptr, Type::Ptr], Some(Type::Ptr)),
    );
    let result = function.local(Type::Ptr);
    let i = function.local(Type::I32);

    let element = |base: Expr| Expr::load(Type::I32, Expr::offset(base, Expr::local(i), 4), 0);

    function.push(Stmt::set(
        result,
        Expr::call(
            helper,
            vec![Expr::address_of(arena), Expr::i32(items)],
        ),
    ));
    function.push(Stmt::if_then(
        Expr::eq(Expr::local(result), Expr::int(Type::Ptr, 0)),
        vec![Stmt::ret(Expr::local(result))],
    ));
    function.push(Stmt::while_loop(
        Expr::lt(Expr::local(i), Expr::i32(items)),
        vec![
            Stmt::store(
                Type::I32,
                Expr::offset(Expr::local(result), Expr::local(i), 4),
                0,
                Expr::abs(element(Expr::param(0)) - element(Expr::param(1))),
            ),
            Stmt::set(i, Expr::local(i) + Expr::i32(1)),
        ],
    ));
    function.push(Stmt::ret(Expr::local(result)));
    module.define_function(function);
    module
}
