//! Tests for the compile layer.

use jitforge_config::JitConfig;
use jitforge_ir::{DataDef, Expr, FunctionDef, Linkage, Module, Signature, Stmt, Type};
use jitforge_test::modules::{add_one_module, ghost_module, sum_to_module};

use super::*;

fn layer() -> CompileLayer {
    let target = TargetDescriptor::host(&JitConfig::default()).expect("host target");
    CompileLayer::new(target)
}

fn compile_error(result: Result<ObjectFile>) -> (String, String) {
    match result {
        Err(JitError::Compile { symbol, construct }) => (symbol, construct),
        other => panic!("expected a compile error, got {other:?}"),
    }
}

fn single_function(
    context: &mut Context,
    signature: Signature,
    build: impl FnOnce(&mut FunctionDef),
) -> Module {
    let mut module = Module::new("m", context);
    let f = context.symbol("f");
    let mut function = FunctionDef::new(f, signature);
    build(&mut function);
    module.define_function(function);
    module
}

#[test]
fn test_compile_add_one() {
    let layer = layer();
    let mut context = Context::new();
    let module = add_one_module(&mut context);

    let object = layer.compile(&module, &context).unwrap();

    let name = mangle("add_one", layer.target().data_layout());
    let symbol = object.symbol(&name).expect("add_one symbol");
    assert_eq!(symbol.kind, SymbolKind::Function);
    assert_eq!(symbol.section, SectionKind::Text);
    assert_eq!(symbol.offset, 0);
    assert!(symbol.size > 0);
    assert!(symbol.exported);
    assert!(!object.section(SectionKind::Text).is_empty());
    assert!(object.undefined_symbols().is_empty());
}

#[test]
fn test_local_functions_are_not_exported() {
    let layer = layer();
    let mut context = Context::new();
    let module = sum_to_module(&mut context);

    let object = layer.compile(&module, &context).unwrap();

    let layout = layer.target().data_layout();
    assert!(!object.symbol(&mangle("step", layout)).unwrap().exported);
    assert!(object.symbol(&mangle("sum_to", layout)).unwrap().exported);
    // Functions are laid out at aligned offsets.
    let sum_to = object.symbol(&mangle("sum_to", layout)).unwrap();
    assert_eq!(sum_to.offset % MIN_FUNCTION_ALIGN, 0);
}

#[test]
fn test_imports_become_undefined_symbols() {
    let layer = layer();
    let mut context = Context::new();
    let module = ghost_module(&mut context);

    let object = layer.compile(&module, &context).unwrap();

    let ghost = mangle("ghost_fn", layer.target().data_layout());
    assert_eq!(object.undefined_symbols(), vec![ghost.as_str()]);
}

#[test]
fn test_data_goes_to_matching_section() {
    let layer = layer();
    let mut context = Context::new();
    let mut module = Module::new("data", &context);
    let table = context.symbol("table");
    let counter = context.symbol("counter");
    module.define_data(DataDef::i32_array(
        table,
        &[1, 2, 3],
        layer.target().data_layout().endianness(),
    ));
    module.define_data(DataDef::writable(counter, vec![0; 8]));

    let object = layer.compile(&module, &context).unwrap();

    let layout = layer.target().data_layout();
    let table = object.symbol(&mangle("table", layout)).unwrap();
    assert_eq!(table.section, SectionKind::ReadOnlyData);
    assert_eq!(table.size, 12);
    let counter = object.symbol(&mangle("counter", layout)).unwrap();
    assert_eq!(counter.section, SectionKind::ReadWriteData);
    assert_eq!(object.section(SectionKind::ReadWriteData).align, 8);
}

#[test]
fn test_duplicate_definition() {
    let layer = layer();
    let mut context = Context::new();
    let mut module = add_one_module(&mut context);
    let add_one = context.symbol("add_one");
    module.define_data(DataDef::read_only(add_one, vec![1]));

    let err = layer.compile(&module, &context).unwrap_err();
    assert_eq!(
        err,
        JitError::DuplicateDefinition {
            symbol: "add_one".to_string(),
            namespace: "add_one_module".to_string(),
        }
    );
}

#[test]
fn test_invalid_symbol_name() {
    let layer = layer();
    let mut context = Context::new();
    let mut module = Module::new("m", &context);
    let bad = context.symbol("1st-function");
    module.define_function(FunctionDef::new(bad, Signature::default()));

    let (symbol, construct) = compile_error(layer.compile(&module, &context));
    assert_eq!(symbol, "1st-function");
    assert_eq!(construct, "invalid symbol name");
}

#[test]
fn test_module_from_other_context() {
    let layer = layer();
    let mut context = Context::new();
    let module = add_one_module(&mut context);
    let other = Context::new();

    let (symbol, _) = compile_error(layer.compile(&module, &other));
    assert_eq!(symbol, "add_one_module");
}

#[test]
fn test_operand_type_mismatch() {
    let layer = layer();
    let mut context = Context::new();
    let module = single_function(
        &mut context,
        Signature::new([Type::I32], Some(Type::I32)),
        |f| f.push(Stmt::ret(Expr::param(0) + Expr::i64(1))),
    );

    let (symbol, construct) = compile_error(layer.compile(&module, &context));
    assert_eq!(symbol, "f");
    assert!(construct.contains("i64"), "{construct}");
}

#[test]
fn test_missing_return() {
    let layer = layer();
    let mut context = Context::new();
    let module = single_function(&mut context, Signature::new([], Some(Type::I32)), |_| {});

    let (symbol, construct) = compile_error(layer.compile(&module, &context));
    assert_eq!(symbol, "f");
    assert!(construct.contains("non-void"), "{construct}");
}

#[test]
fn test_void_function_falls_through() {
    let layer = layer();
    let mut context = Context::new();
    let module = single_function(&mut context, Signature::default(), |f| {
        let x = f.local(Type::I32);
        f.push(Stmt::set(x, Expr::i32(1)));
    });

    assert!(layer.compile(&module, &context).is_ok());
}

#[test]
fn test_statements_after_return_are_skipped() {
    let layer = layer();
    let mut context = Context::new();
    let module = single_function(&mut context, Signature::new([], Some(Type::I32)), |f| {
        f.push(Stmt::ret(Expr::i32(1)));
        f.push(Stmt::ret(Expr::i32(2)));
    });

    assert!(layer.compile(&module, &context).is_ok());
}

#[test]
fn test_if_with_returns_in_both_arms() {
    let layer = layer();
    let mut context = Context::new();
    let module = single_function(
        &mut context,
        Signature::new([Type::I32], Some(Type::I32)),
        |f| {
            f.push(Stmt::if_else(
                Expr::lt(Expr::param(0), Expr::i32(0)),
                vec![Stmt::ret(Expr::i32(-1))],
                vec![Stmt::ret(Expr::i32(1))],
            ))
        },
    );

    assert!(layer.compile(&module, &context).is_ok());
}

#[test]
fn test_call_arity_mismatch() {
    let layer = layer();
    let mut context = Context::new();
    let mut module = add_one_module(&mut context);
    let add_one = context.symbol("add_one");
    let caller = context.symbol("caller");
    module.define_function(
        FunctionDef::new(caller, Signature::new([], Some(Type::I32)))
            .with_body(vec![Stmt::ret(Expr::call(add_one, vec![]))]),
    );

    let (symbol, construct) = compile_error(layer.compile(&module, &context));
    assert_eq!(symbol, "caller");
    assert!(construct.contains("0 arguments, expected 1"), "{construct}");
}

#[test]
fn test_call_to_undeclared_symbol() {
    let layer = layer();
    let mut context = Context::new();
    let missing = context.symbol("missing");
    let module = single_function(&mut context, Signature::new([], Some(Type::I32)), |f| {
        f.push(Stmt::ret(Expr::call(missing, vec![])))
    });

    let (_, construct) = compile_error(layer.compile(&module, &context));
    assert_eq!(construct, "call to undeclared symbol `missing`");
}

#[test]
fn test_void_call_used_as_value() {
    let layer = layer();
    let mut context = Context::new();
    let mut module = Module::new("m", &context);
    let noop = context.symbol("noop");
    let f = context.symbol("f");
    module.define_function(FunctionDef::new(noop, Signature::default()));
    module.define_function(
        FunctionDef::new(f, Signature::new([], Some(Type::I32)))
            .with_body(vec![Stmt::ret(Expr::call(noop, vec![]))]),
    );

    let (symbol, _) = compile_error(layer.compile(&module, &context));
    assert_eq!(symbol, "f");
}

#[test]
fn test_parameter_out_of_range() {
    let layer = layer();
    let mut context = Context::new();
    let module = single_function(&mut context, Signature::new([], Some(Type::I32)), |f| {
        f.push(Stmt::ret(Expr::param(2)))
    });

    let (_, construct) = compile_error(layer.compile(&module, &context));
    assert_eq!(construct, "parameter 2 out of range");
}

#[test]
fn test_literal_out_of_range() {
    let layer = layer();
    let mut context = Context::new();
    let module = single_function(&mut context, Signature::new([], Some(Type::I32)), |f| {
        f.push(Stmt::ret(Expr::int(Type::I32, i64::from(i32::MAX) + 1)))
    });

    let (_, construct) = compile_error(layer.compile(&module, &context));
    assert!(construct.contains("does not fit in i32"), "{construct}");
}

#[test]
fn test_bad_data_alignment() {
    let layer = layer();
    let mut context = Context::new();
    let mut module = Module::new("m", &context);
    let blob = context.symbol("blob");
    module.define_data(DataDef::read_only(blob, vec![0; 4]).with_align(3));

    let (symbol, _) = compile_error(layer.compile(&module, &context));
    assert_eq!(symbol, "blob");
}

#[test]
fn test_address_of_local_data_is_relocated() {
    let layer = layer();
    let mut context = Context::new();
    let mut module = Module::new("m", &context);
    let table = context.symbol("table");
    let first = context.symbol("first");
    module.define_data(
        DataDef::i32_array(table, &[9], layer.target().data_layout().endianness())
            .with_linkage(Linkage::Local),
    );
    module.define_function(
        FunctionDef::new(first, Signature::new([], Some(Type::I32))).with_body(vec![
            Stmt::ret(Expr::load(Type::I32, Expr::address_of(table), 0)),
        ]),
    );

    let object = layer.compile(&module, &context).unwrap();

    let table = mangle("table", layer.target().data_layout());
    assert!(object
        .relocations
        .iter()
        .any(|r| r.target == RelocTarget::Symbol(table.clone())));
    assert!(object.undefined_symbols().is_empty());
}
