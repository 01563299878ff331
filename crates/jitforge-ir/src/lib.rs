//! IR modules for the jitforge JIT engine.
//!
//! A front end builds a [`Module`] against a [`Context`], which interns every
//! symbol name the module mentions. Both are handed to the engine together;
//! the engine becomes their sole owner.
//!
//! ```
//! use jitforge_ir::{Context, Expr, FunctionDef, Module, Signature, Stmt, Type};
//!
//! let mut ctx = Context::new();
//! let add_one = ctx.symbol("add_one");
//!
//! let mut module = Module::new("demo", &ctx);
//! module.define_function(
//!     FunctionDef::new(add_one, Signature::new([Type::I32], Some(Type::I32)))
//!         .with_body(vec![Stmt::ret(Expr::param(0) + Expr::i32(1))]),
//! );
//! assert_eq!(module.functions().len(), 1);
//! ```

mod context;
mod expr;
mod module;
mod types;


pub use context::{Context, ContextId, Symbol};
pub use expr::{BinOp, CmpOp, Expr, Local, Stmt};
pub use module::{DataDef, FunctionDef, Import, ImportKind, Linkage, Module};
pub use types::{Signature, Type};
