//! Lowering of IR function bodies to Cranelift IR.
//!
//! Type checking happens here, while lowering: every construct is checked
//! against the types of its operands before an instruction is emitted.

use std::collections::HashMap;

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::immediates::Imm64;
use cranelift_codegen::ir::{
    self, AbiParam, ExtFuncData, ExternalName, FuncRef, GlobalValue, GlobalValueData,
    InstBuilder, MemFlags, UserExternalName, Value,
};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};
use jitforge_core::{JitError, Result};
use jitforge_ir::{
    BinOp, CmpOp, Context, Expr, FunctionDef, ImportKind, Local, Module, Signature, Stmt, Symbol,
    Type,
};

use crate::target::TargetDescriptor;

/// Maps an IR type to the Cranelift type of the target.
pub(crate) fn clif_type(ty: Type, target: &TargetDescriptor) -> ir::Type {
    match ty {
        Type::I32 => ir::types::I32,
        Type::I64 => ir::types::I64,
        Type::Ptr => target.pointer_type(),
    }
}

/// Builds the Cranelift signature of an IR signature under the target's
/// default calling convention.
pub(crate) fn clif_signature(signature: &Signature, target: &TargetDescriptor) -> ir::Signature {
    let mut sig = ir::Signature::new(target.call_conv());
    for &param in &signature.params {
        sig.params.push(AbiParam::new(clif_type(param, target)));
    }
    if let Some(ret) = signature.ret {
        sig.returns.push(AbiParam::new(clif_type(ret, target)));
    }
    sig
}

/// A lowered value together with its IR type.
#[derive(Clone, Copy)]
struct Typed {
    value: Value,
    ty: Type,
}

/// Fills `func` with the body of `function`.
pub(crate) fn lower_function(
    func: &mut ir::Function,
    module: &Module,
    context: &Context,
    function: &FunctionDef,
    name: &str,
    target: &TargetDescriptor,
) -> Result<()> {
    let mut func_ctx = FunctionBuilderContext::new();
    let mut builder = FunctionBuilder::new(func, &mut func_ctx);

    let entry = builder.create_block();
    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);
    let params = builder.block_params(entry).to_vec();

    for (idx, &ty) in function.locals.iter().enumerate() {
        let var = Variable::from_u32(idx as u32);
        let clif = clif_type(ty, target);
        builder.declare_var(var, clif);
        let zero = builder.ins().iconst(clif, 0);
        builder.def_var(var, zero);
    }

    let mut lowering = FunctionLowering {
        builder,
        module,
        context,
        function,
        name,
        target,
        params,
        callees: HashMap::new(),
        globals: HashMap::new(),
        terminated: false,
    };
    lowering.lower_body(&function.body)?;

    if !lowering.terminated {
        if function.signature.ret.is_some() {
            return Err(lowering.error("control reaches the end of a non-void function"));
        }
        lowering.builder.ins().return_(&[]);
    }

    lowering.builder.seal_all_blocks();
    lowering.builder.finalize();
    Ok(())
}

struct FunctionLowering<'a, 'f> {
    builder: FunctionBuilder<'f>,
    module: &'a Module,
    context: &'a Context,
    function: &'a FunctionDef,
    name: &'a str,
    target: &'a TargetDescriptor,
    params: Vec<Value>,
    callees: HashMap<Symbol, FuncRef>,
    globals: HashMap<Symbol, GlobalValue>,
    /// Set once the current block ends in a return.
    terminated: bool,
}

impl FunctionLowering<'_, '_> {
    fn error(&self, construct: impl Into<String>) -> JitError {
        JitError::compile(self.name, construct)
    }

    fn symbol_name(&self, symbol: Symbol) -> String {
        match self.context.name(symbol) {
            Some(name) => name.to_string(),
            None => format!("#{}", symbol.index()),
        }
    }

    fn clif(&self, ty: Type) -> ir::Type {
        clif_type(ty, self.target)
    }

    fn bits(&self, ty: Type) -> u32 {
        self.clif(ty).bits()
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn lower_body(&mut self, body: &[Stmt]) -> Result<()> {
        for stmt in body {
            // Anything after a return is unreachable.
            if self.terminated {
                break;
            }
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Set { local, value } => {
                let expected = self.local_type(*local)?;
                let value = self.lower_expr(value)?;
                self.expect_type(value, expected, "assignment")?;
                self.builder
                    .def_var(Variable::from_u32(local.index()), value.value);
            }

            Stmt::Store {
                ty,
                addr,
                offset,
                value,
            } => {
                let addr = self.lower_expr(addr)?;
                self.expect_type(addr, Type::Ptr, "store address")?;
                let value = self.lower_expr(value)?;
                self.expect_type(value, *ty, "stored value")?;
                self.builder
                    .ins()
                    .store(MemFlags::trusted(), value.value, addr.value, *offset);
            }

            Stmt::Eval(Expr::Call { callee, args }) => {
                self.lower_call(*callee, args)?;
            }

            Stmt::Eval(expr) => {
                self.lower_expr(expr)?;
            }

            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = self.lower_expr(cond)?;
                let then_block = self.builder.create_block();
                let else_block = self.builder.create_block();
                let merge_block = self.builder.create_block();
                self.builder
                    .ins()
                    .brif(cond.value, then_block, &[], else_block, &[]);

                self.builder.switch_to_block(then_block);
                self.lower_body(then_body)?;
                let then_returned = self.end_branch(merge_block);

                self.builder.switch_to_block(else_block);
                self.lower_body(else_body)?;
                let else_returned = self.end_branch(merge_block);

                if then_returned && else_returned {
                    self.terminated = true;
                } else {
                    self.builder.switch_to_block(merge_block);
                }
            }

            Stmt::While { cond, body } => {
                let header = self.builder.create_block();
                let body_block = self.builder.create_block();
                let exit = self.builder.create_block();
                self.builder.ins().jump(header, &[]);

                self.builder.switch_to_block(header);
                let cond = self.lower_expr(cond)?;
                self.builder
                    .ins()
                    .brif(cond.value, body_block, &[], exit, &[]);

                self.builder.switch_to_block(body_block);
                self.lower_body(body)?;
                self.end_branch(header);

                self.builder.switch_to_block(exit);
            }

            Stmt::Return(value) => {
                match (value, self.function.signature.ret) {
                    (Some(expr), Some(ret)) => {
                        let value = self.lower_expr(expr)?;
                        self.expect_type(value, ret, "return value")?;
                        self.builder.ins().return_(&[value.value]);
                    }
                    (None, None) => {
                        self.builder.ins().return_(&[]);
                    }
                    (Some(_), None) => {
                        return Err(self.error("return with a value in a void function"))
                    }
                    (None, Some(ret)) => {
                        return Err(self.error(format!("return without a value, expected {ret}")))
                    }
                }
                self.terminated = true;
            }
        }
        Ok(())
    }

    /// Closes the current branch with a jump to `next` unless it already
    /// returned. Resets the termination flag and reports whether it was set.
    fn end_branch(&mut self, next: ir::Block) -> bool {
        let returned = self.terminated;
        if !returned {
            self.builder.ins().jump(next, &[]);
        }
        self.terminated = false;
        returned
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn lower_expr(&mut self, expr: &Expr) -> Result<Typed> {
        match expr {
            Expr::Int(ty, value) => {
                let imm = self.immediate(*ty, *value)?;
                let clif = self.clif(*ty);
                let value = self.builder.ins().iconst(clif, imm);
                Ok(Typed { value, ty: *ty })
            }

            Expr::Param(idx) => {
                let ty = self
                    .function
                    .signature
                    .params
                    .get(*idx)
                    .copied()
                    .ok_or_else(|| self.error(format!("parameter {idx} out of range")))?;
                Ok(Typed {
                    value: self.params[*idx],
                    ty,
                })
            }

            Expr::Local(local) => {
                let ty = self.local_type(*local)?;
                let value = self.builder.use_var(Variable::from_u32(local.index()));
                Ok(Typed { value, ty })
            }

            Expr::Binary(op, left, right) => {
                let l = self.lower_expr(left)?;
                let r = self.lower_expr(right)?;
                self.expect_type(r, l.ty, &format!("right operand of {op:?}"))?;
                let ins = self.builder.ins();
                let value = match op {
                    BinOp::Add => ins.iadd(l.value, r.value),
                    BinOp::Sub => ins.isub(l.value, r.value),
                    BinOp::Mul => ins.imul(l.value, r.value),
                    BinOp::Div => ins.sdiv(l.value, r.value),
                    BinOp::Rem => ins.srem(l.value, r.value),
                    BinOp::And => ins.band(l.value, r.value),
                    BinOp::Or => ins.bor(l.value, r.value),
                    BinOp::Xor => ins.bxor(l.value, r.value),
                    BinOp::Shl => ins.ishl(l.value, r.value),
                    BinOp::Shr => ins.sshr(l.value, r.value),
                };
                Ok(Typed { value, ty: l.ty })
            }

            Expr::Compare(op, left, right) => {
                let l = self.lower_expr(left)?;
                let r = self.lower_expr(right)?;
                self.expect_type(r, l.ty, &format!("right operand of {op:?}"))?;
                let cc = match op {
                    CmpOp::Eq => IntCC::Equal,
                    CmpOp::Ne => IntCC::NotEqual,
                    CmpOp::Lt => IntCC::SignedLessThan,
                    CmpOp::Le => IntCC::SignedLessThanOrEqual,
                    CmpOp::Gt => IntCC::SignedGreaterThan,
                    CmpOp::Ge => IntCC::SignedGreaterThanOrEqual,
                };
                let cmp = self.builder.ins().icmp(cc, l.value, r.value);
                Ok(self.boolean(cmp))
            }

            Expr::Neg(inner) => {
                let v = self.lower_expr(inner)?;
                let value = self.builder.ins().ineg(v.value);
                Ok(Typed { value, ty: v.ty })
            }

            Expr::Not(inner) => {
                let v = self.lower_expr(inner)?;
                let is_zero = self.builder.ins().icmp_imm(IntCC::Equal, v.value, 0);
                Ok(self.boolean(is_zero))
            }

            Expr::Abs(inner) => {
                let v = self.lower_expr(inner)?;
                let neg = self.builder.ins().ineg(v.value);
                let is_neg = self
                    .builder
                    .ins()
                    .icmp_imm(IntCC::SignedLessThan, v.value, 0);
                let value = self.builder.ins().select(is_neg, neg, v.value);
                Ok(Typed { value, ty: v.ty })
            }

            Expr::Select {
                cond,
                then_expr,
                else_expr,
            } => {
                let c = self.lower_expr(cond)?;
                let t = self.lower_expr(then_expr)?;
                let e = self.lower_expr(else_expr)?;
                self.expect_type(e, t.ty, "else arm of select")?;
                let value = self.builder.ins().select(c.value, t.value, e.value);
                Ok(Typed { value, ty: t.ty })
            }

            Expr::Cast(ty, inner) => {
                let v = self.lower_expr(inner)?;
                let (from, to) = (self.bits(v.ty), self.bits(*ty));
                let clif = self.clif(*ty);
                let value = if from == to {
                    v.value
                } else if from > to {
                    self.builder.ins().ireduce(clif, v.value)
                } else {
                    self.builder.ins().sextend(clif, v.value)
                };
                Ok(Typed { value, ty: *ty })
            }

            Expr::Call { callee, args } => self.lower_call(*callee, args)?.ok_or_else(|| {
                self.error(format!(
                    "call to void function `{}` used as a value",
                    self.symbol_name(*callee)
                ))
            }),

            Expr::Load { ty, addr, offset } => {
                let addr = self.lower_expr(addr)?;
                self.expect_type(addr, Type::Ptr, "load address")?;
                let clif = self.clif(*ty);
                let value = self
                    .builder
                    .ins()
                    .load(clif, MemFlags::trusted(), addr.value, *offset);
                Ok(Typed { value, ty: *ty })
            }

            Expr::AddressOf(symbol) => {
                let gv = self.global(*symbol)?;
                let ptr = self.clif(Type::Ptr);
                let value = self.builder.ins().symbol_value(ptr, gv);
                Ok(Typed {
                    value,
                    ty: Type::Ptr,
                })
            }

            Expr::Offset { base, index, scale } => {
                let base = self.lower_expr(base)?;
                self.expect_type(base, Type::Ptr, "offset base")?;
                let index = self.lower_expr(index)?;
                let ptr = self.clif(Type::Ptr);
                let index = match self.bits(index.ty).cmp(&ptr.bits()) {
                    std::cmp::Ordering::Less => self.builder.ins().sextend(ptr, index.value),
                    std::cmp::Ordering::Equal => index.value,
                    std::cmp::Ordering::Greater => self.builder.ins().ireduce(ptr, index.value),
                };
                let scaled = self.builder.ins().imul_imm(index, i64::from(*scale));
                let value = self.builder.ins().iadd(base.value, scaled);
                Ok(Typed {
                    value,
                    ty: Type::Ptr,
                })
            }
        }
    }

    fn lower_call(&mut self, callee: Symbol, args: &[Expr]) -> Result<Option<Typed>> {
        let signature = self.callee_signature(callee)?;
        if args.len() != signature.params.len() {
            return Err(self.error(format!(
                "call to `{}` passes {} arguments, expected {}",
                self.symbol_name(callee),
                args.len(),
                signature.params.len()
            )));
        }

        let mut values = Vec::with_capacity(args.len());
        for (idx, (arg, &expected)) in args.iter().zip(&signature.params).enumerate() {
            let value = self.lower_expr(arg)?;
            let what = format!("argument {idx} of call to `{}`", self.symbol_name(callee));
            self.expect_type(value, expected, &what)?;
            values.push(value.value);
        }

        let func_ref = self.func_ref(callee, &signature);
        let call = self.builder.ins().call(func_ref, &values);
        Ok(signature.ret.map(|ty| Typed {
            value: self.builder.inst_results(call)[0],
            ty,
        }))
    }

    fn callee_signature(&self, callee: Symbol) -> Result<Signature> {
        if let Some(function) = self.module.function(callee) {
            return Ok(function.signature.clone());
        }
        match self.module.import(callee).map(|import| &import.kind) {
            Some(ImportKind::Function(signature)) => Ok(signature.clone()),
            Some(ImportKind::Data) => Err(self.error(format!(
                "`{}` is imported as data and cannot be called",
                self.symbol_name(callee)
            ))),
            None if self.module.defines(callee) => Err(self.error(format!(
                "`{}` is a data definition and cannot be called",
                self.symbol_name(callee)
            ))),
            None => Err(self.error(format!(
                "call to undeclared symbol `{}`",
                self.symbol_name(callee)
            ))),
        }
    }

    /// Functions of the same module are colocated; imports may live anywhere
    /// in the address space and are called through an absolute address.
    fn func_ref(&mut self, callee: Symbol, signature: &Signature) -> FuncRef {
        if let Some(&func_ref) = self.callees.get(&callee) {
            return func_ref;
        }
        let colocated = self.module.function(callee).is_some();
        let name = self
            .builder
            .func
            .declare_imported_user_function(UserExternalName::new(0, callee.index()));
        let sig_ref = self
            .builder
            .import_signature(clif_signature(signature, self.target));
        let func_ref = self.builder.import_function(ExtFuncData {
            name: ExternalName::user(name),
            signature: sig_ref,
            colocated,
        });
        self.callees.insert(callee, func_ref);
        func_ref
    }

    fn global(&mut self, symbol: Symbol) -> Result<GlobalValue> {
        if let Some(&gv) = self.globals.get(&symbol) {
            return Ok(gv);
        }
        if !self.module.defines(symbol) && self.module.import(symbol).is_none() {
            return Err(self.error(format!(
                "address of undeclared symbol `{}`",
                self.symbol_name(symbol)
            )));
        }
        let name = self
            .builder
            .func
            .declare_imported_user_function(UserExternalName::new(0, symbol.index()));
        let gv = self.builder.create_global_value(GlobalValueData::Symbol {
            name: ExternalName::user(name),
            offset: Imm64::new(0),
            colocated: false,
            tls: false,
        });
        self.globals.insert(symbol, gv);
        Ok(gv)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn local_type(&self, local: Local) -> Result<Type> {
        self.function
            .locals
            .get(local.index() as usize)
            .copied()
            .ok_or_else(|| self.error(format!("local {} out of range", local.index())))
    }

    fn expect_type(&self, value: Typed, expected: Type, what: &str) -> Result<()> {
        if value.ty == expected {
            Ok(())
        } else {
            Err(self.error(format!("{what} has type {}, expected {expected}", value.ty)))
        }
    }

    /// Widens a comparison flag to an `i32` 0 or 1.
    fn boolean(&mut self, flag: Value) -> Typed {
        let value = self.builder.ins().uextend(ir::types::I32, flag);
        Typed {
            value,
            ty: Type::I32,
        }
    }

    /// Encodes `value` as an immediate of `ty`. Narrow immediates are stored
    /// zero-extended.
    fn immediate(&self, ty: Type, value: i64) -> Result<i64> {
        match self.bits(ty) {
            64 => Ok(value),
            32 => i32::try_from(value)
                .map(|v| i64::from(v as u32))
                .map_err(|_| self.error(format!("integer literal {value} does not fit in {ty}"))),
            bits => Err(JitError::UnsupportedTarget(format!(
                "{bits}-bit integers are not supported"
            ))),
        }
    }
}
