//! Expression and statement trees for function bodies.

use std::ops::{Add, Mul, Neg, Not, Sub};

use crate::context::Symbol;
use crate::types::Type;

/// A function-local variable slot. Locals start out as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Local(pub(crate) u32);

impl Local {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Two-operand integer operations. Both operands must have the same type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Signed division.
    Div,
    /// Signed remainder.
    Rem,
    And,
    Or,
    Xor,
    Shl,
    /// Arithmetic shift right.
    Shr,
}

/// Signed integer comparisons. The result is an `i32` holding 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// An expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(Type, i64),
    Param(usize),
    Local(Local),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),

    /// Logical not: 1 if the operand is zero, else 0.
    Not(Box<Expr>),

    Abs(Box<Expr>),

    Select {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    /// Sign-extends or truncates to the given type.
    Cast(Type, Box<Expr>),

    /// Calls a function defined or imported by the module.
    Call {
        callee: Symbol,
        args: Vec<Expr>,
    },

    Load {
        ty: Type,
        addr: Box<Expr>,
        offset: i32,
    },

    /// The address of a function or data symbol, as a `ptr`.
    AddressOf(Symbol),

    /// `base + index * scale`, with `index` sign-extended to pointer width.
    Offset {
        base: Box<Expr>,
        index: Box<Expr>,
        scale: u32,
    },
}

impl Expr {
    pub fn int(ty: Type, value: i64) -> Self {
        Expr::Int(ty, value)
    }

    pub fn i32(value: i32) -> Self {
        Expr::Int(Type::I32, value as i64)
    }

    pub fn i64(value: i64) -> Self {
        Expr::Int(Type::I64, value)
    }

    pub fn param(idx: usize) -> Self {
        Expr::Param(idx)
    }

    pub fn local(local: Local) -> Self {
        Expr::Local(local)
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(op, Box::new(left), Box::new(right))
    }

    pub fn compare(op: CmpOp, left: Expr, right: Expr) -> Self {
        Expr::Compare(op, Box::new(left), Box::new(right))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(left: Expr, right: Expr) -> Self {
        Expr::binary(BinOp::Add, left, right)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(left: Expr, right: Expr) -> Self {
        Expr::binary(BinOp::Sub, left, right)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(left: Expr, right: Expr) -> Self {
        Expr::binary(BinOp::Mul, left, right)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn div(left: Expr, right: Expr) -> Self {
        Expr::binary(BinOp::Div, left, right)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn rem(left: Expr, right: Expr) -> Self {
        Expr::binary(BinOp::Rem, left, right)
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::compare(CmpOp::Eq, left, right)
    }

    pub fn ne(left: Expr, right: Expr) -> Self {
        Expr::compare(CmpOp::Ne, left, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Expr::compare(CmpOp::Lt, left, right)
    }

    pub fn le(left: Expr, right: Expr) -> Self {
        Expr::compare(CmpOp::Le, left, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Expr::compare(CmpOp::Gt, left, right)
    }

    pub fn ge(left: Expr, right: Expr) -> Self {
        Expr::compare(CmpOp::Ge, left, right)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(expr: Expr) -> Self {
        Expr::Neg(Box::new(expr))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }

    pub fn abs(expr: Expr) -> Self {
        Expr::Abs(Box::new(expr))
    }

    pub fn select(cond: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        Expr::Select {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        }
    }

    pub fn cast(ty: Type, expr: Expr) -> Self {
        Expr::Cast(ty, Box::new(expr))
    }

    pub fn call(callee: Symbol, args: Vec<Expr>) -> Self {
        Expr::Call { callee, args }
    }

    pub fn load(ty: Type, addr: Expr, offset: i32) -> Self {
        Expr::Load {
            ty,
            addr: Box::new(addr),
            offset,
        }
    }

    pub fn address_of(symbol: Symbol) -> Self {
        Expr::AddressOf(symbol)
    }

    pub fn offset(base: Expr, index: Expr, scale: u32) -> Self {
        Expr::Offset {
            base: Box::new(base),
            index: Box::new(index),
            scale,
        }
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Self) -> Self::Output {
        Expr::binary(BinOp::Add, self, rhs)
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Self) -> Self::Output {
        Expr::binary(BinOp::Sub, self, rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Self) -> Self::Output {
        Expr::binary(BinOp::Mul, self, rhs)
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Self::Output {
        Expr::Neg(Box::new(self))
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Self::Output {
        Expr::Not(Box::new(self))
    }
}

/// A statement in a function body.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Set {
        local: Local,
        value: Expr,
    },
    Store {
        ty: Type,
        addr: Expr,
        offset: i32,
        value: Expr,
    },
    Eval(Expr),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
}

impl Stmt {
    pub fn set(local: Local, value: Expr) -> Self {
        Stmt::Set { local, value }
    }

    pub fn store(ty: Type, addr: Expr, offset: i32, value: Expr) -> Self {
        Stmt::Store {
            ty,
            addr,
            offset,
            value,
        }
    }

    pub fn eval(expr: Expr) -> Self {
        Stmt::Eval(expr)
    }

    pub fn if_then(cond: Expr, then_body: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_body,
            else_body: Vec::new(),
        }
    }

    pub fn if_else(cond: Expr, then_body: Vec<Stmt>, else_body: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_body,
            else_body,
        }
    }

    pub fn while_loop(cond: Expr, body: Vec<Stmt>) -> Self {
        Stmt::While { cond, body }
    }

    pub fn ret(value: Expr) -> Self {
        Stmt::Return(Some(value))
    }

    pub fn ret_void() -> Self {
        Stmt::Return(None)
    }
}
