//! Value types and function signatures.

use std::fmt;

use jitforge_core::DataLayout;
use smallvec::SmallVec;

/// An IR value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    I32,
    I64,
    /// Pointer-width integer; its size comes from the target data layout.
    Ptr,
}

impl Type {
    /// Size of a value of this type in bytes under `layout`.
    pub fn bytes(self, layout: &DataLayout) -> u32 {
        match self {
            Type::I32 => 4,
            Type::I64 => 8,
            Type::Ptr => layout.pointer_bytes(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::Ptr => write!(f, "ptr"),
        }
    }
}

/// Parameter and return types of a function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: SmallVec<[Type; 4]>,
    pub ret: Option<Type>,
}

impl Signature {
    pub fn new(params: impl IntoIterator<Item = Type>, ret: Option<Type>) -> Self {
        Self {
            params: params.into_iter().collect(),
            ret,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        match self.ret {
            Some(ret) => write!(f, ") -> {ret}"),
            None => write!(f, ")"),
        }
    }
}
